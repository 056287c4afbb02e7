//! External tool invocation
//!
//! The Kaggle client and the Ultralytics `yolo` CLI are driven as child
//! processes with inherited stdio so their progress output stays visible.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::utils::error::{FractureError, Result};

/// A command line for an external tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, OsString)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Render as a shell-like string for logs and error messages
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn failure(&self, message: impl Into<String>) -> FractureError {
        FractureError::ExternalCommand {
            command: self.display(),
            message: message.into(),
        }
    }

    /// Run to completion with inherited stdio; non-zero exit is an error
    pub fn run(&self) -> Result<()> {
        debug!("Running: {}", self.display());
        let status = self
            .command()
            .stdin(Stdio::null())
            .status()
            .map_err(|e| self.failure(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(self.failure(format!("exited with {}", status)))
        }
    }

    /// Run and capture stdout
    pub fn output(&self) -> Result<String> {
        debug!("Running: {}", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.failure(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(self.failure(format!("exited with {}: {}", output.status, stderr.trim())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let cmd = ToolCommand::new("yolo").args(["detect", "train"]).arg("epochs=1");
        assert_eq!(cmd.display(), "yolo detect train epochs=1");
    }

    #[test]
    fn test_missing_program_is_external_error() {
        let err = ToolCommand::new("definitely-not-a-real-tool-xyz").run().unwrap_err();
        assert!(matches!(err, FractureError::ExternalCommand { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_and_exit_status() {
        let out = ToolCommand::new("sh").args(["-c", "echo hi"]).output().unwrap();
        assert_eq!(out, "hi");
        assert!(ToolCommand::new("sh").args(["-c", "exit 3"]).run().is_err());
        let out = ToolCommand::new("sh")
            .args(["-c", "echo $FRACTURE_TEST_VAR"])
            .env("FRACTURE_TEST_VAR", "set")
            .output()
            .unwrap();
        assert_eq!(out, "set");
    }
}
