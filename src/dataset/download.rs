//! Kaggle dataset download
//!
//! Fetches the dataset with the `kaggle` CLI when the data directory does
//! not already hold a `train/` split.

use std::path::{Path, PathBuf};

use colored::Colorize;
use tracing::info;

use super::split::resolve_data_root;
use crate::utils::error::Result;
use crate::utils::process::ToolCommand;

/// Kaggle slug of the multi-region fracture X-ray dataset
pub const DEFAULT_KAGGLE_DATASET: &str = "bmadushanirodrigo/fracture-multi-region-x-ray-data";

/// Environment variable pointing the Kaggle client at its credentials
pub const KAGGLE_CONFIG_ENV: &str = "KAGGLE_CONFIG_DIR";

/// Whether the data directory, or the wrapper folders an earlier unzip
/// left in it, still lacks a `train/` split
pub fn needs_download(data_dir: &Path) -> bool {
    !resolve_data_root(data_dir).join("train").is_dir()
}

/// Build the Kaggle CLI invocation
pub fn kaggle_command(data_dir: &Path, slug: &str, config_dir: Option<&Path>) -> ToolCommand {
    let mut cmd = ToolCommand::new("kaggle")
        .args(["datasets", "download", "-d", slug, "-p"])
        .arg(data_dir.display().to_string())
        .arg("--unzip");
    if let Some(dir) = config_dir {
        cmd = cmd.env(KAGGLE_CONFIG_ENV, dir.as_os_str());
    }
    cmd
}

/// Download and unzip the dataset unless `<data_dir>/train` exists
///
/// Returns `true` when a download happened. Any download failure is returned
/// to the caller, who treats it as fatal.
pub fn download_dataset_if_needed(
    data_dir: &Path,
    slug: &str,
    config_dir: Option<&Path>,
) -> Result<bool> {
    if !needs_download(data_dir) {
        println!("Dataset found locally. Skipping download.");
        return Ok(false);
    }

    println!("Dataset not found locally. Downloading from Kaggle...");
    println!("Dataset URL: https://www.kaggle.com/datasets/{}", slug);

    std::fs::create_dir_all(data_dir)?;
    let config_dir: Option<PathBuf> = config_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(KAGGLE_CONFIG_ENV).map(PathBuf::from));

    info!("Downloading {} into {:?}", slug, data_dir);
    match kaggle_command(data_dir, slug, config_dir.as_deref()).run() {
        Ok(()) => {
            println!("{}", "Dataset downloaded and unzipped successfully.".green());
            Ok(true)
        }
        Err(e) => {
            println!("{} {}", "Error downloading dataset:".red(), e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_train_dir_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("train")).unwrap();
        assert!(!needs_download(dir.path()));

        let nested = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(nested.path().join("Bone_Fracture_Binary_Classification/train"))
            .unwrap();
        assert!(!needs_download(nested.path()));
        assert!(!download_dataset_if_needed(dir.path(), "owner/slug", None).unwrap());
    }

    #[test]
    fn test_kaggle_command_arguments() {
        let cmd = kaggle_command(Path::new("data"), "owner/slug", Some(Path::new("/creds")));
        assert_eq!(
            cmd.display(),
            "kaggle datasets download -d owner/slug -p data --unzip"
        );
        assert_eq!(cmd.envs[0].0, KAGGLE_CONFIG_ENV);
    }
}
