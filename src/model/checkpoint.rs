//! Classifier checkpoints
//!
//! Two on-disk layouts are written with `NamedMpkFileRecorder`:
//! - **Raw**: the bare `ResNet` record (parameter mapping only)
//! - **Wrapped**: a record holding the parameters under `model_state_dict`
//!   plus training metadata
//!
//! Loading accepts either layout.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::resnet::{ResNet, ResNetArch, ResNetConfig, ResNetRecord};
use crate::utils::error::{FractureError, Result};

/// Extension appended by the recorder
pub const CHECKPOINT_EXTENSION: &str = "mpk";

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Training metadata stored alongside wrapped checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub arch: ResNetArch,
}

/// On-disk layout to write
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointFormat {
    Raw,
    Wrapped(CheckpointMeta),
}

/// Wrapped checkpoint record
#[derive(Record)]
pub struct ClassifierCheckpoint<B: Backend> {
    pub model_state_dict: ResNetRecord<B>,
    pub epoch: usize,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub arch: String,
}

/// Path the recorder will actually write for `path`
pub fn checkpoint_path(path: &Path) -> PathBuf {
    path.with_extension(CHECKPOINT_EXTENSION)
}

/// Save model weights in the requested layout, creating parent directories
pub fn save_checkpoint<B: Backend>(
    model: &ResNet<B>,
    path: &Path,
    format: &CheckpointFormat,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let recorder = CheckpointRecorder::new();
    let record = model.clone().into_record();
    let result = match format {
        CheckpointFormat::Raw => Recorder::<B>::record(&recorder, record, path.to_path_buf()),
        CheckpointFormat::Wrapped(meta) => Recorder::<B>::record(
            &recorder,
            ClassifierCheckpoint {
                model_state_dict: record,
                epoch: meta.epoch,
                val_loss: meta.val_loss,
                val_accuracy: meta.val_accuracy,
                arch: meta.arch.to_string(),
            },
            path.to_path_buf(),
        ),
    };
    result.map_err(|e| FractureError::Checkpoint(format!("Failed to save {:?}: {:?}", path, e)))?;

    let written = checkpoint_path(path);
    debug!("Checkpoint written to {:?}", written);
    Ok(written)
}

/// Load weights into `model`, trying the wrapped layout first
pub fn load_checkpoint<B: Backend>(
    model: ResNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<ResNet<B>> {
    let file = checkpoint_path(path);
    if !file.exists() {
        return Err(FractureError::PathNotFound(file));
    }

    let recorder = CheckpointRecorder::new();
    let wrapped =
        Recorder::<B>::load::<ClassifierCheckpoint<B>>(&recorder, path.to_path_buf(), device);

    let record = match wrapped {
        Ok(checkpoint) => {
            debug!(
                "Wrapped checkpoint: epoch {}, val loss {:.4}, arch {}",
                checkpoint.epoch, checkpoint.val_loss, checkpoint.arch
            );
            let expected = ResNetArch::from_stage_depths(model.stage_depths());
            if let (Ok(saved), Some(expected)) = (checkpoint.arch.parse::<ResNetArch>(), expected) {
                if saved != expected {
                    return Err(FractureError::Checkpoint(format!(
                        "{:?} holds a {} model, expected {}",
                        file, saved, expected
                    )));
                }
            }
            checkpoint.model_state_dict
        }
        Err(_) => Recorder::<B>::load::<ResNetRecord<B>>(&recorder, path.to_path_buf(), device)
            .map_err(|e| {
                FractureError::Checkpoint(format!(
                    "{:?} is neither a wrapped nor a raw checkpoint for this architecture: {:?}",
                    file, e
                ))
            })?,
    };

    check_record_layout(&model, &record, &file)?;
    Ok(model.load_record(record))
}

/// Reject records whose stage depths or head shape differ from `model`
///
/// `load_record` asserts on these instead of returning an error.
fn check_record_layout<B: Backend>(
    model: &ResNet<B>,
    record: &ResNetRecord<B>,
    file: &Path,
) -> Result<()> {
    let saved = [
        record.layer1.len(),
        record.layer2.len(),
        record.layer3.len(),
        record.layer4.len(),
    ];
    let expected = model.stage_depths();
    if saved != expected {
        let describe = |depths: [usize; 4]| match ResNetArch::from_stage_depths(depths) {
            Some(arch) => arch.to_string(),
            None => format!("stages {:?}", depths),
        };
        return Err(FractureError::Checkpoint(format!(
            "{:?} holds a {} model, expected {}",
            file,
            describe(saved),
            describe(expected)
        )));
    }

    let saved_head = record.fc.weight.dims();
    let expected_head = model.fc.weight.dims();
    if saved_head != expected_head {
        return Err(FractureError::Checkpoint(format!(
            "{:?} has a {:?} classifier head, expected {:?}",
            file, saved_head, expected_head
        )));
    }
    Ok(())
}

/// Build a 2-class network from a 1000-class ImageNet backbone record
pub fn load_pretrained_backbone<B: Backend>(
    arch: ResNetArch,
    path: &Path,
    num_classes: usize,
    device: &B::Device,
) -> Result<ResNet<B>> {
    info!("Loading pretrained {} backbone from {:?}", arch, path);
    let backbone = ResNetConfig::new(arch)
        .with_num_classes(1000)
        .init::<B>(device);
    let backbone = load_checkpoint(backbone, path, device)?;
    Ok(backbone.replace_head(num_classes, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_path_extension() {
        assert_eq!(
            checkpoint_path(Path::new("models/bone_fracture_model.pth")),
            PathBuf::from("models/bone_fracture_model.mpk")
        );
    }

    #[test]
    fn test_missing_checkpoint() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        let err = load_checkpoint(model, Path::new("/nope/model"), &device).unwrap_err();
        assert!(matches!(err, FractureError::PathNotFound(_)));
    }

    #[test]
    fn test_architecture_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let resnet18 = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        let path = dir.path().join("resnet18");
        save_checkpoint(&resnet18, &path, &CheckpointFormat::Raw).unwrap();

        let resnet50 = ResNetConfig::new(ResNetArch::ResNet50).init::<TestBackend>(&device);
        let err = load_checkpoint(resnet50, &path, &device).unwrap_err();
        assert!(matches!(err, FractureError::Checkpoint(_)));
        assert!(err.to_string().contains("resnet18"));
    }

    #[test]
    fn test_head_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let backbone = ResNetConfig::new(ResNetArch::ResNet18)
            .with_num_classes(1000)
            .init::<TestBackend>(&device);
        let path = dir.path().join("imagenet");
        save_checkpoint(&backbone, &path, &CheckpointFormat::Raw).unwrap();

        let binary = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        let err = load_checkpoint(binary, &path, &device).unwrap_err();
        assert!(matches!(err, FractureError::Checkpoint(_)));
    }

    #[test]
    fn test_wrapped_checkpoint_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        let meta = CheckpointMeta {
            epoch: 3,
            val_loss: 0.25,
            val_accuracy: 90.0,
            arch: ResNetArch::ResNet18,
        };
        let path = dir.path().join("nested/model");
        let written = save_checkpoint(&model, &path, &CheckpointFormat::Wrapped(meta)).unwrap();
        assert!(written.exists());

        let fresh = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
        let loaded = load_checkpoint(fresh, &path, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5);
        }
    }
}
