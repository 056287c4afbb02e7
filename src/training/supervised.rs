//! Classifier Training Loop
//!
//! A hand-written Burn loop: Adam with cross-entropy, validation after
//! every epoch, reduce-on-plateau scheduling and a checkpoint whenever the
//! validation loss improves. The best checkpoint is reloaded at the end and
//! scored on the test split.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::scheduler::{PlateauConfig, ReduceLrOnPlateau};
use crate::dataset::{Augmenter, DatasetSplits, FractureBatcher, FractureDataset};
use crate::model::checkpoint::{
    checkpoint_path, load_checkpoint, load_pretrained_backbone, save_checkpoint, CheckpointFormat,
    CheckpointMeta,
};
use crate::model::{class_names, ClassifierTrainConfig, ResNet, ResNetArch, ResNetConfig, NUM_CLASSES};
use crate::utils::error::{FractureError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{ConfusionMatrix, RunningAverage};

/// Metrics recorded for one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
    pub saved: bool,
}

/// Summary returned by [`train_model`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Test accuracy of the best checkpoint, in percent
    pub test_accuracy: f64,
    pub best_val_loss: f64,
    pub epochs_run: usize,
    pub arch: ResNetArch,
    pub history: Vec<EpochMetrics>,
    pub checkpoint_path: PathBuf,
    pub test_confusion: ConfusionMatrix,
}

impl TrainingReport {
    /// Write the report as pretty JSON
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Loss and accuracy over an evaluation split
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// Mean per-batch cross-entropy
    pub loss: f64,
    /// Accuracy in percent
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

/// Train the fracture classifier
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// Returns the model restored from the best checkpoint and a report.
pub fn train_model<B: AutodiffBackend>(
    config: &ClassifierTrainConfig,
    device: &B::Device,
) -> Result<(ResNet<B>, TrainingReport)> {
    println!("Using device: {:?}", device);

    let mut splits = DatasetSplits::from_directory(&config.data_dir, config.seed)?;
    if config.simulate {
        println!(
            "{}",
            "Simulation mode enabled: reducing dataset size and epochs for faster testing.".yellow()
        );
        splits = splits.limit(&config.simulation_limits);
    }
    let epochs = config.effective_epochs();

    splits.print_summary();
    if splits.num_classes() != NUM_CLASSES {
        return Err(FractureError::Dataset(format!(
            "Dataset has {} classes {:?} but the classifier needs {} ({:?})",
            splits.num_classes(),
            splits.class_names,
            NUM_CLASSES,
            class_names()
        )));
    }
    if splits.train.is_empty() {
        return Err(FractureError::Dataset(format!(
            "No training images found under {:?}",
            config.data_dir
        )));
    }
    if config.batch_size == 0 {
        return Err(FractureError::Config("batch size must be at least 1".to_string()));
    }

    let image_size = config.image_size as u32;
    let train_dataset = FractureDataset::new(splits.train.clone(), Augmenter::train(image_size));
    let val_dataset = FractureDataset::new(splits.val.clone(), Augmenter::eval(image_size));
    let test_dataset = FractureDataset::new(splits.test.clone(), Augmenter::eval(image_size));
    let batcher = FractureBatcher::new(config.image_size);

    let arch = config.effective_arch();
    let mut model = build_model::<B>(arch, config.pretrained_backbone.as_deref(), device)?;
    match arch {
        ResNetArch::ResNet50 => println!("Using ResNet-50 for full training."),
        ResNetArch::ResNet18 => println!("Using ResNet-18 for simulation."),
    }

    let mut optimizer = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut scheduler = ReduceLrOnPlateau::new(
        config.learning_rate,
        PlateauConfig {
            factor: config.plateau_factor,
            patience: config.plateau_patience,
            ..Default::default()
        },
    );

    println!("{}", "Starting Training...".green().bold());

    let mut logger = TrainingLogger::new(epochs);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best_val_loss = f64::INFINITY;
    let mut history = Vec::with_capacity(epochs);
    let mut saved_path: Option<PathBuf> = None;

    for epoch in 0..epochs {
        logger.start_epoch(epoch);
        let lr = scheduler.lr();

        let mut indices: Vec<usize> = (0..splits.train.len()).collect();
        indices.shuffle(&mut rng);

        let mut running_loss = RunningAverage::new();
        let mut correct = 0usize;
        let mut total = 0usize;

        for chunk in indices.chunks(config.batch_size) {
            let items = train_dataset.load_items(chunk, &mut rng)?;
            let batch = batcher.batch(items, device);

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());
            running_loss.add(loss.clone().into_scalar().elem::<f64>());

            correct += count_correct(output, batch.targets.clone());
            total += chunk.len();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(lr, model, grads);
        }

        let train_loss = running_loss.average();
        let train_accuracy = percent(correct, total);

        let val = evaluate(&model.valid(), &val_dataset, config.batch_size)?;
        if splits.val.is_empty() {
            warn!("Validation split is empty; reporting loss and accuracy as 0");
        }

        let new_lr = scheduler.step(val.loss);
        if new_lr < lr {
            logger.log_lr_reduced(lr, new_lr);
        }

        println!(
            "Epoch {}/{}: Train Loss={:.4}, Train Acc={:.2}%, Val Loss={:.4}, Val Acc={:.2}%",
            epoch + 1,
            epochs,
            train_loss,
            train_accuracy,
            val.loss,
            val.accuracy
        );
        logger.end_epoch(val.loss, val.accuracy, lr);

        let saved = val.loss < best_val_loss;
        if saved {
            best_val_loss = val.loss;
            let format = if config.wrapped_checkpoint {
                CheckpointFormat::Wrapped(CheckpointMeta {
                    epoch: epoch + 1,
                    val_loss: val.loss,
                    val_accuracy: val.accuracy,
                    arch,
                })
            } else {
                CheckpointFormat::Raw
            };
            saved_path = Some(save_checkpoint(&model, &config.model_save_path, &format)?);
            println!(
                "{}",
                format!("Model saved at epoch {} with val loss {:.4}", epoch + 1, val.loss).green()
            );
        }

        history.push(EpochMetrics {
            epoch: epoch + 1,
            train_loss,
            train_accuracy,
            val_loss: val.loss,
            val_accuracy: val.accuracy,
            learning_rate: lr,
            saved,
        });
    }

    println!("{}", "Model Training Completed!".green().bold());
    logger.log_complete(best_val_loss);

    let checkpoint = saved_path.unwrap_or_else(|| checkpoint_path(&config.model_save_path));
    let model = load_checkpoint(model, &config.model_save_path, device)?;

    let test = evaluate(&model.valid(), &test_dataset, config.batch_size)?;
    if splits.test.is_empty() {
        warn!("Test split is empty; reporting accuracy as 0");
    }
    println!("Test Accuracy: {:.2}%", test.accuracy);
    print_test_breakdown(&test.confusion);

    info!("Best checkpoint: {:?}", checkpoint);

    let report = TrainingReport {
        test_accuracy: test.accuracy,
        best_val_loss,
        epochs_run: epochs,
        arch,
        history,
        checkpoint_path: checkpoint,
        test_confusion: test.confusion,
    };

    Ok((model, report))
}

/// Fresh 2-class network, optionally starting from an ImageNet backbone
fn build_model<B: Backend>(
    arch: ResNetArch,
    backbone: Option<&std::path::Path>,
    device: &B::Device,
) -> Result<ResNet<B>> {
    match backbone {
        Some(path) => load_pretrained_backbone(arch, path, NUM_CLASSES, device),
        None => Ok(ResNetConfig::new(arch)
            .with_num_classes(NUM_CLASSES)
            .init(device)),
    }
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [n, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([n]);
    let hits: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    hits as usize
}

fn percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * correct as f64 / total as f64
    }
}

/// Evaluate a model without gradients
///
/// An empty dataset yields zero loss and accuracy.
pub fn evaluate<B: Backend>(
    model: &ResNet<B>,
    dataset: &FractureDataset,
    batch_size: usize,
) -> Result<EvalResult> {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let batcher = FractureBatcher::new(dataset.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(&device);
    // Evaluation transforms are deterministic; the rng is never drawn from
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    let mut confusion = ConfusionMatrix::new(NUM_CLASSES);
    let mut running_loss = RunningAverage::new();
    let indices: Vec<usize> = (0..dataset.samples().len()).collect();

    for chunk in indices.chunks(batch_size.max(1)) {
        let items = dataset.load_items(chunk, &mut rng)?;
        let batch = batcher.batch(items, &device);
        let targets = batch.targets.clone();

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets);
        running_loss.add(loss.into_scalar().elem::<f64>());

        let [n, _] = output.dims();
        let predicted = output.argmax(1).reshape([n]).into_data();
        let actual = targets.into_data();
        let predicted = predicted
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| FractureError::Training(format!("{:?}", e)))?;
        let actual = actual
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| FractureError::Training(format!("{:?}", e)))?;
        for (p, a) in predicted.iter().zip(&actual) {
            confusion.add(*a as usize, *p as usize);
        }
    }

    Ok(EvalResult {
        loss: running_loss.average(),
        accuracy: 100.0 * confusion.accuracy(),
        confusion,
    })
}

fn print_test_breakdown(confusion: &ConfusionMatrix) {
    if confusion.total() == 0 {
        return;
    }
    let names = class_names();
    println!("{}", confusion.display(&names));
    for metrics in confusion.class_metrics(&names) {
        println!(
            "  {:15} precision {:.3}  recall {:.3}  f1 {:.3}  (n={})",
            metrics.class_name.as_deref().unwrap_or("?"),
            metrics.precision,
            metrics.recall,
            metrics.f1,
            metrics.support
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_class_dataset_is_rejected() {
        use burn::backend::Autodiff;
        use burn_ndarray::NdArray;

        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("fractured");
        std::fs::create_dir_all(&class_dir).unwrap();
        for i in 0..4u8 {
            image::RgbImage::from_pixel(8, 8, image::Rgb([i * 40, 0, 0]))
                .save(class_dir.join(format!("{}.png", i)))
                .unwrap();
        }

        let config = ClassifierTrainConfig {
            data_dir: dir.path().to_path_buf(),
            model_save_path: dir.path().join("model.mpk"),
            simulate: true,
            image_size: 16,
            ..Default::default()
        };
        let device = Default::default();
        let err = train_model::<Autodiff<NdArray>>(&config, &device).unwrap_err();
        assert!(matches!(err, FractureError::Dataset(_)));
        assert!(!config.model_save_path.exists());
    }

    #[test]
    fn test_percent_handles_empty() {
        assert_eq!(percent(0, 0), 0.0);
        assert!((percent(3, 4) - 75.0).abs() < 1e-9);
    }
}
