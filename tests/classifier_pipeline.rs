//! End-to-end checks for the classifier: training in simulation mode,
//! checkpoint layouts and both predictors.

use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

use fracture_ml::inference::{predict_fracture, predict_fracture_json, ClassifierPredictor};
use fracture_ml::model::checkpoint::{save_checkpoint, CheckpointFormat, CheckpointMeta};
use fracture_ml::model::{ClassifierTrainConfig, ResNetArch, ResNetConfig, CLASS_NAMES};
use fracture_ml::training::train_model;

type TestBackend = NdArray;

fn write_xray(path: &Path, shade: u8) {
    let img = RgbImage::from_fn(24, 24, |x, y| {
        let v = shade.wrapping_add(((x * 3 + y * 5) % 40) as u8);
        Rgb([v, v, v])
    });
    img.save(path).unwrap();
}

/// Pooled layout with ten images per class
fn pooled_dataset(root: &Path) {
    for (class_idx, class) in CLASS_NAMES.iter().enumerate() {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..10 {
            write_xray(&dir.join(format!("{}.png", i)), (class_idx as u8) * 120 + i);
        }
    }
}

#[test]
fn test_simulated_training_run() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    pooled_dataset(&data_dir);

    let config = ClassifierTrainConfig {
        data_dir,
        model_save_path: dir.path().join("models").join("bone_fracture_model.mpk"),
        batch_size: 4,
        image_size: 32,
        simulate: true,
        ..Default::default()
    };

    let device = Default::default();
    let (_model, report) = train_model::<Autodiff<TestBackend>>(&config, &device).unwrap();

    assert_eq!(report.epochs_run, 1);
    assert_eq!(report.history.len(), 1);
    assert_eq!(report.arch, ResNetArch::ResNet18);
    assert!(report.checkpoint_path.exists());
    assert!((0.0..=100.0).contains(&report.test_accuracy));

    // The trained checkpoint feeds the JSON predictor
    let image = dir.path().join("query.png");
    write_xray(&image, 200);
    let response = predict_fracture_json::<TestBackend>(
        &image,
        &report.checkpoint_path,
        ResNetArch::ResNet18,
        &device,
    );
    assert!(response.error.is_none());
    let total: f64 = response.probabilities.values().sum();
    assert!((total - 100.0).abs() < 1e-2);
}

#[test]
fn test_raw_and_wrapped_checkpoints_agree() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);

    let raw = save_checkpoint(&model, &dir.path().join("raw"), &CheckpointFormat::Raw).unwrap();
    let wrapped = save_checkpoint(
        &model,
        &dir.path().join("wrapped"),
        &CheckpointFormat::Wrapped(CheckpointMeta {
            epoch: 1,
            val_loss: 0.5,
            val_accuracy: 75.0,
            arch: ResNetArch::ResNet18,
        }),
    )
    .unwrap();

    let image = dir.path().join("xray.png");
    write_xray(&image, 90);

    let from_raw = ClassifierPredictor::<TestBackend>::load(&raw, ResNetArch::ResNet18, &device)
        .unwrap()
        .predict_path(&image)
        .unwrap();
    let from_wrapped =
        ClassifierPredictor::<TestBackend>::load(&wrapped, ResNetArch::ResNet18, &device)
            .unwrap()
            .predict_path(&image)
            .unwrap();

    assert_eq!(from_raw.prediction, from_wrapped.prediction);
    for label in CLASS_NAMES {
        assert!((from_raw.probabilities[label] - from_wrapped.probabilities[label]).abs() < 1e-4);
    }
}

#[test]
fn test_console_predictor_saves_chart() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
    let checkpoint =
        save_checkpoint(&model, &dir.path().join("model"), &CheckpointFormat::Raw).unwrap();

    let image = dir.path().join("wrist.png");
    write_xray(&image, 30);
    let output_dir = dir.path().join("predictions");

    let report = predict_fracture::<TestBackend>(
        &image,
        &checkpoint,
        ResNetArch::ResNet18,
        &output_dir,
        &device,
    )
    .unwrap();

    assert_eq!(report.plot_path, output_dir.join("wrist_prediction.png"));
    assert!(report.plot_path.exists());
    assert!(CLASS_NAMES.contains(&report.result.prediction.as_str()));
}

#[test]
fn test_json_predictor_reports_errors() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();

    // Missing checkpoint
    let image = dir.path().join("xray.png");
    write_xray(&image, 10);
    let response = predict_fracture_json::<TestBackend>(
        &image,
        &dir.path().join("missing.mpk"),
        ResNetArch::ResNet18,
        &device,
    );
    assert!(response.error.is_some());
    assert!(response.prediction.is_none());

    // Corrupt image with a valid checkpoint
    let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
    let checkpoint =
        save_checkpoint(&model, &dir.path().join("model"), &CheckpointFormat::Raw).unwrap();
    let corrupt = dir.path().join("corrupt.png");
    std::fs::write(&corrupt, b"definitely not a png").unwrap();

    let response =
        predict_fracture_json::<TestBackend>(&corrupt, &checkpoint, ResNetArch::ResNet18, &device);
    let json = serde_json::to_value(&response).unwrap();
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(json["prediction"].is_null());
    assert_eq!(json["confidence"], 0.0);
    assert!(json["probabilities"].as_object().unwrap().is_empty());
}

#[test]
fn test_json_predictor_rejects_other_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();

    // Simulation runs write ResNet-18 while the predictors default to ResNet-50
    let model = ResNetConfig::new(ResNetArch::ResNet18).init::<TestBackend>(&device);
    let checkpoint =
        save_checkpoint(&model, &dir.path().join("model"), &CheckpointFormat::Raw).unwrap();
    let image = dir.path().join("xray.png");
    write_xray(&image, 60);

    let response =
        predict_fracture_json::<TestBackend>(&image, &checkpoint, ResNetArch::ResNet50, &device);
    let json = serde_json::to_value(&response).unwrap();
    assert!(json["error"].as_str().is_some_and(|e| e.contains("resnet18")));
    assert!(json["prediction"].is_null());

    let err = predict_fracture::<TestBackend>(
        &image,
        &checkpoint,
        ResNetArch::ResNet50,
        &dir.path().join("predictions"),
        &device,
    )
    .unwrap_err();
    assert!(err.to_string().contains("expected resnet50"));
}
