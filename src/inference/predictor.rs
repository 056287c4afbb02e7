//! Classifier Predictor Module
//!
//! Runs a trained fracture classifier on a single X-ray. Two front-ends sit
//! on top of [`ClassifierPredictor`]:
//! - [`predict_fracture`]: console line plus a saved prediction chart
//! - [`predict_fracture_json`]: a JSON-ready response that never fails

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::augmentation::{to_chw, Augmenter, DEFAULT_IMAGE_SIZE};
use crate::dataset::burn_dataset::{load_image, normalize};
use crate::model::checkpoint::load_checkpoint;
use crate::model::{ResNet, ResNetArch, ResNetConfig, CLASS_NAMES, NUM_CLASSES};
use crate::utils::charts::{save_prediction_png, save_prediction_svg, BarData};
use crate::utils::error::{FractureError, Result};

/// Default directory for saved prediction charts
pub const DEFAULT_OUTPUT_DIR: &str = "./predictions";

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Predicted label
    pub prediction: String,
    /// Probability of the predicted label, in percent
    pub confidence: f64,
    /// Label -> probability in percent
    pub probabilities: BTreeMap<String, f64>,
    #[serde(skip)]
    pub predicted_index: usize,
}

impl ClassificationResult {
    /// Build from softmax probabilities in label order
    pub fn from_probabilities(probs: &[f32]) -> Self {
        let mut predicted_index = 0;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[predicted_index] {
                predicted_index = i;
            }
        }

        let label = |i: usize| CLASS_NAMES.get(i).copied().unwrap_or("unknown").to_string();
        let probabilities = probs
            .iter()
            .enumerate()
            .map(|(i, &p)| (label(i), p as f64 * 100.0))
            .collect();

        Self {
            prediction: label(predicted_index),
            confidence: probs.get(predicted_index).copied().unwrap_or(0.0) as f64 * 100.0,
            probabilities,
            predicted_index,
        }
    }

    /// Bars in label order, the predicted one highlighted
    pub fn bars(&self) -> Vec<BarData> {
        CLASS_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| BarData {
                label: name.to_string(),
                value: self.probabilities.get(*name).copied().unwrap_or(0.0),
                highlighted: i == self.predicted_index,
            })
            .collect()
    }
}

/// JSON response of the classifier API
///
/// On failure `prediction` is null, `confidence` is 0 and `probabilities`
/// is empty, with the message in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub prediction: Option<String>,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

impl ClassifierResponse {
    pub fn from_error(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            prediction: None,
            confidence: 0.0,
            probabilities: BTreeMap::new(),
        }
    }
}

impl From<ClassificationResult> for ClassifierResponse {
    fn from(result: ClassificationResult) -> Self {
        Self {
            error: None,
            prediction: Some(result.prediction),
            confidence: result.confidence,
            probabilities: result.probabilities,
        }
    }
}

/// A loaded classifier ready for single-image inference
pub struct ClassifierPredictor<B: Backend> {
    model: ResNet<B>,
    device: B::Device,
    augmenter: Augmenter,
}

impl<B: Backend> ClassifierPredictor<B> {
    /// Build a fresh 2-output network and load weights from either checkpoint layout
    pub fn load(model_path: &Path, arch: ResNetArch, device: &B::Device) -> Result<Self> {
        info!("Loading {} classifier from {:?}", arch, model_path);
        let model = ResNetConfig::new(arch)
            .with_num_classes(NUM_CLASSES)
            .init::<B>(device);
        let model = load_checkpoint(model, model_path, device)?;
        Ok(Self::from_model(model, device.clone()))
    }

    /// Wrap an already-loaded model
    pub fn from_model(model: ResNet<B>, device: B::Device) -> Self {
        Self {
            model,
            device,
            augmenter: Augmenter::eval(DEFAULT_IMAGE_SIZE),
        }
    }

    /// Classify a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        // Eval transform never samples
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let rgb = self.augmenter.apply(image, &mut rng);
        let size = self.augmenter.image_size() as usize;

        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(to_chw(&rgb), [1, 3, size, size]),
            &self.device,
        );
        let input = normalize(input, &self.device);

        let probs = self
            .model
            .forward_softmax(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| FractureError::Inference(format!("{:?}", e)))?;
        debug!("Class probabilities: {:?}", probs);

        Ok(ClassificationResult::from_probabilities(&probs))
    }

    /// Load and classify an image file
    pub fn predict_path(&self, image_path: &Path) -> Result<ClassificationResult> {
        let image = load_image(image_path)?;
        self.predict_image(&image)
    }
}

/// Output of the console predictor
#[derive(Debug, Clone)]
pub struct PredictionReport {
    pub result: ClassificationResult,
    pub plot_path: PathBuf,
    pub svg_path: PathBuf,
}

/// Chart path for an input image: `<output_dir>/<stem>_prediction.png`
pub fn plot_path_for(image_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    output_dir.join(format!("{}_prediction.png", stem))
}

/// Absolute path of the input image for the SVG `href`
///
/// The SVG lives in the output directory, so a relative path would resolve
/// against it instead of the working directory.
pub fn svg_image_href(image_path: &Path) -> String {
    std::fs::canonicalize(image_path)
        .unwrap_or_else(|_| image_path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

/// Classify an X-ray, print the verdict and save the prediction chart
///
/// Errors propagate to the caller.
pub fn predict_fracture<B: Backend>(
    image_path: &Path,
    model_path: &Path,
    arch: ResNetArch,
    output_dir: &Path,
    device: &B::Device,
) -> Result<PredictionReport> {
    let predictor = ClassifierPredictor::<B>::load(model_path, arch, device)?;
    let image = load_image(image_path)?;
    let result = predictor.predict_image(&image)?;

    let plot_path = plot_path_for(image_path, output_dir);
    let svg_path = plot_path.with_extension("svg");
    let bars = result.bars();
    save_prediction_png(&image, &bars, &plot_path)?;
    save_prediction_svg(&svg_image_href(image_path), &bars, &svg_path)?;

    println!(
        "Prediction: {} (Confidence: {:.2}%)",
        result.prediction, result.confidence
    );
    println!("Visualization saved to {}", plot_path.display());

    Ok(PredictionReport {
        result,
        plot_path,
        svg_path,
    })
}

/// Classify an X-ray for the JSON API; failures become an error response
pub fn predict_fracture_json<B: Backend>(
    image_path: &Path,
    model_path: &Path,
    arch: ResNetArch,
    device: &B::Device,
) -> ClassifierResponse {
    ClassifierPredictor::<B>::load(model_path, arch, device)
        .and_then(|predictor| predictor.predict_path(image_path))
        .map(ClassifierResponse::from)
        .unwrap_or_else(ClassifierResponse::from_error)
}
