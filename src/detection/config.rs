//! Detector configuration
//!
//! `DetectorTrainConfig` mirrors the Ultralytics training arguments and is
//! rendered to `key=value` pairs for the `yolo` CLI. `DetectorPredictConfig`
//! holds the inference thresholds used by the ONNX predictor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Default dataset description for the HBFMID detection split
pub const DEFAULT_DATA_YAML: &str = "./data/HBFMID/Bone Fractures Detection/data.yaml";

/// Default exported detector
pub const DEFAULT_DETECTOR_MODEL: &str = "./runs/detect/bone_fracture_yolov8m/weights/best.onnx";

/// Ultralytics YOLOv8 training arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorTrainConfig {
    /// Dataset YAML
    pub data: PathBuf,
    /// Starting weights
    pub model: String,
    pub epochs: usize,
    pub imgsz: usize,
    pub batch: usize,
    /// Run name under `project`
    pub name: String,
    pub device: String,
    /// Early stopping patience
    pub patience: usize,
    pub save: bool,
    pub save_period: i64,
    pub cache: bool,
    pub workers: usize,
    pub project: PathBuf,
    pub exist_ok: bool,
    pub pretrained: bool,
    pub optimizer: String,
    pub verbose: bool,
    pub seed: u64,
    pub deterministic: bool,
    pub single_cls: bool,
    pub rect: bool,
    pub cos_lr: bool,
    pub close_mosaic: usize,
    pub amp: bool,
    pub fraction: f64,
    pub profile: bool,
    /// Layers to freeze; omitted from the command line when unset
    pub freeze: Option<usize>,

    // Optimiser
    pub lr0: f64,
    pub lrf: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub warmup_epochs: f64,
    pub warmup_momentum: f64,
    pub warmup_bias_lr: f64,

    // Loss gains
    #[serde(rename = "box")]
    pub box_gain: f64,
    pub cls: f64,
    pub dfl: f64,
    pub pose: f64,
    pub kobj: f64,
    pub label_smoothing: f64,
    pub nbs: usize,

    // Augmentation
    pub hsv_h: f64,
    pub hsv_s: f64,
    pub hsv_v: f64,
    pub degrees: f64,
    pub translate: f64,
    pub scale: f64,
    pub shear: f64,
    pub perspective: f64,
    pub flipud: f64,
    pub fliplr: f64,
    pub mosaic: f64,
    pub mixup: f64,
    pub copy_paste: f64,
}

impl Default for DetectorTrainConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from(DEFAULT_DATA_YAML),
            model: "yolov8m.pt".to_string(),
            epochs: 100,
            imgsz: 640,
            batch: 16,
            name: "bone_fracture_yolov8m".to_string(),
            device: "0".to_string(),
            patience: 20,
            save: true,
            save_period: 10,
            cache: false,
            workers: 8,
            project: PathBuf::from("runs/detect"),
            exist_ok: true,
            pretrained: true,
            optimizer: "AdamW".to_string(),
            verbose: true,
            seed: 42,
            deterministic: false,
            single_cls: false,
            rect: false,
            cos_lr: true,
            close_mosaic: 10,
            amp: true,
            fraction: 1.0,
            profile: false,
            freeze: None,
            lr0: 0.01,
            lrf: 0.01,
            momentum: 0.937,
            weight_decay: 0.0005,
            warmup_epochs: 3.0,
            warmup_momentum: 0.8,
            warmup_bias_lr: 0.1,
            box_gain: 7.5,
            cls: 0.5,
            dfl: 1.5,
            pose: 12.0,
            kobj: 1.0,
            label_smoothing: 0.0,
            nbs: 64,
            hsv_h: 0.015,
            hsv_s: 0.7,
            hsv_v: 0.4,
            degrees: 0.0,
            translate: 0.1,
            scale: 0.5,
            shear: 0.0,
            perspective: 0.0,
            flipud: 0.0,
            fliplr: 0.5,
            mosaic: 1.0,
            mixup: 0.0,
            copy_paste: 0.0,
        }
    }
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

impl DetectorTrainConfig {
    /// Directory Ultralytics writes this run into
    pub fn run_dir(&self) -> PathBuf {
        self.project.join(&self.name)
    }

    pub fn best_weights(&self) -> PathBuf {
        self.run_dir().join("weights").join("best.pt")
    }

    pub fn last_weights(&self) -> PathBuf {
        self.run_dir().join("weights").join("last.pt")
    }

    /// Render as `key=value` arguments for `yolo detect train`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("data={}", self.data.display()),
            format!("model={}", self.model),
            format!("epochs={}", self.epochs),
            format!("imgsz={}", self.imgsz),
            format!("batch={}", self.batch),
            format!("name={}", self.name),
            format!("device={}", self.device),
            format!("patience={}", self.patience),
            format!("save={}", py_bool(self.save)),
            format!("save_period={}", self.save_period),
            format!("cache={}", py_bool(self.cache)),
            format!("workers={}", self.workers),
            format!("project={}", self.project.display()),
            format!("exist_ok={}", py_bool(self.exist_ok)),
            format!("pretrained={}", py_bool(self.pretrained)),
            format!("optimizer={}", self.optimizer),
            format!("verbose={}", py_bool(self.verbose)),
            format!("seed={}", self.seed),
            format!("deterministic={}", py_bool(self.deterministic)),
            format!("single_cls={}", py_bool(self.single_cls)),
            format!("rect={}", py_bool(self.rect)),
            format!("cos_lr={}", py_bool(self.cos_lr)),
            format!("close_mosaic={}", self.close_mosaic),
            format!("amp={}", py_bool(self.amp)),
            format!("fraction={}", self.fraction),
            format!("profile={}", py_bool(self.profile)),
        ];
        if let Some(freeze) = self.freeze {
            args.push(format!("freeze={}", freeze));
        }

        let gains: [(&str, f64); 27] = [
            ("lr0", self.lr0),
            ("lrf", self.lrf),
            ("momentum", self.momentum),
            ("weight_decay", self.weight_decay),
            ("warmup_epochs", self.warmup_epochs),
            ("warmup_momentum", self.warmup_momentum),
            ("warmup_bias_lr", self.warmup_bias_lr),
            ("box", self.box_gain),
            ("cls", self.cls),
            ("dfl", self.dfl),
            ("pose", self.pose),
            ("kobj", self.kobj),
            ("label_smoothing", self.label_smoothing),
            ("nbs", self.nbs as f64),
            ("hsv_h", self.hsv_h),
            ("hsv_s", self.hsv_s),
            ("hsv_v", self.hsv_v),
            ("degrees", self.degrees),
            ("translate", self.translate),
            ("scale", self.scale),
            ("shear", self.shear),
            ("perspective", self.perspective),
            ("flipud", self.flipud),
            ("fliplr", self.fliplr),
            ("mosaic", self.mosaic),
            ("mixup", self.mixup),
            ("copy_paste", self.copy_paste),
        ];
        args.extend(gains.iter().map(|(key, value)| format!("{}={}", key, value)));
        args
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Thresholds for the ONNX detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorPredictConfig {
    /// Minimum class score for a candidate box
    pub conf_threshold: f32,
    /// IoU above which same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Square network input size
    pub input_size: u32,
    pub max_detections: usize,
}

impl Default for DetectorPredictConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            max_detections: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = DetectorTrainConfig::default().to_args();
        assert!(args.contains(&"epochs=100".to_string()));
        assert!(args.contains(&"optimizer=AdamW".to_string()));
        assert!(args.contains(&"cos_lr=True".to_string()));
        assert!(args.contains(&"cache=False".to_string()));
        assert!(args.contains(&"box=7.5".to_string()));
        assert!(args.contains(&"momentum=0.937".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("freeze=")));
        assert_eq!(args.iter().filter(|a| a.starts_with("fraction=")).count(), 1);
        assert_eq!(args.iter().filter(|a| a.starts_with("imgsz=")).count(), 1);
    }

    #[test]
    fn test_run_paths() {
        let config = DetectorTrainConfig::default();
        assert_eq!(
            config.best_weights(),
            PathBuf::from("runs/detect/bone_fracture_yolov8m/weights/best.pt")
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectorTrainConfig = serde_json::from_str(r#"{"epochs": 3, "box": 5.0}"#).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.box_gain, 5.0);
        assert_eq!(config.batch, 16);
    }

    #[test]
    fn test_predict_defaults() {
        let config = DetectorPredictConfig::default();
        assert_eq!(config.conf_threshold, 0.25);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.input_size, 640);
        assert_eq!(config.max_detections, 300);
    }
}
