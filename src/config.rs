use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for the database file and the media directories
    pub data_dir: PathBuf,
    pub classifier: ClassifierConfig,
}

/// Everything the detector and orchestrator need to run
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// rten model weights
    pub model_path: PathBuf,
    /// Class names, one per line, in class-id order
    pub labels_path: PathBuf,
    /// JSON taxonomy replacing the built-in table
    pub taxonomy_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Side of the square model input
    pub input_size: u32,
    /// `None` lets inference run unbounded
    pub inference_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // A missing .env is fine; anything else is worth a warning
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let data_dir = env::var("CIVIC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("civic-data"));

        Ok(Config {
            data_dir,
            classifier: ClassifierConfig::from_env()?,
        })
    }
}

impl ClassifierConfig {
    /// Defaults for a model at `model_path` with its labels beside it
    pub fn for_model(model_path: impl Into<PathBuf>) -> Self {
        let model_path = model_path.into();
        Self {
            labels_path: model_path.with_extension("labels"),
            model_path,
            taxonomy_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            inference_timeout: Some(Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS)),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let model_path = env::var("CIVIC_MODEL_PATH")
            .unwrap_or_else(|_| "models/civic-detector.rten".to_string());
        let mut config = Self::for_model(model_path);

        if let Ok(labels_path) = env::var("CIVIC_LABELS_PATH") {
            config.labels_path = PathBuf::from(labels_path);
        }
        config.taxonomy_path = env::var("CIVIC_TAXONOMY_PATH").ok().map(PathBuf::from);

        if let Ok(raw) = env::var("CIVIC_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = raw
                .parse::<f32>()
                .map_err(|e| format!("Invalid CIVIC_CONFIDENCE_THRESHOLD: {}", e))?;
        }
        if let Ok(raw) = env::var("CIVIC_IOU_THRESHOLD") {
            config.iou_threshold = raw
                .parse::<f32>()
                .map_err(|e| format!("Invalid CIVIC_IOU_THRESHOLD: {}", e))?;
        }
        if let Ok(raw) = env::var("CIVIC_INPUT_SIZE") {
            config.input_size = raw
                .parse::<u32>()
                .map_err(|e| format!("Invalid CIVIC_INPUT_SIZE: {}", e))?;
        }
        if let Ok(raw) = env::var("CIVIC_INFERENCE_TIMEOUT_SECS") {
            let secs = raw
                .parse::<u64>()
                .map_err(|e| format!("Invalid CIVIC_INFERENCE_TIMEOUT_SECS: {}", e))?;
            config.inference_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "Confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "IoU threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(format!(
                "Model input size must be a positive multiple of 32, got {}",
                self.input_size
            ));
        }
        Ok(())
    }
}
