use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use image::DynamicImage;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use crate::config::ClassifierConfig;
use crate::detection::{DetectionModel, ModelLoader, postprocessing, preprocessing};
use crate::error::ClassifyError;
use crate::models::Detection;

/// YOLOv8-family detector exported to the rten format
pub struct YoloModel {
    model: Model,
    labels: Vec<String>,
    input_size: u32,
    iou_threshold: f32,
    name: String,
}

impl YoloModel {
    /// Load weights and class names. Any problem here is fatal.
    pub fn load(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let model_path = &config.model_path;
        if !model_path.is_file() {
            return Err(ClassifyError::ModelLoad {
                path: model_path.clone(),
                reason: "model weights not found".to_string(),
            });
        }

        let labels = read_labels(&config.labels_path)?;
        let model = Model::load_file(model_path).map_err(|e| ClassifyError::ModelLoad {
            path: model_path.clone(),
            reason: e.to_string(),
        })?;

        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());

        tracing::info!(model = %name, classes = ?labels, "Detection model loaded");

        Ok(Self {
            model,
            labels,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            name,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl DetectionModel for YoloModel {
    fn infer(&self, image: &DynamicImage, confidence_threshold: f32) -> anyhow::Result<Vec<Detection>> {
        let (letterboxed, geometry) = preprocessing::letterbox(image, self.input_size);
        let input = preprocessing::to_input_tensor(&letterboxed);

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow!("Inference failed: {}", e))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| anyhow!("Unexpected model output: {:?}", e))?;

        let shape = output.shape();
        let data = output.to_vec();
        let candidates = postprocessing::decode_predictions(
            &data,
            shape,
            &self.labels,
            confidence_threshold,
            &geometry,
        )?;

        Ok(postprocessing::nms(candidates, self.iou_threshold))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Loads a [`YoloModel`] from the configured paths on first use
#[derive(Debug, Clone)]
pub struct RtenModelLoader {
    config: ClassifierConfig,
}

impl RtenModelLoader {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for RtenModelLoader {
    fn load(&self) -> Result<Arc<dyn DetectionModel>, ClassifyError> {
        Ok(Arc::new(YoloModel::load(&self.config)?))
    }
}

/// One class name per line, blank lines and `#` comments ignored
fn read_labels(path: &Path) -> Result<Vec<String>, ClassifyError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ClassifyError::ModelLoad {
        path: path.to_path_buf(),
        reason: format!("cannot read class names: {}", e),
    })?;

    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect();

    if labels.is_empty() {
        return Err(ClassifyError::ModelLoad {
            path: path.to_path_buf(),
            reason: "class name list is empty".to_string(),
        });
    }
    Ok(labels)
}
