pub mod annotate;
pub mod postprocessing;
pub mod preprocessing;
pub mod yolo;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::models::Detection;

pub use yolo::{RtenModelLoader, YoloModel};

/// Anything that turns a photo into labelled boxes
pub trait DetectionModel: Send + Sync {
    /// Run inference. Implementations may return boxes below the threshold;
    /// [`Detector`] filters them out.
    fn infer(&self, image: &DynamicImage, confidence_threshold: f32) -> anyhow::Result<Vec<Detection>>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Produces the model on first use. Failing here is fatal for the caller.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn DetectionModel>, ClassifyError>;
}

enum ModelState {
    Unloaded,
    Loaded(Arc<dyn DetectionModel>),
    /// Load failed; the error is handed to every later caller
    Failed(ClassifyError),
}

/// Owns the process-wide detection model.
///
/// The model is loaded at most once, under a lock, either on the first
/// detection or through [`Detector::warm_up`]. After that every caller gets
/// a shared read-only handle. A failed load is final for this detector.
pub struct Detector {
    loader: Box<dyn ModelLoader>,
    model: Mutex<ModelState>,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Detector {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(ModelState::Unloaded),
        }
    }

    /// Detector backed by the rten YOLO model described by `config`
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(RtenModelLoader::new(config.clone()))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(
            *self.model.lock().unwrap_or_else(PoisonError::into_inner),
            ModelState::Loaded(_)
        )
    }

    /// Load the model now instead of on the first detection
    pub fn warm_up(&self) -> Result<(), ClassifyError> {
        self.model().map(|_| ())
    }

    /// Shared handle to the model, loading it if this is the first call.
    /// The lock is held across the load so concurrent first callers wait for
    /// one load instead of racing.
    pub fn model(&self) -> Result<Arc<dyn DetectionModel>, ClassifyError> {
        let mut guard = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        match &*guard {
            ModelState::Loaded(model) => return Ok(Arc::clone(model)),
            ModelState::Failed(e) => return Err(e.clone()),
            ModelState::Unloaded => {}
        }

        tracing::info!("Initializing detection model...");
        // A panicking loader (e.g. on corrupt weights) counts as a failed load
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load()))
            .unwrap_or_else(|payload| {
                Err(ClassifyError::Worker(format!(
                    "model loader panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        match loaded {
            Ok(model) => {
                *guard = ModelState::Loaded(Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                tracing::error!("Failed to load detection model: {}", e);
                *guard = ModelState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Detections at or above `confidence_threshold`, in model output order.
    /// Only model loading can fail; inference errors give an empty list.
    pub fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifyError> {
        let model = self.model()?;
        Ok(run_model(model.as_ref(), image, confidence_threshold))
    }

    /// Like [`Detector::detect`] for an encoded image. Undecodable bytes give
    /// an empty list.
    pub fn detect_bytes(
        &self,
        bytes: &[u8],
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifyError> {
        let model = self.model()?;
        match image::load_from_memory(bytes) {
            Ok(image) => Ok(run_model(model.as_ref(), &image, confidence_threshold)),
            Err(e) => {
                tracing::warn!("Could not decode image for detection: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run one inference, folding failures into "no detections"
pub fn run_model(
    model: &dyn DetectionModel,
    image: &DynamicImage,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let detections = match model.infer(image, confidence_threshold) {
        Ok(detections) => detections,
        Err(e) => {
            tracing::warn!(model = model.name(), "Detection failed: {:#}", e);
            return Vec::new();
        }
    };

    detections
        .into_iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .map(|mut d| {
            d.label = d.label.to_lowercase();
            tracing::debug!(
                "Detected class: {} (id {}), confidence: {:.3}",
                d.label,
                d.class_id,
                d.confidence
            );
            d
        })
        .collect()
}
