//! Photo → detections → crop → department.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task;

use crate::config::{ClassifierConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::core::db::DepartmentRepository;
use crate::crop::{CropExtractor, SelectionPolicy};
use crate::detection::{self, Detector};
use crate::error::{ClassifyError, TaxonomyError};
use crate::models::{ClassificationOutcome, Detection, MatchedObject};

/// Inferences one classifier runs at the same time
pub const DEFAULT_MAX_CONCURRENT_INFERENCES: usize = 2;
use crate::routing::DepartmentResolver;
use crate::taxonomy::LabelTaxonomy;

/// Where a report photo comes from
#[derive(Debug, Clone)]
pub enum PhotoSource {
    Path(PathBuf),
    Bytes { name: String, bytes: Vec<u8> },
    /// The report has no photo attached
    Missing,
}

impl PhotoSource {
    /// File name the crop name is derived from
    pub fn name(&self) -> String {
        match self {
            PhotoSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            PhotoSource::Bytes { name, .. } => name.clone(),
            PhotoSource::Missing => String::new(),
        }
    }

    async fn read(&self) -> Option<Vec<u8>> {
        match self {
            PhotoSource::Path(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!("Photo {:?} is not accessible: {}", path, e);
                    None
                }
            },
            PhotoSource::Bytes { bytes, .. } => Some(bytes.clone()),
            PhotoSource::Missing => None,
        }
    }
}

/// Everything a classification run saw, for debugging and audit
#[derive(Debug, Clone)]
pub struct ClassificationTrace {
    pub outcome: ClassificationOutcome,
    /// Decoded photo, if it got that far
    pub image: Option<Arc<DynamicImage>>,
    pub detections: Vec<Detection>,
    /// Index into `detections` of the one chosen for cropping, set even
    /// when its box could not be cropped
    pub selected: Option<usize>,
}

impl ClassificationTrace {
    fn unmatched() -> Self {
        Self {
            outcome: ClassificationOutcome::Unmatched,
            image: None,
            detections: Vec::new(),
            selected: None,
        }
    }
}

/// Classification entry point. Holds no per-call state; persisting the
/// outcome is up to the caller.
#[derive(Debug)]
pub struct Classifier<D> {
    detector: Arc<Detector>,
    extractor: CropExtractor,
    resolver: DepartmentResolver<D>,
    confidence_threshold: f32,
    inference_timeout: Option<Duration>,
    // A permit lives as long as its blocking inference thread
    inference_slots: Arc<Semaphore>,
}

impl<D: DepartmentRepository> Classifier<D> {
    pub fn new(detector: Arc<Detector>, taxonomy: Arc<LabelTaxonomy>, directory: D) -> Self {
        Self {
            detector,
            extractor: CropExtractor::default(),
            resolver: DepartmentResolver::new(directory, taxonomy),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            inference_timeout: None,
            inference_slots: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_INFERENCES)),
        }
    }

    /// rten detector, taxonomy file (or the built-in table), threshold and
    /// timeout all taken from `config`. The model itself loads lazily.
    pub fn from_config(config: &ClassifierConfig, directory: D) -> Result<Self, TaxonomyError> {
        let taxonomy = match &config.taxonomy_path {
            Some(path) => LabelTaxonomy::from_json_file(path)?,
            None => LabelTaxonomy::standard(),
        };
        Ok(Self::new(
            Arc::new(Detector::from_config(config)),
            Arc::new(taxonomy),
            directory,
        )
        .with_confidence_threshold(config.confidence_threshold)
        .with_inference_timeout(config.inference_timeout))
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.extractor = CropExtractor::new(policy);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Bound on waiting for a free inference slot plus the inference itself.
    /// A timed-out inference keeps its blocking thread and its slot until the
    /// model returns, so a hung model can hold at most
    /// [`Classifier::with_max_concurrent_inferences`] threads.
    pub fn with_inference_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_inferences(mut self, limit: usize) -> Self {
        self.inference_slots = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn detector(&self) -> &Arc<Detector> {
        &self.detector
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        self.resolver.taxonomy()
    }

    pub fn resolver(&self) -> &DepartmentResolver<D> {
        &self.resolver
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Classify one report photo.
    ///
    /// Only a model that cannot be loaded is an error. A missing or
    /// unreadable photo, an undecodable image, a failed or timed-out
    /// inference and an unrecognised object all give `Unmatched`.
    pub async fn classify(&self, photo: &PhotoSource) -> Result<ClassificationOutcome, ClassifyError> {
        Ok(self.classify_traced(photo).await?.outcome)
    }

    /// [`Classifier::classify`] keeping the intermediate results
    pub async fn classify_traced(&self, photo: &PhotoSource) -> Result<ClassificationTrace, ClassifyError> {
        let Some(bytes) = photo.read().await else {
            tracing::info!("No valid photo provided for object detection.");
            return Ok(ClassificationTrace::unmatched());
        };

        // Model first: a missing model must surface even for a bad photo
        self.load_model().await?;

        let image = match task::spawn_blocking(move || image::load_from_memory(&bytes)).await {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(e)) => {
                tracing::warn!("Could not decode photo {:?}: {}", photo.name(), e);
                return Ok(ClassificationTrace::unmatched());
            }
            Err(e) => {
                tracing::warn!("Photo decoding worker failed: {}", e);
                return Ok(ClassificationTrace::unmatched());
            }
        };

        let detections = self.detect(Arc::clone(&image)).await?;
        let mut trace = ClassificationTrace {
            outcome: ClassificationOutcome::Unmatched,
            image: Some(Arc::clone(&image)),
            detections,
            selected: None,
        };

        let taxonomy = self.resolver.taxonomy();
        trace.selected = self.extractor.policy().select(&trace.detections, taxonomy);
        let Some(index) = trace.selected else {
            tracing::info!("No matching detection found.");
            return Ok(trace);
        };
        let detection = &trace.detections[index];
        let Some(crop) = self.extractor.crop(&image, &photo.name(), detection) else {
            return Ok(trace);
        };

        let label = detection.label.clone();
        let confidence = detection.confidence;
        let Some(category) = taxonomy.category_of(&label).map(str::to_string) else {
            return Ok(trace);
        };
        let department = self.resolver.resolve(&label).await;

        let matched = MatchedObject {
            crop,
            label,
            category,
            confidence,
            _guard: (),
        };
        trace.outcome = match department {
            Some(department) => ClassificationOutcome::Routed { matched, department },
            None => ClassificationOutcome::Unrouted { matched },
        };
        Ok(trace)
    }

    async fn load_model(&self) -> Result<(), ClassifyError> {
        let detector = Arc::clone(&self.detector);
        task::spawn_blocking(move || detector.warm_up())
            .await
            .map_err(|e| ClassifyError::Worker(e.to_string()))?
    }

    /// Run inference off the async threads, bounded by the configured timeout
    async fn detect(&self, image: Arc<DynamicImage>) -> Result<Vec<Detection>, ClassifyError> {
        let model = self.detector.model()?;
        let threshold = self.confidence_threshold;
        let slots = Arc::clone(&self.inference_slots);

        let job = async move {
            let permit = slots
                .acquire_owned()
                .await
                .map_err(|e| format!("inference slots closed: {}", e))?;
            let detections = task::spawn_blocking(move || {
                let _permit = permit;
                detection::run_model(model.as_ref(), &image, threshold)
            })
            .await
            .map_err(|e| e.to_string())?;
            Ok::<Vec<Detection>, String>(detections)
        };

        let joined = match self.inference_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Inference did not finish within {:?}; no detections used", limit);
                    return Ok(Vec::new());
                }
            },
            None => job.await,
        };

        match joined {
            Ok(detections) => Ok(detections),
            Err(e) => {
                tracing::warn!("Inference worker failed: {}", e);
                Ok(Vec::new())
            }
        }
    }
}
