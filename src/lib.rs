pub mod config;
pub mod core;
pub mod crop;
pub mod detection;
pub mod error;
pub mod intake;
pub mod models;
pub mod pipeline;
pub mod routing;
pub mod taxonomy;

pub use config::{ClassifierConfig, Config};
pub use crop::{CropExtractor, SelectionPolicy};
pub use detection::{DetectionModel, Detector, ModelLoader};
pub use error::{ClassifyError, TaxonomyError};
pub use intake::{ReportIntake, Submission};
pub use models::{BoundingBox, ClassificationOutcome, CropBlob, Detection, MatchedObject};
pub use pipeline::{ClassificationTrace, Classifier, PhotoSource};
pub use routing::DepartmentResolver;
pub use taxonomy::LabelTaxonomy;
