use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop classification from being attempted at all.
/// Everything recoverable is folded into `ClassificationOutcome::Unmatched`
/// (or `Unrouted`) instead of surfacing here.
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error("Failed to load detection model from {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Detection worker failed while loading the model: {0}")]
    Worker(String),
}

/// Invalid label taxonomy; raised while building the table, never per request.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("Label {label:?} is listed under both {first:?} and {second:?}")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("Category {0:?} has no labels")]
    EmptyCategory(String),

    #[error("Category {0:?} is defined more than once")]
    DuplicateCategory(String),

    #[error("Failed to read taxonomy file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse taxonomy file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
