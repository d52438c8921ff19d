//! Error types for bundle loading and batch encoding.

use std::path::PathBuf;

use crate::metadata::EncodeType;

/// Crate-wide result type.
pub type Result<T, E = PredictError> = std::result::Result<T, E>;

/// Errors surfaced while loading a model bundle or serving a batch.
///
/// Every variant is a validation failure: either the asset bundle does not
/// match the metadata it shipped with, or an input row does not match the
/// features the model was trained on. None of these are transient, so nothing
/// is retried; a single bad row aborts its whole batch.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    /// The model metadata payload is missing or malformed.
    #[error("invalid model metadata: {0}")]
    InvalidMetadata(String),

    /// A feature's encode type requires a vocabulary that did not resolve.
    #[error("feature index {feature_index} has no {encode_type:?} vocabulary")]
    MissingVocabulary {
        feature_index: usize,
        encode_type: EncodeType,
    },

    /// A vocabulary file exists but its content could not be parsed.
    #[error("invalid vocabulary file {}: {reason}", path.display())]
    InvalidVocabularyFormat { path: PathBuf, reason: String },

    /// The set of feature names in a row differs from the model's.
    #[error(
        "row {row} has features [{row_features}] but the model was trained on [{model_features}]"
    )]
    FeatureSetMismatch {
        row: usize,
        row_features: String,
        model_features: String,
    },

    /// A scalar value could not be coerced to a number.
    #[error("feature '{feature}' in row {row} cannot be converted to a number")]
    FeatureParseError { feature: String, row: usize },

    /// An array-encoded feature received a non-array value.
    #[error("feature '{feature}' in row {row} is not an array")]
    NotAnArray { feature: String, row: usize },

    /// A sparse key falls outside the feature's declared dense width.
    #[error(
        "sparse key {key} of feature '{feature}' in row {row} is outside the \
         feature dimension {dimension}"
    )]
    SparseKeyOutOfRange {
        feature: String,
        row: usize,
        key: i64,
        dimension: usize,
    },

    /// A fixed-length array feature received the wrong number of elements.
    #[error(
        "array feature '{feature}' in row {row} has length {actual}, expected {expected}"
    )]
    ArrayLengthMismatch {
        feature: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The scorer returned a matrix with an unexpected shape.
    #[error(
        "scorer output has shape {actual_rows}x{actual_cols}, \
         expected {expected_rows}x{expected_cols}"
    )]
    OutputShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// Underlying I/O failure while reading the asset bundle.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata JSON failed to deserialize.
    #[error("metadata parse error: {0}")]
    Json(#[from] serde_json::Error),
}
