//! treeserve: serving-time feature codec for tree-ensemble models.
//!
//! Training pipelines one-hot, target, and label encode semi-structured
//! columns before the ensemble ever sees a number; at serving time only the
//! original values arrive. This crate replays those encodings
//! deterministically from the vocabularies persisted next to the trained
//! model, hands the resulting matrix to a black-box [`Scorer`], and decodes
//! the raw output back into labeled predictions.
//!
//! # Key Types
//!
//! - [`Predictor`] - High-level facade: load a bundle, predict batches
//! - [`ModelMetadata`] / [`VocabularyStore`] - Validated training-time state
//! - [`RowEncoder`] - One semi-structured row to one flat numeric vector
//! - [`RowMatrix`] - Row-major batch matrix, `f64::NAN` marking missing
//! - [`Prediction`] - Decoded output (regression scalar or labeled classes)
//!
//! # Example
//!
//! ```no_run
//! use treeserve::{Predictor, Result, RowMatrix, Scorer};
//!
//! struct MyScorer;
//!
//! impl Scorer for MyScorer {
//!     fn score(&self, features: &RowMatrix<f64>) -> Result<RowMatrix<f64>> {
//!         // Run the serialized ensemble over the encoded matrix.
//!         # let _ = features;
//!         # unimplemented!()
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let predictor = Predictor::from_path("my_model_dir", |_model_path| Ok(MyScorer))?;
//! let rows = vec![serde_json::from_str(r#"{"f1": 1, "f2": "aaa"}"#)?];
//! let predictions = predictor.predict(&rows)?;
//! # let _ = predictions;
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod decode;
pub mod encode;
pub mod error;
pub mod metadata;
pub mod predictor;
pub mod utils;
pub mod vocab;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use data::RowMatrix;
pub use decode::{decode, ClassPrediction, Prediction};
pub use encode::{Row, RowEncoder};
pub use error::{PredictError, Result};
pub use metadata::{EncodeType, ModelKind, ModelMetadata};
pub use predictor::{Predictor, Scorer, ASSETS_DIR, METADATA_FILE, MODEL_FILE};
pub use utils::Parallelism;
pub use vocab::{Vocabulary, VocabularyStore};
