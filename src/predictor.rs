//! High-level predictor: asset-bundle loading, batch encoding, scoring, and
//! output decoding.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::data::RowMatrix;
use crate::decode::{decode, Prediction};
use crate::encode::{Row, RowEncoder};
use crate::error::{PredictError, Result};
use crate::metadata::ModelMetadata;
use crate::utils::Parallelism;
use crate::vocab::VocabularyStore;

/// File name of the serialized ensemble inside a model bundle.
pub const MODEL_FILE: &str = "model.bst";
/// Subdirectory holding the metadata payload and vocabulary files.
pub const ASSETS_DIR: &str = "assets";
/// Metadata payload inside the assets directory.
pub const METADATA_FILE: &str = "model_metadata.json";

/// Black-box tree-ensemble scorer.
///
/// The predictor hands the scorer a dense row-major matrix where `f64::NAN`
/// marks a missing value, and expects one output row per input row: a single
/// column for regressors, one probability column per class (in `class_names`
/// order) for classifiers. The call is synchronous; any internal blocking is
/// the scorer's concern.
pub trait Scorer {
    fn score(&self, features: &RowMatrix<f64>) -> Result<RowMatrix<f64>>;
}

/// Serves a trained tree-ensemble model over semi-structured rows.
///
/// Immutable after construction; safe to share across threads when the
/// scorer is. Re-create the predictor to pick up changed assets.
#[derive(Debug)]
pub struct Predictor<S> {
    metadata: ModelMetadata,
    encoder: RowEncoder,
    scorer: S,
    parallelism: Parallelism,
}

impl<S: Scorer> Predictor<S> {
    /// Build a predictor from already-loaded parts.
    ///
    /// Fails if any feature's vocabulary is missing or has the wrong shape.
    pub fn new(metadata: ModelMetadata, store: &VocabularyStore, scorer: S) -> Result<Self> {
        let encoder = RowEncoder::new(&metadata, store)?;
        Ok(Self {
            metadata,
            encoder,
            scorer,
            parallelism: Parallelism::from_threads(0),
        })
    }

    /// Load a model bundle from disk.
    ///
    /// Reads `assets/model_metadata.json` and the vocabulary files next to
    /// it, then calls `build_scorer` with the path of the serialized ensemble
    /// (`model.bst`), untouched; parsing the binary is the scorer's business.
    /// Any failure aborts construction.
    pub fn from_path<F>(model_dir: impl AsRef<Path>, build_scorer: F) -> Result<Self>
    where
        F: FnOnce(&Path) -> Result<S>,
    {
        let model_dir = model_dir.as_ref();
        let assets_dir = model_dir.join(ASSETS_DIR);
        let metadata_file = File::open(assets_dir.join(METADATA_FILE))?;
        let metadata = ModelMetadata::from_reader(BufReader::new(metadata_file))?;
        let store = VocabularyStore::load(&assets_dir, &metadata)?;
        debug!(
            features = metadata.n_features(),
            vocabularies = store.len(),
            dir = %model_dir.display(),
            "loaded model bundle"
        );
        let scorer = build_scorer(&model_dir.join(MODEL_FILE))?;
        Self::new(metadata, &store, scorer)
    }

    /// Override the parallelism policy for batch encoding.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Model metadata this predictor serves.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Encoded row width.
    pub fn encoded_width(&self) -> usize {
        self.encoder.width()
    }

    /// Encode a batch without scoring it.
    ///
    /// Useful for callers that drive the scorer themselves or want to inspect
    /// the encoded matrix.
    pub fn encode_batch(&self, instances: &[Row]) -> Result<RowMatrix<f64>> {
        self.encoder.encode_batch(instances, self.parallelism)
    }

    /// Encode, score, and decode a batch of instances.
    ///
    /// All-or-nothing: a single bad row fails the whole batch before the
    /// scorer runs. Output order matches input order.
    pub fn predict(&self, instances: &[Row]) -> Result<Vec<Prediction>> {
        let features = self.encode_batch(instances)?;
        let output = self.scorer.score(&features)?;
        if output.n_rows() != instances.len() {
            return Err(PredictError::OutputShapeMismatch {
                expected_rows: instances.len(),
                expected_cols: output.n_cols(),
                actual_rows: output.n_rows(),
                actual_cols: output.n_cols(),
            });
        }
        decode(&output, &self.metadata)
    }

    /// Like [`predict`](Self::predict), rendered to the JSON wire shape keyed
    /// off the model's label column.
    pub fn predict_json(&self, instances: &[Row]) -> Result<Vec<serde_json::Value>> {
        let predictions = self.predict(instances)?;
        let label_col = self.metadata.label_col();
        Ok(predictions.iter().map(|p| p.to_json(label_col)).collect())
    }
}
