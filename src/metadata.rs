//! Model metadata: what the ensemble was trained on and how each feature
//! was encoded.
//!
//! The metadata payload (`model_metadata.json` in the asset bundle) names the
//! label column, the trained feature order, and a per-feature encode type.
//! Feature order matters: it defines both the column order of the encoded
//! matrix and the indices under which vocabularies are keyed.

use std::collections::HashMap;
use std::io::Read;

use serde::Deserialize;

use crate::error::{PredictError, Result};

/// Kind of tree-ensemble model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    BoostedTreeRegressor,
    BoostedTreeClassifier,
    RandomForestRegressor,
    RandomForestClassifier,
}

impl ModelKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "boosted_tree_regressor" => Some(Self::BoostedTreeRegressor),
            "boosted_tree_classifier" => Some(Self::BoostedTreeClassifier),
            "random_forest_regressor" => Some(Self::RandomForestRegressor),
            "random_forest_classifier" => Some(Self::RandomForestClassifier),
            _ => None,
        }
    }

    /// Returns true if the model predicts class probabilities.
    pub fn is_classifier(self) -> bool {
        matches!(
            self,
            Self::BoostedTreeClassifier | Self::RandomForestClassifier
        )
    }
}

/// How a feature was encoded during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeType {
    /// Passed through as a number. Missing or empty `encode_type` strings
    /// mean the same thing.
    NumericalIdentity,
    /// One slot per category; the matching slot is 1.0.
    CategoricalOneHot,
    /// Category replaced by a learned target-statistics vector.
    CategoricalTarget,
    /// Category replaced by its vocabulary index.
    CategoricalLabel,
    /// One-hot over every element of an array value.
    ArrayOneHot,
    /// Length-averaged sum of per-element target vectors.
    ArrayTarget,
    /// Sparse key/value pairs scattered into a fixed-width dense vector.
    ArrayStruct,
    /// Fixed-length numeric array copied through.
    ArrayNumerical,
}

impl EncodeType {
    /// Parse the metadata `encode_type` string.
    ///
    /// `ohe` and `mhe` are spellings found in older exports, aliases for
    /// label and array-one-hot encoding respectively.
    fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "numerical_identity" => Some(Self::NumericalIdentity),
            "categorical_one_hot" => Some(Self::CategoricalOneHot),
            "categorical_target" => Some(Self::CategoricalTarget),
            "categorical_label" | "ohe" => Some(Self::CategoricalLabel),
            "array_one_hot" | "mhe" => Some(Self::ArrayOneHot),
            "array_target" => Some(Self::ArrayTarget),
            "array_struct" => Some(Self::ArrayStruct),
            "array_numerical" => Some(Self::ArrayNumerical),
            _ => None,
        }
    }

    /// Whether this encode type must resolve a vocabulary at load time.
    pub fn needs_vocabulary(self) -> bool {
        !matches!(self, Self::NumericalIdentity)
    }
}

/// Raw JSON shape of `model_metadata.json`.
///
/// Fields are optional here so that validation can name the missing one
/// instead of bubbling up a generic deserialization error.
#[derive(Debug, Deserialize)]
struct RawMetadata {
    model_type: Option<String>,
    label_col: Option<String>,
    #[serde(default)]
    feature_names: Vec<String>,
    #[serde(default)]
    features: HashMap<String, RawFeature>,
    #[serde(default)]
    class_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    encode_type: Option<String>,
}

/// Validated model metadata.
///
/// Immutable after construction; all lookups are read-only.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    kind: ModelKind,
    label_col: String,
    feature_names: Vec<String>,
    encode_types: Vec<EncodeType>,
    class_names: Vec<String>,
    name_index: HashMap<String, usize>,
}

impl ModelMetadata {
    /// Parse and validate a metadata payload from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_reader(reader)?;
        Self::from_raw(raw)
    }

    /// Parse and validate a metadata payload from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawMetadata) -> Result<Self> {
        let invalid = |msg: String| PredictError::InvalidMetadata(msg);

        let kind = raw
            .model_type
            .as_deref()
            .and_then(ModelKind::parse)
            .ok_or_else(|| invalid("invalid or missing model_type".into()))?;
        let label_col = raw
            .label_col
            .ok_or_else(|| invalid("label_col not found".into()))?;
        if raw.features.is_empty() {
            return Err(invalid("no features found".into()));
        }
        if raw.feature_names.is_empty() {
            return Err(invalid("feature_names not found".into()));
        }
        let class_names = raw.class_names;
        if kind.is_classifier() && class_names.is_empty() {
            return Err(invalid("no class_names found for classifier".into()));
        }

        let mut encode_types = Vec::with_capacity(raw.feature_names.len());
        let mut name_index = HashMap::with_capacity(raw.feature_names.len());
        for (index, name) in raw.feature_names.iter().enumerate() {
            let spec = raw.features.get(name).ok_or_else(|| {
                invalid(format!("feature '{name}' missing from features map"))
            })?;
            let raw_encode = spec.encode_type.as_deref().unwrap_or("");
            let encode_type = EncodeType::parse(raw_encode).ok_or_else(|| {
                invalid(format!(
                    "invalid encode_type '{raw_encode}' for feature '{name}'"
                ))
            })?;
            encode_types.push(encode_type);
            name_index.insert(name.clone(), index);
        }

        Ok(Self {
            kind,
            label_col,
            feature_names: raw.feature_names,
            encode_types,
            class_names,
            name_index,
        })
    }

    /// Kind of the trained model.
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Name of the label column; classifier output keys derive from it.
    pub fn label_col(&self) -> &str {
        &self.label_col
    }

    /// Feature names in training order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Class names in probability-vector order (empty for regressors).
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Number of declared features.
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Feature index for a name, if declared.
    pub fn feature_index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Encode type of the feature at `index`, if declared.
    pub fn encode_type_of(&self, index: usize) -> Option<EncodeType> {
        self.encode_types.get(index).copied()
    }
}
