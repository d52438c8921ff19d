//! Row encoding: replay training-time feature encodings over semi-structured
//! input rows.
//!
//! At load time the declared encode types are fused with their vocabularies
//! into an ordered list of [`FeatureEncoder`]s, one per feature in training
//! order. Per-row encoding is then a straight walk over that list; no
//! vocabulary membership is re-tested per row. The encoded width of a row is
//! fixed by metadata alone, so every row in a batch has the same width.
//!
//! Missing slots are `f64::NAN`, never 0.0. One deliberate wrinkle carried
//! over from the trained models this crate replays: for target-encoding
//! vectors with more than one component, an exact-zero component is treated
//! as missing. Zero and absent are genuinely indistinguishable in those
//! persisted vectors, so a legitimate 0.0 cannot survive the round trip.

use std::collections::HashMap;

use rayon::prelude::*;
use serde_json::Value;

use crate::data::RowMatrix;
use crate::error::{PredictError, Result};
use crate::metadata::{EncodeType, ModelMetadata};
use crate::utils::Parallelism;
use crate::vocab::{Vocabulary, VocabularyStore};

/// One input instance: feature name to semi-structured value.
///
/// Values are JSON: scalars for plain features, arrays for array features,
/// arrays of `[key, value]` pairs for sparse features.
pub type Row = serde_json::Map<String, Value>;

/// A feature's encoding, resolved once at load time.
#[derive(Debug, Clone)]
enum FeatureEncoder {
    /// Pass the value through as a number.
    Identity,
    /// One slot per category; `slots` maps a category to its first position.
    OneHot {
        slots: HashMap<String, usize>,
        width: usize,
    },
    /// Replace the category with its learned target vector.
    Target {
        table: HashMap<String, Vec<f64>>,
        dim: usize,
    },
    /// Replace the category with its vocabulary index.
    Label { index: HashMap<String, usize> },
    /// One-hot over every element of an array.
    ArrayOneHot {
        slots: HashMap<String, usize>,
        width: usize,
    },
    /// Length-averaged sum of per-element target vectors.
    ArrayTarget {
        table: HashMap<String, Vec<f64>>,
        dim: usize,
    },
    /// Scatter sparse `[key, value]` pairs into a dense vector.
    SparseStruct { dimension: usize },
    /// Copy a fixed-length numeric array through.
    DenseArray { length: usize },
}

/// First-occurrence position map over an ordered category list.
fn category_slots(categories: &[String]) -> HashMap<String, usize> {
    let mut slots = HashMap::with_capacity(categories.len());
    for (i, category) in categories.iter().enumerate() {
        slots.entry(category.clone()).or_insert(i);
    }
    slots
}

impl FeatureEncoder {
    fn build(
        feature_index: usize,
        encode_type: EncodeType,
        store: &VocabularyStore,
    ) -> Result<Self> {
        let missing = || PredictError::MissingVocabulary {
            feature_index,
            encode_type,
        };
        if !encode_type.needs_vocabulary() {
            return Ok(Self::Identity);
        }
        let vocabulary = store.get(feature_index).ok_or_else(missing)?;
        match (encode_type, vocabulary) {
            (EncodeType::CategoricalOneHot, Vocabulary::Categories(cats)) => Ok(Self::OneHot {
                slots: category_slots(cats),
                width: cats.len(),
            }),
            (EncodeType::CategoricalTarget, Vocabulary::Targets { table, dim }) => {
                Ok(Self::Target {
                    table: table.clone(),
                    dim: *dim,
                })
            }
            (EncodeType::CategoricalLabel, Vocabulary::Categories(cats)) => Ok(Self::Label {
                index: category_slots(cats),
            }),
            (EncodeType::ArrayOneHot, Vocabulary::Categories(cats)) => Ok(Self::ArrayOneHot {
                slots: category_slots(cats),
                width: cats.len(),
            }),
            (EncodeType::ArrayTarget, Vocabulary::Targets { table, dim }) => Ok(Self::ArrayTarget {
                table: table.clone(),
                dim: *dim,
            }),
            (EncodeType::ArrayStruct, Vocabulary::Dimension(dimension)) => Ok(Self::SparseStruct {
                dimension: *dimension,
            }),
            (EncodeType::ArrayNumerical, Vocabulary::Length(length)) => {
                Ok(Self::DenseArray { length: *length })
            }
            _ => Err(missing()),
        }
    }

    /// Number of output slots this feature occupies.
    fn width(&self) -> usize {
        match self {
            Self::Identity | Self::Label { .. } => 1,
            Self::OneHot { width, .. } | Self::ArrayOneHot { width, .. } => *width,
            Self::Target { dim, .. } | Self::ArrayTarget { dim, .. } => *dim,
            Self::SparseStruct { dimension } => *dimension,
            Self::DenseArray { length } => *length,
        }
    }

    fn encode(&self, name: &str, value: &Value, row: usize, out: &mut Vec<f64>) -> Result<()> {
        match self {
            Self::Identity => {
                let parsed = scalar_to_f64(value).ok_or_else(|| {
                    PredictError::FeatureParseError {
                        feature: name.to_string(),
                        row,
                    }
                })?;
                out.push(parsed);
            }
            Self::OneHot { slots, width } => {
                let start = out.len();
                out.extend(std::iter::repeat(f64::NAN).take(*width));
                if let Some(&slot) = slots.get(&category_key(value)) {
                    out[start + slot] = 1.0;
                }
            }
            Self::Target { table, dim } => match table.get(&category_key(value)) {
                Some(targets) => {
                    out.extend(targets.iter().map(|&x| zero_as_missing(x, *dim)));
                }
                None => out.extend(std::iter::repeat(f64::NAN).take(*dim)),
            },
            Self::Label { index } => match index.get(&category_key(value)) {
                Some(&slot) => out.push(slot as f64),
                None => out.push(f64::NAN),
            },
            Self::ArrayOneHot { slots, width } => {
                let items = as_array(name, value, row)?;
                let start = out.len();
                out.extend(std::iter::repeat(f64::NAN).take(*width));
                for item in items {
                    if let Some(&slot) = slots.get(&category_key(item)) {
                        out[start + slot] = 1.0;
                    }
                }
            }
            Self::ArrayTarget { table, dim } => {
                let items = as_array(name, value, row)?;
                let mut summed = vec![0.0f64; *dim];
                let len = items.len() as f64;
                for item in items {
                    // Elements outside the vocabulary contribute zeros.
                    if let Some(targets) = table.get(&category_key(item)) {
                        for (acc, &x) in summed.iter_mut().zip(targets) {
                            *acc += x / len;
                        }
                    }
                }
                out.extend(summed.into_iter().map(|x| zero_as_missing(x, *dim)));
            }
            Self::SparseStruct { dimension } => {
                let items = as_array(name, value, row)?;
                let start = out.len();
                out.extend(std::iter::repeat(f64::NAN).take(*dimension));
                for item in items {
                    let (key, slot_value) = sparse_pair(name, item, row)?;
                    if key < 0 || key as usize >= *dimension {
                        return Err(PredictError::SparseKeyOutOfRange {
                            feature: name.to_string(),
                            row,
                            key,
                            dimension: *dimension,
                        });
                    }
                    out[start + key as usize] = slot_value;
                }
            }
            Self::DenseArray { length } => {
                let items = as_array(name, value, row)?;
                if items.len() != *length {
                    return Err(PredictError::ArrayLengthMismatch {
                        feature: name.to_string(),
                        row,
                        expected: *length,
                        actual: items.len(),
                    });
                }
                for item in items {
                    let parsed = element_to_f64(item).ok_or_else(|| {
                        PredictError::FeatureParseError {
                            feature: name.to_string(),
                            row,
                        }
                    })?;
                    out.push(parsed);
                }
            }
        }
        Ok(())
    }
}

/// Render a value the way the training pipeline stringified categories.
fn category_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Zero components of a multi-component target vector count as missing.
#[inline]
fn zero_as_missing(x: f64, dim: usize) -> f64 {
    if dim > 1 && x == 0.0 {
        f64::NAN
    } else {
        x
    }
}

/// Coerce a scalar value to `f64`.
///
/// Empty strings become 0.0: the explainability tooling probes models with an
/// all-empty baseline row.
fn scalar_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Like [`scalar_to_f64`], but a JSON null is an explicit missing element.
fn element_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        other => scalar_to_f64(other),
    }
}

fn as_array<'a>(name: &str, value: &'a Value, row: usize) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| PredictError::NotAnArray {
        feature: name.to_string(),
        row,
    })
}

/// Pull a `[key, value]` pair out of a sparse array element.
fn sparse_pair(name: &str, item: &Value, row: usize) -> Result<(i64, f64)> {
    let parse_error = || PredictError::FeatureParseError {
        feature: name.to_string(),
        row,
    };
    let pair = item.as_array().ok_or_else(parse_error)?;
    if pair.len() != 2 {
        return Err(parse_error());
    }
    let key = pair[0].as_i64().ok_or_else(parse_error)?;
    let slot_value = element_to_f64(&pair[1]).ok_or_else(parse_error)?;
    Ok((key, slot_value))
}

/// Encodes semi-structured rows into flat numeric vectors in training-time
/// column order.
///
/// Stateless after construction; `&self` methods are safe to call from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    feature_names: Vec<String>,
    sorted_names: Vec<String>,
    encoders: Vec<FeatureEncoder>,
    width: usize,
}

impl RowEncoder {
    /// Fuse metadata and vocabularies into an encoding plan.
    pub fn new(metadata: &ModelMetadata, store: &VocabularyStore) -> Result<Self> {
        let mut encoders = Vec::with_capacity(metadata.n_features());
        for index in 0..metadata.n_features() {
            let encode_type = metadata
                .encode_type_of(index)
                .unwrap_or(EncodeType::NumericalIdentity);
            encoders.push(FeatureEncoder::build(index, encode_type, store)?);
        }
        let width = encoders.iter().map(FeatureEncoder::width).sum();
        let feature_names = metadata.feature_names().to_vec();
        let mut sorted_names = feature_names.clone();
        sorted_names.sort_unstable();
        Ok(Self {
            feature_names,
            sorted_names,
            encoders,
            width,
        })
    }

    /// Total encoded row width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Encode one row into `width()` slots, NaN marking missing values.
    ///
    /// The row's key set must equal the model's feature-name set; key order
    /// does not matter.
    pub fn encode_row(&self, row: &Row, row_index: usize) -> Result<Vec<f64>> {
        self.check_feature_set(row, row_index)?;
        let mut out = Vec::with_capacity(self.width);
        for (name, encoder) in self.feature_names.iter().zip(&self.encoders) {
            // Presence guaranteed by the feature-set check above.
            encoder.encode(name, &row[name.as_str()], row_index, &mut out)?;
        }
        debug_assert_eq!(out.len(), self.width);
        Ok(out)
    }

    /// Encode a batch into a row-major matrix, preserving input order.
    ///
    /// Rows are independent, so encoding fans out across the rayon pool when
    /// `parallelism` allows. Any row failure aborts the whole batch.
    pub fn encode_batch(&self, rows: &[Row], parallelism: Parallelism) -> Result<RowMatrix<f64>> {
        let encoded: Vec<Vec<f64>> = if parallelism.is_parallel() {
            rows.par_iter()
                .enumerate()
                .map(|(i, row)| self.encode_row(row, i))
                .collect::<Result<_>>()?
        } else {
            rows.iter()
                .enumerate()
                .map(|(i, row)| self.encode_row(row, i))
                .collect::<Result<_>>()?
        };
        Ok(RowMatrix::from_rows(encoded, self.width))
    }

    fn check_feature_set(&self, row: &Row, row_index: usize) -> Result<()> {
        let mut row_features: Vec<&str> = row.keys().map(String::as_str).collect();
        row_features.sort_unstable();
        let matches = row_features.len() == self.sorted_names.len()
            && row_features
                .iter()
                .zip(&self.sorted_names)
                .all(|(a, b)| *a == b.as_str());
        if !matches {
            return Err(PredictError::FeatureSetMismatch {
                row: row_index,
                row_features: row_features.join(","),
                model_features: self.sorted_names.join(","),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(features: &[(&str, &str)]) -> ModelMetadata {
        let names: Vec<String> = features.iter().map(|(n, _)| n.to_string()).collect();
        let specs: serde_json::Map<String, Value> = features
            .iter()
            .map(|(n, e)| (n.to_string(), json!({ "encode_type": e })))
            .collect();
        let payload = json!({
            "model_type": "boosted_tree_regressor",
            "label_col": "label",
            "feature_names": names,
            "features": specs,
        });
        ModelMetadata::from_json_str(&payload.to_string()).unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn plan_width_sums_feature_widths() {
        let meta = metadata(&[
            ("f1", ""),
            ("f2", "categorical_one_hot"),
            ("f3", "array_struct"),
        ]);
        let mut store = VocabularyStore::new();
        store.insert(
            1,
            Vocabulary::Categories(vec!["a".into(), "b".into(), "c".into()]),
        );
        store.insert(2, Vocabulary::Dimension(4));
        let encoder = RowEncoder::new(&meta, &store).unwrap();
        assert_eq!(encoder.width(), 1 + 3 + 4);
    }

    #[test]
    fn plan_rejects_missing_vocabulary() {
        let meta = metadata(&[("f1", "categorical_one_hot")]);
        let store = VocabularyStore::new();
        let err = RowEncoder::new(&meta, &store).unwrap_err();
        assert!(matches!(
            err,
            PredictError::MissingVocabulary {
                feature_index: 0,
                ..
            }
        ));
    }

    #[test]
    fn plan_rejects_wrong_vocabulary_shape() {
        let meta = metadata(&[("f1", "categorical_one_hot")]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Dimension(5));
        let err = RowEncoder::new(&meta, &store).unwrap_err();
        assert!(matches!(err, PredictError::MissingVocabulary { .. }));
    }

    #[test]
    fn identity_coercions() {
        let meta = metadata(&[("f1", "numerical_identity")]);
        let encoder = RowEncoder::new(&meta, &VocabularyStore::new()).unwrap();

        let encode = |v: Value| encoder.encode_row(&row(&[("f1", v)]), 0);
        assert_eq!(encode(json!(2.5)).unwrap(), vec![2.5]);
        assert_eq!(encode(json!("3")).unwrap(), vec![3.0]);
        // Empty string is the explainability baseline, not a parse error.
        assert_eq!(encode(json!("")).unwrap(), vec![0.0]);
        assert_eq!(encode(json!(true)).unwrap(), vec![1.0]);
        assert!(matches!(
            encode(json!("abc")).unwrap_err(),
            PredictError::FeatureParseError { feature, row: 0 } if feature == "f1"
        ));
        assert!(matches!(
            encode(Value::Null).unwrap_err(),
            PredictError::FeatureParseError { .. }
        ));
    }

    #[test]
    fn numeric_category_lookup_uses_json_rendering() {
        let meta = metadata(&[("f1", "categorical_label")]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Categories(vec!["3".into(), "2.5".into()]));
        let encoder = RowEncoder::new(&meta, &store).unwrap();

        assert_eq!(
            encoder.encode_row(&row(&[("f1", json!(3))]), 0).unwrap(),
            vec![0.0]
        );
        assert_eq!(
            encoder.encode_row(&row(&[("f1", json!(2.5))]), 0).unwrap(),
            vec![1.0]
        );
    }

    #[test]
    fn target_zero_is_missing_only_multiclass() {
        let mut table = HashMap::new();
        table.insert("a".to_string(), vec![0.0, 0.5]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Targets { table, dim: 2 });
        let meta = metadata(&[("f1", "categorical_target")]);
        let encoder = RowEncoder::new(&meta, &store).unwrap();

        let out = encoder.encode_row(&row(&[("f1", json!("a"))]), 0).unwrap();
        assert!(out[0].is_nan());
        assert_eq!(out[1], 0.5);

        // Single-component vectors keep their zeros.
        let mut table = HashMap::new();
        table.insert("a".to_string(), vec![0.0]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Targets { table, dim: 1 });
        let encoder = RowEncoder::new(&meta, &store).unwrap();
        let out = encoder.encode_row(&row(&[("f1", json!("a"))]), 0).unwrap();
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn array_encoders_reject_scalars() {
        let meta = metadata(&[("f1", "array_one_hot")]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Categories(vec!["a".into()]));
        let encoder = RowEncoder::new(&meta, &store).unwrap();
        assert!(matches!(
            encoder.encode_row(&row(&[("f1", json!("a"))]), 3).unwrap_err(),
            PredictError::NotAnArray { feature, row: 3 } if feature == "f1"
        ));
    }

    #[test]
    fn sparse_pair_must_be_key_value() {
        let meta = metadata(&[("f1", "array_struct")]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Dimension(3));
        let encoder = RowEncoder::new(&meta, &store).unwrap();
        let err = encoder
            .encode_row(&row(&[("f1", json!([[1, 2.0, 3.0]]))]), 0)
            .unwrap_err();
        assert!(matches!(err, PredictError::FeatureParseError { .. }));

        let err = encoder
            .encode_row(&row(&[("f1", json!([[-1, 2.0]]))]), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            PredictError::SparseKeyOutOfRange { key: -1, .. }
        ));
    }

    #[test]
    fn dense_array_length_checked() {
        let meta = metadata(&[("f1", "array_numerical")]);
        let mut store = VocabularyStore::new();
        store.insert(0, Vocabulary::Length(3));
        let encoder = RowEncoder::new(&meta, &store).unwrap();

        let out = encoder
            .encode_row(&row(&[("f1", json!([1.0, "2", null]))]), 0)
            .unwrap();
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 2.0);
        assert!(out[2].is_nan());

        let err = encoder
            .encode_row(&row(&[("f1", json!([1.0, 2.0]))]), 1)
            .unwrap_err();
        assert!(matches!(
            err,
            PredictError::ArrayLengthMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }
}
