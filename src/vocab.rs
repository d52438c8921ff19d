//! Vocabulary store: persisted lookup tables that replay training-time
//! encodings at serving time.
//!
//! Vocabularies live next to the model as plain-text files named by feature
//! index and encode-type suffix, e.g. `4_categorical_one_hot.txt`. Two legacy
//! spellings are still produced by older exporters and are accepted here:
//! `<idx>.txt` for label vocabularies and `<idx>_array.txt` for array one-hot
//! vocabularies.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PredictError, Result};
use crate::metadata::{EncodeType, ModelMetadata};

/// A single feature's persisted lookup table.
#[derive(Debug, Clone, PartialEq)]
pub enum Vocabulary {
    /// Ordered category list, for one-hot and label encodings.
    ///
    /// Slot/index assignment follows first occurrence, so duplicate lines
    /// resolve to the earliest position.
    Categories(Vec<String>),

    /// Category to target-statistics vector, for target encodings.
    ///
    /// `dim` is the uniform vector length shared by every entry.
    Targets {
        table: HashMap<String, Vec<f64>>,
        dim: usize,
    },

    /// Dense width of a sparse array-struct feature.
    Dimension(usize),

    /// Fixed length of a dense numerical array feature.
    Length(usize),
}

impl Vocabulary {
    /// Whether this vocabulary shape serves the given encode type.
    fn serves(&self, encode_type: EncodeType) -> bool {
        matches!(
            (self, encode_type),
            (
                Vocabulary::Categories(_),
                EncodeType::CategoricalOneHot
                    | EncodeType::CategoricalLabel
                    | EncodeType::ArrayOneHot
            ) | (
                Vocabulary::Targets { .. },
                EncodeType::CategoricalTarget | EncodeType::ArrayTarget
            ) | (Vocabulary::Dimension(_), EncodeType::ArrayStruct)
                | (Vocabulary::Length(_), EncodeType::ArrayNumerical)
        )
    }
}

/// Read-only map from feature index to [`Vocabulary`].
///
/// Loaded once per model instance and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct VocabularyStore {
    by_index: HashMap<usize, Vocabulary>,
}

/// What a vocabulary file name says about its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Categories,
    Targets,
    Dimension,
    Length,
}

/// Map a file stem (name without `.txt`) to a feature index and content kind.
///
/// Longer suffixes are tried first so that `3_array_target` is not mistaken
/// for the legacy `3_array` spelling. Files that match no pattern are ignored;
/// the assets directory also holds the metadata payload.
fn classify_stem(stem: &str) -> Option<(usize, FileKind)> {
    const SUFFIXES: [(&str, FileKind); 7] = [
        ("_categorical_one_hot", FileKind::Categories),
        ("_categorical_target", FileKind::Targets),
        ("_categorical_label", FileKind::Categories),
        ("_array_struct_dimension", FileKind::Dimension),
        ("_array_numerical_length", FileKind::Length),
        ("_array_one_hot", FileKind::Categories),
        ("_array_target", FileKind::Targets),
    ];
    for (suffix, kind) in SUFFIXES {
        if let Some(prefix) = stem.strip_suffix(suffix) {
            if let Ok(index) = prefix.parse::<usize>() {
                return Some((index, kind));
            }
        }
    }
    // Legacy array one-hot: `<idx>_array.txt`.
    if let Some(prefix) = stem.strip_suffix("_array") {
        if let Ok(index) = prefix.parse::<usize>() {
            return Some((index, FileKind::Categories));
        }
    }
    // Legacy label vocabulary: bare `<idx>.txt`.
    stem.parse::<usize>().ok().map(|i| (i, FileKind::Categories))
}

fn format_error(path: &Path, reason: impl Into<String>) -> PredictError {
    PredictError::InvalidVocabularyFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a `category,v1,...,vk` target-encoding file.
fn parse_targets(path: &Path, content: &str) -> Result<Vocabulary> {
    let mut table = HashMap::new();
    let mut dim: Option<usize> = None;
    for line in content.lines() {
        let mut parts = line.split(',');
        // split() always yields at least one item
        let category = parts.next().unwrap_or_default().to_string();
        let values: Vec<f64> = parts
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| {
                    format_error(path, format!("bad target value '{v}' for '{category}'"))
                })
            })
            .collect::<Result<_>>()?;
        match dim {
            None => dim = Some(values.len()),
            Some(d) if d != values.len() => {
                return Err(format_error(
                    path,
                    format!(
                        "target vector for '{category}' has {} values, expected {d}",
                        values.len()
                    ),
                ));
            }
            Some(_) => {}
        }
        table.entry(category).or_insert(values);
    }
    Ok(Vocabulary::Targets {
        table,
        dim: dim.unwrap_or(0),
    })
}

/// Parse a file holding a single non-negative integer.
fn parse_scalar(path: &Path, content: &str, what: &str) -> Result<usize> {
    content
        .trim()
        .parse::<usize>()
        .map_err(|_| format_error(path, format!("expected a single integer {what}")))
}

impl VocabularyStore {
    /// Empty store, for in-memory construction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vocabulary for a feature index.
    pub fn insert(&mut self, feature_index: usize, vocabulary: Vocabulary) {
        self.by_index.insert(feature_index, vocabulary);
    }

    /// Vocabulary for a feature index, if any.
    pub fn get(&self, feature_index: usize) -> Option<&Vocabulary> {
        self.by_index.get(&feature_index)
    }

    /// Number of loaded vocabularies.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Load every vocabulary file under `assets_dir` and cross-check the
    /// result against `metadata`.
    ///
    /// Each feature whose encode type needs a vocabulary must resolve to one
    /// of the matching shape; anything else is [`PredictError::MissingVocabulary`].
    pub fn load(assets_dir: &Path, metadata: &ModelMetadata) -> Result<Self> {
        let mut store = Self::new();
        for entry in fs::read_dir(assets_dir)? {
            let path = entry?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".txt"))
            else {
                continue;
            };
            let Some((index, kind)) = classify_stem(stem) else {
                continue;
            };
            let content = fs::read_to_string(&path)?;
            let vocabulary = match kind {
                FileKind::Categories => {
                    Vocabulary::Categories(content.lines().map(str::to_owned).collect())
                }
                FileKind::Targets => parse_targets(&path, &content)?,
                FileKind::Dimension => {
                    Vocabulary::Dimension(parse_scalar(&path, &content, "dimension")?)
                }
                FileKind::Length => Vocabulary::Length(parse_scalar(&path, &content, "length")?),
            };
            if store.by_index.insert(index, vocabulary).is_some() {
                return Err(format_error(
                    &path,
                    format!("feature index {index} has more than one vocabulary file"),
                ));
            }
        }
        debug!(
            vocabularies = store.len(),
            dir = %assets_dir.display(),
            "loaded vocabulary files"
        );
        store.validate(metadata)?;
        Ok(store)
    }

    /// Check that every feature requiring a vocabulary has one of the right
    /// shape.
    pub fn validate(&self, metadata: &ModelMetadata) -> Result<()> {
        for index in 0..metadata.n_features() {
            let encode_type = metadata
                .encode_type_of(index)
                .unwrap_or(EncodeType::NumericalIdentity);
            if !encode_type.needs_vocabulary() {
                continue;
            }
            match self.get(index) {
                Some(vocabulary) if vocabulary.serves(encode_type) => {}
                _ => {
                    return Err(PredictError::MissingVocabulary {
                        feature_index: index,
                        encode_type,
                    });
                }
            }
        }
        Ok(())
    }
}
