//! Decode raw ensemble output into labeled predictions.
//!
//! Regressors pass through untouched. Classifiers get the class with the
//! highest probability, with ties resolved to the earliest class in
//! `class_names` order.

use serde_json::{json, Value};

use crate::data::RowMatrix;
use crate::error::{PredictError, Result};
use crate::metadata::ModelMetadata;

/// Decoded model output for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Regression output, one scalar per row.
    Value(f64),
    /// Classification output: argmax label plus the full distribution.
    Class(ClassPrediction),
}

/// A labeled classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    /// Class with the highest probability.
    pub predicted_label: String,
    /// All class names, in probability-vector order.
    pub class_names: Vec<String>,
    /// Probability per class, unmodified scorer output.
    pub probs: Vec<f64>,
}

impl Prediction {
    /// Render the wire shape the serving layer returns.
    ///
    /// Regressors are bare numbers. Classifiers are objects whose keys derive
    /// from the model's label column: `predicted_<label>`, `<label>_values`,
    /// `<label>_probs`.
    pub fn to_json(&self, label_col: &str) -> Value {
        match self {
            Prediction::Value(v) => json!(v),
            Prediction::Class(c) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    format!("predicted_{label_col}"),
                    Value::from(c.predicted_label.clone()),
                );
                map.insert(format!("{label_col}_values"), json!(c.class_names));
                map.insert(format!("{label_col}_probs"), json!(c.probs));
                Value::Object(map)
            }
        }
    }
}

/// First index of the maximum value; ties resolve to the earliest index.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in values.iter().enumerate().skip(1) {
        if x > values[best] {
            best = i;
        }
    }
    best
}

/// Decode a scorer output matrix into one [`Prediction`] per row.
///
/// Classifier output must have one column per class name; regressor output
/// must have exactly one column.
pub fn decode(output: &RowMatrix<f64>, metadata: &ModelMetadata) -> Result<Vec<Prediction>> {
    let expected_cols = if metadata.kind().is_classifier() {
        metadata.class_names().len()
    } else {
        1
    };
    if output.n_cols() != expected_cols {
        return Err(PredictError::OutputShapeMismatch {
            expected_rows: output.n_rows(),
            expected_cols,
            actual_rows: output.n_rows(),
            actual_cols: output.n_cols(),
        });
    }

    if metadata.kind().is_classifier() {
        let class_names = metadata.class_names();
        Ok(output
            .rows()
            .map(|probs| {
                let best = argmax(probs);
                Prediction::Class(ClassPrediction {
                    predicted_label: class_names[best].clone(),
                    class_names: class_names.to_vec(),
                    probs: probs.to_vec(),
                })
            })
            .collect())
    } else {
        Ok(output.rows().map(|r| Prediction::Value(r[0])).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_metadata() -> ModelMetadata {
        ModelMetadata::from_json_str(
            r#"{
                "model_type": "boosted_tree_classifier",
                "label_col": "label",
                "feature_names": ["f1"],
                "features": {"f1": {}},
                "class_names": ["3", "2", "1"]
            }"#,
        )
        .unwrap()
    }

    fn regressor_metadata() -> ModelMetadata {
        ModelMetadata::from_json_str(
            r#"{
                "model_type": "random_forest_regressor",
                "label_col": "label",
                "feature_names": ["f1"],
                "features": {"f1": {}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn argmax_first_max_wins() {
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), 1);
        assert_eq!(argmax(&[0.5, 0.5, 0.0]), 0);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn regressor_passthrough() {
        let output = RowMatrix::from_vec(vec![1.037, 1.936], 2, 1);
        let preds = decode(&output, &regressor_metadata()).unwrap();
        assert_eq!(
            preds,
            vec![Prediction::Value(1.037), Prediction::Value(1.936)]
        );
        assert_eq!(preds[0].to_json("label"), json!(1.037));
    }

    #[test]
    fn classifier_argmax_and_attachments() {
        let output = RowMatrix::from_vec(vec![0.333, 0.333, 0.334], 1, 3);
        let preds = decode(&output, &classifier_metadata()).unwrap();
        let Prediction::Class(c) = &preds[0] else {
            panic!("expected class prediction");
        };
        // Index of max is 2, which maps to class name "1".
        assert_eq!(c.predicted_label, "1");
        assert_eq!(c.class_names, ["3", "2", "1"]);
        assert_eq!(c.probs, [0.333, 0.333, 0.334]);
    }

    #[test]
    fn classifier_wire_shape() {
        let output = RowMatrix::from_vec(vec![0.1, 0.7, 0.2], 1, 3);
        let preds = decode(&output, &classifier_metadata()).unwrap();
        let wire = preds[0].to_json("label");
        assert_eq!(wire["predicted_label"], json!("2"));
        assert_eq!(wire["label_values"], json!(["3", "2", "1"]));
        assert_eq!(wire["label_probs"], json!([0.1, 0.7, 0.2]));
    }

    #[test]
    fn rejects_wrong_column_count() {
        let output = RowMatrix::from_vec(vec![0.5, 0.5], 1, 2);
        let err = decode(&output, &classifier_metadata()).unwrap_err();
        assert!(matches!(
            err,
            PredictError::OutputShapeMismatch {
                expected_cols: 3,
                actual_cols: 2,
                ..
            }
        ));
    }
}
