//! Predictor models
//!
//! A trained model is stored as a JSON artifact tagged with its `model_type`,
//! so the validation and promotion steps can load it without knowing which
//! trainer produced it.

use crate::dataset::LabeledDataset;
use crate::metrics::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model training and prediction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Nothing to fit
    #[error("cannot fit a model on an empty dataset")]
    EmptyDataset,

    /// Row width differs from the training data
    #[error("row {row} has {found} features, model expects {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Anything that maps feature rows to class labels
pub trait Predictor {
    /// Predict one label per row
    ///
    /// # Errors
    /// Returns `ModelError::DimensionMismatch` if a row has the wrong width
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError>;
}

/// Fits a [`TrainedModel`] from a labeled dataset
pub trait Trainer: Send + Sync {
    /// Algorithm name, recorded as the run's `model_type`
    fn name(&self) -> &'static str;

    /// Hyperparameters to record with the run
    fn params(&self) -> BTreeMap<String, String>;

    /// Fit a model
    ///
    /// # Errors
    /// Returns `ModelError` if the dataset cannot be fitted
    fn fit(&self, dataset: &LabeledDataset) -> Result<TrainedModel, ModelError>;
}

/// Distance used to find the nearest centroid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    Euclidean,
    Manhattan,
}

impl Distance {
    fn between(self, a: &[f64], b: &[f64]) -> f64 {
        let pairs = a.iter().zip(b);
        match self {
            Self::Euclidean => pairs.map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => f.write_str("euclidean"),
            Self::Manhattan => f.write_str("manhattan"),
        }
    }
}

/// Nearest-centroid classifier: predicts the class whose mean feature vector
/// is closest to the row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroid {
    distance: Distance,
    n_features: usize,
    /// `(label, centroid)` sorted by label
    centroids: Vec<(Label, Vec<f64>)>,
}

impl NearestCentroid {
    /// Fit centroids from a dataset
    ///
    /// # Errors
    /// - `ModelError::EmptyDataset` if there are no rows
    /// - `ModelError::DimensionMismatch` if rows differ in width
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(dataset: &LabeledDataset, distance: Distance) -> Result<Self, ModelError> {
        let first = dataset.features().first().ok_or(ModelError::EmptyDataset)?;
        let n_features = first.len();

        let mut sums: BTreeMap<Label, (Vec<f64>, usize)> = BTreeMap::new();
        let rows = dataset.features().iter().zip(dataset.labels());
        for (row, (features, &label)) in rows.enumerate() {
            check_width(row, n_features, features)?;
            let (sum, count) = sums
                .entry(label)
                .or_insert_with(|| (vec![0.0; n_features], 0));
            for (acc, value) in sum.iter_mut().zip(features) {
                *acc += value;
            }
            *count += 1;
        }

        let centroids = sums
            .into_iter()
            .map(|(label, (sum, count))| {
                let centroid = sum.into_iter().map(|s| s / count as f64).collect();
                (label, centroid)
            })
            .collect();

        Ok(Self {
            distance,
            n_features,
            centroids,
        })
    }

    /// Known classes, ascending
    #[must_use]
    pub fn classes(&self) -> Vec<Label> {
        self.centroids.iter().map(|(label, _)| *label).collect()
    }

    /// Number of features per row
    #[inline]
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Predictor for NearestCentroid {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        rows.iter()
            .enumerate()
            .map(|(row, features)| {
                check_width(row, self.n_features, features)?;
                // ties go to the lowest label
                let mut best: Option<(Label, f64)> = None;
                for (label, centroid) in &self.centroids {
                    let d = self.distance.between(features, centroid);
                    if best.map_or(true, |(_, best_d)| d < best_d) {
                        best = Some((*label, d));
                    }
                }
                best.map(|(label, _)| label).ok_or(ModelError::EmptyDataset)
            })
            .collect()
    }
}

fn check_width(row: usize, expected: usize, features: &[f64]) -> Result<(), ModelError> {
    if features.len() == expected {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            row,
            expected,
            found: features.len(),
        })
    }
}

/// Serialized form of every supported model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum TrainedModel {
    NearestCentroid(NearestCentroid),
}

impl TrainedModel {
    /// Algorithm name
    #[must_use]
    pub fn model_type(&self) -> &'static str {
        match self {
            Self::NearestCentroid(_) => "nearest_centroid",
        }
    }
}

impl Predictor for TrainedModel {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        match self {
            Self::NearestCentroid(model) => model.predict(rows),
        }
    }
}

/// Default trainer
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroidTrainer {
    distance: Distance,
}

impl NearestCentroidTrainer {
    /// Create trainer with the default (Euclidean) distance
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set distance
    #[inline]
    #[must_use]
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }
}

impl Trainer for NearestCentroidTrainer {
    fn name(&self) -> &'static str {
        "nearest_centroid"
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("distance".to_string(), self.distance.to_string())])
    }

    fn fit(&self, dataset: &LabeledDataset) -> Result<TrainedModel, ModelError> {
        NearestCentroid::fit(dataset, self.distance).map(TrainedModel::NearestCentroid)
    }
}
