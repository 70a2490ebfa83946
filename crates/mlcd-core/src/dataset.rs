//! Labeled dataset loading
//!
//! Each split is delivered as two parallel files: a feature table and a label
//! column. Both start with a header line followed by comma-separated numeric
//! rows.

use crate::metrics::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Feature table of the training split
pub const X_TRAIN_KEY: &str = "transformed_x_train_file";
/// Label column of the training split
pub const Y_TRAIN_KEY: &str = "transformed_y_train_file";
/// Feature table of the test split
pub const X_TEST_KEY: &str = "transformed_x_test_file";
/// Label column of the test split
pub const Y_TEST_KEY: &str = "transformed_y_test_file";

/// Keys the training step needs
pub const TRAIN_KEYS: [&str; 2] = [X_TRAIN_KEY, Y_TRAIN_KEY];
/// Keys the validation step needs
pub const TEST_KEYS: [&str; 2] = [X_TEST_KEY, Y_TEST_KEY];

/// Dataset errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Required data-file key not configured
    #[error("missing input: data file key {key:?} is not set")]
    MissingInput { key: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: cannot parse {value:?} as a number")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },

    /// Row has a different number of columns than the first row
    #[error("{path}:{line}: expected {expected} columns, found {found}")]
    RaggedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("feature rows ({features}) and labels ({labels}) differ in count")]
    RowCountMismatch { features: usize, labels: usize },

    #[error("{0} contains no data rows")]
    Empty(PathBuf),
}

impl DatasetError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::Interrupted)
    }
}

/// Data-file locations by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataFiles(BTreeMap<String, PathBuf>);

impl DataFiles {
    /// Create empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard file names under one directory
    #[must_use]
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new()
            .with(X_TRAIN_KEY, dir.join("x_train.csv"))
            .with(Y_TRAIN_KEY, dir.join("y_train.csv"))
            .with(X_TEST_KEY, dir.join("x_test.csv"))
            .with(Y_TEST_KEY, dir.join("y_test.csv"))
    }

    /// Set a key
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.0.insert(key.into(), path.into());
        self
    }

    /// Look up a key
    ///
    /// # Errors
    /// Returns `DatasetError::MissingInput` if the key is absent
    pub fn get(&self, key: &str) -> Result<&Path, DatasetError> {
        self.0
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| DatasetError::MissingInput {
                key: key.to_string(),
            })
    }

    /// Check that every key is present
    ///
    /// # Errors
    /// Returns `DatasetError::MissingInput` naming the first missing key
    pub fn require(&self, keys: &[&str]) -> Result<(), DatasetError> {
        for key in keys {
            self.get(key)?;
        }
        Ok(())
    }

    /// Load the training split
    pub async fn load_train(&self) -> Result<LabeledDataset, DatasetError> {
        self.require(&TRAIN_KEYS)?;
        LabeledDataset::load(self.get(X_TRAIN_KEY)?, self.get(Y_TRAIN_KEY)?).await
    }

    /// Load the test split
    pub async fn load_test(&self) -> Result<LabeledDataset, DatasetError> {
        self.require(&TEST_KEYS)?;
        LabeledDataset::load(self.get(X_TEST_KEY)?, self.get(Y_TEST_KEY)?).await
    }

    /// Iterate over configured keys
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}

/// Feature rows with one label each
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    features: Vec<Vec<f64>>,
    labels: Vec<Label>,
}

impl LabeledDataset {
    /// Create dataset
    ///
    /// # Errors
    /// Returns `DatasetError::RowCountMismatch` if counts differ
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self, DatasetError> {
        if features.len() != labels.len() {
            return Err(DatasetError::RowCountMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    /// Load a feature table and its label column
    pub async fn load(x_path: &Path, y_path: &Path) -> Result<Self, DatasetError> {
        let features = read_table(x_path).await?;
        let labels = read_table(y_path)
            .await?
            .into_iter()
            .enumerate()
            .map(|(i, row)| to_label(y_path, i + 2, &row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            x = %x_path.display(),
            y = %y_path.display(),
            rows = features.len(),
            "loaded dataset"
        );
        Self::new(features, labels)
    }

    /// Feature rows
    #[inline]
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Labels
    #[inline]
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if dataset has no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

async fn read_table(path: &Path) -> Result<Vec<Vec<f64>>, DatasetError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_table(path, &text)
}

fn parse_table(path: &Path, text: &str) -> Result<Vec<Vec<f64>>, DatasetError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    // line 1 is the header
    for (i, line) in text.lines().enumerate().skip(1) {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split(',')
            .map(|cell| {
                let cell = cell.trim();
                cell.parse::<f64>().map_err(|_| DatasetError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    value: cell.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(DatasetError::RaggedRow {
                    path: path.to_path_buf(),
                    line: line_no,
                    expected: first.len(),
                    found: row.len(),
                });
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(DatasetError::Empty(path.to_path_buf()));
    }
    Ok(rows)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn to_label(path: &Path, line: usize, row: &[f64]) -> Result<Label, DatasetError> {
    let invalid = || DatasetError::Parse {
        path: path.to_path_buf(),
        line,
        value: format!("{row:?}"),
    };
    match row {
        [value] if value.is_finite() && value.fract() == 0.0 => Ok(*value as Label),
        _ => Err(invalid()),
    }
}
