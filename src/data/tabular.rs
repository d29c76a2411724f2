/// In-memory tabular dataset and its mini-batch loader
use candle_core::{Device, Result, Tensor};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::path::Path;

use super::validation::numeric_values;
use crate::TrainError;

/// Read a CSV file with a header row
pub fn read_csv<P: AsRef<Path>>(path: P) -> crate::Result<DataFrame> {
    log::info!("Loading CSV from: {:?}", path.as_ref());

    let file = File::open(path.as_ref())?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()?;

    log::info!("Loaded {} rows x {} columns", df.height(), df.width());
    Ok(df)
}

/// Split a frame into (features, target) by target column name
pub fn split_target(df: &DataFrame, target: &str) -> crate::Result<(DataFrame, Series)> {
    if !df.get_column_names().contains(&target) {
        return Err(TrainError::Config(format!(
            "Target column '{}' not found; available: {:?}",
            target,
            df.get_column_names()
        )));
    }

    let target_series = df.column(target)?.clone();
    let features = df.drop(target)?;
    Ok((features, target_series))
}

/// Features and targets as f32 arrays
#[derive(Debug, Clone)]
pub struct TabularDataset {
    features: Array2<f32>, // [N, num_features]
    targets: Array1<f32>,  // [N]
    feature_names: Vec<String>,
}

impl TabularDataset {
    /// Create from arrays; feature names default to `x0, x1, ...`
    pub fn new(features: Array2<f32>, targets: Array1<f32>) -> crate::Result<Self> {
        let feature_names = (0..features.ncols()).map(|i| format!("x{i}")).collect();
        Self::with_names(features, targets, feature_names)
    }

    fn with_names(
        features: Array2<f32>,
        targets: Array1<f32>,
        feature_names: Vec<String>,
    ) -> crate::Result<Self> {
        if features.nrows() != targets.len() {
            return Err(TrainError::Shape(format!(
                "Features and targets must have same number of samples: {} vs {}",
                features.nrows(),
                targets.len()
            )));
        }

        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(TrainError::Shape(format!(
                "Dataset cannot be empty: {} samples, {} features",
                features.nrows(),
                features.ncols()
            )));
        }

        Ok(Self {
            features,
            targets,
            feature_names,
        })
    }

    /// Convert a feature frame and target series
    ///
    /// Every column must be numeric and fully populated; values are narrowed
    /// to f32.
    pub fn from_frame(features: &DataFrame, target: &Series) -> crate::Result<Self> {
        let columns = features
            .get_columns()
            .iter()
            .map(numeric_values)
            .collect::<crate::Result<Vec<_>>>()?;
        let targets = numeric_values(target)?;

        let num_rows = features.height();
        let feature_array =
            Array2::from_shape_fn((num_rows, columns.len()), |(i, j)| columns[j][i] as f32);
        let target_array: Array1<f32> = targets.into_iter().map(|v| v as f32).collect();

        let names = features
            .get_column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        Self::with_names(feature_array, target_array, names)
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Whole dataset as `([N, num_features], [N])` tensors
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let features: Vec<f32> = self.features.iter().copied().collect();
        let targets: Vec<f32> = self.targets.iter().copied().collect();

        let features = Tensor::from_vec(features, (self.len(), self.num_features()), device)?;
        let targets = Tensor::from_vec(targets, self.len(), device)?;
        Ok((features, targets))
    }

    /// Rows at `indices` as `([B, num_features], [B])` tensors
    pub fn batch(&self, indices: &[usize], device: &Device) -> Result<(Tensor, Tensor)> {
        let rows = self.features.select(Axis(0), indices);
        let features: Vec<f32> = rows.iter().copied().collect();
        let targets: Vec<f32> = indices.iter().map(|&i| self.targets[i]).collect();

        let features = Tensor::from_vec(features, (indices.len(), self.num_features()), device)?;
        let targets = Tensor::from_vec(targets, indices.len(), device)?;
        Ok((features, targets))
    }
}

/// Mini-batch loader over a tabular dataset
pub struct TabularDataLoader {
    dataset: TabularDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
    rng: StdRng,
}

impl TabularDataLoader {
    /// Create new data loader
    ///
    /// # Arguments
    /// * `dataset` - Samples to iterate
    /// * `batch_size` - Samples per batch; the last batch may be smaller
    /// * `shuffle` - Reorder samples at every reset
    /// * `seed` - Shuffle seed; entropy-seeded when `None`
    pub fn new(dataset: TabularDataset, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if shuffle {
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            batch_size: batch_size.max(1),
            current_idx: 0,
            indices,
            shuffle,
            rng,
        }
    }

    /// Get next batch (features, targets)
    pub fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = self.current_idx.saturating_add(self.batch_size).min(self.indices.len());
        let batch = self.dataset.batch(&self.indices[self.current_idx..end_idx], device)?;
        self.current_idx = end_idx;

        Ok(Some(batch))
    }

    /// Reset loader for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;

        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &TabularDataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for TabularDataLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        TabularDataLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        TabularDataLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        TabularDataLoader::num_batches(self)
    }
}
