/// Tabular data handling: validation, tensor conversion and batching
pub mod tabular;
pub mod validation;

pub use tabular::{read_csv, split_target, TabularDataLoader, TabularDataset};
pub use validation::{check_data_types, check_for_nan_inf, validate_dataset};

use candle_core::{Device, Result, Tensor};

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch of (features, targets) tensors
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}
