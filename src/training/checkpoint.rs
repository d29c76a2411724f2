/// In-memory parameter snapshots
///
/// The trainer keeps the best-scoring snapshot while it runs and restores it
/// at the end; nothing here touches the filesystem.
use candle_core::Tensor;
use std::collections::HashMap;

/// Parameter values keyed by parameter name
#[derive(Debug, Clone, Default)]
pub struct ParameterState {
    tensors: HashMap<String, Tensor>,
}

impl ParameterState {
    pub fn new(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    /// Tensor for one parameter
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tensors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Checkpoint metadata
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Zero-based epoch the snapshot was taken after
    pub epoch: usize,
    /// Mean training loss of that epoch
    pub train_loss: f64,
    /// Validation MSE of that epoch
    pub val_mse: f64,
}

/// Model checkpoint
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Model parameters
    pub state: ParameterState,
    /// Metadata
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create new checkpoint
    pub fn new(state: ParameterState, metadata: CheckpointMetadata) -> Self {
        Self { state, metadata }
    }
}
