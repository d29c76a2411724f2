/// Tensor helpers shared by training and evaluation
use candle_core::{Result, Tensor};

/// Calculate the number of parameters in a tensor
pub fn count_parameters(tensor: &Tensor) -> usize {
    tensor.dims().iter().product()
}

/// Insert a singleton sequence axis into `[samples, features]` input
///
/// Sequence models expect `[samples, seq_len, features]`; tabular rows are
/// sequences of length one. Tensors of any other rank pass through unchanged.
pub fn as_sequence_input(features: &Tensor) -> Result<Tensor> {
    if features.rank() == 2 {
        features.unsqueeze(1)
    } else {
        Ok(features.clone())
    }
}
