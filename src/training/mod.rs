/// Training infrastructure: optimizer, early stopping, evaluation and the training loop
pub mod checkpoint;
pub mod early_stopping;
pub mod evaluator;
pub mod optimizer;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointMetadata, ParameterState};
pub use early_stopping::{EarlyStopping, Observation};
pub use evaluator::{evaluate_model, evaluate_tensors, RegressionMetrics};
pub use optimizer::{Adam, ParamsAdam};
pub use trainer::{train_model, EpochRecord, Trainer, TrainingReport};
