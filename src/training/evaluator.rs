/// Held-out evaluation: MSE, RMSE and R²
use candle_core::{DType, Device, ModuleT, Tensor};
use polars::prelude::{DataFrame, Series};

use crate::config::auto_device;
use crate::data::TabularDataset;
use crate::models::RegressionModel;
use crate::utils::as_sequence_input;
use crate::TrainError;

/// Regression accuracy on one dataset
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error
    pub mse: f64,
    /// Square root of `mse`
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compute metrics from paired predictions and targets
    ///
    /// R² = 1 − SS_res / SS_tot. Constant targets have SS_tot = 0; R² is then
    /// 1.0 for a perfect fit and 0.0 otherwise.
    pub fn compute(predictions: &[f32], targets: &[f32]) -> crate::Result<Self> {
        if predictions.len() != targets.len() {
            return Err(TrainError::Shape(format!(
                "Predictions and targets must have same length: {} vs {}",
                predictions.len(),
                targets.len()
            )));
        }

        if targets.is_empty() {
            return Err(TrainError::Shape(
                "Cannot evaluate on an empty dataset".to_string(),
            ));
        }

        let n = targets.len() as f64;
        let mean = targets.iter().map(|&t| t as f64).sum::<f64>() / n;

        let ss_res: f64 = predictions
            .iter()
            .zip(targets)
            .map(|(&p, &t)| (t as f64 - p as f64).powi(2))
            .sum();
        let ss_tot: f64 = targets.iter().map(|&t| (t as f64 - mean).powi(2)).sum();

        let mse = ss_res / n;
        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            r2,
        })
    }
}

/// Evaluate `model` on a validation frame
///
/// # Arguments
/// * `model` - Model to evaluate; placed on the resolved device
/// * `features` - Validation features
/// * `target` - Validation target
/// * `device` - Explicit device; CUDA, then Metal, then CPU when `None`
///
/// # Returns
/// MSE, RMSE and R² of the model's predictions
pub fn evaluate_model<M: ModuleT>(
    model: &mut RegressionModel<M>,
    features: &DataFrame,
    target: &Series,
    device: Option<&Device>,
) -> crate::Result<RegressionMetrics> {
    let device = match device {
        Some(device) => device.clone(),
        None => auto_device(),
    };
    model.to_device(&device)?;

    let dataset = TabularDataset::from_frame(features, target)?;
    let (features, targets) = dataset.to_tensors(&device)?;
    evaluate_tensors(model, &features, &targets)
}

/// Evaluate on validation tensors already on the model's device
///
/// Runs the forward pass in inference mode and detaches the predictions, so
/// neither parameters nor gradient state are touched.
pub fn evaluate_tensors<M: ModuleT>(
    model: &RegressionModel<M>,
    features: &Tensor,
    targets: &Tensor,
) -> crate::Result<RegressionMetrics> {
    log::info!("Starting model evaluation");

    let inputs = as_sequence_input(&features.to_dtype(model.dtype())?)?;
    let predictions = model
        .forward_t(&inputs, false)?
        .detach()
        .flatten_all()?
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()?;
    let targets = targets.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;

    let metrics = RegressionMetrics::compute(&predictions, &targets)?;

    log::info!(
        "Evaluation results - MSE: {:.4}, RMSE: {:.4}, R²: {:.4}",
        metrics.mse,
        metrics.rmse,
        metrics.r2
    );
    Ok(metrics)
}
