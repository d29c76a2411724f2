/// Early-stopping training loop for regression models
use candle_core::{DType, ModuleT, Tensor};
use candle_nn::Optimizer;
use polars::prelude::{DataFrame, Series};

use super::checkpoint::{Checkpoint, CheckpointMetadata, ParameterState};
use super::early_stopping::{EarlyStopping, Observation};
use super::evaluator::evaluate_tensors;
use super::optimizer::{Adam, ParamsAdam};
use crate::config::TrainingConfig;
use crate::data::{validate_dataset, BatchDataLoader, TabularDataLoader, TabularDataset};
use crate::models::RegressionModel;
use crate::utils::as_sequence_input;
use crate::TrainError;

/// One epoch's numbers
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EpochRecord {
    /// Zero-based epoch index
    pub epoch: usize,
    /// Mean mini-batch loss
    pub train_loss: f64,
    pub val_mse: f64,
    pub val_rmse: f64,
    pub val_r2: f64,
    /// Validation MSE beat every earlier epoch
    pub improved: bool,
}

/// Result of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Parameters restored to the best epoch
    pub state: ParameterState,
    /// Epoch the restored parameters come from
    pub best_epoch: usize,
    pub best_val_mse: f64,
    /// Epochs actually run
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub optimizer_steps: usize,
    pub history: Vec<EpochRecord>,
}

/// Trainer for regression models
pub struct Trainer {
    config: TrainingConfig,
    optimizer_steps: usize,
}

impl Trainer {
    /// Create new trainer; fails on an invalid configuration
    pub fn new(config: TrainingConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            optimizer_steps: 0,
        })
    }

    /// Optimizer steps taken by the most recent `fit`
    pub fn optimizer_steps(&self) -> usize {
        self.optimizer_steps
    }

    /// Train `model`, then restore its best-validation parameters
    ///
    /// # Arguments
    /// * `model` - Model to train in place
    /// * `x_train`, `y_train` - Training split
    /// * `x_val`, `y_val` - Validation split, evaluated after every epoch
    ///
    /// # Returns
    /// Report holding the restored parameter state and per-epoch history
    pub fn fit<M: ModuleT>(
        &mut self,
        model: &mut RegressionModel<M>,
        x_train: &DataFrame,
        y_train: &Series,
        x_val: &DataFrame,
        y_val: &Series,
    ) -> crate::Result<TrainingReport> {
        log::info!("Starting model training");
        self.optimizer_steps = 0;

        validate_dataset(x_train, y_train)?;
        validate_dataset(x_val, y_val)?;

        let device = self.config.device.resolve()?;
        log::info!("Using device: {:?}", device);
        model.to_device(&device)?;

        let train = TabularDataset::from_frame(x_train, y_train)?;
        let val = TabularDataset::from_frame(x_val, y_val)?;
        if train.num_features() != val.num_features() {
            return Err(TrainError::Shape(format!(
                "Training has {} features but validation has {}",
                train.num_features(),
                val.num_features()
            )));
        }
        log::debug!("Feature columns: {:?}", train.feature_names());
        let (val_features, val_targets) = val.to_tensors(&device)?;

        let mut loader = TabularDataLoader::new(
            train,
            self.config.batch_size,
            true,
            self.config.seed,
        );

        let mut optimizer = Adam::new(
            model.trainable_vars(),
            ParamsAdam {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )?;

        log::info!(
            "Training {} parameters on {} samples ({} batches per epoch)",
            model.num_parameters(),
            loader.dataset().len(),
            loader.num_batches()
        );

        let epochs = self.config.epochs;
        let mut stopper = EarlyStopping::new(self.config.patience);
        let mut best: Option<Checkpoint> = None;
        let mut history = Vec::new();
        let mut stopped_early = false;

        for epoch in 0..epochs {
            let train_loss = self.train_epoch(model, &mut loader, &mut optimizer, epoch)?;
            let metrics = evaluate_tensors(model, &val_features, &val_targets)?;

            if !metrics.mse.is_finite() {
                log::error!("NaN or Inf detected in validation MSE at epoch {}", epoch);
                return Err(TrainError::NumericalInstability { epoch });
            }

            let improved = match stopper.observe(metrics.mse) {
                Observation::Improved => {
                    let metadata = CheckpointMetadata {
                        epoch,
                        train_loss,
                        val_mse: metrics.mse,
                    };
                    best = Some(Checkpoint::new(model.state_dict()?, metadata));
                    log::info!(
                        "Validation loss improved to {:.4}. Saving model...",
                        metrics.mse
                    );
                    true
                }
                Observation::NoImprovement(count) => {
                    log::info!("No improvement in validation loss for {} epochs.", count);
                    false
                }
            };

            history.push(EpochRecord {
                epoch,
                train_loss,
                val_mse: metrics.mse,
                val_rmse: metrics.rmse,
                val_r2: metrics.r2,
                improved,
            });

            stopped_early = stopper.should_stop();

            if epoch % self.config.log_every == 0 || epoch + 1 == epochs || stopped_early {
                log::info!(
                    "Epoch [{}/{}], Loss: {:.4}, Val MSE: {:.4}",
                    epoch + 1,
                    epochs,
                    train_loss,
                    metrics.mse
                );
            }

            if stopped_early {
                log::info!("Early stopping triggered.");
                break;
            }
        }

        let best = best.ok_or_else(|| {
            TrainError::State("no improving epoch recorded; nothing to restore".to_string())
        })?;
        model.load_state_dict(&best.state)?;

        log::info!(
            "Training completed: restored epoch {} (val MSE {:.4}) after {} epochs{}",
            best.metadata.epoch + 1,
            best.metadata.val_mse,
            history.len(),
            if stopped_early { " with early stopping" } else { "" }
        );

        Ok(TrainingReport {
            state: model.state_dict()?,
            best_epoch: best.metadata.epoch,
            best_val_mse: best.metadata.val_mse,
            epochs_run: history.len(),
            stopped_early,
            optimizer_steps: self.optimizer_steps,
            history,
        })
    }

    /// Train for one epoch, returning the mean batch loss
    fn train_epoch<M: ModuleT>(
        &mut self,
        model: &RegressionModel<M>,
        loader: &mut impl BatchDataLoader,
        optimizer: &mut Adam,
        epoch: usize,
    ) -> crate::Result<f64> {
        let device = model.device().clone();
        let mut total_loss = 0.0;
        let mut num_batches = 0usize;

        loader.reset();

        while let Some((features, targets)) = loader.next_batch(&device)? {
            let loss = self.train_step(model, optimizer, &features, &targets, epoch)?;
            total_loss += loss;
            num_batches += 1;

            log::debug!("Epoch {} batch {}: loss={:.6}", epoch + 1, num_batches, loss);
        }

        if num_batches == 0 {
            return Err(TrainError::Shape("training loader yielded no batches".to_string()));
        }

        Ok(total_loss / num_batches as f64)
    }

    /// Forward, loss, backward and update on one batch
    fn train_step<M: ModuleT>(
        &mut self,
        model: &RegressionModel<M>,
        optimizer: &mut Adam,
        features: &Tensor,
        targets: &Tensor,
        epoch: usize,
    ) -> crate::Result<f64> {
        let inputs = as_sequence_input(&features.to_dtype(model.dtype())?)?;
        let targets = targets.to_dtype(model.dtype())?;

        let outputs = model.forward_t(&inputs, true)?.flatten_all()?;
        let loss = candle_nn::loss::mse(&outputs, &targets)?;

        let loss_val = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        if !loss_val.is_finite() {
            log::error!("NaN or Inf detected in loss at epoch {}", epoch);
            return Err(TrainError::NumericalInstability { epoch });
        }

        // Gradients come fresh from each backward pass; nothing to zero
        optimizer.backward_step(&loss)?;
        self.optimizer_steps += 1;

        Ok(loss_val)
    }
}

/// Train with `config` and return the restored best parameter state
pub fn train_model<M: ModuleT>(
    model: &mut RegressionModel<M>,
    x_train: &DataFrame,
    y_train: &Series,
    x_val: &DataFrame,
    y_val: &Series,
    config: &TrainingConfig,
) -> crate::Result<ParameterState> {
    let mut trainer = Trainer::new(config.clone())?;
    let report = trainer.fit(model, x_train, y_train, x_val, y_val)?;
    Ok(report.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSelector;
    use crate::models::LinearRegressor;
    use crate::training::evaluate_model;
    use candle_core::{Device, Module};
    use candle_nn::{Init, VarBuilder};
    use polars::prelude::NamedFrom;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// `y = 2x` sampled at `n` evenly spaced points in [0, 1)
    fn doubling_line(n: usize, offset: f64) -> (DataFrame, Series) {
        let xs: Vec<f64> = (0..n).map(|i| (i as f64 + offset) / n as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x).collect();
        let features = DataFrame::new(vec![Series::new("x", xs)]).unwrap();
        (features, Series::new("y", ys))
    }

    fn cpu_config() -> TrainingConfig {
        TrainingConfig {
            device: DeviceSelector::Cpu,
            seed: Some(0),
            ..Default::default()
        }
    }

    fn zero_linear() -> crate::Result<RegressionModel<LinearRegressor>> {
        RegressionModel::new(
            |vb| LinearRegressor::with_init(1, false, Init::Const(0.0), vb),
            DType::F32,
            &Device::Cpu,
        )
    }

    /// Output ignores both input and parameter, so validation loss never moves
    struct ConstantModel {
        offset: Tensor,
    }

    impl ConstantModel {
        fn new(vb: VarBuilder) -> candle_core::Result<Self> {
            let offset = vb.get_with_hints(1, "offset", Init::Const(0.0))?;
            Ok(Self { offset })
        }
    }

    impl Module for ConstantModel {
        fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
            self.offset.affine(0.0, 0.0)?.broadcast_as(xs.dim(0)?)
        }
    }

    fn constant_model() -> crate::Result<RegressionModel<ConstantModel>> {
        RegressionModel::new(ConstantModel::new, DType::F32, &Device::Cpu)
    }

    #[test]
    fn test_linear_target_converges() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(100, 0.0);
        let (x_val, y_val) = doubling_line(20, 0.5);
        let config = TrainingConfig {
            epochs: 50,
            patience: 5,
            learning_rate: 0.01,
            // 32 leaves too few Adam steps per epoch to reach 1e-2 within 50 epochs
            batch_size: 10,
            ..cpu_config()
        };

        let mut model = zero_linear()?;
        let mut trainer = Trainer::new(config)?;
        let report = trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

        assert!(report.best_val_mse < 1e-2, "val MSE {}", report.best_val_mse);
        assert!(report.optimizer_steps > 0);
        assert_eq!(report.optimizer_steps, trainer.optimizer_steps());

        let weight = report.state.get("weight").unwrap().flatten_all()?.to_vec1::<f32>()?;
        assert!((weight[0] - 2.0).abs() < 0.2, "weight {}", weight[0]);
        Ok(())
    }

    #[test]
    fn test_returned_state_is_lowest_val_mse_epoch() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(60, 0.0);
        let (x_val, y_val) = doubling_line(15, 0.5);
        let config = TrainingConfig {
            epochs: 30,
            patience: 4,
            learning_rate: 0.05,
            batch_size: 8,
            ..cpu_config()
        };

        let mut model = RegressionModel::new(
            |vb| LinearRegressor::new(1, true, vb),
            DType::F32,
            &Device::Cpu,
        )?;
        let report = Trainer::new(config)?.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

        let (argmin, min) = report
            .history
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best_i, best), (i, rec)| {
                if rec.val_mse < best {
                    (i, rec.val_mse)
                } else {
                    (best_i, best)
                }
            });
        assert_eq!(report.best_epoch, argmin);
        assert_eq!(report.best_val_mse, min);
        assert!(report.history[argmin].improved);

        let metrics = evaluate_model(&mut model, &x_val, &y_val, Some(&Device::Cpu))?;
        assert!((metrics.mse - min).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_stops_after_patience_without_improvement() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(20, 0.0);
        let (x_val, y_val) = doubling_line(5, 0.5);
        let config = TrainingConfig {
            epochs: 20,
            patience: 3,
            batch_size: 4,
            ..cpu_config()
        };

        let mut model = constant_model()?;
        let report = Trainer::new(config)?.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

        assert!(report.stopped_early);
        assert_eq!(report.epochs_run, 1 + 3);
        assert_eq!(report.best_epoch, 0);
        assert!(report.history[0].improved);
        assert!(report.history[1..].iter().all(|rec| !rec.improved));
        Ok(())
    }

    #[test]
    fn test_epoch_limit_bounds_patience() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(20, 0.0);
        let (x_val, y_val) = doubling_line(5, 0.5);
        let config = TrainingConfig {
            epochs: 2,
            patience: 3,
            ..cpu_config()
        };

        let mut model = constant_model()?;
        let report = Trainer::new(config)?.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

        assert!(!report.stopped_early);
        assert_eq!(report.epochs_run, 2);
        Ok(())
    }

    #[test]
    fn test_nan_target_fails_before_any_step() -> crate::Result<()> {
        let (x_train, _) = doubling_line(100, 0.0);
        let mut ys: Vec<f64> = (0..100).map(|i| 2.0 * i as f64 / 100.0).collect();
        ys[37] = f64::NAN;
        let y_train = Series::new("y", ys);
        let (x_val, y_val) = doubling_line(20, 0.5);

        let mut model = zero_linear()?;
        let before = model.state_dict()?;
        let mut trainer = Trainer::new(cpu_config())?;

        let result = trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val);
        assert!(matches!(result, Err(TrainError::DataIntegrity(_))));
        assert_eq!(trainer.optimizer_steps(), 0);

        let after = model.state_dict()?;
        assert_eq!(
            before.get("weight").unwrap().flatten_all()?.to_vec1::<f32>()?,
            after.get("weight").unwrap().flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn test_non_numeric_feature_fails() -> crate::Result<()> {
        let x_train = polars::df!("x" => &["a", "b", "c"])?;
        let y_train = Series::new("y", &[1.0f64, 2.0, 3.0]);
        let (x_val, y_val) = doubling_line(5, 0.5);

        let mut model = zero_linear()?;
        let mut trainer = Trainer::new(cpu_config())?;

        assert!(matches!(
            trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val),
            Err(TrainError::DataType { .. })
        ));
        assert_eq!(trainer.optimizer_steps(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_validation_split_fails() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(20, 0.0);
        let x_val = polars::df!("x" => &[0.1f64, f64::INFINITY])?;
        let y_val = Series::new("y", &[0.2f64, 0.4]);

        let mut model = zero_linear()?;
        assert!(matches!(
            train_model(&mut model, &x_train, &y_train, &x_val, &y_val, &cpu_config()),
            Err(TrainError::DataIntegrity(_))
        ));
        Ok(())
    }

    #[test]
    fn test_exploding_loss_is_numerical_instability() -> crate::Result<()> {
        // Finite in f64, but the squared error overflows f32
        let x_train = polars::df!("x" => &[1e30f64, 2e30, 3e30, 4e30])?;
        let y_train = Series::new("y", &[1e30f64, 2e30, 3e30, 4e30]);
        let (x_val, y_val) = doubling_line(4, 0.5);

        let mut model = zero_linear()?;
        let mut trainer = Trainer::new(cpu_config())?;

        assert!(matches!(
            trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val),
            Err(TrainError::NumericalInstability { epoch: 0 })
        ));
        assert_eq!(trainer.optimizer_steps(), 0);
        Ok(())
    }

    #[test]
    fn test_feature_count_mismatch() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(10, 0.0);
        let x_val = polars::df!("a" => &[0.1f64, 0.2], "b" => &[0.3f64, 0.4])?;
        let y_val = Series::new("y", &[0.2f64, 0.4]);

        let mut model = zero_linear()?;
        assert!(matches!(
            train_model(&mut model, &x_train, &y_train, &x_val, &y_val, &cpu_config()),
            Err(TrainError::Shape(_))
        ));
        Ok(())
    }

    #[test]
    fn test_zero_epochs_rejected_up_front() {
        let config = TrainingConfig {
            epochs: 0,
            ..cpu_config()
        };
        assert!(matches!(Trainer::new(config), Err(TrainError::Config(_))));
    }

    /// Finite while training, NaN at inference
    struct NanAtInference {
        inner: LinearRegressor,
    }

    impl ModuleT for NanAtInference {
        fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
            let ys = self.inner.forward(xs)?;
            if train {
                Ok(ys)
            } else {
                ys * f64::NAN
            }
        }
    }

    #[test]
    fn test_non_finite_val_mse_is_numerical_instability() -> crate::Result<()> {
        let (x_train, y_train) = doubling_line(8, 0.0);
        let (x_val, y_val) = doubling_line(4, 0.5);
        let config = TrainingConfig {
            batch_size: 4,
            ..cpu_config()
        };

        let mut model = RegressionModel::new(
            |vb| {
                Ok(NanAtInference {
                    inner: LinearRegressor::new(1, true, vb)?,
                })
            },
            DType::F32,
            &Device::Cpu,
        )?;
        let mut trainer = Trainer::new(config)?;

        assert!(matches!(
            trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val),
            Err(TrainError::NumericalInstability { epoch: 0 })
        ));
        // The training epoch itself completed
        assert_eq!(trainer.optimizer_steps(), 2);
        Ok(())
    }

    /// Counts forward passes per mode
    struct ModeCounter {
        inner: LinearRegressor,
        train_calls: Arc<AtomicUsize>,
        eval_calls: Arc<AtomicUsize>,
    }

    impl ModuleT for ModeCounter {
        fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
            let counter = if train { &self.train_calls } else { &self.eval_calls };
            counter.fetch_add(1, Ordering::SeqCst);
            self.inner.forward(xs)
        }
    }

    #[test]
    fn test_training_and_inference_modes() -> crate::Result<()> {
        let train_calls = Arc::new(AtomicUsize::new(0));
        let eval_calls = Arc::new(AtomicUsize::new(0));
        let (t, e) = (train_calls.clone(), eval_calls.clone());

        let mut model = RegressionModel::new(
            move |vb| {
                Ok(ModeCounter {
                    inner: LinearRegressor::new(1, true, vb)?,
                    train_calls: t.clone(),
                    eval_calls: e.clone(),
                })
            },
            DType::F32,
            &Device::Cpu,
        )?;

        let (x_train, y_train) = doubling_line(10, 0.0);
        let (x_val, y_val) = doubling_line(4, 0.5);
        let config = TrainingConfig {
            epochs: 3,
            patience: 10,
            batch_size: 4,
            ..cpu_config()
        };

        let report = Trainer::new(config)?.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

        assert_eq!(report.epochs_run, 3);
        // 10 samples in batches of 4 -> 3 batches per epoch
        assert_eq!(train_calls.load(Ordering::SeqCst), 9);
        assert_eq!(report.optimizer_steps, 9);
        assert_eq!(eval_calls.load(Ordering::SeqCst), 3);
        Ok(())
    }
}
