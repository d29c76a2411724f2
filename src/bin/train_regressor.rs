/// Train a linear regressor on CSV data with early stopping
use std::path::PathBuf;

use candle_core::{DType, Device};
use clap::Parser;
use tabular_trainer::data::{read_csv, split_target};
use tabular_trainer::{DeviceSelector, LinearRegressor, RegressionModel, Trainer, TrainingConfig};

#[derive(Parser, Debug)]
#[command(name = "train-regressor", about = "Train a regression model with early stopping")]
struct Args {
    /// Training CSV
    #[arg(long)]
    train: PathBuf,

    /// Validation CSV
    #[arg(long)]
    val: PathBuf,

    /// Target column name
    #[arg(long)]
    target: String,

    /// JSON training config; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    patience: Option<usize>,

    #[arg(long)]
    weight_decay: Option<f64>,

    /// auto, cpu, cuda[:N] or metal[:N]
    #[arg(long)]
    device: Option<DeviceSelector>,

    /// Shuffle seed
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(patience) = self.patience {
            config.patience = patience;
        }
        if let Some(weight_decay) = self.weight_decay {
            config.weight_decay = weight_decay;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.training_config()?;

    log::info!("Loading training data from: {}", args.train.display());
    let (x_train, y_train) = split_target(&read_csv(&args.train)?, &args.target)?;
    log::info!("Loading validation data from: {}", args.val.display());
    let (x_val, y_val) = split_target(&read_csv(&args.val)?, &args.target)?;

    let n_features = x_train.width();
    log::info!("Dataset loaded:");
    log::info!("  - Training rows: {}", x_train.height());
    log::info!("  - Validation rows: {}", x_val.height());
    log::info!("  - Features: {}", n_features);

    log::info!("Training configuration:");
    log::info!("  - Epochs: {}", config.epochs);
    log::info!("  - Batch size: {}", config.batch_size);
    log::info!("  - Learning rate: {:.6}", config.learning_rate);
    log::info!("  - Patience: {}", config.patience);
    log::info!("  - Weight decay: {}", config.weight_decay);
    log::info!("  - Device: {}", config.device);

    // Parameters are created on CPU; the trainer moves them to the configured device
    let mut model = RegressionModel::new(
        move |vb| LinearRegressor::new(n_features, true, vb),
        DType::F32,
        &Device::Cpu,
    )?;

    let mut trainer = Trainer::new(config)?;
    let report = trainer.fit(&mut model, &x_train, &y_train, &x_val, &y_val)?;

    log::info!("=== Training Complete ===");
    log::info!("  - Epochs run: {}", report.epochs_run);
    log::info!("  - Stopped early: {}", report.stopped_early);
    log::info!("  - Optimizer steps: {}", report.optimizer_steps);
    log::info!("  - Best epoch: {}", report.best_epoch + 1);
    log::info!("  - Best val MSE: {:.6}", report.best_val_mse);
    if let Some(best) = report.history.get(report.best_epoch) {
        log::info!("  - Best val RMSE: {:.6}", best.val_rmse);
        log::info!("  - Best val R²: {:.6}", best.val_r2);
    }

    for name in report.state.names() {
        if let Some(tensor) = report.state.get(&name) {
            log::info!("  - {}: {:?}", name, tensor.dims());
        }
    }

    Ok(())
}
