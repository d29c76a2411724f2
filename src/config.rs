/// Configuration for a training run
///
/// Every field has a default, so a JSON config file only needs the options it
/// overrides.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use candle_core::Device;

/// Compute device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelector {
    /// CUDA if available, then Metal, then CPU
    #[default]
    Auto,
    Cpu,
    /// CUDA device ordinal
    Cuda(usize),
    /// Metal device ordinal
    Metal(usize),
}

impl DeviceSelector {
    /// Resolve to a concrete candle device
    pub fn resolve(&self) -> crate::Result<Device> {
        let device = match *self {
            DeviceSelector::Auto => auto_device(),
            DeviceSelector::Cpu => Device::Cpu,
            DeviceSelector::Cuda(ordinal) => Device::new_cuda(ordinal)?,
            DeviceSelector::Metal(ordinal) => Device::new_metal(ordinal)?,
        };
        Ok(device)
    }
}

/// Prefer an accelerator when one is compiled in and opens, else CPU
pub fn auto_device() -> Device {
    if candle_core::utils::cuda_is_available() {
        if let Some(device) = opened("CUDA", Device::new_cuda(0)) {
            return device;
        }
    }
    if candle_core::utils::metal_is_available() {
        if let Some(device) = opened("Metal", Device::new_metal(0)) {
            return device;
        }
    }
    Device::Cpu
}

fn opened(kind: &str, device: candle_core::Result<Device>) -> Option<Device> {
    match device {
        Ok(device) => Some(device),
        Err(err) => {
            log::warn!("{} device unavailable, falling back: {}", kind, err);
            None
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Auto => write!(f, "auto"),
            DeviceSelector::Cpu => write!(f, "cpu"),
            DeviceSelector::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            DeviceSelector::Metal(ordinal) => write!(f, "metal:{ordinal}"),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = crate::TrainError;

    /// Accepts `auto`, `cpu`, `cuda`, `cuda:N`, `metal`, `metal:N`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match lowered.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal.parse::<usize>().map_err(|_| {
                    crate::TrainError::Config(format!("Invalid device ordinal in '{s}'"))
                })?;
                (kind, Some(ordinal))
            }
            None => (lowered.as_str(), None),
        };

        match (kind, ordinal) {
            ("auto", None) => Ok(DeviceSelector::Auto),
            ("cpu", None) => Ok(DeviceSelector::Cpu),
            ("cuda", ordinal) => Ok(DeviceSelector::Cuda(ordinal.unwrap_or(0))),
            ("metal", ordinal) => Ok(DeviceSelector::Metal(ordinal.unwrap_or(0))),
            _ => Err(crate::TrainError::Config(format!(
                "Invalid device: {s}. Must be 'auto', 'cpu', 'cuda[:N]' or 'metal[:N]'"
            ))),
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of passes over the training set
    pub epochs: usize,

    /// Mini-batch size
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Epochs without validation improvement before stopping
    pub patience: usize,

    /// L2 penalty added to the gradient
    pub weight_decay: f64,

    /// Compute device
    pub device: DeviceSelector,

    /// Seed for mini-batch shuffling; entropy-seeded when unset
    pub seed: Option<u64>,

    /// Emit a progress record every N epochs
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: 10,
            weight_decay: 1e-5,
            device: DeviceSelector::Auto,
            seed: None,
            log_every: 10,
        }
    }
}

impl TrainingConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.epochs == 0 {
            return Err(crate::TrainError::Config(
                "epochs must be > 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(crate::TrainError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(crate::TrainError::Config(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }

        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(crate::TrainError::Config(format!(
                "weight_decay must be a non-negative finite number, got {}",
                self.weight_decay
            )));
        }

        if self.log_every == 0 {
            return Err(crate::TrainError::Config(
                "log_every must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
