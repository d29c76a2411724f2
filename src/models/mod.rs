/// Regression model handle
use candle_core::{DType, Device, ModuleT, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use std::collections::HashMap;
use std::sync::Arc;

use crate::training::ParameterState;
use crate::utils::count_parameters;
use crate::TrainError;

pub mod linear;

pub use linear::LinearRegressor;

type ModuleBuilder<M> = dyn Fn(VarBuilder) -> candle_core::Result<M> + Send + Sync;

/// A differentiable module together with its trainable parameters
///
/// The module is built from a `VarBuilder` backed by the handle's own
/// `VarMap`, so its parameters can be listed, snapshotted and restored by
/// name. Keeping the builder lets the handle re-instantiate the module on
/// another device and carry the current parameter values across.
pub struct RegressionModel<M> {
    module: M,
    varmap: VarMap,
    builder: Arc<ModuleBuilder<M>>,
    dtype: DType,
    device: Device,
}

impl<M: ModuleT> RegressionModel<M> {
    /// Build the module on `device`
    ///
    /// # Arguments
    /// * `builder` - Creates the module's parameters through the given `VarBuilder`
    /// * `dtype` - Parameter dtype
    /// * `device` - Device the parameters live on
    pub fn new<F>(builder: F, dtype: DType, device: &Device) -> crate::Result<Self>
    where
        F: Fn(VarBuilder) -> candle_core::Result<M> + Send + Sync + 'static,
    {
        let builder: Arc<ModuleBuilder<M>> = Arc::new(builder);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let module = builder(vb)?;

        Ok(Self {
            module,
            varmap,
            builder,
            dtype,
            device: device.clone(),
        })
    }

    /// Forward pass; `train` enables training-only behavior such as dropout
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.module.forward_t(xs, train)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Trainable variables, for handing to an optimizer
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.varmap
            .all_vars()
            .iter()
            .map(|var| count_parameters(var.as_tensor()))
            .sum()
    }

    /// Place the module on `device`, keeping current parameter values
    pub fn to_device(&mut self, device: &Device) -> crate::Result<()> {
        if self.device.same_device(device) {
            return Ok(());
        }

        log::debug!("Moving model from {:?} to {:?}", self.device, device);

        let state = self.state_dict()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, self.dtype, device);
        let module = (self.builder)(vb)?;

        self.module = module;
        self.varmap = varmap;
        self.device = device.clone();
        self.load_state_dict(&state)
    }

    /// Deep copy of every parameter, keyed by name
    ///
    /// The copies own their storage, so later optimizer steps do not
    /// change a snapshot.
    pub fn state_dict(&self) -> crate::Result<ParameterState> {
        let mut tensors = HashMap::new();
        for (name, var) in self.named_vars()? {
            tensors.insert(name, var.as_tensor().detach().copy()?);
        }
        Ok(ParameterState::new(tensors))
    }

    /// Overwrite every parameter in place from `state`
    ///
    /// The names in `state` must match the model's parameters exactly.
    pub fn load_state_dict(&self, state: &ParameterState) -> crate::Result<()> {
        let vars = self.named_vars()?;

        if let Some(extra) = state
            .names()
            .into_iter()
            .find(|name| !vars.iter().any(|(var_name, _)| var_name == name))
        {
            return Err(TrainError::State(format!(
                "unexpected parameter '{}' in state",
                extra
            )));
        }

        for (name, var) in &vars {
            let tensor = state.get(name).ok_or_else(|| {
                TrainError::State(format!("missing parameter '{}' in state", name))
            })?;

            if tensor.dims() != var.dims() {
                return Err(TrainError::State(format!(
                    "shape mismatch for '{}': model {:?}, state {:?}",
                    name,
                    var.dims(),
                    tensor.dims()
                )));
            }

            let value = tensor.to_device(&self.device)?.to_dtype(self.dtype)?;
            var.set(&value)?;
        }

        Ok(())
    }

    /// Variables sorted by name
    fn named_vars(&self) -> crate::Result<Vec<(String, Var)>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| TrainError::State("parameter store lock poisoned".to_string()))?;

        let mut vars: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(vars)
    }
}
