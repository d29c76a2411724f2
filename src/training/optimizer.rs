/// Adam optimizer with L2 weight decay
///
/// The decay term is folded into the gradient before the moment estimates
/// are updated (`g ← g + λθ`), so it is scaled by the adaptive step like the
/// rest of the gradient. candle-nn's `AdamW` applies decay to the parameter
/// directly instead.
use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::Optimizer;

/// Adam optimizer configuration
#[derive(Debug, Clone)]
pub struct ParamsAdam {
    /// Learning rate
    pub lr: f64,
    /// Coefficient for computing running averages of gradient (beta1)
    pub beta1: f64,
    /// Coefficient for computing running averages of squared gradient (beta2)
    pub beta2: f64,
    /// Term added to denominator for numerical stability
    pub eps: f64,
    /// L2 penalty coefficient
    pub weight_decay: f64,
}

impl Default for ParamsAdam {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

/// Parameter and its moment estimates
#[derive(Debug)]
struct VarAdam {
    var: Var,
    /// First moment estimate (exponential moving average of gradients)
    m: Var,
    /// Second moment estimate (exponential moving average of squared gradients)
    v: Var,
}

/// Adam optimizer
pub struct Adam {
    vars: Vec<VarAdam>,
    step_t: usize,
    params: ParamsAdam,
}

impl Adam {
    /// Number of steps applied so far
    pub fn step_count(&self) -> usize {
        self.step_t
    }
}

impl Optimizer for Adam {
    type Config = ParamsAdam;

    fn new(vars: Vec<Var>, params: ParamsAdam) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let m = Var::zeros(var.shape(), var.dtype(), var.device())?;
                let v = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarAdam { var, m, v })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            vars,
            step_t: 0,
            params,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;

        let ParamsAdam {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.params;

        // Bias corrections
        let scale_m = 1.0 / (1.0 - beta1.powi(self.step_t as i32));
        let scale_v = 1.0 / (1.0 - beta2.powi(self.step_t as i32));

        for state in self.vars.iter() {
            let theta = &state.var;
            let Some(grad) = grads.get(theta.as_tensor()) else {
                continue;
            };

            let grad = if weight_decay > 0.0 {
                (grad + (theta.as_tensor() * weight_decay)?)?
            } else {
                grad.clone()
            };

            // m = beta1 * m + (1 - beta1) * g
            let next_m = ((state.m.as_tensor() * beta1)? + (&grad * (1.0 - beta1))?)?;
            // v = beta2 * v + (1 - beta2) * g^2
            let next_v = ((state.v.as_tensor() * beta2)? + (grad.sqr()? * (1.0 - beta2))?)?;

            let m_hat = (&next_m * scale_m)?;
            let v_hat = (&next_v * scale_v)?;

            // theta = theta - lr * m_hat / (sqrt(v_hat) + eps)
            let update = ((m_hat / (v_hat.sqrt()? + eps)?)? * lr)?;
            let next_theta = (theta.as_tensor() - update)?;

            state.m.set(&next_m)?;
            state.v.set(&next_v)?;
            theta.set(&next_theta)?;
        }

        Ok(())
    }
}
