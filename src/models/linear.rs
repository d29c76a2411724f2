/// Linear regression head
use candle_core::{Module, Result, Tensor};
use candle_nn::{Init, Linear, VarBuilder};

/// Single-output linear layer: `y = x Wᵀ + b`
///
/// Parameters are registered as `weight` `[1, in_features]` and, when
/// enabled, `bias` `[1]`.
pub struct LinearRegressor {
    linear: Linear,
}

impl LinearRegressor {
    /// Create with candle-nn's default initialization
    ///
    /// Kaiming-normal weights and a uniform bias bounded by `1/sqrt(in_features)`.
    pub fn new(in_features: usize, bias: bool, vb: VarBuilder) -> Result<Self> {
        Self::with_init(in_features, bias, candle_nn::init::DEFAULT_KAIMING_NORMAL, vb)
    }

    /// Create with an explicit weight initializer
    pub fn with_init(in_features: usize, bias: bool, init_ws: Init, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints((1, in_features), "weight", init_ws)?;

        let bias = if bias {
            let bound = 1. / (in_features as f64).sqrt();
            let init_bs = Init::Uniform { lo: -bound, up: bound };
            Some(vb.get_with_hints(1, "bias", init_bs)?)
        } else {
            None
        };

        Ok(Self {
            linear: Linear::new(weight, bias),
        })
    }
}

impl Module for LinearRegressor {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.linear.forward(xs)
    }
}
