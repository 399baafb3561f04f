mod learning_rate;
mod method;
mod regularization;
mod trainer;

pub use learning_rate::{check_learn_rate_shape, resolve_learn_rates};
pub use method::Method;
pub use regularization::Regularization;
pub use trainer::TrainerConfig;

/// A coefficient per term order of the model: bias, linear and pairwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCoefficients {
    pub bias: f64,
    pub linear: f64,
    pub pairwise: f64,
}

impl TermCoefficients {
    pub fn zero() -> Self {
        Self::broadcast(0.)
    }

    /// Uses the same `value` for every term order.
    pub fn broadcast(value: f64) -> Self {
        Self {
            bias: value,
            linear: value,
            pairwise: value,
        }
    }
}
