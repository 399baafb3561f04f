use super::TermCoefficients;
use crate::error::{FmError, Result};

/// Checks the length of a raw learning-rate vector.
pub fn check_learn_rate_shape(raw: &[f64]) -> Result<()> {
    match raw.len() {
        1 | 3 => Ok(()),
        got => Err(FmError::LearningRateShape { got }),
    }
}

/// Resolves a raw learning-rate vector into per-term-order rates: a single value is
/// broadcast, three values set the bias, linear and pairwise rates in that order.
pub fn resolve_learn_rates(raw: &[f64]) -> Result<TermCoefficients> {
    match *raw {
        [rate] => Ok(TermCoefficients::broadcast(rate)),
        [bias, linear, pairwise] => Ok(TermCoefficients {
            bias,
            linear,
            pairwise,
        }),
        _ => Err(FmError::LearningRateShape { got: raw.len() }),
    }
}
