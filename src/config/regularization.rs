use ndarray::{Array1, Array2};

use super::{Method, TermCoefficients};
use crate::error::{FmError, Result};

/// Resolved regularization coefficients.
#[derive(Debug, Clone, PartialEq)]
pub enum Regularization {
    /// One coefficient per term order, shared by every attribute.
    Uniform(TermCoefficients),
    /// A bias coefficient plus per-group linear and per-group-per-factor pairwise
    /// coefficients. The resolver produces it for mcmc only, adaptive sgd expands into it.
    Grouped {
        bias: f64,
        linear: Array1<f64>,
        pairwise: Array2<f64>,
    },
}

impl Regularization {
    /// Checks what can be checked about a raw regularization vector before the attribute
    /// groups are known.
    ///
    /// Lengths 0, 1 and 3 are always accepted. For mcmc any odd length of at least 5 is let
    /// through, since it may match `1 + 2 * groups` once the groups are known.
    pub fn check_shape(method: Method, len: usize) -> Result<()> {
        match len {
            0 | 1 | 3 => Ok(()),
            n if method == Method::Mcmc && n >= 5 && n % 2 == 1 => Ok(()),
            got => Err(FmError::RegularizationShape {
                method: method.name(),
                got,
                groups: None,
            }),
        }
    }

    /// Resolves a raw regularization vector into coefficients.
    ///
    /// # Arguments
    /// * `method` - The learning method, only mcmc accepts the grouped form.
    /// * `raw` - The raw values: empty, one broadcast value, `[bias, linear, pairwise]`, or
    ///   for mcmc `[bias, linear_0 .. linear_G, pairwise_0 .. pairwise_G]`.
    /// * `num_groups` - The number of attribute groups.
    /// * `num_factor` - The number of factor columns a pairwise group value is broadcast to.
    ///
    /// # Returns
    /// The coefficients, or an error naming the accepted lengths.
    pub fn resolve(
        method: Method,
        raw: &[f64],
        num_groups: usize,
        num_factor: usize,
    ) -> Result<Self> {
        match *raw {
            [] => Ok(Self::Uniform(TermCoefficients::zero())),
            [value] => Ok(Self::Uniform(TermCoefficients::broadcast(value))),
            [bias, linear, pairwise] => Ok(Self::Uniform(TermCoefficients {
                bias,
                linear,
                pairwise,
            })),
            _ if method == Method::Mcmc && raw.len() == 1 + 2 * num_groups => {
                let (linear, pairwise) = raw[1..].split_at(num_groups);
                let linear = Array1::from_iter(linear.iter().copied());
                let pairwise =
                    Array2::from_shape_fn((num_groups, num_factor), |(g, _)| pairwise[g]);

                Ok(Self::Grouped {
                    bias: raw[0],
                    linear,
                    pairwise,
                })
            }
            _ => Err(FmError::RegularizationShape {
                method: method.name(),
                got: raw.len(),
                groups: (method == Method::Mcmc).then_some(num_groups),
            }),
        }
    }

    /// Returns the grouped form of these coefficients, one slot per group and factor.
    pub fn expand(&self, num_groups: usize, num_factor: usize) -> Self {
        match self {
            Self::Uniform(coefficients) => Self::Grouped {
                bias: coefficients.bias,
                linear: Array1::from_elem(num_groups, coefficients.linear),
                pairwise: Array2::from_elem((num_groups, num_factor), coefficients.pairwise),
            },
            grouped => grouped.clone(),
        }
    }

    pub fn bias(&self) -> f64 {
        match self {
            Self::Uniform(coefficients) => coefficients.bias,
            Self::Grouped { bias, .. } => *bias,
        }
    }

    /// Returns the linear coefficient for attributes of `group`.
    pub fn linear(&self, group: usize) -> f64 {
        match self {
            Self::Uniform(coefficients) => coefficients.linear,
            Self::Grouped { linear, .. } => linear[group],
        }
    }

    /// Returns the pairwise coefficient for factor `factor` of attributes of `group`.
    pub fn pairwise(&self, group: usize, factor: usize) -> f64 {
        match self {
            Self::Uniform(coefficients) => coefficients.pairwise,
            Self::Grouped { pairwise, .. } => pairwise[[group, factor]],
        }
    }
}
