use std::{
    fmt::{self, Display},
    str::FromStr,
};

use crate::error::FmError;

/// The learning method a trainer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Stochastic gradient descent.
    Sgd,
    /// Stochastic gradient descent tuning its regularization on a validation set.
    SgdAdaptive,
    /// Markov chain Monte Carlo, Gibbs sampling of the posterior.
    Mcmc,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Sgd => "sgd",
            Method::SgdAdaptive => "sgda",
            Method::Mcmc => "mcmc",
        }
    }

    /// Whether the method is driven by learning rates.
    pub fn uses_learn_rate(&self) -> bool {
        matches!(self, Method::Sgd | Method::SgdAdaptive)
    }
}

impl FromStr for Method {
    type Err = FmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sgd" => Ok(Method::Sgd),
            "sgda" => Ok(Method::SgdAdaptive),
            "mcmc" => Ok(Method::Mcmc),
            other => Err(FmError::UnknownMethod(other.to_string())),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        for method in [Method::Sgd, Method::SgdAdaptive, Method::Mcmc] {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("als".parse::<Method>().is_err());
        assert!("SGD".parse::<Method>().is_err());
    }
}
