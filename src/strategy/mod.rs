//! Learning strategies: the numeric side of training a factorization machine.
//!
//! The trainer treats a strategy as a black box behind [`Trainable`]. Which strategy runs
//! is chosen once from a [`StrategyKind`] and dispatched statically through the
//! [`Strategy`] enum, so variant-only state never has to be reached by downcasting.

mod adaptive;
mod eval;
mod mcmc;
mod sgd;

pub use adaptive::AdaptiveSgdLearner;
pub use eval::TargetRange;
pub use mcmc::McmcLearner;
pub use sgd::SgdLearner;

use rand::rngs::StdRng;

use crate::{
    config::{Method, Regularization, TermCoefficients},
    data::Dataset,
    error::Result,
    model::{MetaInfo, ModelParameters, PairwiseInit},
    rlog::RunLog,
};

/// The datasets a strategy learns from, borrowed for the duration of one `learn` call.
#[derive(Debug, Clone, Copy)]
pub struct DataSets<'a> {
    pub train: &'a Dataset,
    pub test: &'a Dataset,
    /// Only read by the adaptive sgd strategy.
    pub validation: Option<&'a Dataset>,
}

/// The contract the trainer expects from a learning strategy.
pub trait Trainable {
    /// Prepares internal buffers for `model`'s shape.
    fn init(&mut self, model: &ModelParameters);

    /// Runs the whole optimization, updating `model` in place.
    ///
    /// # Arguments
    /// * `model` - The parameters to learn, borrowed exclusively while learning.
    /// * `data` - The train, test and optional validation sets.
    /// * `log` - The per-iteration log sink, if any.
    ///
    /// # Errors
    /// Implementations report failures through `FmError`, they never panic on bad data.
    fn learn(
        &mut self,
        model: &mut ModelParameters,
        data: &DataSets<'_>,
        log: Option<&mut RunLog>,
    ) -> Result<()>;

    /// Returns the RMSE of the strategy's predictions on `data`, 0 for an empty dataset.
    fn evaluate(&self, model: &ModelParameters, data: &Dataset) -> f64;

    /// Returns one prediction per case of `data`.
    fn predict(&self, model: &ModelParameters, data: &Dataset) -> Vec<f64>;

    /// Dumps the strategy's configuration.
    fn debug(&self);

    /// The columns this strategy writes to the run log.
    fn log_columns(&self) -> &'static [&'static str];
}

/// The strategy a trainer was configured with, before any dataset is seen.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Sgd {
        num_iter: usize,
    },
    SgdAdaptive {
        num_iter: usize,
    },
    Mcmc {
        num_iter: usize,
        num_eval_cases: Option<usize>,
        sampling: bool,
        multilevel: bool,
    },
}

/// Everything a strategy needs that can only be resolved once the datasets are known.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub meta: MetaInfo,
    pub regularization: Regularization,
    pub learn_rates: TermCoefficients,
    pub num_eval_cases: usize,
    pub target_range: TargetRange,
    pub num_factor: usize,
}

impl StrategyKind {
    pub fn method(&self) -> Method {
        match self {
            StrategyKind::Sgd { .. } => Method::Sgd,
            StrategyKind::SgdAdaptive { .. } => Method::SgdAdaptive,
            StrategyKind::Mcmc { .. } => Method::Mcmc,
        }
    }

    /// How the factor matrix of a fresh model is filled for this strategy.
    pub fn pairwise_init(&self) -> PairwiseInit {
        match self {
            StrategyKind::Mcmc { .. } => PairwiseInit::Gaussian,
            _ => PairwiseInit::Zeros,
        }
    }

    /// Builds the runnable strategy.
    ///
    /// # Arguments
    /// * `resolved` - The data-dependent settings.
    /// * `rng` - The random source for strategies that sample.
    pub fn instantiate(&self, resolved: Resolved, rng: StdRng) -> Strategy {
        match *self {
            StrategyKind::Sgd { num_iter } => Strategy::Sgd(SgdLearner::new(num_iter, resolved)),
            StrategyKind::SgdAdaptive { num_iter } => {
                Strategy::SgdAdaptive(AdaptiveSgdLearner::new(num_iter, resolved, rng))
            }
            StrategyKind::Mcmc {
                num_iter,
                sampling,
                multilevel,
                ..
            } => Strategy::Mcmc(McmcLearner::new(
                num_iter, sampling, multilevel, resolved, rng,
            )),
        }
    }
}

/// A runnable learning strategy.
pub enum Strategy {
    Sgd(SgdLearner),
    SgdAdaptive(AdaptiveSgdLearner),
    Mcmc(McmcLearner),
}

impl Strategy {
    fn inner(&self) -> &dyn Trainable {
        match self {
            Strategy::Sgd(s) => s,
            Strategy::SgdAdaptive(s) => s,
            Strategy::Mcmc(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Trainable {
        match self {
            Strategy::Sgd(s) => s,
            Strategy::SgdAdaptive(s) => s,
            Strategy::Mcmc(s) => s,
        }
    }
}

impl Trainable for Strategy {
    fn init(&mut self, model: &ModelParameters) {
        self.inner_mut().init(model);
    }

    fn learn(
        &mut self,
        model: &mut ModelParameters,
        data: &DataSets<'_>,
        log: Option<&mut RunLog>,
    ) -> Result<()> {
        self.inner_mut().learn(model, data, log)
    }

    fn evaluate(&self, model: &ModelParameters, data: &Dataset) -> f64 {
        self.inner().evaluate(model, data)
    }

    fn predict(&self, model: &ModelParameters, data: &Dataset) -> Vec<f64> {
        self.inner().predict(model, data)
    }

    fn debug(&self) {
        self.inner().debug();
    }

    fn log_columns(&self) -> &'static [&'static str] {
        self.inner().log_columns()
    }
}
