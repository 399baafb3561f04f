use std::str::FromStr;

use log::info;

use super::{Trainer, trainer::TrainerState};
use crate::{
    config::{Method, Regularization, TrainerConfig, check_learn_rate_shape},
    error::{FmError, Result},
    model::ModelSpec,
    rlog::RunLog,
    strategy::StrategyKind,
};

/// Builds `Trainer`s given a config.
///
/// Everything that can be validated without data is validated here, the rest is deferred
/// to `Trainer::train`.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Trainer` following a config.
    ///
    /// # Arguments
    /// * `config` - The hyperparameters for the trainer.
    ///
    /// # Returns
    /// A configured trainer, or the first configuration error found. The log file is only
    /// created once every other check passed.
    pub fn build(&self, config: &TrainerConfig) -> Result<Trainer> {
        let method = self.resolve_method(&config.method)?;
        let spec = ModelSpec::new(&config.dims, config.init_mean, config.init_stdev)?;
        self.resolve_learn_rate(method, &config.learn_rate)?;
        Regularization::check_shape(method, config.reg.len())?;

        let kind = self.resolve_strategy(method, config);
        let log = self.resolve_log(config)?;

        info!(
            "configured {method} trainer: dims={:?} num_iter={}",
            config.dims, config.num_iter
        );

        Ok(Trainer {
            spec,
            kind,
            learn_rate: config.learn_rate.clone(),
            reg: config.reg.clone(),
            seed: config.seed,
            verbosity: config.verbosity,
            log,
            state: TrainerState::Configured,
        })
    }

    fn resolve_method(&self, name: &str) -> Result<Method> {
        Method::from_str(name)
    }

    fn resolve_learn_rate(&self, method: Method, raw: &[f64]) -> Result<()> {
        if method.uses_learn_rate() {
            return check_learn_rate_shape(raw);
        }

        if !raw.is_empty() {
            return Err(FmError::LearningRateForMcmc);
        }

        Ok(())
    }

    fn resolve_strategy(&self, method: Method, config: &TrainerConfig) -> StrategyKind {
        let num_iter = config.num_iter;
        match method {
            Method::Sgd => StrategyKind::Sgd { num_iter },
            Method::SgdAdaptive => StrategyKind::SgdAdaptive { num_iter },
            Method::Mcmc => StrategyKind::Mcmc {
                num_iter,
                num_eval_cases: config.num_eval_cases,
                sampling: config.sampling,
                multilevel: config.multilevel,
            },
        }
    }

    fn resolve_log(&self, config: &TrainerConfig) -> Result<Option<RunLog>> {
        match config.log_target.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => RunLog::create(path).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sgd() -> TrainerConfig {
        TrainerConfig::new("sgd").with_learn_rate(&[0.1])
    }

    #[test]
    fn builds_every_method() {
        let builder = TrainerBuilder::new();

        let trainer = builder.build(&sgd()).unwrap();
        assert_eq!(trainer.method(), Method::Sgd);

        let config = TrainerConfig::new("sgda").with_learn_rate(&[0.1, 0.2, 0.3]);
        assert_eq!(builder.build(&config).unwrap().method(), Method::SgdAdaptive);

        let config = TrainerConfig::new("mcmc");
        assert_eq!(builder.build(&config).unwrap().method(), Method::Mcmc);
    }

    #[test]
    fn unknown_method_is_a_config_error() {
        let err = TrainerBuilder::new()
            .build(&TrainerConfig::new("als"))
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("als"));
    }

    #[test]
    fn dims_must_have_three_entries() {
        let err = TrainerBuilder::new()
            .build(&sgd().with_dims(&[1, 8]))
            .err()
            .unwrap();
        assert!(matches!(err, FmError::DimsLength { got: 2 }));
    }

    #[test]
    fn learn_rate_shape_is_checked_for_sgd_family() {
        let builder = TrainerBuilder::new();

        for method in ["sgd", "sgda"] {
            let config = TrainerConfig::new(method).with_learn_rate(&[0.1, 0.2]);
            let err = builder.build(&config).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Config);

            let config = TrainerConfig::new(method);
            assert!(builder.build(&config).is_err());
        }
    }

    #[test]
    fn mcmc_rejects_learn_rates() {
        let config = TrainerConfig::new("mcmc").with_learn_rate(&[0.1]);
        let err = TrainerBuilder::new().build(&config).err().unwrap();
        assert!(matches!(err, FmError::LearningRateForMcmc));
    }

    #[test]
    fn reg_shape_is_partially_checked() {
        let builder = TrainerBuilder::new();

        assert!(builder.build(&sgd().with_reg(&[0.1, 0.2])).is_err());
        assert!(builder.build(&sgd().with_reg(&[0.1, 0.2, 0.3, 0.4, 0.5])).is_err());
        assert!(builder.build(&TrainerConfig::new("mcmc").with_reg(&[1., 2., 3., 4., 5.])).is_ok());
    }

    #[test]
    fn empty_log_target_disables_logging() {
        let trainer = TrainerBuilder::new()
            .build(&sgd().with_log_target(""))
            .unwrap();
        assert!(trainer.log_path().is_none());
    }

    #[test]
    fn log_file_is_created_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tsv");

        let config = sgd().with_dims(&[1]).with_log_target(&path);
        assert!(TrainerBuilder::new().build(&config).is_err());
        assert!(!path.exists());

        let trainer = TrainerBuilder::new()
            .build(&sgd().with_log_target(&path))
            .unwrap();
        assert_eq!(trainer.log_path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn unopenable_log_target_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run.tsv");

        let err = TrainerBuilder::new()
            .build(&sgd().with_log_target(path))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
