use std::path::Path;

use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

use super::TrainerBuilder;
use crate::{
    config::{Method, Regularization, TermCoefficients, TrainerConfig, resolve_learn_rates},
    data::Dataset,
    error::{FmError, Result},
    model::{MetaInfo, ModelParameters, ModelSpec, Parameters},
    rlog::RunLog,
    strategy::{DataSets, Resolved, Strategy, StrategyKind, TargetRange, Trainable},
};

pub(super) enum TrainerState {
    Configured,
    Trained {
        model: ModelParameters,
        strategy: Strategy,
    },
}

/// What a successful `train` call resolved and measured.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub num_attribute: usize,
    pub num_attribute_groups: usize,
    /// The test cases mcmc evaluates on, `None` for the sgd family.
    pub num_eval_cases: Option<usize>,
    /// Final train RMSE, `None` for mcmc.
    pub train_rmse: Option<f64>,
    /// Final test RMSE, `None` for mcmc.
    pub test_rmse: Option<f64>,
}

/// Drives the lifecycle of a factorization machine: configure, train, then predict and
/// extract parameters.
///
/// The model is only sized once `train` sees the datasets. Training again discards the
/// previous model and strategy entirely.
pub struct Trainer {
    pub(super) spec: ModelSpec,
    pub(super) kind: StrategyKind,
    pub(super) learn_rate: Vec<f64>,
    pub(super) reg: Vec<f64>,
    pub(super) seed: Option<u64>,
    pub(super) verbosity: u32,
    pub(super) log: Option<RunLog>,
    pub(super) state: TrainerState,
}

impl Trainer {
    /// Creates a new `Trainer`, see [`TrainerBuilder::build`].
    pub fn new(config: &TrainerConfig) -> Result<Self> {
        TrainerBuilder::new().build(config)
    }

    pub fn method(&self) -> Method {
        self.kind.method()
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, TrainerState::Trained { .. })
    }

    /// The learned model, if trained.
    pub fn model(&self) -> Option<&ModelParameters> {
        match &self.state {
            TrainerState::Trained { model, .. } => Some(model),
            TrainerState::Configured => None,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(RunLog::path)
    }

    /// Trains a fresh model.
    ///
    /// # Arguments
    /// * `train` - The train set, required.
    /// * `test` - The test set, an empty one is used when absent.
    /// * `validation` - The validation set, required by `sgda`.
    ///
    /// # Returns
    /// What was resolved and the final errors, or the first error found. Every check on
    /// the inputs runs before the previous trained state is dropped.
    pub fn train(
        &mut self,
        train: Option<&Dataset>,
        test: Option<&Dataset>,
        validation: Option<&Dataset>,
    ) -> Result<TrainReport> {
        let train = train.ok_or(FmError::MissingTrainSet)?;
        let placeholder = Dataset::empty();
        let test_given = test.is_some();
        let test = test.unwrap_or(&placeholder);

        let num_attribute = resolve_num_attribute(train, test, validation);
        let method = self.method();
        if method == Method::SgdAdaptive && validation.is_none() {
            return Err(FmError::MissingValidationSet);
        }

        let num_eval_cases = resolve_num_eval_cases(&self.kind, test_given, test);
        let meta = MetaInfo::from_dataset(num_attribute, train)?;
        let regularization = Regularization::resolve(
            method,
            &self.reg,
            meta.num_attribute_groups(),
            self.spec.num_factor(),
        )?;
        let learn_rates = if method.uses_learn_rate() {
            resolve_learn_rates(&self.learn_rate)?
        } else {
            TermCoefficients::zero()
        };

        self.state = TrainerState::Configured;
        info!(
            "training {method}: num_attribute={num_attribute} groups={} relations={} train={} test={}",
            meta.num_attribute_groups(),
            meta.num_relations(),
            train.num_cases(),
            test.num_cases(),
        );

        let mut rng = generate_rng(self.seed);
        let mut model = self
            .spec
            .finalize(num_attribute, self.kind.pairwise_init(), &mut rng);

        let num_attribute_groups = meta.num_attribute_groups();
        let resolved = Resolved {
            meta,
            regularization,
            learn_rates,
            num_eval_cases: num_eval_cases.unwrap_or(0),
            target_range: TargetRange::of(train),
            num_factor: self.spec.num_factor(),
        };
        let mut strategy = self.kind.instantiate(resolved, rng);
        strategy.init(&model);

        if self.verbosity > 0 {
            model.debug();
            strategy.debug();
        }

        if let Some(log) = self.log.as_mut() {
            log.begin(strategy.log_columns())?;
        }

        let data = DataSets {
            train,
            test,
            validation,
        };
        let learned = strategy.learn(&mut model, &data, self.log.as_mut());
        let flushed = match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        };
        learned?;
        flushed?;

        let (train_rmse, test_rmse) = match method {
            Method::Mcmc => (None, None),
            _ => {
                let train_rmse = strategy.evaluate(&model, train);
                let test_rmse = strategy.evaluate(&model, test);
                info!("Final\tTrain={train_rmse:.6}\tTest={test_rmse:.6}");
                (Some(train_rmse), Some(test_rmse))
            }
        };

        debug!("trained {method} model with {num_attribute} attributes");
        self.state = TrainerState::Trained { model, strategy };

        Ok(TrainReport {
            num_attribute,
            num_attribute_groups,
            num_eval_cases,
            train_rmse,
            test_rmse,
        })
    }

    /// Predicts every case of `data`.
    ///
    /// # Returns
    /// One prediction per case, or an error if the trainer was never trained.
    pub fn predict(&self, data: &Dataset) -> Result<Vec<f64>> {
        let (model, strategy) = self.trained()?;
        Ok(strategy.predict(model, data))
    }

    /// Returns the RMSE of the trained model on `data`.
    pub fn evaluate(&self, data: &Dataset) -> Result<f64> {
        let (model, strategy) = self.trained()?;
        Ok(strategy.evaluate(model, data))
    }

    /// Returns a copy of the learned parameters, disabled terms zeroed out.
    pub fn parameters(&self) -> Result<Parameters> {
        let (model, _) = self.trained()?;
        Ok(Parameters::from_model(model))
    }

    fn trained(&self) -> Result<(&ModelParameters, &Strategy)> {
        match &self.state {
            TrainerState::Trained { model, strategy } => Ok((model, strategy)),
            TrainerState::Configured => Err(FmError::NotTrained),
        }
    }
}

/// The attribute space is wide enough for every dataset the model will see.
fn resolve_num_attribute(train: &Dataset, test: &Dataset, validation: Option<&Dataset>) -> usize {
    let validation = validation.map_or(0, Dataset::num_feature);
    train.num_feature().max(test.num_feature()).max(validation)
}

fn resolve_num_eval_cases(kind: &StrategyKind, test_given: bool, test: &Dataset) -> Option<usize> {
    match kind {
        StrategyKind::Mcmc {
            num_eval_cases: Some(n),
            ..
        } => Some(*n),
        StrategyKind::Mcmc { .. } if test_given => Some(test.num_cases()),
        StrategyKind::Mcmc { .. } => Some(0),
        _ => None,
    }
}

fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn data(n: usize, width: usize) -> Dataset {
        Dataset::from_cases((0..n).map(|i| {
            let j = i % width;
            (1. + j as f64 * 0.1, vec![(j, 1.)])
        }))
    }

    fn sgd() -> Trainer {
        let config = TrainerConfig::new("sgd")
            .with_learn_rate(&[0.05])
            .with_num_iter(3)
            .with_seed(1);
        Trainer::new(&config).unwrap()
    }

    #[test]
    fn num_attribute_is_the_widest_dataset() {
        let train = data(10, 4);
        let test = data(5, 6);
        let validation = data(3, 2).with_num_feature(9);

        assert_eq!(resolve_num_attribute(&train, &test, None), 6);
        assert_eq!(resolve_num_attribute(&train, &test, Some(&validation)), 9);
    }

    #[test]
    fn eval_cases_follow_the_test_set() {
        let test = data(7, 2);
        let kind = StrategyKind::Mcmc {
            num_iter: 1,
            num_eval_cases: None,
            sampling: true,
            multilevel: true,
        };

        assert_eq!(resolve_num_eval_cases(&kind, true, &test), Some(7));
        assert_eq!(resolve_num_eval_cases(&kind, false, &Dataset::empty()), Some(0));
        assert_eq!(
            resolve_num_eval_cases(&StrategyKind::Sgd { num_iter: 1 }, true, &test),
            None
        );
    }

    #[test]
    fn explicit_eval_cases_are_kept() {
        let kind = StrategyKind::Mcmc {
            num_iter: 1,
            num_eval_cases: Some(3),
            sampling: true,
            multilevel: true,
        };
        assert_eq!(resolve_num_eval_cases(&kind, true, &data(7, 2)), Some(3));
    }

    #[test]
    fn missing_train_set_is_a_precondition_error() {
        let mut trainer = sgd();
        let err = trainer.train(None, None, None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(!trainer.is_trained());
    }

    #[test]
    fn nothing_is_readable_before_training() {
        let trainer = sgd();
        let test = data(2, 2);

        assert!(trainer.model().is_none());
        assert_eq!(trainer.predict(&test).unwrap_err().kind(), ErrorKind::Precondition);
        assert_eq!(trainer.evaluate(&test).unwrap_err().kind(), ErrorKind::Precondition);
        assert!(matches!(trainer.parameters(), Err(FmError::NotTrained)));
    }

    #[test]
    fn failed_validation_keeps_the_trained_model() {
        let config = TrainerConfig::new("sgd")
            .with_learn_rate(&[0.05])
            .with_num_iter(2)
            .with_seed(1);
        let mut trainer = Trainer::new(&config).unwrap();
        let train = data(10, 3);
        trainer.train(Some(&train), None, None).unwrap();

        // an empty group assignment is rejected
        let grouped = data(10, 3).with_attribute_groups(vec![]);
        assert!(trainer.train(Some(&grouped), None, None).is_err());
        assert!(trainer.is_trained());
    }

    #[test]
    fn retraining_starts_from_scratch() {
        let mut trainer = sgd();
        let train = data(20, 4);

        trainer.train(Some(&train), None, None).unwrap();
        let first = trainer.parameters().unwrap();

        let wider = data(20, 6);
        let report = trainer.train(Some(&wider), None, None).unwrap();
        assert_eq!(report.num_attribute, 6);

        trainer.train(Some(&train), None, None).unwrap();
        assert_eq!(trainer.parameters().unwrap(), first);
    }

    #[test]
    fn sgd_reports_final_errors() {
        let mut trainer = sgd();
        let train = data(20, 4);
        let report = trainer.train(Some(&train), None, None).unwrap();

        assert_eq!(report.num_eval_cases, None);
        assert!(report.train_rmse.is_some_and(f64::is_finite));
        assert_eq!(report.test_rmse, Some(0.));
    }
}
