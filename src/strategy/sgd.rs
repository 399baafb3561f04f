use std::time::Instant;

use log::{debug, info};

use super::{
    DataSets, Resolved, Trainable,
    eval::{TargetRange, predict_clamped, rmse},
};
use crate::{
    config::{Regularization, TermCoefficients},
    data::{Dataset, Feature},
    error::Result,
    model::{MetaInfo, ModelParameters},
    rlog::RunLog,
};

const LOG_COLUMNS: &[&str] = &["time_learn", "rmse_train", "rmse_test"];

/// Plain stochastic gradient descent, one parameter update per train case.
pub struct SgdLearner {
    num_iter: usize,
    learn_rates: TermCoefficients,
    regularization: Regularization,
    meta: MetaInfo,
    target_range: TargetRange,
    sums: Vec<f64>,
}

impl SgdLearner {
    /// Creates a new `SgdLearner`.
    ///
    /// # Arguments
    /// * `num_iter` - The amount of passes over the train set.
    /// * `resolved` - The learning rates, regularization and attribute groups to use.
    pub fn new(num_iter: usize, resolved: Resolved) -> Self {
        Self {
            num_iter,
            learn_rates: resolved.learn_rates,
            regularization: resolved.regularization,
            meta: resolved.meta,
            target_range: resolved.target_range,
            sums: vec![0.; resolved.num_factor],
        }
    }
}

impl Trainable for SgdLearner {
    fn init(&mut self, model: &ModelParameters) {
        self.sums = vec![0.; model.num_factor()];
    }

    fn learn(
        &mut self,
        model: &mut ModelParameters,
        data: &DataSets<'_>,
        mut log: Option<&mut RunLog>,
    ) -> Result<()> {
        self.sums.resize(model.num_factor(), 0.);

        for iter in 0..self.num_iter {
            let start = Instant::now();
            for (row, target) in data.train.cases() {
                let p = model.predict_row_with_sums(row, &mut self.sums);
                let mult = self.target_range.clamp(p) - target;
                theta_step(
                    model,
                    row,
                    mult,
                    &self.sums,
                    self.learn_rates,
                    &self.regularization,
                    &self.meta,
                );
            }
            let elapsed = start.elapsed().as_secs_f64();

            let rmse_train = self.evaluate(model, data.train);
            let rmse_test = self.evaluate(model, data.test);
            info!("#Iter={iter:3}\tTrain={rmse_train:.6}\tTest={rmse_test:.6}");

            if let Some(log) = log.as_deref_mut() {
                log.record("time_learn", elapsed);
                log.record("rmse_train", rmse_train);
                log.record("rmse_test", rmse_test);
                log.new_line()?;
            }
        }

        Ok(())
    }

    fn evaluate(&self, model: &ModelParameters, data: &Dataset) -> f64 {
        rmse(&self.predict(model, data), data.targets())
    }

    fn predict(&self, model: &ModelParameters, data: &Dataset) -> Vec<f64> {
        predict_clamped(model, data, self.target_range)
    }

    fn debug(&self) {
        debug!(
            "sgd: num_iter={} learn_rates={:?} reg0={} regw={} regv={}",
            self.num_iter,
            self.learn_rates,
            self.regularization.bias(),
            self.regularization.linear(0),
            self.regularization.pairwise(0, 0),
        );
    }

    fn log_columns(&self) -> &'static [&'static str] {
        LOG_COLUMNS
    }
}

/// Takes one gradient step on every parameter touched by `row`.
///
/// # Arguments
/// * `mult` - The derivative of the loss with respect to the prediction.
/// * `sums` - The per-factor sums left by `predict_row_with_sums` for this row.
pub(crate) fn theta_step(
    model: &mut ModelParameters,
    row: &[Feature],
    mult: f64,
    sums: &[f64],
    rates: TermCoefficients,
    reg: &Regularization,
    meta: &MetaInfo,
) {
    let num_attribute = model.num_attribute();

    if model.bias_enabled() {
        let w0 = model.bias;
        model.bias -= rates.bias * (mult + reg.bias() * w0);
    }

    if model.linear_enabled() {
        for x in row.iter().filter(|x| x.id < num_attribute) {
            let g = meta.group_of(x.id);
            let w = model.linear[x.id];
            model.linear[x.id] -= rates.linear * (mult * x.value + reg.linear(g) * w);
        }
    }

    for (f, &sum) in sums.iter().enumerate().take(model.num_factor()) {
        for x in row.iter().filter(|x| x.id < num_attribute) {
            let g = meta.group_of(x.id);
            let v = model.pairwise[[x.id, f]];
            let grad = sum * x.value - v * x.value * x.value;
            model.pairwise[[x.id, f]] -= rates.pairwise * (mult * grad + reg.pairwise(g, f) * v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, PairwiseInit};
    use rand::{SeedableRng, rngs::StdRng};

    fn learner(num_iter: usize, rate: f64, train: &Dataset) -> SgdLearner {
        SgdLearner::new(
            num_iter,
            Resolved {
                meta: MetaInfo::new(train.num_feature()),
                regularization: Regularization::Uniform(TermCoefficients::zero()),
                learn_rates: TermCoefficients::broadcast(rate),
                num_eval_cases: 0,
                target_range: TargetRange::of(train),
                num_factor: 2,
            },
        )
    }

    fn linear_data() -> Dataset {
        // y = 1 + 2 * x0 - x1
        Dataset::from_cases([
            (3., vec![(0, 1.)]),
            (0., vec![(1, 1.)]),
            (2., vec![(0, 1.), (1, 1.)]),
            (1., vec![]),
            (5., vec![(0, 2.)]),
        ])
    }

    #[test]
    fn bias_step_moves_against_the_error() {
        let spec = ModelSpec::new(&[1, 0, 0], 0., 0.1).unwrap();
        let mut model = spec.finalize(1, PairwiseInit::Zeros, &mut StdRng::seed_from_u64(0));
        let meta = MetaInfo::new(1);
        let reg = Regularization::Uniform(TermCoefficients::zero());

        theta_step(&mut model, &[], -2., &[], TermCoefficients::broadcast(0.5), &reg, &meta);

        assert_eq!(model.bias(), 1.);
    }

    #[test]
    fn learning_reduces_train_error() {
        let train = linear_data();
        let spec = ModelSpec::new(&[1, 1, 2], 0., 0.1).unwrap();
        let mut model = spec.finalize(2, PairwiseInit::Zeros, &mut StdRng::seed_from_u64(0));
        let mut sgd = learner(200, 0.05, &train);
        sgd.init(&model);

        let before = sgd.evaluate(&model, &train);
        let data = DataSets {
            train: &train,
            test: &Dataset::empty(),
            validation: None,
        };
        sgd.learn(&mut model, &data, None).unwrap();
        let after = sgd.evaluate(&model, &train);

        assert!(after < before);
        assert!(after < 0.5);
    }

    #[test]
    fn predictions_cover_every_case() {
        let train = linear_data();
        let spec = ModelSpec::new(&[1, 1, 2], 0., 0.1).unwrap();
        let model = spec.finalize(2, PairwiseInit::Zeros, &mut StdRng::seed_from_u64(0));
        let sgd = learner(1, 0.1, &train);

        assert_eq!(sgd.predict(&model, &train).len(), train.num_cases());
        assert_eq!(sgd.evaluate(&model, &Dataset::empty()), 0.);
    }
}
