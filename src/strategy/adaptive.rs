use std::time::Instant;

use log::{debug, info};
use rand::{Rng, rngs::StdRng};

use super::{
    DataSets, Resolved, Trainable,
    eval::{TargetRange, predict_clamped, rmse},
    sgd::theta_step,
};
use crate::{
    config::{Regularization, TermCoefficients},
    data::{Dataset, Feature},
    error::{FmError, Result},
    model::{MetaInfo, ModelParameters},
    rlog::RunLog,
};

const LOG_COLUMNS: &[&str] = &[
    "time_learn",
    "rmse_train",
    "rmse_test",
    "rmse_validation",
    "reg0",
    "regw",
    "regv",
];

/// Stochastic gradient descent that also learns its regularization coefficients.
///
/// Every parameter step on a train case is followed by a step on the coefficients,
/// driven by the error on a random validation case.
pub struct AdaptiveSgdLearner {
    num_iter: usize,
    learn_rates: TermCoefficients,
    regularization: Regularization,
    meta: MetaInfo,
    target_range: TargetRange,
    rng: StdRng,
    sums: Vec<f64>,
    val_sums: Vec<f64>,
}

impl AdaptiveSgdLearner {
    /// Creates a new `AdaptiveSgdLearner`.
    ///
    /// # Arguments
    /// * `num_iter` - The amount of passes over the train set.
    /// * `resolved` - The learning rates, initial regularization and attribute groups.
    /// * `rng` - The source used to pick validation cases.
    pub fn new(num_iter: usize, resolved: Resolved, rng: StdRng) -> Self {
        let regularization = resolved
            .regularization
            .expand(resolved.meta.num_attribute_groups(), resolved.num_factor);

        Self {
            num_iter,
            learn_rates: resolved.learn_rates,
            regularization,
            meta: resolved.meta,
            target_range: resolved.target_range,
            rng,
            sums: vec![0.; resolved.num_factor],
            val_sums: vec![0.; resolved.num_factor],
        }
    }

    /// The current regularization coefficients.
    pub fn regularization(&self) -> &Regularization {
        &self.regularization
    }

    /// Moves the regularization coefficients against the gradient of the validation
    /// error, through the effect they had on the last parameter step.
    fn lambda_step(&mut self, model: &ModelParameters, row: &[Feature], target: f64) {
        let p = model.predict_row_with_sums(row, &mut self.val_sums);
        let mult = self.target_range.clamp(p) - target;

        let Regularization::Grouped {
            bias,
            linear,
            pairwise,
        } = &mut self.regularization
        else {
            return;
        };

        let rates = self.learn_rates;
        let num_attribute = model.num_attribute();

        if model.bias_enabled() {
            let grad = mult * (-rates.bias * model.bias);
            *bias = (*bias - rates.bias * grad).max(0.);
        }

        if model.linear_enabled() {
            let mut grads = vec![0.; linear.len()];
            for x in row.iter().filter(|x| x.id < num_attribute) {
                let g = self.meta.group_of(x.id);
                grads[g] += x.value * (-rates.linear * model.linear[x.id]);
            }

            for (lambda, grad) in linear.iter_mut().zip(grads) {
                *lambda = (*lambda - rates.linear * mult * grad).max(0.);
            }
        }

        let (num_groups, num_factor) = pairwise.dim();
        for f in 0..num_factor.min(model.num_factor()) {
            let mut grads = vec![0.; num_groups];
            for x in row.iter().filter(|x| x.id < num_attribute) {
                let g = self.meta.group_of(x.id);
                let v = model.pairwise[[x.id, f]];
                let dv = x.value * (self.val_sums[f] - v * x.value);
                grads[g] += dv * (-rates.pairwise * v);
            }

            for (g, grad) in grads.into_iter().enumerate() {
                let lambda = &mut pairwise[[g, f]];
                *lambda = (*lambda - rates.pairwise * mult * grad).max(0.);
            }
        }
    }
}

impl Trainable for AdaptiveSgdLearner {
    fn init(&mut self, model: &ModelParameters) {
        self.sums = vec![0.; model.num_factor()];
        self.val_sums = vec![0.; model.num_factor()];
    }

    fn learn(
        &mut self,
        model: &mut ModelParameters,
        data: &DataSets<'_>,
        mut log: Option<&mut RunLog>,
    ) -> Result<()> {
        let validation = data.validation.ok_or(FmError::MissingValidationSet)?;
        self.sums.resize(model.num_factor(), 0.);
        self.val_sums.resize(model.num_factor(), 0.);

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

                if !validation.is_empty() {
                    let case = self.rng.random_range(0..validation.num_cases());
                    self.lambda_step(model, validation.row(case), validation.target(case));
                }
            }
            let elapsed = start.elapsed().as_secs_f64();

            let rmse_train = self.evaluate(model, data.train);
            let rmse_test = self.evaluate(model, data.test);
            let rmse_validation = self.evaluate(model, validation);
            info!(
                "#Iter={iter:3}\tTrain={rmse_train:.6}\tTest={rmse_test:.6}\tValidation={rmse_validation:.6}"
            );

            if let Some(log) = log.as_deref_mut() {
                log.record("time_learn", elapsed);
                log.record("rmse_train", rmse_train);
                log.record("rmse_test", rmse_test);
                log.record("rmse_validation", rmse_validation);
                log.record("reg0", self.regularization.bias());
                log.record("regw", self.regularization.linear(0));
                log.record("regv", self.regularization.pairwise(0, 0));
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
            "sgda: num_iter={} learn_rates={:?} groups={}",
            self.num_iter,
            self.learn_rates,
            self.meta.num_attribute_groups()
        );
        debug!("sgda: regularization={:?}", self.regularization);
    }

    fn log_columns(&self) -> &'static [&'static str] {
        LOG_COLUMNS
    }
}
