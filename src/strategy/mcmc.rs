//! Bayesian factorization machines learned by Gibbs sampling.
//!
//! Every parameter is drawn from its Gaussian conditional given the rest, with Gamma
//! priors on the noise precision and (multilevel) on the per-group weight precisions.
//! Residuals `e_i = ŷ_i − y_i` and per-factor sums `q_if` over the train set are
//! cached so that each draw costs a pass over one attribute's column only.

use std::time::Instant;

use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::{Rng, rngs::StdRng};
use rand_distr::{Gamma, StandardNormal};

use super::{
    DataSets, Resolved, Trainable,
    eval::{TargetRange, predict_clamped, rmse},
};
use crate::{
    data::Dataset,
    error::{FmError, Result},
    model::{MetaInfo, ModelParameters},
    rlog::RunLog,
};

const LOG_COLUMNS: &[&str] = &[
    "time_learn",
    "rmse_avg",
    "rmse_this",
    "alpha",
    "w0",
    "lambda_w",
    "lambda_v",
    "mu_w",
    "mu_v",
];

const ALPHA_0: f64 = 1.;
const BETA_0: f64 = 1.;
const GAMMA_0: f64 = 1.;
const MU_0: f64 = 0.;

/// Test predictions summed over the iterations run so far.
struct AveragedPredictions {
    fingerprint: u64,
    sum: Vec<f64>,
    samples: usize,
}

impl AveragedPredictions {
    fn mean(&self, range: TargetRange) -> Vec<f64> {
        let samples = self.samples.max(1) as f64;
        self.sum.iter().map(|s| range.clamp(s / samples)).collect()
    }
}

/// Train-set caches kept in sync with the model while sampling.
struct Caches {
    err: Vec<f64>,
    q: Array2<f64>,
}

impl Caches {
    fn build(model: &ModelParameters, train: &Dataset) -> Self {
        let mut q = Array2::zeros((train.num_cases(), model.num_factor()));
        let mut sums = vec![0.; model.num_factor()];
        let err = train
            .cases()
            .enumerate()
            .map(|(i, (row, target))| {
                let p = model.predict_row_with_sums(row, &mut sums);
                for (f, &s) in sums.iter().enumerate() {
                    q[[i, f]] = s;
                }
                p - target
            })
            .collect();

        Self { err, q }
    }

    fn rmse(&self) -> f64 {
        if self.err.is_empty() {
            return 0.;
        }

        let sse: f64 = self.err.iter().map(|e| e * e).sum();
        (sse / self.err.len() as f64).sqrt()
    }
}

pub struct McmcLearner {
    num_iter: usize,
    num_eval_cases: usize,
    sampling: bool,
    multilevel: bool,
    meta: MetaInfo,
    target_range: TargetRange,
    alpha: f64,
    reg0: f64,
    w_lambda: Array1<f64>,
    w_mu: Array1<f64>,
    v_lambda: Array2<f64>,
    v_mu: Array2<f64>,
    rng: StdRng,
    averaged: Option<AveragedPredictions>,
}

impl McmcLearner {
    /// Creates a new `McmcLearner`.
    ///
    /// The resolved regularization seeds the precisions: `reg0` for the bias, then one
    /// linear and one pairwise value per attribute group.
    ///
    /// # Arguments
    /// * `num_iter` - The amount of Gibbs sweeps.
    /// * `sampling` - Draw from the conditionals, or take their means when false.
    /// * `multilevel` - Whether to sample the per-group hyperparameters.
    /// * `resolved` - The data-dependent settings.
    /// * `rng` - The random source for every draw.
    pub fn new(
        num_iter: usize,
        sampling: bool,
        multilevel: bool,
        resolved: Resolved,
        rng: StdRng,
    ) -> Self {
        let num_groups = resolved.meta.num_attribute_groups();
        let num_factor = resolved.num_factor;
        let reg = &resolved.regularization;

        Self {
            num_iter,
            num_eval_cases: resolved.num_eval_cases,
            sampling,
            multilevel,
            target_range: resolved.target_range,
            alpha: 1.,
            reg0: reg.bias(),
            w_lambda: Array1::from_shape_fn(num_groups, |g| reg.linear(g)),
            w_mu: Array1::zeros(num_groups),
            v_lambda: Array2::from_shape_fn((num_groups, num_factor), |(g, f)| {
                reg.pairwise(g, f)
            }),
            v_mu: Array2::zeros((num_groups, num_factor)),
            meta: resolved.meta,
            rng,
            averaged: None,
        }
    }

    fn draw_normal(&mut self, mean: f64, precision: f64) -> f64 {
        if !self.sampling {
            return mean;
        }

        let z: f64 = self.rng.sample(StandardNormal);
        mean + z / precision.sqrt()
    }

    /// Draws from a Gamma with the given shape and rate, or returns its mean when not
    /// sampling.
    fn draw_gamma(&mut self, what: &'static str, shape: f64, rate: f64) -> Result<f64> {
        if !self.sampling {
            return Ok(shape / rate);
        }

        let gamma = Gamma::new(shape, 1. / rate).map_err(|e| FmError::Sampling {
            what,
            reason: e.to_string(),
        })?;

        Ok(self.rng.sample(gamma))
    }

    fn draw_alpha(&mut self, caches: &Caches) -> Result<()> {
        let n = caches.err.len() as f64;
        let sse: f64 = caches.err.iter().map(|e| e * e).sum();
        self.alpha = self.draw_gamma("alpha", (ALPHA_0 + n) / 2., (BETA_0 + sse) / 2.)?;
        Ok(())
    }

    fn draw_bias(&mut self, model: &mut ModelParameters, caches: &mut Caches) {
        let n = caches.err.len() as f64;
        let precision = self.reg0 + self.alpha * n;
        if precision <= 0. {
            return;
        }

        let old = model.bias;
        let mean = self.alpha * caches.err.iter().map(|e| old - e).sum::<f64>() / precision;
        let new = self.draw_normal(mean, precision);
        model.bias = new;

        let delta = new - old;
        caches.err.iter_mut().for_each(|e| *e += delta);
    }

    /// Draws `(lambda, mu)` for the weights `values` of one group.
    fn draw_hyper(&mut self, values: &[f64], mu: f64) -> Result<(f64, f64)> {
        let n = values.len() as f64;
        let spread: f64 = values.iter().map(|w| (w - mu) * (w - mu)).sum();
        let lambda = self.draw_gamma(
            "lambda",
            (ALPHA_0 + n + 1.) / 2.,
            (BETA_0 + GAMMA_0 * (mu - MU_0) * (mu - MU_0) + spread) / 2.,
        )?;

        let mean = (values.iter().sum::<f64>() + GAMMA_0 * MU_0) / (n + GAMMA_0);
        let mu = self.draw_normal(mean, (n + GAMMA_0) * lambda);

        Ok((lambda, mu))
    }

    fn draw_linear_hyper(&mut self, model: &ModelParameters) -> Result<()> {
        for g in 0..self.meta.num_attribute_groups() {
            let values: Vec<f64> = self.meta.members(g).map(|j| model.linear[j]).collect();
            let (lambda, mu) = self.draw_hyper(&values, self.w_mu[g])?;
            self.w_lambda[g] = lambda;
            self.w_mu[g] = mu;
        }

        Ok(())
    }

    fn draw_pairwise_hyper(&mut self, model: &ModelParameters) -> Result<()> {
        for g in 0..self.meta.num_attribute_groups() {
            let members: Vec<usize> = self.meta.members(g).collect();
            for f in 0..model.num_factor() {
                let values: Vec<f64> = members.iter().map(|&j| model.pairwise[[j, f]]).collect();
                let (lambda, mu) = self.draw_hyper(&values, self.v_mu[[g, f]])?;
                self.v_lambda[[g, f]] = lambda;
                self.v_mu[[g, f]] = mu;
            }
        }

        Ok(())
    }

    fn draw_linear(
        &mut self,
        model: &mut ModelParameters,
        columns: &[Vec<(usize, f64)>],
        caches: &mut Caches,
    ) {
        for (j, column) in columns.iter().enumerate() {
            let g = self.meta.group_of(j);
            let (lambda, mu) = (self.w_lambda[g], self.w_mu[g]);
            let old = model.linear[j];

            let mut precision = lambda;
            let mut weighted = 0.;
            for &(i, x) in column {
                precision += self.alpha * x * x;
                weighted += x * (old * x - caches.err[i]);
            }

            if precision <= 0. {
                continue;
            }

            let mean = (self.alpha * weighted + mu * lambda) / precision;
            let new = self.draw_normal(mean, precision);
            model.linear[j] = new;

            let delta = new - old;
            for &(i, x) in column {
                caches.err[i] += delta * x;
            }
        }
    }

    fn draw_pairwise(
        &mut self,
        model: &mut ModelParameters,
        columns: &[Vec<(usize, f64)>],
        caches: &mut Caches,
    ) {
        let mut h = Vec::new();
        for f in 0..model.num_factor() {
            for (j, column) in columns.iter().enumerate() {
                let g = self.meta.group_of(j);
                let (lambda, mu) = (self.v_lambda[[g, f]], self.v_mu[[g, f]]);
                let old = model.pairwise[[j, f]];

                h.clear();
                h.extend(column.iter().map(|&(i, x)| x * (caches.q[[i, f]] - old * x)));

                let mut precision = lambda;
                let mut weighted = 0.;
                for (&(i, _), &h_i) in column.iter().zip(&h) {
                    precision += self.alpha * h_i * h_i;
                    weighted += h_i * (old * h_i - caches.err[i]);
                }

                if precision <= 0. {
                    continue;
                }

                let mean = (self.alpha * weighted + mu * lambda) / precision;
                let new = self.draw_normal(mean, precision);
                model.pairwise[[j, f]] = new;

                let delta = new - old;
                for (&(i, x), &h_i) in column.iter().zip(&h) {
                    caches.err[i] += delta * h_i;
                    caches.q[[i, f]] += delta * x;
                }
            }
        }
    }

    /// Adds this iteration's test predictions to the running average and returns the
    /// `(averaged, current)` RMSE over the evaluated cases.
    fn accumulate(&mut self, model: &ModelParameters, test: &Dataset) -> (f64, f64) {
        let fingerprint = test.fingerprint();
        let stale = self
            .averaged
            .as_ref()
            .is_none_or(|a| a.fingerprint != fingerprint);
        if stale {
            self.averaged = Some(AveragedPredictions {
                fingerprint,
                sum: vec![0.; test.num_cases()],
                samples: 0,
            });
        }

        let range = self.target_range;
        let current = predict_clamped(model, test, range);
        let Some(averaged) = self.averaged.as_mut() else {
            return (0., 0.);
        };

        let mut sums = vec![0.; model.num_factor()];
        for (total, (row, _)) in averaged.sum.iter_mut().zip(test.cases()) {
            *total += model.predict_row_with_sums(row, &mut sums);
        }
        averaged.samples += 1;

        let n = self.num_eval_cases.min(test.num_cases());
        let targets = &test.targets()[..n];
        let mean = averaged.mean(range);

        (rmse(&mean[..n], targets), rmse(&current[..n], targets))
    }
}

impl Trainable for McmcLearner {
    fn init(&mut self, model: &ModelParameters) {
        self.averaged = None;
        let num_groups = self.meta.num_attribute_groups();
        if self.v_lambda.dim() != (num_groups, model.num_factor()) {
            self.v_lambda = Array2::zeros((num_groups, model.num_factor()));
            self.v_mu = Array2::zeros((num_groups, model.num_factor()));
        }
    }

    fn learn(
        &mut self,
        model: &mut ModelParameters,
        data: &DataSets<'_>,
        mut log: Option<&mut RunLog>,
    ) -> Result<()> {
        let columns = data.train.transpose(model.num_attribute());
        let mut caches = Caches::build(model, data.train);

        for iter in 0..self.num_iter {
            let start = Instant::now();

            self.draw_alpha(&caches)?;
            if model.bias_enabled() {
                self.draw_bias(model, &mut caches);
            }

            if model.linear_enabled() {
                if self.multilevel {
                    self.draw_linear_hyper(model)?;
                }
                self.draw_linear(model, &columns, &mut caches);
            }

            if self.multilevel {
                self.draw_pairwise_hyper(model)?;
            }
            self.draw_pairwise(model, &columns, &mut caches);

            // Rebuilt every sweep so rounding in the incremental updates never accumulates.
            caches = Caches::build(model, data.train);
            let elapsed = start.elapsed().as_secs_f64();

            let (rmse_avg, rmse_this) = self.accumulate(model, data.test);
            let rmse_train = caches.rmse();
            info!(
                "#Iter={iter:3}\tTrain={rmse_train:.6}\tTest={rmse_avg:.6}\tTest(ll)={rmse_this:.6}"
            );

            if let Some(log) = log.as_deref_mut() {
                log.record("time_learn", elapsed);
                log.record("rmse_avg", rmse_avg);
                log.record("rmse_this", rmse_this);
                log.record("alpha", self.alpha);
                log.record("w0", model.bias);
                log.record("lambda_w", self.w_lambda.first().copied().unwrap_or(0.));
                log.record("lambda_v", self.v_lambda.first().copied().unwrap_or(0.));
                log.record("mu_w", self.w_mu.first().copied().unwrap_or(0.));
                log.record("mu_v", self.v_mu.first().copied().unwrap_or(0.));
                log.new_line()?;
            }
        }

        Ok(())
    }

    fn evaluate(&self, model: &ModelParameters, data: &Dataset) -> f64 {
        rmse(&self.predict(model, data), data.targets())
    }

    /// Returns the averaged predictions if `data` is the test set sampled against,
    /// otherwise point predictions of the last sample.
    fn predict(&self, model: &ModelParameters, data: &Dataset) -> Vec<f64> {
        match &self.averaged {
            Some(averaged)
                if averaged.samples > 0
                    && averaged.sum.len() == data.num_cases()
                    && averaged.fingerprint == data.fingerprint() =>
            {
                averaged.mean(self.target_range)
            }
            _ => predict_clamped(model, data, self.target_range),
        }
    }

    fn debug(&self) {
        debug!(
            "mcmc: num_iter={} num_eval_cases={} sampling={} multilevel={}",
            self.num_iter, self.num_eval_cases, self.sampling, self.multilevel
        );
        debug!(
            "mcmc: alpha={} reg0={} lambda_w={} lambda_v={}",
            self.alpha, self.reg0, self.w_lambda, self.v_lambda
        );
    }

    fn log_columns(&self) -> &'static [&'static str] {
        LOG_COLUMNS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Regularization, TermCoefficients},
        model::{ModelSpec, PairwiseInit},
    };
    use rand::SeedableRng;

    fn synthetic(n: usize, rng: &mut StdRng) -> Dataset {
        // y = 1 + 0.5 x0 - x1 + x0 x1, with some noise
        let mut data = Dataset::empty();
        for _ in 0..n {
            let x0: f64 = rng.random_range(0.0..2.0);
            let x1: f64 = rng.random_range(0.0..2.0);
            let noise: f64 = rng.random_range(-0.05..0.05);
            let y = 1. + 0.5 * x0 - x1 + x0 * x1 + noise;
            data.push_case(y, [(0, x0), (1, x1)]);
        }

        data
    }

    fn learner(
        num_iter: usize,
        sampling: bool,
        multilevel: bool,
        eval: usize,
        train: &Dataset,
    ) -> McmcLearner {
        McmcLearner::new(
            num_iter,
            sampling,
            multilevel,
            Resolved {
                meta: MetaInfo::new(2),
                regularization: Regularization::Uniform(TermCoefficients::zero()),
                learn_rates: TermCoefficients::zero(),
                num_eval_cases: eval,
                target_range: TargetRange::of(train),
                num_factor: 2,
            },
            StdRng::seed_from_u64(3),
        )
    }

    fn model(rng: &mut StdRng) -> ModelParameters {
        ModelSpec::new(&[1, 1, 2], 0., 0.1)
            .unwrap()
            .finalize(2, PairwiseInit::Gaussian, rng)
    }

    #[test]
    fn sampling_fits_the_data() {
        let mut rng = StdRng::seed_from_u64(11);
        let train = synthetic(200, &mut rng);
        let test = synthetic(50, &mut rng);
        let mut model = model(&mut rng);
        let mut mcmc = learner(50, true, true, test.num_cases(), &train);
        mcmc.init(&model);

        let data = DataSets {
            train: &train,
            test: &test,
            validation: None,
        };
        mcmc.learn(&mut model, &data, None).unwrap();

        assert_eq!(mcmc.averaged.as_ref().map(|a| a.samples), Some(50));
        assert!(mcmc.alpha > 0.);
        let err = mcmc.evaluate(&model, &test);
        assert!(err.is_finite());
        assert!(err < 0.5, "rmse {err}");
    }

    #[test]
    fn without_sampling_draws_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let train = synthetic(60, &mut rng);
        let data = DataSets {
            train: &train,
            test: &train,
            validation: None,
        };

        let run = |seed: u64| {
            let mut model = model(&mut StdRng::seed_from_u64(9));
            let mut mcmc = McmcLearner::new(
                5,
                false,
                false,
                Resolved {
                    meta: MetaInfo::new(2),
                    regularization: Regularization::Uniform(TermCoefficients::broadcast(1.)),
                    learn_rates: TermCoefficients::zero(),
                    num_eval_cases: train.num_cases(),
                    target_range: TargetRange::of(&train),
                    num_factor: 2,
                },
                StdRng::seed_from_u64(seed),
            );
            mcmc.learn(&mut model, &data, None).unwrap();
            model
        };

        assert_eq!(run(1), run(2));
    }

    #[test]
    fn predict_averages_only_on_the_test_set() {
        let mut rng = StdRng::seed_from_u64(21);
        let train = synthetic(40, &mut rng);
        let test = synthetic(10, &mut rng);
        let other = synthetic(10, &mut rng);
        let mut model = model(&mut rng);
        let mut mcmc = learner(3, true, true, test.num_cases(), &train);

        let data = DataSets {
            train: &train,
            test: &test,
            validation: None,
        };
        mcmc.learn(&mut model, &data, None).unwrap();

        let point = predict_clamped(&model, &other, TargetRange::of(&train));
        assert_eq!(mcmc.predict(&model, &other), point);
        assert_eq!(mcmc.predict(&model, &test).len(), test.num_cases());
    }

    #[test]
    fn empty_test_set_is_fine() {
        let mut rng = StdRng::seed_from_u64(2);
        let train = synthetic(20, &mut rng);
        let test = Dataset::empty();
        let mut model = model(&mut rng);
        let mut mcmc = learner(2, true, false, 0, &train);

        let data = DataSets {
            train: &train,
            test: &test,
            validation: None,
        };
        mcmc.learn(&mut model, &data, None).unwrap();

        assert!(mcmc.predict(&model, &test).is_empty());
        assert_eq!(mcmc.evaluate(&model, &test), 0.);
    }
}
