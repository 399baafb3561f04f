use log::debug;
use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::{
    data::Feature,
    error::{FmError, Result},
};

/// How the pairwise factor matrix is filled when a model is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairwiseInit {
    Zeros,
    Gaussian,
}

/// The pending shape of a factorization machine, known before any dataset is seen.
///
/// The attribute count is deferred: `finalize` turns it into a sized
/// `ModelParameters` once the datasets are known.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    bias_enabled: bool,
    linear_enabled: bool,
    num_factor: usize,
    init_mean: f64,
    init_stdev: f64,
}

impl ModelSpec {
    /// Creates a new `ModelSpec` from the `[bias, linear, num_factor]` triple.
    ///
    /// # Arguments
    /// * `dims` - Bias and linear flags (any non-zero value enables them) and the factor count.
    /// * `init_mean` - The mean of the Gaussian factor initialization.
    /// * `init_stdev` - The standard deviation of the Gaussian factor initialization.
    ///
    /// # Returns
    /// An error if `dims` does not have three entries or `init_stdev` is not positive.
    pub fn new(dims: &[usize], init_mean: f64, init_stdev: f64) -> Result<Self> {
        let &[bias, linear, num_factor] = dims else {
            return Err(FmError::DimsLength { got: dims.len() });
        };

        if !(init_stdev.is_finite() && init_stdev > 0.) {
            return Err(FmError::InvalidHyperparameter {
                name: "init_stdev",
                reason: format!("must be a positive number, got {init_stdev}"),
            });
        }

        if !init_mean.is_finite() {
            return Err(FmError::InvalidHyperparameter {
                name: "init_mean",
                reason: format!("must be finite, got {init_mean}"),
            });
        }

        Ok(Self {
            bias_enabled: bias != 0,
            linear_enabled: linear != 0,
            num_factor,
            init_mean,
            init_stdev,
        })
    }

    pub fn bias_enabled(&self) -> bool {
        self.bias_enabled
    }

    pub fn linear_enabled(&self) -> bool {
        self.linear_enabled
    }

    pub fn num_factor(&self) -> usize {
        self.num_factor
    }

    /// Allocates the parameters for an attribute space of `num_attribute` attributes.
    ///
    /// # Arguments
    /// * `num_attribute` - The resolved attribute count.
    /// * `init` - How to fill the pairwise factors.
    /// * `rng` - The source of randomness for the Gaussian initialization.
    pub fn finalize<R: Rng>(
        &self,
        num_attribute: usize,
        init: PairwiseInit,
        rng: &mut R,
    ) -> ModelParameters {
        let shape = (num_attribute, self.num_factor);
        let pairwise = match init {
            PairwiseInit::Zeros => Array2::zeros(shape),
            PairwiseInit::Gaussian => match Normal::new(self.init_mean, self.init_stdev) {
                Ok(normal) => Array2::random_using(shape, normal, rng),
                // `new` already rejected a non-finite or non-positive deviation.
                Err(_) => Array2::from_elem(shape, self.init_mean),
            },
        };

        let linear_len = if self.linear_enabled { num_attribute } else { 0 };

        ModelParameters {
            bias_enabled: self.bias_enabled,
            linear_enabled: self.linear_enabled,
            num_factor: self.num_factor,
            num_attribute,
            bias: 0.,
            linear: Array1::zeros(linear_len),
            pairwise,
        }
    }
}

/// The learned state of a factorization machine.
///
/// `linear` has `num_attribute` entries only when the linear term is enabled, `pairwise`
/// is always `num_attribute × num_factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    bias_enabled: bool,
    linear_enabled: bool,
    num_factor: usize,
    num_attribute: usize,
    pub(crate) bias: f64,
    pub(crate) linear: Array1<f64>,
    pub(crate) pairwise: Array2<f64>,
}

impl ModelParameters {
    pub fn bias_enabled(&self) -> bool {
        self.bias_enabled
    }

    pub fn linear_enabled(&self) -> bool {
        self.linear_enabled
    }

    pub fn num_factor(&self) -> usize {
        self.num_factor
    }

    pub fn num_attribute(&self) -> usize {
        self.num_attribute
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn linear(&self) -> &Array1<f64> {
        &self.linear
    }

    pub fn pairwise(&self) -> &Array2<f64> {
        &self.pairwise
    }

    /// Computes the raw model output for a sparse case.
    ///
    /// Attributes outside the model's attribute space are ignored.
    pub fn predict_row(&self, row: &[Feature]) -> f64 {
        let mut sums = vec![0.; self.num_factor];
        self.predict_row_with_sums(row, &mut sums)
    }

    /// Computes the raw model output for a sparse case, leaving in `sums[f]` the sum of
    /// `pairwise[j, f] * x_j` over the case's attributes.
    ///
    /// `sums` must hold at least `num_factor` entries.
    pub fn predict_row_with_sums(&self, row: &[Feature], sums: &mut [f64]) -> f64 {
        debug_assert!(sums.len() >= self.num_factor);
        let mut result = 0.;
        if self.bias_enabled {
            result += self.bias;
        }

        if self.linear_enabled {
            result += row
                .iter()
                .filter(|x| x.id < self.num_attribute)
                .map(|x| self.linear[x.id] * x.value)
                .sum::<f64>();
        }

        for (f, sum) in sums.iter_mut().enumerate().take(self.num_factor) {
            let mut sum_f = 0.;
            let mut sum_sqr_f = 0.;
            for x in row.iter().filter(|x| x.id < self.num_attribute) {
                let d = self.pairwise[[x.id, f]] * x.value;
                sum_f += d;
                sum_sqr_f += d * d;
            }

            *sum = sum_f;
            result += 0.5 * (sum_f * sum_f - sum_sqr_f);
        }

        result
    }

    /// Dumps the model's shape and a summary of its parameters.
    pub fn debug(&self) {
        debug!(
            "fm model: num_attribute={} use_bias={} use_linear={} num_factor={}",
            self.num_attribute, self.bias_enabled, self.linear_enabled, self.num_factor
        );
        debug!(
            "fm model: bias={} |linear|={:.6} |pairwise|={:.6}",
            self.bias,
            self.linear.dot(&self.linear).sqrt(),
            self.pairwise.iter().map(|v| v * v).sum::<f64>().sqrt()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn dims_must_be_a_triple() {
        assert!(ModelSpec::new(&[1, 1], 0., 0.1).is_err());
        assert!(ModelSpec::new(&[1, 1, 8, 2], 0., 0.1).is_err());

        let spec = ModelSpec::new(&[0, 1, 4], 0., 0.1).unwrap();
        assert!(!spec.bias_enabled());
        assert!(spec.linear_enabled());
        assert_eq!(spec.num_factor(), 4);
    }

    #[test]
    fn stdev_must_be_positive() {
        assert!(ModelSpec::new(&[1, 1, 8], 0., 0.).is_err());
        assert!(ModelSpec::new(&[1, 1, 8], 0., f64::NAN).is_err());
    }

    #[test]
    fn finalize_sizes_terms() {
        let spec = ModelSpec::new(&[1, 1, 8], 0., 0.1).unwrap();
        let model = spec.finalize(20, PairwiseInit::Zeros, &mut rng());

        assert_eq!(model.num_attribute(), 20);
        assert_eq!(model.linear().len(), 20);
        assert_eq!(model.pairwise().dim(), (20, 8));
        assert!(model.pairwise().iter().all(|&v| v == 0.));
    }

    #[test]
    fn disabled_linear_is_not_allocated() {
        let spec = ModelSpec::new(&[1, 0, 2], 0., 0.1).unwrap();
        let model = spec.finalize(5, PairwiseInit::Zeros, &mut rng());

        assert!(model.linear().is_empty());
        assert_eq!(model.pairwise().dim(), (5, 2));
    }

    #[test]
    fn gaussian_init_fills_factors() {
        let spec = ModelSpec::new(&[1, 1, 4], 0., 0.1).unwrap();
        let model = spec.finalize(50, PairwiseInit::Gaussian, &mut rng());

        assert!(model.pairwise().iter().any(|&v| v != 0.));
        let mean = model.pairwise().mean().unwrap();
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn prediction_combines_all_terms() {
        let spec = ModelSpec::new(&[1, 1, 1], 0., 0.1).unwrap();
        let mut model = spec.finalize(2, PairwiseInit::Zeros, &mut rng());
        model.bias = 0.5;
        model.linear[0] = 1.;
        model.linear[1] = 2.;
        model.pairwise[[0, 0]] = 1.;
        model.pairwise[[1, 0]] = 3.;

        // 0.5 + 1*1 + 2*2 + (1*1)*(3*2)
        let row = [Feature::new(0, 1.), Feature::new(1, 2.)];
        let mut sums = [0.];
        let p = model.predict_row_with_sums(&row, &mut sums);

        assert!((p - 11.5).abs() < 1e-12);
        assert_eq!(sums, [7.]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn short_sums_buffer_is_rejected() {
        let spec = ModelSpec::new(&[1, 1, 2], 0., 0.1).unwrap();
        let model = spec.finalize(2, PairwiseInit::Zeros, &mut rng());
        let row = [Feature::new(0, 1.)];

        model.predict_row_with_sums(&row, &mut [0.]);
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let spec = ModelSpec::new(&[1, 1, 2], 0., 0.1).unwrap();
        let mut model = spec.finalize(1, PairwiseInit::Zeros, &mut rng());
        model.bias = 1.;

        assert_eq!(model.predict_row(&[Feature::new(7, 3.)]), 1.);
    }
}
