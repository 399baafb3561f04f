use crate::{data::Dataset, model::ModelParameters};

/// The range regression predictions are clamped to, taken from the train set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRange {
    pub min: f64,
    pub max: f64,
}

impl TargetRange {
    pub fn of(train: &Dataset) -> Self {
        Self {
            min: train.min_target(),
            max: train.max_target(),
        }
    }

    pub fn clamp(&self, prediction: f64) -> f64 {
        prediction.min(self.max).max(self.min)
    }
}

/// Predicts every case of `data` with `model`, clamped to `range`.
pub(crate) fn predict_clamped(
    model: &ModelParameters,
    data: &Dataset,
    range: TargetRange,
) -> Vec<f64> {
    let mut sums = vec![0.; model.num_factor()];
    data.cases()
        .map(|(row, _)| range.clamp(model.predict_row_with_sums(row, &mut sums)))
        .collect()
}

/// Root mean squared error between `predictions` and `targets`, over the shorter of the two.
///
/// An empty comparison has an error of 0.
pub(crate) fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    let n = predictions.len().min(targets.len());
    if n == 0 {
        return 0.;
    }

    let sse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();

    (sse / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_train_targets() {
        let train = Dataset::from_cases([(1., vec![(0, 1.)]), (5., vec![(0, 1.)])]);
        let range = TargetRange::of(&train);

        assert_eq!(range.clamp(0.), 1.);
        assert_eq!(range.clamp(3.), 3.);
        assert_eq!(range.clamp(7.), 5.);
    }

    #[test]
    fn rmse_of_known_errors() {
        let err = rmse(&[1., 2., 3.], &[1., 4., 3.]);
        assert!((err - (4f64 / 3.).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rmse_of_nothing_is_zero() {
        assert_eq!(rmse(&[], &[]), 0.);
    }
}
