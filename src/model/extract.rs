use ndarray::{Array1, Array2};
use serde::{Serialize, Serializer, ser::SerializeStruct};

use super::ModelParameters;

/// A read-only projection of a trained model honoring its enable flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// The global bias, 0 when the bias term is disabled.
    pub bias: f64,
    /// One weight per attribute, empty when the linear term is disabled.
    pub linear: Array1<f64>,
    /// The `num_attribute × num_factor` factor matrix.
    pub pairwise: Array2<f64>,
}

impl Parameters {
    /// Extracts the parameters of `model`.
    pub fn from_model(model: &ModelParameters) -> Self {
        let bias = if model.bias_enabled() { model.bias() } else { 0. };
        let linear = if model.linear_enabled() {
            model.linear().clone()
        } else {
            Array1::zeros(0)
        };

        Self {
            bias,
            linear,
            pairwise: model.pairwise().clone(),
        }
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pairwise: Vec<Vec<f64>> = self
            .pairwise
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();

        let mut state = serializer.serialize_struct("Parameters", 3)?;
        state.serialize_field("bias", &self.bias)?;
        state.serialize_field("linear", &self.linear.to_vec())?;
        state.serialize_field("pairwise", &pairwise)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, PairwiseInit};
    use rand::{SeedableRng, rngs::StdRng};

    fn model(dims: &[usize]) -> ModelParameters {
        let spec = ModelSpec::new(dims, 0., 0.1).unwrap();
        let mut model = spec.finalize(3, PairwiseInit::Zeros, &mut StdRng::seed_from_u64(1));
        model.bias = 2.;
        model
    }

    #[test]
    fn disabled_terms_are_blanked() {
        let params = Parameters::from_model(&model(&[0, 0, 2]));

        assert_eq!(params.bias, 0.);
        assert!(params.linear.is_empty());
        assert_eq!(params.pairwise.dim(), (3, 2));
    }

    #[test]
    fn enabled_terms_are_copied() {
        let params = Parameters::from_model(&model(&[1, 1, 2]));

        assert_eq!(params.bias, 2.);
        assert_eq!(params.linear.len(), 3);
    }

    #[test]
    fn serializes_as_nested_lists() {
        let params = Parameters::from_model(&model(&[1, 0, 1]));
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["bias"], 2.);
        assert_eq!(json["linear"].as_array().unwrap().len(), 0);
        assert_eq!(json["pairwise"].as_array().unwrap().len(), 3);
    }
}
