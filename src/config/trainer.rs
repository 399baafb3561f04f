use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FmError, Result};

/// Every hyperparameter a `Trainer` is built from.
///
/// Values are kept raw here, `TrainerBuilder` validates and resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// One of `sgd`, `sgda` or `mcmc`.
    pub method: String,
    /// `[bias, linear, num_factor]`, bias and linear being enabled when non-zero.
    pub dims: Vec<usize>,
    /// 1 or 3 learning rates for the sgd family, empty for mcmc.
    pub learn_rate: Vec<f64>,
    /// 0, 1, 3 or (mcmc only) `1 + 2 * groups` regularization values.
    pub reg: Vec<f64>,
    pub init_mean: f64,
    pub init_stdev: f64,
    pub num_iter: usize,
    /// Test cases mcmc evaluates on, `None` to use the whole test set.
    pub num_eval_cases: Option<usize>,
    pub sampling: bool,
    pub multilevel: bool,
    /// Where to write the per-iteration log, `None` or an empty path disables it.
    pub log_target: Option<PathBuf>,
    pub verbosity: u32,
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            method: "mcmc".into(),
            dims: vec![1, 1, 8],
            learn_rate: Vec::new(),
            reg: Vec::new(),
            init_mean: 0.,
            init_stdev: 0.1,
            num_iter: 100,
            num_eval_cases: None,
            sampling: true,
            multilevel: true,
            log_target: None,
            verbosity: 0,
            seed: None,
        }
    }
}

impl TrainerConfig {
    /// Creates a default config for `method`.
    pub fn new(method: &str) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_dims(mut self, dims: &[usize]) -> Self {
        self.dims = dims.to_vec();
        self
    }

    pub fn with_learn_rate(mut self, learn_rate: &[f64]) -> Self {
        self.learn_rate = learn_rate.to_vec();
        self
    }

    pub fn with_reg(mut self, reg: &[f64]) -> Self {
        self.reg = reg.to_vec();
        self
    }

    pub fn with_init_stdev(mut self, init_stdev: f64) -> Self {
        self.init_stdev = init_stdev;
        self
    }

    pub fn with_num_iter(mut self, num_iter: usize) -> Self {
        self.num_iter = num_iter;
        self
    }

    pub fn with_num_eval_cases(mut self, num_eval_cases: Option<usize>) -> Self {
        self.num_eval_cases = num_eval_cases;
        self
    }

    pub fn with_sampling(mut self, sampling: bool) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_multilevel(mut self, multilevel: bool) -> Self {
        self.multilevel = multilevel;
        self
    }

    pub fn with_log_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_target = Some(path.into());
        self
    }

    pub fn with_verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parses a config from JSON, missing fields taking their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FmError::Parse {
            origin: "config".into(),
            line: e.line(),
            msg: e.to_string(),
        })
    }

    /// Loads a config from a JSON file, see [`TrainerConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| FmError::Parse {
            origin: path.display().to_string(),
            line: e.line(),
            msg: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_follow_libfm() {
        let config = TrainerConfig::default();

        assert_eq!(config.method, "mcmc");
        assert_eq!(config.dims, vec![1, 1, 8]);
        assert_eq!(config.init_stdev, 0.1);
        assert_eq!(config.num_iter, 100);
        assert!(config.sampling && config.multilevel);
        assert!(config.num_eval_cases.is_none());
    }

    #[test]
    fn json_fills_missing_fields() {
        let json = r#"{ "method": "sgd", "learn_rate": [0.01], "num_iter": 5 }"#;
        let config = TrainerConfig::from_json_str(json).unwrap();

        assert_eq!(config.method, "sgd");
        assert_eq!(config.learn_rate, vec![0.01]);
        assert_eq!(config.num_iter, 5);
        assert_eq!(config.dims, vec![1, 1, 8]);
    }

    #[test]
    fn malformed_json_is_a_data_error() {
        let err = TrainerConfig::from_json_str("{ \"num_iter\": -3 }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
