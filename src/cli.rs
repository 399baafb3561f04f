use std::path::PathBuf;

use clap::Parser;
use fm_orchestra::TrainerConfig;

/// Trains a factorization machine on libFM-formatted data.
#[derive(Parser, Debug)]
#[command(name = "fm-orchestra")]
#[command(about = "Factorization machines trained by sgd, adaptive sgd or mcmc")]
#[command(version)]
pub struct Cli {
    /// Train set in libFM format
    #[arg(long)]
    pub train: PathBuf,

    /// Test set in libFM format
    #[arg(long)]
    pub test: Option<PathBuf>,

    /// Validation set, required by sgda
    #[arg(long)]
    pub validation: Option<PathBuf>,

    /// Attribute groups, one group id per line
    #[arg(long)]
    pub meta: Option<PathBuf>,

    /// JSON trainer config, used instead of the hyperparameter flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Learning method: sgd, sgda or mcmc
    #[arg(long, default_value = "mcmc")]
    pub method: String,

    /// 'bias,linear,factors'
    #[arg(long, value_delimiter = ',', default_value = "1,1,8")]
    pub dim: Vec<usize>,

    /// One rate or 'bias,linear,pairwise' rates, sgd family only
    #[arg(long, value_delimiter = ',')]
    pub learn_rate: Vec<f64>,

    /// Regularization values
    #[arg(long, value_delimiter = ',')]
    pub reg: Vec<f64>,

    /// Standard deviation of the factor initialization
    #[arg(long, default_value = "0.1")]
    pub init_stdev: f64,

    /// Number of iterations
    #[arg(long, default_value = "100")]
    pub iter: usize,

    /// Test cases mcmc evaluates on, -1 for the whole test set
    #[arg(
        long,
        default_value = "-1",
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub eval_cases: i64,

    /// Use the conditional means instead of sampling (mcmc)
    #[arg(long)]
    pub no_sampling: bool,

    /// Keep the hyperparameters fixed (mcmc)
    #[arg(long)]
    pub no_multilevel: bool,

    /// Per-iteration log file
    #[arg(long)]
    pub rlog: Option<PathBuf>,

    /// Where to write the test set predictions
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Where to write the learned parameters as JSON
    #[arg(long)]
    pub save_params: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// 0 for progress, 1 for model dumps, 2 and above for everything
    #[arg(long, default_value = "0")]
    pub verbosity: u32,
}

impl Cli {
    /// Builds the trainer config described by the hyperparameter flags.
    pub fn trainer_config(&self) -> TrainerConfig {
        let mut config = TrainerConfig::new(&self.method)
            .with_dims(&self.dim)
            .with_learn_rate(&self.learn_rate)
            .with_reg(&self.reg)
            .with_init_stdev(self.init_stdev)
            .with_num_iter(self.iter)
            .with_num_eval_cases(usize::try_from(self.eval_cases).ok())
            .with_sampling(!self.no_sampling)
            .with_multilevel(!self.no_multilevel)
            .with_verbosity(self.verbosity);

        if let Some(path) = &self.rlog {
            config = config.with_log_target(path);
        }

        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }

        config
    }
}
