mod cli;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use cli::Cli;
use fm_orchestra::{
    Trainer, TrainerConfig,
    data::{Dataset, load_groups, load_libfm},
    model::Parameters,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TrainerConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => cli.trainer_config(),
    };

    let mut train = load(&cli.train)?;
    if let Some(path) = &cli.meta {
        let groups = load_groups(path)
            .with_context(|| format!("failed to read attribute groups {}", path.display()))?;
        train = train.with_attribute_groups(groups);
    }

    let test = cli.test.as_deref().map(load).transpose()?;
    let validation = cli.validation.as_deref().map(load).transpose()?;

    let mut trainer = Trainer::new(&config).context("invalid trainer config")?;
    let report = trainer
        .train(Some(&train), test.as_ref(), validation.as_ref())
        .context("training failed")?;
    info!(
        "trained on {} attributes in {} groups",
        report.num_attribute, report.num_attribute_groups
    );

    if let (Some(path), Some(test)) = (&cli.out, &test) {
        let predictions = trainer.predict(test)?;
        write_predictions(path, &predictions)
            .with_context(|| format!("failed to write predictions to {}", path.display()))?;
    }

    if let Some(path) = &cli.save_params {
        write_parameters(path, &trainer.parameters()?)
            .with_context(|| format!("failed to write parameters to {}", path.display()))?;
    }

    Ok(())
}

fn load(path: &Path) -> Result<Dataset> {
    load_libfm(path).with_context(|| format!("failed to load {}", path.display()))
}

fn write_predictions(path: &Path, predictions: &[f64]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for p in predictions {
        writeln!(out, "{p}")?;
    }

    out.flush()?;
    Ok(())
}

fn write_parameters(path: &Path, params: &Parameters) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, params)?;

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    #[test]
    fn parameters_are_fully_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let params = Parameters {
            bias: 0.5,
            linear: array![1., 2.],
            pairwise: Array2::from_elem((2, 3), 0.25),
        };

        write_parameters(&path, &params).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["bias"], 0.5);
        assert_eq!(json["linear"], serde_json::json!([1., 2.]));
        assert_eq!(json["pairwise"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn predictions_are_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        write_predictions(&path, &[1.5, 3.]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1.5\n3\n");
    }
}
