use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::info;

use super::Dataset;
use crate::error::{FmError, Result};

/// Loads a dataset in the libFM / SVMlight text format.
///
/// # Arguments
/// * `path` - The file to read.
///
/// # Returns
/// The dataset, or an error if the file cannot be read or has malformed lines.
pub fn load_libfm(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    let dataset = parse_libfm(BufReader::new(file), &path.display().to_string())?;
    info!(
        "loaded {}: cases={} features={}",
        path.display(),
        dataset.num_cases(),
        dataset.num_feature()
    );

    Ok(dataset)
}

/// Parses a dataset in the libFM / SVMlight text format.
///
/// Every line holds one case, `target id:value id:value ...`. Blank lines and lines starting
/// with `#` are skipped.
///
/// # Arguments
/// * `reader` - Where to read the text from.
/// * `origin` - A name for the source, used in error messages.
pub fn parse_libfm<R: BufRead>(reader: R, origin: &str) -> Result<Dataset> {
    let mut dataset = Dataset::empty();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_err = |msg: String| FmError::Parse {
            origin: origin.to_string(),
            line: idx + 1,
            msg,
        };

        let mut tokens = line.split_whitespace();
        let target = tokens.next().unwrap_or_default();
        let target: f64 = target
            .parse()
            .map_err(|_| parse_err(format!("invalid target '{target}'")))?;

        let features = tokens
            .map(|token| {
                let (id, value) = token
                    .split_once(':')
                    .ok_or_else(|| parse_err(format!("expected id:value, got '{token}'")))?;
                let id: usize = id
                    .parse()
                    .ok()
                    .filter(|id: &usize| id.checked_add(1).is_some())
                    .ok_or_else(|| parse_err(format!("invalid attribute id '{id}'")))?;
                let value: f64 = value
                    .parse()
                    .map_err(|_| parse_err(format!("invalid value '{value}'")))?;
                Ok((id, value))
            })
            .collect::<Result<Vec<_>>>()?;

        dataset.push_case(target, features);
    }

    Ok(dataset)
}

/// Loads an attribute-group file: one group id per line, line `j` being the group of
/// attribute `j`.
pub fn load_groups(path: &Path) -> Result<Vec<usize>> {
    let file = File::open(path)?;
    parse_groups(BufReader::new(file), &path.display().to_string())
}

/// Parses an attribute-group listing, see [`load_groups`].
pub fn parse_groups<R: BufRead>(reader: R, origin: &str) -> Result<Vec<usize>> {
    let mut groups = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let group = line.parse().map_err(|_| FmError::Parse {
            origin: origin.to_string(),
            line: idx + 1,
            msg: format!("invalid group id '{line}'"),
        })?;
        groups.push(group);
    }

    Ok(groups)
}
