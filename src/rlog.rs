use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;

use crate::error::{FmError, Result};

/// A tab-separated, one-row-per-iteration log of a training run, readable as an R table.
///
/// The sink is opened once and owned by the trainer, strategies only borrow it while
/// they learn. Cells not recorded for a row are written as `NA`. The underlying file is
/// flushed on `flush` and closed on drop.
pub struct RunLog {
    path: PathBuf,
    out: BufWriter<File>,
    columns: Vec<String>,
    row: Vec<Option<f64>>,
    header_written: bool,
}

impl RunLog {
    /// Creates (truncating) the log file at `path`.
    ///
    /// # Returns
    /// An error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| FmError::LogSink {
            path: path.to_path_buf(),
            source,
        })?;

        info!("logging to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            columns: Vec::new(),
            row: Vec::new(),
            header_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declares the columns of the table and writes the header line.
    ///
    /// Only the first call writes a header, later calls must declare the same columns
    /// and just reset the pending row.
    pub fn begin(&mut self, columns: &[&str]) -> Result<()> {
        if !self.header_written {
            self.columns = columns.iter().map(|c| c.to_string()).collect();
            writeln!(self.out, "{}", self.columns.join("\t"))?;
            self.header_written = true;
        }

        self.row = vec![None; self.columns.len()];
        Ok(())
    }

    /// Sets the value of `column` in the pending row. Unknown columns are ignored.
    pub fn record(&mut self, column: &str, value: f64) {
        if let Some(idx) = self.columns.iter().position(|c| c == column) {
            self.row[idx] = Some(value);
        }
    }

    /// Writes the pending row and starts a new one.
    pub fn new_line(&mut self) -> Result<()> {
        let cells: Vec<String> = self
            .row
            .iter_mut()
            .map(|cell| match cell.take() {
                Some(value) => value.to_string(),
                None => "NA".to_string(),
            })
            .collect();

        writeln!(self.out, "{}", cells.join("\t"))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
