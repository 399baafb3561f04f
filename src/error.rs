use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, FmError>;

/// The broad category an `FmError` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The hyperparameters are malformed or inconsistent with the data.
    Config,
    /// An operation was called while the trainer is not in the right state or lacks an input.
    Precondition,
    /// A file could not be opened, read or written.
    Io,
    /// An input file has malformed contents.
    Data,
    /// A learning strategy failed to draw from a distribution.
    Sampling,
}

/// The crate's error type.
#[derive(Debug)]
pub enum FmError {
    UnknownMethod(String),
    DimsLength {
        got: usize,
    },
    InvalidHyperparameter {
        name: &'static str,
        reason: String,
    },
    RegularizationShape {
        method: &'static str,
        got: usize,
        groups: Option<usize>,
    },
    LearningRateShape {
        got: usize,
    },
    LearningRateForMcmc,
    AttributeGroups(String),
    MissingTrainSet,
    MissingValidationSet,
    NotTrained,
    LogSink {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        origin: String,
        line: usize,
        msg: String,
    },
    Sampling {
        what: &'static str,
        reason: String,
    },
    Io(io::Error),
}

impl FmError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FmError::UnknownMethod(_)
            | FmError::DimsLength { .. }
            | FmError::InvalidHyperparameter { .. }
            | FmError::RegularizationShape { .. }
            | FmError::LearningRateShape { .. }
            | FmError::LearningRateForMcmc
            | FmError::AttributeGroups(_) => ErrorKind::Config,
            FmError::MissingTrainSet | FmError::MissingValidationSet | FmError::NotTrained => {
                ErrorKind::Precondition
            }
            FmError::LogSink { .. } | FmError::Io(_) => ErrorKind::Io,
            FmError::Parse { .. } => ErrorKind::Data,
            FmError::Sampling { .. } => ErrorKind::Sampling,
        }
    }
}

impl Display for FmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FmError::UnknownMethod(method) => {
                write!(f, "unknown method '{method}', expected one of sgd, sgda, mcmc")
            }
            FmError::DimsLength { got } => write!(
                f,
                "dims must have exactly 3 entries (bias, linear, num_factor), got {got}"
            ),
            FmError::InvalidHyperparameter { name, reason } => {
                write!(f, "invalid hyperparameter {name}: {reason}")
            }
            FmError::RegularizationShape {
                method,
                got,
                groups: Some(groups),
            } => write!(
                f,
                "regularization for {method} must have 0, 1, 3 or {} values ({groups} attribute groups), got {got}",
                1 + 2 * groups
            ),
            FmError::RegularizationShape {
                method: "mcmc",
                got,
                groups: None,
            } => write!(
                f,
                "regularization for mcmc must have 0, 1, 3 or 1 + 2 * attribute groups values, got {got}"
            ),
            FmError::RegularizationShape {
                method,
                got,
                groups: None,
            } => write!(
                f,
                "regularization for {method} must have 0, 1 or 3 values, got {got}"
            ),
            FmError::LearningRateShape { got } => {
                write!(f, "learning rate must have 1 or 3 values, got {got}")
            }
            FmError::LearningRateForMcmc => {
                write!(f, "mcmc does not use a learning rate, leave it empty")
            }
            FmError::AttributeGroups(msg) => write!(f, "invalid attribute groups: {msg}"),
            FmError::MissingTrainSet => write!(f, "a train set is required"),
            FmError::MissingValidationSet => {
                write!(f, "adaptive regularization requires a validation set")
            }
            FmError::NotTrained => write!(f, "the model has not been trained yet"),
            FmError::LogSink { path, source } => {
                write!(f, "unable to open log file {}: {source}", path.display())
            }
            FmError::Parse { origin, line, msg } => write!(f, "{origin}:{line}: {msg}"),
            FmError::Sampling { what, reason } => write!(f, "failed to sample {what}: {reason}"),
            FmError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FmError::LogSink { source, .. } => Some(source),
            FmError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FmError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_categories() {
        assert_eq!(FmError::UnknownMethod("als".into()).kind(), ErrorKind::Config);
        assert_eq!(FmError::MissingValidationSet.kind(), ErrorKind::Precondition);
        assert_eq!(
            FmError::Io(io::Error::other("boom")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn regularization_message_names_grouped_length() {
        let err = FmError::RegularizationShape {
            method: "mcmc",
            got: 4,
            groups: Some(2),
        };

        assert!(err.to_string().contains("or 5 values"));
    }
}
