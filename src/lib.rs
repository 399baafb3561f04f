//! Configuration and lifecycle orchestration for factorization machines.
//!
//! A [`Trainer`] is built from a [`TrainerConfig`], sized from the datasets it is trained
//! on, and then used to predict and to extract the learned [`Parameters`].

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod rlog;
pub mod strategy;
pub mod training;

pub use config::{Method, TrainerConfig};
pub use data::Dataset;
pub use error::{ErrorKind, FmError, Result};
pub use model::Parameters;
pub use training::{TrainReport, Trainer, TrainerBuilder};
