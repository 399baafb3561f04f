mod dataset;
mod loader;

pub use dataset::{Dataset, Feature};
pub use loader::{load_groups, load_libfm, parse_groups, parse_libfm};
