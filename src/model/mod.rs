mod extract;
mod meta;
mod params;

pub use extract::Parameters;
pub use meta::MetaInfo;
pub use params::{ModelParameters, ModelSpec, PairwiseInit};
