//! Server version parsing and capability negotiation.

mod features;
mod version;

pub use features::FeatureSet;
pub use version::ServerVersion;
