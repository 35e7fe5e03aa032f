//! Build file loading: YAML on disk to a validated [`BuildSpec`].

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{load, parse};
pub use types::{BuildSpec, DEFAULT_INSTALL_COMMAND, EmptyBuildPolicy, HealthCheck};

pub(crate) use types::human_duration;
