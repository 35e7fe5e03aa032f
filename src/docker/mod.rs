// Container engine access: the capability trait, the docker CLI backend,
// and process plumbing with timeouts.

pub mod dockerfile;
pub mod engine;
pub mod run;
pub mod types;

pub use engine::{ContainerEngine, DockerCli};
pub use types::{ContainerId, EngineSettings, ImageId, ReadyState, StepError};
