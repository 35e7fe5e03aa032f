pub mod commands;
pub mod orchestrator;
pub mod report;
mod types;

pub use commands::{compile, render_dockerfile};
pub use orchestrator::{Driver, execute};
pub use report::{DEFAULT_TAIL_LINES, Summary, SummaryEntry, summarize, summarize_with};
pub use types::{BuildReport, BuildStep, OverallStatus, StepResult, StepStatus};
