use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::config::HealthCheck;
use crate::docker::StepError;

/// One unit of work in a compiled build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BuildStep {
    /// Install `packages` with the fully rendered `command`.
    InstallDependencies {
        command: String,
        packages: Vec<String>,
    },
    RunCommand(String),
    HealthCheck(HealthCheck),
    /// Final name given to the image.
    TagImage(String),
}

impl BuildStep {
    pub fn kind(&self) -> &'static str {
        match self {
            BuildStep::InstallDependencies { .. } => "install",
            BuildStep::RunCommand(_) => "run",
            BuildStep::HealthCheck(_) => "health",
            BuildStep::TagImage(_) => "tag",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::InstallDependencies { packages, .. } => {
                write!(f, "install {}", packages.join(", "))
            }
            BuildStep::RunCommand(cmd) => write!(f, "run `{cmd}`"),
            BuildStep::HealthCheck(check) => write!(
                f,
                "health check `{}` ({} x {})",
                check.test,
                check.retries,
                humantime::format_duration(check.interval)
            ),
            BuildStep::TagImage(name) => write!(f, "tag {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed(StepError),
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failed(_) => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of executing one [`BuildStep`].
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: BuildStep,
    pub status: StepStatus,
    pub output: String,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl StepResult {
    pub fn skipped(step: BuildStep) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            output: String::new(),
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Failed => "failed",
        }
    }
}

/// Ordered step outcomes of one build, finalized after the last step or the
/// first failure.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub status: OverallStatus,
    pub steps: Vec<StepResult>,
    /// Name the image was tagged with, present only when tagging succeeded.
    pub image: Option<String>,
}

impl BuildReport {
    pub fn new(steps: Vec<StepResult>) -> Self {
        let status = if steps.iter().all(|r| r.status.is_success()) {
            OverallStatus::Success
        } else {
            OverallStatus::Failed
        };
        let image = steps.iter().rev().find_map(|r| match (&r.step, &r.status) {
            (BuildStep::TagImage(name), StepStatus::Success) => Some(name.clone()),
            _ => None,
        });
        Self {
            status,
            steps,
            image,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OverallStatus::Success
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(step: BuildStep, status: StepStatus) -> StepResult {
        StepResult {
            step,
            status,
            output: String::new(),
            duration: Duration::from_millis(1500),
        }
    }

    #[test]
    fn report_status_requires_every_step_to_succeed() {
        let ok = BuildReport::new(vec![
            result(BuildStep::RunCommand("ls".into()), StepStatus::Success),
            result(BuildStep::TagImage("demo:latest".into()), StepStatus::Success),
        ]);
        assert!(ok.succeeded());
        assert_eq!(ok.image.as_deref(), Some("demo:latest"));

        let skipped = BuildReport::new(vec![
            result(BuildStep::RunCommand("ls".into()), StepStatus::Success),
            StepResult::skipped(BuildStep::TagImage("demo:latest".into())),
        ]);
        assert_eq!(skipped.status, OverallStatus::Failed);
        assert!(skipped.image.is_none());
    }

    #[test]
    fn empty_report_is_successful() {
        let report = BuildReport::new(Vec::new());
        assert!(report.succeeded());
        assert!(report.image.is_none());
    }

    #[test]
    fn step_display_is_readable() {
        let install = BuildStep::InstallDependencies {
            command: "pip install flask gunicorn".into(),
            packages: vec!["flask".into(), "gunicorn".into()],
        };
        assert_eq!(install.to_string(), "install flask, gunicorn");
        assert_eq!(
            BuildStep::RunCommand("python app.py".into()).to_string(),
            "run `python app.py`"
        );
        assert_eq!(BuildStep::TagImage("demo:1".into()).kind(), "tag");
    }

    #[test]
    fn step_result_serializes_duration_in_millis() {
        let r = result(
            BuildStep::RunCommand("ls".into()),
            StepStatus::Failed(StepError::NonZeroExit {
                command: "ls".into(),
                code: Some(2),
            }),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["status"]["status"], "failed");
        assert_eq!(json["status"]["error"]["kind"], "non_zero_exit");
        assert_eq!(json["step"]["kind"], "run_command");
        assert_eq!(json["step"]["detail"], "ls");
    }
}
