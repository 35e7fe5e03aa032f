use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::types::{BuildReport, OverallStatus, StepStatus};

/// Output lines kept for a failed step, mirroring the tail a build log viewer shows.
pub const DEFAULT_TAIL_LINES: usize = 20;

mod symbols {
    pub const SUCCESS: &str = "✓";
    pub const ERROR: &str = "✗";
    pub const SKIPPED: &str = "-";
}

/// Human and machine readable digest of a [`BuildReport`].
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub status: OverallStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when the report holds no steps at all; status is still success.
    pub degenerate: bool,
    pub image: Option<String>,
    /// Suggested command to start the freshly tagged image.
    pub run_command: Option<String>,
    pub entries: Vec<SummaryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub label: String,
    pub status: &'static str,
    pub duration_ms: u64,
    pub reason: Option<String>,
    pub log_tail: Vec<String>,
}

/// Summarize with the default output tail.
pub fn summarize(report: &BuildReport) -> Summary {
    summarize_with(report, DEFAULT_TAIL_LINES)
}

/// Summarize, keeping up to `tail` trailing output lines for each failed step.
pub fn summarize_with(report: &BuildReport, tail: usize) -> Summary {
    let mut passed = 0;
    let mut failed = 0;
    let mut skipped = 0;

    let entries: Vec<SummaryEntry> = report
        .steps
        .iter()
        .map(|r| {
            let (reason, log_tail) = match &r.status {
                StepStatus::Success => {
                    passed += 1;
                    (None, Vec::new())
                }
                StepStatus::Failed(err) => {
                    failed += 1;
                    (Some(err.to_string()), tail_lines(&r.output, tail))
                }
                StepStatus::Skipped => {
                    skipped += 1;
                    (None, Vec::new())
                }
            };
            SummaryEntry {
                label: r.step.to_string(),
                status: r.status.as_str(),
                duration_ms: r.duration.as_millis() as u64,
                reason,
                log_tail,
            }
        })
        .collect();

    // Derived from the entries rather than trusted from the report.
    let status = if failed == 0 && skipped == 0 {
        OverallStatus::Success
    } else {
        OverallStatus::Failed
    };

    let run_command = match status {
        OverallStatus::Success => report.image.as_ref().map(|i| format!("docker run --rm {i}")),
        OverallStatus::Failed => None,
    };

    Summary {
        status,
        total: report.steps.len(),
        passed,
        failed,
        skipped,
        degenerate: report.steps.is_empty(),
        image: report.image.clone(),
        run_command,
        entries,
    }
}

impl Summary {
    /// Name `program` instead of `docker` in the suggested run command.
    pub fn with_engine(mut self, program: &str) -> Self {
        if let Some(image) = &self.image
            && self.run_command.is_some()
        {
            self.run_command = Some(format!("{program} run --rm {image}"));
        }
        self
    }
}

fn tail_lines(output: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:02}s", secs, millis / 10)
    } else {
        format!("{}ms", millis)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            OverallStatus::Success => {
                write!(f, "Build succeeded: {}/{} steps passed", self.passed, self.total)?
            }
            OverallStatus::Failed => write!(
                f,
                "Build failed: {} passed, {} failed, {} skipped",
                self.passed, self.failed, self.skipped
            )?,
        }
        if let Some(image) = &self.image {
            write!(f, " ({image})")?;
        }
        writeln!(f)?;

        if self.degenerate {
            writeln!(f, "  warning: the plan contained no steps; nothing was built")?;
        }

        for (idx, entry) in self.entries.iter().enumerate() {
            let symbol = match entry.status {
                "success" => symbols::SUCCESS,
                "failed" => symbols::ERROR,
                _ => symbols::SKIPPED,
            };
            let timing = if entry.status == "skipped" {
                "skipped".to_string()
            } else {
                format_duration(Duration::from_millis(entry.duration_ms))
            };
            writeln!(
                f,
                "  {symbol} [{}/{}] {} ({timing})",
                idx + 1,
                self.total,
                entry.label
            )?;
            if let Some(reason) = &entry.reason {
                writeln!(f, "        {reason}")?;
            }
            for line in &entry.log_tail {
                writeln!(f, "        | {line}")?;
            }
        }

        if let Some(cmd) = &self.run_command {
            writeln!(f, "Run it with: {cmd}")?;
        }
        Ok(())
    }
}
