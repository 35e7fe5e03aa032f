use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::HealthCheck;
use crate::docker::{ContainerEngine, ContainerId, ImageId, ReadyState, StepError};

use super::types::{BuildReport, BuildStep, StepResult, StepStatus};

/// Execute `steps` against `engine` with the default (real) sleeper.
///
/// See [`Driver::execute`].
pub fn execute(
    base_image: &str,
    steps: &[BuildStep],
    engine: &mut dyn ContainerEngine,
) -> BuildReport {
    Driver::new(engine).execute(base_image, steps)
}

/// Runs a compiled plan one step at a time, stopping at the first failure.
pub struct Driver<'a> {
    engine: &'a mut dyn ContainerEngine,
    sleep: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a> Driver<'a> {
    pub fn new(engine: &'a mut dyn ContainerEngine) -> Self {
        Self {
            engine,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the wait between health probes.
    pub fn with_sleeper(mut self, sleep: impl FnMut(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Execute `steps` in order on top of `base_image`.
    ///
    /// The base build is issued right before the first step and its output
    /// or failure is attributed to that step. After a failure every remaining
    /// step is recorded as skipped and the engine is not called again.
    /// Releasing engine bookkeeping ([`ContainerEngine::cleanup`]) is left to
    /// the caller once the report is final.
    pub fn execute(mut self, base_image: &str, steps: &[BuildStep]) -> BuildReport {
        let mut results = Vec::with_capacity(steps.len());
        let mut image: Option<ImageId> = None;
        let mut failed = false;

        for (idx, step) in steps.iter().enumerate() {
            if failed {
                results.push(StepResult::skipped(step.clone()));
                continue;
            }

            info!(step = idx + 1, total = steps.len(), "{step}");
            let start = Instant::now();
            let mut output = String::new();
            let outcome = self.run_step(base_image, step, &mut image, &mut output);
            let duration = start.elapsed();

            let status = match outcome {
                Ok(()) => {
                    info!(step = idx + 1, elapsed = ?duration, "step succeeded");
                    StepStatus::Success
                }
                Err(err) => {
                    warn!(step = idx + 1, error = %err, "step failed; skipping the rest");
                    failed = true;
                    StepStatus::Failed(err)
                }
            };

            results.push(StepResult {
                step: step.clone(),
                status,
                output,
                duration,
            });
        }

        BuildReport::new(results)
    }

    fn run_step(
        &mut self,
        base_image: &str,
        step: &BuildStep,
        image: &mut Option<ImageId>,
        output: &mut String,
    ) -> Result<(), StepError> {
        let current = match image.take() {
            Some(id) => id,
            None => self.engine.build(base_image, output)?,
        };

        match step {
            BuildStep::InstallDependencies { command, .. } | BuildStep::RunCommand(command) => {
                *image = Some(self.engine.exec(&current, command, output)?);
            }
            BuildStep::HealthCheck(check) => {
                self.health_check(&current, check, output)?;
                *image = Some(current);
            }
            BuildStep::TagImage(name) => {
                self.engine.tag(&current, name, output)?;
                *image = Some(current);
            }
        }
        Ok(())
    }

    /// Start a probe container and poll it until ready or out of retries.
    /// Each attempt waits `interval` first, giving the service time to start.
    fn health_check(
        &mut self,
        image: &ImageId,
        check: &HealthCheck,
        output: &mut String,
    ) -> Result<(), StepError> {
        let container = self.engine.launch(image, check.run.as_deref(), output)?;
        let result = self.poll(&container, check, output);

        if let Err(e) = self.engine.remove(&container) {
            warn!(container = %container, error = %e, "failed to remove probe container");
        }
        result
    }

    fn poll(
        &mut self,
        container: &ContainerId,
        check: &HealthCheck,
        output: &mut String,
    ) -> Result<(), StepError> {
        let mut last = String::from("no probe attempted");
        for attempt in 1..=check.retries {
            (self.sleep)(check.interval);
            let state = match self.engine.probe(container, check) {
                Ok(state) => state,
                Err(e) => ReadyState::NotReady(e.to_string()),
            };
            match state {
                ReadyState::Ready => {
                    output.push_str(&format!("probe {attempt}/{}: ready\n", check.retries));
                    return Ok(());
                }
                ReadyState::NotReady(reason) => {
                    output.push_str(&format!("probe {attempt}/{}: {reason}\n", check.retries));
                    info!(attempt, retries = check.retries, %reason, "not ready yet");
                    last = reason;
                }
            }
        }
        Err(StepError::ProbeTimeout {
            attempts: check.retries,
            last,
        })
    }
}
