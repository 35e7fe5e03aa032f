use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::config::HealthCheck;

use super::dockerfile;
use super::run;
use super::types::{
    ContainerId, EngineCommand, EngineSettings, ImageId, ProcessResult, ReadyState, StepError,
};

/// The capabilities the build driver needs from a container engine.
///
/// Every call blocks until the engine answers. Output produced by a call is
/// appended to `log` whether or not the call succeeds.
pub trait ContainerEngine {
    /// Start a build from `base_image` with the build context in place.
    fn build(&mut self, base_image: &str, log: &mut String) -> Result<ImageId, StepError>;

    /// Run `command` on top of `image`, returning the resulting image.
    fn exec(
        &mut self,
        image: &ImageId,
        command: &str,
        log: &mut String,
    ) -> Result<ImageId, StepError>;

    /// Give `image` its final name.
    fn tag(&mut self, image: &ImageId, name: &str, log: &mut String) -> Result<(), StepError>;

    /// Start a detached container from `image`, optionally overriding its command.
    fn launch(
        &mut self,
        image: &ImageId,
        command: Option<&str>,
        log: &mut String,
    ) -> Result<ContainerId, StepError>;

    /// One readiness check against a running container.
    fn probe(
        &mut self,
        container: &ContainerId,
        check: &HealthCheck,
    ) -> Result<ReadyState, StepError>;

    /// Stop and delete a container started by [`launch`](Self::launch).
    fn remove(&mut self, container: &ContainerId) -> Result<(), StepError>;

    /// Release anything the engine created for its own bookkeeping.
    fn cleanup(&mut self) {}
}

const STAGE_REPOSITORY: &str = "dockwright-stage";

/// [`ContainerEngine`] backed by the `docker` CLI (or a compatible binary).
///
/// Each layer is built as its own single-instruction Dockerfile so that
/// every step succeeds or fails on its own. Intermediate layers carry
/// throwaway tags under `dockwright-stage`, removed by [`cleanup`](ContainerEngine::cleanup).
pub struct DockerCli {
    settings: EngineSettings,
    checked: bool,
    serial: u32,
    stages: Vec<String>,
}

impl DockerCli {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            checked: false,
            serial: 0,
            stages: Vec::new(),
        }
    }

    /// Verify that the engine daemon is reachable.
    pub fn ensure_available(&self) -> Result<()> {
        let cmd = self.command(
            ["version", "--format", "{{.Server.Version}}"],
            Duration::from_secs(30),
        );
        let res = run::run(&self.settings.program, &cmd)?;
        if res.timed_out {
            bail!("`{} version` did not answer in time", self.settings.program);
        }
        if !res.success {
            bail!(
                "{} daemon is not running: {}",
                self.settings.program,
                last_line(&res.log).unwrap_or("no output")
            );
        }
        debug!(version = res.log.trim(), "engine available");
        Ok(())
    }

    fn command<I, S>(&self, args: I, timeout: Duration) -> EngineCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = Vec::new();
        if let Some(host) = &self.settings.host {
            full.push("-H".to_string());
            full.push(host.clone());
        }
        full.extend(args.into_iter().map(Into::into));
        EngineCommand {
            args: full,
            timeout,
        }
    }

    /// Run an engine command, folding every failure mode into a [`StepError`].
    /// `label` names the operation in a `NonZeroExit`.
    fn invoke(
        &self,
        cmd: &EngineCommand,
        label: &str,
        log: &mut String,
    ) -> Result<ProcessResult, StepError> {
        let res = run::run(&self.settings.program, cmd).map_err(|e| {
            StepError::EngineUnavailable {
                reason: format!("{e:#}"),
            }
        })?;
        log.push_str(&res.log);

        if res.timed_out {
            return Err(StepError::TimedOut { after: cmd.timeout });
        }
        if !res.success {
            return Err(StepError::NonZeroExit {
                command: label.to_string(),
                code: res.exit_code,
            });
        }
        Ok(res)
    }

    fn next_stage(&mut self) -> String {
        self.serial += 1;
        format!("{STAGE_REPOSITORY}:{}-{}", std::process::id(), self.serial)
    }

    /// Build `contents` as a Dockerfile against `context`, tagging the result
    /// as a fresh stage.
    fn build_stage(
        &mut self,
        contents: &str,
        context: Option<&Path>,
        label: &str,
        log: &mut String,
    ) -> Result<ImageId, StepError> {
        let scratch = write_dockerfile(contents).map_err(|e| StepError::EngineUnavailable {
            reason: format!("{e:#}"),
        })?;
        let dockerfile = scratch.path().join("Dockerfile");
        // Stages that only run commands do not need the real context resent.
        let context = context.unwrap_or_else(|| scratch.path()).to_path_buf();
        let stage = self.next_stage();

        let cmd = self.command(
            [
                "build".to_string(),
                "--file".to_string(),
                dockerfile.display().to_string(),
                "--tag".to_string(),
                stage.clone(),
                context.display().to_string(),
            ],
            self.settings.timeout,
        );
        self.invoke(&cmd, label, log)?;
        self.stages.push(stage.clone());
        Ok(ImageId(stage))
    }
}

impl ContainerEngine for DockerCli {
    fn build(&mut self, base_image: &str, log: &mut String) -> Result<ImageId, StepError> {
        if !self.checked {
            self.ensure_available()
                .map_err(|e| StepError::EngineUnavailable {
                    reason: format!("{e:#}"),
                })?;
            self.checked = true;
        }
        let context = self.settings.context_dir.clone();
        self.build_stage(
            &dockerfile::base_stage(base_image),
            Some(context.as_path()),
            &format!("build from {base_image}"),
            log,
        )
    }

    fn exec(
        &mut self,
        image: &ImageId,
        command: &str,
        log: &mut String,
    ) -> Result<ImageId, StepError> {
        self.build_stage(&dockerfile::run_stage(&image.0, command), None, command, log)
    }

    fn tag(&mut self, image: &ImageId, name: &str, log: &mut String) -> Result<(), StepError> {
        let cmd = self.command(["tag", image.0.as_str(), name], self.settings.timeout);
        self.invoke(&cmd, &format!("tag {name}"), log)?;
        Ok(())
    }

    fn launch(
        &mut self,
        image: &ImageId,
        command: Option<&str>,
        log: &mut String,
    ) -> Result<ContainerId, StepError> {
        let mut args: Vec<String> = vec!["run".into(), "--detach".into()];
        match command {
            Some(c) => args.extend([
                "--entrypoint".into(),
                "/bin/sh".into(),
                image.0.clone(),
                "-c".into(),
                c.to_string(),
            ]),
            None => args.push(image.0.clone()),
        }
        let cmd = self.command(args, self.settings.timeout);
        let mut output = String::new();
        let res = self.invoke(&cmd, command.unwrap_or("start container"), &mut output);
        log.push_str(&output);
        res?;

        // `run --detach` prints the container id as its last stdout line.
        match last_line(&output) {
            Some(id) => Ok(ContainerId(id.to_string())),
            None => Err(StepError::EngineUnavailable {
                reason: "engine did not report a container id".into(),
            }),
        }
    }

    fn probe(
        &mut self,
        container: &ContainerId,
        check: &HealthCheck,
    ) -> Result<ReadyState, StepError> {
        let cmd = self.command(
            ["exec", container.0.as_str(), "/bin/sh", "-c", check.test.as_str()],
            check.timeout,
        );
        let res = run::run(&self.settings.program, &cmd).map_err(|e| {
            StepError::EngineUnavailable {
                reason: format!("{e:#}"),
            }
        })?;

        if res.timed_out {
            return Ok(ReadyState::NotReady(format!(
                "probe timed out after {}",
                humantime::format_duration(check.timeout)
            )));
        }
        if res.success {
            return Ok(ReadyState::Ready);
        }
        let reason = match (last_line(&res.log), res.exit_code) {
            (Some(line), _) => line.to_string(),
            (None, Some(code)) => format!("probe exited with status {code}"),
            (None, None) => "probe was killed".to_string(),
        };
        Ok(ReadyState::NotReady(reason))
    }

    fn remove(&mut self, container: &ContainerId) -> Result<(), StepError> {
        let cmd = self.command(["rm", "--force", container.0.as_str()], self.settings.timeout);
        let mut discard = String::new();
        self.invoke(&cmd, "remove probe container", &mut discard)?;
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        let mut args = vec!["image".to_string(), "rm".to_string()];
        args.extend(self.stages.drain(..));
        let cmd = self.command(args, self.settings.timeout);
        let mut discard = String::new();
        if let Err(e) = self.invoke(&cmd, "remove stage tags", &mut discard) {
            warn!(error = %e, "could not remove intermediate stage tags");
        }
    }
}

fn write_dockerfile(contents: &str) -> Result<tempfile::TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("dockwright-")
        .tempdir()
        .context("failed to create scratch directory")?;
    std::fs::write(dir.path().join("Dockerfile"), contents)
        .context("failed to write scratch Dockerfile")?;
    Ok(dir)
}

fn last_line(log: &str) -> Option<&str> {
    log.lines().map(str::trim).rfind(|l| !l.is_empty())
}
