//! End-to-end pipeline tests against a scripted engine: build file on disk,
//! through compile and execute, to the summary.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use dockwright::config::{self, ConfigError, HealthCheck};
use dockwright::docker::{ContainerEngine, ContainerId, ImageId, ReadyState, StepError};
use dockwright::pipeline::{self, BuildStep, Driver, OverallStatus, StepStatus};

#[derive(Default)]
struct ScriptedEngine {
    calls: Vec<String>,
    exit_codes: VecDeque<i32>,
    probes: VecDeque<ReadyState>,
}

impl ContainerEngine for ScriptedEngine {
    fn build(&mut self, base_image: &str, _log: &mut String) -> Result<ImageId, StepError> {
        self.calls.push(format!("build {base_image}"));
        Ok(ImageId("stage-0".into()))
    }

    fn exec(
        &mut self,
        _image: &ImageId,
        command: &str,
        log: &mut String,
    ) -> Result<ImageId, StepError> {
        self.calls.push(format!("exec {command}"));
        let code = self.exit_codes.pop_front().unwrap_or(0);
        log.push_str(&format!("$ {command}\n"));
        if code != 0 {
            log.push_str("Traceback (most recent call last):\n");
            return Err(StepError::NonZeroExit {
                command: command.into(),
                code: Some(code),
            });
        }
        Ok(ImageId(format!("stage-{}", self.calls.len())))
    }

    fn tag(&mut self, _image: &ImageId, name: &str, _log: &mut String) -> Result<(), StepError> {
        self.calls.push(format!("tag {name}"));
        Ok(())
    }

    fn launch(
        &mut self,
        _image: &ImageId,
        _command: Option<&str>,
        _log: &mut String,
    ) -> Result<ContainerId, StepError> {
        self.calls.push("launch".into());
        Ok(ContainerId("probe".into()))
    }

    fn probe(
        &mut self,
        _container: &ContainerId,
        _check: &HealthCheck,
    ) -> Result<ReadyState, StepError> {
        self.calls.push("probe".into());
        Ok(self
            .probes
            .pop_front()
            .unwrap_or(ReadyState::NotReady("connection refused".into())))
    }

    fn remove(&mut self, _container: &ContainerId) -> Result<(), StepError> {
        self.calls.push("remove".into());
        Ok(())
    }
}

fn write_build_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("build.yaml");
    std::fs::write(&path, contents).expect("failed to write build file");
    (dir, path)
}

const DEMO: &str = r#"
image_name: demo
base_image: python:3.9
requirements: ["flask"]
commands: ["python app.py"]
"#;

#[test]
fn demo_config_compiles_to_install_run_tag() {
    let (_dir, path) = write_build_file(DEMO);
    let spec = config::load(&path).unwrap();
    let steps = pipeline::compile(&spec);

    let kinds: Vec<_> = steps.iter().map(BuildStep::kind).collect();
    assert_eq!(kinds, vec!["install", "run", "tag"]);
    assert_eq!(steps[1], BuildStep::RunCommand("python app.py".into()));
    assert_eq!(steps[2], BuildStep::TagImage("demo:latest".into()));
}

#[test]
fn missing_image_name_never_reaches_the_engine() {
    let (_dir, path) = write_build_file("base_image: python:3.9\ncommands: [ls]\n");
    let mut engine = ScriptedEngine::default();

    let outcome = config::load(&path).map(|spec| {
        let steps = pipeline::compile(&spec);
        pipeline::execute(&spec.base_image, &steps, &mut engine)
    });

    let err = outcome.unwrap_err();
    assert!(matches!(err, ConfigError::MissingField("image_name")));
    assert_eq!(err.to_string(), "missing required field `image_name`");
    assert!(engine.calls.is_empty());
}

#[test]
fn failing_command_skips_tag_and_fails_summary() {
    let (_dir, path) = write_build_file(DEMO);
    let spec = config::load(&path).unwrap();
    let steps = pipeline::compile(&spec);
    let mut engine = ScriptedEngine {
        exit_codes: VecDeque::from(vec![0, 1]),
        ..ScriptedEngine::default()
    };

    let report = pipeline::execute(&spec.base_image, &steps, &mut engine);

    assert!(report.steps[0].status.is_success());
    assert!(matches!(
        report.steps[1].status,
        StepStatus::Failed(StepError::NonZeroExit { code: Some(1), .. })
    ));
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
    assert_eq!(
        engine.calls,
        vec![
            "build python:3.9",
            "exec pip install --no-cache-dir flask",
            "exec python app.py",
        ]
    );

    let summary = pipeline::summarize(&report);
    assert_eq!(summary.status, OverallStatus::Failed);
    assert_eq!(summary.skipped, 1);
    assert!(summary.to_string().contains("| Traceback (most recent call last):"));
}

#[test]
fn health_probe_fails_after_five_attempts_at_interval() {
    let (_dir, path) = write_build_file(
        r#"
image_name: demo
base_image: python:3.9
commands: ["pip install flask"]
health_check:
  run: python app.py
  test: curl -fsS http://localhost:5000/health
  interval: 3s
  timeout: 1s
  retries: 5
"#,
    );
    let spec = config::load(&path).unwrap();
    let steps = pipeline::compile(&spec);
    let mut engine = ScriptedEngine::default();
    let mut waits = Vec::new();

    let report = Driver::new(&mut engine)
        .with_sleeper(|d| waits.push(d))
        .execute(&spec.base_image, &steps);

    let health = &report.steps[1];
    assert!(matches!(health.step, BuildStep::HealthCheck(_)));
    assert_eq!(
        health.status,
        StepStatus::Failed(StepError::ProbeTimeout {
            attempts: 5,
            last: "connection refused".into(),
        })
    );
    assert_eq!(health.output.lines().count(), 5);
    assert_eq!(waits, vec![Duration::from_secs(3); 5]);
    assert_eq!(engine.calls.iter().filter(|c| *c == "probe").count(), 5);
    assert_eq!(engine.calls.last().map(String::as_str), Some("remove"));
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
}

#[test]
fn health_probe_recovering_on_last_attempt_succeeds() {
    let (_dir, path) = write_build_file(
        "image_name: demo\nbase_image: alpine\ncommands: [ls]\nhealth_check:\n  test: 'true'\n  interval: 0s\n  retries: 3\n",
    );
    let spec = config::load(&path).unwrap();
    let mut engine = ScriptedEngine {
        probes: VecDeque::from(vec![
            ReadyState::NotReady("starting".into()),
            ReadyState::NotReady("starting".into()),
            ReadyState::Ready,
        ]),
        ..ScriptedEngine::default()
    };

    let report = pipeline::execute(&spec.base_image, &pipeline::compile(&spec), &mut engine);

    assert!(report.succeeded());
    assert_eq!(report.image.as_deref(), Some("demo:latest"));
}

#[test]
fn rerunning_yields_same_report_shape() {
    let (_dir, path) = write_build_file(DEMO);
    let spec = config::load(&path).unwrap();
    let steps = pipeline::compile(&spec);

    let shape = |engine: &mut ScriptedEngine| {
        pipeline::execute(&spec.base_image, &steps, engine)
            .steps
            .into_iter()
            .map(|r| r.step)
            .collect::<Vec<_>>()
    };
    assert_eq!(
        shape(&mut ScriptedEngine::default()),
        shape(&mut ScriptedEngine::default())
    );
}

#[test]
fn empty_build_policy_is_honoured() {
    let (_dir, path) = write_build_file("image_name: demo\nbase_image: alpine\n");
    let spec = config::load(&path).unwrap();
    assert_eq!(
        pipeline::compile(&spec),
        vec![BuildStep::TagImage("demo:latest".into())]
    );

    let (_dir, path) =
        write_build_file("image_name: demo\nbase_image: alpine\nempty_build: reject\n");
    assert!(matches!(
        config::load(&path).unwrap_err(),
        ConfigError::EmptyBuild
    ));
}
