use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dockwright::config::{self, BuildSpec};
use dockwright::docker::{ContainerEngine, DockerCli, EngineSettings};
use dockwright::pipeline::{self, BuildReport, BuildStep, Summary};

const EXIT_BUILD_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

/// Build a container image from a YAML build file, one checked step at a time
#[derive(Parser, Debug)]
#[command(name = "dockwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the build file
    config: PathBuf,

    /// Container engine binary
    #[arg(long, env = "DOCKWRIGHT_ENGINE", default_value = "docker")]
    engine: String,

    /// Engine daemon address, passed through as `-H`
    #[arg(short = 'H', long, env = "DOCKER_HOST")]
    host: Option<String>,

    /// Build context copied into /workspace (default: the build file's directory)
    #[arg(long)]
    context: Option<PathBuf>,

    /// Upper bound for any single engine call, e.g. "90s" or "10m"
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Print the compiled plan and its Dockerfile equivalent without building
    #[arg(long)]
    dry_run: bool,

    /// Write the full report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Output lines shown for a failed step
    #[arg(long, default_value_t = pipeline::DEFAULT_TAIL_LINES)]
    tail: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_BUILD_FAILED)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let spec = match config::load(&cli.config) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("error: {}: {e}", cli.config.display());
            return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
        }
    };

    let steps = pipeline::compile(&spec);

    if cli.dry_run {
        print_plan(&spec, &steps)?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = EngineSettings {
        program: cli.engine.clone(),
        host: cli.host.clone(),
        context_dir: context_dir(cli),
        timeout: cli.timeout,
    };
    info!(
        image = %spec.image_name,
        base = %spec.base_image,
        steps = steps.len(),
        context = %settings.context_dir.display(),
        "starting build"
    );

    let mut engine = DockerCli::new(settings);
    let report = pipeline::execute(&spec.base_image, &steps, &mut engine);
    engine.cleanup();
    info!(status = report.status.as_str(), "build finished");

    let summary = pipeline::summarize_with(&report, cli.tail).with_engine(&cli.engine);
    print!("{summary}");

    if let Some(path) = &cli.report {
        write_report(path, &report, &summary)?;
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_BUILD_FAILED)
    })
}

fn context_dir(cli: &Cli) -> PathBuf {
    if let Some(dir) = &cli.context {
        return dir.clone();
    }
    match cli.config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_plan(spec: &BuildSpec, steps: &[BuildStep]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "Plan for {} (from {}):", spec.image_name, spec.base_image)?;
    for (idx, step) in steps.iter().enumerate() {
        writeln!(out, "  {}. [{}] {step}", idx + 1, step.kind())?;
    }
    writeln!(out)?;
    writeln!(out, "Equivalent Dockerfile:")?;
    write!(out, "{}", pipeline::render_dockerfile(&spec.base_image, steps))?;
    Ok(())
}

#[derive(Serialize)]
struct ReportFile<'a> {
    summary: &'a Summary,
    report: &'a BuildReport,
}

fn write_report(path: &Path, report: &BuildReport, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(&ReportFile { summary, report })
        .context("failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn context_defaults_to_build_file_directory() {
        let cli = Cli::parse_from(["dockwright", "/srv/app/build.yaml"]);
        assert_eq!(context_dir(&cli), PathBuf::from("/srv/app"));

        let cli = Cli::parse_from(["dockwright", "build.yaml"]);
        assert_eq!(context_dir(&cli), PathBuf::from("."));

        let cli = Cli::parse_from(["dockwright", "build.yaml", "--context", "/tmp/ctx"]);
        assert_eq!(context_dir(&cli), PathBuf::from("/tmp/ctx"));
    }

    #[test]
    fn timeout_accepts_human_durations() {
        let cli = Cli::parse_from(["dockwright", "b.yaml", "--timeout", "90s"]);
        assert_eq!(cli.timeout, Duration::from_secs(90));
    }
}
