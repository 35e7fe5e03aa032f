use crate::config::BuildSpec;
use crate::docker::dockerfile;

use super::types::BuildStep;

/// Turn a validated spec into its ordered build steps.
///
/// Order is fixed: dependency install (only when there are requirements),
/// one run per command in source order, the health check when configured,
/// and exactly one final tag. The result is never empty.
pub fn compile(spec: &BuildSpec) -> Vec<BuildStep> {
    let mut steps = Vec::with_capacity(spec.commands.len() + 3);

    if !spec.requirements.is_empty() {
        steps.push(BuildStep::InstallDependencies {
            command: install_command(&spec.install_command, &spec.requirements),
            packages: spec.requirements.clone(),
        });
    }

    steps.extend(spec.commands.iter().cloned().map(BuildStep::RunCommand));

    // Probed before tagging so an unhealthy image never receives its name.
    if let Some(check) = &spec.health_check {
        steps.push(BuildStep::HealthCheck(check.clone()));
    }

    steps.push(BuildStep::TagImage(spec.image_name.clone()));
    steps
}

/// Installer prefix followed by the shell-quoted package list.
fn install_command(installer: &str, packages: &[String]) -> String {
    format!("{installer} {}", shell_words::join(packages))
}

/// The Dockerfile equivalent of the image-producing steps, for inspection.
///
/// The health check and tag have no Dockerfile form and appear as comments.
pub fn render_dockerfile(base_image: &str, steps: &[BuildStep]) -> String {
    let mut out = dockerfile::base_stage(base_image);
    for step in steps {
        match step {
            BuildStep::InstallDependencies { command, .. } | BuildStep::RunCommand(command) => {
                out.push_str(&dockerfile::run_instruction(command));
                out.push('\n');
            }
            BuildStep::HealthCheck(check) => {
                out.push_str(&format!("# health check: {}\n", check.test));
            }
            BuildStep::TagImage(name) => {
                out.push_str(&format!("# tag: {name}\n"));
            }
        }
    }
    out
}
