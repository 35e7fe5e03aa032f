use std::path::Path;

use tracing::{debug, warn};

use super::error::ConfigError;
use super::types::{BuildSpec, DEFAULT_INSTALL_COMMAND, EmptyBuildPolicy, RawSpec};

/// Read and validate a YAML build file.
pub fn load(path: &Path) -> Result<BuildSpec, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "read build file");
    parse(&contents)
}

/// Validate a build file already held in memory.
pub fn parse(contents: &str) -> Result<BuildSpec, ConfigError> {
    // An empty document carries no fields at all; report the first required one.
    let raw: RawSpec = if contents.trim().is_empty() {
        RawSpec::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    validate(raw)
}

fn validate(raw: RawSpec) -> Result<BuildSpec, ConfigError> {
    let image_name = required(raw.image_name, "image_name")?;
    let base_image = required(raw.base_image, "base_image")?;

    check_reference("image_name", &image_name)?;
    check_target_tag(&image_name)?;
    check_repository_case(&image_name)?;
    check_reference("base_image", &base_image)?;

    let requirements = raw.requirements.unwrap_or_default();
    let commands = raw.commands.unwrap_or_default();
    check_entries("requirements", &requirements)?;
    check_entries("commands", &commands)?;

    let install_command = match raw.install_command {
        Some(cmd) if cmd.trim().is_empty() => {
            return Err(ConfigError::invalid("install_command", "must not be empty"));
        }
        Some(cmd) => cmd.trim().to_string(),
        None => DEFAULT_INSTALL_COMMAND.to_string(),
    };

    if let Some(check) = &raw.health_check {
        if check.test.trim().is_empty() {
            return Err(ConfigError::invalid("health_check.test", "must not be empty"));
        }
        if check.retries == 0 {
            return Err(ConfigError::invalid("health_check.retries", "must be at least 1"));
        }
        if check.timeout.is_zero() {
            return Err(ConfigError::invalid("health_check.timeout", "must be positive"));
        }
    }

    let spec = BuildSpec {
        image_name: with_default_tag(&image_name),
        base_image,
        requirements,
        commands,
        install_command,
        health_check: raw.health_check,
        empty_build: raw.empty_build.unwrap_or_default(),
    };

    if spec.is_empty_build() {
        match spec.empty_build {
            EmptyBuildPolicy::Reject => return Err(ConfigError::EmptyBuild),
            EmptyBuildPolicy::Allow => warn!(
                image = %spec.image_name,
                "no requirements or commands; the image will only add the build context"
            ),
        }
    }

    Ok(spec)
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingField(field)),
    }
}

fn check_reference(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigError::invalid(field, "image references cannot contain whitespace"));
    }
    if value.starts_with('-') {
        return Err(ConfigError::invalid(field, "image references cannot start with '-'"));
    }
    Ok(())
}

/// The target is applied with `tag`, which takes neither digests nor empty tags.
fn check_target_tag(value: &str) -> Result<(), ConfigError> {
    if value.contains('@') {
        return Err(ConfigError::invalid(
            "image_name",
            "digest references cannot be used as a tag target",
        ));
    }
    if value.ends_with(':') {
        return Err(ConfigError::invalid("image_name", "tag after ':' must not be empty"));
    }
    Ok(())
}

/// Engines reject uppercase repository names; the tag itself may be mixed case.
fn check_repository_case(value: &str) -> Result<(), ConfigError> {
    if repository_part(value).chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::invalid(
            "image_name",
            "repository names must be lowercase",
        ));
    }
    Ok(())
}

fn check_entries(field: &str, entries: &[String]) -> Result<(), ConfigError> {
    if let Some(idx) = entries.iter().position(|e| e.trim().is_empty()) {
        return Err(ConfigError::invalid(
            format!("{field}[{idx}]"),
            "entries must not be empty",
        ));
    }
    Ok(())
}

/// Strip the `:tag` suffix, leaving registry and repository.
fn repository_part(reference: &str) -> &str {
    let last_slash = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[last_slash..].find(':') {
        Some(colon) => &reference[..last_slash + colon],
        None => reference,
    }
}

/// Append `:latest` when the reference names no tag.
fn with_default_tag(reference: &str) -> String {
    if repository_part(reference).len() == reference.len() {
        format!("{reference}:latest")
    } else {
        reference.to_string()
    }
}
