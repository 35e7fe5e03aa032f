use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_INSTALL_COMMAND: &str = "pip install --no-cache-dir";

/// What to do with a build file that declares neither requirements nor commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyBuildPolicy {
    /// Build anyway; the result is the base image plus the build context, tagged.
    #[default]
    Allow,
    Reject,
}

/// Readiness probe run against a container started from the freshly built image.
///
/// Field names follow the compose `healthcheck` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    /// Shell command executed inside the probe container; exit 0 means ready.
    pub test: String,
    /// Command that starts the service. `None` keeps the image's own command.
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default = "default_interval", with = "human_duration")]
    pub interval: Duration,
    #[serde(default = "default_timeout", with = "human_duration")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retries() -> u32 {
    3
}

/// The validated build file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Target reference, always carrying an explicit non-empty `:tag`.
    pub image_name: String,
    pub base_image: String,
    pub requirements: Vec<String>,
    pub commands: Vec<String>,
    pub install_command: String,
    pub health_check: Option<HealthCheck>,
    pub empty_build: EmptyBuildPolicy,
}

impl BuildSpec {
    /// True when the build adds nothing beyond the base image and context.
    pub fn is_empty_build(&self) -> bool {
        self.requirements.is_empty() && self.commands.is_empty()
    }
}

/// Document shape as written on disk, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSpec {
    pub image_name: Option<String>,
    pub base_image: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub commands: Option<Vec<String>>,
    pub install_command: Option<String>,
    pub health_check: Option<HealthCheck>,
    pub empty_build: Option<EmptyBuildPolicy>,
}

/// Durations written either as humantime strings (`"2s"`, `"1m 30s"`) or as
/// a bare integer number of seconds.
pub(crate) mod human_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration such as \"10s\" or a number of seconds")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
                if value < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(Duration::from_secs(value as u64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
                humantime::parse_duration(value.trim()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
