use std::path::PathBuf;

use thiserror::Error;

/// Reasons a build file can be rejected before any engine call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("malformed build file: {0}")]
    ParseError(String),

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("nothing to build: `requirements` and `commands` are both empty")]
    EmptyBuild,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
