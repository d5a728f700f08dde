//! Error types for schema validation, gcloud orchestration and smoke checks.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field error found in one validation pass, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_field_errors(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == field)
    }
}

fn render_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid deployment configuration: {0}")]
    InvalidConfig(#[from] ValidationErrors),

    #[error("invalid deployment name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: String },

    #[error("artifact directory not found at {0}")]
    ArtifactNotFound(PathBuf),

    #[error("artifact at {0} has no Dockerfile")]
    MissingDockerfile(PathBuf),

    #[error("failed to stage artifact: {0}")]
    Staging(#[source] std::io::Error),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to parse output of `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("service {0} reports no URL")]
    MissingUrl(String),

    #[error(transparent)]
    Smoke(#[from] SmokeError),

    /// Setup failed and the cleanup that followed failed as well.
    #[error("{source}; teardown also failed: {teardown}")]
    TeardownAfterFailure {
        #[source]
        source: Box<DeployError>,
        teardown: Box<DeployError>,
    },
}

/// Failure of a single HTTP smoke check.
#[derive(Debug, Error)]
pub enum SmokeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned {actual:?}, expected {expected:?}")]
    Mismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("{url} returned a body that does not describe the expected frame: {body}")]
    FrameMismatch { url: String, body: String },
}

pub type Result<T> = std::result::Result<T, DeployError>;
