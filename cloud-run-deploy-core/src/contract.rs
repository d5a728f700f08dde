#![allow(unused)]

//! # contract: seams between orchestration and the outside world
//!
//! Two traits live here:
//! - [`CommandRunner`] runs an external program (in practice `gcloud`) and
//!   captures what it printed.
//! - [`Operator`] is the deploy/describe/delete surface the smoke-test harness
//!   drives.
//!
//! Both are annotated for `mockall` so tests can script the platform without a
//! cloud account. The mocks are exported behind the `test-export-mocks`
//! feature for use from other crates' tests.

use std::path::Path;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde_json::Value;

use crate::error::DeployError;
use crate::schema::DeploymentSpec;

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "signal".to_owned(),
        }
    }
}

/// Runs an external program to completion.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, std::io::Error>;
}

/// A deployed Cloud Run service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub service: String,
    pub image: String,
}

/// Parsed `gcloud run services describe --format json` output.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescription {
    pub raw: Value,
}

impl ServiceDescription {
    pub fn url(&self) -> Option<&str> {
        self.raw.pointer("/status/url").and_then(Value::as_str)
    }

    /// True when the `Ready` condition reports `"True"`.
    pub fn is_ready(&self) -> bool {
        self.raw
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .map(|conditions| {
                conditions.iter().any(|c| {
                    c.get("type").and_then(Value::as_str) == Some("Ready")
                        && c.get("status").and_then(Value::as_str) == Some("True")
                })
            })
            .unwrap_or(false)
    }

    pub fn latest_revision(&self) -> Option<&str> {
        self.raw
            .pointer("/status/latestReadyRevisionName")
            .and_then(Value::as_str)
    }
}

/// Deploy, inspect and remove a managed service instance.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Operator: Send + Sync {
    /// Build the artifact on the platform and roll it out as `deployment_name`.
    async fn deploy(
        &self,
        artifact: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<Deployment, DeployError>;

    async fn describe(
        &self,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<ServiceDescription, DeployError>;

    async fn delete(&self, deployment_name: &str, spec: &DeploymentSpec) -> Result<(), DeployError>;
}
