//! End-to-end smoke test of a live deployment.
//!
//! Stages the artifact in a temporary directory, deploys it, waits for the
//! service to answer, runs every [`SmokeCheck`], and always tears the
//! deployment down again, whether setup or any check failed.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::contract::Operator;
use crate::error::{DeployError, Result};
use crate::schema::DeploymentSpec;
use crate::smoke::{
    RetryPolicy, SmokeCheck, SmokeClient, DEFAULT_READY_STATUS, DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Debug, Clone)]
pub struct SmokeTestOptions {
    pub checks: Vec<SmokeCheck>,
    pub retry: RetryPolicy,
    pub ready_status: u16,
    /// Endpoint polled to decide the service is up.
    pub probe_endpoint: String,
    pub request_timeout: Duration,
}

impl Default for SmokeTestOptions {
    fn default() -> Self {
        Self {
            checks: SmokeCheck::ALL.to_vec(),
            retry: RetryPolicy {
                attempts: 8,
                wait: Duration::from_secs(60),
            },
            ready_status: DEFAULT_READY_STATUS,
            probe_endpoint: SmokeCheck::Json.endpoint().to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub check: SmokeCheck,
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmokeReport {
    pub url: String,
    pub came_up: bool,
    pub outcomes: Vec<CheckOutcome>,
    /// Set when tearing the deployment down failed.
    pub teardown_error: Option<String>,
}

impl SmokeReport {
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(CheckOutcome::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

pub struct SmokeTest<'a, O: Operator> {
    operator: &'a O,
    options: SmokeTestOptions,
}

impl<'a, O: Operator> SmokeTest<'a, O> {
    pub fn new(operator: &'a O, options: SmokeTestOptions) -> Self {
        Self { operator, options }
    }

    /// Deploy `artifact` as `deployment_name`, check it, and delete it.
    ///
    /// An `Err` means setup failed (nothing to check); the deployment has
    /// still been deleted. Check failures are reported in the `Ok` value.
    pub async fn run(
        &self,
        artifact: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<SmokeReport> {
        let staging = TempDir::new().map_err(DeployError::Staging)?;
        let staged = staging.path().join("artifact");
        copy_dir_all(artifact, &staged).map_err(|e| {
            error!(error = ?e, artifact = %artifact.display(), "Failed to stage artifact");
            DeployError::Staging(e)
        })?;
        info!(staged = %staged.display(), "Staged artifact");

        let outcome = self.deploy_and_check(&staged, deployment_name, spec).await;

        let teardown = self.operator.delete(deployment_name, spec).await;
        if let Err(e) = &teardown {
            warn!(deployment_name, error = %e, "Teardown failed");
        }
        if let Err(e) = staging.close() {
            warn!(error = ?e, "Failed to remove staging directory");
        }

        match (outcome, teardown) {
            (Ok(mut report), teardown) => {
                report.teardown_error = teardown.err().map(|e| e.to_string());
                Ok(report)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => Err(DeployError::TeardownAfterFailure {
                source: Box::new(e),
                teardown: Box::new(teardown),
            }),
        }
    }

    async fn deploy_and_check(
        &self,
        staged: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<SmokeReport> {
        self.operator.deploy(staged, deployment_name, spec).await?;
        let description = self.operator.describe(deployment_name, spec).await?;
        let url = description
            .url()
            .ok_or_else(|| DeployError::MissingUrl(deployment_name.to_owned()))?
            .to_owned();
        info!(url = %url, "Deployment reachable at");

        let client = SmokeClient::with_timeout(url.clone(), self.options.request_timeout)?;
        let came_up = client
            .wait_until_up(
                &self.options.probe_endpoint,
                self.options.ready_status,
                &self.options.retry,
            )
            .await;

        let mut outcomes = Vec::with_capacity(self.options.checks.len());
        for check in &self.options.checks {
            let error = match client.run(*check).await {
                Ok(()) => {
                    info!(endpoint = %check, "Smoke check passed");
                    None
                }
                Err(e) => {
                    error!(endpoint = %check, error = %e, "Smoke check failed");
                    Some(e.to_string())
                }
            };
            outcomes.push(CheckOutcome {
                check: *check,
                error,
            });
        }

        Ok(SmokeReport {
            url,
            came_up,
            outcomes,
            teardown_error: None,
        })
    }
}

/// Generate a deployment name unlikely to collide with a running service.
pub fn unique_deployment_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..8])
}

fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    if !from.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", from.display()),
        ));
    }
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
