//! Deploy, update, describe and delete Cloud Run services through `gcloud`.
//!
//! Each operation renders its arguments with [`crate::gcloud`], hands them to a
//! [`CommandRunner`], and turns a non-zero exit into
//! [`DeployError::CommandFailed`] carrying the command line and its stderr.
//! Container builds run on Cloud Build (`gcloud builds submit`), so the artifact
//! directory must carry its own `Dockerfile`.

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::contract::{CommandOutput, CommandRunner, Deployment, Operator, ServiceDescription};
use crate::error::{DeployError, Result};
use crate::gcloud::{self, DEFAULT_GCLOUD};
use crate::schema::DeploymentSpec;

pub const OPERATOR_NAME: &str = "gcp-cloud-run";

pub struct CloudRunOperator<R> {
    runner: R,
    gcloud: String,
}

impl<R: CommandRunner> CloudRunOperator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            gcloud: DEFAULT_GCLOUD.to_owned(),
        }
    }

    /// Use a specific `gcloud` executable instead of the one on `PATH`.
    pub fn with_gcloud(mut self, program: impl Into<String>) -> Self {
        self.gcloud = program.into();
        self
    }

    pub fn gcloud(&self) -> &str {
        &self.gcloud
    }

    /// Re-run the build and roll out a new revision of an existing service.
    ///
    /// `gcloud run deploy` replaces the running revision when the service
    /// already exists, so this shares the deploy pipeline.
    pub async fn update(
        &self,
        artifact: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<Deployment> {
        info!(deployment_name, "Updating deployment");
        self.build_and_roll_out(artifact, deployment_name, spec).await
    }

    async fn build_and_roll_out(
        &self,
        artifact: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<Deployment> {
        check_artifact(artifact)?;
        let service = gcloud::service_name(deployment_name)?;
        let image = gcloud::image_tag(spec, &service);

        info!(
            service = %service,
            image = %image,
            artifact = %artifact.display(),
            "Submitting artifact to Cloud Build"
        );
        self.exec(&gcloud::build_submit_args(artifact, &image, spec))
            .await?;

        info!(
            service = %service,
            region = %spec.region,
            project_id = %spec.project_id,
            "Deploying image to Cloud Run"
        );
        self.exec(&gcloud::run_deploy_args(&service, &image, spec))
            .await?;

        info!(service = %service, "Deployment rolled out");
        Ok(Deployment { service, image })
    }

    async fn exec(&self, args: &[String]) -> Result<CommandOutput> {
        let command = gcloud::render_command(&self.gcloud, args);
        let output = self.runner.run(&self.gcloud, args).await.map_err(|e| {
            error!(error = ?e, command = %command, "Failed to launch gcloud");
            DeployError::Spawn {
                program: self.gcloud.clone(),
                source: e,
            }
        })?;

        if !output.is_success() {
            error!(
                command = %command,
                status = %output.status_label(),
                stderr = %output.stderr.trim(),
                "gcloud exited unsuccessfully"
            );
            return Err(DeployError::CommandFailed {
                command,
                status: output.status_label(),
                stderr: output.stderr.trim().to_owned(),
            });
        }
        Ok(output)
    }
}

fn check_artifact(artifact: &Path) -> Result<()> {
    if !artifact.is_dir() {
        return Err(DeployError::ArtifactNotFound(artifact.to_path_buf()));
    }
    if !artifact.join("Dockerfile").is_file() {
        return Err(DeployError::MissingDockerfile(artifact.to_path_buf()));
    }
    Ok(())
}

#[async_trait]
impl<R: CommandRunner> Operator for CloudRunOperator<R> {
    async fn deploy(
        &self,
        artifact: &Path,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<Deployment> {
        info!(deployment_name, "Creating deployment");
        self.build_and_roll_out(artifact, deployment_name, spec).await
    }

    async fn describe(
        &self,
        deployment_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<ServiceDescription> {
        let service = gcloud::service_name(deployment_name)?;
        let args = gcloud::describe_args(&service, spec);
        let output = self.exec(&args).await?;

        let raw = serde_json::from_str(&output.stdout).map_err(|e| {
            error!(error = ?e, service = %service, "gcloud describe returned invalid JSON");
            DeployError::Parse {
                command: gcloud::render_command(&self.gcloud, &args),
                source: e,
            }
        })?;
        let description = ServiceDescription { raw };
        info!(
            service = %service,
            url = description.url().unwrap_or("<none>"),
            ready = description.is_ready(),
            "Described deployment"
        );
        Ok(description)
    }

    async fn delete(&self, deployment_name: &str, spec: &DeploymentSpec) -> Result<()> {
        let service = gcloud::service_name(deployment_name)?;
        let image = gcloud::image_tag(spec, &service);

        info!(service = %service, region = %spec.region, "Deleting Cloud Run service");
        self.exec(&gcloud::delete_service_args(&service, spec))
            .await?;

        // The image is a build by-product; a leftover one does not fail the delete.
        match self.exec(&gcloud::delete_image_args(&image, spec)).await {
            Ok(_) => info!(image = %image, "Deleted container image"),
            Err(e) => warn!(image = %image, error = %e, "Could not delete container image"),
        }
        Ok(())
    }
}
