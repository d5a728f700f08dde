/// # cloud-run-deploy CLI Interface (Module)
///
/// Command parsing and user-visible output for the `gcp-cloud-run` operator.
/// All deployment logic lives in [`cloud_run_deploy_core`]; this module loads the
/// config file, builds a [`CloudRunOperator`], and prints results.
///
/// For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloud_run_deploy_core::contract::Operator;
use cloud_run_deploy_core::gcloud::DEFAULT_GCLOUD;
use cloud_run_deploy_core::harness::{SmokeTest, SmokeTestOptions};
use cloud_run_deploy_core::schema;
use cloud_run_deploy_core::smoke::{RetryPolicy, DEFAULT_READY_STATUS};
use cloud_run_deploy_core::{CloudRunOperator, SystemRunner, OPERATOR_NAME};
use std::path::PathBuf;
use std::time::Duration;

/// CLI for cloud-run-deploy: deploy packaged ML services to Google Cloud Run.
#[derive(Parser)]
#[clap(
    name = "cloud-run-deploy",
    version,
    about = "Deploy, inspect and remove packaged ML services on Google Cloud Run via gcloud"
)]
pub struct Cli {
    /// gcloud executable to invoke
    #[clap(long, global = true, env = "GCLOUD_BIN", default_value = DEFAULT_GCLOUD)]
    pub gcloud: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the artifact on Cloud Build and deploy it as a new service
    Deploy {
        /// Path to the YAML deployment config
        #[clap(long)]
        config: PathBuf,
        /// Deployment name (defaults to `name` in the config file)
        #[clap(long)]
        name: Option<String>,
        /// Directory holding the packaged service and its Dockerfile
        #[clap(long)]
        artifact: PathBuf,
    },
    /// Rebuild the artifact and roll out a new revision of an existing service
    Update {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        artifact: PathBuf,
    },
    /// Print the service description reported by Cloud Run
    Describe {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        name: Option<String>,
        /// Print only the service URL
        #[clap(long)]
        url_only: bool,
    },
    /// Delete the service and its container image
    Delete {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        name: Option<String>,
    },
    /// Validate a config file and print the resolved settings
    Validate {
        #[clap(long)]
        config: PathBuf,
    },
    /// List the configuration fields the operator accepts
    Schema,
    /// Deploy the artifact, exercise its HTTP endpoints, then delete it
    SmokeTest {
        #[clap(long)]
        config: PathBuf,
        /// Deployment name (defaults to a unique `smoke-test-*` name)
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        artifact: PathBuf,
        /// Health polls before giving up on the service
        #[clap(long, default_value_t = 8)]
        attempts: u32,
        /// Seconds between health polls
        #[clap(long, default_value_t = 60)]
        wait_secs: u64,
        /// HTTP status that marks the service as up
        #[clap(long, default_value_t = DEFAULT_READY_STATUS)]
        ready_status: u16,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let operator = CloudRunOperator::new(SystemRunner).with_gcloud(cli.gcloud.clone());

    match cli.command {
        Commands::Deploy {
            config,
            name,
            artifact,
        } => {
            let config = load_config(config)?;
            let name = config.deployment_name(name.as_deref())?;
            tracing::info!(command = "deploy", deployment = %name, "Starting deployment");
            let deployment = operator
                .deploy(&artifact, &name, &config.spec)
                .await
                .with_context(|| format!("deploying {name}"))?;
            println!(
                "Deployed service {} from image {}",
                deployment.service, deployment.image
            );
            Ok(())
        }
        Commands::Update {
            config,
            name,
            artifact,
        } => {
            let config = load_config(config)?;
            let name = config.deployment_name(name.as_deref())?;
            tracing::info!(command = "update", deployment = %name, "Starting update");
            let deployment = operator
                .update(&artifact, &name, &config.spec)
                .await
                .with_context(|| format!("updating {name}"))?;
            println!(
                "Updated service {} with image {}",
                deployment.service, deployment.image
            );
            Ok(())
        }
        Commands::Describe {
            config,
            name,
            url_only,
        } => {
            let config = load_config(config)?;
            let name = config.deployment_name(name.as_deref())?;
            let description = operator
                .describe(&name, &config.spec)
                .await
                .with_context(|| format!("describing {name}"))?;
            if url_only {
                let url = description
                    .url()
                    .with_context(|| format!("service {name} reports no URL"))?;
                println!("{url}");
            } else {
                println!("{}", serde_json::to_string_pretty(&description.raw)?);
            }
            Ok(())
        }
        Commands::Delete { config, name } => {
            let config = load_config(config)?;
            let name = config.deployment_name(name.as_deref())?;
            operator
                .delete(&name, &config.spec)
                .await
                .with_context(|| format!("deleting {name}"))?;
            println!("Deleted {name}");
            Ok(())
        }
        Commands::Validate { config } => {
            let config = load_config(config)?;
            if let Some(name) = &config.name {
                println!("# deployment: {name}");
            }
            print!("{}", serde_yaml::to_string(&config.spec)?);
            Ok(())
        }
        Commands::Schema => {
            println!("Operator: {OPERATOR_NAME}\n");
            for field in schema::fields() {
                let default = field
                    .default
                    .map(|d| format!(" (default: {d})"))
                    .unwrap_or_default();
                let required = if field.required { "required" } else { "optional" };
                println!("{} [{}, {}]{}", field.name, field.field_type, required, default);
                println!("    {}", field.help);
            }
            Ok(())
        }
        Commands::SmokeTest {
            config,
            name,
            artifact,
            attempts,
            wait_secs,
            ready_status,
        } => {
            let config = load_config(config)?;
            let name = config.smoke_test_name(name.as_deref());
            let options = SmokeTestOptions {
                retry: RetryPolicy {
                    attempts,
                    wait: Duration::from_secs(wait_secs),
                },
                ready_status,
                ..SmokeTestOptions::default()
            };

            println!("Deploying {name} for smoke testing...");
            let report = SmokeTest::new(&operator, options)
                .run(&artifact, &name, &config.spec)
                .await
                .context("Setup failed")?;
            println!("Setup successful: {}", report.url);
            if !report.came_up {
                println!("Service did not answer its health probe; running checks anyway");
            }

            for outcome in &report.outcomes {
                match &outcome.error {
                    None => println!("Testing endpoint {}... passed!", outcome.check),
                    Some(e) => println!("Testing endpoint {}... failed! {e}", outcome.check),
                }
            }
            if let Some(e) = &report.teardown_error {
                eprintln!("[WARN] Teardown of {name} failed: {e}");
            }

            if report.all_passed() {
                Ok(())
            } else {
                let failed: Vec<String> = report.failed().map(|o| o.check.to_string()).collect();
                Err(anyhow::anyhow!("smoke checks failed: {}", failed.join(", ")))
            }
        }
    }
}
