#![doc = "cloud-run-deploy-core: core logic for the gcp-cloud-run deployment operator."]

//! This crate holds the configuration schema, the rendering of deployment
//! parameters into `gcloud` invocations, the deploy/describe/delete
//! operations, and the HTTP smoke checks run against a live service.
//! Command-line parsing and config-file loading live in the `cloud-run-deploy`
//! binary crate.

pub mod contract;
pub mod error;
pub mod gcloud;
pub mod harness;
pub mod operator;
pub mod runner;
pub mod schema;
pub mod smoke;

pub use contract::{CommandOutput, CommandRunner, Deployment, Operator, ServiceDescription};
pub use error::{DeployError, SmokeError, ValidationErrors};
pub use operator::{CloudRunOperator, OPERATOR_NAME};
pub use runner::SystemRunner;
pub use schema::{validate, DeploymentSpec};
