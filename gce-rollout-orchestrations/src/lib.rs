//! gce-rollout orchestrations - rolling deployments of instance templates
//!
//! This crate clones an instance template, moves a regional instance group
//! onto it with a rolling update, and deletes old templates it created
//! before. Each deployment runs as a Duroxide orchestration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use gce_rollout_orchestrations::{gce_client_factory, run_rollouts, RolloutSettings, RolloutTarget};
//!
//! # async fn example(targets: Vec<RolloutTarget>) -> anyhow::Result<()> {
//! let results = run_rollouts(targets, &RolloutSettings::default(), &gce_client_factory()).await?;
//! for result in results.iter().filter(|r| !r.is_success()) {
//!     eprintln!("{} failed", result.name);
//! }
//! # Ok(())
//! # }
//! ```

// Orchestration exports
pub mod names;
pub mod types;

// Activity exports
pub mod activity_types;

pub mod compute_client;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod version;

mod activities;
mod orchestrations;
mod runner;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use activities::ComputeClients;
pub use activity_types::*;
pub use compute_client::{gce_client_factory, ClientFactory, ComputeApi, ComputeError, GceClient};
pub use credentials::{Credential, CredentialError};
pub use error::RolloutError;
pub use registry::{create_activity_registry, create_orchestration_registry};
pub use runner::run_rollouts;
pub use types::*;
