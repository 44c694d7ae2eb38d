//! Error types for rollout orchestrations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one deployment entry
///
/// Travels through the orchestration's output, so it only carries text.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum RolloutError {
    /// No usable credential or project for the entry
    #[error("credentials: {0}")]
    Credential(String),

    /// Building the compute client failed
    #[error("create compute client: {0}")]
    Client(String),

    /// Reading the base template or inserting the new one failed
    #[error("{0}")]
    CloneTemplate(String),

    #[error("get saved instance template '{template}': too many retries after {attempts} attempts")]
    WaitForTemplate { template: String, attempts: u32 },

    /// Reading or patching the instance group failed
    #[error("update instance group: {0}")]
    RollingUpdate(String),

    #[error("update instance group '{instance_group}': too many retries after {attempts} attempts: {reason}")]
    PatchNotReady {
        instance_group: String,
        attempts: u32,
        reason: String,
    },

    /// The candidate template is not newer than what the group already runs
    #[error("update instance group: instance template '{candidate}' is too old, because '{latest}' is the latest instance template")]
    Guard { candidate: String, latest: String },

    #[error("cleanup instance templates: {0}")]
    Cleanup(String),

    /// The entry's orchestration ended without reporting an outcome
    #[error("rollout aborted: {0}")]
    Aborted(String),
}

impl RolloutError {
    pub fn is_guard(&self) -> bool {
        matches!(self, RolloutError::Guard { .. })
    }
}
