//! Input and output types for gce-rollout orchestrations

use std::time::Duration;

use gce_rollout_models::DeploymentSpec;
use serde::{Deserialize, Serialize};

use crate::credentials::Credential;
use crate::error::RolloutError;

// ============================================================================
// Rollout Orchestration
// ============================================================================

/// One deployment entry ready to run
#[derive(Debug, Clone)]
pub struct RolloutTarget {
    pub spec: DeploymentSpec,
    /// Entry credential, or the process-wide fallback
    pub credential: Credential,
}

/// Bounded polling for eventually consistent control-plane state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollPolicy {
    /// Checks after the first one
    pub retries: u32,
    /// Timer between two checks
    pub interval: Duration,
}

impl PollPolicy {
    /// 10 retries, 2s apart
    pub fn eventual_consistency() -> Self {
        Self {
            retries: 10,
            interval: Duration::from_secs(2),
        }
    }
}

/// Settings shared by every entry of a run
#[derive(Debug, Clone)]
pub struct RolloutSettings {
    /// Delete own templates older than this after a successful rollout (None = keep all)
    pub retention: Option<Duration>,
    /// Poll policy for template creation and instance group patching
    pub poll: PollPolicy,
    /// Upper bound on waiting for one entry's orchestration
    pub wait: Duration,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            retention: Some(Duration::from_secs(14 * 24 * 60 * 60)),
            poll: PollPolicy::eventual_consistency(),
            wait: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutInput {
    /// Key of the entry's compute client
    pub client: String,
    /// Project the entry runs against (explicit or from the credential)
    pub project: String,
    /// Resolved entry, without its credential
    pub spec: DeploymentSpec,
    pub retention: Option<Duration>,
    pub poll: PollPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutOutput {
    pub project: String,
    pub template: String,
    pub template_url: String,
    /// Latest version the group ran before the update
    pub previous_version: Option<String>,
    /// Cleanup summary; None when retention is disabled or cleanup failed
    pub cleanup: Option<CleanupTemplatesOutput>,
}

/// What the rollout orchestration reports for its entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RolloutOutcome {
    Succeeded(RolloutOutput),
    Failed(RolloutError),
}

/// Outcome of one entry, attributed by name
#[derive(Debug)]
pub struct RolloutResult {
    pub name: String,
    pub outcome: Result<RolloutOutput, RolloutError>,
}

impl RolloutResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

// ============================================================================
// Cleanup Templates Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupTemplatesInput {
    pub client: String,
    pub project: String,
    /// Templates younger than this are kept
    pub retention: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanupTemplatesOutput {
    /// Templates that were deleted
    pub deleted: Vec<String>,
    /// Templates kept because an instance group still references them
    pub in_use: Vec<String>,
}
