//! Input and output types for gce-rollout activities
//!
//! Every input carries `client`, the key of the compute client bound to the
//! entry's credential in [`crate::activities::ComputeClients`].

use std::collections::BTreeMap;
use std::time::Duration;

use gce_rollout_models::{DeploymentSpec, UpdatePolicy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Clone Template Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneTemplateInput {
    pub client: String,
    /// Project owning both templates
    pub project: String,
    /// Template to copy properties from
    pub base_template: String,
    /// Name of the new template (must not exist)
    pub template: String,
    /// Appended to the base template's network tags
    pub tags: Vec<String>,
    /// Overlaid onto the base template's labels
    pub labels: BTreeMap<String, String>,
    /// Overlaid onto the base template's metadata
    pub metadata: BTreeMap<String, String>,
    pub startup_script: Option<String>,
    pub shutdown_script: Option<String>,
    /// Cloud-init user data
    pub cloud_init: Option<String>,
}

impl CloneTemplateInput {
    pub fn from_spec(client: &str, spec: &DeploymentSpec, project: &str) -> Self {
        Self {
            client: client.to_string(),
            project: project.to_string(),
            base_template: spec.instance_template_base.clone(),
            template: spec.instance_template.clone(),
            tags: spec.tags.clone(),
            labels: spec.labels.clone(),
            metadata: spec.metadata.clone(),
            startup_script: spec.startup_script.as_ref().map(|s| s.content.clone()),
            shutdown_script: spec.shutdown_script.as_ref().map(|s| s.content.clone()),
            cloud_init: spec.cloud_init.as_ref().map(|s| s.content.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneTemplateOutput {
    /// Name of the inserted template
    pub template: String,
    /// Target link of the insert operation, when the API returned one
    pub target_link: Option<String>,
}

// ============================================================================
// Get Template Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetTemplateInput {
    pub client: String,
    pub project: String,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetTemplateOutput {
    /// False while reads still answer NotReady or NotFound
    pub visible: bool,
    pub self_link: Option<String>,
}

// ============================================================================
// Rolling Update Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollingUpdateInput {
    pub client: String,
    pub project: String,
    pub region: String,
    pub instance_group: String,
    /// Version name to install (the new template's name)
    pub template: String,
    pub template_url: String,
    pub policy: UpdatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollingUpdateOutput {
    /// The patch was accepted
    Started {
        /// Latest version name before the update, if the group had any
        previous_version: Option<String>,
    },
    /// The group cannot take the new template yet; nothing was changed
    NotReady { reason: String },
    /// The group already runs `latest`, which is not older than the candidate
    Rejected { latest: String },
}

// ============================================================================
// List Expired Templates Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListExpiredTemplatesInput {
    pub client: String,
    pub project: String,
    /// Templates younger than this are kept
    pub retention: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListExpiredTemplatesOutput {
    pub templates: Vec<String>,
}

// ============================================================================
// Delete Template Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteTemplateInput {
    pub client: String,
    pub project: String,
    pub template: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTemplateOutput {
    Deleted,
    /// An instance group still references the template
    InUse,
    AlreadyGone,
}
