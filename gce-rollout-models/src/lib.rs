//! Shared data types for gce-rollout
//!
//! [`DeploymentSpec`] is the fully resolved unit of work produced by the config
//! resolver. The [`compute`] module holds the control-plane resource shapes the
//! orchestrations read and write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod compute;

/// Default update type for a rolling update
pub const DEFAULT_UPDATE_TYPE: &str = "PROACTIVE";
/// Default minimal action for a rolling update
pub const DEFAULT_MINIMAL_ACTION: &str = "REPLACE";
/// Default replacement method for a rolling update
pub const DEFAULT_REPLACEMENT_METHOD: &str = "SUBSTITUTE";
/// Default seconds an instance must be ready before it counts as updated
pub const DEFAULT_MIN_READY_SEC: u32 = 10;
/// Default surge: 3 instances
pub const DEFAULT_MAX_SURGE: FixedOrPercent = FixedOrPercent::fixed(3);
/// Default unavailable: 0 instances
pub const DEFAULT_MAX_UNAVAILABLE: FixedOrPercent = FixedOrPercent::fixed(0);

/// A fully resolved deployment entry
///
/// Built once by the config resolver and never mutated afterwards. Every
/// optional field of the configuration document is present here with its
/// default applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSpec {
    /// Deploy name, used to attribute log lines and failures
    pub name: String,
    /// Target project (empty = take it from the credential)
    pub project: String,
    /// Credential JSON content (file already read if a path was given)
    pub credentials: Option<String>,
    /// Region of the instance group
    pub region: String,
    /// Regional instance group manager name
    pub instance_group: String,
    /// Template the new template is cloned from
    pub instance_template_base: String,
    /// Name of the template to create
    pub instance_template: String,
    pub startup_script: Option<Script>,
    pub shutdown_script: Option<Script>,
    pub cloud_init: Option<Script>,
    pub vars: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub update_policy: UpdatePolicy,
}

/// A script referenced by path or URL, with its expanded content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Script {
    /// Path or URL as written in the config (after expansion)
    pub path: String,
    /// Fetched and expanded content
    pub content: String,
}

/// Rolling update policy applied to the instance group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub update_type: String,
    pub minimal_action: String,
    pub replacement_method: String,
    pub min_ready_sec: u32,
    pub max_surge: FixedOrPercent,
    pub max_unavailable: FixedOrPercent,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            update_type: DEFAULT_UPDATE_TYPE.to_string(),
            minimal_action: DEFAULT_MINIMAL_ACTION.to_string(),
            replacement_method: DEFAULT_REPLACEMENT_METHOD.to_string(),
            min_ready_sec: DEFAULT_MIN_READY_SEC,
            max_surge: DEFAULT_MAX_SURGE,
            max_unavailable: DEFAULT_MAX_UNAVAILABLE,
        }
    }
}

/// An absolute instance count or a percentage of the group size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedOrPercent {
    pub value: u32,
    pub is_percent: bool,
}

impl FixedOrPercent {
    pub const fn fixed(value: u32) -> Self {
        Self { value, is_percent: false }
    }

    pub const fn percent(value: u32) -> Self {
        Self { value, is_percent: true }
    }
}

impl std::fmt::Display for FixedOrPercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_percent {
            write!(f, "{}%", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_policy_defaults() {
        let policy = UpdatePolicy::default();
        assert_eq!(policy.update_type, "PROACTIVE");
        assert_eq!(policy.minimal_action, "REPLACE");
        assert_eq!(policy.replacement_method, "SUBSTITUTE");
        assert_eq!(policy.min_ready_sec, 10);
        assert_eq!(policy.max_surge, FixedOrPercent::fixed(3));
        assert_eq!(policy.max_unavailable, FixedOrPercent::fixed(0));
    }

    #[test]
    fn test_fixed_or_percent_display() {
        assert_eq!(FixedOrPercent::fixed(3).to_string(), "3");
        assert_eq!(FixedOrPercent::percent(15).to_string(), "15%");
    }
}
