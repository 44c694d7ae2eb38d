//! Compute control-plane resource shapes
//!
//! Only the fields the rollout reads or writes are typed. Everything else the
//! API returns is kept in `extra` and written back verbatim, so a cloned
//! template keeps disks, network interfaces, scheduling and the rest of the
//! base template's properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the startup script
pub const STARTUP_SCRIPT_KEY: &str = "startup-script";
/// Metadata key holding the shutdown script
pub const SHUTDOWN_SCRIPT_KEY: &str = "shutdown-script";
/// Metadata key holding cloud-init user data
pub const USER_DATA_KEY: &str = "user-data";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// RFC 3339 creation time, set by the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<InstanceProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Network tags
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tags {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub items: Vec<MetadataItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Set `key` to `value`, replacing an existing item in place or appending
    pub fn set(&mut self, key: &str, value: &str) {
        match self.items.iter_mut().find(|item| item.key == key) {
            Some(item) => item.value = Some(value.to_string()),
            None => self.items.push(MetadataItem {
                key: key.to_string(),
                value: Some(value.to_string()),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .and_then(|item| item.value.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Regional instance group manager
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupManager {
    pub name: String,
    /// Single-template shorthand; superseded by `versions` when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_template: Option<String>,
    #[serde(default)]
    pub versions: Vec<InstanceGroupManagerVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<InstanceGroupManagerUpdatePolicy>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupManagerVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance_template: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupManagerUpdatePolicy {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_sec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<FixedOrPercentValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<FixedOrPercentValue>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire form of a fixed-or-percent limit; exactly one of the two is sent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixedOrPercentValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,
}

impl From<crate::FixedOrPercent> for FixedOrPercentValue {
    fn from(limit: crate::FixedOrPercent) -> Self {
        if limit.is_percent {
            Self { fixed: None, percent: Some(i64::from(limit.value)) }
        } else {
            Self { fixed: Some(i64::from(limit.value)), percent: None }
        }
    }
}

/// Long-running operation handle returned by mutating calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// URL of the resource the operation acts on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of `instanceTemplates.list`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplateList {
    #[serde(default)]
    pub items: Vec<InstanceTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
