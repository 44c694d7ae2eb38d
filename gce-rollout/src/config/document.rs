//! Raw configuration document, as decoded from YAML

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

/// A YAML scalar kept as text
///
/// Fields are expanded as strings before being parsed, so `min_ready_sec: 10`
/// and `min_ready_sec: "$MIN_READY"` decode the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scalar(pub String);

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
                Ok(Scalar(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
                Ok(Scalar::default())
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

pub type ScalarMap = BTreeMap<String, Scalar>;

/// Top-level document
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Defaults for every deploy entry; its `name` is ignored
    #[serde(default)]
    pub common: Option<DeployEntry>,
    #[serde(default)]
    pub deploys: Vec<DeployEntry>,
    /// Duration, `false` to disable cleanup, absent for the 14 day default
    #[serde(default)]
    pub delete_instance_templates_after: Option<Scalar>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeployEntry {
    #[serde(default)]
    pub name: Option<Scalar>,
    #[serde(default)]
    pub project: Option<Scalar>,
    /// Credential file path or inline JSON
    #[serde(default)]
    pub creds: Option<Scalar>,
    #[serde(default)]
    pub region: Option<Scalar>,
    #[serde(default)]
    pub instance_group: Option<Scalar>,
    #[serde(default)]
    pub instance_template_base: Option<Scalar>,
    #[serde(default)]
    pub instance_template: Option<Scalar>,
    #[serde(default)]
    pub startup_script: Option<Scalar>,
    #[serde(default)]
    pub shutdown_script: Option<Scalar>,
    #[serde(default)]
    pub cloud_init: Option<Scalar>,
    #[serde(default)]
    pub vars: Option<ScalarMap>,
    #[serde(default)]
    pub labels: Option<ScalarMap>,
    #[serde(default)]
    pub metadata: Option<ScalarMap>,
    #[serde(default)]
    pub tags: Option<Vec<Scalar>>,
    #[serde(default)]
    pub update_policy: Option<UpdatePolicyEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpdatePolicyEntry {
    #[serde(default, rename = "type")]
    pub update_type: Option<Scalar>,
    #[serde(default)]
    pub minimal_action: Option<Scalar>,
    #[serde(default)]
    pub replacement_method: Option<Scalar>,
    #[serde(default)]
    pub min_ready_sec: Option<Scalar>,
    #[serde(default)]
    pub max_surge: Option<Scalar>,
    #[serde(default)]
    pub max_unavailable: Option<Scalar>,
}

impl DeployEntry {
    /// Fill in what this entry leaves unset from `common`
    ///
    /// Scalars are inherited when absent. Maps are unioned with local keys
    /// winning. Tags keep local order, followed by common-only tags in
    /// common's order.
    pub fn merged_with(self, common: &DeployEntry) -> DeployEntry {
        DeployEntry {
            name: self.name,
            project: self.project.or_else(|| common.project.clone()),
            creds: self.creds.or_else(|| common.creds.clone()),
            region: self.region.or_else(|| common.region.clone()),
            instance_group: self.instance_group.or_else(|| common.instance_group.clone()),
            instance_template_base: self
                .instance_template_base
                .or_else(|| common.instance_template_base.clone()),
            instance_template: self
                .instance_template
                .or_else(|| common.instance_template.clone()),
            startup_script: self.startup_script.or_else(|| common.startup_script.clone()),
            shutdown_script: self.shutdown_script.or_else(|| common.shutdown_script.clone()),
            cloud_init: self.cloud_init.or_else(|| common.cloud_init.clone()),
            vars: merge_maps(self.vars, &common.vars),
            labels: merge_maps(self.labels, &common.labels),
            metadata: merge_maps(self.metadata, &common.metadata),
            tags: merge_tags(self.tags, &common.tags),
            update_policy: match (self.update_policy, &common.update_policy) {
                (Some(local), Some(common)) => Some(local.merged_with(common)),
                (local, common) => local.or_else(|| common.clone()),
            },
        }
    }
}

impl UpdatePolicyEntry {
    fn merged_with(self, common: &UpdatePolicyEntry) -> UpdatePolicyEntry {
        UpdatePolicyEntry {
            update_type: self.update_type.or_else(|| common.update_type.clone()),
            minimal_action: self.minimal_action.or_else(|| common.minimal_action.clone()),
            replacement_method: self
                .replacement_method
                .or_else(|| common.replacement_method.clone()),
            min_ready_sec: self.min_ready_sec.or_else(|| common.min_ready_sec.clone()),
            max_surge: self.max_surge.or_else(|| common.max_surge.clone()),
            max_unavailable: self.max_unavailable.or_else(|| common.max_unavailable.clone()),
        }
    }
}

fn merge_maps(local: Option<ScalarMap>, common: &Option<ScalarMap>) -> Option<ScalarMap> {
    match (local, common) {
        (Some(mut local), Some(common)) => {
            for (key, value) in common {
                local.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Some(local)
        }
        (local, common) => local.or_else(|| common.clone()),
    }
}

fn merge_tags(local: Option<Vec<Scalar>>, common: &Option<Vec<Scalar>>) -> Option<Vec<Scalar>> {
    match (local, common) {
        (Some(mut local), Some(common)) => {
            for tag in common {
                if !local.contains(tag) {
                    local.push(tag.clone());
                }
            }
            Some(local)
        }
        (local, common) => local.or_else(|| common.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(yaml: &str) -> ConfigDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_scalars_accept_numbers_and_booleans() {
        let doc = decode(
            r#"
delete_instance_templates_after: false
deploys:
  - name: web
    vars:
      replicas: 3
      ratio: 0.5
      quoted: "007"
    update_policy:
      min_ready_sec: 30
      max_surge: 20%
"#,
        );

        assert_eq!(doc.delete_instance_templates_after, Some(Scalar::from("false")));
        let deploy = &doc.deploys[0];
        let vars = deploy.vars.as_ref().unwrap();
        assert_eq!(vars["replicas"].as_str(), "3");
        assert_eq!(vars["ratio"].as_str(), "0.5");
        assert_eq!(vars["quoted"].as_str(), "007");

        let policy = deploy.update_policy.as_ref().unwrap();
        assert_eq!(policy.min_ready_sec, Some(Scalar::from("30")));
        assert_eq!(policy.max_surge, Some(Scalar::from("20%")));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = serde_yaml::from_str::<ConfigDocument>("deploys:\n  - name: web\n    regoin: eu\n")
            .unwrap_err();
        assert!(err.to_string().contains("regoin"));

        assert!(serde_yaml::from_str::<ConfigDocument>("deploy: []\n").is_err());
    }

    #[test]
    fn test_nested_values_are_rejected_as_scalars() {
        assert!(serde_yaml::from_str::<ConfigDocument>("deploys:\n  - name: [a, b]\n").is_err());
    }

    #[test]
    fn test_merge_inherits_scalars() {
        let common = DeployEntry {
            name: Some(Scalar::from("ignored")),
            region: Some(Scalar::from("us-central1")),
            project: Some(Scalar::from("common-project")),
            ..Default::default()
        };
        let local = DeployEntry {
            name: Some(Scalar::from("web")),
            project: Some(Scalar::from("local-project")),
            ..Default::default()
        };

        let merged = local.merged_with(&common);
        assert_eq!(merged.name, Some(Scalar::from("web")));
        assert_eq!(merged.region, Some(Scalar::from("us-central1")));
        assert_eq!(merged.project, Some(Scalar::from("local-project")));
    }

    #[test]
    fn test_merge_never_inherits_name() {
        let common = DeployEntry {
            name: Some(Scalar::from("common")),
            ..Default::default()
        };
        assert_eq!(DeployEntry::default().merged_with(&common).name, None);
    }

    #[test]
    fn test_merge_unions_maps_with_local_precedence() {
        let common = DeployEntry {
            vars: Some(ScalarMap::from([
                ("a".to_string(), Scalar::from("common")),
                ("b".to_string(), Scalar::from("2")),
            ])),
            ..Default::default()
        };
        let local = DeployEntry {
            vars: Some(ScalarMap::from([("a".to_string(), Scalar::from("1"))])),
            ..Default::default()
        };

        let vars = local.merged_with(&common).vars.unwrap();
        assert_eq!(
            vars,
            ScalarMap::from([
                ("a".to_string(), Scalar::from("1")),
                ("b".to_string(), Scalar::from("2")),
            ])
        );
    }

    #[test]
    fn test_merge_appends_common_only_tags() {
        let tags = |names: &[&str]| Some(names.iter().map(|n| Scalar::from(*n)).collect::<Vec<_>>());
        let common = DeployEntry {
            tags: tags(&["http", "lb", "ssh"]),
            ..Default::default()
        };
        let local = DeployEntry {
            tags: tags(&["web", "lb"]),
            ..Default::default()
        };

        assert_eq!(local.merged_with(&common).tags, tags(&["web", "lb", "http", "ssh"]));
    }

    #[test]
    fn test_merge_update_policy_per_field() {
        let common = DeployEntry {
            update_policy: Some(UpdatePolicyEntry {
                max_surge: Some(Scalar::from("10%")),
                min_ready_sec: Some(Scalar::from("60")),
                ..Default::default()
            }),
            ..Default::default()
        };
        let local = DeployEntry {
            update_policy: Some(UpdatePolicyEntry {
                max_surge: Some(Scalar::from("1")),
                ..Default::default()
            }),
            ..Default::default()
        };

        let policy = local.merged_with(&common).update_policy.unwrap();
        assert_eq!(policy.max_surge, Some(Scalar::from("1")));
        assert_eq!(policy.min_ready_sec, Some(Scalar::from("60")));
    }
}
