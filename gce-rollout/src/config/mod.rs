//! Config resolver
//!
//! Turns the YAML document into fully resolved [`DeploymentSpec`]s: merges
//! `common` into every entry, expands placeholders, validates required
//! fields, parses the update policy and reads scripts. Any failure here is
//! fatal for the whole run and happens before a single cloud call.

pub mod document;
pub mod expand;
pub mod scripts;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gce_rollout_models::{
    DeploymentSpec, FixedOrPercent, Script, UpdatePolicy, DEFAULT_MAX_SURGE,
    DEFAULT_MAX_UNAVAILABLE, DEFAULT_MINIMAL_ACTION, DEFAULT_MIN_READY_SEC,
    DEFAULT_REPLACEMENT_METHOD, DEFAULT_UPDATE_TYPE,
};
use gce_rollout_orchestrations::{Credential, CredentialError, RolloutTarget};
use thiserror::Error;
use tracing::{debug, debug_span, Instrument};

use document::{ConfigDocument, DeployEntry, Scalar, ScalarMap, UpdatePolicyEntry};
use expand::{expand, expand_shell, Syntax, VariableTable};
use scripts::ScriptError;

/// Retention applied when `delete_instance_templates_after` is absent or empty
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: {0}")]
    NotFound(String),

    #[error("config: read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// `index` is 1-based
    #[error("deploy item #{index} needs name")]
    MissingName { index: usize },

    #[error("deploy '{deploy}' needs {field}")]
    MissingField { deploy: String, field: &'static str },

    #[error("deploy '{deploy}': instance_template must differ from instance_template_base")]
    SameTemplate { deploy: String },

    #[error("{field}: invalid number '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("delete_instance_templates_after: invalid duration '{value}'")]
    InvalidDuration { value: String },

    #[error("deploy '{deploy}' {field}: {source}")]
    Script {
        deploy: String,
        field: &'static str,
        #[source]
        source: ScriptError,
    },

    #[error("deploy '{deploy}' has no credentials and no fallback credentials were given")]
    MissingCredential { deploy: String },

    #[error("deploy '{deploy}' credentials: {source}")]
    Credential {
        deploy: String,
        #[source]
        source: CredentialError,
    },
}

/// Everything a run needs from the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub deploys: Vec<DeploymentSpec>,
    /// None disables cleanup
    pub retention: Option<Duration>,
}

/// Read the config file, trying the `.yml`/`.yaml` sibling when the path is missing
pub async fn read_config_file(path: &Path) -> Result<(PathBuf, String), ConfigError> {
    for candidate in config_candidates(path) {
        match tokio::fs::read_to_string(&candidate).await {
            Ok(text) => return Ok((candidate, text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: candidate.display().to_string(),
                    source,
                })
            }
        }
    }

    Err(ConfigError::NotFound(path.display().to_string()))
}

fn config_candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") => candidates.push(path.with_extension("yaml")),
        Some("yaml") => candidates.push(path.with_extension("yml")),
        _ => {}
    }
    candidates
}

/// Strict decode; an empty document has no deploys
pub fn parse_document(text: &str) -> Result<ConfigDocument, ConfigError> {
    if text.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

/// Resolve every deploy entry against the environment snapshot `env`
pub async fn resolve(
    document: ConfigDocument,
    env: &VariableTable,
) -> Result<ResolvedConfig, ConfigError> {
    let retention = parse_retention(document.delete_instance_templates_after.as_ref())?;
    let common = document.common.unwrap_or_default();

    let mut deploys = Vec::with_capacity(document.deploys.len());
    for (i, entry) in document.deploys.into_iter().enumerate() {
        let entry = entry.merged_with(&common);
        deploys.push(resolve_entry(i + 1, entry, env).await?);
    }

    Ok(ResolvedConfig { deploys, retention })
}

async fn resolve_entry(
    index: usize,
    entry: DeployEntry,
    env: &VariableTable,
) -> Result<DeploymentSpec, ConfigError> {
    // Variable values only see the environment
    let vars: BTreeMap<String, String> = expand_map(entry.vars.as_ref(), env);
    let table = env.with_locals(&vars);
    let field = |value: &Option<Scalar>| expand_field(value.as_ref(), &table);

    let name = field(&entry.name);
    if name.is_empty() {
        return Err(ConfigError::MissingName { index });
    }

    let region = required(&name, "region", field(&entry.region))?;
    let instance_group = required(&name, "instance_group", field(&entry.instance_group))?;
    let instance_template_base =
        required(&name, "instance_template_base", field(&entry.instance_template_base))?;
    let instance_template = required(&name, "instance_template", field(&entry.instance_template))?;
    if instance_template == instance_template_base {
        return Err(ConfigError::SameTemplate { deploy: name });
    }

    let creds = field(&entry.creds);
    let credentials = if creds.trim().is_empty() {
        None
    } else {
        Some(read_path_or_inline(&creds).await)
    };

    let update_policy = resolve_update_policy(entry.update_policy.as_ref(), &table)?;

    let startup_script = resolve_script(&name, "startup_script", field(&entry.startup_script), &table).await?;
    let shutdown_script =
        resolve_script(&name, "shutdown_script", field(&entry.shutdown_script), &table).await?;
    let cloud_init = resolve_script(&name, "cloud_init", field(&entry.cloud_init), &table).await?;

    let tags = entry
        .tags
        .iter()
        .flatten()
        .map(|tag| expand_shell(tag.as_str(), &table))
        .collect();

    debug!(deploy = %name, index, "Resolved deploy entry");

    Ok(DeploymentSpec {
        project: field(&entry.project),
        credentials,
        region,
        instance_group,
        instance_template_base,
        instance_template,
        startup_script,
        shutdown_script,
        cloud_init,
        labels: expand_map(entry.labels.as_ref(), &table),
        metadata: expand_map(entry.metadata.as_ref(), &table),
        vars,
        tags,
        update_policy,
        name,
    })
}

fn expand_field(value: Option<&Scalar>, table: &VariableTable) -> String {
    value
        .map(|v| expand_shell(v.as_str(), table))
        .unwrap_or_default()
}

fn expand_map(map: Option<&ScalarMap>, table: &VariableTable) -> BTreeMap<String, String> {
    map.into_iter()
        .flatten()
        .map(|(k, v)| (k.clone(), expand_shell(v.as_str(), table)))
        .collect()
}

fn required(deploy: &str, field: &'static str, value: String) -> Result<String, ConfigError> {
    if value.is_empty() {
        Err(ConfigError::MissingField {
            deploy: deploy.to_string(),
            field,
        })
    } else {
        Ok(value)
    }
}

fn resolve_update_policy(
    entry: Option<&UpdatePolicyEntry>,
    table: &VariableTable,
) -> Result<UpdatePolicy, ConfigError> {
    let entry = entry.cloned().unwrap_or_default();
    let field = |value: &Option<Scalar>| expand_field(value.as_ref(), table).trim().to_string();
    let or_default = |value: String, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    let min_ready_sec = field(&entry.min_ready_sec);
    let min_ready_sec = if min_ready_sec.is_empty() {
        DEFAULT_MIN_READY_SEC
    } else {
        min_ready_sec.parse().map_err(|_| ConfigError::InvalidNumber {
            field: "update_policy.min_ready_sec".to_string(),
            value: min_ready_sec.clone(),
        })?
    };

    Ok(UpdatePolicy {
        update_type: or_default(field(&entry.update_type), DEFAULT_UPDATE_TYPE),
        minimal_action: or_default(field(&entry.minimal_action), DEFAULT_MINIMAL_ACTION),
        replacement_method: or_default(field(&entry.replacement_method), DEFAULT_REPLACEMENT_METHOD),
        min_ready_sec,
        max_surge: parse_fixed_or_percent("update_policy.max_surge", &field(&entry.max_surge), DEFAULT_MAX_SURGE)?,
        max_unavailable: parse_fixed_or_percent(
            "update_policy.max_unavailable",
            &field(&entry.max_unavailable),
            DEFAULT_MAX_UNAVAILABLE,
        )?,
    })
}

/// `"15%"` is a percentage, `"3"` an absolute count, `""` the default
pub fn parse_fixed_or_percent(
    field: &str,
    value: &str,
    default: FixedOrPercent,
) -> Result<FixedOrPercent, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(default);
    }

    let invalid = || ConfigError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    };

    match value.strip_suffix('%') {
        Some(percent) => percent.parse().map(FixedOrPercent::percent).map_err(|_| invalid()),
        None => value.parse().map(FixedOrPercent::fixed).map_err(|_| invalid()),
    }
}

async fn resolve_script(
    deploy: &str,
    field: &'static str,
    path: String,
    table: &VariableTable,
) -> Result<Option<Script>, ConfigError> {
    let path = path.trim().to_string();
    if path.is_empty() {
        return Ok(None);
    }

    let content = scripts::fetch(&path)
        .instrument(debug_span!("script", deploy = %deploy, field))
        .await
        .map_err(|source| ConfigError::Script {
            deploy: deploy.to_string(),
            field,
            source,
        })?;

    Ok(Some(Script {
        content: expand(&content, table, Syntax::Curly),
        path,
    }))
}

/// Contents of the file at `value`, or `value` itself when it is not a readable path
pub async fn read_path_or_inline(value: &str) -> String {
    match tokio::fs::read_to_string(value).await {
        Ok(content) => content,
        Err(_) => value.to_string(),
    }
}

/// `false` or a zero duration disables cleanup; absent or empty means 14 days
pub fn parse_retention(value: Option<&Scalar>) -> Result<Option<Duration>, ConfigError> {
    let value = value.map(|v| v.as_str().trim()).unwrap_or_default();
    match value {
        "false" => Ok(None),
        "" => Ok(Some(DEFAULT_RETENTION)),
        // A zero window would delete every template we own, including the one just created
        other => parse_duration(other).map(|d| Some(d).filter(|d| !d.is_zero())),
    }
}

/// Parse a duration such as `300ms`, `1.5h`, `2h45m` or `14d`
///
/// Accepts the units ns, us (or µs), ms, s, m, h and d. A bare `0` is zero.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        value: text.to_string(),
    };

    let mut rest = text.trim();
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 60 * 60 * 1_000_000_000,
            "d" => 24 * 60 * 60 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.contains('.') {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(invalid)?;

        // Fractions beyond nanosecond precision are dropped
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(fraction.len() as u32);
            nanos = nanos
                .checked_add(digits * unit_nanos / scale)
                .ok_or_else(invalid)?;
        }

        total_nanos = total_nanos.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// Pair every deploy with its credential
///
/// The deploy's own `creds` win; `fallback` (path or inline JSON) covers the
/// rest. A deploy with neither is a configuration error.
pub async fn attach_credentials(
    deploys: Vec<DeploymentSpec>,
    fallback: Option<&str>,
) -> Result<Vec<RolloutTarget>, ConfigError> {
    let fallback = match fallback.map(str::trim).filter(|f| !f.is_empty()) {
        Some(value) => Some(read_path_or_inline(value).await),
        None => None,
    };

    deploys
        .into_iter()
        .map(|spec| -> Result<RolloutTarget, ConfigError> {
            let data = spec
                .credentials
                .as_deref()
                .or(fallback.as_deref())
                .ok_or_else(|| ConfigError::MissingCredential {
                    deploy: spec.name.clone(),
                })?;
            let credential = Credential::from_json(data).map_err(|source| ConfigError::Credential {
                deploy: spec.name.clone(),
                source,
            })?;
            Ok(RolloutTarget { spec, credential })
        })
        .collect()
}
