//! List expired instance templates activity

use std::time::Duration;

use chrono::{DateTime, Utc};
use duroxide::ActivityContext;
use gce_rollout_models::compute::InstanceTemplate;

use super::clone_template::TEMPLATE_DESCRIPTION;
use super::ComputeClients;
use crate::activity_types::{ListExpiredTemplatesInput, ListExpiredTemplatesOutput};
use crate::compute_client::ComputeApi;
use crate::names;

/// Activity name for registration
pub const NAME: &str = names::activities::LIST_EXPIRED_TEMPLATES;

pub async fn activity(
    ctx: ActivityContext,
    input: ListExpiredTemplatesInput,
    clients: ComputeClients,
) -> Result<ListExpiredTemplatesOutput, String> {
    let compute = clients.get(&input.client)?;
    let output = list_expired(compute.as_ref(), &input, Utc::now()).await?;

    ctx.trace_info(format!(
        "Found {} instance template(s) older than {:?} in '{}'",
        output.templates.len(),
        input.retention,
        input.project
    ));
    Ok(output)
}

pub(crate) async fn list_expired(
    compute: &dyn ComputeApi,
    input: &ListExpiredTemplatesInput,
    now: DateTime<Utc>,
) -> Result<ListExpiredTemplatesOutput, String> {
    let templates = compute
        .list_templates(&input.project)
        .await
        .map_err(|e| format!("list instance templates: {}", e))?;

    Ok(ListExpiredTemplatesOutput {
        templates: select_expired(&templates, input.retention, now)?,
    })
}

/// Names of templates carrying our description marker that are older than `retention`
fn select_expired(
    templates: &[InstanceTemplate],
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<String>, String> {
    let mut expired = Vec::new();

    for template in templates {
        let owned = template
            .description
            .as_deref()
            .is_some_and(|d| d.contains(TEMPLATE_DESCRIPTION));
        if !owned {
            continue;
        }

        let timestamp = template.creation_timestamp.as_deref().ok_or_else(|| {
            format!("instance template '{}' has no creation timestamp", template.name)
        })?;
        let created = DateTime::parse_from_rfc3339(timestamp).map_err(|e| {
            format!(
                "parse creation timestamp '{}' of '{}': {}",
                timestamp, template.name, e
            )
        })?;

        // Negative ages (clock skew) never qualify
        let age = now.signed_duration_since(created.with_timezone(&Utc));
        if age.to_std().is_ok_and(|age| age > retention) {
            expired.push(template.name.clone());
        }
    }

    Ok(expired)
}
