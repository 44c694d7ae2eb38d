//! Rolling update activity
//!
//! Replaces the instance group's version roster with the new template and
//! applies the update policy. Refuses to install a template whose version is
//! not strictly newer than the latest one the group already runs.

use duroxide::ActivityContext;
use gce_rollout_models::compute::{
    InstanceGroupManager, InstanceGroupManagerUpdatePolicy, InstanceGroupManagerVersion,
};

use super::ComputeClients;
use crate::activity_types::{RollingUpdateInput, RollingUpdateOutput};
use crate::compute_client::ComputeApi;
use crate::names;
use crate::version::{find_latest_version, version_less_than};

/// Activity name for registration
pub const NAME: &str = names::activities::ROLLING_UPDATE;

pub async fn activity(
    ctx: ActivityContext,
    input: RollingUpdateInput,
    clients: ComputeClients,
) -> Result<RollingUpdateOutput, String> {
    let compute = clients.get(&input.client)?;
    let output = rolling_update(compute.as_ref(), &input).await?;

    let policy = &input.policy;
    match &output {
        RollingUpdateOutput::Started { .. } => ctx.trace_info(format!(
            "Started rolling update for instance group '{}/{}' with UpdateType:{}, MinimalAction:{}, ReplacementMethod:{}, MinReady:{}sec, MaxSurge:{}, MaxUnavailable:{}",
            input.project,
            input.instance_group,
            policy.update_type,
            policy.minimal_action,
            policy.replacement_method,
            policy.min_ready_sec,
            policy.max_surge,
            policy.max_unavailable,
        )),
        RollingUpdateOutput::NotReady { reason } => ctx.trace_info(format!(
            "Instance group '{}/{}' is not ready for '{}': {}",
            input.project, input.instance_group, input.template, reason
        )),
        RollingUpdateOutput::Rejected { latest } => ctx.trace_warn(format!(
            "Refusing to roll '{}' back from '{}' to '{}'",
            input.instance_group, latest, input.template
        )),
    }

    Ok(output)
}

pub(crate) async fn rolling_update(
    compute: &dyn ComputeApi,
    input: &RollingUpdateInput,
) -> Result<RollingUpdateOutput, String> {
    // 1. Read the current group
    let mut group = compute
        .get_instance_group(&input.project, &input.region, &input.instance_group)
        .await
        .map_err(|e| format!("get instance group '{}/{}': {}", input.project, input.instance_group, e))?;

    // 2. Anti-regression guard
    let previous_version = find_latest_version(group.versions.iter().map(|v| v.name.as_str()))
        .map(str::to_string);

    if let Some(latest) = &previous_version {
        if !version_less_than(latest, &input.template) {
            return Ok(RollingUpdateOutput::Rejected {
                latest: latest.clone(),
            });
        }
    }

    // 3. New roster and policy
    apply_rollout(&mut group, input);

    // 4. The template may not be usable by the group yet
    match compute
        .patch_instance_group(&input.project, &input.region, &input.instance_group, &group)
        .await
    {
        Ok(_) => Ok(RollingUpdateOutput::Started { previous_version }),
        Err(e) if e.is_not_ready() => Ok(RollingUpdateOutput::NotReady {
            reason: e.to_string(),
        }),
        Err(e) => Err(format!("patch instance group '{}/{}': {}", input.project, input.instance_group, e)),
    }
}

/// Replace the version roster with the single new template and set the policy
fn apply_rollout(group: &mut InstanceGroupManager, input: &RollingUpdateInput) {
    // The top-level template shorthand would conflict with the roster
    group.instance_template = None;
    group.versions = vec![InstanceGroupManagerVersion {
        name: input.template.clone(),
        instance_template: input.template_url.clone(),
        ..Default::default()
    }];

    let policy = &input.policy;
    let target = group
        .update_policy
        .get_or_insert_with(InstanceGroupManagerUpdatePolicy::default);
    target.update_type = Some(policy.update_type.clone());
    target.minimal_action = Some(policy.minimal_action.clone());
    target.replacement_method = Some(policy.replacement_method.clone());
    target.min_ready_sec = Some(i64::from(policy.min_ready_sec));
    target.max_surge = Some(policy.max_surge.into());
    target.max_unavailable = Some(policy.max_unavailable.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_client::ComputeError;
    use crate::testing::FakeCompute;
    use gce_rollout_models::compute::FixedOrPercentValue;
    use gce_rollout_models::{FixedOrPercent, UpdatePolicy};

    fn group(versions: &[&str]) -> InstanceGroupManager {
        InstanceGroupManager {
            name: "web-ig".to_string(),
            instance_template: Some("old-shorthand".to_string()),
            versions: versions
                .iter()
                .map(|name| InstanceGroupManagerVersion {
                    name: name.to_string(),
                    instance_template: format!("global/instanceTemplates/{}", name),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn input(template: &str) -> RollingUpdateInput {
        RollingUpdateInput {
            client: "web".to_string(),
            project: "p".to_string(),
            region: "us-central1".to_string(),
            instance_group: "web-ig".to_string(),
            template: template.to_string(),
            template_url: format!(
                "https://compute.googleapis.com/compute/v1/projects/p/global/instanceTemplates/{}",
                template
            ),
            policy: UpdatePolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_update_replaces_roster_and_policy() {
        let compute = FakeCompute::new().with_group(group(&["web-1", "web-2"]));

        let mut input = input("web-3");
        input.policy.max_surge = FixedOrPercent::percent(20);

        let output = rolling_update(&compute, &input).await.unwrap();
        assert_eq!(
            output,
            RollingUpdateOutput::Started {
                previous_version: Some("web-2".to_string())
            }
        );

        let patched = compute.patched();
        assert_eq!(patched.len(), 1);
        let patched = &patched[0];
        assert_eq!(patched.instance_template, None);
        assert_eq!(patched.versions.len(), 1);
        assert_eq!(patched.versions[0].name, "web-3");
        assert_eq!(patched.versions[0].instance_template, input.template_url);

        let policy = patched.update_policy.as_ref().unwrap();
        assert_eq!(policy.update_type.as_deref(), Some("PROACTIVE"));
        assert_eq!(policy.minimal_action.as_deref(), Some("REPLACE"));
        assert_eq!(policy.replacement_method.as_deref(), Some("SUBSTITUTE"));
        assert_eq!(policy.min_ready_sec, Some(10));
        assert_eq!(
            policy.max_surge,
            Some(FixedOrPercentValue { fixed: None, percent: Some(20) })
        );
        assert_eq!(
            policy.max_unavailable,
            Some(FixedOrPercentValue { fixed: Some(0), percent: None })
        );
    }

    #[tokio::test]
    async fn test_guard_rejects_same_version() {
        let compute = FakeCompute::new().with_group(group(&["web-3"]));

        let output = rolling_update(&compute, &input("web-3")).await.unwrap();
        assert_eq!(output, RollingUpdateOutput::Rejected { latest: "web-3".to_string() });
        assert_eq!(compute.patch_calls(), 0);
    }

    #[tokio::test]
    async fn test_guard_rejects_older_version() {
        let compute = FakeCompute::new().with_group(group(&["web-9", "web-10"]));

        let output = rolling_update(&compute, &input("web-9")).await.unwrap();
        assert_eq!(output, RollingUpdateOutput::Rejected { latest: "web-10".to_string() });
        assert_eq!(compute.patch_calls(), 0);
    }

    #[tokio::test]
    async fn test_group_without_versions_is_updated() {
        let compute = FakeCompute::new().with_group(group(&[]));

        let output = rolling_update(&compute, &input("web-1")).await.unwrap();
        assert_eq!(output, RollingUpdateOutput::Started { previous_version: None });
        assert_eq!(compute.patched().len(), 1);
    }

    #[tokio::test]
    async fn test_not_ready_patch_changes_nothing() {
        let compute = FakeCompute::new()
            .with_group(group(&["web-1"]))
            .with_patch_errors(vec![ComputeError::NotReady("web-ig".to_string())]);

        let output = rolling_update(&compute, &input("web-2")).await.unwrap();
        assert!(matches!(output, RollingUpdateOutput::NotReady { .. }));
        assert!(compute.patched().is_empty());

        // the next attempt goes through
        let output = rolling_update(&compute, &input("web-2")).await.unwrap();
        assert!(matches!(output, RollingUpdateOutput::Started { .. }));
        assert_eq!(compute.patch_calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_patch_error_fails() {
        let compute = FakeCompute::new()
            .with_group(group(&["web-1"]))
            .with_patch_errors(vec![ComputeError::Auth("token expired".to_string())]);

        let err = rolling_update(&compute, &input("web-2")).await.unwrap_err();
        assert!(err.starts_with("patch instance group 'p/web-ig'"));
    }

    #[tokio::test]
    async fn test_missing_group_fails() {
        let compute = FakeCompute::new();

        let err = rolling_update(&compute, &input("web-2")).await.unwrap_err();
        assert!(err.starts_with("get instance group 'p/web-ig'"));
    }
}
