//! Rollout orchestration
//!
//! Drives one deployment entry through clone, rolling update and cleanup.
//! Entry failures are reported in the outcome; the orchestration itself only
//! fails when the runtime cannot run it.

use std::future::Future;

use duroxide::OrchestrationContext;

use crate::activity_types::{
    CloneTemplateInput, CloneTemplateOutput, GetTemplateInput, GetTemplateOutput,
    RollingUpdateInput, RollingUpdateOutput,
};
use crate::error::RolloutError;
use crate::names::{activities, orchestrations};
use crate::types::{
    CleanupTemplatesInput, CleanupTemplatesOutput, PollPolicy, RolloutInput, RolloutOutcome,
    RolloutOutput,
};

pub async fn rollout_orchestration(
    ctx: OrchestrationContext,
    input: RolloutInput,
) -> Result<RolloutOutcome, String> {
    ctx.trace_info(format!(
        "Rolling out '{}': instance group '{}/{}' onto '{}'",
        input.spec.name, input.project, input.spec.instance_group, input.spec.instance_template
    ));

    match rollout_impl(&ctx, &input).await {
        Ok(output) => Ok(RolloutOutcome::Succeeded(output)),
        Err(e) => {
            ctx.trace_error(format!("Rollout of '{}' failed: {}", input.spec.name, e));
            Ok(RolloutOutcome::Failed(e))
        }
    }
}

async fn rollout_impl(
    ctx: &OrchestrationContext,
    input: &RolloutInput,
) -> Result<RolloutOutput, RolloutError> {
    let spec = &input.spec;
    let project = &input.project;

    // Step 1: Clone the base template
    ctx.trace_info("Step 1: Cloning the base instance template");
    let clone_input = CloneTemplateInput::from_spec(&input.client, spec, project);
    let cloned = ctx
        .schedule_activity_typed::<CloneTemplateInput, CloneTemplateOutput>(
            activities::CLONE_TEMPLATE,
            &clone_input,
        )
        .into_activity_typed::<CloneTemplateOutput>()
        .await
        .map_err(RolloutError::CloneTemplate)?;

    // Step 2: Inserts are eventually consistent, poll until readable
    ctx.trace_info("Step 2: Waiting for the new instance template");
    let visible = wait_for_template(ctx, input, &cloned.template).await?;

    let template_url = cloned
        .target_link
        .or(visible.self_link)
        .unwrap_or_else(|| format!("projects/{}/global/instanceTemplates/{}", project, cloned.template));
    ctx.trace_info(format!("Created new instance template '{}/{}'", project, cloned.template));

    // Step 3: Point the group at it
    ctx.trace_info("Step 3: Starting the rolling update");
    let update_input = RollingUpdateInput {
        client: input.client.clone(),
        project: project.clone(),
        region: spec.region.clone(),
        instance_group: spec.instance_group.clone(),
        template: cloned.template.clone(),
        template_url: template_url.clone(),
        policy: spec.update_policy.clone(),
    };
    let previous_version = start_rolling_update(ctx, input, &update_input).await?;

    // Step 4: Cleanup failures never fail the entry
    let cleanup = match input.retention {
        Some(retention) => {
            ctx.trace_info("Step 4: Deleting expired instance templates");
            let cleanup_input = CleanupTemplatesInput {
                client: input.client.clone(),
                project: project.clone(),
                retention,
            };
            match ctx
                .schedule_sub_orchestration_typed::<CleanupTemplatesInput, CleanupTemplatesOutput>(
                    orchestrations::CLEANUP_TEMPLATES,
                    &cleanup_input,
                )
                .into_sub_orchestration_typed::<CleanupTemplatesOutput>()
                .await
            {
                Ok(output) => Some(output),
                Err(e) => {
                    ctx.trace_warn(format!("Cleanup failed: {}", e));
                    None
                }
            }
        }
        None => None,
    };

    Ok(RolloutOutput {
        project: project.clone(),
        template: cloned.template,
        template_url,
        previous_version,
        cleanup,
    })
}

/// Result of one attempt at a step that may not be possible yet
enum Readiness<T> {
    Ready(T),
    NotReady(String),
}

/// Retry `attempt` while it reports NotReady, waiting `poll.interval` on a durable timer between tries
///
/// After `poll.retries` retries the last reason goes to `exhausted` along with the attempt count.
async fn poll_until_ready<T, F, Fut, E>(
    ctx: &OrchestrationContext,
    poll: PollPolicy,
    mut attempt: F,
    exhausted: E,
) -> Result<T, RolloutError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness<T>, RolloutError>>,
    E: FnOnce(u32, String) -> RolloutError,
{
    let mut last_reason = String::new();

    for n in 0..=poll.retries {
        if n > 0 {
            ctx.schedule_timer(poll.interval).into_timer().await;
        }

        match attempt().await? {
            Readiness::Ready(value) => return Ok(value),
            Readiness::NotReady(reason) => last_reason = reason,
        }
    }

    Err(exhausted(poll.retries + 1, last_reason))
}

async fn wait_for_template(
    ctx: &OrchestrationContext,
    input: &RolloutInput,
    template: &str,
) -> Result<GetTemplateOutput, RolloutError> {
    let get_input = &GetTemplateInput {
        client: input.client.clone(),
        project: input.project.clone(),
        template: template.to_string(),
    };

    poll_until_ready(
        ctx,
        input.poll,
        move || async move {
            let output = ctx
                .schedule_activity_typed::<GetTemplateInput, GetTemplateOutput>(
                    activities::GET_TEMPLATE,
                    get_input,
                )
                .into_activity_typed::<GetTemplateOutput>()
                .await
                .map_err(RolloutError::CloneTemplate)?;

            Ok(if output.visible {
                Readiness::Ready(output)
            } else {
                Readiness::NotReady("not visible yet".to_string())
            })
        },
        |attempts, _| RolloutError::WaitForTemplate {
            template: template.to_string(),
            attempts,
        },
    )
    .await
}

/// Latest version the group ran before the patch was accepted
async fn start_rolling_update(
    ctx: &OrchestrationContext,
    input: &RolloutInput,
    update_input: &RollingUpdateInput,
) -> Result<Option<String>, RolloutError> {
    poll_until_ready(
        ctx,
        input.poll,
        move || async move {
            let output = ctx
                .schedule_activity_typed::<RollingUpdateInput, RollingUpdateOutput>(
                    activities::ROLLING_UPDATE,
                    update_input,
                )
                .into_activity_typed::<RollingUpdateOutput>()
                .await
                .map_err(RolloutError::RollingUpdate)?;

            match output {
                RollingUpdateOutput::Started { previous_version } => Ok(Readiness::Ready(previous_version)),
                RollingUpdateOutput::NotReady { reason } => Ok(Readiness::NotReady(reason)),
                RollingUpdateOutput::Rejected { latest } => Err(RolloutError::Guard {
                    candidate: update_input.template.clone(),
                    latest,
                }),
            }
        },
        |attempts, reason| RolloutError::PatchNotReady {
            instance_group: update_input.instance_group.clone(),
            attempts,
            reason,
        },
    )
    .await
}
