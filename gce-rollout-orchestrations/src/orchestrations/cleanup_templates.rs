//! Cleanup templates orchestration
//!
//! Lists own templates past the retention window and deletes them in
//! parallel. Every delete is joined before the orchestration returns.

use duroxide::{DurableOutput, OrchestrationContext};

use crate::activity_types::{
    DeleteTemplateInput, DeleteTemplateOutput, ListExpiredTemplatesInput,
    ListExpiredTemplatesOutput,
};
use crate::names::activities;
use crate::types::{CleanupTemplatesInput, CleanupTemplatesOutput};

pub async fn cleanup_templates_orchestration(
    ctx: OrchestrationContext,
    input: CleanupTemplatesInput,
) -> Result<CleanupTemplatesOutput, String> {
    // Step 1: Own templates past the window
    let list_input = ListExpiredTemplatesInput {
        client: input.client.clone(),
        project: input.project.clone(),
        retention: input.retention,
    };
    let expired = ctx
        .schedule_activity_typed::<ListExpiredTemplatesInput, ListExpiredTemplatesOutput>(
            activities::LIST_EXPIRED_TEMPLATES,
            &list_input,
        )
        .into_activity_typed::<ListExpiredTemplatesOutput>()
        .await?;

    if expired.templates.is_empty() {
        return Ok(CleanupTemplatesOutput::default());
    }

    // Step 2: Fan out one delete per template
    let deletes = expired
        .templates
        .iter()
        .map(|template| {
            ctx.schedule_activity_typed::<DeleteTemplateInput, DeleteTemplateOutput>(
                activities::DELETE_TEMPLATE,
                &DeleteTemplateInput {
                    client: input.client.clone(),
                    project: input.project.clone(),
                    template: template.clone(),
                },
            )
        })
        .collect::<Vec<_>>();
    let results = ctx.join(deletes).await;

    // Step 3: Tally; in-use and already-gone templates are not failures
    let mut output = CleanupTemplatesOutput::default();
    let mut failures = Vec::new();

    for (template, result) in expired.templates.into_iter().zip(results) {
        let outcome = match result {
            DurableOutput::Activity(Ok(json)) => serde_json::from_str::<DeleteTemplateOutput>(&json)
                .map_err(|e| format!("'{}': decode delete result: {}", template, e)),
            DurableOutput::Activity(Err(e)) => Err(e),
            other => Err(format!("'{}': unexpected completion {:?}", template, other)),
        };

        match outcome {
            Ok(DeleteTemplateOutput::Deleted) => output.deleted.push(template),
            Ok(DeleteTemplateOutput::InUse) => output.in_use.push(template),
            Ok(DeleteTemplateOutput::AlreadyGone) => {}
            Err(e) => {
                ctx.trace_warn(format!(
                    "Failed to delete instance template '{}/{}': {}",
                    input.project, template, e
                ));
                failures.push(e);
            }
        }
    }

    if !failures.is_empty() {
        return Err(format!("delete instance templates: {}", failures.join("; ")));
    }

    ctx.trace_info(format!(
        "Deleted {} instance template(s) in '{}'",
        output.deleted.len(),
        input.project
    ));
    Ok(output)
}
