//! Delete instance template activity

use duroxide::ActivityContext;

use super::ComputeClients;
use crate::activity_types::{DeleteTemplateInput, DeleteTemplateOutput};
use crate::compute_client::{ComputeApi, ComputeError};
use crate::names;

/// Activity name for registration
pub const NAME: &str = names::activities::DELETE_TEMPLATE;

pub async fn activity(
    ctx: ActivityContext,
    input: DeleteTemplateInput,
    clients: ComputeClients,
) -> Result<DeleteTemplateOutput, String> {
    let compute = clients.get(&input.client)?;
    let output = delete_template(compute.as_ref(), &input).await?;

    match output {
        DeleteTemplateOutput::Deleted => ctx.trace_info(format!(
            "Deleted old instance template '{}/{}'",
            input.project, input.template
        )),
        // Expected races
        DeleteTemplateOutput::InUse => tracing::debug!(
            "Instance template '{}/{}' is still in use",
            input.project,
            input.template
        ),
        DeleteTemplateOutput::AlreadyGone => tracing::debug!(
            "Instance template '{}/{}' is already gone",
            input.project,
            input.template
        ),
    }
    Ok(output)
}

pub(crate) async fn delete_template(
    compute: &dyn ComputeApi,
    input: &DeleteTemplateInput,
) -> Result<DeleteTemplateOutput, String> {
    match compute.delete_template(&input.project, &input.template).await {
        Ok(_) => Ok(DeleteTemplateOutput::Deleted),
        Err(ComputeError::InUseByAnotherResource(_)) => Ok(DeleteTemplateOutput::InUse),
        Err(ComputeError::NotFound(_)) => Ok(DeleteTemplateOutput::AlreadyGone),
        Err(e) => Err(format!("'{}': {}", input.template, e)),
    }
}
