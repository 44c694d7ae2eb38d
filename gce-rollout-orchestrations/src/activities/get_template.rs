//! Get instance template activity
//!
//! One visibility check of a freshly inserted template. The orchestration
//! repeats it on a timer, since inserts are eventually consistent with reads.

use duroxide::ActivityContext;

use super::ComputeClients;
use crate::activity_types::{GetTemplateInput, GetTemplateOutput};
use crate::compute_client::ComputeApi;
use crate::names;

/// Activity name for registration
pub const NAME: &str = names::activities::GET_TEMPLATE;

pub async fn activity(
    ctx: ActivityContext,
    input: GetTemplateInput,
    clients: ComputeClients,
) -> Result<GetTemplateOutput, String> {
    let compute = clients.get(&input.client)?;
    let output = check_template(compute.as_ref(), &input).await?;

    if !output.visible {
        ctx.trace_info(format!(
            "Instance template '{}/{}' is not visible yet",
            input.project, input.template
        ));
    }
    Ok(output)
}

pub(crate) async fn check_template(
    compute: &dyn ComputeApi,
    input: &GetTemplateInput,
) -> Result<GetTemplateOutput, String> {
    match compute.get_template(&input.project, &input.template).await {
        Ok(template) => Ok(GetTemplateOutput {
            visible: true,
            self_link: template.self_link,
        }),
        // Both answers are normal right after an insert
        Err(e) if e.is_not_ready() || e.is_not_found() => Ok(GetTemplateOutput {
            visible: false,
            self_link: None,
        }),
        Err(e) => Err(format!(
            "get saved instance template '{}/{}': {}",
            input.project, input.template, e
        )),
    }
}
