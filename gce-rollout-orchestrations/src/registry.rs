//! Registry builders for gce-rollout orchestrations and activities

use duroxide::runtime::registry::ActivityRegistry;
use duroxide::{ActivityContext, OrchestrationRegistry};

use crate::activities::{self, ComputeClients};
use crate::activity_types::{
    CloneTemplateInput, DeleteTemplateInput, GetTemplateInput, ListExpiredTemplatesInput,
    RollingUpdateInput,
};
use crate::names::orchestrations;

/// Create an OrchestrationRegistry with all gce-rollout orchestrations
pub fn create_orchestration_registry() -> OrchestrationRegistry {
    OrchestrationRegistry::builder()
        .register_typed(
            orchestrations::ROLLOUT,
            crate::orchestrations::rollout::rollout_orchestration,
        )
        .register_typed(
            orchestrations::CLEANUP_TEMPLATES,
            crate::orchestrations::cleanup_templates::cleanup_templates_orchestration,
        )
        .build()
}

/// Create an ActivityRegistry whose activities reach the control plane through `clients`
pub fn create_activity_registry(clients: ComputeClients) -> ActivityRegistry {
    let clone_clients = clients.clone();
    let get_clients = clients.clone();
    let update_clients = clients.clone();
    let list_clients = clients.clone();
    let delete_clients = clients;

    ActivityRegistry::builder()
        .register_typed(
            activities::clone_template::NAME,
            move |ctx: ActivityContext, input: CloneTemplateInput| {
                activities::clone_template::activity(ctx, input, clone_clients.clone())
            },
        )
        .register_typed(
            activities::get_template::NAME,
            move |ctx: ActivityContext, input: GetTemplateInput| {
                activities::get_template::activity(ctx, input, get_clients.clone())
            },
        )
        .register_typed(
            activities::rolling_update::NAME,
            move |ctx: ActivityContext, input: RollingUpdateInput| {
                activities::rolling_update::activity(ctx, input, update_clients.clone())
            },
        )
        .register_typed(
            activities::list_expired_templates::NAME,
            move |ctx: ActivityContext, input: ListExpiredTemplatesInput| {
                activities::list_expired_templates::activity(ctx, input, list_clients.clone())
            },
        )
        .register_typed(
            activities::delete_template::NAME,
            move |ctx: ActivityContext, input: DeleteTemplateInput| {
                activities::delete_template::activity(ctx, input, delete_clients.clone())
            },
        )
        .build()
}
