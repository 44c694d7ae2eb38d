//! Name constants for gce-rollout orchestrations and activities
//!
//! Following the naming convention: {crate-name}::{type}::{name}

/// Orchestration names
pub mod orchestrations {
    /// Roll one deployment entry forward onto a new instance template
    ///
    /// **Input:** [`crate::types::RolloutInput`]
    /// **Output:** [`crate::types::RolloutOutcome`]
    /// **Activities used:**
    /// - [`super::activities::CLONE_TEMPLATE`]
    /// - [`super::activities::GET_TEMPLATE`] (until the new template is visible)
    /// - [`super::activities::ROLLING_UPDATE`] (until the patch is accepted)
    /// **Sub-orchestrations:** [`CLEANUP_TEMPLATES`] when retention is enabled
    pub const ROLLOUT: &str = "gce-rollout-orchestrations::orchestration::rollout";

    /// Delete old instance templates created by this tool
    ///
    /// **Input:** [`crate::types::CleanupTemplatesInput`]
    /// **Output:** [`crate::types::CleanupTemplatesOutput`]
    /// **Activities used:**
    /// - [`super::activities::LIST_EXPIRED_TEMPLATES`]
    /// - [`super::activities::DELETE_TEMPLATE`] (one per expired template, in parallel)
    pub const CLEANUP_TEMPLATES: &str = "gce-rollout-orchestrations::orchestration::cleanup-templates";
}

/// Activity names
pub mod activities {
    /// Read the base template and insert a derived copy under the new name
    ///
    /// **Input:** [`crate::activity_types::CloneTemplateInput`]
    /// **Output:** [`crate::activity_types::CloneTemplateOutput`]
    /// **Idempotent:** No (the new name must not exist yet)
    pub const CLONE_TEMPLATE: &str = "gce-rollout-orchestrations::activity::clone-template";

    /// Check whether a freshly inserted template is readable yet
    ///
    /// **Input:** [`crate::activity_types::GetTemplateInput`]
    /// **Output:** [`crate::activity_types::GetTemplateOutput`]
    /// **Idempotent:** Yes
    pub const GET_TEMPLATE: &str = "gce-rollout-orchestrations::activity::get-template";

    /// Point the instance group at the new template and start a rolling update
    ///
    /// **Input:** [`crate::activity_types::RollingUpdateInput`]
    /// **Output:** [`crate::activity_types::RollingUpdateOutput`]
    /// **Idempotent:** No (refuses to install a template that is not newer)
    pub const ROLLING_UPDATE: &str = "gce-rollout-orchestrations::activity::rolling-update";

    /// List own templates older than the retention window
    ///
    /// **Input:** [`crate::activity_types::ListExpiredTemplatesInput`]
    /// **Output:** [`crate::activity_types::ListExpiredTemplatesOutput`]
    /// **Idempotent:** Yes
    pub const LIST_EXPIRED_TEMPLATES: &str =
        "gce-rollout-orchestrations::activity::list-expired-templates";

    /// Delete one instance template
    ///
    /// **Input:** [`crate::activity_types::DeleteTemplateInput`]
    /// **Output:** [`crate::activity_types::DeleteTemplateOutput`]
    /// **Idempotent:** Yes (already deleted and still used templates are reported, not failed)
    pub const DELETE_TEMPLATE: &str = "gce-rollout-orchestrations::activity::delete-template";
}
