pub mod cleanup_templates;
pub mod rollout;
