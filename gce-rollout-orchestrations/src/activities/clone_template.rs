//! Clone instance template activity

use duroxide::ActivityContext;
use gce_rollout_models::compute::{
    InstanceProperties, InstanceTemplate, Metadata, Tags, SHUTDOWN_SCRIPT_KEY,
    STARTUP_SCRIPT_KEY, USER_DATA_KEY,
};

use super::ComputeClients;
use crate::activity_types::{CloneTemplateInput, CloneTemplateOutput};
use crate::compute_client::ComputeApi;
use crate::names;

/// Activity name for registration
pub const NAME: &str = names::activities::CLONE_TEMPLATE;

/// Description marking templates created by this tool; cleanup only touches these
pub const TEMPLATE_DESCRIPTION: &str = "created by gce-rollout";

pub async fn activity(
    ctx: ActivityContext,
    input: CloneTemplateInput,
    clients: ComputeClients,
) -> Result<CloneTemplateOutput, String> {
    ctx.trace_info(format!(
        "Cloning instance template '{}/{}' into '{}'",
        input.project, input.base_template, input.template
    ));

    let compute = clients.get(&input.client)?;
    let output = clone_template(compute.as_ref(), &input).await?;

    ctx.trace_info(format!("Submitted instance template '{}/{}'", input.project, output.template));
    Ok(output)
}

pub(crate) async fn clone_template(
    compute: &dyn ComputeApi,
    input: &CloneTemplateInput,
) -> Result<CloneTemplateOutput, String> {
    // 1. Read the base template
    let base = compute
        .get_template(&input.project, &input.base_template)
        .await
        .map_err(|e| {
            format!(
                "get instance template base '{}/{}': {}",
                input.project, input.base_template, e
            )
        })?;

    // 2. Submit the derived template; a name collision is surfaced as-is
    let template = derive_template(base, input);
    let operation = compute
        .insert_template(&input.project, &template)
        .await
        .map_err(|e| format!("save instance template: {}", e))?;

    Ok(CloneTemplateOutput {
        template: input.template.clone(),
        target_link: operation.target_link.filter(|link| !link.is_empty()),
    })
}

/// Copy of `base` carrying the new name, tags, labels, metadata and scripts
fn derive_template(base: InstanceTemplate, input: &CloneTemplateInput) -> InstanceTemplate {
    let mut template = base;
    template.name = input.template.clone();
    template.description = Some(TEMPLATE_DESCRIPTION.to_string());

    // Output-only fields of the base
    template.id = None;
    template.self_link = None;
    template.creation_timestamp = None;

    let properties = template.properties.get_or_insert_with(InstanceProperties::default);

    let tags = properties.tags.get_or_insert_with(Tags::default);
    tags.items.extend(input.tags.iter().cloned());

    let labels = properties.labels.get_or_insert_with(Default::default);
    for (key, value) in &input.labels {
        labels.insert(key.clone(), value.clone());
    }

    let metadata = properties.metadata.get_or_insert_with(Metadata::default);
    for (key, value) in &input.metadata {
        metadata.set(key, value);
    }

    let scripts = [
        (STARTUP_SCRIPT_KEY, &input.startup_script),
        (SHUTDOWN_SCRIPT_KEY, &input.shutdown_script),
        (USER_DATA_KEY, &input.cloud_init),
    ];
    for (key, script) in scripts {
        if let Some(content) = script {
            metadata.set(key, content);
        }
    }

    template
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_client::ComputeError;
    use crate::testing::{template, FakeCompute};
    use gce_rollout_models::compute::MetadataItem;
    use std::collections::BTreeMap;

    fn input() -> CloneTemplateInput {
        CloneTemplateInput {
            client: "web".to_string(),
            project: "p".to_string(),
            base_template: "web-base".to_string(),
            template: "web-2".to_string(),
            tags: vec!["y".to_string()],
            labels: BTreeMap::from([("env".to_string(), "prod".to_string())]),
            metadata: BTreeMap::from([("team".to_string(), "core".to_string())]),
            startup_script: Some("#!/bin/sh\necho start".to_string()),
            shutdown_script: None,
            cloud_init: Some("#cloud-config".to_string()),
        }
    }

    fn base_template() -> InstanceTemplate {
        let mut base = template("web-base");
        base.id = Some("123".to_string());
        base.creation_timestamp = Some("2024-01-01T00:00:00Z".to_string());
        base.description = Some("hand made".to_string());
        base.properties = Some(InstanceProperties {
            tags: Some(Tags {
                items: vec!["x".to_string()],
                ..Default::default()
            }),
            labels: Some(BTreeMap::from([
                ("env".to_string(), "staging".to_string()),
                ("app".to_string(), "web".to_string()),
            ])),
            metadata: Some(Metadata {
                items: vec![
                    MetadataItem { key: "team".to_string(), value: Some("old".to_string()) },
                    MetadataItem { key: "startup-script".to_string(), value: Some("old".to_string()) },
                ],
                ..Default::default()
            }),
            ..Default::default()
        });
        base
    }

    #[test]
    fn test_derive_template_appends_tags_and_overlays_maps() {
        let derived = derive_template(base_template(), &input());
        let properties = derived.properties.unwrap();

        assert_eq!(derived.name, "web-2");
        assert_eq!(derived.description.as_deref(), Some(TEMPLATE_DESCRIPTION));
        assert_eq!(derived.id, None);
        assert_eq!(derived.self_link, None);
        assert_eq!(derived.creation_timestamp, None);

        assert_eq!(properties.tags.unwrap().items, vec!["x", "y"]);

        let labels = properties.labels.unwrap();
        assert_eq!(labels["env"], "prod");
        assert_eq!(labels["app"], "web");

        let metadata = properties.metadata.unwrap();
        assert_eq!(metadata.get("team"), Some("core"));
        assert_eq!(metadata.get("startup-script"), Some("#!/bin/sh\necho start"));
        assert_eq!(metadata.get("shutdown-script"), None);
        assert_eq!(metadata.get("user-data"), Some("#cloud-config"));
        assert_eq!(metadata.items.len(), 3);
    }

    #[test]
    fn test_derive_template_without_base_properties() {
        let derived = derive_template(template("bare"), &input());
        let properties = derived.properties.unwrap();
        assert_eq!(properties.tags.unwrap().items, vec!["y"]);
        assert_eq!(properties.labels.unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_tags_are_kept() {
        let mut input = input();
        input.tags = vec!["x".to_string()];
        let derived = derive_template(base_template(), &input);
        assert_eq!(derived.properties.unwrap().tags.unwrap().items, vec!["x", "x"]);
    }

    #[tokio::test]
    async fn test_clone_inserts_derived_template() {
        let compute = FakeCompute::new().with_template(base_template());

        let output = clone_template(&compute, &input()).await.unwrap();

        assert_eq!(output.template, "web-2");
        assert_eq!(
            output.target_link.as_deref(),
            Some("https://compute.googleapis.com/compute/v1/projects/p/global/instanceTemplates/web-2")
        );

        let inserted = compute.inserted();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].properties.as_ref().unwrap().tags.as_ref().unwrap().items, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_clone_surfaces_name_collision() {
        let compute = FakeCompute::new()
            .with_template(base_template())
            .with_template(template("web-2"));

        let err = clone_template(&compute, &input()).await.unwrap_err();
        assert!(err.starts_with("save instance template: "));
        assert!(err.contains(&ComputeError::AlreadyExists("web-2".to_string()).to_string()));
    }

    #[tokio::test]
    async fn test_clone_fails_without_base_template() {
        let compute = FakeCompute::new();

        let err = clone_template(&compute, &input()).await.unwrap_err();
        assert!(err.starts_with("get instance template base 'p/web-base'"));
        assert!(compute.inserted().is_empty());
    }
}
