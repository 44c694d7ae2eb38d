//! Run a set of rollouts on a Duroxide runtime
//!
//! The runtime lives for one run, on an in-memory store. Each entry becomes
//! one rollout orchestration; all of them are started together and each
//! result is collected under its entry's name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use duroxide::providers::sqlite::SqliteProvider;
use duroxide::runtime::{Runtime, RuntimeOptions};
use duroxide::{Client, OrchestrationStatus};
use tokio::time::Instant;

use crate::activities::ComputeClients;
use crate::compute_client::{ClientFactory, ComputeApi};
use crate::error::RolloutError;
use crate::names::orchestrations;
use crate::registry::{create_activity_registry, create_orchestration_registry};
use crate::types::{
    RolloutInput, RolloutOutcome, RolloutOutput, RolloutResult, RolloutSettings, RolloutTarget,
};

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run every target concurrently and collect one result per target, in input order
///
/// Fails only when the runtime itself cannot be started.
pub async fn run_rollouts(
    targets: Vec<RolloutTarget>,
    settings: &RolloutSettings,
    factory: &ClientFactory,
) -> Result<Vec<RolloutResult>> {
    // 1. Project and client per entry; a failure here belongs to that entry only
    let mut clients: HashMap<String, Arc<dyn ComputeApi>> = HashMap::new();
    let mut entries = Vec::with_capacity(targets.len());

    for (index, target) in targets.into_iter().enumerate() {
        let name = target.spec.name.clone();
        let instance_id = format!("rollout-{}-{}", index, name);

        let prepared = prepare(&instance_id, target, settings, factory).map(|(input, compute)| {
            clients.insert(instance_id.clone(), compute);
            input
        });
        entries.push((name, instance_id, prepared));
    }

    // 2. Runtime over an in-memory store
    let store = Arc::new(
        SqliteProvider::new_in_memory()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Duroxide store: {}", e))?,
    );
    let activities = Arc::new(create_activity_registry(ComputeClients::new(clients)));
    let orchestrations = create_orchestration_registry();
    let runtime = Runtime::start_with_options(
        store.clone(),
        activities,
        orchestrations,
        RuntimeOptions::default(),
    )
    .await;
    let client = Client::new(store);

    // 3. Start every prepared entry before waiting on any
    let mut started = Vec::with_capacity(entries.len());
    for (name, instance_id, prepared) in entries {
        let outcome = match prepared {
            Ok(input) => start(&client, &instance_id, &input).await,
            Err(e) => Err(e),
        };
        started.push((name, instance_id, outcome));
    }

    // 4. Collect
    let mut results = Vec::with_capacity(started.len());
    for (name, instance_id, outcome) in started {
        let outcome = match outcome {
            Ok(()) => wait(&client, &instance_id, settings.wait).await,
            Err(e) => Err(e),
        };
        results.push(RolloutResult { name, outcome });
    }

    tracing::debug!("Shutting down Duroxide runtime");
    runtime.shutdown(None).await;

    Ok(results)
}

/// Resolve the entry's project and build its client
fn prepare(
    instance_id: &str,
    target: RolloutTarget,
    settings: &RolloutSettings,
    factory: &ClientFactory,
) -> Result<(RolloutInput, Arc<dyn ComputeApi>), RolloutError> {
    let RolloutTarget { mut spec, credential } = target;

    let project = if spec.project.is_empty() {
        credential
            .project_id()
            .map(str::to_string)
            .ok_or_else(|| {
                RolloutError::Credential(format!(
                    "deploy '{}' has no project and its credential has no project_id",
                    spec.name
                ))
            })?
    } else {
        spec.project.clone()
    };

    let compute = factory(&credential).map_err(|e| RolloutError::Client(format!("{:#}", e)))?;

    // Credential content stays out of orchestration history
    spec.credentials = None;

    let input = RolloutInput {
        client: instance_id.to_string(),
        project,
        spec,
        retention: settings.retention,
        poll: settings.poll,
    };
    Ok((input, compute))
}

async fn start(client: &Client, instance_id: &str, input: &RolloutInput) -> Result<(), RolloutError> {
    let input_json =
        serde_json::to_string(input).map_err(|e| RolloutError::Aborted(format!("encode input: {}", e)))?;

    client
        .start_orchestration(instance_id, orchestrations::ROLLOUT, input_json)
        .await
        .map_err(|e| RolloutError::Aborted(format!("start orchestration '{}': {}", instance_id, e)))
}

async fn wait(
    client: &Client,
    instance_id: &str,
    timeout: Duration,
) -> Result<RolloutOutput, RolloutError> {
    let deadline = Instant::now() + timeout;

    loop {
        match client.get_orchestration_status(instance_id).await {
            Ok(OrchestrationStatus::Completed { output, .. }) => {
                let outcome: RolloutOutcome = serde_json::from_str(&output)
                    .map_err(|e| RolloutError::Aborted(format!("decode outcome: {}", e)))?;
                return match outcome {
                    RolloutOutcome::Succeeded(output) => Ok(output),
                    RolloutOutcome::Failed(e) => Err(e),
                };
            }
            Ok(OrchestrationStatus::Failed { details, .. }) => {
                return Err(RolloutError::Aborted(format!("{:?}", details)));
            }
            // Running, or not yet picked up by the runtime
            _ => {}
        }

        if Instant::now() >= deadline {
            return Err(RolloutError::Aborted(format!(
                "orchestration '{}' still running after {:?}",
                instance_id, timeout
            )));
        }
        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
    }
}
