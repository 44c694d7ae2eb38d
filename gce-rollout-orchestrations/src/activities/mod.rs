pub mod clone_template;
pub mod delete_template;
pub mod get_template;
pub mod list_expired_templates;
pub mod rolling_update;

use std::collections::HashMap;
use std::sync::Arc;

use crate::compute_client::ComputeApi;

/// Compute clients of a run, keyed by the `client` field of activity inputs
///
/// Credentials never enter orchestration history; activities look their
/// client up here instead.
#[derive(Clone, Default)]
pub struct ComputeClients {
    clients: Arc<HashMap<String, Arc<dyn ComputeApi>>>,
}

impl ComputeClients {
    pub fn new(clients: HashMap<String, Arc<dyn ComputeApi>>) -> Self {
        Self {
            clients: Arc::new(clients),
        }
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn ComputeApi>, String> {
        self.clients
            .get(key)
            .cloned()
            .ok_or_else(|| format!("no compute client registered for '{}'", key))
    }
}
