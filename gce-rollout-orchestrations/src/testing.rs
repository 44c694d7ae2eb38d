//! In-memory compute control plane for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use gce_rollout_models::compute::{InstanceGroupManager, InstanceTemplate, Operation};

use crate::compute_client::{ComputeApi, ComputeError};

#[derive(Default)]
struct State {
    templates: Vec<InstanceTemplate>,
    groups: HashMap<String, InstanceGroupManager>,
    /// Scripted answers to template reads, consumed one per read before the real lookup
    read_errors: HashMap<String, VecDeque<ComputeError>>,
    /// Scripted answers to patches, consumed one per call
    patch_errors: VecDeque<ComputeError>,
    delete_errors: HashMap<String, ComputeError>,
    list_error: Option<ComputeError>,
    inserted: Vec<InstanceTemplate>,
    patched: Vec<InstanceGroupManager>,
    deleted: Vec<String>,
    patch_calls: u32,
    template_reads: u32,
}

#[derive(Default)]
pub(crate) struct FakeCompute {
    state: Mutex<State>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, template: InstanceTemplate) -> Self {
        self.state.lock().unwrap().templates.push(template);
        self
    }

    pub fn with_group(self, group: InstanceGroupManager) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(group.name.clone(), group);
        self
    }

    pub fn with_template_read_errors(self, name: &str, errors: Vec<ComputeError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .read_errors
            .insert(name.to_string(), errors.into());
        self
    }

    pub fn with_patch_errors(self, errors: Vec<ComputeError>) -> Self {
        self.state.lock().unwrap().patch_errors = errors.into();
        self
    }

    pub fn with_delete_error(self, name: &str, error: ComputeError) -> Self {
        self.state
            .lock()
            .unwrap()
            .delete_errors
            .insert(name.to_string(), error);
        self
    }

    pub fn with_list_error(self, error: ComputeError) -> Self {
        self.state.lock().unwrap().list_error = Some(error);
        self
    }

    pub fn inserted(&self) -> Vec<InstanceTemplate> {
        self.state.lock().unwrap().inserted.clone()
    }

    pub fn patched(&self) -> Vec<InstanceGroupManager> {
        self.state.lock().unwrap().patched.clone()
    }

    pub fn patch_calls(&self) -> u32 {
        self.state.lock().unwrap().patch_calls
    }

    pub fn template_reads(&self) -> u32 {
        self.state.lock().unwrap().template_reads
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut deleted = self.state.lock().unwrap().deleted.clone();
        deleted.sort();
        deleted
    }
}

pub(crate) fn template(name: &str) -> InstanceTemplate {
    InstanceTemplate {
        name: name.to_string(),
        self_link: Some(format!(
            "https://compute.googleapis.com/compute/v1/projects/p/global/instanceTemplates/{}",
            name
        )),
        ..Default::default()
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_template(&self, _project: &str, name: &str) -> Result<InstanceTemplate, ComputeError> {
        let mut state = self.state.lock().unwrap();
        state.template_reads += 1;

        if let Some(e) = state.read_errors.get_mut(name).and_then(VecDeque::pop_front) {
            return Err(e);
        }

        state
            .templates
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(name.to_string()))
    }

    async fn insert_template(
        &self,
        project: &str,
        template: &InstanceTemplate,
    ) -> Result<Operation, ComputeError> {
        let mut state = self.state.lock().unwrap();
        if state.templates.iter().any(|t| t.name == template.name) {
            return Err(ComputeError::AlreadyExists(template.name.clone()));
        }

        let link = format!(
            "https://compute.googleapis.com/compute/v1/projects/{}/global/instanceTemplates/{}",
            project, template.name
        );
        let mut stored = template.clone();
        stored.self_link = Some(link.clone());
        stored.creation_timestamp = Some(chrono::Utc::now().to_rfc3339());
        state.templates.push(stored);
        state.inserted.push(template.clone());

        Ok(Operation {
            name: format!("operation-insert-{}", template.name),
            target_link: Some(link),
            ..Default::default()
        })
    }

    async fn list_templates(&self, _project: &str) -> Result<Vec<InstanceTemplate>, ComputeError> {
        let state = self.state.lock().unwrap();
        match &state.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.templates.clone()),
        }
    }

    async fn delete_template(&self, _project: &str, name: &str) -> Result<Operation, ComputeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.delete_errors.get(name) {
            return Err(e.clone());
        }
        state.templates.retain(|t| t.name != name);
        state.deleted.push(name.to_string());
        Ok(Operation::default())
    }

    async fn get_instance_group(
        &self,
        _project: &str,
        _region: &str,
        name: &str,
    ) -> Result<InstanceGroupManager, ComputeError> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(name.to_string()))
    }

    async fn patch_instance_group(
        &self,
        _project: &str,
        _region: &str,
        name: &str,
        manager: &InstanceGroupManager,
    ) -> Result<Operation, ComputeError> {
        let mut state = self.state.lock().unwrap();
        state.patch_calls += 1;
        if let Some(e) = state.patch_errors.pop_front() {
            return Err(e);
        }
        state.patched.push(manager.clone());
        state.groups.insert(name.to_string(), manager.clone());
        Ok(Operation::default())
    }
}
