//! Compute control-plane client
//!
//! [`ComputeApi`] is the seam the activities are written against. [`GceClient`]
//! implements it over the Compute Engine REST API; tests use an in-memory fake.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gce_rollout_models::compute::{
    InstanceGroupManager, InstanceTemplate, InstanceTemplateList, Operation,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::{Credential, TokenSource};

const COMPUTE_V1_URL: &str = "https://compute.googleapis.com/compute/v1";
const COMPUTE_BETA_URL: &str = "https://compute.googleapis.com/compute/beta";

/// Errors returned by the compute control plane
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComputeError {
    /// The resource exists but is not yet usable; retry later
    #[error("resource not ready: {0}")]
    NotReady(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Deletion refused because another resource still references it
    #[error("resource in use by another resource: {0}")]
    InUseByAnotherResource(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("compute API error {code} ({reason}): {message}")]
    Api { code: u16, reason: String, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl ComputeError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ComputeError::NotReady(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ComputeError::NotFound(_))
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, ComputeError::InUseByAnotherResource(_))
    }

    /// Classify an error response body from the API
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let (message, reasons) = match &parsed {
            Some(b) => (
                b.error.message.clone(),
                b.error.errors.iter().map(|e| e.reason.as_str()).collect::<Vec<_>>(),
            ),
            None => (body.trim().to_string(), Vec::new()),
        };

        if reasons.contains(&"resourceNotReady") {
            ComputeError::NotReady(message)
        } else if reasons.contains(&"alreadyExists") {
            ComputeError::AlreadyExists(message)
        } else if reasons.contains(&"resourceInUseByAnotherResource") {
            ComputeError::InUseByAnotherResource(message)
        } else if reasons.contains(&"notFound") || status == StatusCode::NOT_FOUND {
            ComputeError::NotFound(message)
        } else {
            ComputeError::Api {
                code: status.as_u16(),
                reason: reasons.first().copied().unwrap_or_default().to_string(),
                message,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

/// Operations on machine templates and regional instance groups
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_template(&self, project: &str, name: &str) -> Result<InstanceTemplate, ComputeError>;

    async fn insert_template(
        &self,
        project: &str,
        template: &InstanceTemplate,
    ) -> Result<Operation, ComputeError>;

    async fn list_templates(&self, project: &str) -> Result<Vec<InstanceTemplate>, ComputeError>;

    async fn delete_template(&self, project: &str, name: &str) -> Result<Operation, ComputeError>;

    async fn get_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<InstanceGroupManager, ComputeError>;

    async fn patch_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
        manager: &InstanceGroupManager,
    ) -> Result<Operation, ComputeError>;
}

/// Builds an authenticated client for a credential
pub type ClientFactory =
    Arc<dyn Fn(&Credential) -> Result<Arc<dyn ComputeApi>> + Send + Sync>;

/// Factory producing [`GceClient`]s
pub fn gce_client_factory() -> ClientFactory {
    Arc::new(|credential: &Credential| -> Result<Arc<dyn ComputeApi>> {
        let client = GceClient::new(credential.clone())?;
        Ok(Arc::new(client))
    })
}

/// Compute Engine REST client
///
/// Templates go through the v1 API; regional instance group managers go
/// through beta, which exposes the full update policy.
pub struct GceClient {
    http: reqwest::Client,
    tokens: TokenSource,
    v1_url: String,
    beta_url: String,
}

impl GceClient {
    pub fn new(credential: Credential) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gce-rollout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create compute HTTP client")?;

        Ok(Self {
            tokens: TokenSource::new(credential, http.clone()),
            http,
            v1_url: COMPUTE_V1_URL.to_string(),
            beta_url: COMPUTE_BETA_URL.to_string(),
        })
    }

    async fn request(&self, method: Method, url: String) -> Result<RequestBuilder, ComputeError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| ComputeError::Auth(e.to_string()))?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ComputeError> {
        let response = request
            .send()
            .await
            .map_err(|e| ComputeError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ComputeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ComputeError::from_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| ComputeError::Decode(e.to_string()))
    }

    fn templates_url(&self, project: &str) -> String {
        format!("{}/projects/{}/global/instanceTemplates", self.v1_url, project)
    }

    fn instance_group_url(&self, project: &str, region: &str, name: &str) -> String {
        format!(
            "{}/projects/{}/regions/{}/instanceGroupManagers/{}",
            self.beta_url, project, region, name
        )
    }
}

#[async_trait]
impl ComputeApi for GceClient {
    async fn get_template(&self, project: &str, name: &str) -> Result<InstanceTemplate, ComputeError> {
        let url = format!("{}/{}", self.templates_url(project), name);
        let request = self.request(Method::GET, url).await?;
        self.send(request).await
    }

    async fn insert_template(
        &self,
        project: &str,
        template: &InstanceTemplate,
    ) -> Result<Operation, ComputeError> {
        let request = self
            .request(Method::POST, self.templates_url(project))
            .await?
            .json(template);
        self.send(request).await
    }

    async fn list_templates(&self, project: &str) -> Result<Vec<InstanceTemplate>, ComputeError> {
        let mut templates = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.request(Method::GET, self.templates_url(project)).await?;
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: InstanceTemplateList = self.send(request).await?;
            templates.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(templates),
            }
        }
    }

    async fn delete_template(&self, project: &str, name: &str) -> Result<Operation, ComputeError> {
        let url = format!("{}/{}", self.templates_url(project), name);
        let request = self.request(Method::DELETE, url).await?;
        self.send(request).await
    }

    async fn get_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<InstanceGroupManager, ComputeError> {
        let url = self.instance_group_url(project, region, name);
        let request = self.request(Method::GET, url).await?;
        self.send(request).await
    }

    async fn patch_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
        manager: &InstanceGroupManager,
    ) -> Result<Operation, ComputeError> {
        let url = self.instance_group_url(project, region, name);
        let request = self.request(Method::PATCH, url).await?.json(manager);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_body(code: u16, reason: &str) -> String {
        format!(
            r#"{{"error": {{"code": {}, "message": "boom", "errors": [{{"reason": "{}", "message": "boom"}}]}}}}"#,
            code, reason
        )
    }

    #[test]
    fn test_classifies_not_ready() {
        let err = ComputeError::from_response(StatusCode::BAD_REQUEST, &error_body(400, "resourceNotReady"));
        assert_eq!(err, ComputeError::NotReady("boom".to_string()));
        assert!(err.is_not_ready());
    }

    #[test]
    fn test_classifies_already_exists_and_in_use() {
        let err = ComputeError::from_response(StatusCode::CONFLICT, &error_body(409, "alreadyExists"));
        assert!(matches!(err, ComputeError::AlreadyExists(_)));

        let err = ComputeError::from_response(
            StatusCode::BAD_REQUEST,
            &error_body(400, "resourceInUseByAnotherResource"),
        );
        assert!(err.is_in_use());
    }

    #[test]
    fn test_classifies_not_found_by_status() {
        let err = ComputeError::from_response(StatusCode::NOT_FOUND, "not json");
        assert_eq!(err, ComputeError::NotFound("not json".to_string()));
    }

    #[test]
    fn test_other_errors_keep_code_and_reason() {
        let err = ComputeError::from_response(StatusCode::FORBIDDEN, &error_body(403, "forbidden"));
        assert_eq!(
            err,
            ComputeError::Api {
                code: 403,
                reason: "forbidden".to_string(),
                message: "boom".to_string(),
            }
        );
    }
}
