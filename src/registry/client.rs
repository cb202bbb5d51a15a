// file: src/registry/client.rs
// version: 1.2.0
// guid: 3e9d14c7-50ab-4f82-b6d1-8a27e90c45f3

//! Harbor v2 API client
//!
//! Only the three calls the sync engine needs: does a project exist,
//! create one, and is a tagged artifact already pushed. Auth failures get
//! their own error variant so the caller can tell bad credentials apart
//! from a broken registry.

use crate::config::RegistryConfig;
use crate::error::InstallError;
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Whether a tagged artifact is already present in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Present,
    Missing,
}

/// The registry surface the sync engine depends on
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn project_exists(&self, project: &str) -> Result<bool>;
    async fn create_project(&self, project: &str) -> Result<()>;
    async fn artifact_state(&self, project: &str, repository: &str, tag: &str)
        -> Result<ArtifactState>;
}

pub struct HarborClient {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
}

impl HarborClient {
    pub fn new(registry: &RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("k8s-airgap-installer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: format!("http://{}/api/v2.0", registry.host()),
            username: registry.username.clone(),
            password: registry.password.clone(),
        })
    }

    fn auth_failed(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
    }

    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("{}: {}", status, body)
    }
}

#[async_trait]
impl RegistryApi for HarborClient {
    async fn project_exists(&self, project: &str) -> Result<bool> {
        let url = format!("{}/projects/{}", self.base, project);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else if Self::auth_failed(status) {
            Err(InstallError::RegistryAuth(format!(
                "rejected while looking up project {}",
                project
            )))
        } else {
            Err(InstallError::registry(format!(
                "project lookup for {} failed: {}",
                project,
                Self::error_body(response).await
            )))
        }
    }

    async fn create_project(&self, project: &str) -> Result<()> {
        let url = format!("{}/projects", self.base);
        let body = serde_json::json!({
            "project_name": project,
            "public": true,
        });
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        // Another run may have created it in between; that is fine.
        if status.is_success() || status == StatusCode::CONFLICT {
            Ok(())
        } else if Self::auth_failed(status) {
            Err(InstallError::RegistryAuth(format!(
                "rejected while creating project {}",
                project
            )))
        } else {
            Err(InstallError::registry(format!(
                "creating project {} failed: {}",
                project,
                Self::error_body(response).await
            )))
        }
    }

    async fn artifact_state(
        &self,
        project: &str,
        repository: &str,
        tag: &str,
    ) -> Result<ArtifactState> {
        // Slashes inside a repository name must be double-encoded for Harbor
        let repo = repository.replace('/', "%252F");
        let url = format!(
            "{}/projects/{}/repositories/{}/artifacts/{}",
            self.base, project, repo, tag
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(ArtifactState::Present)
        } else if status == StatusCode::NOT_FOUND {
            Ok(ArtifactState::Missing)
        } else if Self::auth_failed(status) {
            Err(InstallError::RegistryAuth(format!(
                "rejected while checking {}/{}:{}",
                project, repository, tag
            )))
        } else {
            Err(InstallError::registry(format!(
                "artifact check for {}/{}:{} failed: {}",
                project,
                repository,
                tag,
                Self::error_body(response).await
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_base_url() {
        let registry = RegistryConfig {
            endpoint: "registry.local".to_string(),
            ip: "10.0.0.50".to_string(),
            port: 8443,
            username: "admin".to_string(),
            password: "Harbor12345".to_string(),
        };
        let client = HarborClient::new(&registry).unwrap();
        assert_eq!(client.base, "http://registry.local:8443/api/v2.0");
    }

    #[test]
    fn test_auth_failed_statuses() {
        assert!(HarborClient::auth_failed(StatusCode::UNAUTHORIZED));
        assert!(HarborClient::auth_failed(StatusCode::FORBIDDEN));
        assert!(!HarborClient::auth_failed(StatusCode::NOT_FOUND));
        assert!(!HarborClient::auth_failed(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
