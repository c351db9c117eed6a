//! Service Management v1 REST client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ConfigFile, GoogleApi, ManagedService, Operation, Rollout, ServiceManagement};
use crate::Error;

const BASE_URL: &str = "https://servicemanagement.googleapis.com/v1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRolloutsResponse {
    #[serde(default)]
    rollouts: Vec<Rollout>,
}

/// Service Management client backed by the public REST API
#[derive(Clone)]
pub struct ServiceManagementClient {
    api: GoogleApi,
    base_url: String,
}

impl ServiceManagementClient {
    /// Create a client over an authenticated transport
    pub fn new(api: GoogleApi) -> Self {
        Self {
            api,
            base_url: BASE_URL.to_string(),
        }
    }

    fn service_url(&self, service: &str) -> String {
        format!("{}/services/{}", self.base_url, service)
    }
}

#[async_trait]
impl ServiceManagement for ServiceManagementClient {
    async fn get_service(&self, name: &str) -> Result<Option<ManagedService>, Error> {
        match self.api.get_json(&self.service_url(name)).await {
            Ok(service) => Ok(Some(service)),
            // The API answers 403 for services the caller cannot see, which
            // includes ones that were never created.
            Err(e) if e.is_absent() => {
                debug!(service = %name, error = %e, "managed service absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_service(&self, project: &str, name: &str) -> Result<Operation, Error> {
        let body = ManagedService {
            service_name: name.to_string(),
            producer_project_id: project.to_string(),
        };
        self.api
            .post_json(&format!("{}/services", self.base_url), &body)
            .await
    }

    async fn submit_config(
        &self,
        service: &str,
        files: Vec<ConfigFile>,
    ) -> Result<Operation, Error> {
        let body = serde_json::json!({
            "configSource": { "files": files },
            "validateOnly": false,
        });
        self.api
            .post_json(
                &format!("{}/configs:submit", self.service_url(service)),
                &body,
            )
            .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, Error> {
        self.api
            .get_json(&format!("{}/{}", self.base_url, name))
            .await
    }

    async fn list_rollouts(&self, service: &str) -> Result<Vec<Rollout>, Error> {
        let list: ListRolloutsResponse = self
            .api
            .get_json(&format!("{}/rollouts", self.service_url(service)))
            .await?;
        Ok(list.rollouts)
    }

    async fn create_rollout(&self, service: &str, rollout: &Rollout) -> Result<Operation, Error> {
        self.api
            .post_json(&format!("{}/rollouts", self.service_url(service)), rollout)
            .await
    }
}
