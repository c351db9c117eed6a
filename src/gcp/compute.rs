//! Compute Engine v1 backend service lookups

use async_trait::async_trait;

use super::{BackendService, BackendServices, GoogleApi};
use crate::Error;

const BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Compute client backed by the public REST API
#[derive(Clone)]
pub struct ComputeClient {
    api: GoogleApi,
}

impl ComputeClient {
    /// Create a client over an authenticated transport
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

fn backend_service_url(project: &str, name: &str) -> String {
    format!("{BASE_URL}/projects/{project}/global/backendServices/{name}")
}

#[async_trait]
impl BackendServices for ComputeClient {
    async fn get_backend_service(
        &self,
        project: &str,
        name: &str,
    ) -> Result<BackendService, Error> {
        self.api.get_json(&backend_service_url(project, name)).await
    }
}
