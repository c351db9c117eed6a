//! Google Cloud API clients
//!
//! The controller talks to two Google APIs: Service Management, which owns
//! managed services, their configs and rollouts, and Compute, which it reads
//! backend service ids from. Both sit behind traits so the reconciler can be
//! driven without network access.

pub mod compute;
pub mod metadata;
mod rest;
pub mod service_management;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

pub use compute::ComputeClient;
pub use metadata::GcpProject;
pub use rest::GoogleApi;
pub use service_management::ServiceManagementClient;

use crate::Error;

/// OAuth scope used for every Google API call
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// A Service Management managed service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedService {
    /// Fully qualified service name
    #[serde(default)]
    pub service_name: String,
    /// Project that produces the service
    #[serde(default)]
    pub producer_project_id: String,
}

/// Error attached to a finished long-running operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct OperationError {
    /// gRPC status code
    #[serde(default)]
    pub code: i32,
    /// Developer-facing message
    #[serde(default)]
    pub message: String,
}

/// A long-running backend operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Operation {
    /// Operation name, used to poll it
    #[serde(default)]
    pub name: String,
    /// Whether the operation has finished
    #[serde(default)]
    pub done: bool,
    /// Result payload when finished successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Failure when finished unsuccessfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl Operation {
    /// Id of the service config produced by a finished submit operation
    pub fn submitted_config_id(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .get("serviceConfig")?
            .get("id")?
            .as_str()
    }
}

/// Traffic split of a rollout, keyed by service config id
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TrafficPercentStrategy {
    /// Percentage of traffic per config id
    #[serde(default)]
    pub percentages: BTreeMap<String, f64>,
}

/// A service rollout
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    /// Rollout id assigned by the backend
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rollout_id: String,
    /// Service the rollout belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    /// Rollout status as reported by the backend
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Traffic split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_percent_strategy: Option<TrafficPercentStrategy>,
}

impl Rollout {
    /// A rollout sending all traffic to one config
    pub fn full(service_name: &str, config_id: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            traffic_percent_strategy: Some(TrafficPercentStrategy {
                percentages: BTreeMap::from([(config_id.to_string(), 100.0)]),
            }),
            ..Default::default()
        }
    }

    /// Returns true when this rollout sends all traffic to `config_id`
    pub fn serves_fully(&self, config_id: &str) -> bool {
        self.traffic_percent_strategy
            .as_ref()
            .and_then(|s| s.percentages.get(config_id))
            .is_some_and(|p| (p - 100.0).abs() < f64::EPSILON)
    }
}

/// A source file submitted as part of a service config
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// File name reported to the backend
    pub file_path: String,
    /// Base64-encoded file contents
    pub file_contents: String,
    /// Backend file type
    pub file_type: String,
}

impl ConfigFile {
    /// An OpenAPI YAML document named `openapi.yaml`
    pub fn openapi_yaml(contents: &str) -> Self {
        use base64::Engine;

        Self {
            file_path: "openapi.yaml".to_string(),
            file_contents: base64::engine::general_purpose::STANDARD.encode(contents),
            file_type: "OPEN_API_YAML".to_string(),
        }
    }
}

/// A Compute Engine global backend service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendService {
    /// Numeric id, serialized as a string by the API
    #[serde(default)]
    pub id: String,
    /// Backend service name
    #[serde(default)]
    pub name: String,
}

/// Trait abstracting the Service Management API
///
/// Absence of a service is reported as `Ok(None)`; every other failure is an
/// error so callers never mistake a failed lookup for a missing service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceManagement: Send + Sync {
    /// Look up a managed service by name
    async fn get_service(&self, name: &str) -> Result<Option<ManagedService>, Error>;

    /// Request creation of a managed service
    async fn create_service(&self, project: &str, name: &str) -> Result<Operation, Error>;

    /// Submit a service config built from the given files
    async fn submit_config(&self, service: &str, files: Vec<ConfigFile>)
        -> Result<Operation, Error>;

    /// Fetch a long-running operation by name
    async fn get_operation(&self, name: &str) -> Result<Operation, Error>;

    /// List rollouts of a service, most recent first
    async fn list_rollouts(&self, service: &str) -> Result<Vec<Rollout>, Error>;

    /// Start a rollout
    async fn create_rollout(&self, service: &str, rollout: &Rollout) -> Result<Operation, Error>;
}

/// Trait abstracting Compute Engine backend service lookups
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendServices: Send + Sync {
    /// Get a global backend service by name
    async fn get_backend_service(&self, project: &str, name: &str)
        -> Result<BackendService, Error>;
}
