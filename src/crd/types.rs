//! Supporting types for the CloudEndpoint CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Convergence state of a CloudEndpoint
///
/// Strict cycle: Idle -> CreatePending -> SubmitPending -> RolloutPending -> Idle.
/// The wire names match the status written by earlier controller releases.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EndpointState {
    /// Converged, only drift detection runs
    #[default]
    #[serde(rename = "IDLE")]
    Idle,
    /// Managed service requested, waiting to submit the API document
    #[serde(rename = "ENDPOINT_CREATE_PENDING")]
    CreatePending,
    /// Service config submitted, waiting for the submit operation
    #[serde(rename = "ENDPOINT_SUBMIT_PENDING")]
    SubmitPending,
    /// Rollout requested, waiting for the rollout operation
    #[serde(rename = "ENDPOINT_ROLLOUT_PENDING")]
    RolloutPending,
}

impl EndpointState {
    /// Returns true when the resource is at rest
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::CreatePending => write!(f, "ENDPOINT_CREATE_PENDING"),
            Self::SubmitPending => write!(f, "ENDPOINT_SUBMIT_PENDING"),
            Self::RolloutPending => write!(f, "ENDPOINT_ROLLOUT_PENDING"),
        }
    }
}

/// Ingress whose load balancer address becomes the endpoint target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetIngressSpec {
    /// Ingress name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Ingress namespace; the CloudEndpoint's namespace when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// NodePort services behind the ingress whose backends must validate JWTs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jwt_services: Vec<String>,
}

impl TargetIngressSpec {
    /// Returns true when an ingress is referenced
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Reference to a ConfigMap key holding the API document
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ConfigMapKeyRef {
    /// ConfigMap name
    #[serde(default)]
    pub name: String,

    /// Key within the ConfigMap data
    #[serde(default)]
    pub key: String,
}

impl ConfigMapKeyRef {
    /// Returns true when both name and key are given
    pub fn is_set(&self) -> bool {
        !self.name.is_empty() && !self.key.is_empty()
    }
}

/// Marker written in place of an operation name when nothing needs polling
pub const ROLLOUT_ALREADY_ACTIVE: &str = "NA";

/// Recorded rollout for the active service config
///
/// `operation: None` means the latest rollout already serves the config and
/// there is nothing to poll. On the wire this is a plain string: the rollout
/// operation name, or `"NA"`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "RolloutWire", into = "String")]
pub struct RolloutRef {
    /// Name of the rollout operation to poll
    pub operation: Option<String>,
}

impl RolloutRef {
    /// A rollout operation that must be polled to completion
    pub fn pending(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
        }
    }

    /// The config is already fully rolled out
    pub fn already_active() -> Self {
        Self { operation: None }
    }
}

impl From<RolloutRef> for String {
    fn from(rollout: RolloutRef) -> Self {
        rollout
            .operation
            .unwrap_or_else(|| ROLLOUT_ALREADY_ACTIVE.to_string())
    }
}

/// Accepted encodings of `serviceRollout`
#[derive(Deserialize)]
#[serde(untagged)]
enum RolloutWire {
    Name(String),
    Object {
        #[serde(default)]
        operation: Option<String>,
    },
}

impl From<RolloutWire> for RolloutRef {
    fn from(wire: RolloutWire) -> Self {
        let operation = match wire {
            RolloutWire::Name(name) => Some(name),
            RolloutWire::Object { operation } => operation,
        };
        match operation {
            Some(name) if !name.is_empty() && name != ROLLOUT_ALREADY_ACTIVE => Self::pending(name),
            _ => Self::already_active(),
        }
    }
}

impl JsonSchema for RolloutRef {
    fn schema_name() -> String {
        "RolloutRef".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_uses_controller_wire_names() {
        assert_eq!(
            serde_json::to_string(&EndpointState::CreatePending).unwrap(),
            "\"ENDPOINT_CREATE_PENDING\""
        );
        let state: EndpointState = serde_json::from_str("\"ENDPOINT_ROLLOUT_PENDING\"").unwrap();
        assert_eq!(state, EndpointState::RolloutPending);
        assert_eq!(EndpointState::SubmitPending.to_string(), "ENDPOINT_SUBMIT_PENDING");
        assert!(EndpointState::default().is_idle());
    }

    #[test]
    fn config_map_ref_needs_name_and_key() {
        let mut r = ConfigMapKeyRef::default();
        assert!(!r.is_set());
        r.name = "api".to_string();
        assert!(!r.is_set());
        r.key = "openapi.yaml".to_string();
        assert!(r.is_set());
    }

    #[test]
    fn rollout_is_a_string_on_the_wire() {
        let done = RolloutRef::already_active();
        assert!(done.operation.is_none());
        assert_eq!(serde_json::to_string(&done).unwrap(), "\"NA\"");

        let pending = RolloutRef::pending("operations/rollouts.1");
        assert_eq!(
            serde_json::to_string(&pending).unwrap(),
            "\"operations/rollouts.1\""
        );
    }

    #[test]
    fn rollout_decodes_names_and_marker() {
        let done: RolloutRef = serde_json::from_str("\"NA\"").unwrap();
        assert_eq!(done, RolloutRef::already_active());

        let pending: RolloutRef = serde_json::from_str("\"operations/rollouts.7\"").unwrap();
        assert_eq!(pending, RolloutRef::pending("operations/rollouts.7"));
    }

    #[test]
    fn rollout_decodes_object_form() {
        let done: RolloutRef = serde_json::from_str("{}").unwrap();
        assert_eq!(done, RolloutRef::already_active());

        let pending: RolloutRef =
            serde_json::from_str(r#"{"operation": "operations/rollouts.2"}"#).unwrap();
        assert_eq!(pending, RolloutRef::pending("operations/rollouts.2"));
    }
}
