//! CloudEndpoint Custom Resource Definition
//!
//! A CloudEndpoint declares a Google Cloud Endpoints service: the project that
//! owns it, where traffic goes (a literal address or an Ingress), and the
//! OpenAPI document describing it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ConfigMapKeyRef, EndpointState, RolloutRef, TargetIngressSpec};

/// Specification for a CloudEndpoint
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ctl.isla.solutions",
    version = "v1",
    kind = "CloudEndpoint",
    plural = "cloudendpoints",
    shortname = "cep",
    status = "CloudEndpointStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.stateCurrent"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"Config","type":"string","jsonPath":".status.config"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudEndpointSpec {
    /// Google Cloud project that owns the endpoint service
    #[serde(default)]
    pub project: String,

    /// Literal target address, used when no target ingress is given
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,

    /// Ingress whose load balancer address is the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ingress: Option<TargetIngressSpec>,

    /// Inline OpenAPI document
    #[serde(
        rename = "openAPISpec",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(schema_with = "free_form_object")]
    pub open_api_spec: Option<BTreeMap<String, serde_json::Value>>,

    /// ConfigMap key holding the OpenAPI document
    #[serde(
        rename = "openAPISpecConfigMap",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub open_api_spec_config_map: Option<ConfigMapKeyRef>,
}

/// Schema for a free-form document the API server must store unpruned
fn free_form_object(_: &mut schemars::gen::SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

impl CloudEndpointSpec {
    /// Managed service name for a resource with the given name
    pub fn endpoint_name(&self, resource_name: &str) -> String {
        format!("{}.endpoints.{}.cloud.goog", resource_name, self.project)
    }

    /// The referenced ingress, if one is named
    pub fn ingress_ref(&self) -> Option<&TargetIngressSpec> {
        self.target_ingress.as_ref().filter(|i| i.is_set())
    }

    /// The referenced ConfigMap key, if both name and key are given
    pub fn config_map_ref(&self) -> Option<&ConfigMapKeyRef> {
        self.open_api_spec_config_map.as_ref().filter(|c| c.is_set())
    }
}

/// Status for a CloudEndpoint
///
/// This is the controller's only memory between calls.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudEndpointStatus {
    /// Current convergence state
    #[serde(default)]
    pub state_current: EndpointState,

    /// Signature of the spec last submitted to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_sig: Option<String>,

    /// Managed service name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Active service config id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Pending config submit operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_submit: Option<String>,

    /// Rollout recorded for the active config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_rollout: Option<RolloutRef>,

    /// Target address written into the API document
    #[serde(rename = "ingressIP", default, skip_serializing_if = "Option::is_none")]
    pub ingress_ip: Option<String>,

    /// JWT audiences of the backends behind the target ingress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jwt_audiences: Vec<String>,

    /// Hash of the ConfigMap document last submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_hash: Option<String>,
}

impl CloudEndpointStatus {
    /// Create a new status in the given state
    pub fn with_state(state: EndpointState) -> Self {
        Self {
            state_current: state,
            ..Default::default()
        }
    }

    /// Set the last applied signature and return self for chaining
    pub fn last_applied_sig(mut self, sig: impl Into<String>) -> Self {
        self.last_applied_sig = Some(sig.into());
        self
    }

    /// Set the endpoint name and return self for chaining
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
