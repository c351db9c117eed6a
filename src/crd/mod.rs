//! Custom Resource Definitions for the Cloud Endpoints controller

mod endpoint;
mod types;

pub use endpoint::{CloudEndpoint, CloudEndpointSpec, CloudEndpointStatus};
pub use types::{ConfigMapKeyRef, EndpointState, RolloutRef, TargetIngressSpec};
