//! CloudEndpoint reconciliation
//!
//! The reconciler is invoked once per sync hook call, observes the cluster
//! and the backend, and takes at most one step towards the declared state.

mod clients;
mod drift;
mod endpoint;
mod status;
mod target;

pub use clients::{config_map_value, ingress_address, KubeClient, KubeClientImpl};
#[cfg(test)]
pub use clients::MockKubeClient;
pub use drift::detect_drift;
pub use endpoint::{reconcile, Context};
pub use status::{content_hash, project_status, spec_signature};
pub use target::{
    ingress_backends, matches_node_port, resolve_target, Resolution, ResolvedTarget,
    BACKENDS_ANNOTATION,
};
