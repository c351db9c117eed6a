//! Drift detection for converged endpoints

use tracing::debug;

use super::clients::{config_map_value, ingress_address, KubeClient};
use super::status::content_hash;
use crate::crd::{CloudEndpointSpec, CloudEndpointStatus};

/// Decide whether a converged endpoint must be reconverged
///
/// Only IDLE endpoints are checked; anything in flight finishes first.
/// Drift is any of:
/// - the spec signature differs from the last applied one
/// - the target ingress now reports a different load-balancer address
/// - the ConfigMap document changed or can no longer be read
pub async fn detect_drift(
    spec: &CloudEndpointSpec,
    namespace: &str,
    status: &CloudEndpointStatus,
    signature: &str,
    kube: &dyn KubeClient,
) -> bool {
    if !status.state_current.is_idle() {
        return false;
    }

    if status.last_applied_sig.as_deref() != Some(signature) {
        debug!("changed because spec signature differs");
        return true;
    }

    if let Some(ingress_ref) = spec.ingress_ref() {
        let ingress_namespace = if ingress_ref.namespace.is_empty() {
            namespace
        } else {
            &ingress_ref.namespace
        };
        // A failed lookup says nothing about the address
        if let Ok(Some(ingress)) = kube.get_ingress(ingress_namespace, &ingress_ref.name).await {
            if let Some(address) = ingress_address(&ingress) {
                if status.ingress_ip.as_deref() != Some(address.as_str()) {
                    debug!(%address, "changed because ingress address differs");
                    return true;
                }
            }
        }
    }

    if let Some(reference) = spec.config_map_ref() {
        match config_map_value(kube, namespace, reference).await {
            Ok(Some(document)) => {
                if status.config_map_hash.as_deref() != Some(content_hash(&document).as_str()) {
                    debug!(config_map = %reference.name, "changed because config map document differs");
                    return true;
                }
            }
            Ok(None) | Err(_) => {
                debug!(config_map = %reference.name, "changed because config map document is unreadable");
                return true;
            }
        }
    }

    false
}
