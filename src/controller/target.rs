//! Target resolution from an ingress and its backing services
//!
//! The endpoint target is the ingress load-balancer address. When services
//! behind the ingress need JWT validation, each one is mapped through its
//! node port to the GCE backend service the ingress controller created, and
//! that backend's id becomes a trusted audience.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::clients::{ingress_address, KubeClient};
use crate::crd::TargetIngressSpec;
use crate::gcp::{BackendServices, GcpProject};
use crate::Error;

/// Annotation where the GCE ingress controller lists its backend services
pub const BACKENDS_ANNOTATION: &str = "ingress.kubernetes.io/backends";

/// A resolved target address and the audiences its backends accept
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Load-balancer IP or hostname
    pub address: String,
    /// One audience per backend found for the requested services
    pub audiences: Vec<String>,
}

/// Outcome of target resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The ingress or its load balancer does not exist yet
    NotReady,
    /// Target resolved
    Ready(ResolvedTarget),
}

/// Resolve the target of an ingress-backed endpoint
///
/// `namespace` is used when the reference names none. Missing or unready
/// ingresses are `NotReady`; services that cannot be mapped to a backend are
/// errors, since waiting will not fix them.
pub async fn resolve_target(
    ingress_ref: &TargetIngressSpec,
    namespace: &str,
    kube: &dyn KubeClient,
    backends: &dyn BackendServices,
    project: &GcpProject,
) -> Result<Resolution, Error> {
    let namespace = if ingress_ref.namespace.is_empty() {
        namespace
    } else {
        &ingress_ref.namespace
    };

    let ingress = match kube.get_ingress(namespace, &ingress_ref.name).await {
        Ok(Some(ingress)) => ingress,
        Ok(None) => {
            info!(ingress = %ingress_ref.name, "waiting for ingress");
            return Ok(Resolution::NotReady);
        }
        Err(e) => {
            info!(ingress = %ingress_ref.name, error = %e, "waiting for ingress");
            return Ok(Resolution::NotReady);
        }
    };

    let Some(address) = ingress_address(&ingress) else {
        info!(ingress = %ingress_ref.name, "waiting for load balancer status");
        return Ok(Resolution::NotReady);
    };

    if ingress_ref.jwt_services.is_empty() {
        return Ok(Resolution::Ready(ResolvedTarget {
            address,
            audiences: Vec::new(),
        }));
    }

    let backend_ids = ingress_backends(ingress.metadata.annotations.as_ref());
    let mut audiences = Vec::new();

    for service_name in &ingress_ref.jwt_services {
        let node_port = service_node_port(kube, namespace, service_name).await?;

        let mut found = false;
        for backend_name in backend_ids
            .iter()
            .filter(|id| matches_node_port(id, node_port))
        {
            match backends
                .get_backend_service(&project.id, backend_name)
                .await
            {
                Ok(backend) => {
                    let audience = project.backend_audience(&backend.id);
                    debug!(service = %service_name, %audience, "resolved JWT audience");
                    audiences.push(audience);
                    found = true;
                }
                Err(e) => {
                    warn!(backend = %backend_name, error = %e, "backend service lookup failed");
                }
            }
        }

        if !found {
            return Err(Error::misconfigured(format!(
                "backend not found or not ready for service {service_name}, node port {node_port}"
            )));
        }
    }

    Ok(Resolution::Ready(ResolvedTarget { address, audiences }))
}

/// Node port of the first port of a NodePort service
async fn service_node_port(
    kube: &dyn KubeClient,
    namespace: &str,
    name: &str,
) -> Result<i32, Error> {
    let service = kube
        .get_service(namespace, name)
        .await?
        .ok_or_else(|| Error::misconfigured(format!("service {namespace}/{name} not found")))?;

    let spec = service
        .spec
        .ok_or_else(|| Error::misconfigured(format!("service {name} has no spec")))?;

    if spec.type_.as_deref() != Some("NodePort") {
        return Err(Error::misconfigured(format!("service {name} is not type NodePort")));
    }

    spec.ports
        .unwrap_or_default()
        .first()
        .and_then(|p| p.node_port)
        .ok_or_else(|| Error::misconfigured(format!("service {name} declares no node port")))
}

/// Sorted backend ids from the ingress backends annotation
///
/// A malformed annotation is logged and treated as empty.
pub fn ingress_backends(annotations: Option<&BTreeMap<String, String>>) -> Vec<String> {
    let Some(raw) = annotations.and_then(|a| a.get(BACKENDS_ANNOTATION)) else {
        return Vec::new();
    };

    match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(raw) {
        // BTreeMap keys are already sorted
        Ok(backends) => backends.into_keys().collect(),
        Err(e) => {
            warn!(error = %e, "failed to parse {BACKENDS_ANNOTATION} annotation");
            Vec::new()
        }
    }
}

/// True when `backend_id` names the backend for `node_port`
///
/// `k8s-be-3008` must not match `k8s-be-30080--abc`.
pub fn matches_node_port(backend_id: &str, node_port: i32) -> bool {
    let token = format!("k8s-be-{node_port}");
    backend_id.match_indices(&token).any(|(at, _)| {
        !backend_id[at + token.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::clients::{fixtures, MockKubeClient};
    use crate::gcp::{BackendService, MockBackendServices};

    const BACKENDS: &str =
        r#"{"k8s-be-30080--abc":"HEALTHY","k8s-be-31000--abc":"HEALTHY","k8s-be-300801--abc":"UNKNOWN"}"#;

    fn project() -> GcpProject {
        GcpProject::new("my-project", "1234")
    }

    fn ingress_ref(services: &[&str]) -> TargetIngressSpec {
        TargetIngressSpec {
            name: "web".to_string(),
            namespace: String::new(),
            jwt_services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn kube_with_ingress(ip: Option<&'static str>) -> MockKubeClient {
        let mut kube = MockKubeClient::new();
        kube.expect_get_ingress()
            .returning(move |_, _| Ok(Some(fixtures::ingress(ip, Some(BACKENDS)))));
        kube
    }

    #[test]
    fn node_port_token_must_end_at_digit_boundary() {
        assert!(matches_node_port("k8s-be-30080--abc", 30080));
        assert!(matches_node_port("k8s1-abc-k8s-be-30080", 30080));
        assert!(!matches_node_port("k8s-be-300801--abc", 30080));
        assert!(!matches_node_port("k8s-be-3008--abc", 30080));
    }

    #[test]
    fn backends_annotation_is_sorted_and_tolerant() {
        let annotations = BTreeMap::from([(
            BACKENDS_ANNOTATION.to_string(),
            r#"{"k8s-be-2--x":"HEALTHY","k8s-be-1--x":"HEALTHY"}"#.to_string(),
        )]);
        assert_eq!(
            ingress_backends(Some(&annotations)),
            vec!["k8s-be-1--x".to_string(), "k8s-be-2--x".to_string()]
        );

        let broken = BTreeMap::from([(BACKENDS_ANNOTATION.to_string(), "not json".to_string())]);
        assert!(ingress_backends(Some(&broken)).is_empty());
        assert!(ingress_backends(None).is_empty());
    }

    #[tokio::test]
    async fn missing_ingress_is_not_ready() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_ingress().returning(|_, _| Ok(None));
        let backends = MockBackendServices::new();

        let resolution = resolve_target(&ingress_ref(&[]), "default", &kube, &backends, &project())
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::NotReady);
    }

    #[tokio::test]
    async fn ingress_without_address_is_not_ready() {
        let kube = kube_with_ingress(None);
        let backends = MockBackendServices::new();

        let resolution = resolve_target(&ingress_ref(&[]), "default", &kube, &backends, &project())
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::NotReady);
    }

    #[tokio::test]
    async fn ingress_namespace_defaults_to_resource_namespace() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_ingress()
            .withf(|ns, name| ns == "team-a" && name == "web")
            .returning(|_, _| Ok(Some(fixtures::ingress(Some("35.1.2.3"), None))));
        let backends = MockBackendServices::new();

        let resolution = resolve_target(&ingress_ref(&[]), "team-a", &kube, &backends, &project())
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Ready(ResolvedTarget {
                address: "35.1.2.3".to_string(),
                audiences: vec![],
            })
        );
    }

    /// Story: a JWT service maps through its node port to a backend audience
    #[tokio::test]
    async fn story_jwt_service_resolves_to_backend_audience() {
        let mut kube = kube_with_ingress(Some("35.1.2.3"));
        kube.expect_get_service()
            .withf(|_, name| name == "frontend")
            .returning(|_, _| Ok(Some(fixtures::service("NodePort", Some(30080)))));

        let mut backends = MockBackendServices::new();
        backends
            .expect_get_backend_service()
            .withf(|project, name| project == "my-project" && name == "k8s-be-30080--abc")
            .times(1)
            .returning(|_, name| {
                Ok(BackendService {
                    id: "555".to_string(),
                    name: name.to_string(),
                })
            });

        let resolution = resolve_target(
            &ingress_ref(&["frontend"]),
            "default",
            &kube,
            &backends,
            &project(),
        )
        .await
        .unwrap();

        assert_eq!(
            resolution,
            Resolution::Ready(ResolvedTarget {
                address: "35.1.2.3".to_string(),
                audiences: vec!["/projects/1234/global/backendServices/555".to_string()],
            })
        );
    }

    /// Story: no backend serves the service's node port, which needs a human
    #[tokio::test]
    async fn story_unmatched_node_port_is_a_hard_failure() {
        let mut kube = kube_with_ingress(Some("35.1.2.3"));
        kube.expect_get_service()
            .returning(|_, _| Ok(Some(fixtures::service("NodePort", Some(32000)))));
        let backends = MockBackendServices::new();

        let err = resolve_target(
            &ingress_ref(&["frontend"]),
            "default",
            &kube,
            &backends,
            &project(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
        assert!(err.to_string().contains("32000"));
    }

    #[tokio::test]
    async fn failed_backend_lookup_skips_candidate() {
        let mut kube = kube_with_ingress(Some("35.1.2.3"));
        kube.expect_get_service()
            .returning(|_, _| Ok(Some(fixtures::service("NodePort", Some(30080)))));
        let mut backends = MockBackendServices::new();
        backends
            .expect_get_backend_service()
            .returning(|_, _| Err(Error::google("compute", Some(404), "not found")));

        let err = resolve_target(
            &ingress_ref(&["frontend"]),
            "default",
            &kube,
            &backends,
            &project(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[tokio::test]
    async fn cluster_ip_service_is_rejected() {
        let mut kube = kube_with_ingress(Some("35.1.2.3"));
        kube.expect_get_service()
            .returning(|_, _| Ok(Some(fixtures::service("ClusterIP", None))));
        let backends = MockBackendServices::new();

        let err = resolve_target(
            &ingress_ref(&["frontend"]),
            "default",
            &kube,
            &backends,
            &project(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not type NodePort"));
    }

    #[tokio::test]
    async fn missing_service_is_rejected() {
        let mut kube = kube_with_ingress(Some("35.1.2.3"));
        kube.expect_get_service().returning(|_, _| Ok(None));
        let backends = MockBackendServices::new();

        let err = resolve_target(
            &ingress_ref(&["frontend"]),
            "default",
            &kube,
            &backends,
            &project(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }
}
