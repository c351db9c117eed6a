//! Metacontroller sync hook
//!
//! The generic controller manager POSTs `{parent, children}` to `/` on every
//! resync and persists the `status` of the response. The response never
//! declares children.
//!
//! - `POST /` - reconcile the parent CloudEndpoint
//! - `GET /healthz` - liveness

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::controller::{reconcile, Context};
use crate::crd::{CloudEndpoint, CloudEndpointStatus};

/// Shared state for hook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Reconciler context
    pub ctx: Arc<Context>,
}

impl WebhookState {
    /// Create a new hook state around a reconciler context
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

/// Sync request sent by the controller manager
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// The CloudEndpoint being synced
    pub parent: CloudEndpoint,
    /// Observed children; always ignored
    #[serde(default)]
    pub children: serde_json::Value,
}

/// Sync response returned to the controller manager
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Status to persist on the parent
    pub status: CloudEndpointStatus,
    /// Desired children; always empty
    pub children: Vec<serde_json::Value>,
}

impl SyncResponse {
    fn new(status: CloudEndpointStatus) -> Self {
        Self {
            status,
            children: Vec::new(),
        }
    }
}

/// Create the hook router
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/", any(sync_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK\n"
}

/// Handle one sync call
///
/// A failed reconcile still answers with the computed status so the caller
/// can log it; the 500 tells it not to persist anything.
pub async fn sync_handler(
    State(state): State<Arc<WebhookState>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (StatusCode::BAD_REQUEST, "Unsupported method\n").into_response();
    }

    let request: SyncRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "failed to decode sync request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to decode sync request: {e}\n"),
            )
                .into_response();
        }
    };

    match reconcile(&request.parent, &state.ctx).await {
        Ok(status) => {
            debug!(state = %status.state_current, "sync complete");
            (StatusCode::OK, Json(SyncResponse::new(status))).into_response()
        }
        Err(failure) => {
            error!(error = %failure, "sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncResponse::new(failure.status)),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::controller::MockKubeClient;
    use crate::crd::EndpointState;
    use crate::gcp::{GcpProject, MockBackendServices, MockServiceManagement, Operation};
    use crate::Error;

    fn router(sm: MockServiceManagement) -> Router {
        let ctx = Context::new(
            Arc::new(MockKubeClient::new()),
            Arc::new(sm),
            Arc::new(MockBackendServices::new()),
            GcpProject::new("my-project", "1234"),
        );
        webhook_router(Arc::new(WebhookState::new(Arc::new(ctx))))
    }

    fn sync_body() -> String {
        serde_json::json!({
            "parent": {
                "apiVersion": "ctl.isla.solutions/v1",
                "kind": "CloudEndpoint",
                "metadata": {"name": "petstore", "namespace": "default"},
                "spec": {"project": "my-project", "target": "1.2.3.4"}
            },
            "children": {}
        })
        .to_string()
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let response = router(MockServiceManagement::new())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_post_is_rejected() {
        let response = router(MockServiceManagement::new())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn undecodable_body_is_server_error() {
        let response = router(MockServiceManagement::new())
            .oneshot(Request::post("/").body(Body::from("{not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// Story: the first sync of a new resource creates the service and reports progress
    #[tokio::test]
    async fn story_first_sync_reports_create_pending() {
        let mut sm = MockServiceManagement::new();
        sm.expect_get_service().returning(|_| Ok(None));
        sm.expect_create_service()
            .returning(|_, _| Ok(Operation::default()));

        let response = router(sm)
            .oneshot(Request::post("/").body(Body::from(sync_body())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["status"]["stateCurrent"], "ENDPOINT_CREATE_PENDING");
        assert_eq!(
            body["status"]["endpoint"],
            "petstore.endpoints.my-project.cloud.goog"
        );
        assert_eq!(body["children"], serde_json::json!([]));
    }

    /// Story: a status written by an earlier release still decodes and converges
    #[tokio::test]
    async fn story_legacy_rollout_marker_is_accepted() {
        let body = serde_json::json!({
            "parent": {
                "apiVersion": "ctl.isla.solutions/v1",
                "kind": "CloudEndpoint",
                "metadata": {"name": "petstore", "namespace": "default"},
                "spec": {"project": "my-project", "target": "1.2.3.4"},
                "status": {
                    "stateCurrent": "ENDPOINT_ROLLOUT_PENDING",
                    "endpoint": "petstore.endpoints.my-project.cloud.goog",
                    "config": "2024-01-01r0",
                    "serviceRollout": "NA"
                }
            },
            "children": {}
        })
        .to_string();

        let response = router(MockServiceManagement::new())
            .oneshot(Request::post("/").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["status"]["stateCurrent"], "IDLE");
        assert_eq!(body["status"]["serviceRollout"], "NA");
    }

    #[tokio::test]
    async fn failed_sync_still_carries_status() {
        let mut sm = MockServiceManagement::new();
        sm.expect_get_service()
            .returning(|_| Err(Error::google("servicemanagement", Some(500), "backend")));

        let response = router(sm)
            .oneshot(Request::post("/").body(Body::from(sync_body())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_json(response).await;
        let response: SyncResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.status.state_current, EndpointState::Idle);
        assert!(response.children.is_empty());
    }
}
