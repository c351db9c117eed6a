//! CloudEndpoint reconciler
//!
//! Each sync call drives at most one externally visible step of the cycle
//! `IDLE -> CREATE_PENDING -> SUBMIT_PENDING -> ROLLOUT_PENDING -> IDLE`.
//! Nothing is awaited across calls: pending backend operations are recorded
//! in the status and polled on the next call. Every effecting step either
//! checks for existing work first or records a pollable handle, so replaying
//! a call whose response was lost is safe.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::clients::{config_map_value, KubeClient};
use super::drift::detect_drift;
use super::status::{content_hash, project_status, spec_signature};
use super::target::{resolve_target, Resolution};
use crate::crd::{CloudEndpoint, CloudEndpointStatus, EndpointState, RolloutRef};
use crate::gcp::{BackendServices, ConfigFile, GcpProject, Rollout, ServiceManagement};
use crate::openapi::{inline_document, DocumentVars, SpecComposer};
use crate::{Error, SyncFailure};

/// Controller context containing shared clients
///
/// Built once at startup and shared read-only by every sync call.
pub struct Context {
    /// Kubernetes lookups (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Service Management API
    pub service_management: Arc<dyn ServiceManagement>,
    /// Compute backend service lookups
    pub backends: Arc<dyn BackendServices>,
    /// Project the controller runs in
    pub project: GcpProject,
    /// API document renderer
    pub composer: SpecComposer,
}

impl Context {
    /// Create a context from its clients
    pub fn new(
        kube: Arc<dyn KubeClient>,
        service_management: Arc<dyn ServiceManagement>,
        backends: Arc<dyn BackendServices>,
        project: GcpProject,
    ) -> Self {
        Self {
            kube,
            service_management,
            backends,
            project,
            composer: SpecComposer::new(),
        }
    }
}

/// Reconcile a CloudEndpoint and return the status to report
///
/// On failure the returned [`SyncFailure`] still carries the status computed
/// so far. The state is left unchanged unless the API document failed
/// validation, which sends the endpoint back to IDLE.
#[instrument(skip(endpoint, ctx), fields(endpoint = %endpoint.name_any()))]
pub async fn reconcile(
    endpoint: &CloudEndpoint,
    ctx: &Context,
) -> Result<CloudEndpointStatus, SyncFailure> {
    let signature = match spec_signature(&endpoint.spec) {
        Ok(sig) => sig,
        Err(source) => {
            return Err(SyncFailure {
                status: endpoint.status.clone().unwrap_or_default(),
                source,
            })
        }
    };

    let mut status = project_status(endpoint.status.as_ref(), &signature);
    let current = status.state_current;
    let sync = SyncCall {
        endpoint,
        ctx,
        name: endpoint.name_any(),
        namespace: endpoint.namespace().unwrap_or_else(|| "default".to_string()),
        signature,
    };

    let result = match current {
        EndpointState::Idle => sync.idle(&mut status).await,
        EndpointState::CreatePending => sync.create_pending(&mut status).await,
        EndpointState::SubmitPending => sync.submit_pending(&mut status).await,
        EndpointState::RolloutPending => sync.rollout_pending(&mut status).await,
    };

    match result {
        Ok(next) => {
            if next != current {
                info!(from = %current, to = %next, "state transition");
            }
            status.state_current = next;
            Ok(status)
        }
        Err(source) => {
            if source.resets_convergence() {
                warn!(error = %source, state = %current, "invalid API document, returning to IDLE");
                status.state_current = EndpointState::Idle;
            } else {
                warn!(error = %source, state = %current, "sync failed");
            }
            Err(SyncFailure { status, source })
        }
    }
}

/// One sync call for one resource
struct SyncCall<'a> {
    endpoint: &'a CloudEndpoint,
    ctx: &'a Context,
    name: String,
    namespace: String,
    signature: String,
}

impl SyncCall<'_> {
    async fn idle(&self, status: &mut CloudEndpointStatus) -> Result<EndpointState, Error> {
        let spec = &self.endpoint.spec;
        let drifted = detect_drift(
            spec,
            &self.namespace,
            status,
            &self.signature,
            self.ctx.kube.as_ref(),
        )
        .await;
        if !drifted {
            return Ok(EndpointState::Idle);
        }

        let service_name = spec.endpoint_name(&self.name);
        match self.ctx.service_management.get_service(&service_name).await? {
            Some(_) => info!(service = %service_name, "managed service already exists, skipping create"),
            None => {
                info!(service = %service_name, "managed service does not exist, creating");
                self.ctx
                    .service_management
                    .create_service(&spec.project, &service_name)
                    .await?;
            }
        }

        status.endpoint = Some(service_name);
        Ok(EndpointState::CreatePending)
    }

    async fn create_pending(
        &self,
        status: &mut CloudEndpointStatus,
    ) -> Result<EndpointState, Error> {
        let spec = &self.endpoint.spec;
        let service_name = status
            .endpoint
            .get_or_insert_with(|| spec.endpoint_name(&self.name))
            .clone();

        let source = if let Some(reference) = spec.config_map_ref() {
            match config_map_value(self.ctx.kube.as_ref(), &self.namespace, reference).await {
                Ok(Some(document)) => {
                    status.config_map_hash = Some(content_hash(&document));
                    Some(document)
                }
                Ok(None) => {
                    info!(config_map = %reference.name, key = %reference.key, "waiting for config map document");
                    return Ok(EndpointState::CreatePending);
                }
                Err(e) => {
                    info!(config_map = %reference.name, error = %e, "unable to load config map document");
                    return Ok(EndpointState::CreatePending);
                }
            }
        } else if let Some(document) = &spec.open_api_spec {
            Some(inline_document(document)?)
        } else {
            None
        };

        let target = match spec.ingress_ref() {
            Some(ingress_ref) => {
                let resolution = resolve_target(
                    ingress_ref,
                    &self.namespace,
                    self.ctx.kube.as_ref(),
                    self.ctx.backends.as_ref(),
                    &self.ctx.project,
                )
                .await?;
                match resolution {
                    Resolution::NotReady => return Ok(EndpointState::CreatePending),
                    Resolution::Ready(resolved) => {
                        status.jwt_audiences = resolved.audiences;
                        resolved.address
                    }
                }
            }
            None => {
                status.jwt_audiences.clear();
                spec.target.clone()
            }
        };

        let document = self.ctx.composer.compose(
            source.as_deref(),
            &DocumentVars {
                endpoint: &service_name,
                target: &target,
                jwt_audiences: &status.jwt_audiences,
            },
        )?;
        status.ingress_ip = Some(target);

        if self
            .ctx
            .service_management
            .get_service(&service_name)
            .await?
            .is_none()
        {
            info!(service = %service_name, "waiting for managed service creation");
            return Ok(EndpointState::CreatePending);
        }

        info!(service = %service_name, "submitting service config");
        let op = self
            .ctx
            .service_management
            .submit_config(&service_name, vec![ConfigFile::openapi_yaml(&document)])
            .await?;

        status.config_submit = Some(op.name);
        status.config = None;
        status.service_rollout = None;
        status.last_applied_sig = Some(self.signature.clone());
        Ok(EndpointState::SubmitPending)
    }

    async fn submit_pending(
        &self,
        status: &mut CloudEndpointStatus,
    ) -> Result<EndpointState, Error> {
        let Some(service_name) = status.endpoint.clone() else {
            warn!("no managed service recorded, resubmitting");
            return Ok(EndpointState::CreatePending);
        };

        if let Some(op_name) = status.config_submit.clone() {
            let op = self.ctx.service_management.get_operation(&op_name).await?;
            if !op.done {
                debug!(operation = %op_name, "waiting for service config submit");
                return Ok(EndpointState::SubmitPending);
            }
            if let Some(err) = op.error {
                let failure = Error::operation(&op_name, err.message);
                error!(error = %failure, service = %service_name, "service config submit failed, resubmitting");
                status.config_submit = None;
                return Ok(EndpointState::CreatePending);
            }
            let config_id = op
                .submitted_config_id()
                .ok_or_else(|| {
                    Error::serialization(format!(
                        "submit operation {op_name} returned no service config id"
                    ))
                })?
                .to_string();

            info!(service = %service_name, config = %config_id, "service config submit complete");
            status.config = Some(config_id);
            status.config_submit = None;
        }

        let Some(config_id) = status.config.clone() else {
            warn!("no submit operation or service config recorded, resubmitting");
            return Ok(EndpointState::CreatePending);
        };

        let rollouts = self
            .ctx
            .service_management
            .list_rollouts(&service_name)
            .await?;
        if rollouts.first().is_some_and(|r| r.serves_fully(&config_id)) {
            info!(service = %service_name, config = %config_id, "rollout for config already active, skipping rollout");
            status.service_rollout = Some(RolloutRef::already_active());
        } else {
            info!(service = %service_name, config = %config_id, "creating service config rollout");
            let op = self
                .ctx
                .service_management
                .create_rollout(&service_name, &Rollout::full(&service_name, &config_id))
                .await?;
            status.service_rollout = Some(RolloutRef::pending(op.name));
        }

        Ok(EndpointState::RolloutPending)
    }

    async fn rollout_pending(
        &self,
        status: &mut CloudEndpointStatus,
    ) -> Result<EndpointState, Error> {
        let Some(rollout) = status.service_rollout.clone() else {
            warn!("no rollout recorded, returning to submit");
            return Ok(EndpointState::SubmitPending);
        };

        if let Some(op_name) = rollout.operation {
            let op = self.ctx.service_management.get_operation(&op_name).await?;
            if !op.done {
                debug!(operation = %op_name, "waiting for service config rollout");
                return Ok(EndpointState::RolloutPending);
            }
            if let Some(err) = op.error {
                let failure = Error::operation(&op_name, err.message);
                error!(error = %failure, "service config rollout failed, rolling out again");
                status.service_rollout = None;
                return Ok(EndpointState::SubmitPending);
            }
        }

        info!(
            service = status.endpoint.as_deref().unwrap_or_default(),
            config = status.config.as_deref().unwrap_or_default(),
            "service config rollout complete"
        );
        Ok(EndpointState::Idle)
    }
}
