//! Cloud Endpoints controller - Metacontroller sync hook server

use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing::info;

use cloud_endpoints_controller::config::ServeArgs;
use cloud_endpoints_controller::controller::{Context, KubeClientImpl};
use cloud_endpoints_controller::crd::CloudEndpoint;
use cloud_endpoints_controller::gcp::{
    ComputeClient, GcpProject, GoogleApi, ServiceManagementClient,
};
use cloud_endpoints_controller::telemetry::{init_telemetry, TelemetryConfig};
use cloud_endpoints_controller::webhook::{webhook_router, WebhookState};

/// Cloud Endpoints controller - reconciles CloudEndpoint resources into Google Cloud Endpoints
#[derive(Parser, Debug)]
#[command(name = "cloud-endpoints-controller", version, about, long_about = None)]
struct Cli {
    /// Print the CloudEndpoint CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&CloudEndpoint::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        json: cli.serve.log_json,
    })?;

    serve(cli.serve).await
}

/// Build the clients and serve the hook until shutdown
async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let tokens = gcp_auth::provider()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize GCP auth: {}", e))?;

    let http = reqwest::Client::builder()
        .timeout(args.request_timeout())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

    let project =
        GcpProject::discover(&http, args.project.clone(), args.project_number.clone()).await?;

    let ctx = Context::new(
        Arc::new(KubeClientImpl::new(client)),
        Arc::new(ServiceManagementClient::new(GoogleApi::new(
            "servicemanagement",
            http.clone(),
            tokens.clone(),
        ))),
        Arc::new(ComputeClient::new(GoogleApi::new("compute", http, tokens))),
        project,
    );

    let router = webhook_router(Arc::new(WebhookState::new(Arc::new(ctx))));
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", args.listen, e))?;

    info!(addr = %args.listen, "serving sync hook");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
