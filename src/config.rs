//! Process configuration for the sync hook server

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

/// Settings for serving the sync hook
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long = "listen", env = "LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub listen: SocketAddr,

    /// Google Cloud project id; read from the metadata server when unset
    #[arg(long = "project", env = "GOOGLE_PROJECT")]
    pub project: Option<String>,

    /// Google Cloud project number; read from the metadata server when unset
    #[arg(long = "project-number", env = "GOOGLE_PROJECT_NUMBER")]
    pub project_number: Option<String>,

    /// Timeout for each Google API request, in seconds
    #[arg(long = "request-timeout-secs", env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long = "log-json", env = "LOG_JSON")]
    pub log_json: bool,
}

impl ServeArgs {
    /// Per-request timeout for Google API calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
