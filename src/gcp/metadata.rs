//! Project identity, from flags or the GCE metadata server

use tracing::info;

use crate::Error;

const METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/project";

/// The Google Cloud project the controller runs in
///
/// Backend services are looked up in this project and JWT audiences are
/// built from its number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcpProject {
    /// Project id, e.g. `my-project`
    pub id: String,
    /// Numeric project number
    pub number: String,
}

impl GcpProject {
    /// Create a project identity from known values
    pub fn new(id: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
        }
    }

    /// Resolve the project, asking the metadata server for anything not given
    pub async fn discover(
        http: &reqwest::Client,
        id: Option<String>,
        number: Option<String>,
    ) -> Result<Self, Error> {
        let id = match id.filter(|v| !v.is_empty()) {
            Some(id) => id,
            None => metadata_value(http, "project-id").await?,
        };
        let number = match number.filter(|v| !v.is_empty()) {
            Some(number) => number,
            None => metadata_value(http, "numeric-project-id").await?,
        };

        info!(project = %id, project_number = %number, "resolved project identity");
        Ok(Self { id, number })
    }

    /// JWT audience of a global backend service in this project
    pub fn backend_audience(&self, backend_id: &str) -> String {
        format!(
            "/projects/{}/global/backendServices/{}",
            self.number, backend_id
        )
    }
}

async fn metadata_value(http: &reqwest::Client, key: &str) -> Result<String, Error> {
    let response = http
        .get(format!("{METADATA_URL}/{key}"))
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| Error::config(format!("metadata server unreachable for {key}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::config(format!(
            "metadata server returned {status} for {key}"
        )));
    }

    let value = response
        .text()
        .await
        .map_err(|e| Error::config(format!("failed to read metadata {key}: {e}")))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::config(format!("metadata server returned empty {key}")));
    }
    Ok(value.to_string())
}
