//! Authenticated JSON transport shared by the Google API clients

use std::sync::Arc;

use gcp_auth::TokenProvider;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::CLOUD_PLATFORM_SCOPE;
use crate::Error;

/// Google JSON error envelope
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Bearer-authenticated JSON client for one Google API
#[derive(Clone)]
pub struct GoogleApi {
    api: &'static str,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleApi {
    /// Create a client for `api`, used to label errors
    pub fn new(api: &'static str, http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { api, http, tokens }
    }

    async fn access_token(&self) -> Result<String, Error> {
        let token = self
            .tokens
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| Error::google(self.api, None, format!("failed to get access token: {e}")))?;
        Ok(token.as_str().to_string())
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        trace!(api = self.api, %url, "GET");
        let token = self.access_token().await?;
        let request = self.http.get(url).bearer_auth(token);
        self.send(request).await
    }

    /// POST `body` as JSON to `url` and decode the JSON response
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        trace!(api = self.api, %url, "POST");
        let token = self.access_token().await?;
        let request = self.http.post(url).bearer_auth(token).json(body);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::google(self.api, None, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::google(self.api, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::google(
                self.api,
                Some(status.as_u16()),
                describe_error(status, &body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::serialization(format!("invalid {} response: {e}", self.api))
        })
    }
}

/// Human-readable message for a failed response
fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.error.status.is_empty() => {
            format!("{} ({})", parsed.error.message, parsed.error.status)
        }
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status} - {}", body.trim()),
    }
}
