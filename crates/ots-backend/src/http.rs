//! reqwest client for the one-time secret HTTP API
//!
//! ```text
//! POST {endpoint}/secret        -> {"id": "...", "expiresAt": 1700000000}
//! GET  {endpoint}/secret/{id}   -> 200 envelope | 404 | 410 {"reason": ...}
//! ```
//!
//! Requests are never retried: a retried fetch could burn the secret and a
//! retried store would create a second record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use ots_core::config::BackendConfig;
use ots_core::{OpaqueId, OtsError, OtsResult};
use ots_crypto::WireBlob;

use crate::{FetchOutcome, SecretBackend, StoreReceipt};

const SECRET_SEGMENT: &str = "secret";

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GoneResponse {
    #[serde(default)]
    reason: String,
}

/// Backend reached over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: Url,
}

impl HttpBackend {
    /// Build a client for `endpoint` with a per-request `timeout`.
    pub fn new(endpoint: Url, timeout: Duration) -> OtsResult<Self> {
        if endpoint.cannot_be_a_base() {
            return Err(OtsError::Config(format!(
                "backend endpoint cannot be a base URL: {endpoint}"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("ots/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OtsError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// Build from the `[backend]` config section.
    ///
    /// A plain-http endpoint is an error when `enforce_tls` is set and a
    /// warning otherwise.
    pub fn from_config(cfg: &BackendConfig) -> OtsResult<Self> {
        let endpoint = Url::parse(&cfg.endpoint)
            .map_err(|e| OtsError::Config(format!("backend.endpoint {:?}: {e}", cfg.endpoint)))?;

        if endpoint.scheme() == "http" {
            if cfg.enforce_tls {
                return Err(OtsError::Config(format!(
                    "backend endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set backend.enforce_tls = false for local development."
                )));
            }
            tracing::warn!(
                endpoint = %endpoint,
                "backend endpoint uses plaintext HTTP: envelopes and IDs travel unencrypted. \
                 Set backend.enforce_tls = true and use HTTPS in production."
            );
        }

        Self::new(endpoint, cfg.timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn secret_url(&self, id: Option<&OpaqueId>) -> Url {
        let mut url = self.endpoint.clone();
        // checked in new(): the endpoint can be a base
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(SECRET_SEGMENT);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        url
    }
}

#[async_trait]
impl SecretBackend for HttpBackend {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt> {
        let url = self.secret_url(None);
        tracing::debug!(url = %url, bytes = blob.as_bytes().len(), "POST envelope");

        let resp = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(blob.as_bytes().to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, resp).await);
        }

        let created: CreateResponse = resp
            .json()
            .await
            .map_err(|e| OtsError::UnexpectedResponse(format!("create response: {e}")))?;
        let id = OpaqueId::new(created.id)
            .map_err(|e| OtsError::UnexpectedResponse(format!("backend returned {e}")))?;

        Ok(StoreReceipt {
            id,
            expires_at: created.expires_at,
        })
    }

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome> {
        let url = self.secret_url(Some(id));
        tracing::debug!(id = %id, "GET envelope");

        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        match resp.status() {
            StatusCode::OK => {
                let body = resp.bytes().await.map_err(transport_error)?;
                Ok(FetchOutcome::Found(WireBlob::from(body.to_vec())))
            }
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            StatusCode::GONE => {
                let reason = resp
                    .json::<GoneResponse>()
                    .await
                    .map(|g| g.reason)
                    .unwrap_or_default();
                Ok(match reason.as_str() {
                    "expired" => FetchOutcome::Expired,
                    _ => FetchOutcome::Consumed,
                })
            }
            status => Err(status_error(status, resp).await),
        }
    }
}

fn transport_error(e: reqwest::Error) -> OtsError {
    if e.is_timeout() {
        OtsError::BackendUnavailable("request timed out".into())
    } else {
        OtsError::BackendUnavailable(e.without_url().to_string())
    }
}

async fn status_error(status: StatusCode, resp: Response) -> OtsError {
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    if status.is_server_error() {
        OtsError::BackendUnavailable(format!("{status}: {detail}"))
    } else {
        OtsError::UnexpectedResponse(format!("{status}: {detail}"))
    }
}
