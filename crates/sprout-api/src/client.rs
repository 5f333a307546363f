// Backend HTTP client
//
// Wraps `reqwest::Client` with URL construction for the two REST surfaces
// (the dashboard backend and the feed service) and uniform status handling.
// Endpoint groups (devices, feeds, thresholds) are implemented as inherent
// methods in separate files to keep this module focused on transport
// mechanics.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the greenhouse backend and its feed service.
///
/// `base_url` serves commands and configuration (`/devices/{channel}`,
/// `/config`); `feed_url` serves per-channel readings
/// (`/{channel}/data/last`). They are frequently the same host.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    feed_url: Url,
}

impl BackendClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(base_url: Url, feed_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            feed_url,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, feed_url: Url) -> Self {
        Self {
            http,
            base_url,
            feed_url,
        }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The feed service base URL.
    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}`
    pub(crate) fn backend_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.base_url, path)
    }

    /// `{feed}/{path}`
    pub(crate) fn feed_service_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.feed_url, path)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        let body = checked_body(resp).await?;
        decode(&body)
    }

    /// Send a POST request with a JSON body and return the raw response text.
    pub(crate) async fn post_text(&self, url: Url, body: &impl Serialize) -> Result<String, Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        checked_body(resp).await
    }

    /// Liveness probe: `GET {base}/`.
    pub async fn health(&self) -> Result<String, Error> {
        debug!("GET {} (health)", self.base_url);
        let resp = self.http.get(self.base_url.clone()).send().await?;
        checked_body(resp).await
    }
}

/// Append `path` to `base`, tolerating a trailing slash on either side.
fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&full)?)
}

/// Map HTTP status onto the error taxonomy and return the body on success.
async fn checked_body(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "credential missing, expired, or invalid".into(),
        });
    }

    let body = resp.text().await?;

    if status.is_client_error() || status.is_server_error() {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_owned()
        } else {
            body
        };
        return Err(Error::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}
