// Shared transport configuration for building reqwest::Client instances.
//
// The backend client and the feed poller share TLS, timeout, and credential
// headers through this module, avoiding duplicated builder logic.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Header the feed service expects the API key in.
pub const API_KEY_HEADER: &str = "x-aio-key";

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed backends on the local network).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Feed-service API key, sent as `X-AIO-Key`.
    pub api_key: Option<SecretString>,
    /// Bearer credential obtained from the external auth collaborator.
    pub bearer_token: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            api_key: None,
            bearer_token: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// Credentials are installed as sensitive default headers so every
    /// request carries them without callers threading secrets around.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("sprout/", env!("CARGO_PKG_VERSION")))
            .default_headers(self.credential_headers()?);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// `Authorization` header value for the push-stream upgrade request.
    pub fn bearer_header(&self) -> Option<String> {
        self.bearer_token
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose_secret()))
    }

    fn credential_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();

        if let Some(ref key) = self.api_key {
            let mut value = HeaderValue::from_str(key.expose_secret())
                .map_err(|e| Error::Tls(format!("API key is not a valid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        if let Some(bearer) = self.bearer_header() {
            let mut value = HeaderValue::from_str(&bearer)
                .map_err(|e| Error::Tls(format!("token is not a valid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn credential_headers_are_sensitive() {
        let config = TransportConfig {
            api_key: Some(SecretString::from("aio_key".to_string())),
            bearer_token: Some(SecretString::from("tok".to_string())),
            ..TransportConfig::default()
        };

        let headers = config.credential_headers().unwrap();
        assert!(headers.get(API_KEY_HEADER).unwrap().is_sensitive());
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn no_credentials_means_no_headers() {
        let headers = TransportConfig::default().credential_headers().unwrap();
        assert!(headers.is_empty());
        assert!(TransportConfig::default().bearer_header().is_none());
    }
}
