//! Backchannel HTTP transport used for the signed provider calls.

use crate::error::{OAuth1Error, OAuth1Result};
use async_trait::async_trait;
use http::{Method, StatusCode};
use reqwest::{Certificate, Client, header};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Largest response body accepted from the provider (10 MiB)
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = "ras-identity-oauth1 backchannel";

/// One signed request to a provider endpoint
#[derive(Debug, Clone)]
pub struct BackchannelRequest {
    pub method: Method,
    pub url: Url,
    /// Value of the `Authorization` header; every OAuth parameter travels here
    pub authorization: String,
}

#[derive(Debug, Clone)]
pub struct BackchannelResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Transport for provider calls.
///
/// Exactly one attempt per call: a signed request carries a single-use nonce,
/// so implementations must not retry on their own.
#[async_trait]
pub trait Backchannel: Send + Sync {
    async fn send(&self, request: BackchannelRequest) -> OAuth1Result<BackchannelResponse>;
}

/// Pinned trust anchors for backchannel TLS.
///
/// When configured, the platform roots are not consulted and only chains
/// ending in one of these certificates are accepted.
#[derive(Clone, Default)]
pub struct CertificatePins {
    certificates: Vec<Certificate>,
}

impl std::fmt::Debug for CertificatePins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePins")
            .field("count", &self.certificates.len())
            .finish()
    }
}

impl CertificatePins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pem(mut self, pem: &[u8]) -> OAuth1Result<Self> {
        let certificate = Certificate::from_pem(pem).map_err(|e| {
            OAuth1Error::ConfigError(format!("Invalid pinned certificate: {}", e))
        })?;
        self.certificates.push(certificate);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Default [`Backchannel`] backed by `reqwest`
#[derive(Clone)]
pub struct HttpBackchannel {
    client: Client,
}

impl HttpBackchannel {
    pub fn new(timeout: Duration, pins: Option<&CertificatePins>) -> OAuth1Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));

        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if let Some(pins) = pins.filter(|p| !p.is_empty()) {
            builder = builder.tls_built_in_root_certs(false);
            for certificate in &pins.certificates {
                builder = builder.add_root_certificate(certificate.clone());
            }
        }

        let client = builder.build().map_err(|e| {
            OAuth1Error::ConfigError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Backchannel for HttpBackchannel {
    async fn send(&self, request: BackchannelRequest) -> OAuth1Result<BackchannelResponse> {
        debug!("Backchannel {} {}", request.method, request.url);

        let mut response = self
            .client
            .request(request.method, request.url)
            .header(header::AUTHORIZATION, request.authorization)
            .send()
            .await?;
        let status = response.status();

        if response
            .content_length()
            .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
        {
            return Err(OAuth1Error::ResponseTooLarge {
                limit: MAX_RESPONSE_BYTES,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            append_capped(&mut body, &chunk, MAX_RESPONSE_BYTES)?;
        }

        Ok(BackchannelResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Bodies without a declared length are capped while streaming.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> OAuth1Result<()> {
    if body.len() + chunk.len() > limit {
        return Err(OAuth1Error::ResponseTooLarge { limit });
    }
    body.extend_from_slice(chunk);
    Ok(())
}
