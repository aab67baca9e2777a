//! Probe executors.
//!
//! One `Prober` serves every target; the probe strategy is selected by the
//! target's `ProbeKind`. Each execution is bound to the caller's deadline and
//! returns either an `Observation` or a typed `ProbeError` — never both, and
//! never a hang past the deadline.

mod http;
mod tls;

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::target::{resolve_endpoint, ProbeKind, Target};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    /// The TLS handshake completed but the peer presented zero certificates.
    /// A protocol anomaly, distinct from ordinary unreachability.
    #[error("peer presented no certificates")]
    NoCertificate,
}

/// What a successful probe observed.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Request issue to response receipt, or TLS handshake completion.
    pub latency_seconds: f64,
    /// HTTP status code; 0 for certificate probes.
    pub status_code: u16,
    /// Leaf certificate expiry, certificate probes only.
    pub cert_not_after: Option<DateTime<Utc>>,
}

/// Executes probes against targets. Holds one shared HTTP client
/// (redirects off, certificate verification off) and one TLS connector
/// (verification off).
pub struct Prober {
    client: reqwest::Client,
    tls: tokio_rustls::TlsConnector,
}

impl Prober {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            tls: tls::connector(),
        })
    }

    /// Execute one probe against `target`, bounded by `timeout`.
    pub async fn execute(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Observation, ProbeError> {
        match &target.kind {
            ProbeKind::HttpGet => http::probe(&self.client, &target.url, None, timeout).await,
            ProbeKind::HttpPost { headers, body } => {
                http::probe(&self.client, &target.url, Some((headers, body)), timeout).await
            }
            ProbeKind::TlsCertificate => {
                let endpoint = resolve_endpoint(&target.url)
                    .map_err(|e| ProbeError::Connect(e.to_string()))?;
                tls::probe_certificate(&self.tls, &endpoint, timeout).await
            }
        }
    }
}

/// Remaining certificate lifetime in seconds. Negative once expired; an
/// expired certificate is a reportable value, not an error.
pub fn certificate_ttl_seconds(not_after: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (not_after - now).num_milliseconds() as f64 / 1000.0
}
