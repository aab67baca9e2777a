//! TLS certificate-expiry probe.
//!
//! Dials the resolved endpoint, completes a TLS handshake with chain
//! verification disabled, and reads the leaf certificate's `not_after`. The
//! probe observes liveness and expiry, not trust.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, SignatureScheme};
use tokio_rustls::TlsConnector;

use super::{Observation, ProbeError};
use crate::target::Endpoint;

/// Verifier that accepts any certificate chain.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the connector shared by all certificate probes.
pub(super) fn connector() -> TlsConnector {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connect and read the peer's leaf-certificate expiry.
///
/// TCP connect and TLS handshake share one deadline. The connection is shut
/// down on every exit path after the socket is established.
pub(super) async fn probe_certificate(
    connector: &TlsConnector,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Observation, ProbeError> {
    let server_name = ServerName::try_from(endpoint.server_name.clone())
        .map_err(|e| ProbeError::Connect(format!("invalid server name: {e}")))?;

    let start = Instant::now();

    let handshake = async {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        connector.connect(server_name, tcp).await
    };

    let mut stream = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Connect(e.to_string()))?;

    let latency_seconds = start.elapsed().as_secs_f64();

    let not_after = {
        let (_, session) = stream.get_ref();
        leaf_not_after(session.peer_certificates())
    };

    let _ = stream.shutdown().await;

    Ok(Observation {
        latency_seconds,
        status_code: 0,
        cert_not_after: Some(not_after?),
    })
}

fn leaf_not_after(certs: Option<&[CertificateDer<'_>]>) -> Result<DateTime<Utc>, ProbeError> {
    let leaf = certs
        .and_then(|chain| chain.first())
        .ok_or(ProbeError::NoCertificate)?;

    let (_, parsed) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| ProbeError::Connect(format!("certificate parse failed: {e}")))?;

    let seconds = parsed.validity().not_after.timestamp();
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| ProbeError::Connect("certificate expiry out of range".to_string()))
}
