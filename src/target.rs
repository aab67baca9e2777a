//! Target model and endpoint resolution.
//!
//! A `Target` is one configured endpoint probed every cycle. The resolver
//! turns the raw target string (URL, `host:port`, or bare host) into the
//! host/port/SNI triple the TLS probe dials.

use std::collections::HashMap;

use thiserror::Error;
use url::Url;

/// Raised when a target string cannot be understood at config-load time.
///
/// This stops the offending target from being loaded; it never terminates
/// the process.
#[derive(Error, Debug)]
#[error("invalid target '{target}': {reason}")]
pub struct InvalidTarget {
    pub target: String,
    pub reason: String,
}

impl InvalidTarget {
    fn new(target: &str, reason: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// The probe strategy a target is monitored with.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeKind {
    HttpGet,
    HttpPost {
        headers: HashMap<String, String>,
        body: String,
    },
    TlsCertificate,
}

/// One configured endpoint. Immutable once loaded; lives for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique name, keys the metric series.
    pub name: String,
    /// Full URL for HTTP probes; raw URL/host/host:port for TLS probes.
    pub url: String,
    pub kind: ProbeKind,
    /// Optional region label; empty string when not configured.
    pub region: String,
}

/// Resolved dial coordinates for certificate probing.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Server name sent for SNI; always the hostname.
    pub server_name: String,
}

/// Resolve a raw target string into dial coordinates.
///
/// Accepts three forms:
/// - `scheme://host[:port][/path]` — port defaults to 443 for https and 80
///   for http unless the URL carries an explicit port;
/// - `host:port` — split on the last colon;
/// - bare `host` — port defaults to 443.
///
/// Pure function, no I/O.
pub fn resolve_endpoint(raw: &str) -> Result<Endpoint, InvalidTarget> {
    if raw.is_empty() {
        return Err(InvalidTarget::new(raw, "empty target string"));
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        let url = Url::parse(raw)
            .map_err(|e| InvalidTarget::new(raw, format!("URL parse failed: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| InvalidTarget::new(raw, "URL has no host"))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if url.scheme() == "http" { 80 } else { 443 });
        return Ok(Endpoint {
            server_name: host.clone(),
            host,
            port,
        });
    }

    if raw.contains(':') {
        if let Some((host, port)) = raw.rsplit_once(':') {
            if !host.is_empty() && !host.contains(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return Ok(Endpoint {
                        host: host.to_string(),
                        port,
                        server_name: host.to_string(),
                    });
                }
            }
        }
        // Colon-bearing but not host:port. A schemeless URL is not accepted
        // by the URL branch above, so this form is unusable.
        return Err(InvalidTarget::new(
            raw,
            "contains ':' but is neither host:port nor a URL",
        ));
    }

    Ok(Endpoint {
        host: raw.to_string(),
        port: 443,
        server_name: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_url_defaults_to_443() {
        let ep = resolve_endpoint("https://example.com/health").unwrap();
        assert_eq!(
            ep,
            Endpoint {
                host: "example.com".to_string(),
                port: 443,
                server_name: "example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_http_url_defaults_to_80() {
        let ep = resolve_endpoint("http://example.com").unwrap();
        assert_eq!(ep.port, 80);
        assert_eq!(ep.host, "example.com");
    }

    #[test]
    fn test_url_with_explicit_port() {
        let ep = resolve_endpoint("https://example.com:8443/api").unwrap();
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.server_name, "example.com");
    }

    #[test]
    fn test_host_port_form() {
        let ep = resolve_endpoint("example.com:8443").unwrap();
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.server_name, "example.com");
    }

    #[test]
    fn test_bare_host_defaults_to_443() {
        let ep = resolve_endpoint("example.com").unwrap();
        assert_eq!(ep.port, 443);
        assert_eq!(ep.server_name, "example.com");
    }

    #[test]
    fn test_colon_without_valid_port_is_rejected() {
        assert!(resolve_endpoint("example.com:notaport").is_err());
        assert!(resolve_endpoint("bad::pair").is_err());
        assert!(resolve_endpoint(":8443").is_err());
    }

    #[test]
    fn test_empty_target_is_rejected() {
        assert!(resolve_endpoint("").is_err());
    }

    #[test]
    fn test_port_out_of_range_is_rejected() {
        assert!(resolve_endpoint("example.com:70000").is_err());
    }
}
