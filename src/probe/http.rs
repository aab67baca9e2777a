//! HTTP(S) probe implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{Observation, ProbeError};

/// Issue a single GET (or POST with the supplied headers/body) against `url`.
///
/// Any response received before the deadline is a transport-level success,
/// whatever its status code — a reachable-but-erroring endpoint is still
/// reachable, and a 3xx is observed as-is since redirects are never followed.
pub(super) async fn probe(
    client: &reqwest::Client,
    url: &str,
    post: Option<(&HashMap<String, String>, &str)>,
    timeout: Duration,
) -> Result<Observation, ProbeError> {
    let request = match post {
        None => client.get(url),
        Some((headers, body)) => {
            let mut request = client.post(url).body(body.to_string());
            for (key, value) in headers {
                request = request.header(key, value);
            }
            request
        }
    };

    let start = Instant::now();

    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Connect(e.to_string())
        }
    })?;

    let latency_seconds = start.elapsed().as_secs_f64();
    let status_code = response.status().as_u16();

    // Drain the body so the connection is released for reuse across cycles.
    // The content itself is never inspected.
    let _ = response.bytes().await;

    Ok(Observation {
        latency_seconds,
        status_code,
        cert_not_after: None,
    })
}
