//! Metrics recorder.
//!
//! Owns the Prometheus registry and the three gauge families every probe
//! result maps onto. Constructed explicitly and shared by `Arc` between the
//! cycle coordinator (writer) and the exposition handler (reader); gauge
//! writes are single atomic `set`s, so a concurrent scrape never observes a
//! torn series and writers for different targets never interfere.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::scheduler::ProbeResult;

const LABELS: &[&str] = &["api_name", "env", "region"];

pub struct Recorder {
    registry: Registry,
    pub(crate) availability: GaugeVec,
    pub(crate) latency: GaugeVec,
    pub(crate) cert_ttl: GaugeVec,
}

impl Recorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let availability = GaugeVec::new(
            Opts::new(
                "api_availability_status",
                "API availability status (1 for up, 0 for down)",
            ),
            LABELS,
        )?;
        registry.register(Box::new(availability.clone()))?;

        let latency = GaugeVec::new(
            Opts::new("api_response_seconds", "API response time in seconds"),
            LABELS,
        )?;
        registry.register(Box::new(latency.clone()))?;

        let cert_ttl = GaugeVec::new(
            Opts::new(
                "api_certificate_ttl_seconds",
                "Remaining time in seconds until the API TLS certificate expires",
            ),
            LABELS,
        )?;
        registry.register(Box::new(cert_ttl.clone()))?;

        Ok(Self {
            registry,
            availability,
            latency,
            cert_ttl,
        })
    }

    /// Record one probe result. Gauges are overwritten, not accumulated;
    /// each cycle's values replace the previous cycle's.
    pub fn record(&self, result: &ProbeResult) {
        let labels = &[
            result.target_name.as_str(),
            result.environment.as_str(),
            result.region.as_str(),
        ];

        self.availability
            .with_label_values(labels)
            .set(if result.success { 1.0 } else { 0.0 });
        self.latency
            .with_label_values(labels)
            .set(result.latency_seconds);

        // Omitted when the probe failed before a certificate could be read,
        // and for targets that are not TLS-monitored.
        if let Some(ttl) = result.cert_ttl_seconds {
            self.cert_ttl.with_label_values(labels).set(ttl);
        }
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
