//! Probe cycle coordination and scheduling.
//!
//! The coordinator runs one cycle: it fans out one probe task per target,
//! each bound to its own deadline, waits for every one to finish, and records
//! every result. The scheduler drives cycles back-to-back on a fixed delay —
//! a long cycle starts the next one late by exactly its overrun; cycles never
//! overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::metrics::Recorder;
use crate::probe::{certificate_ttl_seconds, ProbeError, Prober};
use crate::target::Target;

/// The outcome of probing one target, produced fresh each cycle.
/// Immutable after construction.
#[derive(Debug)]
pub struct ProbeResult {
    pub target_name: String,
    pub region: String,
    pub environment: String,
    pub success: bool,
    pub latency_seconds: f64,
    /// HTTP status code; 0 when unavailable (failures and TLS probes).
    pub status_code: u16,
    /// Remaining certificate lifetime; only for TLS-monitored targets, and
    /// only when a certificate was actually read. May be negative.
    pub cert_ttl_seconds: Option<f64>,
    pub error: Option<ProbeError>,
    pub observed_at: DateTime<Utc>,
}

/// Runs one round of probing across every configured target.
pub struct Coordinator {
    targets: Arc<Vec<Target>>,
    prober: Arc<Prober>,
    recorder: Arc<Recorder>,
    environment: String,
    api_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        targets: Vec<Target>,
        prober: Arc<Prober>,
        recorder: Arc<Recorder>,
        environment: String,
        api_timeout: Duration,
    ) -> Self {
        Self {
            targets: Arc::new(targets),
            prober,
            recorder,
            environment,
            api_timeout,
        }
    }

    /// Run one full probe cycle: dispatch, await all, record all.
    ///
    /// Every target yields exactly one result, success or failure; no
    /// target's failure aborts the cycle or touches another target's series.
    pub async fn run_cycle(&self, cycle: u64) {
        let mut probes = JoinSet::new();

        for target in self.targets.iter() {
            let prober = self.prober.clone();
            let target = target.clone();
            let environment = self.environment.clone();
            let timeout = self.api_timeout;
            probes.spawn(async move { probe_target(prober, target, environment, timeout).await });
        }

        let expected = self.targets.len();
        let mut recorded = 0usize;

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(result) => {
                    self.recorder.record(&result);
                    recorded += 1;
                }
                Err(e) => {
                    tracing::error!("Probe task for cycle {} did not complete: {}", cycle, e);
                }
            }
        }

        tracing::info!(
            "Cycle {} complete: {}/{} targets recorded",
            cycle,
            recorded,
            expected
        );
    }
}

/// Probe one target and fold any error into a failed result.
///
/// A failed probe records availability 0 with the timeout value as latency,
/// so repeated timeouts show as a plateau instead of a missing series.
async fn probe_target(
    prober: Arc<Prober>,
    target: Target,
    environment: String,
    timeout: Duration,
) -> ProbeResult {
    let observed_at = Utc::now();

    let result = match prober.execute(&target, timeout).await {
        Ok(observation) => ProbeResult {
            target_name: target.name,
            region: target.region,
            environment,
            success: true,
            latency_seconds: observation.latency_seconds,
            status_code: observation.status_code,
            cert_ttl_seconds: observation
                .cert_not_after
                .map(|not_after| certificate_ttl_seconds(not_after, Utc::now())),
            error: None,
            observed_at,
        },
        Err(err) => ProbeResult {
            target_name: target.name,
            region: target.region,
            environment,
            success: false,
            latency_seconds: timeout.as_secs_f64(),
            status_code: 0,
            cert_ttl_seconds: None,
            error: Some(err),
            observed_at,
        },
    };

    log_outcome(&result);
    result
}

/// One structured line per probe outcome, ISO-8601 timestamped.
fn log_outcome(result: &ProbeResult) {
    match &result.error {
        None => tracing::info!(
            "  -> SUCCESS for {} at {}: response time {:.3}s, status code {}",
            result.target_name,
            result.observed_at.to_rfc3339(),
            result.latency_seconds,
            result.status_code
        ),
        Some(err @ ProbeError::NoCertificate) => tracing::error!(
            "  -> FAILED for {} at {}: {} (misbehaving peer)",
            result.target_name,
            result.observed_at.to_rfc3339(),
            err
        ),
        Some(err) => tracing::error!(
            "  -> FAILED for {} at {}: {}",
            result.target_name,
            result.observed_at.to_rfc3339(),
            err
        ),
    }
}

/// Drives the coordinator forever on a fixed delay.
pub struct Scheduler {
    coordinator: Coordinator,
    interval: Duration,
}

impl Scheduler {
    pub fn new(coordinator: Coordinator, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// Run cycles until a stop signal arrives.
    ///
    /// The stop channel is only checked during the inter-cycle sleep, so an
    /// in-flight cycle always finishes recording before the loop exits.
    pub async fn run(self, mut stop: broadcast::Receiver<()>) {
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            self.coordinator.run_cycle(cycle).await;

            tracing::info!("Waiting {:?} before the next probe cycle...", self.interval);
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("Scheduler stopping after cycle {}", cycle);
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::ProbeKind;
    use std::time::Instant;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_target(name: &str, url: String) -> Target {
        Target {
            name: name.to_string(),
            url,
            kind: ProbeKind::HttpGet,
            region: "".to_string(),
        }
    }

    fn coordinator(targets: Vec<Target>, timeout: Duration) -> (Coordinator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::new().unwrap());
        let prober = Arc::new(Prober::new().unwrap());
        let coordinator = Coordinator::new(
            targets,
            prober,
            recorder.clone(),
            "test".to_string(),
            timeout,
        );
        (coordinator, recorder)
    }

    fn availability(recorder: &Recorder, name: &str) -> f64 {
        recorder
            .availability
            .with_label_values(&[name, "test", ""])
            .get()
    }

    fn latency(recorder: &Recorder, name: &str) -> f64 {
        recorder
            .latency
            .with_label_values(&[name, "test", ""])
            .get()
    }

    #[tokio::test]
    async fn test_cycle_records_good_and_timed_out_targets() {
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&good)
            .await;

        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&slow)
            .await;

        let timeout = Duration::from_millis(300);
        let (coordinator, recorder) = coordinator(
            vec![http_target("A", good.uri()), http_target("B", slow.uri())],
            timeout,
        );

        coordinator.run_cycle(1).await;

        assert_eq!(availability(&recorder, "A"), 1.0);
        assert_eq!(availability(&recorder, "B"), 0.0);
        // Failures record the timeout value, not the elapsed time.
        assert_eq!(latency(&recorder, "B"), 0.3);
    }

    #[tokio::test]
    async fn test_every_target_yields_one_result() {
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&good)
            .await;

        let targets = vec![
            http_target("up", good.uri()),
            http_target("refused", "http://127.0.0.1:1".to_string()),
            Target {
                name: "bad-cert".to_string(),
                url: "127.0.0.1:1".to_string(),
                kind: ProbeKind::TlsCertificate,
                region: "".to_string(),
            },
        ];
        let (coordinator, recorder) = coordinator(targets, Duration::from_millis(500));

        coordinator.run_cycle(1).await;

        let rendered = recorder.render().unwrap();
        for name in ["up", "refused", "bad-cert"] {
            assert!(
                rendered.contains(&format!(r#"api_availability_status{{api_name="{name}""#)),
                "missing series for {name}"
            );
        }
        // 5xx is reachable, hence available at the transport level.
        assert_eq!(availability(&recorder, "up"), 1.0);
        assert_eq!(availability(&recorder, "refused"), 0.0);
        assert_eq!(availability(&recorder, "bad-cert"), 0.0);
    }

    #[tokio::test]
    async fn test_cycle_awaits_all_probes_before_returning() {
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(250)))
            .mount(&slow)
            .await;

        let (coordinator, recorder) =
            coordinator(vec![http_target("slow", slow.uri())], Duration::from_secs(2));

        let start = Instant::now();
        coordinator.run_cycle(1).await;

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(availability(&recorder, "slow"), 1.0);
    }

    #[tokio::test]
    async fn test_failed_probe_result_carries_error_and_timestamp() {
        let prober = Arc::new(Prober::new().unwrap());
        let before = Utc::now();

        let result = probe_target(
            prober,
            http_target("refused", "http://127.0.0.1:1".to_string()),
            "test".to_string(),
            Duration::from_millis(500),
        )
        .await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(ProbeError::Connect(_))));
        assert!(result.observed_at >= before && result.observed_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_consecutive_cycles_never_interleave() {
        use std::sync::Mutex;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Hand-rolled HTTP server so each dispatch leaves an arrival
        // timestamp; the response is held for `delay` to stretch the cycle.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let delay = Duration::from_millis(200);
        let hits: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let server_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                server_hits.lock().unwrap().push(Instant::now());
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                });
            }
        });

        // Interval shorter than the response delay: an overlapping (or
        // fixed-rate) scheduler would dispatch again before the previous
        // cycle finished recording.
        let interval = Duration::from_millis(50);
        let (coordinator, recorder) = coordinator(
            vec![http_target("seq", format!("http://{addr}"))],
            Duration::from_secs(2),
        );
        let scheduler = Scheduler::new(coordinator, interval);

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(stop_rx));

        // Enough wall time for about three cycles.
        tokio::time::sleep(3 * (delay + interval)).await;
        let _ = stop_tx.send(());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let hits = hits.lock().unwrap();
        assert!(hits.len() >= 2, "expected at least two cycles, saw {}", hits.len());
        for pair in hits.windows(2) {
            // Dispatch N+1 comes only after cycle N's response arrived and
            // was recorded, so consecutive dispatches are at least the
            // response delay apart.
            assert!(
                pair[1].duration_since(pair[0]) >= delay,
                "cycle dispatched {:?} after the previous one, before it could finish",
                pair[1].duration_since(pair[0])
            );
        }
        assert_eq!(availability(&recorder, "seq"), 1.0);
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_signal_after_cycle() {
        let (coordinator, _recorder) = coordinator(Vec::new(), Duration::from_millis(100));
        let scheduler = Scheduler::new(coordinator, Duration::from_secs(60));

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(stop_rx));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
