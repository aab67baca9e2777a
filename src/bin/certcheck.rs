//! certcheck - one-shot TLS certificate expiry checker.
//!
//! Probes each host argument once and prints the certificate's remaining
//! lifetime and expiry time. Per-host failures are printed and the remaining
//! hosts are still checked.

use std::time::Duration;

use chrono::Utc;
use clap::Parser;

use apimon::probe::{certificate_ttl_seconds, Prober};
use apimon::target::{ProbeKind, Target};

#[derive(Parser, Debug)]
#[command(
    name = "certcheck",
    about = "Print TLS certificate expiry for each host"
)]
struct Args {
    /// Dial timeout for TLS connections (e.g. '5s')
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Hosts to check: URL, bare host, or host:port
    #[arg(required = true)]
    hosts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let prober = Prober::new()?;

    for raw in &args.hosts {
        let target = Target {
            name: raw.clone(),
            url: raw.clone(),
            kind: ProbeKind::TlsCertificate,
            region: String::new(),
        };

        match prober.execute(&target, args.timeout).await {
            Err(e) => println!("{raw} -> ERROR: {e}"),
            Ok(observation) => match observation.cert_not_after {
                Some(not_after) => {
                    let ttl = certificate_ttl_seconds(not_after, Utc::now());
                    if ttl >= 0.0 {
                        println!(
                            "{raw} -> expires in {} (at {})",
                            humantime::format_duration(Duration::from_secs(ttl as u64)),
                            not_after.to_rfc3339()
                        );
                    } else {
                        println!(
                            "{raw} -> EXPIRED {} ago (at {})",
                            humantime::format_duration(Duration::from_secs(-ttl as u64)),
                            not_after.to_rfc3339()
                        );
                    }
                }
                None => println!("{raw} -> ERROR: no certificate observed"),
            },
        }
    }

    Ok(())
}
