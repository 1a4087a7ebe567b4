//! Cluster API readiness probe.
//!
//! Certificate verification is disabled here on purpose: the cluster CA is
//! not distributed to the node at this point in bootstrap, and the probe
//! only interprets the HTTP status code. This exception is scoped to this
//! one client and is not a general posture.

use std::time::Duration;
use tracing::{debug, info};

use crate::config::{NodeConfig, NodeRole};

const PROBE_ATTEMPTS: u32 = 60;
const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const API_PORT: u16 = 6443;

/// Poll the API health endpoint until it answers 200 or retries run out.
///
/// The caller treats an error here as advisory: the node may be locally
/// healthy even when this path (typically through a load balancer that is
/// still provisioning) is not reachable yet.
pub async fn wait_for_api(cfg: &NodeConfig) -> anyhow::Result<()> {
    let target = match cfg.role {
        NodeRole::Agent => cfg.k3s_url.as_str(),
        NodeRole::Server => cfg.load_balancer_ip.as_str(),
    };
    let url = normalize_health_url(target);
    info!(url = %url, "Waiting for cluster API");

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    for attempt in 1..=PROBE_ATTEMPTS {
        match client.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                info!(url = %url, attempt, "Cluster API is ready");
                return Ok(());
            }
            Ok(resp) => {
                debug!(url = %url, attempt, status = %resp.status(), "API not ready yet");
            }
            Err(e) => {
                debug!(url = %url, attempt, error = %e, "API probe failed");
            }
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }

    anyhow::bail!("API at {} never became ready after {} attempts", url, PROBE_ATTEMPTS)
}

/// Normalize a host, host:port, or URL into an HTTPS health-check URL.
///
/// Adds the `https://` scheme, the standard API port when the host carries
/// none, and the `/healthz` path when absent.
pub fn normalize_health_url(target: &str) -> String {
    let stripped = target.strip_prefix("https://").unwrap_or(target);
    let (host, path) = match stripped.find('/') {
        Some(idx) => (&stripped[..idx], &stripped[idx..]),
        None => (stripped, ""),
    };

    let mut url = String::from("https://");
    url.push_str(host);
    if !host.contains(':') {
        url.push_str(&format!(":{}", API_PORT));
    }

    if path.is_empty() || path == "/" {
        url.push_str("/healthz");
    } else {
        url.push_str(path);
        if !path.ends_with("/healthz") {
            url.push_str("/healthz");
        }
    }

    url
}
