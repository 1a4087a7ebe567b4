//! Tailscale overlay join.
//!
//! The most failure-prone part of first boot: the auth key may not be valid
//! yet, the default route may still be settling, or the coordination server
//! may be briefly unreachable. Every attempt uses `--reset` so a
//! half-joined state from a previous attempt never blocks a clean retry,
//! and every attempt is mirrored to a side log that survives on the node
//! for post-mortem debugging.

use std::io::Write;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::command;
use crate::config::{NodeConfig, NodeRole};

pub const JOIN_LOG_PATH: &str = "/var/log/tailscale-join.log";
const MAX_JOIN_ATTEMPTS: u32 = 60;
const JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DAEMON_SETTLE: Duration = Duration::from_secs(2);

/// Start the daemon, join the overlay, and record the assigned overlay IPv4.
pub async fn join(cfg: &mut NodeConfig) -> anyhow::Result<()> {
    let mut log = JoinLog::open(JOIN_LOG_PATH);
    log.note("--- Tailscale setup starting ---");

    // Starting an already-running daemon is a no-op for systemd.
    log.note("Starting tailscaled service");
    command::run("systemctl", &["start", "tailscaled"]).await?;
    sleep(DAEMON_SETTLE).await;

    let tag = advertise_tag(cfg.role, cfg.tailscale_tag.as_deref());
    let authkey_arg = format!("--authkey={}", cfg.tailscale_auth_key);
    let hostname_arg = format!("--hostname={}", cfg.hostname);
    let tags_arg = format!("--advertise-tags={}", tag);

    let mut last_err = None;
    let mut joined = false;

    for attempt in 1..=MAX_JOIN_ATTEMPTS {
        log.note(&format!("Join attempt {}/{}", attempt, MAX_JOIN_ATTEMPTS));

        match command::run(
            "tailscale",
            &["up", &authkey_arg, "--ssh", &hostname_arg, &tags_arg, "--reset"],
        )
        .await
        {
            Ok(_) => {
                log.note("Tailscale up succeeded");
                joined = true;
                break;
            }
            Err(e) => {
                log.note(&format!("Join failed: {}", e));
                last_err = Some(e);
                sleep(JOIN_RETRY_INTERVAL).await;
            }
        }
    }

    if !joined {
        let last = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        log.note(&format!(
            "Giving up after {} attempts: {}",
            MAX_JOIN_ATTEMPTS, last
        ));
        anyhow::bail!(
            "failed to join Tailscale after {} attempts.\n\
             Last error: {}\n\
             *** TROUBLESHOOTING ***\n\
             1. Run: cat {}\n\
             2. Check routes: ip route show default",
            MAX_JOIN_ATTEMPTS,
            last,
            JOIN_LOG_PATH,
        );
    }

    // A join without a usable overlay address is not a valid state.
    let output = command::run("tailscale", &["ip", "-4"]).await?;
    let ip = output
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow::anyhow!("tailscale reported no IPv4 address after join"))?
        .to_string();

    log.note(&format!("Tailscale IP acquired: {}", ip));
    info!(tailscale_ip = %ip, tag = %tag, "Joined Tailscale overlay");
    cfg.tailscale_ip = Some(ip);

    Ok(())
}

/// ACL tag to advertise: explicit override, otherwise a role default.
pub fn advertise_tag(role: NodeRole, tag_override: Option<&str>) -> String {
    match tag_override {
        Some(tag) => tag.to_string(),
        None => match role {
            NodeRole::Server => "tag:k3s-server".to_string(),
            NodeRole::Agent => "tag:k3s-agent".to_string(),
        },
    }
}

/// Append-only debug log mirrored next to the system log.
///
/// Kept best-effort: the bootstrap must not fail because /var/log is odd.
struct JoinLog {
    file: Option<std::fs::File>,
}

impl JoinLog {
    fn open(path: &str) -> Self {
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                warn!(path = %path, error = %e, "Could not open join debug log");
                e
            })
            .ok();
        Self { file }
    }

    fn note(&mut self, msg: &str) {
        info!("{}", msg);
        if let Some(f) = self.file.as_mut() {
            let _ = writeln!(f, "{} {}", chrono::Utc::now().to_rfc3339(), msg);
        }
    }
}
