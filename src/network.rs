//! Primary interface detection and IPv4 address discovery.
//!
//! The interface scan reads `/sys/class/net` directly; the address wait
//! shells out to `ip`, which is the one tool guaranteed present on the
//! images this runs on. Every later phase needs a real address, so this
//! phase has no silent fallback: a full timeout after one DHCP retrigger
//! is fatal.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::command;
use crate::config::NodeConfig;
use crate::error::BootstrapError;

const SYSFS_NET: &str = "/sys/class/net";
const ADDRESS_POLL_ATTEMPTS: u32 = 60;
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Detect the primary interface and wait for its IPv4 address, storing both
/// on the config.
pub async fn discover(cfg: &mut NodeConfig) -> anyhow::Result<()> {
    let iface = detect_interface()?;
    info!(interface = %iface, "Detected primary interface");

    let ip = wait_for_ipv4(&iface).await?;
    info!(interface = %iface, private_ip = %ip, "Private IPv4 acquired");

    cfg.interface = Some(iface);
    cfg.private_ip = Some(ip);
    Ok(())
}

/// Find the first ethernet-style interface (`eth*` or `en*`).
pub fn detect_interface() -> Result<String, BootstrapError> {
    detect_interface_in(Path::new(SYSFS_NET))
}

fn detect_interface_in(sysfs: &Path) -> Result<String, BootstrapError> {
    let mut names: Vec<String> = std::fs::read_dir(sysfs)
        .map_err(|_| BootstrapError::NoEthernetInterface)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    // Deterministic pick when several candidates exist (eth0 before eth1).
    names.sort();

    names
        .into_iter()
        .find(|name| name.starts_with("eth") || name.starts_with("en"))
        .ok_or(BootstrapError::NoEthernetInterface)
}

/// Poll the interface until it carries a global IPv4 address.
///
/// One bounded poll, then a single DHCP lease retrigger, then one more
/// bounded poll. Still nothing means the network never came up.
pub async fn wait_for_ipv4(iface: &str) -> Result<String, BootstrapError> {
    if let Some(ip) = poll_for_ipv4(iface).await {
        return Ok(ip);
    }

    warn!(interface = %iface, "No IPv4 address yet, forcing a DHCP lease renewal");
    if let Err(e) = command::run("dhclient", &[iface]).await {
        warn!(interface = %iface, error = %e, "DHCP renewal failed");
    }

    match poll_for_ipv4(iface).await {
        Some(ip) => Ok(ip),
        None => Err(BootstrapError::AddressTimeout(iface.to_string())),
    }
}

async fn poll_for_ipv4(iface: &str) -> Option<String> {
    for attempt in 1..=ADDRESS_POLL_ATTEMPTS {
        match command::run("ip", &["-4", "-o", "addr", "show", "dev", iface, "scope", "global"])
            .await
        {
            Ok(output) => {
                if let Some(ip) = parse_ipv4_addr(&output) {
                    return Some(ip);
                }
            }
            Err(e) => {
                warn!(interface = %iface, attempt, error = %e, "Address query failed");
            }
        }
        sleep(ADDRESS_POLL_INTERVAL).await;
    }
    None
}

/// Extract the first non-loopback IPv4 address from `ip -4 -o addr show`
/// output, e.g. `2: eth0    inet 10.0.0.2/32 brd 10.0.0.255 scope global eth0`.
fn parse_ipv4_addr(output: &str) -> Option<String> {
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "inet" {
                if let Some(cidr) = tokens.next() {
                    let addr = cidr.split('/').next().unwrap_or(cidr);
                    if !addr.starts_with("127.") && addr.parse::<std::net::Ipv4Addr>().is_ok() {
                        return Some(addr.to_string());
                    }
                }
            }
        }
    }
    None
}
