//! Scheduling taint cleanup after the first server start.
//!
//! kubectl is driven with the node-local generated kubeconfig. Removing a
//! taint that is already gone is success, so re-runs converge.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::command;
use crate::config::NodeConfig;
use crate::error::BootstrapError;

pub const KUBECONFIG_PATH: &str = "/etc/rancher/k3s/k3s.yaml";

const REGISTRATION_ATTEMPTS: u32 = 30;
const REGISTRATION_INTERVAL: Duration = Duration::from_secs(2);

const UNINITIALIZED_TAINT: &str = "node.cloudprovider.kubernetes.io/uninitialized:NoSchedule";
const MASTER_TAINT: &str = "node-role.kubernetes.io/master:NoSchedule";
const CONTROL_PLANE_TAINT: &str = "node-role.kubernetes.io/control-plane:NoSchedule";

/// Wait for the node object to register, then open it for scheduling.
pub async fn finalize(cfg: &NodeConfig) -> anyhow::Result<()> {
    wait_for_registration(&cfg.hostname).await?;

    remove_taint(&cfg.hostname, UNINITIALIZED_TAINT).await?;

    // Single-node development clusters schedule workloads on the control
    // plane; production keeps these taints and lets agents carry the load.
    if cfg.cloud_env == "dev" {
        remove_taint(&cfg.hostname, MASTER_TAINT).await?;
        remove_taint(&cfg.hostname, CONTROL_PLANE_TAINT).await?;
    }

    info!(node = %cfg.hostname, "Scheduling taints cleared");
    Ok(())
}

async fn wait_for_registration(hostname: &str) -> anyhow::Result<()> {
    for attempt in 1..=REGISTRATION_ATTEMPTS {
        match kubectl(&["get", "node", hostname]).await {
            Ok(_) => {
                info!(node = %hostname, attempt, "Node registered with the API server");
                return Ok(());
            }
            Err(e) => {
                debug!(node = %hostname, attempt, error = %e, "Node not registered yet");
            }
        }
        sleep(REGISTRATION_INTERVAL).await;
    }

    anyhow::bail!(
        "node {} never registered after {} attempts",
        hostname,
        REGISTRATION_ATTEMPTS
    )
}

/// Remove one taint, treating "taint not present" as success.
async fn remove_taint(hostname: &str, taint: &str) -> anyhow::Result<()> {
    let removal = taint_removal_arg(taint);
    match kubectl(&["taint", "node", hostname, &removal]).await {
        Ok(_) => {
            info!(node = %hostname, taint = %taint, "Taint removed");
            Ok(())
        }
        Err(e) if is_taint_absent(&e) => {
            debug!(node = %hostname, taint = %taint, "Taint already absent");
            Ok(())
        }
        Err(e) => {
            warn!(node = %hostname, taint = %taint, error = %e, "Taint removal failed");
            Err(e.into())
        }
    }
}

async fn kubectl(args: &[&str]) -> Result<String, BootstrapError> {
    command::run_with_env("kubectl", args, &[("KUBECONFIG", KUBECONFIG_PATH)]).await
}

/// kubectl taint removal syntax: the taint spec with a trailing dash.
fn taint_removal_arg(taint: &str) -> String {
    format!("{}-", taint)
}

fn is_taint_absent(err: &BootstrapError) -> bool {
    match err {
        BootstrapError::CommandFailed { output, .. } => {
            output.contains("not found") || output.contains("No taint")
        }
        _ => false,
    }
}
