//! K3s systemd service lifecycle.

use tracing::info;

use crate::command;
use crate::config::NodeRole;

/// systemd unit for the role.
pub fn service_name(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Server => "k3s",
        NodeRole::Agent => "k3s-agent",
    }
}

/// Enable and start the role's service.
///
/// Both calls are idempotent at the systemd level; a failure of either is
/// fatal since nothing downstream works without a running runtime.
pub async fn enable_and_start(role: NodeRole) -> anyhow::Result<()> {
    let svc = service_name(role);
    info!(service = svc, "Enabling and starting service");

    command::run("systemctl", &["enable", svc]).await?;
    command::run("systemctl", &["start", svc]).await?;

    info!(service = svc, "Service started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_by_role() {
        assert_eq!(service_name(NodeRole::Server), "k3s");
        assert_eq!(service_name(NodeRole::Agent), "k3s-agent");
    }
}
