//! K3s runtime configuration rendering.
//!
//! `render_runtime_config` is a pure function over [`NodeConfig`] so the
//! role branches stay unit-testable; the write happens separately against
//! the fixed privileged path (the directory itself is pre-created with the
//! right ownership by the image build).

use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::config::{NodeConfig, NodeRole};
use crate::error::BootstrapError;

pub const CONFIG_PATH: &str = "/etc/rancher/k3s/config.yaml";
const API_PORT: u16 = 6443;

/// Render the role-specific K3s config file contents.
pub fn render_runtime_config(cfg: &NodeConfig) -> Result<String, BootstrapError> {
    let private_ip = cfg
        .private_ip
        .as_deref()
        .ok_or(BootstrapError::AddressNotDiscovered("private IP"))?;
    let tailscale_ip = cfg
        .tailscale_ip
        .as_deref()
        .ok_or(BootstrapError::AddressNotDiscovered("Tailscale IP"))?;

    let mut out = String::new();
    out.push_str(&format!("token: {}\n", cfg.k3s_token));
    out.push_str(&format!("node-ip: {}\n", private_ip));
    out.push_str(&format!("node-external-ip: {}\n", tailscale_ip));
    out.push_str("kubelet-arg:\n");
    out.push_str("  - \"cloud-provider=external\"\n");
    out.push_str("  - \"container-log-max-files=3\"\n");
    out.push_str("  - \"container-log-max-size=10Mi\"\n");

    match cfg.role {
        NodeRole::Server => {
            out.push_str("tls-san:\n");
            out.push_str(&format!("  - {}\n", cfg.hostname));
            out.push_str(&format!("  - {}\n", tailscale_ip));
            out.push_str(&format!("  - {}\n", cfg.load_balancer_ip));
            // Cilium replaces the built-in fabric; the Hetzner CCM replaces
            // the bundled cloud-controller; ingress-nginx replaces traefik.
            out.push_str("flannel-backend: none\n");
            out.push_str("disable-network-policy: true\n");
            out.push_str("disable:\n");
            out.push_str("  - traefik\n");
            out.push_str("  - servicelb\n");
            out.push_str("  - cloud-controller\n");
            out.push_str("etcd-s3: true\n");
            out.push_str("etcd-s3-endpoint: storage.googleapis.com\n");
            out.push_str(&format!("etcd-s3-access-key: {}\n", cfg.etcd_s3_access_key));
            out.push_str(&format!("etcd-s3-secret-key: {}\n", cfg.etcd_s3_secret_key));
            out.push_str(&format!("etcd-s3-bucket: {}\n", cfg.etcd_s3_bucket));
            out.push_str("etcd-snapshot-schedule-cron: \"0 */6 * * *\"\n");
            out.push_str("etcd-snapshot-retention: 10\n");

            if cfg.is_init {
                out.push_str("cluster-init: true\n");
            } else {
                out.push_str(&format!(
                    "server: https://{}:{}\n",
                    cfg.load_balancer_ip, API_PORT
                ));
            }
        }
        NodeRole::Agent => {
            out.push_str(&format!("server: {}\n", normalize_join_url(&cfg.k3s_url)));
        }
    }

    Ok(out)
}

/// Require an `https://` scheme on the agent join URL.
pub fn normalize_join_url(url: &str) -> String {
    if url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Render and write the config file to its fixed privileged path.
pub async fn configure(cfg: &NodeConfig) -> anyhow::Result<()> {
    configure_at(cfg, Path::new(CONFIG_PATH))
}

pub fn configure_at(cfg: &NodeConfig, path: &Path) -> anyhow::Result<()> {
    let content = render_runtime_config(cfg)?;
    write_restricted(path, content.as_bytes())?;
    info!(path = %path.display(), bytes = content.len(), "K3s configuration written");
    Ok(())
}

/// Write a file readable by root only (0600), truncating any previous run's
/// output so re-runs converge on identical content.
pub(crate) fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), BootstrapError> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|source| BootstrapError::FileWrite {
            path: path.display().to_string(),
            source,
        })?;

    file.write_all(contents).map_err(|source| BootstrapError::FileWrite {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_server_config;

    fn agent_config() -> NodeConfig {
        let mut cfg = test_server_config();
        cfg.role = NodeRole::Agent;
        cfg.is_init = false;
        cfg.k3s_url = "1.1.1.1:6443".to_string();
        cfg.private_ip = Some("10.0.0.3".to_string());
        cfg.tailscale_ip = Some("100.64.0.2".to_string());
        cfg
    }

    #[test]
    fn test_render_initial_server() {
        let cfg = test_server_config();
        let content = render_runtime_config(&cfg).unwrap();

        for expected in [
            "token: t1",
            "node-ip: 10.0.0.2",
            "node-external-ip: 100.64.0.1",
            "cloud-provider=external",
            "container-log-max-files=3",
            "container-log-max-size=10Mi",
            "tls-san:",
            "- server-01",
            "- 100.64.0.1",
            "- 1.1.1.1",
            "etcd-s3: true",
            "etcd-s3-bucket: bucket",
            "etcd-s3-access-key: access",
            "etcd-s3-secret-key: secret",
            "etcd-snapshot-schedule-cron: \"0 */6 * * *\"",
            "etcd-snapshot-retention: 10",
            "cluster-init: true",
        ] {
            assert!(content.contains(expected), "missing {:?} in:\n{}", expected, content);
        }
        assert!(!content.contains("server: https://"));
    }

    #[test]
    fn test_render_joining_server_points_at_load_balancer() {
        let mut cfg = test_server_config();
        cfg.is_init = false;
        let content = render_runtime_config(&cfg).unwrap();

        assert!(content.contains("server: https://1.1.1.1:6443"));
        assert!(!content.contains("cluster-init"));
    }

    #[test]
    fn test_render_agent() {
        let content = render_runtime_config(&agent_config()).unwrap();

        assert!(content.contains("token: t1"));
        assert!(content.contains("node-ip: 10.0.0.3"));
        assert!(content.contains("node-external-ip: 100.64.0.2"));
        assert!(content.contains("server: https://1.1.1.1:6443"));
        assert_eq!(content.matches("server: ").count(), 1);
        assert!(!content.contains("etcd-s3"));
        assert!(!content.contains("tls-san"));
        assert!(!content.contains("cluster-init"));
    }

    #[test]
    fn test_render_agent_preserves_existing_scheme() {
        let mut cfg = agent_config();
        cfg.k3s_url = "https://lb.internal:6443".to_string();
        let content = render_runtime_config(&cfg).unwrap();
        assert!(content.contains("server: https://lb.internal:6443\n"));
    }

    #[test]
    fn test_normalize_join_url() {
        assert_eq!(normalize_join_url("1.1.1.1:6443"), "https://1.1.1.1:6443");
        assert_eq!(
            normalize_join_url("https://1.1.1.1:6443"),
            "https://1.1.1.1:6443"
        );
    }

    #[test]
    fn test_render_requires_discovered_addresses() {
        let mut cfg = test_server_config();
        cfg.tailscale_ip = None;
        assert!(matches!(
            render_runtime_config(&cfg),
            Err(BootstrapError::AddressNotDiscovered(_))
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let cfg = test_server_config();
        assert_eq!(
            render_runtime_config(&cfg).unwrap(),
            render_runtime_config(&cfg).unwrap()
        );
    }

    #[test]
    fn test_configure_at_writes_restricted_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let cfg = test_server_config();

        configure_at(&cfg, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_runtime_config(&cfg).unwrap());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // Overwriting with the same config converges on identical bytes.
        configure_at(&cfg, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
    }
}
