//! CLI argument parsing and the node configuration threaded through every
//! bootstrap phase.

use clap::Parser;
use serde::Serialize;
use tracing::warn;

use crate::error::BootstrapError;

// Baked-in component versions. CI overrides these per release train via the
// corresponding flags; an intentionally blank override trips the version
// guard before anything runs.
pub const DEFAULT_HCLOUD_CCM_VERSION: &str = "1.29.1";
pub const DEFAULT_HCLOUD_CSI_VERSION: &str = "2.6.0";
pub const DEFAULT_CILIUM_VERSION: &str = "1.15.1";
pub const DEFAULT_INGRESS_NGINX_VERSION: &str = "4.10.0";
pub const DEFAULT_CERT_MANAGER_VERSION: &str = "v1.14.0";
pub const DEFAULT_NATS_VERSION: &str = "1.2.4";

/// Node role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Server,
    Agent,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Server => write!(f, "server"),
            NodeRole::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" => Ok(NodeRole::Server),
            "agent" => Ok(NodeRole::Agent),
            _ => Err(format!("Invalid role: {} (expected server or agent)", s)),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nodeup",
    version,
    about = "First-boot K3s node bootstrap over a Tailscale overlay"
)]
pub struct Args {
    /// Node role: server or agent
    #[arg(long, env = "NODEUP_ROLE", default_value = "agent")]
    pub role: NodeRole,

    /// Node hostname
    #[arg(long, env = "NODEUP_HOSTNAME")]
    pub hostname: String,

    /// Cloud environment tag (dev/prod)
    #[arg(long, env = "NODEUP_CLOUD_ENV", default_value = "dev")]
    pub cloud_env: String,

    /// K3s cluster join token
    #[arg(long, env = "NODEUP_K3S_TOKEN")]
    pub k3s_token: String,

    /// Load balancer IP in front of the control plane
    #[arg(long, env = "NODEUP_LOAD_BALANCER_IP", default_value = "")]
    pub load_balancer_ip: String,

    /// K3s server URL (agents only)
    #[arg(long, env = "NODEUP_K3S_URL", default_value = "")]
    pub k3s_url: String,

    /// Tailscale auth key
    #[arg(long, env = "NODEUP_TAILSCALE_AUTH_KEY")]
    pub tailscale_auth_key: String,

    /// Tailscale ACL tag to advertise (defaults to a role-specific tag)
    #[arg(long, env = "NODEUP_TAILSCALE_TAG")]
    pub tailscale_tag: Option<String>,

    /// Whether this node initializes a new cluster
    #[arg(long, env = "NODEUP_INIT", default_value = "false")]
    pub init: bool,

    /// S3 bucket for etcd snapshots (server only)
    #[arg(long, env = "NODEUP_S3_BUCKET", default_value = "")]
    pub s3_bucket: String,

    /// S3 access key for etcd snapshots (server only)
    #[arg(long, env = "NODEUP_S3_ACCESS_KEY", default_value = "")]
    pub s3_access_key: String,

    /// S3 secret key for etcd snapshots (server only)
    #[arg(long, env = "NODEUP_S3_SECRET_KEY", default_value = "")]
    pub s3_secret_key: String,

    /// Hetzner Cloud API token (server only)
    #[arg(long, env = "NODEUP_HCLOUD_TOKEN", default_value = "")]
    pub hcloud_token: String,

    /// Hetzner Cloud network name (server only)
    #[arg(long, env = "NODEUP_HCLOUD_NETWORK_NAME", default_value = "")]
    pub hcloud_network_name: String,

    /// Let's Encrypt registration email (server only)
    #[arg(long, env = "NODEUP_LETSENCRYPT_EMAIL", default_value = "")]
    pub letsencrypt_email: String,

    /// Hetzner cloud-controller-manager chart version
    #[arg(long, env = "NODEUP_HCLOUD_CCM_VERSION", default_value = DEFAULT_HCLOUD_CCM_VERSION)]
    pub hcloud_ccm_version: String,

    /// Hetzner CSI driver chart version
    #[arg(long, env = "NODEUP_HCLOUD_CSI_VERSION", default_value = DEFAULT_HCLOUD_CSI_VERSION)]
    pub hcloud_csi_version: String,

    /// Cilium chart version
    #[arg(long, env = "NODEUP_CILIUM_VERSION", default_value = DEFAULT_CILIUM_VERSION)]
    pub cilium_version: String,

    /// ingress-nginx chart version
    #[arg(long, env = "NODEUP_INGRESS_NGINX_VERSION", default_value = DEFAULT_INGRESS_NGINX_VERSION)]
    pub ingress_nginx_version: String,

    /// cert-manager chart version
    #[arg(long, env = "NODEUP_CERT_MANAGER_VERSION", default_value = DEFAULT_CERT_MANAGER_VERSION)]
    pub cert_manager_version: String,

    /// NATS chart version
    #[arg(long, env = "NODEUP_NATS_VERSION", default_value = DEFAULT_NATS_VERSION)]
    pub nats_version: String,

    /// Treat readiness-probe and taint-removal failures as fatal
    #[arg(long, env = "NODEUP_STRICT", default_value = "false")]
    pub strict: bool,

    /// Log format: json or pretty
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Node configuration threaded through every phase.
///
/// Built once from [`Args`], mutated in place by the discovery phases
/// (interface, private IP, overlay IP), read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub hostname: String,
    pub cloud_env: String,
    pub k3s_token: String,
    pub load_balancer_ip: String,
    pub k3s_url: String,
    pub tailscale_auth_key: String,
    pub tailscale_tag: Option<String>,
    pub is_init: bool,

    // Server only
    pub etcd_s3_bucket: String,
    pub etcd_s3_access_key: String,
    pub etcd_s3_secret_key: String,
    pub hcloud_token: String,
    pub hcloud_network: String,
    pub letsencrypt_email: String,

    // Component versions
    pub hcloud_ccm_version: String,
    pub hcloud_csi_version: String,
    pub cilium_version: String,
    pub ingress_nginx_version: String,
    pub cert_manager_version: String,
    pub nats_version: String,

    // Discovered during bootstrap
    pub interface: Option<String>,
    pub private_ip: Option<String>,
    pub tailscale_ip: Option<String>,
}

impl NodeConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            role: args.role,
            hostname: args.hostname.clone(),
            cloud_env: args.cloud_env.clone(),
            k3s_token: args.k3s_token.clone(),
            load_balancer_ip: args.load_balancer_ip.clone(),
            k3s_url: args.k3s_url.clone(),
            tailscale_auth_key: args.tailscale_auth_key.clone(),
            tailscale_tag: args.tailscale_tag.clone(),
            is_init: args.init,
            etcd_s3_bucket: args.s3_bucket.clone(),
            etcd_s3_access_key: args.s3_access_key.clone(),
            etcd_s3_secret_key: args.s3_secret_key.clone(),
            hcloud_token: args.hcloud_token.clone(),
            hcloud_network: args.hcloud_network_name.clone(),
            letsencrypt_email: args.letsencrypt_email.clone(),
            hcloud_ccm_version: args.hcloud_ccm_version.clone(),
            hcloud_csi_version: args.hcloud_csi_version.clone(),
            cilium_version: args.cilium_version.clone(),
            ingress_nginx_version: args.ingress_nginx_version.clone(),
            cert_manager_version: args.cert_manager_version.clone(),
            nats_version: args.nats_version.clone(),
            interface: None,
            private_ip: None,
            tailscale_ip: None,
        }
    }

    /// Ensure every component version was supplied.
    ///
    /// Reports all blank versions at once so an operator can fix the whole
    /// invocation in one pass.
    pub fn validate_versions(&self) -> Result<(), BootstrapError> {
        let versions = [
            ("hcloud-ccm-version", &self.hcloud_ccm_version),
            ("hcloud-csi-version", &self.hcloud_csi_version),
            ("cilium-version", &self.cilium_version),
            ("ingress-nginx-version", &self.ingress_nginx_version),
            ("cert-manager-version", &self.cert_manager_version),
            ("nats-version", &self.nats_version),
        ];

        let missing: Vec<&str> = versions
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BootstrapError::MissingVersions(missing.join(", ")))
        }
    }

    /// Check role-conditional required fields before any phase runs.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        match self.role {
            NodeRole::Server => {
                let required = [
                    ("load-balancer-ip", &self.load_balancer_ip),
                    ("s3-bucket", &self.etcd_s3_bucket),
                    ("s3-access-key", &self.etcd_s3_access_key),
                    ("s3-secret-key", &self.etcd_s3_secret_key),
                    ("hcloud-token", &self.hcloud_token),
                    ("hcloud-network-name", &self.hcloud_network),
                    ("letsencrypt-email", &self.letsencrypt_email),
                ];
                for (flag, value) in required {
                    if value.is_empty() {
                        return Err(BootstrapError::MissingFlag { role: "server", flag });
                    }
                }
            }
            NodeRole::Agent => {
                if self.is_init {
                    return Err(BootstrapError::InitOnAgent);
                }
                if self.k3s_url.is_empty() {
                    return Err(BootstrapError::MissingFlag { role: "agent", flag: "k3s-url" });
                }
            }
        }
        Ok(())
    }

    /// Log the effective configuration at startup. Secrets stay out.
    pub fn display(&self) {
        tracing::info!(
            role = %self.role,
            hostname = %self.hostname,
            cloud_env = %self.cloud_env,
            is_init = self.is_init,
            load_balancer_ip = %self.load_balancer_ip,
            k3s_url = %self.k3s_url,
            tailscale_tag = self.tailscale_tag.as_deref().unwrap_or("(role default)"),
            hcloud_ccm_version = %self.hcloud_ccm_version,
            hcloud_csi_version = %self.hcloud_csi_version,
            cilium_version = %self.cilium_version,
            ingress_nginx_version = %self.ingress_nginx_version,
            cert_manager_version = %self.cert_manager_version,
            nats_version = %self.nats_version,
            "Configuration initialized"
        );

        if self.cloud_env != "prod" {
            warn!(
                cloud_env = %self.cloud_env,
                "Non-production environment: control-plane scheduling taints will be removed"
            );
        }
    }
}

/// Fully populated server configuration used by tests across the crate.
#[cfg(test)]
pub(crate) fn test_server_config() -> NodeConfig {
    NodeConfig {
        role: NodeRole::Server,
        hostname: "server-01".to_string(),
        cloud_env: "dev".to_string(),
        k3s_token: "t1".to_string(),
        load_balancer_ip: "1.1.1.1".to_string(),
        k3s_url: String::new(),
        tailscale_auth_key: "tskey-test".to_string(),
        tailscale_tag: None,
        is_init: true,
        etcd_s3_bucket: "bucket".to_string(),
        etcd_s3_access_key: "access".to_string(),
        etcd_s3_secret_key: "secret".to_string(),
        hcloud_token: "token".to_string(),
        hcloud_network: "network".to_string(),
        letsencrypt_email: "mail@example.com".to_string(),
        hcloud_ccm_version: "1.29.1".to_string(),
        hcloud_csi_version: "2.6.0".to_string(),
        cilium_version: "1.15.1".to_string(),
        ingress_nginx_version: "4.10.0".to_string(),
        cert_manager_version: "v1.14.0".to_string(),
        nats_version: "1.2.4".to_string(),
        interface: Some("eth0".to_string()),
        private_ip: Some("10.0.0.2".to_string()),
        tailscale_ip: Some("100.64.0.1".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_config() -> NodeConfig {
        test_server_config()
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("server".parse::<NodeRole>().unwrap(), NodeRole::Server);
        assert_eq!("AGENT".parse::<NodeRole>().unwrap(), NodeRole::Agent);
        assert!("master".parse::<NodeRole>().is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(NodeRole::Server.to_string(), "server");
        assert_eq!(NodeRole::Agent.to_string(), "agent");
    }

    #[test]
    fn test_validate_versions_ok() {
        assert!(server_config().validate_versions().is_ok());
    }

    #[test]
    fn test_validate_versions_reports_all_missing() {
        let mut cfg = server_config();
        cfg.cilium_version.clear();
        cfg.nats_version.clear();

        let err = cfg.validate_versions().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cilium-version"));
        assert!(msg.contains("nats-version"));
        assert!(!msg.contains("hcloud-ccm-version"));
    }

    #[test]
    fn test_validate_server_requires_etcd_credentials() {
        let mut cfg = server_config();
        cfg.etcd_s3_secret_key.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("s3-secret-key"));
    }

    #[test]
    fn test_validate_agent_requires_url() {
        let mut cfg = server_config();
        cfg.role = NodeRole::Agent;
        cfg.is_init = false;
        cfg.k3s_url.clear();
        assert!(cfg.validate().is_err());

        cfg.k3s_url = "https://1.1.1.1:6443".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_init_agent() {
        let mut cfg = server_config();
        cfg.role = NodeRole::Agent;
        cfg.k3s_url = "https://1.1.1.1:6443".to_string();
        cfg.is_init = true;
        assert!(matches!(
            cfg.validate(),
            Err(BootstrapError::InitOnAgent)
        ));
    }
}
