//! End-to-end rendering of the full embedded manifest set.

use nodeup::config::{NodeConfig, NodeRole};
use nodeup::manifests::{self, ManifestSet};
use serde::Deserialize;
use tempfile::TempDir;

fn full_server_config() -> NodeConfig {
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

#[test]
fn embedded_set_renders_without_leftover_placeholders() {
    let cfg = full_server_config();
    let rendered = manifests::render_all(&ManifestSet::embedded(), &cfg).unwrap();

    assert!(!rendered.is_empty());
    for (name, content) in &rendered {
        assert!(
            !content.contains("{{") && !content.contains("{%"),
            "{} still contains template syntax:\n{}",
            name,
            content
        );
    }
}

#[test]
fn embedded_set_renders_valid_yaml_documents() {
    let cfg = full_server_config();
    let rendered = manifests::render_all(&ManifestSet::embedded(), &cfg).unwrap();

    for (name, content) in &rendered {
        for document in serde_yaml::Deserializer::from_str(content) {
            let value = serde_yaml::Value::deserialize(document);
            assert!(value.is_ok(), "{} is not valid YAML: {:?}", name, value.err());
        }
    }
}

#[test]
fn embedded_set_injects_versions_and_secrets() {
    let cfg = full_server_config();
    let rendered = manifests::render_all(&ManifestSet::embedded(), &cfg).unwrap();

    let find = |wanted: &str| -> &str {
        rendered
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, content)| content.as_str())
            .unwrap_or_else(|| panic!("missing manifest {}", wanted))
    };

    assert!(find("01-hcloud-secret.yaml").contains("token: \"token\""));
    assert!(find("01-hcloud-secret.yaml").contains("network: \"network\""));
    assert!(find("02-hcloud-ccm.yaml").contains("version: \"1.29.1\""));
    assert!(find("04-cilium.yaml").contains("version: \"1.15.1\""));
    assert!(find("06-cert-manager.yaml").contains("version: \"v1.14.0\""));
    assert!(find("07-cluster-issuer.yaml").contains("email: mail@example.com"));
    assert!(find("08-nats.yaml").contains("version: \"1.2.4\""));
}

#[test]
fn injection_writes_every_file_and_is_idempotent() {
    let cfg = full_server_config();
    let set = ManifestSet::embedded();
    let dir = TempDir::new().unwrap();

    manifests::inject(&set, &cfg, dir.path()).unwrap();

    let mut written: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    written.sort();
    let expected: Vec<String> = set.names().map(String::from).collect();
    assert_eq!(written, expected);

    let before = std::fs::read(dir.path().join("04-cilium.yaml")).unwrap();
    manifests::inject(&set, &cfg, dir.path()).unwrap();
    let after = std::fs::read(dir.path().join("04-cilium.yaml")).unwrap();
    assert_eq!(before, after);
}
