//! Baseline workload manifest injection (server role).
//!
//! The manifest set is embedded at compile time so the binary is
//! self-contained on a node that carries nothing else. K3s applies whatever
//! lands in its auto-deploy directory in listing order, and the set relies
//! on that: namespaces and the hcloud secret sort ahead of the charts that
//! consume them. A partially written set is worse than none, so any single
//! parse/render/write failure aborts the whole phase.

use std::collections::BTreeMap;
use std::path::Path;
use tera::Tera;
use tracing::info;

use crate::config::NodeConfig;
use crate::error::BootstrapError;
use crate::runtime::write_restricted;

pub const MANIFEST_DIR: &str = "/var/lib/rancher/k3s/server/manifests";

const EMBEDDED: &[(&str, &str)] = &[
    ("00-namespaces.yaml", include_str!("../manifests/00-namespaces.yaml")),
    ("01-hcloud-secret.yaml", include_str!("../manifests/01-hcloud-secret.yaml")),
    ("02-hcloud-ccm.yaml", include_str!("../manifests/02-hcloud-ccm.yaml")),
    ("03-hcloud-csi.yaml", include_str!("../manifests/03-hcloud-csi.yaml")),
    ("04-cilium.yaml", include_str!("../manifests/04-cilium.yaml")),
    ("05-ingress-nginx.yaml", include_str!("../manifests/05-ingress-nginx.yaml")),
    ("06-cert-manager.yaml", include_str!("../manifests/06-cert-manager.yaml")),
    ("07-cluster-issuer.yaml", include_str!("../manifests/07-cluster-issuer.yaml")),
    ("08-nats.yaml", include_str!("../manifests/08-nats.yaml")),
];

/// A named set of manifest templates.
///
/// Backed by a `BTreeMap` so iteration is always lexicographic by filename,
/// which is the order K3s will apply the rendered files in.
pub struct ManifestSet {
    templates: BTreeMap<String, String>,
}

impl ManifestSet {
    /// The compiled-in production set.
    pub fn embedded() -> Self {
        Self::from_pairs(EMBEDDED.iter().map(|(n, c)| (n.to_string(), c.to_string())))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            templates: pairs.into_iter().collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Render every template in the set against the node configuration.
///
/// Pure: returns `(filename, rendered)` pairs in application order.
pub fn render_all(
    set: &ManifestSet,
    cfg: &NodeConfig,
) -> Result<Vec<(String, String)>, BootstrapError> {
    let context = tera::Context::from_serialize(cfg).map_err(|source| {
        BootstrapError::ManifestRender {
            name: "(context)".to_string(),
            source,
        }
    })?;

    let mut tera = Tera::default();
    for (name, content) in &set.templates {
        tera.add_raw_template(name, content)
            .map_err(|source| BootstrapError::ManifestRender {
                name: name.clone(),
                source,
            })?;
    }

    let mut rendered = Vec::with_capacity(set.templates.len());
    for name in set.templates.keys() {
        let output = tera
            .render(name, &context)
            .map_err(|source| BootstrapError::ManifestRender {
                name: name.clone(),
                source,
            })?;
        rendered.push((name.clone(), output));
    }
    Ok(rendered)
}

/// Render the embedded set into the K3s auto-deploy directory.
pub async fn inject_embedded(cfg: &NodeConfig) -> anyhow::Result<()> {
    inject(&ManifestSet::embedded(), cfg, Path::new(MANIFEST_DIR))
}

/// Render the given set and write each file (0600) under `dir`, preserving
/// filenames. Re-running with the same configuration overwrites the previous
/// output with identical bytes.
pub fn inject(set: &ManifestSet, cfg: &NodeConfig, dir: &Path) -> anyhow::Result<()> {
    let rendered = render_all(set, cfg)?;

    for (name, content) in &rendered {
        let path = dir.join(name);
        write_restricted(&path, content.as_bytes())?;
        info!(manifest = %name, bytes = content.len(), "Manifest written");
    }

    info!(count = rendered.len(), dir = %dir.display(), "Manifest injection complete");
    Ok(())
}
