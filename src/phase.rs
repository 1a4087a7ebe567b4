//! Ordered bootstrap phases and the convergence driver.
//!
//! Each phase carries a severity: a `Fatal` failure stops the run with a
//! non-zero exit, an `Advisory` failure is logged and the run continues
//! (a later re-run or external reconciliation can pick it up, since every
//! phase is idempotent). `--strict` promotes advisory failures to fatal.

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{NodeConfig, NodeRole};
use crate::{manifests, mesh, network, readiness, runtime, service, taints};

/// Failure policy of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseId {
    VersionGuard,
    NetworkDiscovery,
    MeshJoin,
    RuntimeConfig,
    ManifestInjection,
    ServiceStart,
    ReadinessProbe,
    TaintFinalize,
}

pub struct PhaseSpec {
    pub id: PhaseId,
    pub name: &'static str,
    pub severity: Severity,
}

/// The convergence sequence, in execution order.
pub const PHASES: &[PhaseSpec] = &[
    PhaseSpec {
        id: PhaseId::VersionGuard,
        name: "version-guard",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::NetworkDiscovery,
        name: "network-discovery",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::MeshJoin,
        name: "mesh-join",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::RuntimeConfig,
        name: "runtime-config",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::ManifestInjection,
        name: "manifest-injection",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::ServiceStart,
        name: "service-start",
        severity: Severity::Fatal,
    },
    PhaseSpec {
        id: PhaseId::ReadinessProbe,
        name: "readiness-probe",
        severity: Severity::Advisory,
    },
    PhaseSpec {
        id: PhaseId::TaintFinalize,
        name: "taint-finalize",
        severity: Severity::Advisory,
    },
];

impl PhaseSpec {
    /// Whether the phase runs for this node.
    pub fn applies(&self, cfg: &NodeConfig) -> bool {
        match self.id {
            PhaseId::ManifestInjection | PhaseId::TaintFinalize => cfg.role == NodeRole::Server,
            // The init server has nothing to probe: the load balancer has no
            // healthy backend until this very node finishes starting.
            PhaseId::ReadinessProbe => !cfg.is_init,
            _ => true,
        }
    }

    async fn run(&self, cfg: &mut NodeConfig) -> anyhow::Result<()> {
        match self.id {
            PhaseId::VersionGuard => Ok(cfg.validate_versions()?),
            PhaseId::NetworkDiscovery => network::discover(cfg).await,
            PhaseId::MeshJoin => mesh::join(cfg).await,
            PhaseId::RuntimeConfig => runtime::configure(cfg).await,
            PhaseId::ManifestInjection => manifests::inject_embedded(cfg).await,
            PhaseId::ServiceStart => service::enable_and_start(cfg.role).await,
            PhaseId::ReadinessProbe => readiness::wait_for_api(cfg).await,
            PhaseId::TaintFinalize => taints::finalize(cfg).await,
        }
    }
}

/// Run every applicable phase in order, stopping at the first fatal failure.
pub async fn run_all(cfg: &mut NodeConfig, strict: bool) -> anyhow::Result<()> {
    for spec in PHASES {
        if !spec.applies(cfg) {
            info!(phase = spec.name, "Phase not applicable, skipping");
            continue;
        }

        info!(phase = spec.name, "Phase starting");
        match spec.run(cfg).await {
            Ok(()) => info!(phase = spec.name, "Phase complete"),
            Err(e) => match spec.severity {
                Severity::Fatal => {
                    return Err(e.context(format!("phase {} failed", spec.name)));
                }
                Severity::Advisory if strict => {
                    return Err(e.context(format!(
                        "phase {} failed (advisory, promoted by --strict)",
                        spec.name
                    )));
                }
                Severity::Advisory => {
                    warn!(phase = spec.name, error = %format!("{:#}", e), "Phase failed, continuing");
                }
            },
        }
    }
    Ok(())
}
