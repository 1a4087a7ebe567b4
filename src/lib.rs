//! nodeup - first-boot K3s node bootstrap over a Tailscale overlay.
//!
//! Converges a freshly booted VM into a cluster member: joins the private
//! overlay network, renders the role-specific runtime configuration,
//! injects the baseline workload manifests (server role), starts the
//! runtime service, probes API readiness, and clears scheduling taints.
//! Single pass; safe to re-run after a failure since every phase is
//! idempotent.

pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifests;
pub mod mesh;
pub mod network;
pub mod phase;
pub mod readiness;
pub mod runtime;
pub mod service;
pub mod taints;
