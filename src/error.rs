//! Custom error types for nodeup.

use std::process::ExitStatus;
use thiserror::Error;

/// Errors that can occur while converging a node.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("component versions are missing: {0}")]
    MissingVersions(String),

    #[error("missing required flag for {role} role: --{flag}")]
    MissingFlag { role: &'static str, flag: &'static str },

    #[error("--init is only valid for the server role")]
    InitOnAgent,

    #[error("no ethernet interface found")]
    NoEthernetInterface,

    #[error("timed out waiting for an IPv4 address on {0} (check cloud-init logs)")]
    AddressTimeout(String),

    #[error("{0} has not been discovered yet")]
    AddressNotDiscovered(&'static str),

    #[error("failed to spawn `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("failed to render manifest {name}: {source}")]
    ManifestRender {
        name: String,
        #[source]
        source: tera::Error,
    },

    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
