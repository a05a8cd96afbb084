//! Typed domain error enums.
//!
//! One enum per pipeline phase. All types implement `thiserror::Error` and
//! convert to `anyhow::Error` via the `?` operator; the Lifecycle Controller
//! is the only place they are caught broadly.

use std::path::PathBuf;

use thiserror::Error;

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Errors creating or discovering the supporting cloud resources.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(
        "key pair '{name}' exists in AWS but the local key file was not found at \
         {path}. Provide the correct --ssh-key path or delete the key pair from \
         AWS to create a new one."
    )]
    KeyFileMissing { name: String, path: PathBuf },

    #[error("failed to create key pair '{name}': {reason}")]
    KeyPair { name: String, reason: String },

    #[error("failed to create security group: {0}")]
    NetworkRule(String),

    #[error("failed to create IAM role '{name}': {reason}")]
    Identity { name: String, reason: String },
}

// ── Launch errors ─────────────────────────────────────────────────────────────

/// Errors looking up the image, submitting the launch, or waiting for boot.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no Ubuntu 22.04 AMI found in {region}")]
    NoMatchingImage { region: String },

    #[error("failed to launch instance: {0}")]
    Request(String),

    #[error("instance {id} entered state '{state}' before reaching 'running'")]
    TerminatedEarly { id: String, state: String },

    #[error("instance {id} did not reach 'running' within {seconds}s")]
    ReadinessTimeout { id: String, seconds: u64 },

    #[error("instance {id} is running but has no public IP address")]
    NoPublicAddress { id: String },
}

// ── Staging errors ────────────────────────────────────────────────────────────

/// Errors transferring the AOI bundle to the instance.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("no shapefile components found at {path}")]
    EmptyBundle { path: PathBuf },

    #[error("failed to connect to {host} after {attempts} attempts: {reason}")]
    ConnectExhausted {
        host: String,
        attempts: u32,
        reason: String,
    },

    #[error("failed to upload {file}: {reason}")]
    Transfer { file: String, reason: String },
}

// ── Remote job failure ────────────────────────────────────────────────────────

/// The remote job's status marker reported a non-success token.
#[derive(Debug, Error)]
#[error("remote job finished with status '{0}' (instance preserved for debugging)")]
pub struct RemoteJobFailure(pub String);
