//! Port trait definitions for the application layer.
//!
//! Ports are the interfaces infrastructure must fulfill — one narrow trait
//! per provider concern, so the orchestration services can be tested against
//! in-memory fakes. This file imports only from `crate::domain`.
//!
//! Methods return the raw `std::process::Output` of the underlying provider
//! call; services check exit status and parse the JSON payloads themselves.

use std::path::Path;
use std::process::Output;

use anyhow::Result;

// ── Value types ───────────────────────────────────────────────────────────────

/// Machine image selection criteria.
pub struct ImageFilter<'a> {
    /// Image owner account, e.g. Canonical's `"099720109477"`.
    pub owner: &'a str,
    /// Image name glob, e.g. `"ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*"`.
    pub name_pattern: &'a str,
    /// CPU architecture, e.g. `"x86_64"`.
    pub architecture: &'a str,
}

/// Launch parameters for a single instance request. Struct-based to avoid
/// breaking test doubles on future parameter additions.
pub struct InstanceSpec<'a> {
    pub image_id: &'a str,
    pub instance_type: &'a str,
    pub key_name: &'a str,
    pub security_group_id: &'a str,
    pub instance_profile: &'a str,
    /// Rendered boot payload, attached as opaque instance metadata.
    pub user_data: &'a str,
    /// Root volume size in GB.
    pub volume_size_gb: u32,
}

/// SSH endpoint for a reachable instance.
pub struct SshTarget<'a> {
    pub host: &'a str,
    pub key_path: &'a Path,
}

// ── Provider port traits ──────────────────────────────────────────────────────

/// Machine image lookup.
#[allow(async_fn_in_trait)]
pub trait ImageCatalog {
    /// Query available images matching `filter`.
    async fn describe_images(&self, filter: &ImageFilter<'_>) -> Result<Output>;
}

/// SSH credential pair management.
#[allow(async_fn_in_trait)]
pub trait KeyPairs {
    /// Query the provider for a key pair by name. A non-success exit with a
    /// not-found error on stderr means the pair is absent.
    async fn describe_key_pair(&self, name: &str) -> Result<Output>;

    /// Create a new key pair; stdout carries the private key material.
    async fn create_key_pair(&self, name: &str) -> Result<Output>;
}

/// Inbound network rule management. Rules are created fresh per run and
/// never deleted by this system.
#[allow(async_fn_in_trait)]
pub trait NetworkRules {
    /// Create a security group; stdout carries the group id.
    async fn create_security_group(&self, name: &str, description: &str) -> Result<Output>;

    /// Open a single TCP port to the world on the given group.
    async fn authorize_ingress(&self, group_id: &str, port: u16) -> Result<Output>;
}

/// Execution identity management (role, inline policy, instance profile).
/// All creation calls are expected to tolerate "already exists".
#[allow(async_fn_in_trait)]
pub trait IdentityManager {
    async fn create_role(&self, name: &str, trust_policy: &str, description: &str)
        -> Result<Output>;

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<Output>;

    async fn create_instance_profile(&self, name: &str) -> Result<Output>;

    async fn add_role_to_profile(&self, profile: &str, role: &str) -> Result<Output>;
}

/// Compute instance lifecycle: launch, inspect, terminate.
#[allow(async_fn_in_trait)]
pub trait ComputeLifecycle {
    /// Submit exactly one instance request; stdout carries the instance id.
    async fn run_instance(&self, spec: &InstanceSpec<'_>) -> Result<Output>;

    /// Query the instance's state and addressing.
    async fn describe_instance(&self, id: &str) -> Result<Output>;

    /// Terminate the instance.
    async fn terminate_instance(&self, id: &str) -> Result<Output>;
}

/// Composite trait — any type implementing all five provider concerns is a
/// `CloudProvider`.
pub trait CloudProvider:
    ImageCatalog + KeyPairs + NetworkRules + IdentityManager + ComputeLifecycle
{
}

impl<T> CloudProvider for T where
    T: ImageCatalog + KeyPairs + NetworkRules + IdentityManager + ComputeLifecycle
{
}

// ── Remote access ports ───────────────────────────────────────────────────────

/// Command execution on the instance over the remote-execution channel.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run `command` on the target, capturing output. A non-success exit is
    /// returned to the caller, not treated as an `Err`.
    async fn exec(&self, target: &SshTarget<'_>, command: &str) -> Result<Output>;
}

/// Host-to-instance file copy.
#[allow(async_fn_in_trait)]
pub trait FileTransfer {
    /// Copy a single local file to `remote_path` on the target.
    async fn copy_to(
        &self,
        target: &SshTarget<'_>,
        local: &Path,
        remote_path: &str,
    ) -> Result<Output>;
}

// ── Progress reporting port ───────────────────────────────────────────────────

/// Abstracts progress narration so services can emit events without
/// depending on the presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
