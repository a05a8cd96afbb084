//! Resource provisioning: SSH key pair, network ingress rule, execution
//! identity.
//!
//! The key pair is the only resource reused across runs. The security group
//! and IAM role carry a timestamp in their names and are minted fresh each
//! run; neither is ever deleted by this system.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{IdentityManager, KeyPairs, NetworkRules, ProgressReporter};
use crate::domain::error::ProvisionError;
use crate::domain::job::OutputLocation;

/// Fixed settle delay after attaching the execution identity. IAM
/// propagation is eventually consistent and the provider exposes no
/// synchronous readiness signal, so this is a sleep, not a poll.
pub const IDENTITY_SETTLE: Duration = Duration::from_secs(10);

/// The single inbound port opened for the run.
const SSH_PORT: u16 = 22;

/// Everything the provisioner needs from the run plan.
pub struct ProvisionRequest<'a> {
    pub key_name: &'a str,
    pub key_path: &'a Path,
    pub output: &'a OutputLocation,
}

/// Handles to the provisioned resources, ready for launch.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub key_path: PathBuf,
    pub security_group_id: String,
    pub instance_profile: String,
}

/// Run all three provisioning steps and wait out the identity settle delay.
///
/// # Errors
///
/// Returns a [`ProvisionError`] naming the offending resource.
pub async fn provision(
    provider: &(impl KeyPairs + NetworkRules + IdentityManager),
    reporter: &impl ProgressReporter,
    req: &ProvisionRequest<'_>,
    settle: Duration,
) -> Result<Provisioned> {
    reporter.step(&format!("ensuring key pair '{}'...", req.key_name));
    let key_path = ensure_key_pair(provider, req.key_name, req.key_path).await?;

    reporter.step("creating security group...");
    let security_group_id = create_ingress_rule(provider).await?;
    reporter.success(&format!("security group {security_group_id}"));

    reporter.step("creating IAM role...");
    let instance_profile = create_execution_identity(provider, &req.output.bucket).await?;
    // Launch must not see the profile before propagation settles.
    tokio::time::sleep(settle).await;
    reporter.success(&format!("instance profile {instance_profile}"));

    Ok(Provisioned {
        key_path,
        security_group_id,
        instance_profile,
    })
}

/// Ensure the named key pair exists in the provider and its private key
/// exists locally.
///
/// Performs no remote mutation when the pair already exists. If the pair
/// exists remotely but the local file is gone, fails fast — the private
/// material cannot be reconstructed, and generating a second pair would
/// leave an unusable credential.
///
/// # Errors
///
/// Returns [`ProvisionError::KeyFileMissing`] or [`ProvisionError::KeyPair`].
pub async fn ensure_key_pair(
    kp: &impl KeyPairs,
    name: &str,
    key_path: &Path,
) -> Result<PathBuf> {
    let output = kp
        .describe_key_pair(name)
        .await
        .context("querying key pair")?;

    if output.status.success() {
        if key_path.exists() {
            return Ok(key_path.to_path_buf());
        }
        return Err(ProvisionError::KeyFileMissing {
            name: name.to_string(),
            path: key_path.to_path_buf(),
        }
        .into());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.contains("InvalidKeyPair.NotFound") {
        return Err(ProvisionError::KeyPair {
            name: name.to_string(),
            reason: stderr.into_owned(),
        }
        .into());
    }

    let created = kp.create_key_pair(name).await.context("creating key pair")?;
    if !created.status.success() {
        return Err(ProvisionError::KeyPair {
            name: name.to_string(),
            reason: String::from_utf8_lossy(&created.stderr).into_owned(),
        }
        .into());
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&created.stdout).context("parsing create-key-pair output")?;
    let material = payload
        .get("KeyMaterial")
        .and_then(|m| m.as_str())
        .ok_or_else(|| anyhow::anyhow!("create-key-pair output has no KeyMaterial"))?;

    write_key_file(key_path, material)?;
    Ok(key_path.to_path_buf())
}

/// Write private key material to `path` with owner-only permissions.
///
/// The file is created with mode 600 from the start, so no partial or
/// world-readable key file can exist at any point. Parent directories are
/// created as needed.
///
/// # Errors
///
/// Returns an error if directory or file creation fails.
pub fn write_key_file(path: &Path, material: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    // Replace any stale file so create_new applies the mode atomically.
    if path.exists() {
        std::fs::remove_file(path).with_context(|| format!("remove stale {}", path.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(material.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Create a fresh security group opening SSH to the world.
///
/// The open source range is a documented insecure default; the group name
/// carries a timestamp to avoid collisions with concurrent runs, and the
/// group is intentionally never deleted.
///
/// # Errors
///
/// Returns [`ProvisionError::NetworkRule`] if creation or the ingress
/// authorization fails.
pub async fn create_ingress_rule(net: &impl NetworkRules) -> Result<String> {
    let name = format!("ea-lidar-sg-{}", chrono::Utc::now().timestamp());
    let output = net
        .create_security_group(&name, "Security group for EA LIDAR download instance")
        .await
        .context("creating security group")?;
    if !output.status.success() {
        return Err(ProvisionError::NetworkRule(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
        .into());
    }

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout)
        .context("parsing create-security-group output")?;
    let group_id = payload
        .get("GroupId")
        .and_then(|g| g.as_str())
        .ok_or_else(|| anyhow::anyhow!("create-security-group output has no GroupId"))?
        .to_string();

    let auth = net
        .authorize_ingress(&group_id, SSH_PORT)
        .await
        .context("authorizing ingress")?;
    if !auth.status.success() {
        return Err(ProvisionError::NetworkRule(
            String::from_utf8_lossy(&auth.stderr).into_owned(),
        )
        .into());
    }
    Ok(group_id)
}

/// Create the execution identity: role, trust policy, inline S3 policy
/// scoped to the output bucket, and the instance profile binding.
///
/// Every creation call tolerates "already exists" so a retried run cannot
/// duplicate the identity.
///
/// # Errors
///
/// Returns [`ProvisionError::Identity`] on any non-tolerated failure.
pub async fn create_execution_identity(
    iam: &impl IdentityManager,
    bucket: &str,
) -> Result<String> {
    let name = format!("ea-lidar-role-{}", chrono::Utc::now().timestamp());

    let trust_policy = serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "ec2.amazonaws.com" },
            "Action": "sts:AssumeRole",
        }],
    })
    .to_string();

    let created = iam
        .create_role(
            &name,
            &trust_policy,
            "Role for the EA LIDAR instance to write to S3",
        )
        .await
        .context("creating IAM role")?;
    tolerate_exists(&name, &created)?;

    // Least privilege: read/write/list on exactly the output bucket.
    let s3_policy = serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": [
                "s3:PutObject",
                "s3:PutObjectAcl",
                "s3:GetObject",
                "s3:ListBucket",
            ],
            "Resource": [
                format!("arn:aws:s3:::{bucket}/*"),
                format!("arn:aws:s3:::{bucket}"),
            ],
        }],
    })
    .to_string();

    let policy = iam
        .put_role_policy(&name, "S3Access", &s3_policy)
        .await
        .context("attaching role policy")?;
    tolerate_exists(&name, &policy)?;

    let profile = iam
        .create_instance_profile(&name)
        .await
        .context("creating instance profile")?;
    tolerate_exists(&name, &profile)?;

    let bound = iam
        .add_role_to_profile(&name, &name)
        .await
        .context("binding role to instance profile")?;
    tolerate_exists(&name, &bound)?;

    Ok(name)
}

/// Treat "EntityAlreadyExists" as success; anything else non-zero is an
/// identity error.
fn tolerate_exists(name: &str, output: &std::process::Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("EntityAlreadyExists") {
        return Ok(());
    }
    Err(ProvisionError::Identity {
        name: name.to_string(),
        reason: stderr.into_owned(),
    }
    .into())
}
