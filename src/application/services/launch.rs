//! Instance launch: image selection, the single launch request, and the
//! bounded readiness wait.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::application::ports::{ComputeLifecycle, ImageCatalog, ImageFilter, InstanceSpec};
use crate::domain::error::LaunchError;

/// Canonical's AWS account — the only trusted image owner.
const UBUNTU_OWNER: &str = "099720109477";
const UBUNTU_NAME_PATTERN: &str = "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*";
const UBUNTU_ARCHITECTURE: &str = "x86_64";

/// Readiness poll bound: 60 attempts, 5 s apart.
pub const READY_ATTEMPTS: u32 = 60;
pub const READY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ImageRecord {
    #[serde(rename = "ImageId")]
    image_id: String,
    #[serde(rename = "CreationDate")]
    creation_date: String,
}

#[derive(Debug, Deserialize)]
struct DescribeImages {
    #[serde(rename = "Images", default)]
    images: Vec<ImageRecord>,
}

/// Find the most recently created Ubuntu 22.04 image.
///
/// # Errors
///
/// Returns [`LaunchError::NoMatchingImage`] when nothing matches — a hard
/// dependency the system cannot route around.
pub async fn find_latest_image(catalog: &impl ImageCatalog, region: &str) -> Result<String> {
    let output = catalog
        .describe_images(&ImageFilter {
            owner: UBUNTU_OWNER,
            name_pattern: UBUNTU_NAME_PATTERN,
            architecture: UBUNTU_ARCHITECTURE,
        })
        .await
        .context("querying images")?;
    anyhow::ensure!(
        output.status.success(),
        "describe-images failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut payload: DescribeImages =
        serde_json::from_slice(&output.stdout).context("parsing describe-images output")?;
    if payload.images.is_empty() {
        return Err(LaunchError::NoMatchingImage {
            region: region.to_string(),
        }
        .into());
    }

    // CreationDate is RFC 3339, so lexicographic order is chronological.
    payload
        .images
        .sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
    Ok(payload.images.remove(0).image_id)
}

/// Submit the single launch request and return the instance id.
///
/// # Errors
///
/// Returns [`LaunchError::Request`] if the provider rejects the request.
pub async fn launch_instance(
    compute: &impl ComputeLifecycle,
    spec: &InstanceSpec<'_>,
) -> Result<String> {
    let output = compute
        .run_instance(spec)
        .await
        .context("submitting launch request")?;
    if !output.status.success() {
        return Err(LaunchError::Request(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
        .into());
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).context("parsing run-instances output")?;
    payload
        .get("Instances")
        .and_then(|i| i.as_array())
        .and_then(|arr| arr.first())
        .and_then(|inst| inst.get("InstanceId"))
        .and_then(|id| id.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("run-instances output has no InstanceId"))
}

/// Wait for the instance to reach 'running' and return its public address.
///
/// Polls at a fixed interval with a bounded attempt count. A terminal state
/// fails immediately; so does 'running' without a public address — the
/// instance would be up but unreachable, which no retry can fix.
///
/// # Errors
///
/// Returns [`LaunchError::TerminatedEarly`], [`LaunchError::NoPublicAddress`],
/// or [`LaunchError::ReadinessTimeout`].
pub async fn wait_for_address(
    compute: &impl ComputeLifecycle,
    id: &str,
    attempts: u32,
    interval: Duration,
) -> Result<String> {
    for attempt in 1..=attempts {
        let output = compute
            .describe_instance(id)
            .await
            .context("querying instance state")?;
        if output.status.success() {
            let payload: serde_json::Value = serde_json::from_slice(&output.stdout)
                .context("parsing describe-instances output")?;
            match instance_state(&payload).unwrap_or("pending") {
                "running" => {
                    return public_address(&payload).map_or_else(
                        || {
                            Err(LaunchError::NoPublicAddress { id: id.to_string() }.into())
                        },
                        |ip| Ok(ip.to_string()),
                    );
                }
                state @ ("shutting-down" | "terminated") => {
                    return Err(LaunchError::TerminatedEarly {
                        id: id.to_string(),
                        state: state.to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(LaunchError::ReadinessTimeout {
        id: id.to_string(),
        seconds: u64::from(attempts) * interval.as_secs(),
    }
    .into())
}

/// Best-effort address lookup for an already-launched instance, used when
/// preserving it for debugging after a failure.
///
/// # Errors
///
/// Returns an error only if the provider call itself fails to run.
pub async fn current_address(
    compute: &impl ComputeLifecycle,
    id: &str,
) -> Result<Option<String>> {
    let output = compute
        .describe_instance(id)
        .await
        .context("querying instance address")?;
    if !output.status.success() {
        return Ok(None);
    }
    let payload: serde_json::Value = match serde_json::from_slice(&output.stdout) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    Ok(public_address(&payload).map(String::from))
}

fn first_instance(payload: &serde_json::Value) -> Option<&serde_json::Value> {
    payload
        .get("Reservations")?
        .as_array()?
        .first()?
        .get("Instances")?
        .as_array()?
        .first()
}

fn instance_state(payload: &serde_json::Value) -> Option<&str> {
    first_instance(payload)?.get("State")?.get("Name")?.as_str()
}

fn public_address(payload: &serde_json::Value) -> Option<&str> {
    first_instance(payload)?.get("PublicIpAddress")?.as_str()
}
