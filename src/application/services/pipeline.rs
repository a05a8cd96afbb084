//! The lifecycle controller — sequences provision → launch → stage →
//! monitor, each phase exactly once, and owns the disposition decision.
//!
//! This is the only place pipeline errors are caught broadly. Any failure
//! after launch preserves the instance and prints reconnection instructions;
//! termination happens only after a successful job, and only when the plan
//! allows it.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{
    CloudProvider, FileTransfer, InstanceSpec, ProgressReporter, RemoteShell, SshTarget,
};
use crate::application::services::{launch, monitor, provision, stage};
use crate::domain::aoi::AoiSource;
use crate::domain::bootstrap::{self, BootParams};
use crate::domain::job::{RunPlan, BOOTSTRAP_LOG, REMOTE_USER};

/// All timing knobs in one place. Production uses the fixed values from the
/// individual services; tests inject zero durations.
pub struct Waits {
    pub identity_settle: Duration,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    pub connect_attempts: u32,
    pub connect_interval: Duration,
    pub monitor: monitor::MonitorConfig,
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            identity_settle: provision::IDENTITY_SETTLE,
            ready_attempts: launch::READY_ATTEMPTS,
            ready_interval: launch::READY_INTERVAL,
            connect_attempts: stage::CONNECT_ATTEMPTS,
            connect_interval: stage::CONNECT_INTERVAL,
            monitor: monitor::MonitorConfig::default(),
        }
    }
}

/// What a completed pipeline hands back to the command layer.
#[derive(Debug)]
pub struct RunReport {
    pub verdict: crate::domain::job::JobVerdict,
    pub instance_id: String,
    pub address: String,
}

/// The instance as known so far, tracked so a mid-pipeline failure can
/// still point the operator at it.
struct LaunchedInstance {
    id: String,
    address: Option<String>,
}

/// Run the whole pipeline for one job and decide instance disposition.
///
/// # Errors
///
/// Propagates the first phase error after preserving any instance that
/// already exists. A job that runs to completion but reports failure is an
/// `Ok` report with a failed verdict — the command layer maps that to a
/// non-zero exit.
pub async fn run_job(
    provider: &impl CloudProvider,
    remote: &(impl RemoteShell + FileTransfer),
    reporter: &impl ProgressReporter,
    out: &mut impl std::io::Write,
    plan: &RunPlan,
    waits: &Waits,
) -> Result<RunReport> {
    let mut launched: Option<LaunchedInstance> = None;

    match execute(provider, remote, reporter, out, plan, waits, &mut launched).await {
        Ok(report) => {
            conclude(provider, reporter, out, plan, &report).await?;
            Ok(report)
        }
        Err(err) => {
            if let Some(instance) = launched {
                preserve_for_debugging(provider, reporter, out, plan, instance).await;
            }
            Err(err)
        }
    }
}

/// The linear phase sequence. Updates `launched` as soon as an instance
/// exists so the caller can preserve it on failure.
async fn execute(
    provider: &impl CloudProvider,
    remote: &(impl RemoteShell + FileTransfer),
    reporter: &impl ProgressReporter,
    out: &mut impl std::io::Write,
    plan: &RunPlan,
    waits: &Waits,
    launched: &mut Option<LaunchedInstance>,
) -> Result<RunReport> {
    // Phase 1: supporting resources.
    let provisioned = provision::provision(
        provider,
        reporter,
        &provision::ProvisionRequest {
            key_name: &plan.key_name,
            key_path: &plan.key_path,
            output: &plan.output,
        },
        waits.identity_settle,
    )
    .await?;

    // Phase 2: image, payload, launch, readiness.
    reporter.step("finding Ubuntu AMI...");
    let image_id = launch::find_latest_image(provider, &plan.region).await?;
    reporter.success(&format!("using AMI {image_id}"));

    let remote_aoi = plan.aoi.remote_path();
    let user_data = bootstrap::render(
        bootstrap::TEMPLATE,
        &BootParams {
            repo_url: &plan.repo_url,
            aoi_path: &remote_aoi,
            products: &plan.products,
            year: &plan.year,
            resolution: &plan.resolution,
            s3_output: &plan.output.uri,
        },
    )
    .context("rendering boot payload")?;

    reporter.step("launching instance...");
    let instance_id = launch::launch_instance(
        provider,
        &InstanceSpec {
            image_id: &image_id,
            instance_type: &plan.instance_type,
            key_name: &plan.key_name,
            security_group_id: &provisioned.security_group_id,
            instance_profile: &provisioned.instance_profile,
            user_data: &user_data,
            volume_size_gb: plan.volume_size_gb,
        },
    )
    .await?;
    *launched = Some(LaunchedInstance {
        id: instance_id.clone(),
        address: None,
    });
    reporter.success(&format!("launched instance {instance_id}"));

    reporter.step("waiting for instance to be running...");
    let address =
        launch::wait_for_address(provider, &instance_id, waits.ready_attempts, waits.ready_interval)
            .await?;
    if let Some(instance) = launched.as_mut() {
        instance.address = Some(address.clone());
    }
    reporter.success(&format!("instance running at {address}"));

    let target = SshTarget {
        host: &address,
        key_path: &provisioned.key_path,
    };

    // Phase 3: staging, only for local inputs — a remote AOI is fetched by
    // the boot payload itself.
    if let AoiSource::Local(aoi_path) = &plan.aoi {
        reporter.step(&format!("uploading AOI files to {address}..."));
        let uploaded = stage::stage(
            remote,
            &target,
            aoi_path,
            waits.connect_attempts,
            waits.connect_interval,
            reporter,
        )
        .await?;
        reporter.success(&format!("uploaded {uploaded} files"));
    }

    // Phase 4: monitoring.
    reporter.step("monitoring job progress...");
    reporter.step(&format!(
        "you can also connect and run: tail -f {BOOTSTRAP_LOG}"
    ));
    let verdict = monitor::watch_job(remote, &target, &waits.monitor, out).await?;

    Ok(RunReport {
        verdict,
        instance_id,
        address,
    })
}

/// Disposition after a job that reached a terminal marker.
async fn conclude(
    provider: &impl CloudProvider,
    reporter: &impl ProgressReporter,
    out: &mut impl std::io::Write,
    plan: &RunPlan,
    report: &RunReport,
) -> Result<()> {
    if report.verdict.succeeded() {
        reporter.success("job completed successfully");
        if plan.preserve_on_success {
            reporter.warn(&format!(
                "instance {} left running (--no-terminate)",
                report.instance_id
            ));
        } else {
            reporter.step(&format!("terminating instance {}...", report.instance_id));
            let output = provider
                .terminate_instance(&report.instance_id)
                .await
                .context("terminating instance")?;
            anyhow::ensure!(
                output.status.success(),
                "failed to terminate instance {}: {}",
                report.instance_id,
                String::from_utf8_lossy(&output.stderr)
            );
            reporter.success("instance terminated");
        }
        return Ok(());
    }

    // Failure: never terminate — the instance is the only diagnostic
    // artifact there is.
    reporter.warn(&format!("job finished with status '{}'", report.verdict.token));
    reporter.warn(&format!(
        "instance {} left running for debugging",
        report.instance_id
    ));
    writeln!(
        out,
        "Connect with: ssh -i {} {REMOTE_USER}@{}",
        plan.key_path.display(),
        report.address
    )
    .context("writing reconnection hint")?;
    Ok(())
}

/// Best-effort preservation after a phase error: re-query the address if it
/// was never learned, and point the operator at the machine. Never fails —
/// the original error is what must surface.
async fn preserve_for_debugging(
    provider: &impl CloudProvider,
    reporter: &impl ProgressReporter,
    out: &mut impl std::io::Write,
    plan: &RunPlan,
    instance: LaunchedInstance,
) {
    reporter.warn(&format!(
        "instance {} left running for debugging",
        instance.id
    ));
    let address = match instance.address {
        Some(addr) => Some(addr),
        None => launch::current_address(provider, &instance.id)
            .await
            .ok()
            .flatten(),
    };
    if let Some(addr) = address {
        let _ = writeln!(
            out,
            "Connect with: ssh -i {} {REMOTE_USER}@{addr}",
            plan.key_path.display()
        );
    }
}
