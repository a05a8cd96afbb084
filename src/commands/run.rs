//! The `run` command — validates arguments, wires production adapters, and
//! drives the download pipeline.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::application::services::pipeline::{self, Waits};
use crate::cli::Cli;
use crate::domain::aoi::AoiSource;
use crate::domain::error::RemoteJobFailure;
use crate::domain::job::{OutputLocation, RunPlan};
use crate::infra::aws::AwsCli;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::ssh::SshSession;
use crate::output::reporter::TerminalReporter;
use crate::output::OutputContext;

/// Execute a download job end to end.
///
/// # Errors
///
/// Returns an error on invalid arguments, any pipeline failure, or a job
/// that reached a terminal status other than success.
pub async fn run(ctx: &OutputContext, cli: Cli) -> Result<()> {
    let plan = build_plan(&cli)?;

    let provider = AwsCli::new(TokioCommandRunner::default(), plan.region.clone());
    let remote = SshSession::new(TokioCommandRunner::default());
    let reporter = TerminalReporter::new(ctx);
    let mut stdout = std::io::stdout();

    let report = pipeline::run_job(
        &provider,
        &remote,
        &reporter,
        &mut stdout,
        &plan,
        &Waits::default(),
    )
    .await?;

    if report.verdict.succeeded() {
        ctx.success("download complete");
        ctx.kv("output", &plan.output.uri);
        Ok(())
    } else {
        Err(RemoteJobFailure(report.verdict.token).into())
    }
}

/// Turn raw CLI arguments into a validated plan. Local AOI paths must exist
/// before any cloud call is made.
fn build_plan(cli: &Cli) -> Result<RunPlan> {
    let aoi = AoiSource::parse(&cli.aoi);
    if let AoiSource::Local(path) = &aoi {
        if !path.exists() {
            bail!("AOI file not found: {}", path.display());
        }
    }

    let output = OutputLocation::parse(&cli.s3_output)
        .with_context(|| format!("invalid --s3-output '{}'", cli.s3_output))?;

    Ok(RunPlan {
        aoi,
        output,
        products: cli.products.clone(),
        year: cli.year.clone(),
        resolution: cli.resolution.clone(),
        repo_url: cli.repo_url.clone(),
        region: cli.region.clone(),
        instance_type: cli.instance_type.clone(),
        volume_size_gb: cli.volume_size,
        key_name: cli.key_name.clone(),
        key_path: expand_tilde(&cli.ssh_key),
        preserve_on_success: cli.no_terminate,
    })
}

/// Expand a bare `~` or leading `~/` against the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use clap::Parser as _;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["ea-lidar"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn plan_rejects_missing_local_aoi() {
        let cli = cli(&["/no/such/site.shp", "--s3-output", "s3://b/out/"]);
        let err = build_plan(&cli).expect_err("missing file");
        assert!(err.to_string().contains("AOI file not found"));
    }

    #[test]
    fn plan_rejects_non_s3_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shp = dir.path().join("site.shp");
        std::fs::write(&shp, b"shp").expect("write");

        let cli = cli(&[
            shp.to_str().expect("utf8 path"),
            "--s3-output",
            "http://b/out/",
        ]);
        let err = build_plan(&cli).expect_err("bad scheme");
        assert!(err.to_string().contains("invalid --s3-output"));
    }

    #[test]
    fn plan_accepts_remote_aoi_without_local_file() {
        let cli = cli(&["s3://bucket/aoi/site.shp", "--s3-output", "s3://b/out/"]);
        let plan = build_plan(&cli).expect("plan");
        assert!(matches!(plan.aoi, AoiSource::Remote(_)));
        assert_eq!(plan.output.bucket, "b");
    }

    #[test]
    fn tilde_expands_against_home() {
        let expanded = expand_tilde("~/.ssh/ea-lidar-key.pem");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/ea-lidar-key.pem"));
            assert_eq!(expand_tilde("~"), home);
        }
        assert_eq!(expand_tilde("/abs/key.pem"), PathBuf::from("/abs/key.pem"));
    }
}
