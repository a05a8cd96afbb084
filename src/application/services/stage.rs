//! Payload staging: connection probing and AOI bundle upload.
//!
//! The instance has usually just finished booting when staging starts, so
//! the SSH daemon may legitimately refuse connections for a while — the
//! probe retries a bounded number of times at a fixed interval.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{FileTransfer, ProgressReporter, RemoteShell, SshTarget};
use crate::domain::aoi::{discover_bundle, REMOTE_AOI_BASE};
use crate::domain::error::StageError;

/// Connection probe bound: 10 attempts, 10 s apart.
pub const CONNECT_ATTEMPTS: u32 = 10;
pub const CONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Upload the AOI bundle at `aoi_path` to the instance.
///
/// Discovery runs before any network attempt, so an empty bundle fails
/// without touching the instance. Each present sidecar file is copied to
/// the fixed remote base, keeping its extension.
///
/// Returns the number of files uploaded.
///
/// # Errors
///
/// Returns [`StageError::EmptyBundle`] when no sidecar file exists,
/// [`StageError::ConnectExhausted`] when the probe retries run out, or
/// [`StageError::Transfer`] when a copy fails.
pub async fn stage(
    remote: &(impl RemoteShell + FileTransfer),
    target: &SshTarget<'_>,
    aoi_path: &Path,
    attempts: u32,
    interval: Duration,
    reporter: &impl ProgressReporter,
) -> Result<usize> {
    let files = discover_bundle(aoi_path);
    if files.is_empty() {
        return Err(StageError::EmptyBundle {
            path: aoi_path.to_path_buf(),
        }
        .into());
    }

    wait_for_connection(remote, target, attempts, interval, reporter).await?;

    for file in &files {
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let remote_path = format!("{REMOTE_AOI_BASE}.{ext}");
        reporter.step(&format!("uploading {} -> {remote_path}", file.display()));
        let output = remote
            .copy_to(target, file, &remote_path)
            .await
            .with_context(|| format!("copying {}", file.display()))?;
        if !output.status.success() {
            return Err(StageError::Transfer {
                file: file.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
    }
    Ok(files.len())
}

/// Probe SSH connectivity until the remote side accepts a trivial command.
///
/// # Errors
///
/// Returns [`StageError::ConnectExhausted`] after the attempt bound.
pub async fn wait_for_connection(
    shell: &impl RemoteShell,
    target: &SshTarget<'_>,
    attempts: u32,
    interval: Duration,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let mut last_reason = String::new();
    for attempt in 1..=attempts {
        match shell.exec(target, "true").await {
            Ok(output) if output.status.success() => return Ok(()),
            Ok(output) => {
                last_reason = String::from_utf8_lossy(&output.stderr).into_owned();
            }
            Err(e) => last_reason = e.to_string(),
        }
        if attempt < attempts {
            reporter.step(&format!("connection attempt {attempt} failed, retrying..."));
            tokio::time::sleep(interval).await;
        }
    }
    Err(StageError::ConnectExhausted {
        host: target.host.to_string(),
        attempts,
        reason: last_reason,
    }
    .into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;
    use std::process::Output;

    use anyhow::Result;

    use super::*;
    use crate::application::services::test_support::{fail_output, ok_output};

    struct ReporterStub;
    impl ProgressReporter for ReporterStub {
        fn step(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warn(&self, _: &str) {}
    }

    /// Fake remote side: scripted connection probes, recorded uploads.
    struct RemoteFake {
        probe_failures: Cell<u32>,
        uploads: RefCell<Vec<(PathBuf, String)>>,
        copy_fails: bool,
    }

    impl RemoteFake {
        fn new(probe_failures: u32) -> Self {
            Self {
                probe_failures: Cell::new(probe_failures),
                uploads: RefCell::new(Vec::new()),
                copy_fails: false,
            }
        }
    }

    impl RemoteShell for RemoteFake {
        async fn exec(&self, _: &SshTarget<'_>, _: &str) -> Result<Output> {
            let left = self.probe_failures.get();
            if left > 0 {
                self.probe_failures.set(left - 1);
                return Ok(fail_output(b"Connection refused"));
            }
            Ok(ok_output(b""))
        }
    }

    impl FileTransfer for RemoteFake {
        async fn copy_to(
            &self,
            _: &SshTarget<'_>,
            local: &Path,
            remote_path: &str,
        ) -> Result<Output> {
            if self.copy_fails {
                return Ok(fail_output(b"scp: permission denied"));
            }
            self.uploads
                .borrow_mut()
                .push((local.to_path_buf(), remote_path.to_string()));
            Ok(ok_output(b""))
        }
    }

    fn target(key: &Path) -> SshTarget<'_> {
        SshTarget {
            host: "203.0.113.9",
            key_path: key,
        }
    }

    #[tokio::test]
    async fn uploads_exactly_the_present_subset() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        for ext in ["shp", "shx", "dbf"] {
            std::fs::write(dir.path().join(format!("aoi.{ext}")), b"x").expect("write");
        }
        let remote = RemoteFake::new(0);
        let key = dir.path().join("key.pem");
        let n = stage(
            &remote,
            &target(&key),
            &dir.path().join("aoi.shp"),
            3,
            Duration::ZERO,
            &ReporterStub,
        )
        .await
        .expect("stage");

        assert_eq!(n, 3);
        let uploads = remote.uploads.borrow();
        let remotes: Vec<_> = uploads.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(remotes, vec!["/tmp/aoi.shp", "/tmp/aoi.shx", "/tmp/aoi.dbf"]);
    }

    #[tokio::test]
    async fn empty_bundle_fails_before_any_network_attempt() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let remote = RemoteFake::new(0);
        let key = dir.path().join("key.pem");
        let err = stage(
            &remote,
            &target(&key),
            &dir.path().join("absent.shp"),
            3,
            Duration::ZERO,
            &ReporterStub,
        )
        .await
        .expect_err("must fail");
        assert!(err.to_string().contains("no shapefile components"));
        assert!(remote.uploads.borrow().is_empty());
        // The probe counter is untouched: no exec call happened.
        assert_eq!(remote.probe_failures.get(), 0);
    }

    #[tokio::test]
    async fn probe_retries_through_early_refusals() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("aoi.shp"), b"x").expect("write");
        let remote = RemoteFake::new(4);
        let key = dir.path().join("key.pem");
        let n = stage(
            &remote,
            &target(&key),
            &dir.path().join("aoi.shp"),
            10,
            Duration::ZERO,
            &ReporterStub,
        )
        .await
        .expect("stage");
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn probe_exhaustion_is_permanent() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("aoi.shp"), b"x").expect("write");
        let remote = RemoteFake::new(100);
        let key = dir.path().join("key.pem");
        let err = stage(
            &remote,
            &target(&key),
            &dir.path().join("aoi.shp"),
            5,
            Duration::ZERO,
            &ReporterStub,
        )
        .await
        .expect_err("must fail");
        assert!(err.to_string().contains("after 5 attempts"));
        assert!(remote.uploads.borrow().is_empty());
    }

    #[tokio::test]
    async fn copy_failure_is_a_transfer_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("aoi.shp"), b"x").expect("write");
        let remote = RemoteFake {
            probe_failures: Cell::new(0),
            uploads: RefCell::new(Vec::new()),
            copy_fails: true,
        };
        let key = dir.path().join("key.pem");
        let err = stage(
            &remote,
            &target(&key),
            &dir.path().join("aoi.shp"),
            3,
            Duration::ZERO,
            &ReporterStub,
        )
        .await
        .expect_err("must fail");
        assert!(err.to_string().contains("failed to upload"));
    }
}
