//! Job monitoring: poll the instance for log output and the terminal status
//! marker.
//!
//! The monitor is a boolean oracle, not a diagnostic channel — it reports
//! whether the marker equals the success token and nothing more. It fetches
//! log lines by delta (remote line count, then `tail`/`head` for the new
//! range) instead of holding a streaming connection, trading latency for
//! robustness against connection drops: a failed read is just "no news this
//! tick".

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{RemoteShell, SshTarget};
use crate::domain::job::{JobVerdict, BOOTSTRAP_LOG, STATUS_FILE};

/// Poll timing for the monitor's two phases.
pub struct MonitorConfig {
    /// Bounded wait for the log file to appear; exhausting it is not fatal
    /// (the job may simply log late).
    pub log_wait_attempts: u32,
    pub log_wait_interval: Duration,
    /// Fixed interval between streaming polls.
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_wait_attempts: 30,
            log_wait_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Observe the remote job until its status marker is non-empty.
///
/// New log lines are written to `out` as they appear; each line is printed
/// exactly once (fetched range is `[last+1, current]`). On the first
/// non-empty marker, any final unseen lines are drained before returning.
///
/// No internal timeout — this blocks as long as the job runs; the caller
/// may wrap it with one.
///
/// # Errors
///
/// Returns an error if the remote-execution channel cannot be spawned or
/// `out` cannot be written.
pub async fn watch_job(
    shell: &impl RemoteShell,
    target: &SshTarget<'_>,
    cfg: &MonitorConfig,
    out: &mut impl std::io::Write,
) -> Result<JobVerdict> {
    // Phase 1: wait (bounded) for the log file to exist, then proceed
    // regardless.
    for attempt in 1..=cfg.log_wait_attempts {
        let probe = remote_stdout(shell, target, &format!("test -f {BOOTSTRAP_LOG} && echo exists"))
            .await?;
        if probe.trim() == "exists" {
            break;
        }
        if attempt < cfg.log_wait_attempts {
            tokio::time::sleep(cfg.log_wait_interval).await;
        }
    }

    // Phase 2: stream by delta until the marker turns up.
    let mut last_line_count: u64 = 0;
    loop {
        let status = remote_stdout(shell, target, &format!("cat {STATUS_FILE} 2>/dev/null"))
            .await?
            .trim()
            .to_string();

        if !status.is_empty() {
            // Terminal: drain whatever the last poll missed.
            let remaining = remote_stdout(
                shell,
                target,
                &format!("tail -n +{} {BOOTSTRAP_LOG} 2>/dev/null", last_line_count + 1),
            )
            .await?;
            if !remaining.is_empty() {
                out.write_all(remaining.as_bytes())
                    .context("writing remote log output")?;
            }
            return Ok(JobVerdict { token: status });
        }

        let current_line_count = remote_stdout(
            shell,
            target,
            &format!("wc -l < {BOOTSTRAP_LOG} 2>/dev/null"),
        )
        .await?
        .trim()
        .parse::<u64>()
        .unwrap_or(0);

        if current_line_count > last_line_count {
            let new_lines = remote_stdout(
                shell,
                target,
                &format!(
                    "tail -n +{} {BOOTSTRAP_LOG} 2>/dev/null | head -n {}",
                    last_line_count + 1,
                    current_line_count - last_line_count
                ),
            )
            .await?;
            if !new_lines.is_empty() {
                out.write_all(new_lines.as_bytes())
                    .context("writing remote log output")?;
            }
            last_line_count = current_line_count;
        }

        tokio::time::sleep(cfg.poll_interval).await;
    }
}

/// Run a remote command and return its stdout. A non-success exit (missing
/// file, dropped connection) reads as empty output; only a failure to run
/// the channel at all propagates.
async fn remote_stdout(
    shell: &impl RemoteShell,
    target: &SshTarget<'_>,
    command: &str,
) -> Result<String> {
    let output = shell.exec(target, command).await.context("remote exec")?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::process::Output;

    use anyhow::Result;

    use super::*;
    use crate::application::services::test_support::{fail_output, ok_output};

    fn cfg() -> MonitorConfig {
        MonitorConfig {
            log_wait_attempts: 2,
            log_wait_interval: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }

    fn target(key: &Path) -> SshTarget<'_> {
        SshTarget {
            host: "203.0.113.9",
            key_path: key,
        }
    }

    /// Simulated remote job: a log that grows between polls and a marker
    /// that appears after a fixed number of status checks.
    struct RemoteJob {
        log_lines: RefCell<Vec<String>>,
        grow_per_poll: Vec<String>,
        status_after_checks: usize,
        status_checks: RefCell<usize>,
        token: String,
        log_exists: bool,
    }

    impl RemoteJob {
        fn new(token: &str, initial: &[&str], grow: &[&str], status_after: usize) -> Self {
            Self {
                log_lines: RefCell::new(initial.iter().map(ToString::to_string).collect()),
                grow_per_poll: grow.iter().map(ToString::to_string).collect(),
                status_after_checks: status_after,
                status_checks: RefCell::new(0),
                token: token.to_string(),
                log_exists: true,
            }
        }

        fn log_text(&self, from: u64, limit: Option<u64>) -> String {
            let lines = self.log_lines.borrow();
            let start = usize::try_from(from.saturating_sub(1)).expect("usize");
            let slice: Vec<_> = match limit {
                Some(n) => lines
                    .iter()
                    .skip(start)
                    .take(usize::try_from(n).expect("usize"))
                    .cloned()
                    .collect(),
                None => lines.iter().skip(start).cloned().collect(),
            };
            if slice.is_empty() {
                String::new()
            } else {
                slice.join("\n") + "\n"
            }
        }
    }

    impl RemoteShell for RemoteJob {
        async fn exec(&self, _: &SshTarget<'_>, command: &str) -> Result<Output> {
            if command.starts_with("test -f") {
                return Ok(if self.log_exists {
                    ok_output(b"exists\n")
                } else {
                    fail_output(b"")
                });
            }
            if command.starts_with("cat") {
                let mut checks = self.status_checks.borrow_mut();
                *checks += 1;
                if *checks > self.status_after_checks {
                    return Ok(ok_output(format!("{}\n", self.token).as_bytes()));
                }
                // Marker absent: grow the log so the next count poll sees
                // new lines.
                for line in &self.grow_per_poll {
                    self.log_lines.borrow_mut().push(line.clone());
                }
                return Ok(fail_output(b""));
            }
            if command.starts_with("wc -l") {
                let count = self.log_lines.borrow().len();
                return Ok(ok_output(format!("{count}\n").as_bytes()));
            }
            if let Some(rest) = command.strip_prefix("tail -n +") {
                let from: u64 = rest
                    .split_whitespace()
                    .next()
                    .expect("tail arg")
                    .parse()
                    .expect("tail line number");
                let limit = rest
                    .split("head -n ")
                    .nth(1)
                    .map(|n| n.trim().parse::<u64>().expect("head count"));
                return Ok(ok_output(self.log_text(from, limit).as_bytes()));
            }
            anyhow::bail!("unexpected command: {command}")
        }
    }

    #[tokio::test]
    async fn success_token_yields_true_verdict() {
        let job = RemoteJob::new("SUCCESS", &["boot"], &[], 0);
        let dir = tempfile::TempDir::new().expect("tempdir");
        let key = dir.path().join("k");
        let mut out = Vec::new();
        let verdict = watch_job(&job, &target(&key), &cfg(), &mut out)
            .await
            .expect("watch");
        assert!(verdict.succeeded());
        assert_eq!(String::from_utf8(out).expect("utf8"), "boot\n");
    }

    #[tokio::test]
    async fn any_other_token_yields_false_verdict() {
        let job = RemoteJob::new("FAILURE", &[], &[], 0);
        let dir = tempfile::TempDir::new().expect("tempdir");
        let key = dir.path().join("k");
        let mut out = Vec::new();
        let verdict = watch_job(&job, &target(&key), &cfg(), &mut out)
            .await
            .expect("watch");
        assert!(!verdict.succeeded());
        assert_eq!(verdict.token, "FAILURE");
    }

    #[tokio::test]
    async fn polls_never_reprint_or_skip_lines() {
        // Three polls without a marker, two new lines each, then SUCCESS.
        let job = RemoteJob::new(
            "SUCCESS",
            &["l1", "l2"],
            &["x", "y"],
            3,
        );
        let dir = tempfile::TempDir::new().expect("tempdir");
        let key = dir.path().join("k");
        let mut out = Vec::new();
        watch_job(&job, &target(&key), &cfg(), &mut out)
            .await
            .expect("watch");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<_> = text.lines().collect();
        // Every line of the final log, exactly once, in order.
        let expected: Vec<String> = job.log_lines.borrow().clone();
        assert_eq!(lines, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn missing_log_file_is_not_fatal() {
        let mut job = RemoteJob::new("SUCCESS", &[], &[], 0);
        job.log_exists = false;
        let dir = tempfile::TempDir::new().expect("tempdir");
        let key = dir.path().join("k");
        let mut out = Vec::new();
        let verdict = watch_job(&job, &target(&key), &cfg(), &mut out)
            .await
            .expect("watch");
        assert!(verdict.succeeded());
    }

    #[tokio::test]
    async fn does_not_return_before_marker_is_nonempty() {
        // Marker appears only after 5 status checks; the monitor must keep
        // polling until then.
        let job = RemoteJob::new("SUCCESS", &["a"], &[], 5);
        let dir = tempfile::TempDir::new().expect("tempdir");
        let key = dir.path().join("k");
        let mut out = Vec::new();
        watch_job(&job, &target(&key), &cfg(), &mut out)
            .await
            .expect("watch");
        assert_eq!(*job.status_checks.borrow(), 6);
    }
}
