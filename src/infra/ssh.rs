//! SSH transport — remote execution and file transfer over the system
//! `ssh`/`scp` binaries.

use std::process::Output;

use anyhow::{Context, Result};

use crate::application::ports::{FileTransfer, RemoteShell, SshTarget};
use crate::domain::job::REMOTE_USER;
use crate::infra::command_runner::{CommandRunner, TRANSFER_TIMEOUT};

/// Options applied to every connection. Host keys are ephemeral by
/// construction (fresh instance, fresh address), so verification is off.
const SSH_OPTIONS: [&str; 6] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "ConnectTimeout=30",
];

pub struct SshSession<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> SshSession<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> RemoteShell for SshSession<R> {
    async fn exec(&self, target: &SshTarget<'_>, command: &str) -> Result<Output> {
        let key = target.key_path.display().to_string();
        let mut args: Vec<&str> = vec!["-i", &key];
        args.extend_from_slice(&SSH_OPTIONS);
        args.extend_from_slice(&["-l", REMOTE_USER, target.host, command]);
        self.runner
            .run("ssh", &args)
            .await
            .with_context(|| format!("ssh to {} failed", target.host))
    }
}

impl<R: CommandRunner> FileTransfer for SshSession<R> {
    async fn copy_to(
        &self,
        target: &SshTarget<'_>,
        local: &std::path::Path,
        remote_path: &str,
    ) -> Result<Output> {
        let key = target.key_path.display().to_string();
        let local = local.display().to_string();
        let destination = format!("{REMOTE_USER}@{}:{remote_path}", target.host);
        let mut args: Vec<&str> = vec!["-i", &key];
        args.extend_from_slice(&SSH_OPTIONS);
        args.push(&local);
        args.push(&destination);
        self.runner
            .run_with_timeout("scp", &args, TRANSFER_TIMEOUT)
            .await
            .with_context(|| format!("scp to {} failed", target.host))
    }
}
