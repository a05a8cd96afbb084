//! Production port implementations — the `aws`, `ssh`, and `scp` binaries
//! driven through a timeout-guarded command runner.

pub mod aws;
pub mod command_runner;
pub mod ssh;
