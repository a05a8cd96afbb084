//! ea-lidar — run EA LIDAR downloads on an ephemeral EC2 instance.

#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;

use ea_lidar_cli::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
