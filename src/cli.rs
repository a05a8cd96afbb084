//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::Parser;

use crate::commands;

/// Run an unattended EA LIDAR download on a throwaway EC2 instance
#[derive(Parser)]
#[command(name = "ea-lidar", version, arg_required_else_help = true)]
pub struct Cli {
    /// Area of interest: local shapefile path or s3:// URI
    pub aoi: String,

    /// S3 prefix to receive the downloaded products
    #[arg(long)]
    pub s3_output: String,

    /// Product list passed to the downloader
    #[arg(long, default_value = "lidar_composite_dtm")]
    pub products: String,

    /// Survey year to download
    #[arg(long, default_value = "2022")]
    pub year: String,

    /// Grid resolution in metres
    #[arg(long, default_value = "1")]
    pub resolution: String,

    /// Private key file for the instance (created if the key pair is new)
    #[arg(long, default_value = "~/.ssh/ea-lidar-key.pem")]
    pub ssh_key: String,

    /// EC2 key pair name
    #[arg(long, default_value = "ea-lidar-key")]
    pub key_name: String,

    /// AWS region to launch in
    #[arg(long, env = "AWS_REGION", default_value = "eu-west-2")]
    pub region: String,

    /// EC2 instance type
    #[arg(long, default_value = "t3.medium")]
    pub instance_type: String,

    /// Root volume size in GB
    #[arg(long, default_value_t = 30)]
    pub volume_size: u32,

    /// Git repository holding the downloader script
    #[arg(long, default_value = "https://github.com/ea-lidar/ea-lidar-downloader")]
    pub repo_url: String,

    /// Keep the instance running after a successful job
    #[arg(long)]
    pub no_terminate: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,
}

impl Cli {
    /// Execute the CLI.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the download job
    /// cannot be completed.
    pub async fn run(self) -> Result<()> {
        let ctx = crate::output::OutputContext::new(self.no_color, self.quiet);
        commands::run::run(&ctx, self).await
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_cover_the_common_case() {
        let cli = Cli::parse_from(["ea-lidar", "site.shp", "--s3-output", "s3://b/out/"]);
        assert_eq!(cli.products, "lidar_composite_dtm");
        assert_eq!(cli.year, "2022");
        assert_eq!(cli.resolution, "1");
        assert_eq!(cli.region, "eu-west-2");
        assert_eq!(cli.instance_type, "t3.medium");
        assert_eq!(cli.volume_size, 30);
        assert_eq!(
            cli.repo_url,
            "https://github.com/ea-lidar/ea-lidar-downloader"
        );
        assert!(!cli.no_terminate);
    }

    #[test]
    fn s3_output_is_required() {
        let parse = Cli::try_parse_from(["ea-lidar", "site.shp"]);
        assert!(parse.is_err());
    }
}
