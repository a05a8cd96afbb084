//! The remote job contract and the per-run context value.
//!
//! The log and marker paths are a fixed contract between this orchestrator
//! and the boot payload (`assets/bootstrap.sh`) — not configurable.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::aoi::AoiSource;

/// Log file the boot payload appends to.
pub const BOOTSTRAP_LOG: &str = "/var/log/ea-lidar-bootstrap.log";

/// Status marker file; a single terminal token once the job finishes.
pub const STATUS_FILE: &str = "/tmp/ea-lidar-status";

/// The one token that means success. Every other non-empty marker value is a
/// failure.
pub const SUCCESS_TOKEN: &str = "SUCCESS";

/// Login user on the launched Ubuntu instance.
pub const REMOTE_USER: &str = "ubuntu";

/// Terminal outcome of the remote job, as read from the status marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobVerdict {
    pub token: String,
}

impl JobVerdict {
    /// `true` iff the marker content is exactly [`SUCCESS_TOKEN`].
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.token == SUCCESS_TOKEN
    }
}

/// A validated `s3://bucket/prefix` output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// The full URI as given.
    pub uri: String,
    /// The bucket component, used to scope the instance's write permissions.
    pub bucket: String,
}

/// Output destination parse errors.
#[derive(Debug, Error)]
pub enum OutputLocationError {
    #[error("--s3-output must start with s3:// (got {0:?})")]
    NotS3(String),

    #[error("--s3-output has no bucket component: {0:?}")]
    NoBucket(String),
}

impl OutputLocation {
    /// Parse and validate an `s3://bucket[/prefix]` URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI lacks the `s3://` scheme or a bucket name.
    pub fn parse(raw: &str) -> Result<Self, OutputLocationError> {
        let rest = raw
            .strip_prefix("s3://")
            .ok_or_else(|| OutputLocationError::NotS3(raw.to_string()))?;
        let bucket = rest.split('/').next().unwrap_or_default();
        if bucket.is_empty() {
            return Err(OutputLocationError::NoBucket(raw.to_string()));
        }
        Ok(Self {
            uri: raw.to_string(),
            bucket: bucket.to_string(),
        })
    }
}

/// Everything one run needs, resolved from the CLI up front and threaded
/// explicitly through the pipeline — there is no ambient run state.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub aoi: AoiSource,
    pub output: OutputLocation,
    pub products: String,
    pub year: String,
    pub resolution: String,
    pub repo_url: String,
    pub region: String,
    pub instance_type: String,
    pub volume_size_gb: u32,
    pub key_name: String,
    pub key_path: PathBuf,
    /// Leave the instance running even when the job succeeds.
    pub preserve_on_success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_succeeds_only_on_exact_success_token() {
        assert!(JobVerdict { token: "SUCCESS".into() }.succeeded());
        assert!(!JobVerdict { token: "FAILURE".into() }.succeeded());
        assert!(!JobVerdict { token: "success".into() }.succeeded());
        assert!(!JobVerdict { token: "SUCCESSFUL".into() }.succeeded());
    }

    #[test]
    fn output_location_extracts_bucket() {
        let loc = OutputLocation::parse("s3://my-bucket/some/prefix").expect("parse");
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.uri, "s3://my-bucket/some/prefix");
    }

    #[test]
    fn output_location_accepts_bare_bucket() {
        let loc = OutputLocation::parse("s3://my-bucket").expect("parse");
        assert_eq!(loc.bucket, "my-bucket");
    }

    #[test]
    fn output_location_rejects_non_s3_uri() {
        assert!(matches!(
            OutputLocation::parse("gs://bucket/x"),
            Err(OutputLocationError::NotS3(_))
        ));
    }

    #[test]
    fn output_location_rejects_missing_bucket() {
        assert!(matches!(
            OutputLocation::parse("s3:///prefix"),
            Err(OutputLocationError::NoBucket(_))
        ));
    }
}
