//! AOI input classification and shapefile bundle discovery.

use std::path::{Path, PathBuf};

/// Sidecar extensions that make up a shapefile bundle. A bundle is valid
/// with any non-empty subset; `.shp` alone is enough.
pub const SIDECAR_EXTENSIONS: [&str; 7] = ["shp", "shx", "dbf", "prj", "cpg", "sbn", "sbx"];

/// Where the AOI lives: a local shapefile to upload, or an S3 URI the
/// instance fetches itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AoiSource {
    Local(PathBuf),
    Remote(String),
}

impl AoiSource {
    /// Classify a raw CLI argument. Anything starting with `s3://` is
    /// remote; everything else is a local path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("s3://") {
            Self::Remote(raw.to_string())
        } else {
            Self::Local(PathBuf::from(raw))
        }
    }

    /// The AOI path as seen from inside the instance — the fixed upload
    /// destination for local bundles, or the S3 URI verbatim.
    #[must_use]
    pub fn remote_path(&self) -> String {
        match self {
            Self::Local(_) => REMOTE_AOI_BASE.to_string() + ".shp",
            Self::Remote(uri) => uri.clone(),
        }
    }
}

/// Remote destination base for uploaded bundle files (extension appended
/// per file).
pub const REMOTE_AOI_BASE: &str = "/tmp/aoi";

/// Discover the sidecar files present on disk for the bundle at `aoi_path`.
///
/// Returns exactly the subset of [`SIDECAR_EXTENSIONS`] that exists,
/// preserving the extension order. An empty result means the bundle is
/// invalid; the caller decides how to fail.
#[must_use]
pub fn discover_bundle(aoi_path: &Path) -> Vec<PathBuf> {
    SIDECAR_EXTENSIONS
        .iter()
        .map(|ext| aoi_path.with_extension(ext))
        .filter(|p| p.exists())
        .collect()
}
