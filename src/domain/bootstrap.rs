//! Boot payload rendering.
//!
//! The payload is a shell script with six unique textual placeholders.
//! Substitution order is irrelevant because the tokens are unique, but a
//! value containing another placeholder's token would survive its own
//! substitution pass — so values are rejected up front.

use thiserror::Error;

/// The embedded boot payload template, rendered once per run.
pub const TEMPLATE: &str = include_str!("../../assets/bootstrap.sh");

/// The six placeholder tokens, paired with accessors into [`BootParams`].
const PLACEHOLDERS: [&str; 6] = [
    "{{REPO_URL}}",
    "{{AOI_PATH}}",
    "{{PRODUCTS}}",
    "{{YEAR}}",
    "{{RESOLUTION}}",
    "{{S3_OUTPUT}}",
];

/// Substitution values for the boot payload template.
#[derive(Debug, Clone)]
pub struct BootParams<'a> {
    pub repo_url: &'a str,
    pub aoi_path: &'a str,
    pub products: &'a str,
    pub year: &'a str,
    pub resolution: &'a str,
    pub s3_output: &'a str,
}

impl BootParams<'_> {
    fn pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("{{REPO_URL}}", self.repo_url),
            ("{{AOI_PATH}}", self.aoi_path),
            ("{{PRODUCTS}}", self.products),
            ("{{YEAR}}", self.year),
            ("{{RESOLUTION}}", self.resolution),
            ("{{S3_OUTPUT}}", self.s3_output),
        ]
    }
}

/// Boot payload rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("substitution value {value:?} contains placeholder token {token}")]
    ValueContainsToken { value: String, token: &'static str },

    #[error("boot payload still contains unreplaced token {0}")]
    UnreplacedToken(&'static str),
}

/// Render the boot payload by substituting all six placeholders into
/// `template`.
///
/// # Errors
///
/// Returns an error if any substitution value contains a placeholder token,
/// or if a token remains in the output (a malformed template).
pub fn render(template: &str, params: &BootParams<'_>) -> Result<String, RenderError> {
    for (_, value) in params.pairs() {
        for token in PLACEHOLDERS {
            if value.contains(token) {
                return Err(RenderError::ValueContainsToken {
                    value: value.to_string(),
                    token,
                });
            }
        }
    }

    let mut rendered = template.to_string();
    for (token, value) in params.pairs() {
        rendered = rendered.replace(token, value);
    }

    for token in PLACEHOLDERS {
        if rendered.contains(token) {
            return Err(RenderError::UnreplacedToken(token));
        }
    }
    Ok(rendered)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any six token-free values render totally: no placeholder remains.
        #[test]
        #[allow(clippy::expect_used)]
        fn prop_render_is_total_for_token_free_values(
            repo in "[a-zA-Z0-9:/._-]{1,40}",
            aoi in "[a-zA-Z0-9/._-]{1,40}",
            products in "[a-z_,]{1,40}",
            year in "[0-9]{4}",
            resolution in "[0-9]{1,2}",
            s3 in "s3://[a-z0-9-]{3,20}/[a-z0-9/-]{0,20}",
        ) {
            let p = BootParams {
                repo_url: &repo,
                aoi_path: &aoi,
                products: &products,
                year: &year,
                resolution: &resolution,
                s3_output: &s3,
            };
            let out = render(TEMPLATE, &p).expect("render");
            for token in super::PLACEHOLDERS {
                prop_assert!(!out.contains(token));
            }
        }

        /// Every placeholder is replaced by exactly its value: the rendered
        /// output contains each value at least once.
        #[test]
        #[allow(clippy::expect_used)]
        fn prop_render_embeds_every_value(
            year in "[0-9]{4}",
            resolution in "[0-9]{1,2}",
        ) {
            let p = BootParams {
                repo_url: "https://example.com/repo.git",
                aoi_path: "/tmp/aoi.shp",
                products: "lidar_composite_dsm",
                year: &year,
                resolution: &resolution,
                s3_output: "s3://bucket/out",
            };
            let out = render(TEMPLATE, &p).expect("render");
            prop_assert!(out.contains(&year));
            prop_assert!(out.contains(&resolution));
        }
    }
}
