//! AWS CLI abstraction — implements the provider ports by shelling out to
//! the `aws` binary with `--output json`.

use std::io::Write as _;
use std::process::Output;

use anyhow::{Context, Result};

use crate::application::ports::{
    ComputeLifecycle, IdentityManager, ImageCatalog, ImageFilter, InstanceSpec, KeyPairs,
    NetworkRules,
};
use crate::infra::command_runner::CommandRunner;

/// Fixed tags applied to the launched instance.
const NAME_TAG: &str = "ea-lidar-download";
const PROJECT_TAG: &str = "ea-lidar";

/// Production implementation of the five provider ports.
pub struct AwsCli<R: CommandRunner> {
    runner: R,
    region: String,
}

impl<R: CommandRunner> AwsCli<R> {
    pub fn new(runner: R, region: impl Into<String>) -> Self {
        Self {
            runner,
            region: region.into(),
        }
    }

    async fn aws(&self, args: &[&str]) -> Result<Output> {
        let mut full: Vec<&str> = vec!["--region", &self.region, "--output", "json"];
        full.extend_from_slice(args);
        self.runner
            .run("aws", &full)
            .await
            .with_context(|| format!("failed to run aws {}", args.first().unwrap_or(&"")))
    }
}

impl<R: CommandRunner> ImageCatalog for AwsCli<R> {
    async fn describe_images(&self, filter: &ImageFilter<'_>) -> Result<Output> {
        let name_filter = format!("Name=name,Values={}", filter.name_pattern);
        let arch_filter = format!("Name=architecture,Values={}", filter.architecture);
        self.aws(&[
            "ec2",
            "describe-images",
            "--owners",
            filter.owner,
            "--filters",
            &name_filter,
            "Name=state,Values=available",
            &arch_filter,
        ])
        .await
    }
}

impl<R: CommandRunner> KeyPairs for AwsCli<R> {
    async fn describe_key_pair(&self, name: &str) -> Result<Output> {
        self.aws(&["ec2", "describe-key-pairs", "--key-names", name])
            .await
    }

    async fn create_key_pair(&self, name: &str) -> Result<Output> {
        self.aws(&["ec2", "create-key-pair", "--key-name", name])
            .await
    }
}

impl<R: CommandRunner> NetworkRules for AwsCli<R> {
    async fn create_security_group(&self, name: &str, description: &str) -> Result<Output> {
        self.aws(&[
            "ec2",
            "create-security-group",
            "--group-name",
            name,
            "--description",
            description,
        ])
        .await
    }

    async fn authorize_ingress(&self, group_id: &str, port: u16) -> Result<Output> {
        let port = port.to_string();
        self.aws(&[
            "ec2",
            "authorize-security-group-ingress",
            "--group-id",
            group_id,
            "--protocol",
            "tcp",
            "--port",
            &port,
            "--cidr",
            "0.0.0.0/0",
        ])
        .await
    }
}

impl<R: CommandRunner> IdentityManager for AwsCli<R> {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<Output> {
        self.aws(&[
            "iam",
            "create-role",
            "--role-name",
            name,
            "--assume-role-policy-document",
            trust_policy,
            "--description",
            description,
        ])
        .await
    }

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<Output> {
        self.aws(&[
            "iam",
            "put-role-policy",
            "--role-name",
            role,
            "--policy-name",
            policy_name,
            "--policy-document",
            policy_document,
        ])
        .await
    }

    async fn create_instance_profile(&self, name: &str) -> Result<Output> {
        self.aws(&[
            "iam",
            "create-instance-profile",
            "--instance-profile-name",
            name,
        ])
        .await
    }

    async fn add_role_to_profile(&self, profile: &str, role: &str) -> Result<Output> {
        self.aws(&[
            "iam",
            "add-role-to-instance-profile",
            "--instance-profile-name",
            profile,
            "--role-name",
            role,
        ])
        .await
    }
}

impl<R: CommandRunner> ComputeLifecycle for AwsCli<R> {
    async fn run_instance(&self, spec: &InstanceSpec<'_>) -> Result<Output> {
        // The CLI takes user data from a file; keep the temp file alive
        // until the command returns.
        let mut user_data_file =
            tempfile::NamedTempFile::new().context("creating user-data temp file")?;
        user_data_file
            .write_all(spec.user_data.as_bytes())
            .context("writing user-data temp file")?;
        let user_data_arg = format!("file://{}", user_data_file.path().display());

        let profile_arg = format!("Name={}", spec.instance_profile);
        let block_devices = serde_json::json!([{
            "DeviceName": "/dev/sda1",
            "Ebs": {
                "VolumeSize": spec.volume_size_gb,
                "VolumeType": "gp3",
                "DeleteOnTermination": true,
            },
        }])
        .to_string();
        let tags = format!(
            "ResourceType=instance,Tags=[{{Key=Name,Value={NAME_TAG}}},{{Key=Project,Value={PROJECT_TAG}}}]"
        );

        self.aws(&[
            "ec2",
            "run-instances",
            "--image-id",
            spec.image_id,
            "--instance-type",
            spec.instance_type,
            "--key-name",
            spec.key_name,
            "--security-group-ids",
            spec.security_group_id,
            "--iam-instance-profile",
            &profile_arg,
            "--user-data",
            &user_data_arg,
            "--count",
            "1",
            "--block-device-mappings",
            &block_devices,
            "--tag-specifications",
            &tags,
        ])
        .await
    }

    async fn describe_instance(&self, id: &str) -> Result<Output> {
        self.aws(&["ec2", "describe-instances", "--instance-ids", id])
            .await
    }

    async fn terminate_instance(&self, id: &str) -> Result<Output> {
        self.aws(&["ec2", "terminate-instances", "--instance-ids", id])
            .await
    }
}
