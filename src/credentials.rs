use crate::options::ExecutionOptions;
use crate::traits::CommandExecutor;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

/// Temporary credentials returned by a role assumption
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
}

impl Credentials {
    /// The environment variables the engine's AWS provider reads
    pub fn to_env(&self) -> [(&'static str, String); 3] {
        [
            ("AWS_ACCESS_KEY_ID", self.access_key_id.clone()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.clone()),
            ("AWS_SESSION_TOKEN", self.session_token.clone()),
        ]
    }
}

pub trait CredentialProvider: Send + Sync {
    fn assume_role(&self, role: &str, options: &ExecutionOptions) -> Result<Credentials>;
}

#[derive(Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "Credentials")]
    credentials: Credentials,
}

/// Assumes roles with `aws sts assume-role`
pub struct AwsCliCredentialProvider {
    command: Arc<dyn CommandExecutor>,
}

impl AwsCliCredentialProvider {
    pub fn new(command: Arc<dyn CommandExecutor>) -> Self {
        Self { command }
    }
}

impl CredentialProvider for AwsCliCredentialProvider {
    fn assume_role(&self, role: &str, options: &ExecutionOptions) -> Result<Credentials> {
        let session_name = format!("tgrun-{}", chrono::Utc::now().timestamp());
        let args: Vec<String> = [
            "sts",
            "assume-role",
            "--role-arn",
            role,
            "--role-session-name",
            session_name.as_str(),
            "--output",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let output = self
            .command
            .execute("aws", &args, &options.working_dir, &options.env)?;

        if !output.status.success() {
            anyhow::bail!(
                "aws sts assume-role exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let response: AssumeRoleResponse = serde_json::from_slice(&output.stdout)
            .context("Failed to parse aws sts assume-role response")?;

        Ok(response.credentials)
    }
}
