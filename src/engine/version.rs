use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::traits::CommandExecutor;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use semver::{Version, VersionReq};

/// Oldest engine release tgrun knows how to drive
pub const DEFAULT_ENGINE_VERSION_CONSTRAINT: &str = ">= 0.9.3";

lazy_static! {
    static ref ENGINE_VERSION_REGEX: Regex =
        Regex::new(r"v(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").expect("valid version regex");
}

/// Extract the engine version from `--version` output, e.g. "Terraform v0.11.7"
pub fn parse_engine_version(output: &str) -> Result<Version, TgrunError> {
    let captured = output
        .lines()
        .find_map(|line| ENGINE_VERSION_REGEX.captures(line))
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| TgrunError::InvalidEngineVersion(output.to_string()))?;

    Version::parse(captured.as_str()).map_err(|_| TgrunError::InvalidEngineVersion(output.to_string()))
}

/// Run `<engine> --version` and store the result on the options
pub fn populate_engine_version(
    command: &dyn CommandExecutor,
    options: &mut ExecutionOptions,
) -> Result<()> {
    let output = command
        .execute(
            &options.engine_path,
            &["--version".to_string()],
            &options.working_dir,
            &options.env,
        )
        .with_context(|| format!("Failed to determine version of {}", options.engine_path))?;

    if !output.status.success() {
        return Err(TgrunError::EngineCommandFailed {
            command: format!("{} --version", options.engine_path),
            exit_code: output.status.code(),
        }
        .into());
    }

    options.engine_version = parse_engine_version(&String::from_utf8_lossy(&output.stdout))?;
    Ok(())
}

/// Fail unless the resolved engine version satisfies `constraint`
pub fn check_engine_version(constraint: &str, options: &ExecutionOptions) -> Result<()> {
    let requirement = VersionReq::parse(constraint)
        .with_context(|| format!("Invalid version constraint: {}", constraint))?;

    if !requirement.matches(&options.engine_version) {
        return Err(TgrunError::UnsupportedEngineVersion {
            found: options.engine_version.to_string(),
            constraint: constraint.to_string(),
        }
        .into());
    }

    Ok(())
}
