use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::scanner::{SourceGlob, SourceScanner};
use anyhow::{Context, Result};
use regex::bytes::Regex;

/// Fail unless the module's code declares a `backend "<type>"` block, in
/// native syntax under `**/*.tf` or JSON syntax under `**/*.tf.json`
pub fn check_backend_defined(
    scanner: &dyn SourceScanner,
    options: &ExecutionOptions,
    backend_type: &str,
) -> Result<()> {
    let escaped = regex::escape(backend_type);

    let native = Regex::new(&format!(r#"backend[[:blank:]]+"{}""#, escaped))
        .context("Failed to build backend pattern")?;
    if scanner.scan_matches(&native, &options.working_dir, SourceGlob::recursive(".tf"))? {
        return Ok(());
    }

    let json = Regex::new(&format!(
        r#"(?m)"backend":[[:space:]]*\{{[[:space:]]*"{}""#,
        escaped
    ))
    .context("Failed to build JSON backend pattern")?;
    if scanner.scan_matches(&json, &options.working_dir, SourceGlob::recursive(".tf.json"))? {
        return Ok(());
    }

    Err(TgrunError::BackendNotDefined {
        config_path: options.config_path.clone(),
        working_dir: options.working_dir.clone(),
        backend_type: backend_type.to_string(),
    }
    .into())
}
