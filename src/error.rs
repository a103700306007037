use std::fmt;
use std::path::PathBuf;

/// Errors produced while preparing and running engine commands.
///
/// Everything is returned through `anyhow::Result`; callers that need to
/// branch on a kind use `err.downcast_ref::<TgrunError>()`.
#[derive(Debug)]
pub enum TgrunError {
    /// The module config file could not be found
    ConfigNotFound(PathBuf),

    /// The module config file could not be read or parsed
    ConfigLoad { path: PathBuf, message: String },

    /// Exchanging the IAM role for temporary credentials failed
    RoleAssumption { role: String, message: String },

    /// Resolving or downloading the module source failed
    SourceResolution { source: String, message: String },

    /// remote_state is configured but the module code declares no matching backend
    BackendNotDefined {
        config_path: PathBuf,
        working_dir: PathBuf,
        backend_type: String,
    },

    /// A user-supplied argument is not allowed in a source-download init
    ArgumentNotAllowed {
        argument: String,
        template: &'static str,
    },

    /// Init is required but auto-init was disabled by the user
    InitNeededButDisabled,

    /// A multi-module command missing from the dispatch table
    UnrecognizedCommand(String),

    /// The engine exited unsuccessfully
    EngineCommandFailed {
        command: String,
        exit_code: Option<i32>,
    },

    /// The engine's version output could not be parsed
    InvalidEngineVersion(String),

    /// The engine's version does not satisfy the required constraint
    UnsupportedEngineVersion { found: String, constraint: String },

    /// One or more modules of a stack failed while dependency errors were ignored
    ModuleFailures(Vec<(PathBuf, String)>),

    /// A panic caught at the top-level recovery boundary
    Panicked(String),
}

impl fmt::Display for TgrunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TgrunError::ConfigNotFound(path) => {
                write!(f, "Could not find tgrun config file at {}", path.display())
            }
            TgrunError::ConfigLoad { path, message } => {
                write!(f, "Failed to load config {}: {}", path.display(), message)
            }
            TgrunError::RoleAssumption { role, message } => {
                write!(f, "Failed to assume IAM role {}: {}", role, message)
            }
            TgrunError::SourceResolution { source, message } => {
                write!(f, "Failed to resolve source {}: {}", source, message)
            }
            TgrunError::BackendNotDefined {
                config_path,
                working_dir,
                backend_type,
            } => {
                write!(
                    f,
                    "Found remote_state settings in {} but no backend block in the Terraform code in {}. \
                     You must define a backend block (it can be empty!) in your Terraform code or your \
                     remote state settings will have no effect! It should look something like this:\n\n\
                     terraform {{\n  backend \"{}\" {{}}\n}}\n",
                    config_path.display(),
                    working_dir.display(),
                    backend_type
                )
            }
            TgrunError::ArgumentNotAllowed { argument, template } => {
                write!(f, "{}", template.replacen("{}", argument, 1))
            }
            TgrunError::InitNeededButDisabled => write!(
                f,
                "Cannot continue because init is needed, but Auto-Init is disabled. \
                 You must run 'tgrun init' manually."
            ),
            TgrunError::UnrecognizedCommand(command) => {
                write!(f, "Unrecognized command: {}", command)
            }
            TgrunError::EngineCommandFailed { command, exit_code } => {
                write!(f, "Command '{}' failed", command)?;

                if let Some(code) = exit_code {
                    write!(f, " with exit code {}", code)?;
                }

                Ok(())
            }
            TgrunError::InvalidEngineVersion(output) => {
                write!(f, "Unable to parse engine version from: {}", output.trim())
            }
            TgrunError::UnsupportedEngineVersion { found, constraint } => write!(
                f,
                "The currently installed version of Terraform ({}) is not compatible with the \
                 version tgrun requires ({})",
                found, constraint
            ),
            TgrunError::ModuleFailures(failures) => {
                write!(f, "{} module(s) failed:", failures.len())?;
                for (path, message) in failures {
                    write!(f, "\n  {}: {}", path.display(), message)?;
                }
                Ok(())
            }
            TgrunError::Panicked(message) => {
                write!(f, "tgrun terminated unexpectedly: {}", message)
            }
        }
    }
}

impl std::error::Error for TgrunError {}

impl TgrunError {
    /// Build an ArgumentNotAllowed error from a message template containing `{}`
    pub fn argument_not_allowed(argument: &str, template: &'static str) -> Self {
        TgrunError::ArgumentNotAllowed {
            argument: argument.to_string(),
            template,
        }
    }
}

/// Process exit code for an error: the engine's own code when it failed, else 1
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TgrunError>() {
        Some(TgrunError::EngineCommandFailed {
            exit_code: Some(code),
            ..
        }) if *code > 0 => *code,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_not_defined_includes_remediation() {
        let err = TgrunError::BackendNotDefined {
            config_path: PathBuf::from("/live/app/.tgrun.yaml"),
            working_dir: PathBuf::from("/live/app"),
            backend_type: "gcs".to_string(),
        };

        let message = err.to_string();
        assert!(message.contains("/live/app/.tgrun.yaml"));
        assert!(message.contains("in /live/app."));
        assert!(message.contains("backend \"gcs\" {}"));
    }

    #[test]
    fn test_argument_not_allowed_formats_argument() {
        let err = TgrunError::argument_not_allowed("mydir", "Argument not allowed: {}.");
        assert_eq!(err.to_string(), "Argument not allowed: mydir.");
        match err {
            TgrunError::ArgumentNotAllowed { argument, .. } => assert_eq!(argument, "mydir"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_exit_code_uses_engine_code() {
        let err = anyhow::Error::new(TgrunError::EngineCommandFailed {
            command: "terraform plan".to_string(),
            exit_code: Some(2),
        });
        assert_eq!(exit_code(&err), 2);

        let other = anyhow::Error::new(TgrunError::InitNeededButDisabled);
        assert_eq!(exit_code(&other), 1);
    }

    #[test]
    fn test_module_failures_lists_each_module() {
        let err = TgrunError::ModuleFailures(vec![
            (PathBuf::from("/stack/vpc"), "boom".to_string()),
            (PathBuf::from("/stack/db"), "bang".to_string()),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 module(s) failed:"));
        assert!(message.contains("/stack/vpc: boom"));
        assert!(message.contains("/stack/db: bang"));
    }
}
