pub mod version;

use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::traits::CommandExecutor;
use anyhow::Result;
use std::sync::Arc;

pub use version::{check_engine_version, populate_engine_version, DEFAULT_ENGINE_VERSION_CONSTRAINT};

/// Runs the provisioning engine binary. Blocks until it exits.
pub trait EngineInvoker: Send + Sync {
    fn run(&self, options: &ExecutionOptions, args: &[String]) -> Result<()>;
}

/// Invokes the engine as a child process through a CommandExecutor
pub struct ProcessEngineInvoker {
    command: Arc<dyn CommandExecutor>,
}

impl ProcessEngineInvoker {
    pub fn new(command: Arc<dyn CommandExecutor>) -> Self {
        Self { command }
    }
}

impl EngineInvoker for ProcessEngineInvoker {
    fn run(&self, options: &ExecutionOptions, args: &[String]) -> Result<()> {
        let command_line = format!("{} {}", options.engine_path, args.join(" "));
        options
            .logger
            .dimmed(&format!("Running command: {}", command_line.trim_end()));

        let exit_code = self.command.execute_streaming(
            &options.engine_path,
            args,
            &options.working_dir,
            &options.env,
            options.writer,
        )?;

        if exit_code != 0 {
            return Err(TgrunError::EngineCommandFailed {
                command: command_line.trim_end().to_string(),
                exit_code: Some(exit_code),
            }
            .into());
        }

        Ok(())
    }
}
