use crate::traits::Output;
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default name of the per-module config file
pub const DEFAULT_CONFIG_FILE: &str = ".tgrun.yaml";

/// Default engine binary, looked up on PATH
pub const DEFAULT_ENGINE_PATH: &str = "terraform";

/// Engine commands whose command token is two words (e.g. `state list`)
const COMMANDS_WITH_SUBCOMMAND: &[&str] = &["debug", "env", "state", "workspace"];

/// Where an engine invocation's stdout is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    Stdout,
    Stderr,
}

/// Mutable context for one logical command.
///
/// `Clone` produces independent copies of the argument list and environment
/// overlay, so a nested init invocation can rewrite its own arguments and
/// working directory without touching the caller's options. Only the logger
/// handle is shared.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Directory containing the module's Terraform code
    pub working_dir: PathBuf,
    /// Path to the module's config file
    pub config_path: PathBuf,
    /// Engine binary to invoke
    pub engine_path: String,
    /// Arguments forwarded to the engine, command token first
    pub engine_cli_args: Vec<String>,
    /// Environment passed to the engine
    pub env: HashMap<String, String>,
    pub iam_role: Option<String>,
    pub auto_init: bool,
    pub non_interactive: bool,
    /// Source URL given on the command line; wins over the config's source
    pub source: Option<String>,
    pub source_update: bool,
    pub ignore_dependency_errors: bool,
    /// Root directory that holds downloaded module sources
    pub download_dir: PathBuf,
    pub engine_version: Version,
    pub writer: StreamTarget,
    pub err_writer: StreamTarget,
    pub logger: Arc<dyn Output>,
}

impl ExecutionOptions {
    /// Options for running `args` in `working_dir` with defaults for everything else
    pub fn new(working_dir: impl Into<PathBuf>, args: Vec<String>, logger: Arc<dyn Output>) -> Self {
        let working_dir = working_dir.into();
        Self {
            config_path: working_dir.join(DEFAULT_CONFIG_FILE),
            working_dir,
            engine_path: DEFAULT_ENGINE_PATH.to_string(),
            engine_cli_args: args,
            env: HashMap::new(),
            iam_role: None,
            auto_init: true,
            non_interactive: false,
            source: None,
            source_update: false,
            ignore_dependency_errors: false,
            download_dir: std::env::temp_dir().join("tgrun-download"),
            engine_version: Version::new(0, 0, 0),
            writer: StreamTarget::Stdout,
            err_writer: StreamTarget::Stderr,
            logger,
        }
    }

    /// Clone these options for another module: its config path and directory replace ours
    pub fn clone_for_module(&self, config_path: &Path) -> Self {
        let mut options = self.clone();
        options.config_path = config_path.to_path_buf();
        if let Some(dir) = config_path.parent() {
            options.working_dir = dir.to_path_buf();
        }
        options
    }

    /// The command token (first forwarded argument), or "" when there is none
    pub fn first_arg(&self) -> &str {
        self.engine_cli_args.first().map(String::as_str).unwrap_or("")
    }

    /// Insert arguments right after the command token (after both words for
    /// commands like `state list`), ahead of the user's own arguments.
    pub fn insert_engine_cli_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let to_insert: Vec<String> = args.into_iter().map(Into::into).collect();

        if self.engine_cli_args.is_empty() {
            self.engine_cli_args = to_insert;
            return;
        }

        let command_len = if COMMANDS_WITH_SUBCOMMAND.contains(&self.first_arg()) {
            self.engine_cli_args.len().min(2)
        } else {
            1
        };

        let rest = self.engine_cli_args.split_off(command_len);
        self.engine_cli_args.extend(to_insert);
        self.engine_cli_args.extend(rest);
    }

    /// Append arguments to the end of the forwarded argument list
    pub fn append_engine_cli_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engine_cli_args
            .extend(args.into_iter().map(Into::into));
    }
}
