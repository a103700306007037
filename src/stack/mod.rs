//! Running one operation across every module below a directory.

use crate::context::Context;
use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::pipeline::run_module;
use crate::traits::FileSystem;
use anyhow::Result;
use semver::Version;
use std::fmt;
use std::path::{Component, PathBuf};
use std::sync::Arc;

/// Operations a stack can run on all of its modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOperation {
    Plan,
    Apply,
    Destroy,
    Output,
    Validate,
}

impl StackOperation {
    /// The engine command this operation runs in each module
    pub fn engine_command(&self) -> &'static str {
        match self {
            StackOperation::Plan => "plan",
            StackOperation::Apply => "apply",
            StackOperation::Destroy => "destroy",
            StackOperation::Output => "output",
            StackOperation::Validate => "validate",
        }
    }

    /// Non-interactive engine arguments for each module's run
    pub fn engine_args(&self, engine_version: &Version) -> Vec<String> {
        let auto_approve = *engine_version >= Version::new(0, 11, 0);

        let args: &[&str] = match self {
            StackOperation::Plan => &["plan", "-input=false"],
            StackOperation::Apply if auto_approve => &["apply", "-input=false", "-auto-approve"],
            StackOperation::Apply => &["apply", "-input=false"],
            StackOperation::Destroy if auto_approve => {
                &["destroy", "-input=false", "-auto-approve"]
            }
            StackOperation::Destroy => &["destroy", "-force", "-input=false"],
            StackOperation::Output => &["output"],
            StackOperation::Validate => &["validate"],
        };

        args.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for StackOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.engine_command())
    }
}

/// One module of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackModule {
    pub path: PathBuf,
    pub config_path: PathBuf,
}

/// The modules found below a directory, in lexical order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub path: PathBuf,
    pub modules: Vec<StackModule>,
}

impl Stack {
    /// Modules in the order `operation` visits them
    pub fn ordered_modules(&self, operation: StackOperation) -> Vec<&StackModule> {
        let mut modules: Vec<&StackModule> = self.modules.iter().collect();
        if operation == StackOperation::Destroy {
            modules.reverse();
        }
        modules
    }

    /// Human-readable execution order, shown before confirmations
    pub fn describe(&self, operation: StackOperation) -> String {
        let mut description = format!(
            "The stack at {} will be processed in the following order for command {}:",
            self.path.display(),
            operation
        );
        for module in self.ordered_modules(operation) {
            description.push_str(&format!("\nModule {}", module.path.display()));
        }
        description
    }
}

/// Finds stacks and runs operations on them
pub trait StackOrchestrator: Send + Sync {
    fn find_stack(&self, options: &ExecutionOptions) -> Result<Stack>;

    fn run(
        &self,
        ctx: &Context,
        stack: &Stack,
        operation: StackOperation,
        options: &ExecutionOptions,
    ) -> Result<()>;
}

/// Treats every non-hidden subdirectory holding a config file as a module,
/// and runs them one at a time
pub struct SubfolderStackOrchestrator {
    fs: Arc<dyn FileSystem>,
}

impl SubfolderStackOrchestrator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl StackOrchestrator for SubfolderStackOrchestrator {
    fn find_stack(&self, options: &ExecutionOptions) -> Result<Stack> {
        let root = &options.working_dir;
        let Some(config_name) = options.config_path.file_name() else {
            anyhow::bail!("Invalid config path: {}", options.config_path.display());
        };

        let mut modules = Vec::new();
        for path in self.fs.walk_dir(root, usize::MAX)? {
            if path.file_name() != Some(config_name) || !self.fs.is_file(&path) {
                continue;
            }

            let Some(module_dir) = path.parent() else {
                continue;
            };

            let hidden = module_dir
                .strip_prefix(root)
                .map(|relative| {
                    relative.components().any(|c| match c {
                        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
                        _ => false,
                    })
                })
                .unwrap_or(true);

            if !hidden {
                modules.push(StackModule {
                    path: module_dir.to_path_buf(),
                    config_path: path.clone(),
                });
            }
        }

        modules.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Stack {
            path: root.clone(),
            modules,
        })
    }

    fn run(
        &self,
        ctx: &Context,
        stack: &Stack,
        operation: StackOperation,
        options: &ExecutionOptions,
    ) -> Result<()> {
        if stack.modules.is_empty() {
            options.logger.warning(&format!(
                "No modules found under {}",
                stack.path.display()
            ));
            return Ok(());
        }

        if options.source.is_some() {
            options
                .logger
                .warning("--tgrun-source is ignored for multi-module commands");
        }

        let user_args: Vec<String> = options.engine_cli_args.iter().skip(1).cloned().collect();
        let mut failures = Vec::new();

        for module in stack.ordered_modules(operation) {
            let mut module_options = options.clone_for_module(&module.config_path);
            module_options.source = None;
            module_options.engine_cli_args = operation.engine_args(&options.engine_version);
            module_options.append_engine_cli_args(user_args.iter().cloned());

            options.logger.info(&format!(
                "Running {} in {}",
                operation,
                module.path.display()
            ));

            if let Err(err) = run_module(ctx, &mut module_options) {
                if !options.ignore_dependency_errors {
                    return Err(err);
                }

                options.logger.error(&format!(
                    "Module {} failed: {:#}",
                    module.path.display(),
                    err
                ));
                failures.push((module.path.clone(), format!("{:#}", err)));
            }
        }

        if !failures.is_empty() {
            return Err(TgrunError::ModuleFailures(failures).into());
        }

        options.logger.success(&format!(
            "Finished {} in {} module(s)",
            operation,
            stack.modules.len()
        ));
        Ok(())
    }
}
