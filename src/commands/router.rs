use crate::context::Context;
use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::pipeline::run_module;
use crate::stack::StackOperation;
use crate::traits::Output;
use anyhow::Result;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Commands that run against every module of a stack
pub const MULTI_MODULE_COMMANDS: &[&str] =
    &["apply-all", "destroy-all", "output-all", "plan-all", "validate-all"];

const APPLY_ALL_PROMPT: &str =
    "Are you sure you want to run 'tgrun apply' in each folder of the stack described above?";

const DESTROY_ALL_PROMPT: &str = "WARNING: Are you sure you want to run `tgrun destroy` in each \
     folder of the stack described above? There is no undo!";

lazy_static! {
    /// Old command names and the commands that replace them
    static ref DEPRECATED_COMMANDS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("spin-up", "apply-all");
        m.insert("tear-down", "destroy-all");
        m
    };

    static ref STACK_OPERATIONS: HashMap<&'static str, StackOperation> = {
        let mut m = HashMap::new();
        m.insert("plan-all", StackOperation::Plan);
        m.insert("apply-all", StackOperation::Apply);
        m.insert("destroy-all", StackOperation::Destroy);
        m.insert("output-all", StackOperation::Output);
        m.insert("validate-all", StackOperation::Validate);
        m
    };
}

/// Return the replacement for a deprecated command, logging a notice, or the command itself
pub fn check_deprecated(command: &str, logger: &dyn Output) -> String {
    match DEPRECATED_COMMANDS.get(command) {
        Some(replacement) => {
            logger.warning(&format!(
                "{} is deprecated; running {} instead.",
                command, replacement
            ));
            replacement.to_string()
        }
        None => command.to_string(),
    }
}

pub fn is_multi_module_command(command: &str) -> bool {
    MULTI_MODULE_COMMANDS.contains(&command)
}

/// Routes a command to the single-module pipeline or the stack orchestrator
pub struct RunCommand;

impl RunCommand {
    /// Run `command` (already checked for deprecation) with `options`
    pub fn execute(ctx: &Context, command: &str, options: &mut ExecutionOptions) -> Result<()> {
        if is_multi_module_command(command) {
            return Self::execute_multi_module(ctx, command, options);
        }

        run_module(ctx, options)
    }

    fn execute_multi_module(ctx: &Context, command: &str, options: &ExecutionOptions) -> Result<()> {
        let Some(operation) = STACK_OPERATIONS.get(command).copied() else {
            return Err(TgrunError::UnrecognizedCommand(command.to_string()).into());
        };

        let stack = ctx.stacks.find_stack(options)?;
        options.logger.info(&stack.describe(operation));

        let prompt = match operation {
            StackOperation::Apply => Some(APPLY_ALL_PROMPT),
            StackOperation::Destroy => Some(DESTROY_ALL_PROMPT),
            _ => None,
        };

        if let Some(prompt) = prompt
            && !options.non_interactive
            && !ctx.input.confirm(prompt, false)?
        {
            return Ok(());
        }

        ctx.stacks.run(ctx, &stack, operation, options)
    }
}
