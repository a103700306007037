mod commands;
mod config;
mod context;
mod credentials;
mod engine;
mod error;
mod options;
mod output;
mod pipeline;
mod remote_state;
mod scanner;
mod source;
mod stack;
mod test_helpers;
mod traits;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use commands::{RunCommand, check_deprecated};
use context::Context;
use engine::{DEFAULT_ENGINE_VERSION_CONSTRAINT, check_engine_version, populate_engine_version};
use error::TgrunError;
use options::{DEFAULT_CONFIG_FILE, DEFAULT_ENGINE_PATH, ExecutionOptions};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

/// tgrun's own flags that take a value
const FLAGS_WITH_VALUE: &[&str] = &[
    "--tgrun-config",
    "--tgrun-tfpath",
    "--tgrun-working-dir",
    "--tgrun-source",
    "--tgrun-iam-role",
    "--tgrun-download-dir",
];

const FLAG_PREFIX: &str = "--tgrun-";

#[derive(Parser, Debug)]
#[command(name = "tgrun")]
#[command(
    about = "A thin wrapper for Terraform that handles init, remote state and multi-module stacks",
    long_about = None
)]
#[command(version)]
#[command(after_help = "Any command other than tgrun's own is forwarded to Terraform, e.g. \
    `tgrun plan -out=tf.plan`.\nMulti-module commands: plan-all, apply-all, destroy-all, \
    output-all, validate-all.")]
struct Cli {
    /// Path to the module config file
    #[arg(long = "tgrun-config", env = "TGRUN_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Terraform binary to run
    #[arg(long = "tgrun-tfpath", env = "TGRUN_TFPATH", default_value = DEFAULT_ENGINE_PATH)]
    tfpath: String,

    /// Never run init automatically
    #[arg(long = "tgrun-no-auto-init")]
    no_auto_init: bool,

    /// Assume "yes" for every prompt
    #[arg(long = "tgrun-non-interactive")]
    non_interactive: bool,

    /// Directory to run in (defaults to the current directory)
    #[arg(long = "tgrun-working-dir", value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Download Terraform code from this source instead of the one in config
    #[arg(long = "tgrun-source", env = "TGRUN_SOURCE", value_name = "URL")]
    source: Option<String>,

    /// Delete previously downloaded source before downloading it again
    #[arg(long = "tgrun-source-update")]
    source_update: bool,

    /// IAM role to assume before running Terraform
    #[arg(long = "tgrun-iam-role", env = "TGRUN_IAM_ROLE", value_name = "ARN")]
    iam_role: Option<String>,

    /// Keep going when a module of a stack fails
    #[arg(long = "tgrun-ignore-dependency-errors")]
    ignore_dependency_errors: bool,

    /// Where downloaded sources are kept
    #[arg(long = "tgrun-download-dir", env = "TGRUN_DOWNLOAD", value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Terraform command and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    args: Vec<String>,
}

/// How the process terminates with a non-zero code
pub trait Exiter {
    fn exit(&self, code: i32);
}

pub struct ProcessExiter;

impl Exiter for ProcessExiter {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

fn main() {
    let ctx = Context::new();
    run(std::env::args().collect(), &ctx, &ProcessExiter);
}

/// Entry point: any error or panic below here is reported through
/// `ctx.output` and turned into an exit code for `exiter`
fn run(argv: Vec<String>, ctx: &Context, exiter: &dyn Exiter) {
    // Panics are reported once, below, instead of by the default hook
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(AssertUnwindSafe(|| run_app(argv, ctx)));
    std::panic::set_hook(previous_hook);

    let code = match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            ctx.output.error(&format!("{:#}", err));
            error::exit_code(&err)
        }
        Err(payload) => {
            let err = TgrunError::Panicked(panic_payload_to_string(payload.as_ref()));
            ctx.output.error(&err.to_string());
            1
        }
    };

    if code != 0 {
        exiter.exit(code);
    }
}

fn run_app(argv: Vec<String>, ctx: &Context) -> Result<i32> {
    if argv.len() <= 1 {
        Cli::command().print_help()?;
        return Ok(0);
    }

    let cli = match Cli::try_parse_from(hoist_tool_flags(argv)) {
        Ok(cli) => cli,
        Err(err) => {
            let code = err.exit_code();
            err.print()?;
            return Ok(code);
        }
    };

    if cli.args.is_empty() {
        Cli::command().print_help()?;
        return Ok(0);
    }

    let mut options = build_options(cli, ctx)?;

    populate_engine_version(ctx.command.as_ref(), &mut options)?;
    check_engine_version(DEFAULT_ENGINE_VERSION_CONSTRAINT, &options)?;

    let command = check_deprecated(options.first_arg(), options.logger.as_ref());
    RunCommand::execute(ctx, &command, &mut options)?;

    Ok(0)
}

fn build_options(cli: Cli, ctx: &Context) -> Result<ExecutionOptions> {
    let current_dir = std::env::current_dir().context("Failed to determine current directory")?;
    let working_dir = match cli.working_dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => current_dir.join(dir),
        None => current_dir,
    };

    let mut options = ExecutionOptions::new(working_dir, cli.args, ctx.output.clone());

    options.config_path = match cli.config {
        Some(path) if path.is_absolute() => path,
        Some(path) => options.working_dir.join(path),
        None => options.working_dir.join(DEFAULT_CONFIG_FILE),
    };
    options.engine_path = cli.tfpath;
    options.auto_init = !cli.no_auto_init;
    options.non_interactive = cli.non_interactive;
    options.source = cli.source;
    options.source_update = cli.source_update;
    options.iam_role = cli.iam_role.filter(|role| !role.is_empty());
    options.ignore_dependency_errors = cli.ignore_dependency_errors;
    if let Some(download_dir) = cli.download_dir {
        options.download_dir = download_dir;
    }

    Ok(options)
}

/// Move tgrun's own flags (and their values) in front of the engine command,
/// so they may appear anywhere on the command line
fn hoist_tool_flags(argv: Vec<String>) -> Vec<String> {
    let mut argv = argv.into_iter();
    let mut hoisted: Vec<String> = argv.next().into_iter().collect();
    let mut rest = Vec::new();

    while let Some(arg) = argv.next() {
        // --help and --version are ours only before the engine command
        if rest.is_empty() && matches!(arg.as_str(), "-h" | "--help" | "-V" | "--version") {
            hoisted.push(arg);
            continue;
        }

        if !arg.starts_with(FLAG_PREFIX) {
            rest.push(arg);
            continue;
        }

        let takes_value = FLAGS_WITH_VALUE.contains(&arg.as_str());
        hoisted.push(arg);
        if takes_value && let Some(value) = argv.next() {
            hoisted.push(value);
        }
    }

    if !rest.is_empty() {
        // Everything after this is positional, even if it looks like a flag
        hoisted.push("--".to_string());
    }
    hoisted.extend(rest);
    hoisted
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineInvoker;
    use crate::test_helpers::TestHarness;
    use crate::traits::{MockCommandExecutor, MockCommandResult};
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    // The panic hook is process-global; tests that go through `run` take turns
    static HOOK_LOCK: Mutex<()> = Mutex::new(());

    fn hook_lock() -> MutexGuard<'static, ()> {
        HOOK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_serialized(argv: Vec<String>, ctx: &Context, exiter: &dyn Exiter) {
        let _guard = hook_lock();
        run(argv, ctx, exiter);
    }

    #[derive(Default)]
    struct RecordingExiter {
        codes: RefCell<Vec<i32>>,
    }

    impl Exiter for RecordingExiter {
        fn exit(&self, code: i32) {
            self.codes.borrow_mut().push(code);
        }
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn engine_version(version: &str) -> Arc<MockCommandExecutor> {
        Arc::new(MockCommandExecutor::with_outputs(vec![MockCommandResult {
            command: "terraform".to_string(),
            exit_code: 0,
            stdout: format!("Terraform v{}\n", version),
            stderr: String::new(),
        }]))
    }

    #[test]
    fn test_hoist_flags_from_anywhere() {
        let hoisted = hoist_tool_flags(argv(&[
            "tgrun",
            "plan",
            "--tgrun-iam-role",
            "arn:aws:iam::1:role/r",
            "-out=tf.plan",
            "--tgrun-non-interactive",
            "--tgrun-source=../modules",
        ]));

        assert_eq!(
            hoisted,
            argv(&[
                "tgrun",
                "--tgrun-iam-role",
                "arn:aws:iam::1:role/r",
                "--tgrun-non-interactive",
                "--tgrun-source=../modules",
                "--",
                "plan",
                "-out=tf.plan",
            ])
        );
    }

    #[test]
    fn test_cli_parses_hoisted_flags() {
        let cli = Cli::try_parse_from(hoist_tool_flags(argv(&[
            "tgrun",
            "apply",
            "-auto-approve",
            "--tgrun-working-dir",
            "/live/app",
            "--tgrun-no-auto-init",
        ])))
        .unwrap();

        assert_eq!(cli.args, argv(&["apply", "-auto-approve"]));
        assert_eq!(cli.working_dir, Some(PathBuf::from("/live/app")));
        assert!(cli.no_auto_init);
        assert_eq!(cli.tfpath, "terraform");
    }

    #[test]
    fn test_deprecated_alias_runs_replacement() {
        let harness = TestHarness::new();
        let ctx = Context {
            command: engine_version("1.5.7"),
            ..harness.stack_context()
        };
        let exiter = RecordingExiter::default();

        run_serialized(
            argv(&["tgrun", "spin-up", "--tgrun-working-dir", "/live", "--tgrun-non-interactive"]),
            &ctx,
            &exiter,
        );

        assert!(exiter.codes.borrow().is_empty());
        assert!(harness.output.contains_text("spin-up is deprecated; running apply-all instead."));
        assert_eq!(
            harness.stacks.operations(),
            vec![crate::stack::StackOperation::Apply]
        );
    }

    #[test]
    fn test_engine_failure_exit_code() {
        let harness = TestHarness::new();
        harness.write_config("");
        harness.fs.add_dir("/live/app/.terraform/plugins");
        harness.engine.fail_in("/live/app");
        let ctx = Context {
            command: engine_version("1.5.7"),
            ..harness.context()
        };
        let exiter = RecordingExiter::default();

        run_serialized(argv(&["tgrun", "plan", "--tgrun-working-dir", "/live/app"]), &ctx, &exiter);

        assert_eq!(*exiter.codes.borrow(), vec![1]);
        assert!(harness.output.contains_text("failed with exit code 1"));
    }

    #[test]
    fn test_unsupported_engine_version() {
        let harness = TestHarness::new();
        let ctx = Context {
            command: engine_version("0.8.8"),
            ..harness.context()
        };
        let exiter = RecordingExiter::default();

        run_serialized(argv(&["tgrun", "plan", "--tgrun-working-dir", "/live/app"]), &ctx, &exiter);

        assert_eq!(*exiter.codes.borrow(), vec![1]);
        assert!(harness.output.contains_text("not compatible"));
        assert!(harness.engine.calls().is_empty());
    }

    struct PanickingEngine;

    impl EngineInvoker for PanickingEngine {
        fn run(&self, _options: &ExecutionOptions, _args: &[String]) -> Result<()> {
            panic!("engine exploded");
        }
    }

    #[test]
    fn test_panic_becomes_error_exit() {
        let harness = TestHarness::new();
        harness.write_config("");
        harness.fs.add_dir("/live/app/.terraform/plugins");
        let ctx = Context {
            command: engine_version("1.5.7"),
            engine: Arc::new(PanickingEngine),
            ..harness.context()
        };
        let exiter = RecordingExiter::default();

        static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);
        let _guard = hook_lock();
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {
            HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
        }));

        run(argv(&["tgrun", "plan", "--tgrun-working-dir", "/live/app"]), &ctx, &exiter);
        let calls_during_run = HOOK_CALLS.load(Ordering::SeqCst);

        let explode = true;
        let _ = std::panic::catch_unwind(move || {
            if explode {
                panic!("after run");
            }
        });
        let calls_after_run = HOOK_CALLS.load(Ordering::SeqCst);
        std::panic::set_hook(default_hook);

        assert_eq!(calls_during_run, 0);
        assert_eq!(calls_after_run, 1);
        assert_eq!(*exiter.codes.borrow(), vec![1]);
        assert!(harness.output.contains_text("engine exploded"));
    }

    #[test]
    fn test_panic_payload_to_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_payload_to_string(payload.as_ref()), "static");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_payload_to_string(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_payload_to_string(payload.as_ref()), "non-string panic payload");
    }
}
