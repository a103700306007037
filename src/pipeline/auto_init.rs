//! Deciding whether `init` has to run before the requested command.

use crate::config::ModuleConfig;
use crate::context::Context;
use crate::options::ExecutionOptions;
use crate::remote_state::RemoteStateSpec;
use crate::scanner::SourceGlob;
use crate::traits::FileSystem;
use anyhow::Result;
use lazy_static::lazy_static;
use regex::bytes::Regex;

/// Engine commands that read or write state
pub const COMMANDS_THAT_USE_STATE: &[&str] = &[
    "init",
    "apply",
    "destroy",
    "env",
    "import",
    "graph",
    "output",
    "plan",
    "push",
    "refresh",
    "show",
    "taint",
    "untaint",
    "validate",
    "force-unlock",
    "state",
];

/// Engine commands that never need init
pub const COMMANDS_THAT_DO_NOT_NEED_INIT: &[&str] = &["version"];

const PROVIDER_DIRS: &[&str] = &[".terraform/plugins", ".terraform/providers"];
const MODULES_DIR: &str = ".terraform/modules";

lazy_static! {
    static ref MODULE_REGEX: Regex =
        Regex::new(r#"module[[:blank:]]+".+""#).expect("valid module regex");
}

/// True if the command in `options` needs `init` first.
///
/// Signals are checked cheapest first: the no-init command set, missing
/// providers, missing modules, then remote state.
pub fn needs_init(ctx: &Context, options: &ExecutionOptions, config: &ModuleConfig) -> Result<bool> {
    if COMMANDS_THAT_DO_NOT_NEED_INIT.contains(&options.first_arg()) {
        return Ok(false);
    }

    if providers_need_init(ctx.fs.as_ref(), options) {
        return Ok(true);
    }

    if modules_need_init(ctx, options)? {
        return Ok(true);
    }

    remote_state_needs_init(ctx.fs.as_ref(), config.remote_state(), options)
}

/// Neither the legacy nor the current provider cache dir exists
fn providers_need_init(fs: &dyn FileSystem, options: &ExecutionOptions) -> bool {
    !PROVIDER_DIRS
        .iter()
        .any(|dir| fs.exists(&options.working_dir.join(dir)))
}

fn modules_need_init(ctx: &Context, options: &ExecutionOptions) -> Result<bool> {
    if ctx.fs.exists(&options.working_dir.join(MODULES_DIR)) {
        return Ok(false);
    }

    ctx.scanner
        .scan_matches(&MODULE_REGEX, &options.working_dir, SourceGlob::top_level(".tf"))
}

/// Remote state only matters for commands that touch state
pub fn remote_state_needs_init(
    fs: &dyn FileSystem,
    remote_state: Option<&dyn RemoteStateSpec>,
    options: &ExecutionOptions,
) -> Result<bool> {
    match remote_state {
        Some(remote_state) if COMMANDS_THAT_USE_STATE.contains(&options.first_arg()) => {
            remote_state.needs_init(fs, options)
        }
        _ => Ok(false),
    }
}
