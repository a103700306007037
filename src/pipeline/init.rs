use super::run_with_config;
use crate::config::ModuleConfig;
use crate::context::Context;
use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::source::TerraformSource;
use anyhow::Result;
use semver::Version;

/// Engine releases before this take the module source as a positional argument
fn from_module_min_version() -> Version {
    Version::new(0, 10, 0)
}

/// Run `init` in an isolated copy of `options`.
///
/// With a `source`, the init runs in the source's working dir and downloads
/// the source into its download dir. The caller's options are never touched.
pub fn run_init(
    ctx: &Context,
    options: &ExecutionOptions,
    config: &ModuleConfig,
    source: Option<&TerraformSource>,
) -> Result<()> {
    if options.first_arg() != "init" && !options.auto_init {
        return Err(TgrunError::InitNeededButDisabled.into());
    }

    let mut init_options = options.clone();
    init_options.engine_cli_args = vec!["init".to_string()];
    // init chatter must not end up on the caller's stdout
    init_options.writer = init_options.err_writer;

    if let Some(source) = source {
        init_options.working_dir = source.working_dir.clone();
        if !ctx.fs.exists(&source.working_dir) {
            ctx.fs.create_dir_all(&source.working_dir)?;
        }

        init_options.append_engine_cli_args(source_download_arguments(
            source,
            &options.engine_version,
        ));
    }

    run_with_config(ctx, &mut init_options, config, source.is_some())
}

/// Version-shaped arguments that make `init` fetch `source`; the download dir is always last
pub fn source_download_arguments(source: &TerraformSource, engine_version: &Version) -> Vec<String> {
    let source_arg = if *engine_version < from_module_min_version() {
        source.canonical_source_url.clone()
    } else {
        format!("-from-module={}", source.canonical_source_url)
    };

    vec![source_arg, source.download_dir.to_string_lossy().into_owned()]
}
