//! The single-module command pipeline.
//!
//! `run_module` loads config, assumes a role, downloads the module source and
//! checks the backend, then hands over to `run_with_config`, which prepares
//! the command (running init first when needed) and invokes the engine. The
//! init sub-invocation re-enters `run_with_config` on a clone of the options.

pub mod arguments;
pub mod auto_init;
pub mod backend;
pub mod init;

use crate::config::{ModuleConfig, filter_extra_args};
use crate::context::Context;
use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::source::{download_terraform_source, effective_source_url};
use anyhow::Result;

use arguments::verify_source_download_arguments;
use auto_init::{needs_init, remote_state_needs_init};
use backend::check_backend_defined;
use init::run_init;

const INIT_COMMAND: &str = "init";

/// Run the command in `options` against a single module
pub fn run_module(ctx: &Context, options: &mut ExecutionOptions) -> Result<()> {
    let config = ctx.config_loader.load(options)?;

    assume_role_if_necessary(ctx, options)?;

    if let Some(source_url) = effective_source_url(options, &config) {
        download_terraform_source(ctx, &source_url, options, &config)?;
    }

    if let Some(remote_state) = config.remote_state() {
        check_backend_defined(ctx.scanner.as_ref(), options, remote_state.backend())?;
    }

    run_with_config(ctx, options, &config, false)
}

/// Overlay temporary credentials for `options.iam_role` onto the engine's environment
fn assume_role_if_necessary(ctx: &Context, options: &mut ExecutionOptions) -> Result<()> {
    let Some(role) = options.iam_role.clone() else {
        return Ok(());
    };

    options.logger.info(&format!("Assuming IAM role {}", role));

    let credentials = ctx
        .credentials
        .assume_role(&role, options)
        .map_err(|e| TgrunError::RoleAssumption {
            role: role.clone(),
            message: format!("{:#}", e),
        })?;

    for (key, value) in credentials.to_env() {
        options.env.insert(key.to_string(), value);
    }

    Ok(())
}

/// Add extra arguments, prepare init or non-init commands, and run the engine.
///
/// `allow_source_download` is only true for the init sub-invocation that
/// downloads a module source.
pub(crate) fn run_with_config(
    ctx: &Context,
    options: &mut ExecutionOptions,
    config: &ModuleConfig,
    allow_source_download: bool,
) -> Result<()> {
    if !config.extra_arguments().is_empty() {
        let extra = filter_extra_args(ctx.fs.as_ref(), options, config);
        options.insert_engine_cli_args(extra);
    }

    if options.first_arg() == INIT_COMMAND {
        prepare_init_command(ctx, options, config, allow_source_download)?;
    } else {
        prepare_non_init_command(ctx, options, config)?;
    }

    ctx.engine.run(options, &options.engine_cli_args)
}

fn prepare_init_command(
    ctx: &Context,
    options: &mut ExecutionOptions,
    config: &ModuleConfig,
    allow_source_download: bool,
) -> Result<()> {
    verify_source_download_arguments(allow_source_download, &options.engine_cli_args)?;

    if let Some(remote_state) = config.remote_state() {
        if remote_state_needs_init(ctx.fs.as_ref(), Some(remote_state), options)? {
            remote_state.initialize(options)?;
        }

        options.insert_engine_cli_args(remote_state.to_init_arguments());
    }

    Ok(())
}

fn prepare_non_init_command(
    ctx: &Context,
    options: &ExecutionOptions,
    config: &ModuleConfig,
) -> Result<()> {
    if needs_init(ctx, options, config)? {
        options
            .logger
            .info("Running init before the requested command");
        run_init(ctx, options, config, None)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::source::{SourceDownloader, TerraformSource};
    use crate::test_helpers::{MockCredentialProvider, TestHarness};
    use std::path::PathBuf;
    use std::sync::Arc;

    const S3_CONFIG: &str = "remote_state:\n  backend: s3\n  config:\n    bucket: my-state\n    key: app/terraform.tfstate\n";

    fn args(calls: &[crate::test_helpers::EngineCall]) -> Vec<Vec<String>> {
        calls.iter().map(|call| call.args.clone()).collect()
    }

    #[test]
    fn test_apply_with_remote_state_auto_inits_first() {
        let harness = TestHarness::new();
        harness.write_config(S3_CONFIG);
        harness
            .fs
            .add_file("/live/app/main.tf", "terraform {\n  backend \"s3\" {}\n}\n");
        let ctx = harness.context();
        let mut options = harness.options(&["apply"]);

        run_module(&ctx, &mut options).unwrap();

        assert_eq!(
            args(&harness.engine.calls()),
            vec![
                vec![
                    "init".to_string(),
                    "-backend-config=bucket=my-state".to_string(),
                    "-backend-config=key=app/terraform.tfstate".to_string(),
                ],
                vec!["apply".to_string()],
            ]
        );
        assert_eq!(options.engine_cli_args, vec!["apply"]);
    }

    #[test]
    fn test_missing_backend_block_fails_before_engine() {
        let harness = TestHarness::new();
        harness.write_config("remote_state:\n  backend: gcs\n  config:\n    bucket: b\n");
        harness
            .fs
            .add_file("/live/app/main.tf", "terraform {\n  backend \"s3\" {}\n}\n");
        let ctx = harness.context();

        let err = run_module(&ctx, &mut harness.options(&["apply"])).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::BackendNotDefined { backend_type, .. }) if backend_type == "gcs"
        ));
        assert!(err.to_string().contains("gcs"));
        assert!(harness.engine.calls().is_empty());
    }

    #[test]
    fn test_no_remote_state_skips_backend_check() {
        let harness = TestHarness::new();
        harness.write_config("");
        harness.fs.add_dir("/live/app/.terraform/plugins");
        let ctx = harness.context();

        run_module(&ctx, &mut harness.options(&["plan"])).unwrap();

        assert_eq!(args(&harness.engine.calls()), vec![vec!["plan".to_string()]]);
        assert_eq!(harness.scanner.scans(), 1);
    }

    #[test]
    fn test_missing_config_propagates_unchanged() {
        let harness = TestHarness::new();
        let ctx = harness.context();

        let err = run_module(&ctx, &mut harness.options(&["plan"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::ConfigNotFound(path)) if path == &PathBuf::from("/live/app/.tgrun.yaml")
        ));
    }

    #[test]
    fn test_role_credentials_are_overlaid() {
        let harness = TestHarness::new();
        harness.write_config("");
        harness.fs.add_dir("/live/app/.terraform/plugins");
        let credentials = Arc::new(MockCredentialProvider::with_credentials(Credentials {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
        }));
        let ctx = Context {
            credentials: credentials.clone(),
            ..harness.context()
        };
        let mut options = harness.options(&["plan"]);
        options.iam_role = Some("arn:aws:iam::123:role/deploy".to_string());

        run_module(&ctx, &mut options).unwrap();

        assert_eq!(credentials.roles(), vec!["arn:aws:iam::123:role/deploy"]);
        assert_eq!(options.env.get("AWS_ACCESS_KEY_ID").map(String::as_str), Some("AKIA"));
        assert_eq!(options.env.get("AWS_SESSION_TOKEN").map(String::as_str), Some("token"));
        assert_eq!(harness.engine.calls()[0].env.get("AWS_SECRET_ACCESS_KEY").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_role_failure_is_wrapped() {
        let harness = TestHarness::new();
        harness.write_config("");
        let ctx = Context {
            credentials: Arc::new(MockCredentialProvider::failing("AccessDenied")),
            ..harness.context()
        };
        let mut options = harness.options(&["plan"]);
        options.iam_role = Some("arn:aws:iam::123:role/deploy".to_string());

        let err = run_module(&ctx, &mut options).unwrap_err();
        match err.downcast_ref::<TgrunError>() {
            Some(TgrunError::RoleAssumption { role, message }) => {
                assert_eq!(role, "arn:aws:iam::123:role/deploy");
                assert!(message.contains("AccessDenied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(harness.engine.calls().is_empty());
    }

    struct BrokenDownloader;

    impl SourceDownloader for BrokenDownloader {
        fn resolve(&self, _source_url: &str, _options: &ExecutionOptions) -> Result<TerraformSource> {
            anyhow::bail!("unsupported scheme")
        }
    }

    #[test]
    fn test_source_resolution_failure_is_wrapped() {
        let harness = TestHarness::new();
        harness.write_config("terraform:\n  source: s4://bucket/module\n");
        let ctx = Context {
            downloader: Arc::new(BrokenDownloader),
            ..harness.context()
        };

        let err = run_module(&ctx, &mut harness.options(&["plan"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::SourceResolution { source, .. }) if source == "s4://bucket/module"
        ));
    }

    #[test]
    fn test_source_download_then_command_in_download_dir() {
        let harness = TestHarness::new();
        harness.write_config("terraform:\n  source: git::https://example.com/modules.git//vpc\n");
        let ctx = harness.context();
        let mut options = harness.options(&["plan"]);

        run_module(&ctx, &mut options).unwrap();

        let calls = harness.engine.calls();
        // Source download, then auto-init in the fresh download dir, then plan
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].args[0], "init");
        assert_eq!(
            calls[0].args[1],
            "-from-module=git::https://example.com/modules.git//vpc"
        );
        assert_eq!(calls[1].args, vec!["init"]);
        assert_eq!(calls[2].args, vec!["plan"]);
        assert!(calls[2].working_dir.ends_with("vpc"));
        assert_eq!(options.working_dir, calls[2].working_dir);
    }

    #[test]
    fn test_user_cannot_pass_download_arguments_to_init() {
        let harness = TestHarness::new();
        harness.write_config("");
        let ctx = harness.context();

        let err = run_module(&ctx, &mut harness.options(&["init", "-from-module=git::x"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::ArgumentNotAllowed { argument, .. }) if argument == "-from-module=git::x"
        ));

        let err = run_module(&ctx, &mut harness.options(&["init", "somedir"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::ArgumentNotAllowed { argument, .. }) if argument == "somedir"
        ));
        assert!(harness.engine.calls().is_empty());
    }

    #[test]
    fn test_explicit_init_gets_backend_arguments() {
        let harness = TestHarness::new();
        harness.write_config(S3_CONFIG);
        harness
            .fs
            .add_file("/live/app/backend.tf", "terraform {\n  backend \"s3\" {}\n}\n");
        let ctx = harness.context();
        let mut options = harness.options(&["init", "-upgrade"]);
        options.auto_init = false;

        run_module(&ctx, &mut options).unwrap();

        assert_eq!(
            options.engine_cli_args,
            vec![
                "init",
                "-backend-config=bucket=my-state",
                "-backend-config=key=app/terraform.tfstate",
                "-upgrade",
            ]
        );
        assert_eq!(harness.engine.calls().len(), 1);
    }

    #[test]
    fn test_disabled_auto_init_fails_when_init_needed() {
        let harness = TestHarness::new();
        harness.write_config("");
        let ctx = harness.context();
        let mut options = harness.options(&["plan"]);
        options.auto_init = false;

        let err = run_module(&ctx, &mut options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::InitNeededButDisabled)
        ));
        assert!(harness.engine.calls().is_empty());
    }

    #[test]
    fn test_extra_arguments_are_spliced_after_command() {
        let harness = TestHarness::new();
        harness.write_config(
            "terraform:\n  extra_arguments:\n    - name: locks\n      commands: [plan, apply]\n      arguments: [\"-lock-timeout=20m\"]\n",
        );
        harness.fs.add_dir("/live/app/.terraform/plugins");
        let ctx = harness.context();

        run_module(&ctx, &mut harness.options(&["plan", "-out=tf.plan"])).unwrap();

        assert_eq!(
            args(&harness.engine.calls()),
            vec![vec![
                "plan".to_string(),
                "-lock-timeout=20m".to_string(),
                "-out=tf.plan".to_string(),
            ]]
        );
    }

    #[test]
    fn test_version_command_never_inits() {
        let harness = TestHarness::new();
        harness.write_config("");
        let ctx = harness.context();

        run_module(&ctx, &mut harness.options(&["version"])).unwrap();

        assert_eq!(args(&harness.engine.calls()), vec![vec!["version".to_string()]]);
    }
}
