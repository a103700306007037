use super::TerraformSource;
use crate::config::ModuleConfig;
use crate::context::Context;
use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::pipeline::init::run_init;
use crate::traits::FileSystem;
use anyhow::{Context as _, Result};
use std::path::{Component, Path};

/// Resolve `source_url`, download it if needed, copy the module's own files
/// on top, and switch `options.working_dir` to the downloaded code.
pub fn download_terraform_source(
    ctx: &Context,
    source_url: &str,
    options: &mut ExecutionOptions,
    config: &ModuleConfig,
) -> Result<()> {
    let source = ctx
        .downloader
        .resolve(source_url, options)
        .map_err(|e| TgrunError::SourceResolution {
            source: source_url.to_string(),
            message: format!("{:#}", e),
        })?;

    download_source_if_necessary(ctx, &source, options, config)?;

    options.logger.dimmed(&format!(
        "Copying files from {} into {}",
        options.working_dir.display(),
        source.working_dir.display()
    ));
    copy_module_files(ctx.fs.as_ref(), &options.working_dir, &source.working_dir).with_context(
        || {
            format!(
                "Failed to copy module files from {} into {}",
                options.working_dir.display(),
                source.working_dir.display()
            )
        },
    )?;

    options.logger.info(&format!(
        "Setting working directory to {}",
        source.working_dir.display()
    ));
    options.working_dir = source.working_dir;

    Ok(())
}

/// Download `source` into its download dir through an init sub-invocation,
/// unless the dir already holds the same version
pub fn download_source_if_necessary(
    ctx: &Context,
    source: &TerraformSource,
    options: &ExecutionOptions,
    config: &ModuleConfig,
) -> Result<()> {
    if options.source_update && ctx.fs.exists(&source.download_dir) {
        options.logger.info(&format!(
            "The --tgrun-source-update flag is set, so deleting {} before downloading source",
            source.download_dir.display()
        ));
        ctx.fs.remove_dir_all(&source.download_dir).with_context(|| {
            format!("Failed to delete download dir {}", source.download_dir.display())
        })?;
    }

    if source.already_have_latest_code(ctx.fs.as_ref())? {
        options.logger.dimmed(&format!(
            "Source {} is already downloaded to {}",
            source.canonical_source_url,
            source.download_dir.display()
        ));
        return Ok(());
    }

    // The engine refuses to download into a non-empty directory
    cleanup_download_dir(ctx.fs.as_ref(), &source.download_dir).with_context(|| {
        format!("Failed to clean download dir {}", source.download_dir.display())
    })?;

    options.logger.info(&format!(
        "Downloading {} into {}",
        source.canonical_source_url,
        source.download_dir.display()
    ));
    run_init(ctx, options, config, Some(source))?;

    source.write_version_file(ctx.fs.as_ref()).with_context(|| {
        format!(
            "Failed to record downloaded version of {} in {}",
            source.canonical_source_url,
            source.download_dir.display()
        )
    })
}

/// Remove everything but hidden entries (e.g. `.terraform`) from the download dir
fn cleanup_download_dir(fs: &dyn FileSystem, download_dir: &Path) -> Result<()> {
    if !fs.is_dir(download_dir) {
        return Ok(());
    }

    for entry in fs.read_dir(download_dir)? {
        if is_hidden(&entry) {
            continue;
        }

        if fs.is_dir(&entry) {
            fs.remove_dir_all(&entry)?;
        } else {
            fs.remove_file(&entry)?;
        }
    }

    Ok(())
}

/// Copy every non-hidden file under `from` into `to`, keeping relative paths
pub fn copy_module_files(fs: &dyn FileSystem, from: &Path, to: &Path) -> Result<()> {
    for path in fs.walk_dir(from, usize::MAX)? {
        if path.starts_with(to) || !fs.is_file(&path) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(from) else {
            continue;
        };

        if relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        }) {
            continue;
        }

        fs.copy_file(&path, &to.join(relative))?;
    }

    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CacheSourceDownloader, SourceDownloader};
    use crate::test_helpers::TestHarness;
    use crate::traits::{MockFileSystem, MockOutput, RealFileSystem};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_copy_skips_hidden_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/live/app/main.tf", "a");
        fs.add_file("/live/app/vars/prod.tfvars", "b");
        fs.add_file("/live/app/.tgrun.yaml", "c");
        fs.add_file("/live/app/.terraform/plugins/p", "d");

        copy_module_files(&fs, Path::new("/live/app"), Path::new("/dl/vpc")).unwrap();

        assert_eq!(fs.get_file_contents(Path::new("/dl/vpc/main.tf")).as_deref(), Some("a"));
        assert_eq!(
            fs.get_file_contents(Path::new("/dl/vpc/vars/prod.tfvars")).as_deref(),
            Some("b")
        );
        assert!(!fs.exists(Path::new("/dl/vpc/.tgrun.yaml")));
        assert!(!fs.exists(Path::new("/dl/vpc/.terraform/plugins/p")));
    }

    #[test]
    fn test_cleanup_keeps_hidden_entries() {
        let fs = MockFileSystem::new();
        fs.add_file("/dl/main.tf", "old");
        fs.add_file("/dl/nested/x.tf", "old");
        fs.add_file("/dl/.terraform/plugins/p", "keep");

        cleanup_download_dir(&fs, Path::new("/dl")).unwrap();

        assert!(!fs.exists(Path::new("/dl/main.tf")));
        assert!(!fs.exists(Path::new("/dl/nested")));
        assert!(fs.exists(Path::new("/dl/.terraform/plugins/p")));
    }

    #[test]
    fn test_download_runs_init_and_switches_working_dir() {
        let harness = TestHarness::new();
        harness.fs.add_file("/live/app/terraform.tfvars", "region = \"eu\"");
        let ctx = harness.context();
        let mut options = harness.options(&["plan"]);
        options.engine_version = semver::Version::new(0, 11, 7);

        download_terraform_source(
            &ctx,
            "git::https://example.com/modules.git//vpc",
            &mut options,
            &ModuleConfig::default(),
        )
        .unwrap();

        let calls = harness.engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[0], "init");
        assert_eq!(calls[0].args[1], "-from-module=git::https://example.com/modules.git//vpc");

        let source_dir: PathBuf = options.working_dir.clone();
        assert!(source_dir.ends_with("vpc"));
        assert!(harness.fs.exists(&source_dir.join("terraform.tfvars")));

        // A second run finds the version file and skips the download
        let mut again = harness.options(&["plan"]);
        again.engine_version = semver::Version::new(0, 11, 7);
        download_terraform_source(
            &ctx,
            "git::https://example.com/modules.git//vpc",
            &mut again,
            &ModuleConfig::default(),
        )
        .unwrap();
        assert_eq!(harness.engine.calls().len(), 1);
    }

    #[test]
    fn test_source_update_forces_download() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let mut options = harness.options(&["plan"]);
        options.engine_version = semver::Version::new(0, 11, 7);
        let url = "git::https://example.com/modules.git";

        download_terraform_source(&ctx, url, &mut options.clone(), &ModuleConfig::default())
            .unwrap();
        options.source_update = true;
        download_terraform_source(&ctx, url, &mut options, &ModuleConfig::default()).unwrap();

        assert_eq!(harness.engine.calls().len(), 2);
    }

    #[test]
    fn test_failed_download_keeps_engine_error() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let mut options = harness.options(&["plan"]);
        options.engine_version = semver::Version::new(0, 11, 7);
        let url = "git::https://example.com/modules.git//vpc";
        let source = CacheSourceDownloader.resolve(url, &options).unwrap();
        harness.engine.fail_in(source.working_dir.clone());

        let err = download_terraform_source(&ctx, url, &mut options, &ModuleConfig::default())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TgrunError>(),
            Some(TgrunError::EngineCommandFailed { .. })
        ));
        assert!(!harness.fs.exists(&source.version_file));
        assert_eq!(options.working_dir, PathBuf::from("/live/app"));
    }

    #[test]
    fn test_copy_failure_names_both_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join("main.tf"), "locals {}\n").unwrap();

        let mut options =
            ExecutionOptions::new(&live, vec!["plan".to_string()], Arc::new(MockOutput::new()));
        options.download_dir = dir.path().join("dl");
        let url = "git::https://example.com/modules.git//vpc";

        // Cached download whose module dir is a plain file
        let source = CacheSourceDownloader.resolve(url, &options).unwrap();
        std::fs::create_dir_all(&source.download_dir).unwrap();
        source.write_version_file(&RealFileSystem).unwrap();
        std::fs::write(&source.working_dir, "not a dir").unwrap();

        let err =
            download_terraform_source(&Context::new(), url, &mut options, &ModuleConfig::default())
                .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to copy module files from"));
        assert!(message.contains(&source.working_dir.display().to_string()));
        assert_eq!(options.working_dir, live);
    }
}
