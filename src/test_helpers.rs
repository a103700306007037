//! Recording doubles for the pipeline's collaborators, and a harness that
//! wires them into a Context over an in-memory filesystem.

#![cfg(test)]

use crate::config::YamlConfigLoader;
use crate::context::Context;
use crate::credentials::{CredentialProvider, Credentials};
use crate::engine::EngineInvoker;
use crate::error::TgrunError;
use crate::options::{ExecutionOptions, StreamTarget};
use crate::scanner::{FileSystemScanner, SourceGlob, SourceScanner};
use crate::source::CacheSourceDownloader;
use crate::stack::{Stack, StackOperation, StackOrchestrator, SubfolderStackOrchestrator};
use crate::traits::{FileSystem, MockCommandExecutor, MockFileSystem, MockOutput, MockUserInput};
use anyhow::Result;
use regex::bytes::Regex;
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Working directory of the harness's default module
pub const MODULE_DIR: &str = "/live/app";

/// One engine invocation as seen by RecordingEngine
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub writer: StreamTarget,
    pub env: HashMap<String, String>,
}

/// Engine that records invocations instead of running anything
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    failing_dirs: Mutex<Vec<PathBuf>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_dirs: Mutex::new(Vec::new()),
        }
    }

    /// Make every invocation in `dir` exit with code 1
    pub fn fail_in(&self, dir: impl Into<PathBuf>) {
        self.failing_dirs.lock().unwrap().push(dir.into());
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl EngineInvoker for RecordingEngine {
    fn run(&self, options: &ExecutionOptions, args: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(EngineCall {
            args: args.to_vec(),
            working_dir: options.working_dir.clone(),
            writer: options.writer,
            env: options.env.clone(),
        });

        if self.failing_dirs.lock().unwrap().contains(&options.working_dir) {
            return Err(TgrunError::EngineCommandFailed {
                command: format!("{} {}", options.engine_path, args.join(" ")),
                exit_code: Some(1),
            }
            .into());
        }

        Ok(())
    }
}

/// SourceScanner that counts scans and delegates to FileSystemScanner
pub struct CountingScanner {
    inner: FileSystemScanner,
    scans: AtomicUsize,
}

impl CountingScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            inner: FileSystemScanner::new(fs),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl SourceScanner for CountingScanner {
    fn scan_matches(&self, pattern: &Regex, root: &Path, glob: SourceGlob<'_>) -> Result<bool> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_matches(pattern, root, glob)
    }
}

/// Credential provider with a canned result
pub struct MockCredentialProvider {
    result: std::result::Result<Credentials, String>,
    roles: Mutex<Vec<String>>,
}

impl MockCredentialProvider {
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            result: Ok(credentials),
            roles: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            roles: Mutex::new(Vec::new()),
        }
    }

    pub fn roles(&self) -> Vec<String> {
        self.roles.lock().unwrap().clone()
    }
}

impl CredentialProvider for MockCredentialProvider {
    fn assume_role(&self, role: &str, _options: &ExecutionOptions) -> Result<Credentials> {
        self.roles.lock().unwrap().push(role.to_string());
        self.result.clone().map_err(|message| anyhow::anyhow!(message))
    }
}

/// Stack orchestrator that returns a fixed two-module stack and records operations
pub struct MockStackOrchestrator {
    operations: Mutex<Vec<StackOperation>>,
}

impl MockStackOrchestrator {
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn operations(&self) -> Vec<StackOperation> {
        self.operations.lock().unwrap().clone()
    }
}

impl StackOrchestrator for MockStackOrchestrator {
    fn find_stack(&self, options: &ExecutionOptions) -> Result<Stack> {
        let modules = ["network", "service"]
            .iter()
            .map(|name| {
                let path = options.working_dir.join(name);
                crate::stack::StackModule {
                    config_path: path.join(".tgrun.yaml"),
                    path,
                }
            })
            .collect();

        Ok(Stack {
            path: options.working_dir.clone(),
            modules,
        })
    }

    fn run(
        &self,
        _ctx: &Context,
        _stack: &Stack,
        operation: StackOperation,
        _options: &ExecutionOptions,
    ) -> Result<()> {
        self.operations.lock().unwrap().push(operation);
        Ok(())
    }
}

/// Concrete handles to every double, so tests can seed and inspect them
pub struct TestHarness {
    pub fs: Arc<MockFileSystem>,
    pub input: Arc<MockUserInput>,
    pub output: Arc<MockOutput>,
    pub command: Arc<MockCommandExecutor>,
    pub scanner: Arc<CountingScanner>,
    pub engine: Arc<RecordingEngine>,
    pub stacks: Arc<MockStackOrchestrator>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_answers(Vec::new())
    }

    /// Harness whose prompts are answered with `answers`, in order
    pub fn with_answers(answers: Vec<bool>) -> Self {
        let fs = Arc::new(MockFileSystem::new());
        Self {
            scanner: Arc::new(CountingScanner::new(fs.clone())),
            fs,
            input: Arc::new(MockUserInput::with_answers(answers)),
            output: Arc::new(MockOutput::new()),
            command: Arc::new(MockCommandExecutor::new()),
            engine: Arc::new(RecordingEngine::new()),
            stacks: Arc::new(MockStackOrchestrator::new()),
        }
    }

    /// Context over the doubles, with the real subfolder stack orchestrator
    pub fn context(&self) -> Context {
        Context {
            fs: self.fs.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            command: self.command.clone(),
            scanner: self.scanner.clone(),
            engine: self.engine.clone(),
            credentials: Arc::new(MockCredentialProvider::failing("no credentials configured")),
            config_loader: Arc::new(YamlConfigLoader::new(self.fs.clone())),
            downloader: Arc::new(CacheSourceDownloader),
            stacks: Arc::new(SubfolderStackOrchestrator::new(self.fs.clone())),
        }
    }

    /// Context whose stack orchestrator is the recording mock
    pub fn stack_context(&self) -> Context {
        Context {
            stacks: self.stacks.clone(),
            ..self.context()
        }
    }

    /// Options for running `args` in the default module
    pub fn options(&self, args: &[&str]) -> ExecutionOptions {
        let mut options = ExecutionOptions::new(
            MODULE_DIR,
            args.iter().map(|s| s.to_string()).collect(),
            self.output.clone(),
        );
        options.download_dir = PathBuf::from("/tmp/tgrun-download");
        options.engine_version = Version::new(1, 5, 7);
        options
    }

    /// Write the default module's config file
    pub fn write_config(&self, yaml: &str) {
        self.fs
            .add_file(Path::new(MODULE_DIR).join(".tgrun.yaml"), yaml);
    }
}
