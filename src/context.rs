use crate::config::{ConfigLoader, YamlConfigLoader};
use crate::credentials::{AwsCliCredentialProvider, CredentialProvider};
use crate::engine::{EngineInvoker, ProcessEngineInvoker};
use crate::scanner::{FileSystemScanner, SourceScanner};
use crate::source::{CacheSourceDownloader, SourceDownloader};
use crate::stack::{StackOrchestrator, SubfolderStackOrchestrator};
use crate::traits::{
    CommandExecutor, FileSystem, InquireUserInput, Output, RealCommandExecutor, RealFileSystem,
    TerminalOutput, UserInput,
};
#[cfg(test)]
use crate::traits::{MockCommandExecutor, MockFileSystem, MockOutput, MockUserInput};
use std::sync::Arc;

/// Application context that holds all dependencies for dependency injection
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub input: Arc<dyn UserInput>,
    pub output: Arc<dyn Output>,
    pub command: Arc<dyn CommandExecutor>,
    pub scanner: Arc<dyn SourceScanner>,
    pub engine: Arc<dyn EngineInvoker>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub config_loader: Arc<dyn ConfigLoader>,
    pub downloader: Arc<dyn SourceDownloader>,
    pub stacks: Arc<dyn StackOrchestrator>,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new() -> Self {
        Self::wire(
            Arc::new(RealFileSystem),
            Arc::new(InquireUserInput),
            Arc::new(TerminalOutput),
            Arc::new(RealCommandExecutor::new()),
        )
    }

    /// Create a new context with mock implementations (for testing).
    /// The pipeline collaborators run on top of the mocks.
    #[cfg(test)]
    pub fn test() -> Self {
        Self::wire(
            Arc::new(MockFileSystem::new()),
            Arc::new(MockUserInput::new()),
            Arc::new(MockOutput::new()),
            Arc::new(MockCommandExecutor::new()),
        )
    }

    /// Build the default collaborators over the given primitives
    fn wire(
        fs: Arc<dyn FileSystem>,
        input: Arc<dyn UserInput>,
        output: Arc<dyn Output>,
        command: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            scanner: Arc::new(FileSystemScanner::new(fs.clone())),
            engine: Arc::new(ProcessEngineInvoker::new(command.clone())),
            credentials: Arc::new(AwsCliCredentialProvider::new(command.clone())),
            config_loader: Arc::new(YamlConfigLoader::new(fs.clone())),
            downloader: Arc::new(CacheSourceDownloader),
            stacks: Arc::new(SubfolderStackOrchestrator::new(fs.clone())),
            fs,
            input,
            output,
            command,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            command: Arc::clone(&self.command),
            scanner: Arc::clone(&self.scanner),
            engine: Arc::clone(&self.engine),
            credentials: Arc::clone(&self.credentials),
            config_loader: Arc::clone(&self.config_loader),
            downloader: Arc::clone(&self.downloader),
            stacks: Arc::clone(&self.stacks),
        }
    }
}
