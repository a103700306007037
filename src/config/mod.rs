pub mod extra_args;

use crate::error::TgrunError;
use crate::options::ExecutionOptions;
use crate::remote_state::{RemoteState, RemoteStateSpec};
use crate::traits::FileSystem;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use extra_args::filter_extra_args;

/// Per-module tgrun configuration, loaded from `.tgrun.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Remote state settings that must be mirrored by a backend block
    #[serde(default)]
    pub remote_state: Option<RemoteState>,

    /// Terraform-related settings
    #[serde(default)]
    pub terraform: Option<TerraformConfig>,
}

/// The `terraform` section of a module config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerraformConfig {
    /// Where to download the module's Terraform code from
    #[serde(default)]
    pub source: Option<String>,

    /// Arguments spliced into engine invocations for matching commands
    #[serde(default)]
    pub extra_arguments: Vec<ExtraArguments>,
}

/// One named set of extra engine arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraArguments {
    pub name: String,

    /// Engine commands these arguments apply to
    #[serde(default)]
    pub commands: Vec<String>,

    #[serde(default)]
    pub arguments: Vec<String>,

    /// Var files that are always passed
    #[serde(default)]
    pub required_var_files: Vec<String>,

    /// Var files that are passed only if they exist
    #[serde(default)]
    pub optional_var_files: Vec<String>,
}

impl ModuleConfig {
    /// Parse a module config from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid, empty config
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn remote_state(&self) -> Option<&dyn RemoteStateSpec> {
        self.remote_state
            .as_ref()
            .map(|state| state as &dyn RemoteStateSpec)
    }

    /// The source declared in config, if any
    pub fn source(&self) -> Option<&str> {
        self.terraform
            .as_ref()
            .and_then(|terraform| terraform.source.as_deref())
    }

    pub fn extra_arguments(&self) -> &[ExtraArguments] {
        self.terraform
            .as_ref()
            .map(|terraform| terraform.extra_arguments.as_slice())
            .unwrap_or(&[])
    }
}

/// Loads the config for the module an invocation targets
pub trait ConfigLoader: Send + Sync {
    fn load(&self, options: &ExecutionOptions) -> Result<ModuleConfig>;
}

/// Reads `options.config_path` as YAML
pub struct YamlConfigLoader {
    fs: Arc<dyn FileSystem>,
}

impl YamlConfigLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn load_from(&self, path: &Path) -> Result<ModuleConfig> {
        if !self.fs.is_file(path) {
            return Err(TgrunError::ConfigNotFound(path.to_path_buf()).into());
        }

        let contents = self.fs.read_to_string(path).map_err(|e| TgrunError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config = ModuleConfig::from_yaml(&contents).map_err(|e| TgrunError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(config)
    }
}

impl ConfigLoader for YamlConfigLoader {
    fn load(&self, options: &ExecutionOptions) -> Result<ModuleConfig> {
        self.load_from(&options.config_path)
    }
}
