use crate::options::ExecutionOptions;
use crate::traits::FileSystem;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What the pipeline needs from a remote state configuration
pub trait RemoteStateSpec: Send + Sync {
    /// Backend type, e.g. "s3" or "gcs"
    fn backend(&self) -> &str;

    /// Whether the engine must (re-)run init for this backend
    fn needs_init(&self, fs: &dyn FileSystem, options: &ExecutionOptions) -> Result<bool>;

    /// Prepare remote storage before init
    fn initialize(&self, options: &ExecutionOptions) -> Result<()>;

    /// Arguments that point `init` at this backend
    fn to_init_arguments(&self) -> Vec<String>;
}

/// The `remote_state` section of a module config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteState {
    pub backend: String,

    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

/// The subset of the engine's local state file tgrun reads
#[derive(Debug, Deserialize)]
struct TerraformState {
    #[serde(default)]
    backend: Option<TerraformBackend>,
}

#[derive(Debug, Deserialize)]
struct TerraformBackend {
    #[serde(rename = "type")]
    backend_type: String,
    #[serde(default)]
    config: BTreeMap<String, serde_json::Value>,
}

impl RemoteState {
    /// Find and parse the engine's local state file, if there is one
    fn read_local_state(fs: &dyn FileSystem, working_dir: &std::path::Path) -> Result<Option<TerraformState>> {
        let candidates: [PathBuf; 2] = [
            working_dir.join(".terraform").join("terraform.tfstate"),
            working_dir.join("terraform.tfstate"),
        ];

        for path in candidates.iter() {
            if fs.is_file(path) {
                let contents = fs.read_to_string(path)?;
                let state: TerraformState = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse state file {:?}", path))?;
                return Ok(Some(state));
            }
        }

        Ok(None)
    }

    /// True if the existing backend differs in type or in any configured setting
    fn differs_from(&self, existing: &TerraformBackend) -> bool {
        if existing.backend_type != self.backend {
            return true;
        }

        self.config.iter().any(|(key, value)| {
            existing
                .config
                .get(key)
                .map(json_value_to_string)
                .as_deref()
                != Some(yaml_value_to_string(value).as_str())
        })
    }
}

impl RemoteStateSpec for RemoteState {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn needs_init(&self, fs: &dyn FileSystem, options: &ExecutionOptions) -> Result<bool> {
        let Some(state) = Self::read_local_state(fs, &options.working_dir)? else {
            return Ok(true);
        };

        match state.backend {
            Some(existing) => Ok(self.differs_from(&existing)),
            None => Ok(true),
        }
    }

    fn initialize(&self, options: &ExecutionOptions) -> Result<()> {
        if self.backend.trim().is_empty() {
            anyhow::bail!(
                "remote_state in {} must specify a backend",
                options.config_path.display()
            );
        }

        options.logger.info(&format!(
            "Initializing remote state for the {} backend",
            self.backend
        ));
        Ok(())
    }

    fn to_init_arguments(&self) -> Vec<String> {
        self.config
            .iter()
            .map(|(key, value)| format!("-backend-config={}={}", key, yaml_value_to_string(value)))
            .collect()
    }
}

fn yaml_value_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
