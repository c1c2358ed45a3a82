//! Capability registry: which (provider, model) pairs support which tasks

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// Key of a capability table entry that applies to every model
pub const WILDCARD: &str = "*";

/// Generation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    TextToImage,
    ImageToImage,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::TextToImage, Task::ImageToImage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::TextToImage => "text_to_image",
            Task::ImageToImage => "image_to_image",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text_to_image" => Ok(Task::TextToImage),
            "image_to_image" => Ok(Task::ImageToImage),
            other => Err(AppError::InvalidTask(other.to_string())),
        }
    }
}

/// Capability table of a single provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCapabilities {
    /// Any model name is accepted for these tasks
    Wildcard(BTreeSet<Task>),
    /// Explicit model -> tasks mapping
    Models(BTreeMap<String, BTreeSet<Task>>),
}

/// Read-only provider -> model -> task matrix, loaded once at startup
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    providers: BTreeMap<String, ProviderCapabilities>,
    document: Value,
}

impl CapabilityRegistry {
    /// Build the registry from a `{provider: {model: [task, ...]}}` document
    pub fn from_document(document: Value) -> Result<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| config_error("capability document must be a JSON object".to_string()))?;

        let mut providers = BTreeMap::new();
        for (provider, table) in root {
            let table = table.as_object().ok_or_else(|| {
                config_error(format!("capabilities of provider '{}' must be an object", provider))
            })?;
            if table.is_empty() {
                return Err(config_error(format!(
                    "provider '{}' has an empty capability table",
                    provider
                )));
            }

            let capabilities = if let Some(tasks) = table.get(WILDCARD) {
                if table.len() > 1 {
                    warn!(
                        provider = %provider,
                        ignored = table.len() - 1,
                        "Wildcard capability table also lists explicit models; they are ignored"
                    );
                }
                ProviderCapabilities::Wildcard(parse_tasks(provider, WILDCARD, tasks)?)
            } else {
                let mut models = BTreeMap::new();
                for (model, tasks) in table {
                    models.insert(model.clone(), parse_tasks(provider, model, tasks)?);
                }
                ProviderCapabilities::Models(models)
            };

            providers.insert(provider.clone(), capabilities);
        }

        info!(providers = providers.len(), "Loaded capability registry");

        Ok(Self {
            providers,
            document,
        })
    }

    /// Load the registry document from a JSON file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!(
                "Failed to read capability document {}: {}",
                path.display(),
                e
            ))
        })?;
        let document: Value = serde_json::from_str(&content).map_err(|e| {
            config_error(format!(
                "Failed to parse capability document {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_document(document)
    }

    /// Check that `provider` serves `model` for `task`
    pub fn validate(&self, provider: &str, model: &str, task: Task) -> Result<()> {
        let capabilities = self
            .providers
            .get(provider)
            .ok_or_else(|| AppError::UnknownProvider(provider.to_string()))?;

        match capabilities {
            ProviderCapabilities::Wildcard(tasks) => {
                if !tasks.contains(&task) {
                    return Err(AppError::UnsupportedTask {
                        provider: provider.to_string(),
                        model: None,
                        task: task.to_string(),
                    });
                }
            }
            ProviderCapabilities::Models(models) => {
                let tasks = models.get(model).ok_or_else(|| AppError::UnknownModel {
                    provider: provider.to_string(),
                    model: model.to_string(),
                })?;
                if !tasks.contains(&task) {
                    return Err(AppError::UnsupportedTask {
                        provider: provider.to_string(),
                        model: Some(model.to_string()),
                        task: task.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The document as it was loaded, for discovery by clients
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn capabilities(&self, provider: &str) -> Option<&ProviderCapabilities> {
        self.providers.get(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn parse_tasks(provider: &str, model: &str, tasks: &Value) -> Result<BTreeSet<Task>> {
    let list = tasks.as_array().ok_or_else(|| {
        config_error(format!(
            "tasks of '{}/{}' must be a list of task names",
            provider, model
        ))
    })?;

    let mut parsed = BTreeSet::new();
    for task in list {
        let name = task.as_str().ok_or_else(|| {
            config_error(format!("task of '{}/{}' must be a string", provider, model))
        })?;
        let task = name.parse::<Task>().map_err(|_| {
            config_error(format!(
                "unknown task '{}' for '{}/{}'",
                name, provider, model
            ))
        })?;
        parsed.insert(task);
    }

    if parsed.is_empty() {
        return Err(config_error(format!(
            "'{}/{}' must support at least one task",
            provider, model
        )));
    }

    Ok(parsed)
}

fn config_error(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}
