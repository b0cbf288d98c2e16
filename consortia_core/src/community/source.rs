//! Where community member models come from
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::io::json::ModelParseError;
use crate::metabolic_model::model::Model;

/// Looks up member models by id
///
/// Sources are shared between threads during knockout analysis, so they must be `Sync`.
pub trait ModelSource: Send + Sync {
    fn load(&self, id: &str) -> Result<Model, ModelSourceError>;
}

/// Reads `<directory>/<id>.json`
#[derive(Debug, Clone)]
pub struct DirectoryModelSource {
    directory: PathBuf,
}

impl DirectoryModelSource {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        DirectoryModelSource {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Path a member's model is expected at
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }
}

impl ModelSource for DirectoryModelSource {
    fn load(&self, id: &str) -> Result<Model, ModelSourceError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(ModelSourceError::NotFound(id.to_string()));
        }
        let mut model = Model::read_json(&path).map_err(|source| ModelSourceError::Parse {
            id: id.to_string(),
            source,
        })?;
        model.id.get_or_insert_with(|| id.to_string());
        Ok(model)
    }
}

/// Models already in memory, keyed by member id
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelSource {
    models: IndexMap<String, Model>,
}

impl InMemoryModelSource {
    pub fn new() -> Self {
        InMemoryModelSource::default()
    }

    /// Add a model under an explicit member id
    pub fn insert(&mut self, id: &str, model: Model) -> Option<Model> {
        self.models.insert(id.to_string(), model)
    }

    /// Create a source keyed by each model's own id, models without an id are skipped
    pub fn from_models<I: IntoIterator<Item = Model>>(models: I) -> Self {
        let models = models
            .into_iter()
            .filter_map(|model| model.id.clone().map(|id| (id, model)))
            .collect();
        InMemoryModelSource { models }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl ModelSource for InMemoryModelSource {
    fn load(&self, id: &str) -> Result<Model, ModelSourceError> {
        self.models
            .get(id)
            .cloned()
            .ok_or_else(|| ModelSourceError::NotFound(id.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum ModelSourceError {
    #[error("No model found for member {0}")]
    NotFound(String),
    #[error("Model for member {id} could not be read")]
    Parse {
        id: String,
        #[source]
        source: ModelParseError,
    },
}
