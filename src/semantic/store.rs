use super::registry::{RegistryDocument, SemanticClassRegistry};
use crate::error::{CaptureError, RegistryError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REGISTRY_FILE_NAME: &str = "semantic_classes.json";

/// Project-scoped persistence for the semantic class registry.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            path: project_dir.as_ref().join(REGISTRY_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored registry, or a fresh one when nothing was saved yet.
    pub async fn load(&self) -> Result<SemanticClassRegistry, CaptureError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No registry at {}, starting with an empty one",
                    self.path.display()
                );
                return Ok(SemanticClassRegistry::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: RegistryDocument = serde_json::from_str(&content)
            .map_err(|e| RegistryError::SchemaError(e.to_string()))?;
        let registry = SemanticClassRegistry::from_document(document)?;
        info!(
            "Loaded {} semantic class(es) from {}",
            registry.len(),
            self.path.display()
        );
        Ok(registry)
    }

    pub async fn save(&self, registry: &SemanticClassRegistry) -> Result<(), CaptureError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, registry.to_json()?).await?;
        debug!("Saved semantic classes to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scene::{ObjectId, Rgb};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_fresh_registry() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path());
        let registry = store.load().await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_assignments() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path().join("project"));
        let mut registry = SemanticClassRegistry::new();
        let car = registry.define_class("car", Rgb::new(255, 0, 0)).unwrap();
        let object = ObjectId::new();
        registry.assign(object, car).unwrap();

        store.save(&registry).await.unwrap();
        let loaded = store.load().await.unwrap();

        let car = loaded.class_by_name("car").unwrap();
        assert_eq!(loaded.class_of(object), Some(car));
    }

    #[tokio::test]
    async fn test_objects_gone_from_the_scene_are_not_saved_again() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path());
        let mut registry = SemanticClassRegistry::new();
        let car = registry.define_class("car", Rgb::new(255, 0, 0)).unwrap();
        let (kept, stale) = (ObjectId::new(), ObjectId::new());
        registry.assign(kept, car).unwrap();
        registry.assign(stale, car).unwrap();
        store.save(&registry).await.unwrap();

        let mut reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.prune_objects(|id| id == kept), 1);
        store.save(&reloaded).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.class_of(kept), loaded.class_by_name("car"));
        assert_eq!(loaded.class_of(stale), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_schema_error() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path());
        tokio::fs::write(store.path(), "not json").await.unwrap();

        let error = store.load().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SchemaError);
    }
}
