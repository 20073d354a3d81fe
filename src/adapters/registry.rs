//! Local registry of data definitions.
//!
//! Definitions are indexed under both their id and their path, so payloads
//! that carry either one can be matched. A registry can be filled from a
//! directory of `.yaml`/`.yml`/`.json` definition files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DefinitionSource, TransportError};
use crate::domain::{DataDefinition, DefinitionError};

/// Definitions keyed by id and path
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    by_key: HashMap<String, Arc<DataDefinition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its id and path.
    ///
    /// A definition with neither is kept nowhere and `None` is returned.
    pub fn insert(&mut self, definition: DataDefinition) -> Option<Arc<DataDefinition>> {
        let definition = Arc::new(definition);
        let keys: Vec<String> = [definition.id(), definition.path()]
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            warn!("Definition has neither id nor path; not registered");
            return None;
        }
        for key in keys {
            self.by_key.insert(key, Arc::clone(&definition));
        }
        Some(definition)
    }

    /// Load every definition file in `dir` (non-recursive)
    pub fn load_dir(dir: &Path) -> Result<Self, DefinitionError> {
        let mut registry = Self::new();
        let entries = std::fs::read_dir(dir).map_err(|source| DefinitionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DefinitionError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let is_definition = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| matches!(ext, "yaml" | "yml" | "json"));
            if is_definition && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let definition = DataDefinition::from_file(&path)?;
            debug!(file = %path.display(), key = ?definition.key(), "Loaded definition");
            registry.insert(definition);
        }
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<Arc<DataDefinition>> {
        self.by_key.get(key).cloned()
    }

    /// Number of registered keys (a definition with id and path counts twice)
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[async_trait]
impl DefinitionSource for DefinitionRegistry {
    async fn definition(&self, key: &str) -> Result<Arc<DataDefinition>, TransportError> {
        self.get(key)
            .ok_or_else(|| TransportError::NotFound(format!("definition {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SchemaField, TextKind};
    use tempfile::TempDir;

    #[test]
    fn test_insert_indexes_id_and_path() {
        let mut registry = DefinitionRegistry::new();
        let definition = DataDefinition::new(
            Some("d1".into()),
            Some("/defs/news".into()),
            vec![SchemaField::text("title", TextKind::Plain)],
        )
        .unwrap();
        registry.insert(definition);

        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(
            &registry.get("d1").unwrap(),
            &registry.get("/defs/news").unwrap()
        ));
    }

    #[test]
    fn test_anonymous_definition_is_skipped() {
        let mut registry = DefinitionRegistry::new();
        let definition = DataDefinition::new(None, None, vec![]).unwrap();
        assert!(registry.insert(definition).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("news.yaml"),
            r#"
id: news
path: /defs/news
fields:
  - name: title
    type: text
"#,
        )
        .unwrap();
        std::fs::write(temp.path().join("README.md"), "not a definition").unwrap();

        let registry = DefinitionRegistry::load_dir(temp.path()).unwrap();
        let definition = registry.get("news").unwrap();
        assert_eq!(definition.fields().len(), 1);
        assert!(registry.get("/defs/news").is_some());
    }

    #[tokio::test]
    async fn test_missing_definition_is_not_found() {
        let registry = DefinitionRegistry::new();
        let err = registry.definition("nope").await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }
}
