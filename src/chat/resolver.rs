//! Model selection against the persisted catalog.

use crate::database::{Database, ModelInfo, StoreError};

/// Picks the model for a turn.
///
/// An id that names a catalog entry wins, enabled or not. Otherwise the
/// first enabled entry is used, and with none of those the built-in
/// default. An empty id counts as no id.
pub fn select(catalog: &[ModelInfo], requested: Option<&str>) -> ModelInfo {
    let requested = requested.filter(|id| !id.is_empty());
    requested
        .and_then(|id| catalog.iter().find(|m| m.id == id))
        .or_else(|| catalog.iter().find(|m| m.is_enabled))
        .cloned()
        .unwrap_or_else(ModelInfo::builtin_default)
}

#[derive(Clone)]
pub struct ModelResolver {
    db: Database,
}

impl ModelResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Loads the catalog and applies [`select`].
    ///
    /// Only store failures surface as errors; an unknown id never does.
    pub async fn resolve(&self, requested: Option<&str>) -> Result<ModelInfo, StoreError> {
        let catalog = self.db.catalog().await?;
        Ok(select(&catalog, requested))
    }
}
