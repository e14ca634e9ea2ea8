//! Users and the model catalog.

use chrono::Utc;
use rusqlite::{Row, params};
use tracing::info;

use super::{Database, ModelInfo, StoreError, format_timestamp, timestamp_column};

/// Models installed by `cloudspark seed`, as `(name, provider)`.
pub const DEFAULT_CATALOG: [(&str, &str); 4] = [
    ("llama-3.3-70b-versatile", "Groq"),
    ("mixtral-8x7b-32768", "Groq"),
    ("meta-llama/Meta-Llama-3-8B-Instruct", "HuggingFace"),
    ("microsoft/Phi-3-mini-4k-instruct", "HuggingFace"),
];

const MODEL_COLUMNS: &str = "id, name, provider, type, is_enabled, created_at";

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<ModelInfo> {
    Ok(ModelInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        model_type: row.get(3)?,
        is_enabled: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

impl Database {
    /// Creates the user if it does not exist yet. Existing rows are left alone.
    pub async fn ensure_user(&self, id: &str, email: &str) -> Result<(), StoreError> {
        let (id, email) = (id.to_owned(), email.to_owned());
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
                params![id, email, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    /// Every catalog entry, in insertion order.
    pub async fn catalog(&self) -> Result<Vec<ModelInfo>, StoreError> {
        self.call(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MODEL_COLUMNS} FROM ai_models ORDER BY rowid"))?;
            let models = stmt
                .query_map([], model_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(models)
        })
        .await
    }

    /// Enabled catalog entries, in insertion order.
    pub async fn enabled_models(&self) -> Result<Vec<ModelInfo>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MODEL_COLUMNS} FROM ai_models WHERE is_enabled = 1 ORDER BY rowid"
            ))?;
            let models = stmt
                .query_map([], model_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(models)
        })
        .await
    }

    /// Inserts `model`, or updates the row with the same id in place.
    pub async fn upsert_model(&self, model: ModelInfo) -> Result<(), StoreError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO ai_models (id, name, provider, type, is_enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    provider = excluded.provider,
                    type = excluded.type,
                    is_enabled = excluded.is_enabled",
                params![
                    model.id,
                    model.name,
                    model.provider,
                    model.model_type,
                    model.is_enabled,
                    format_timestamp(&model.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Upserts [`DEFAULT_CATALOG`]. Safe to run repeatedly.
    pub async fn seed_catalog(&self) -> Result<usize, StoreError> {
        for (name, provider) in DEFAULT_CATALOG {
            self.upsert_model(ModelInfo::new(name, provider)).await?;
            info!(model = name, provider, "catalog entry seeded");
        }
        Ok(DEFAULT_CATALOG.len())
    }
}
