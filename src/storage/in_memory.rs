use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::Warehouse;
use crate::error::LoadError;
use crate::types::CanonicalRecord;

/// In-memory warehouse for development and testing
#[derive(Clone, Default)]
pub struct InMemoryWarehouse {
    tables: Arc<Mutex<HashMap<String, Vec<CanonicalRecord>>>>,
    fail_appends_with: Arc<Mutex<Option<LoadError>>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append` fail with `error`.
    pub async fn fail_appends_with(&self, error: LoadError) {
        *self.fail_appends_with.lock().await = Some(error);
    }

    /// Snapshot of the rows stored in `table`.
    pub async fn records(&self, table: &str) -> Vec<CanonicalRecord> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn ensure_table(&self, table: &str) -> Result<(), LoadError> {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn append(&self, table: &str, records: &[CanonicalRecord]) -> Result<u64, LoadError> {
        if let Some(error) = self.fail_appends_with.lock().await.clone() {
            return Err(error);
        }

        let mut tables = self.tables.lock().await;
        let rows = tables.get_mut(table).ok_or_else(|| LoadError::SchemaMismatch {
            message: format!("table '{table}' does not exist"),
        })?;
        rows.extend_from_slice(records);

        debug!("appended {} rows to in-memory table {}", records.len(), table);
        Ok(records.len() as u64)
    }

    async fn row_count(&self, table: &str) -> Result<u64, LoadError> {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .map(|rows| rows.len() as u64)
            .ok_or_else(|| LoadError::SchemaMismatch {
                message: format!("table '{table}' does not exist"),
            })
    }
}
