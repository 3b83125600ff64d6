pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::LoadError;
use crate::types::CanonicalRecord;

pub use in_memory::InMemoryWarehouse;
pub use postgres::PostgresWarehouse;

/// Append-only destination for canonical flight records.
///
/// Implementations never truncate, upsert or deduplicate: appending the same
/// records twice stores them twice.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create `table` with the canonical column set if it does not exist yet.
    async fn ensure_table(&self, table: &str) -> Result<(), LoadError>;

    /// Append every record to `table`, returning the number of rows written.
    async fn append(&self, table: &str, records: &[CanonicalRecord]) -> Result<u64, LoadError>;

    async fn row_count(&self, table: &str) -> Result<u64, LoadError>;
}

/// Validate and double-quote a table identifier, optionally `schema.table`.
pub fn quote_table(table: &str) -> Option<String> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
        return None;
    }
    Some(
        parts
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect::<Vec<_>>()
            .join("."),
    )
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_table() {
        assert_eq!(quote_table("flight_delays").as_deref(), Some("\"flight_delays\""));
        assert_eq!(
            quote_table("raw.flight_delays").as_deref(),
            Some("\"raw\".\"flight_delays\"")
        );
        assert_eq!(quote_table("flight delays"), None);
        assert_eq!(quote_table("1flights"), None);
        assert_eq!(quote_table("a.b.c"), None);
        assert_eq!(quote_table("x\"; DROP TABLE y"), None);
        assert_eq!(quote_table(""), None);
    }
}
