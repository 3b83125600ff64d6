use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::error::LoadError;
use crate::observability::metrics;
use crate::storage::Warehouse;
use crate::types::CanonicalTable;

/// Append every canonical record to `target`, creating the table first when
/// it does not exist. Returns the number of rows written.
///
/// Nothing is deduplicated: loading the same table twice stores it twice.
#[instrument(skip_all, fields(table = %target, rows = table.len()))]
pub async fn load(
    table: &CanonicalTable,
    warehouse: &dyn Warehouse,
    target: &str,
) -> Result<u64, LoadError> {
    let t0 = Instant::now();

    let result = match warehouse.ensure_table(target).await {
        Ok(()) => warehouse.append(target, &table.records).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(written) => {
            info!("loaded {} rows into {}", written, target);
            metrics::load::rows_written(written);
            metrics::load::duration(t0.elapsed().as_secs_f64());
            Ok(written)
        }
        Err(e) => {
            warn!("load into {} failed: {}", target, e);
            metrics::load::failed(error_type(&e));
            Err(e)
        }
    }
}

fn error_type(err: &LoadError) -> &'static str {
    match err {
        LoadError::Connection { .. } => "connection",
        LoadError::Constraint { .. } => "constraint",
        LoadError::SchemaMismatch { .. } => "schema_mismatch",
        LoadError::Store { .. } => "store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryWarehouse;
    use crate::types::CanonicalRecord;

    fn table(n: usize) -> CanonicalTable {
        let records = (0..n)
            .map(|i| CanonicalRecord {
                year: 2023,
                month: 7,
                day: 4,
                day_of_week: 2,
                airline: Some("AA".to_string()),
                flight_number: (100 + i).to_string(),
                origin_airport: "JFK".to_string(),
                destination_airport: "LAX".to_string(),
                scheduled_departure: "0130".to_string(),
                departure_time: "0145".to_string(),
                departure_delay: 15,
                scheduled_arrival: "0430".to_string(),
                arrival_time: "0440".to_string(),
                arrival_delay: 10,
                air_time: 330,
                distance: 2475,
            })
            .collect();
        CanonicalTable {
            records,
            rows_in: n,
            rows_dropped: 0,
        }
    }

    #[tokio::test]
    async fn test_load_creates_table_and_appends() {
        let warehouse = InMemoryWarehouse::new();
        let written = load(&table(3), &warehouse, "flight_delays").await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(warehouse.row_count("flight_delays").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_repeated_load_grows_by_same_amount() {
        let warehouse = InMemoryWarehouse::new();
        let t = table(2);
        load(&t, &warehouse, "flight_delays").await.unwrap();
        let before = warehouse.row_count("flight_delays").await.unwrap();
        load(&t, &warehouse, "flight_delays").await.unwrap();
        let after = warehouse.row_count("flight_delays").await.unwrap();
        assert_eq!(after - before, 2);
    }

    #[tokio::test]
    async fn test_empty_table_loads_zero_rows() {
        let warehouse = InMemoryWarehouse::new();
        assert_eq!(load(&table(0), &warehouse, "flight_delays").await.unwrap(), 0);
        assert_eq!(warehouse.row_count("flight_delays").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .fail_appends_with(LoadError::Constraint {
                message: "null value in column \"flight_number\"".to_string(),
            })
            .await;
        let err = load(&table(1), &warehouse, "flight_delays").await.unwrap_err();
        assert!(matches!(err, LoadError::Constraint { .. }));
    }
}
