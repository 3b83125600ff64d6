use tracing::{debug, info};

use crate::constants::COLUMN_MAPPING;
use crate::error::TransformError;
use crate::observability::metrics;
use crate::types::{CanonicalRecord, CanonicalTable, RawTable};

/// Normalize a raw table into the canonical warehouse shape.
///
/// Selects the sixteen source columns, maps them onto canonical names, drops
/// rows without a flight number, origin or destination, renders the clock
/// times as 4-character strings and coerces integer fields (0 on failure).
/// Pure: the same input always yields the same output.
pub fn transform(raw: &RawTable) -> Result<CanonicalTable, TransformError> {
    let columns = select_columns(raw)?;

    let mut records = Vec::with_capacity(raw.len());
    let mut rows_dropped = 0usize;

    for row in &raw.rows {
        let value = |i: usize| row.get(columns[i]).and_then(|c| c.as_deref());

        let (Some(flight_number), Some(origin_airport), Some(destination_airport)) =
            (value(5), value(6), value(7))
        else {
            rows_dropped += 1;
            continue;
        };

        records.push(CanonicalRecord {
            year: coerce_int(value(0)),
            month: coerce_int(value(1)),
            day: coerce_int(value(2)),
            day_of_week: coerce_int(value(3)),
            airline: value(4).map(str::to_string),
            flight_number: flight_number.to_string(),
            origin_airport: origin_airport.to_string(),
            destination_airport: destination_airport.to_string(),
            scheduled_departure: clock_time(value(8)),
            departure_time: clock_time(value(9)),
            departure_delay: coerce_int(value(10)),
            scheduled_arrival: clock_time(value(11)),
            arrival_time: clock_time(value(12)),
            arrival_delay: coerce_int(value(13)),
            air_time: coerce_int(value(14)),
            distance: coerce_int(value(15)),
        });
    }

    if rows_dropped > 0 {
        debug!("dropped {} rows missing flight number, origin or destination", rows_dropped);
    }
    info!("transformed {} of {} rows", records.len(), raw.len());
    metrics::transform::rows_dropped(rows_dropped);
    metrics::transform::rows_output(records.len());

    Ok(CanonicalTable {
        records,
        rows_in: raw.len(),
        rows_dropped,
    })
}

/// Header positions of the mapped source columns, in mapping order.
fn select_columns(raw: &RawTable) -> Result<[usize; 16], TransformError> {
    let mut positions = [0usize; 16];
    let mut missing = Vec::new();
    for (slot, (source, _)) in positions.iter_mut().zip(COLUMN_MAPPING.iter()) {
        match raw.column_index(source) {
            Some(i) => *slot = i,
            None => missing.push(source.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(TransformError::MissingColumns { missing })
    }
}

/// Integer value of a cell; fractional values truncate toward zero.
/// Missing, non-numeric and non-finite values become 0.
pub fn coerce_int(value: Option<&str>) -> i64 {
    let Some(v) = value.map(str::trim) else {
        return 0;
    };
    if let Ok(i) = v.parse::<i64>() {
        return i;
    }
    match v.parse::<f64>() {
        Ok(f) if f.is_finite() => f.trunc() as i64,
        _ => 0,
    }
}

/// Clock time as a 4-character zero-left-padded string, e.g. `130` -> `"0130"`.
pub fn clock_time(value: Option<&str>) -> String {
    format!("{:04}", coerce_int(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        COLUMN_MAPPING.iter().map(|(raw, _)| raw.to_string()).collect()
    }

    fn row(values: [&str; 16]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    fn clean_row() -> [&'static str; 16] {
        [
            "2024", "1", "15", "1", "AA", "123", "JFK", "LAX", "130", "135", "15", "430", "441",
            "11", "301", "2475",
        ]
    }

    #[test]
    fn test_clean_row() {
        let raw = RawTable::new(headers(), vec![row(clean_row())]);
        let table = transform(&raw).unwrap();

        assert_eq!(table.len(), 1);
        let r = &table.records[0];
        assert_eq!(r.flight_number, "123");
        assert_eq!(r.origin_airport, "JFK");
        assert_eq!(r.destination_airport, "LAX");
        assert_eq!(r.airline.as_deref(), Some("AA"));
        assert_eq!(r.scheduled_departure, "0130");
        assert_eq!(r.departure_time, "0135");
        assert_eq!(r.scheduled_arrival, "0430");
        assert_eq!(r.departure_delay, 15);
        assert_eq!(r.year, 2024);
        assert_eq!(r.distance, 2475);
    }

    #[test]
    fn test_rows_missing_keys_are_dropped() {
        let mut no_flight = clean_row();
        no_flight[5] = "";
        let mut no_origin = clean_row();
        no_origin[6] = "";
        let mut no_dest = clean_row();
        no_dest[7] = "";
        let raw = RawTable::new(
            headers(),
            vec![row(clean_row()), row(no_flight), row(no_origin), row(no_dest)],
        );

        let table = transform(&raw).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows_in, 4);
        assert_eq!(table.rows_dropped, 3);
        assert_eq!(table.len(), table.rows_in - table.rows_dropped);
    }

    #[test]
    fn test_missing_airline_is_kept_as_null() {
        let mut values = clean_row();
        values[4] = "";
        let table = transform(&RawTable::new(headers(), vec![row(values)])).unwrap();
        assert_eq!(table.records[0].airline, None);
    }

    #[test]
    fn test_malformed_numerics_default_to_zero() {
        let mut values = clean_row();
        values[10] = "N/A";
        values[13] = "";
        values[0] = "twenty";
        values[9] = "late";
        let table = transform(&RawTable::new(headers(), vec![row(values)])).unwrap();
        let r = &table.records[0];
        assert_eq!(r.departure_delay, 0);
        assert_eq!(r.arrival_delay, 0);
        assert_eq!(r.year, 0);
        assert_eq!(r.departure_time, "0000");
    }

    #[test]
    fn test_clock_time_padding() {
        assert_eq!(clock_time(Some("1")), "0001");
        assert_eq!(clock_time(Some("930")), "0930");
        assert_eq!(clock_time(Some("0")), "0000");
        assert_eq!(clock_time(Some("2359")), "2359");
        assert_eq!(clock_time(Some("130.0")), "0130");
        assert_eq!(clock_time(None), "0000");
        assert_eq!(clock_time(Some("abc")), "0000");
    }

    #[test]
    fn test_coerce_int_truncates_toward_zero() {
        assert_eq!(coerce_int(Some("15.0")), 15);
        assert_eq!(coerce_int(Some("-3.7")), -3);
        assert_eq!(coerce_int(Some(" 42 ")), 42);
        assert_eq!(coerce_int(Some("1e3")), 1000);
        assert_eq!(coerce_int(Some("inf")), 0);
        assert_eq!(coerce_int(Some("NaN")), 0);
    }

    #[test]
    fn test_missing_columns_are_all_reported() {
        let headers: Vec<String> = headers()
            .into_iter()
            .filter(|h| h != "DepDelay" && h != "Dest")
            .collect();
        let err = transform(&RawTable::new(headers, vec![])).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingColumns {
                missing: vec!["Dest".to_string(), "DepDelay".to_string()]
            }
        );
    }

    #[test]
    fn test_extra_and_reordered_columns_are_ignored() {
        let mut hdrs = headers();
        hdrs.reverse();
        hdrs.insert(0, "Tail_Number".to_string());
        let mut values: Vec<Option<String>> = row(clean_row()).into_iter().rev().collect();
        values.insert(0, Some("N12345".to_string()));

        let table = transform(&RawTable::new(hdrs, vec![values])).unwrap();
        assert_eq!(table.records[0].origin_airport, "JFK");
        assert_eq!(table.records[0].scheduled_departure, "0130");
    }

    #[test]
    fn test_transform_is_idempotent() {
        let mut dropped = clean_row();
        dropped[6] = "";
        let raw = RawTable::new(headers(), vec![row(clean_row()), row(dropped)]);
        assert_eq!(transform(&raw).unwrap(), transform(&raw).unwrap());
    }
}
