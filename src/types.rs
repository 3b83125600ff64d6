use serde::{Deserialize, Serialize};

/// A delimited source file as read, before any normalization.
///
/// Cells recognized as missing are `None`; everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    /// Column names from the header row, in file order.
    pub headers: Vec<String>,
    /// One entry per data row, each as wide as `headers`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Position of the first header named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One normalized flight row, shaped like the warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub day_of_week: i64,
    pub airline: Option<String>,
    pub flight_number: String,
    pub origin_airport: String,
    pub destination_airport: String,
    pub scheduled_departure: String,
    pub departure_time: String,
    pub departure_delay: i64,
    pub scheduled_arrival: String,
    pub arrival_time: String,
    pub arrival_delay: i64,
    pub air_time: i64,
    pub distance: i64,
}

/// Output of the transformer: the surviving records plus row accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CanonicalTable {
    pub records: Vec<CanonicalRecord>,
    /// Rows in the raw input.
    pub rows_in: usize,
    /// Rows dropped for a missing flight number, origin or destination.
    pub rows_dropped: usize,
}

impl CanonicalTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
