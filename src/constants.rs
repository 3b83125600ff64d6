/// Column names and defaults shared by the extract, transform and load stages.
/// The raw names are the headers of the flight-performance source files; the
/// canonical names are the warehouse column names.

/// Positional raw -> canonical mapping, in canonical column order.
pub const COLUMN_MAPPING: [(&str, &str); 16] = [
    ("Year", "year"),
    ("Month", "month"),
    ("DayofMonth", "day"),
    ("DayOfWeek", "day_of_week"),
    ("Reporting_Airline", "airline"),
    ("Flight_Number_Reporting_Airline", "flight_number"),
    ("Origin", "origin_airport"),
    ("Dest", "destination_airport"),
    ("CRSDepTime", "scheduled_departure"),
    ("DepTime", "departure_time"),
    ("DepDelay", "departure_delay"),
    ("CRSArrTime", "scheduled_arrival"),
    ("ArrTime", "arrival_time"),
    ("ArrDelay", "arrival_delay"),
    ("AirTime", "air_time"),
    ("Distance", "distance"),
];

/// Rows missing any of these are dropped by the transformer.
pub const KEY_COLUMNS: [&str; 3] = ["flight_number", "origin_airport", "destination_airport"];

/// Clock-time columns rendered as 4-character zero-padded strings.
pub const TIME_COLUMNS: [&str; 4] = [
    "scheduled_departure",
    "departure_time",
    "scheduled_arrival",
    "arrival_time",
];

/// Columns coerced to integers, defaulting to 0.
pub const INTEGER_COLUMNS: [&str; 8] = [
    "year",
    "month",
    "day",
    "day_of_week",
    "departure_delay",
    "arrival_delay",
    "air_time",
    "distance",
];

/// Cell values read as missing. Matched exactly, without trimming.
pub const NULL_SENTINELS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub const DEFAULT_TABLE: &str = "flight_delays";
pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_AGGREGATION_PROGRAM: &str = "dbt";
pub const DEFAULT_AGGREGATION_ARGS: [&str; 1] = ["run"];

pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASS: &str = "";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "flight_delays";
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const PUSHGATEWAY_URL_ENV: &str = "FLIGHT_ETL_PUSHGATEWAY_URL";
