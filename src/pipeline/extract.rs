use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info, instrument};

use crate::constants::NULL_SENTINELS;
use crate::error::ExtractError;
use crate::observability::metrics;
use crate::types::RawTable;

/// Read a delimited file with a header row into a [`RawTable`].
///
/// No coercion happens here: values are kept as strings, and only the
/// missing-value sentinels in [`NULL_SENTINELS`] become `None`. Every data row
/// must have as many fields as the header.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn extract(path: &Path, delimiter: u8) -> Result<RawTable, ExtractError> {
    let t0 = std::time::Instant::now();
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExtractError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ExtractError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .delimiter(delimiter)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| read_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ExtractError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    debug!("header has {} columns", headers.len());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| read_error(path, e))?;
        rows.push(record.iter().map(cell).collect());
    }

    info!("extracted {} rows x {} columns", rows.len(), headers.len());
    metrics::extract::rows_read(rows.len());
    metrics::extract::duration(t0.elapsed().as_secs_f64());

    Ok(RawTable::new(headers, rows))
}

fn cell(value: &str) -> Option<String> {
    if NULL_SENTINELS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn read_error(path: &Path, err: csv::Error) -> ExtractError {
    if err.is_io_error() {
        return ExtractError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        };
    }
    ExtractError::Malformed {
        path: path.to_path_buf(),
        line: err.position().map(|p| p.line()),
        source: err,
    }
}
