//! CSV ingestion of telematics logs

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::Reading;

#[derive(Debug, Deserialize)]
struct Row {
    timestamp: u64,
    latitude: f64,
    longitude: f64,
    speed_kmh: f64,
}

/// Read `timestamp,latitude,longitude,speed_kmh` rows; extra columns are ignored.
pub fn read_readings(path: &Path) -> Result<Vec<Reading>> {
    let file = std::fs::File::open(path)?;
    let readings = parse_readings(file)?;
    info!("Loaded {} readings from {:?}", readings.len(), path);
    Ok(readings)
}

pub fn parse_readings<R: std::io::Read>(source: R) -> Result<Vec<Reading>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);

    let mut readings = Vec::new();
    for row in reader.deserialize::<Row>() {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            PipelineError::Ingest(format!("line {}: {}", line, e))
        })?;

        if !row.speed_kmh.is_finite() || row.speed_kmh < 0.0 {
            return Err(PipelineError::Ingest(format!(
                "timestamp {}: speed {} is not a non-negative number",
                row.timestamp, row.speed_kmh
            )));
        }

        readings.push(Reading::new(row.timestamp, row.latitude, row.longitude, row.speed_kmh));
    }

    debug!("Parsed {} rows", readings.len());
    Ok(readings)
}

/// Mean speed over all readings, `None` when there are none
pub fn average_speed(readings: &[Reading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let total: f64 = readings.iter().map(|r| r.speed).sum();
    Some(total / readings.len() as f64)
}
