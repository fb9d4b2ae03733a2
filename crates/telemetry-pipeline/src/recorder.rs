use std::io::Write;
use std::time::Instant;

use device_registry::DeviceRegistry;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::{Result, TelemetryError, TelemetrySnapshot};

/// Name for the `index`-th recording started in the hour of `now`.
pub fn record_file_name(now: OffsetDateTime, index: u32) -> Result<String> {
    let stamp = now.format(format_description!("[year]-[month]-[day]-[hour]"))?;
    Ok(format!("{stamp}_data_{index}.csv"))
}

/// Writes snapshots as CSV rows, one column per configured sensor.
pub struct SnapshotRecorder<W: Write> {
    writer: csv::Writer<W>,
    columns: Vec<String>,
    started: Instant,
    rows: u64,
}

impl<W: Write> SnapshotRecorder<W> {
    /// Write the header row. Columns follow sensor address order.
    pub fn new(writer: W, registry: &DeviceRegistry) -> Result<Self> {
        let columns: Vec<String> = registry.sensors().map(|s| s.name.clone()).collect();
        let mut writer = csv::Writer::from_writer(writer);
        let header = std::iter::once("elapsed").chain(columns.iter().map(String::as_str));
        writer.write_record(header)?;
        Ok(Self {
            writer,
            columns,
            started: Instant::now(),
            rows: 0,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append a row stamped with the time since the recorder was created.
    pub fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<()> {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.record_at(elapsed, snapshot)
    }

    pub fn record_at(&mut self, elapsed_secs: f64, snapshot: &TelemetrySnapshot) -> Result<()> {
        let mut row = Vec::with_capacity(self.columns.len() + 1);
        row.push(format!("{elapsed_secs:.3}"));
        for name in &self.columns {
            row.push(match snapshot.sensor(name) {
                Some(reading) => format!("{:.2}", reading.value),
                None => "N/A".to_string(),
            });
        }
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| TelemetryError::Io(e.into_error()))
    }
}
