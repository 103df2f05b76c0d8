//! Marker table export
//!
//! Writes a header block describing the device, the per-value summary and the
//! interval table as delimited text.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::MarkerTable;
use crate::device::DeviceProperties;

/// Supported table file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    /// Tab-separated values
    #[default]
    Tsv,
    /// Comma-separated values
    Csv,
}

impl TableFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "tsv" | "txt" => Some(TableFormat::Tsv),
            "csv" => Some(TableFormat::Csv),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Tsv => "tsv",
            TableFormat::Csv => "csv",
        }
    }

    /// Field separator
    pub fn delimiter(&self) -> char {
        match self {
            TableFormat::Tsv => '\t',
            TableFormat::Csv => ',',
        }
    }
}

/// Write the header block, summary table and interval table
pub fn write_marker_table<W: Write>(
    writer: &mut W,
    format: TableFormat,
    properties: &DeviceProperties,
    table: &MarkerTable,
    generated: DateTime<Local>,
) -> io::Result<()> {
    let d = format.delimiter();

    writeln!(writer, "Generated{d}{}", generated.to_rfc3339())?;
    writeln!(writer, "Device{d}{}", properties.device_name)?;
    writeln!(writer, "Serial number{d}{}", properties.serial_number)?;
    writeln!(writer, "Firmware version{d}{}", properties.firmware_version)?;
    writeln!(writer)?;

    writeln!(writer, "value{d}total_occurrences")?;
    for row in &table.summary {
        writeln!(writer, "{}{d}{}", row.value, row.total_occurrences)?;
    }
    writeln!(writer)?;

    writeln!(
        writer,
        "value{d}start_time_us{d}end_time_us{d}duration_us{d}occurrence"
    )?;
    for row in &table.intervals {
        writeln!(
            writer,
            "{}{d}{}{d}{}{d}{}{d}{}",
            row.value, row.start_us, row.end_us, row.duration_us, row.occurrence
        )?;
    }

    Ok(())
}

/// Save the marker table to `path`; the format follows the extension,
/// defaulting to TSV
pub fn save_marker_table<P: AsRef<Path>>(
    path: P,
    properties: &DeviceProperties,
    table: &MarkerTable,
) -> io::Result<()> {
    let path = path.as_ref();
    let format = TableFormat::from_extension(path).unwrap_or_default();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_marker_table(&mut writer, format, properties, table, Local::now())?;
    writer.flush()?;
    tracing::info!("saved marker table to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{table::reconstruct, MarkerEvent};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            TableFormat::from_extension(Path::new("markers.tsv")),
            Some(TableFormat::Tsv)
        );
        assert_eq!(
            TableFormat::from_extension(Path::new("markers.CSV")),
            Some(TableFormat::Csv)
        );
        assert_eq!(TableFormat::from_extension(Path::new("markers.mlg")), None);
    }

    #[test]
    fn test_write_tsv() {
        let table = reconstruct(&[
            MarkerEvent::new(100, 0),
            MarkerEvent::new(0, 1000),
            MarkerEvent::new(7, 3000),
        ]);
        let properties = DeviceProperties {
            firmware_version: "HW1:SW1.2".into(),
            serial_number: "S01234".into(),
            device_name: "UsbParMar".into(),
        };
        let generated = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let mut out = Vec::new();
        write_marker_table(&mut out, TableFormat::Tsv, &properties, &table, generated).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], format!("Generated\t{}", generated.to_rfc3339()));
        assert_eq!(
            &lines[1..],
            &[
                "Device\tUsbParMar",
                "Serial number\tS01234",
                "Firmware version\tHW1:SW1.2",
                "",
                "value\ttotal_occurrences",
                "100\t1",
                "7\t1",
                "",
                "value\tstart_time_us\tend_time_us\tduration_us\toccurrence",
                "100\t0\t1000\t1000\t1",
                "7\t3000\tinf\tinf\t1",
            ]
        );
    }
}
