use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the log file. New columns may only be appended.
pub const HEADER: [&str; 3] = ["timestamp", "zone", "people_count"];

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("event log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One zone's count for one processed frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyEvent {
    #[serde(with = "iso_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "zone")]
    pub zone_name: String,
    pub people_count: usize,
}

impl OccupancyEvent {
    pub fn new(timestamp: NaiveDateTime, zone_name: impl Into<String>, people_count: usize) -> Self {
        Self {
            timestamp,
            zone_name: zone_name.into(),
            people_count,
        }
    }
}

/// ISO-8601 local time with microseconds, e.g. `2025-03-01T18:04:05.123456`
mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(timestamp: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&timestamp.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_local()))
            .map_err(D::Error::custom)
    }
}

/// Append-only CSV record of zone counts. A single writer appends from the
/// frame thread; every append is flushed before returning.
pub struct EventLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl EventLog {
    /// Opens the log for appending, creating it (and its directory) if needed.
    /// The header row is written only when the file is new or empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| EventLogError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let needs_header = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(io_err)?;
        // a row cut off by a crash must not swallow the next one
        if !needs_header && !ends_with_newline(&mut file).map_err(io_err)? {
            file.write_all(b"\n").map_err(io_err)?;
        }
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        let mut log = Self { path, writer };
        if needs_header {
            log.writer.write_record(HEADER).map_err(|e| log.csv_err(e))?;
            log.flush()?;
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, event: &OccupancyEvent) -> Result<(), EventLogError> {
        self.append_frame(std::slice::from_ref(event))
    }

    /// Appends all events of one frame in order and flushes once
    pub fn append_frame(&mut self, events: &[OccupancyEvent]) -> Result<(), EventLogError> {
        for event in events {
            self.writer.serialize(event).map_err(|e| self.csv_err(e))?;
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<(), EventLogError> {
        self.writer.flush().map_err(|source| EventLogError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn csv_err(&self, source: csv::Error) -> EventLogError {
        EventLogError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Reads the most recently appended event of every zone. A missing or empty
/// log yields an empty map; rows that fail to parse are skipped.
pub fn read_latest_per_zone(path: impl AsRef<Path>) -> Result<BTreeMap<String, OccupancyEvent>, EventLogError> {
    let path = path.as_ref();
    let mut latest = BTreeMap::new();
    if !path.exists() {
        return Ok(latest);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| EventLogError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    for (row, record) in reader.deserialize::<OccupancyEvent>().enumerate() {
        match record {
            Ok(event) => {
                latest.insert(event.zone_name.clone(), event);
            }
            Err(e) => {
                tracing::debug!(row = row + 1, error = %e, "skipping unreadable event log row");
            }
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_micro_opt(18, 4, second, 123456)
            .unwrap()
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/zone_counts.csv");

        let mut log = EventLog::open(&path).unwrap();
        log.append(&OccupancyEvent::new(at(1), "Zone A", 3)).unwrap();
        drop(log);

        let mut log = EventLog::open(&path).unwrap();
        log.append(&OccupancyEvent::new(at(2), "Zone A", 4)).unwrap();
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "timestamp,zone,people_count",
                "2025-03-01T18:04:01.123456,Zone A,3",
                "2025-03-01T18:04:02.123456,Zone A,4",
            ]
        );
    }

    #[test]
    fn test_latest_per_zone_follows_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_counts.csv");

        let mut log = EventLog::open(&path).unwrap();
        log.append_frame(&[
            OccupancyEvent::new(at(1), "Zone A", 1),
            OccupancyEvent::new(at(1), "Zone B", 9),
        ])
        .unwrap();
        log.append(&OccupancyEvent::new(at(2), "Zone A", 5)).unwrap();
        log.append(&OccupancyEvent::new(at(3), "Zone A", 2)).unwrap();
        log.append(&OccupancyEvent::new(at(3), "Zone B", 12)).unwrap();
        log.append(&OccupancyEvent::new(at(4), "Zone C", 0)).unwrap();

        let latest = read_latest_per_zone(&path).unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest["Zone A"], OccupancyEvent::new(at(3), "Zone A", 2));
        assert_eq!(latest["Zone B"].people_count, 12);
        assert_eq!(latest["Zone C"].people_count, 0);
    }

    #[test]
    fn test_missing_and_empty_logs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_latest_per_zone(dir.path().join("absent.csv")).unwrap().is_empty());

        let empty = dir.path().join("empty.csv");
        File::create(&empty).unwrap();
        assert!(read_latest_per_zone(&empty).unwrap().is_empty());

        let header_only = dir.path().join("header.csv");
        EventLog::open(&header_only).unwrap();
        assert!(read_latest_per_zone(&header_only).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_counts.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "timestamp,zone,people_count").unwrap();
        writeln!(file, "2025-03-01T18:04:01.000001,Zone A,4").unwrap();
        writeln!(file, "2025-03-01T18:04:02.000001,Zone A,not-a-number").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "2025-03-01T18:04:03.000001,Zone B,-2").unwrap();
        writeln!(file, "2025-03-01T18:04:04.000001,Zone B,7").unwrap();
        write!(file, "2025-03-01T18:04:05.00").unwrap();
        drop(file);

        let latest = read_latest_per_zone(&path).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["Zone A"].people_count, 4);
        assert_eq!(latest["Zone B"].people_count, 7);
    }

    #[test]
    fn test_reopen_after_cut_off_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_counts.csv");
        fs::write(
            &path,
            "timestamp,zone,people_count\n2025-03-01T18:04:01.000001,Zone A,4\n2025-03-01T18:04:02.00",
        )
        .unwrap();

        let mut log = EventLog::open(&path).unwrap();
        log.append(&OccupancyEvent::new(at(9), "Zone A", 9)).unwrap();
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().last(), Some("2025-03-01T18:04:09.123456,Zone A,9"));
        let latest = read_latest_per_zone(&path).unwrap();
        assert_eq!(latest["Zone A"], OccupancyEvent::new(at(9), "Zone A", 9));

        // a clean reopen adds no blank line
        let mut log = EventLog::open(&path).unwrap();
        log.append(&OccupancyEvent::new(at(10), "Zone B", 1)).unwrap();
        drop(log);
        assert!(!fs::read_to_string(&path).unwrap().contains("\n\n"));
    }

    #[test]
    fn test_extra_trailing_column_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_counts.csv");
        fs::write(
            &path,
            "timestamp,zone,people_count,camera\n2025-03-01T18:04:05.000001,Zone A,3,gate-1\n",
        )
        .unwrap();

        let latest = read_latest_per_zone(&path).unwrap();
        assert_eq!(latest["Zone A"].people_count, 3);
        assert_eq!(latest["Zone A"].zone_name, "Zone A");
    }

    #[test]
    fn test_reads_timestamps_without_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_counts.csv");
        fs::write(&path, "timestamp,zone,people_count\n2025-03-01T18:04:05,Zone A,6\n").unwrap();

        let latest = read_latest_per_zone(&path).unwrap();
        assert_eq!(
            latest["Zone A"].timestamp,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(18, 4, 5).unwrap()
        );
    }
}
