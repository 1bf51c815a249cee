use crate::exif_reader::ExifDateReader;
use crate::record::ExportRow;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DateSource {
    ExposureTime,
    EventTime,
    Exif,
    Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectiveDate {
    pub date: NaiveDate,
    pub source: DateSource,
}

/// Picks the date a record is filed under. First available wins: the
/// record's exposure time, the earliest timestamp of its event, the EXIF
/// capture date of `source_path`, and finally the record's own timestamp.
///
/// `source_path` is passed separately because the export may have rewritten
/// the stored path before touching the file.
pub fn resolve_effective_date(
    row: &ExportRow,
    source_path: &Path,
    exif: &dyn ExifDateReader,
) -> EffectiveDate {
    let from_timestamp = |ts: i64, source: DateSource| {
        timestamp_to_local_date(ts).map(|date| EffectiveDate { date, source })
    };

    if let Some(resolved) = row
        .record
        .known_exposure_time()
        .and_then(|ts| from_timestamp(ts, DateSource::ExposureTime))
    {
        return resolved;
    }

    if let Some(resolved) = row
        .known_event_time()
        .and_then(|ts| from_timestamp(ts, DateSource::EventTime))
    {
        return resolved;
    }

    match exif.date_original(source_path) {
        Ok(Some(date)) => {
            return EffectiveDate {
                date,
                source: DateSource::Exif,
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::debug!(path = %source_path.display(), "EXIF日付なし: {err:#}");
        }
    }

    let date = timestamp_to_local_date(row.record.timestamp)
        .unwrap_or_else(|| Local::now().date_naive());
    EffectiveDate {
        date,
        source: DateSource::Timestamp,
    }
}

/// Converts a Unix timestamp to the calendar date in the local time zone.
pub fn timestamp_to_local_date(ts: i64) -> Option<NaiveDate> {
    let utc = DateTime::from_timestamp(ts, 0)?;
    Some(Local.from_utc_datetime(&utc.naive_utc()).date_naive())
}
