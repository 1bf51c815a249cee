use anyhow::{Context, Result};
use chrono::NaiveDate;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Source of the original capture date stored in a file's EXIF block.
pub trait ExifDateReader {
    fn date_original(&self, path: &Path) -> Result<Option<NaiveDate>>;
}

/// Reads `DateTimeOriginal` with kamadak-exif.
#[derive(Debug, Clone, Copy, Default)]
pub struct KamadakExif;

impl ExifDateReader for KamadakExif {
    fn date_original(&self, path: &Path) -> Result<Option<NaiveDate>> {
        read_exif_date(path)
    }
}

/// Used when EXIF lookup is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExif;

impl ExifDateReader for NoExif {
    fn date_original(&self, _path: &Path) -> Result<Option<NaiveDate>> {
        Ok(None)
    }
}

pub fn read_exif_date(path: &Path) -> Result<Option<NaiveDate>> {
    let file = File::open(path)
        .with_context(|| format!("EXIF読み込み対象を開けませんでした: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("EXIFを解析できませんでした: {}", path.display()))?;

    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        return Ok(None);
    };

    let raw = match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).to_string()),
        _ => None,
    };

    Ok(raw.as_deref().and_then(parse_exif_date))
}

/// Parses the leading `YYYY:MM:DD` of an EXIF date string. Only the digit
/// positions are checked so `YYYY-MM-DD` variants written by some tools work
/// too.
pub(crate) fn parse_exif_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    let year = s.get(0..4)?.parse::<i32>().ok()?;
    let month = s.get(5..7)?.parse::<u32>().ok()?;
    let day = s.get(8..10)?.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parse_exif_date_accepts_colon_format() {
        assert_eq!(
            parse_exif_date("2020:03:05 14:22:01"),
            NaiveDate::from_ymd_opt(2020, 3, 5)
        );
        assert_eq!(
            parse_exif_date("2019-12-24"),
            NaiveDate::from_ymd_opt(2019, 12, 24)
        );
    }

    #[test]
    fn parse_exif_date_rejects_malformed_values() {
        assert_eq!(parse_exif_date(""), None);
        assert_eq!(parse_exif_date("0000:00:00 00:00:00"), None);
        assert_eq!(parse_exif_date("2020:13:01 00:00:00"), None);
        assert_eq!(parse_exif_date("    :  :   "), None);
        assert_eq!(parse_exif_date("2020:3:5"), None);
    }

    #[test]
    fn read_exif_date_fails_for_missing_file() {
        let temp = tempdir().expect("tempdir");
        let err = read_exif_date(&temp.path().join("missing.jpg")).expect_err("must fail");
        assert!(err.to_string().contains("EXIF読み込み対象を開けませんでした"));
    }

    #[test]
    fn read_exif_date_fails_for_non_image() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("note.jpg");
        fs::write(&path, b"not an image").expect("write");
        assert!(read_exif_date(&path).is_err());
    }

    #[test]
    fn no_exif_never_reports_a_date() {
        let temp = tempdir().expect("tempdir");
        let date = NoExif
            .date_original(&temp.path().join("anything.jpg"))
            .expect("no-op reader");
        assert_eq!(date, None);
    }
}
