//! Typed access to the Shotwell `photo.db` SQLite store.
//!
//! Rows are converted to records here; the pipelines never see raw rows.

use crate::record::{ExportRow, MediaKind, MediaRecord, NamedMedia, NO_EVENT_ID};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OpenFlags, Transaction};
use std::path::Path;

/// Tables whose rows carry an `event_id` the importer may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTable {
    Photo,
    Video,
}

impl MediaTable {
    pub fn name(self) -> &'static str {
        match self {
            Self::Photo => "PhotoTable",
            Self::Video => "VideoTable",
        }
    }
}

const EXPORT_QUERY: &str = r#"
    WITH Media (kind, id, filename, timestamp, exposure_time, rating, event_id) AS (
        SELECT 'photo', id, filename, timestamp, exposure_time, rating, event_id
        FROM PhotoTable
        UNION ALL
        SELECT 'video', id, filename, timestamp, exposure_time, rating, event_id
        FROM VideoTable
        UNION ALL
        SELECT 'backing', pt.id, bpt.filepath, pt.timestamp, pt.exposure_time, pt.rating, pt.event_id
        FROM PhotoTable pt
        JOIN BackingPhotoTable bpt ON pt.develop_camera_id = bpt.id
    )
    SELECT
        Media.kind,
        Media.id,
        Media.filename,
        Media.timestamp,
        Media.exposure_time,
        Media.rating,
        Media.event_id,
        EventTable.name,
        (SELECT MIN(m.timestamp) FROM Media m
            WHERE m.event_id = EventTable.id AND m.event_id != ?1)
    FROM Media
    LEFT JOIN EventTable ON EventTable.id = Media.event_id
    ORDER BY EventTable.id, Media.filename
"#;

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Opens an existing database. A missing file is an error rather than a
    /// fresh empty database.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "photo.db が見つかりません: {} (--db を確認してください)",
                path.display()
            );
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("データベースを開けませんでした: {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts the single transaction an import runs in.
    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction()
            .context("トランザクションを開始できませんでした")
    }

    /// Photos, videos and developed backing photos, with their event name
    /// and the earliest timestamp of their event.
    pub fn load_export_rows(&self) -> Result<Vec<ExportRow>> {
        let mut stmt = self
            .conn
            .prepare(EXPORT_QUERY)
            .context("エクスポート用クエリを準備できませんでした")?;
        let rows = stmt
            .query_map(params![NO_EVENT_ID], |row| {
                let tag: String = row.get(0)?;
                Ok((
                    tag,
                    MediaRecord {
                        id: row.get(1)?,
                        kind: MediaKind::Photo,
                        source_path: row.get(2)?,
                        timestamp: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        exposure_time: row.get(4)?,
                        rating: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                        event_id: row.get(6)?,
                    },
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                ))
            })
            .context("メディアを読み込めませんでした")?;

        let mut out = Vec::new();
        for row in rows {
            let (tag, mut record, event_name, event_time) =
                row.context("メディア行を読み込めませんでした")?;
            record.kind = MediaKind::from_tag(&tag)
                .with_context(|| format!("不明なメディア種別です: {tag}"))?;
            out.push(ExportRow {
                record,
                event_name,
                event_time,
            });
        }
        Ok(out)
    }

    pub fn load_named_media(&self, table: MediaTable) -> Result<Vec<NamedMedia>> {
        load_named_media(&self.conn, table)
    }
}

pub(crate) fn load_named_media(conn: &Connection, table: MediaTable) -> Result<Vec<NamedMedia>> {
    let sql = format!("SELECT id, filename FROM {} ORDER BY filename", table.name());
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("{} を読み込めませんでした", table.name()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(NamedMedia {
                id: row.get(0)?,
                filename: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("{} の行を読み込めませんでした", table.name()))?;
    Ok(rows)
}

pub(crate) fn insert_event(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO EventTable (name) VALUES (?1)", params![name])
        .with_context(|| format!("イベントを追加できませんでした: {name}"))?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn set_event_id(
    conn: &Connection,
    table: MediaTable,
    media_id: i64,
    event_id: i64,
) -> Result<()> {
    let sql = format!("UPDATE {} SET event_id = ?1 WHERE id = ?2", table.name());
    conn.execute(&sql, params![event_id, media_id])
        .with_context(|| {
            format!(
                "{} の event_id を更新できませんでした: id={media_id}",
                table.name()
            )
        })?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_rejects_missing_database() {
        let temp = tempdir().expect("tempdir");
        let err = Catalog::open(&temp.path().join("photo.db"))
            .err()
            .expect("missing db must fail");
        assert!(err.to_string().contains("photo.db が見つかりません"));
        assert!(!temp.path().join("photo.db").exists());
    }

    #[test]
    fn export_rows_union_photos_videos_and_backing_photos() {
        let temp = tempdir().expect("tempdir");
        let db = temp.path().join("photo.db");
        let conn = create_db(&db);
        let trip = add_event(&conn, "Trip");
        let photo = add_photo(&conn, "/pics/b.jpg", 2_000, 0, 3, trip);
        add_photo(&conn, "/pics/a.jpg", 1_500, 0, 0, -1);
        add_video(&conn, "/pics/c.mp4", 1_000, trip);
        add_backing(&conn, photo, "/pics/b_developed.jpg");
        drop(conn);

        let catalog = Catalog::open(&db).expect("open");
        let rows = catalog.load_export_rows().expect("rows");
        assert_eq!(rows.len(), 4);

        let no_event: Vec<_> = rows.iter().filter(|r| r.event_name.is_none()).collect();
        assert_eq!(no_event.len(), 1);
        assert_eq!(no_event[0].record.source_path, "/pics/a.jpg");
        assert_eq!(no_event[0].event_time, None);

        let backing = rows
            .iter()
            .find(|r| r.record.kind == MediaKind::BackingPhoto)
            .expect("backing row");
        assert_eq!(backing.record.id, photo);
        assert_eq!(backing.record.source_path, "/pics/b_developed.jpg");
        assert_eq!(backing.record.rating, 3);
        assert_eq!(backing.event_name.as_deref(), Some("Trip"));

        for row in rows.iter().filter(|r| r.event_name.is_some()) {
            assert_eq!(row.event_time, Some(1_000));
        }
    }

    #[test]
    fn export_does_not_touch_the_database() {
        let temp = tempdir().expect("tempdir");
        let db = temp.path().join("photo.db");
        let conn = create_db(&db);
        add_photo(&conn, "/pics/a.jpg", 1_500, 0, 0, -1);
        drop(conn);

        let catalog = Catalog::open(&db).expect("open");
        catalog.load_export_rows().expect("rows");
        let tables: i64 = catalog
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(tables, 0);
    }

    #[test]
    fn named_media_is_ordered_by_filename() {
        let temp = tempdir().expect("tempdir");
        let conn = create_db(&temp.path().join("photo.db"));
        add_photo(&conn, "/pics/z.jpg", 1, 0, 0, -1);
        add_photo(&conn, "/pics/a.jpg", 1, 0, 0, -1);
        let catalog = Catalog::from_connection(conn);

        let names: Vec<_> = catalog
            .load_named_media(MediaTable::Photo)
            .expect("load")
            .into_iter()
            .map(|m| m.filename)
            .collect();
        assert_eq!(names, vec!["/pics/a.jpg", "/pics/z.jpg"]);
        assert!(catalog
            .load_named_media(MediaTable::Video)
            .expect("load")
            .is_empty());
    }

    #[test]
    fn insert_and_link_event() {
        let temp = tempdir().expect("tempdir");
        let conn = create_db(&temp.path().join("photo.db"));
        let photo = add_photo(&conn, "/pics/a.jpg", 1, 0, 0, -1);

        let event = insert_event(&conn, "Trip to Spain").expect("insert");
        set_event_id(&conn, MediaTable::Photo, photo, event).expect("update");

        assert_eq!(event_names(&conn), vec![(event, "Trip to Spain".to_string())]);
        assert_eq!(event_id_of(&conn, "PhotoTable", photo), event);
    }
}
