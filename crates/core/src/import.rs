use crate::catalog::{insert_event, load_named_media, set_event_id, Catalog, MediaTable};
use crate::record::EventRecord;
use crate::registry::{parent_dir, EventRegistry};
use crate::template::{CompiledTemplate, PathMatcher, TemplateError};
use crate::DEFAULT_TEMPLATE;
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub template: String,
    /// Paths under this prefix that do not match are reported.
    pub print_unmatched: Option<String>,
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            print_unmatched: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TableImportStats {
    pub table: String,
    pub scanned: usize,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportResult {
    pub pattern: String,
    pub events_created: Vec<EventRecord>,
    pub records_updated: usize,
    pub tables: Vec<TableImportStats>,
    pub unmatched: Vec<String>,
    pub committed: bool,
}

/// Derives events from the directory layout of every photo and video and
/// links the records to them. Everything runs in one transaction that is
/// committed at the end, or rolled back on error and in dry-run mode.
pub fn import_events(catalog: &mut Catalog, options: &ImportOptions) -> Result<ImportResult> {
    let template = CompiledTemplate::compile(&options.template)?;
    if !template.has_event() {
        return Err(TemplateError::MissingEvent.into());
    }
    let matcher = template.matcher();
    tracing::info!(pattern = matcher.as_str(), "照合パターン");

    let unmatched_prefix = options
        .print_unmatched
        .as_deref()
        .filter(|prefix| !prefix.is_empty());

    let mut result = ImportResult {
        pattern: matcher.as_str().to_string(),
        ..ImportResult::default()
    };
    let mut registry = EventRegistry::new();

    let tx = catalog.begin()?;
    for table in [MediaTable::Photo, MediaTable::Video] {
        let stats = import_table(
            &tx,
            table,
            matcher,
            &mut registry,
            unmatched_prefix,
            &mut result,
        )?;
        result.tables.push(stats);
    }

    if options.dry_run {
        tx.rollback()
            .context("トランザクションを取り消せませんでした")?;
        tracing::info!("dry-runのため変更を破棄しました");
    } else {
        tx.commit().context("変更を確定できませんでした")?;
        result.committed = true;
    }

    Ok(result)
}

fn import_table(
    conn: &Connection,
    table: MediaTable,
    matcher: &PathMatcher,
    registry: &mut EventRegistry,
    unmatched_prefix: Option<&str>,
    result: &mut ImportResult,
) -> Result<TableImportStats> {
    let rows = load_named_media(conn, table)?;
    let mut stats = TableImportStats {
        table: table.name().to_string(),
        scanned: rows.len(),
        ..TableImportStats::default()
    };

    for row in rows {
        let Some(event) = matcher.capture_event(&row.filename) else {
            if unmatched_prefix.is_some_and(|prefix| row.filename.starts_with(prefix)) {
                tracing::warn!("一致なし: {}", row.filename);
                stats.unmatched += 1;
                result.unmatched.push(row.filename);
            }
            continue;
        };

        let dir = parent_dir(&row.filename);
        let (event_id, created) = registry
            .get_or_create(dir, &event, |name| insert_event(conn, name))
            .with_context(|| format!("ファイルを処理できませんでした: {}", row.filename))?;
        if created {
            tracing::info!("イベント追加 {event_id}: {dir} --> {event}");
            result.events_created.push(EventRecord {
                id: event_id,
                name: event,
            });
        }

        set_event_id(conn, table, row.id, event_id)
            .with_context(|| format!("ファイルを処理できませんでした: {}", row.filename))?;
        tracing::debug!("event_id {event_id} を設定: {}", row.filename);
        stats.matched += 1;
        result.records_updated += 1;
    }

    Ok(stats)
}
