use crate::exif_reader::ExifDateReader;
use crate::record::{ExportRow, MediaRecord};
use crate::resolve::{resolve_effective_date, EffectiveDate};
use crate::template::{CompiledTemplate, PathFields};
use crate::{DEFAULT_OUTPUT_DIR, DEFAULT_TEMPLATE};
use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub template: String,
    pub mode: TransferMode,
    /// Append ` +++` style rating markers to file names.
    pub stars: bool,
    /// Rewrites stored source paths, e.g. after a drive was remounted.
    pub replace: Option<(String, String)>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            template: DEFAULT_TEMPLATE.to_string(),
            mode: TransferMode::Copy,
            stars: false,
            replace: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportCandidate {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub record: MediaRecord,
    pub event_name: String,
    pub event_time: Option<i64>,
    pub effective_date: EffectiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportStats {
    pub rows: usize,
    pub planned: usize,
    pub skipped_no_event: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPlan {
    pub template: String,
    pub output_dir: PathBuf,
    pub mode: TransferMode,
    pub candidates: Vec<ExportCandidate>,
    pub stats: ExportStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ApplyOptions {
    /// Record failing files and carry on instead of aborting the run.
    pub keep_going: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFailure {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportResult {
    pub copied: usize,
    pub moved: usize,
    pub linked: usize,
    pub skipped_existing: usize,
    pub missing_source: usize,
    pub failures: Vec<ExportFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Transferred(TransferMode),
    SkippedExisting,
    MissingSource,
}

/// Computes the target of every record that belongs to an event. Nothing on
/// disk is touched apart from EXIF reads.
pub fn plan_export(
    rows: &[ExportRow],
    options: &ExportOptions,
    exif: &dyn ExifDateReader,
) -> Result<ExportPlan> {
    let template = CompiledTemplate::compile(&options.template)?;
    let mut stats = ExportStats {
        rows: rows.len(),
        ..ExportStats::default()
    };
    let mut candidates = Vec::with_capacity(rows.len());

    for row in rows {
        let source = match &options.replace {
            Some((search, replace)) => row.record.source_path.replace(search.as_str(), replace),
            None => row.record.source_path.clone(),
        };

        let Some(event_name) = row.event_name() else {
            tracing::debug!("イベントなしのため除外: {source}");
            stats.skipped_no_event += 1;
            continue;
        };

        let source_path = PathBuf::from(&source);
        let effective_date = resolve_effective_date(row, &source_path, exif);

        let base_name = source.rsplit('/').next().unwrap_or_default();
        let file = if options.stars {
            with_rating_suffix(base_name, row.record.rating)
        } else {
            base_name.to_string()
        };

        let rendered = template.render(&PathFields {
            year: effective_date.date.year(),
            month: effective_date.date.month(),
            day: effective_date.date.day(),
            event: event_name,
            file: &file,
        });

        stats.planned += 1;
        candidates.push(ExportCandidate {
            source_path,
            target_path: options.output_dir.join(rendered),
            record: row.record.clone(),
            event_name: event_name.to_string(),
            event_time: row.event_time,
            effective_date,
        });
    }

    Ok(ExportPlan {
        template: options.template.clone(),
        output_dir: options.output_dir.clone(),
        mode: options.mode,
        candidates,
        stats,
    })
}

const MAX_RATING: i64 = 5;

/// `IMG_1234.JPG` with rating 3 becomes `IMG_1234 +++.JPG`.
pub fn with_rating_suffix(file_name: &str, rating: i64) -> String {
    if rating <= 0 {
        return file_name.to_string();
    }
    // Shotwell ratings stop at 5; anything larger is a damaged row.
    let marks = "+".repeat(rating.min(MAX_RATING) as usize);
    match split_extension(file_name) {
        (stem, Some(ext)) => format!("{stem} {marks}.{ext}"),
        (stem, None) => format!("{stem} {marks}"),
    }
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => {
            (&file_name[..idx], Some(&file_name[idx + 1..]))
        }
        _ => (file_name, None),
    }
}

pub fn apply_export(plan: &ExportPlan) -> Result<ExportResult> {
    apply_export_with_options(plan, &ApplyOptions::default())
}

/// Copies, moves or links every planned file. Targets that already exist are
/// left alone, which makes repeated copy runs no-ops. By default the first
/// unexpected failure aborts the run; files handled before it stay where
/// they were put.
pub fn apply_export_with_options(plan: &ExportPlan, options: &ApplyOptions) -> Result<ExportResult> {
    let mut result = ExportResult::default();

    for candidate in &plan.candidates {
        match transfer_candidate(candidate, plan.mode) {
            Ok(Outcome::Transferred(TransferMode::Copy)) => result.copied += 1,
            Ok(Outcome::Transferred(TransferMode::Move)) => result.moved += 1,
            Ok(Outcome::Transferred(TransferMode::Symlink)) => result.linked += 1,
            Ok(Outcome::SkippedExisting) => result.skipped_existing += 1,
            Ok(Outcome::MissingSource) => result.missing_source += 1,
            Err(err) => {
                let err = err.context(describe_candidate(candidate));
                if !options.keep_going {
                    return Err(err);
                }
                tracing::error!("{err:#}");
                result.failures.push(ExportFailure {
                    source_path: candidate.source_path.clone(),
                    target_path: candidate.target_path.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    Ok(result)
}

fn describe_candidate(candidate: &ExportCandidate) -> String {
    let record = &candidate.record;
    format!(
        "ファイルを処理できませんでした (filename={}, timestamp={}, exposure_time={:?}, rating={}, event={}, event_time={:?})",
        record.source_path,
        record.timestamp,
        record.exposure_time,
        record.rating,
        candidate.event_name,
        candidate.event_time
    )
}

fn transfer_candidate(candidate: &ExportCandidate, mode: TransferMode) -> Result<Outcome> {
    let source = &candidate.source_path;
    let target = &candidate.target_path;

    if !source.exists() {
        tracing::warn!("見つかりません: {}", source.display());
        return Ok(Outcome::MissingSource);
    }

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("出力フォルダを作成できませんでした: {}", parent.display())
            })?;
        }
    }

    // symlink_metadata so a dangling link left by an earlier run also counts.
    if target.symlink_metadata().is_ok() {
        tracing::debug!("出力先が既に存在します: {}", target.display());
        return Ok(Outcome::SkippedExisting);
    }

    match mode {
        TransferMode::Copy => {
            tracing::info!("コピー: {}", target.display());
            copy_with_mtime(source, target)?;
        }
        TransferMode::Move => {
            tracing::info!("移動: {}", target.display());
            move_file(source, target)?;
        }
        TransferMode::Symlink => {
            tracing::debug!("リンク: {}", target.display());
            link_relative(source, target)?;
        }
    }

    Ok(Outcome::Transferred(mode))
}

fn copy_with_mtime(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target).with_context(|| {
        format!(
            "コピーに失敗しました: {} -> {}",
            source.display(),
            target.display()
        )
    })?;
    let modified = fs::metadata(source)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("更新日時を取得できませんでした: {}", source.display()))?;
    File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_modified(modified))
        .with_context(|| format!("更新日時を設定できませんでした: {}", target.display()))?;
    Ok(())
}

fn move_file(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(source, target),
        Err(err) => Err(anyhow::Error::from(err).context(format!(
            "移動に失敗しました: {} -> {}",
            source.display(),
            target.display()
        ))),
    }
}

/// Move across file systems. The copy is discarded again if the source
/// cannot be removed, so the file never ends up in both places.
fn copy_then_remove(source: &Path, target: &Path) -> Result<()> {
    copy_with_mtime(source, target)?;
    if let Err(err) = fs::remove_file(source) {
        let remove_err = anyhow::Error::from(err)
            .context(format!("移動元を削除できませんでした: {}", source.display()));
        if let Err(cleanup_err) = fs::remove_file(target) {
            return Err(remove_err.context(format!(
                "コピー先の削除にも失敗しました: {}: {cleanup_err}",
                target.display()
            )));
        }
        return Err(remove_err);
    }
    Ok(())
}

#[cfg(unix)]
fn link_relative(source: &Path, target: &Path) -> Result<()> {
    let target_dir = target.parent().unwrap_or_else(|| Path::new("."));
    let link = relative_path(target_dir, source)?;
    std::os::unix::fs::symlink(&link, target).with_context(|| {
        format!(
            "シンボリックリンクを作成できませんでした: {} -> {}",
            target.display(),
            link.display()
        )
    })?;
    Ok(())
}

#[cfg(not(unix))]
fn link_relative(source: &Path, target: &Path) -> Result<()> {
    tracing::warn!("シンボリックリンク未対応のためコピーします: {}", target.display());
    copy_with_mtime(source, target)
}

/// Path to `to` as seen from the directory `from_dir`.
fn relative_path(from_dir: &Path, to: &Path) -> Result<PathBuf> {
    let from_dir = std::path::absolute(from_dir)
        .with_context(|| format!("パスを解決できませんでした: {}", from_dir.display()))?;
    let to = std::path::absolute(to)
        .with_context(|| format!("パスを解決できませんでした: {}", to.display()))?;

    let from = normalize_lexically(&from_dir);
    let dest = normalize_lexically(&to);
    let common = from
        .iter()
        .zip(dest.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &dest[common..] {
        out.push(component.as_os_str());
    }
    Ok(out)
}

/// Resolves `.` and `..` without touching the file system. `..` above the
/// root stays at the root.
fn normalize_lexically(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}
