mod catalog;
mod config;
mod exif_reader;
mod export;
mod import;
mod record;
mod registry;
mod resolve;
mod template;

pub const DEFAULT_TEMPLATE: &str = "{y}/{y}-{m}-{d} {event}/{file}";
pub const DEFAULT_DB_PATH: &str = "~/.local/share/shotwell/data/photo.db";
pub const DEFAULT_OUTPUT_DIR: &str = "shotwell-export";

pub use catalog::{Catalog, MediaTable};
pub use config::{app_paths, expand_home, load_config, save_config, AppConfig, AppPaths};
pub use exif_reader::{read_exif_date, ExifDateReader, KamadakExif, NoExif};
pub use export::{
    apply_export, apply_export_with_options, plan_export, with_rating_suffix, ApplyOptions,
    ExportCandidate, ExportFailure, ExportOptions, ExportPlan, ExportResult, ExportStats,
    TransferMode,
};
pub use import::{import_events, ImportOptions, ImportResult, TableImportStats};
pub use record::{EventRecord, ExportRow, MediaKind, MediaRecord, NamedMedia};
pub use registry::EventRegistry;
pub use resolve::{resolve_effective_date, timestamp_to_local_date, DateSource, EffectiveDate};
pub use template::{
    match_pattern_source, normalize_event_name, parse_template, render_path, render_template,
    validate_template, CompiledTemplate, PathFields, PathMatcher, TemplateError, TemplatePart,
    Token,
};
