mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use shotwell_export_core::{
    app_paths, apply_export_with_options, expand_home, import_events, load_config, plan_export,
    save_config, validate_template, AppConfig, ApplyOptions, Catalog, ExifDateReader,
    ExportOptions, ExportPlan, ImportOptions, ImportResult, KamadakExif, NoExif, TransferMode,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shotwell-export")]
#[command(about = "Shotwellの写真・動画を日付とイベントのフォルダ構成に書き出します")]
struct Cli {
    /// debugレベルのログを出力する
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 写真・動画をテンプレートに従って書き出す
    Export(ExportArgs),
    /// フォルダ構成からイベントを推定してphoto.dbに登録する
    ImportEvents(ImportArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// 既定値で設定ファイルを作成する
    Init,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// photo.db の場所
    #[arg(short, long)]
    db: Option<String>,
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,
    /// 例: {y}/{y}-{m}-{d} {event}/{file}
    #[arg(short = 'n', long, value_name = "PATTERN")]
    template: Option<String>,
    /// コピーではなく移動する (事前にバックアップ推奨)
    #[arg(short, long = "move", conflicts_with = "symlink", default_value_t = false)]
    move_files: bool,
    /// コピーではなく相対シンボリックリンクを作成する
    #[arg(short = 'l', long, default_value_t = false)]
    symlink: bool,
    /// 評価をファイル名に付ける: IMG_1234 +++.JPG
    #[arg(short, long, default_value_t = false)]
    stars: bool,
    /// 元パスの一部を置換する: --replace /media/OldDrive/ /media/NewDrive/
    #[arg(short, long, num_args = 2, value_names = ["SEARCH", "REPLACE"])]
    replace: Option<Vec<String>>,
    #[arg(long, default_value_t = false)]
    no_exif: bool,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// 失敗したファイルを記録して処理を続ける
    #[arg(long, default_value_t = false)]
    keep_going: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(short, long)]
    db: Option<String>,
    #[arg(short = 'n', long, value_name = "PATTERN")]
    template: Option<String>,
    /// このフォルダ以下で一致しなかったファイルを表示する
    #[arg(short = 'u', long, value_name = "PREFIX")]
    print_unmatched: Option<String>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Commands::Export(args) => cmd_export(args),
        Commands::ImportEvents(args) => cmd_import(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    }
}

fn open_catalog(db: Option<String>, config: &AppConfig) -> Result<Catalog> {
    let db_path = expand_home(db.as_deref().unwrap_or(&config.db_path));
    Catalog::open(&db_path)
}

fn cmd_export(args: ExportArgs) -> Result<()> {
    let config = load_config()?;
    let template = args.template.unwrap_or_else(|| config.template.clone());
    validate_template(&template)?;

    let mode = if args.move_files {
        TransferMode::Move
    } else if args.symlink {
        TransferMode::Symlink
    } else {
        TransferMode::Copy
    };
    let replace = match args.replace.as_deref() {
        Some([search, replace]) => Some((search.clone(), replace.clone())),
        _ => None,
    };
    let output_dir = args.output_dir.unwrap_or_else(|| config.output_dir.clone());

    let options = ExportOptions {
        output_dir: expand_home(&output_dir),
        template,
        mode,
        stars: args.stars,
        replace,
    };

    let catalog = open_catalog(args.db, &config)?;
    tracing::info!("メディアを照会しています...");
    let rows = catalog.load_export_rows()?;

    let exif: &dyn ExifDateReader = if config.use_exif && !args.no_exif {
        &KamadakExif
    } else {
        &NoExif
    };
    let plan = plan_export(&rows, &options, exif)?;

    if args.dry_run {
        match args.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Table => print_plan(&plan),
        }
        eprintln!("dry-runモード: 実ファイルは変更していません。");
        return Ok(());
    }

    let result = apply_export_with_options(
        &plan,
        &ApplyOptions {
            keep_going: args.keep_going,
        },
    )?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => {
            for failure in &result.failures {
                println!(
                    "失敗: {} -> {}: {}",
                    failure.source_path.display(),
                    failure.target_path.display(),
                    failure.message
                );
            }
        }
    }
    eprintln!(
        "書き出し完了: copied={} moved={} linked={} exists={} not_found={} no_event={} failed={}",
        result.copied,
        result.moved,
        result.linked,
        result.skipped_existing,
        result.missing_source,
        plan.stats.skipped_no_event,
        result.failures.len()
    );

    if !result.failures.is_empty() {
        anyhow::bail!("{}件のファイルを処理できませんでした", result.failures.len());
    }
    Ok(())
}

fn cmd_import(args: ImportArgs) -> Result<()> {
    let config = load_config()?;
    let options = ImportOptions {
        template: args.template.unwrap_or_else(|| config.template.clone()),
        print_unmatched: args.print_unmatched,
        dry_run: args.dry_run,
    };
    validate_template(&options.template)?;

    let mut catalog = open_catalog(args.db, &config)?;
    let result = import_events(&mut catalog, &options)?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_import(&result),
    }
    if !result.committed {
        eprintln!("dry-runモード: photo.db は変更していません。");
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        anyhow::bail!(
            "設定ファイルは既に存在します: {}",
            paths.config_path.display()
        );
    }
    let path: PathBuf = save_config(&AppConfig::default())?;
    println!("設定ファイルを作成しました: {}", path.display());
    Ok(())
}

fn print_plan(plan: &ExportPlan) {
    println!("元ファイル -> 書き出し先 (日付の由来)");
    for candidate in &plan.candidates {
        println!(
            "{} -> {} ({:?})",
            candidate.source_path.display(),
            candidate.target_path.display(),
            candidate.effective_date.source
        );
    }

    println!(
        "\n集計: rows={} planned={} no_event_skip={} mode={:?}",
        plan.stats.rows, plan.stats.planned, plan.stats.skipped_no_event, plan.mode
    );
}

fn print_import(result: &ImportResult) {
    println!("照合パターン: {}", result.pattern);
    for event in &result.events_created {
        println!("イベント追加 {}: {}", event.id, event.name);
    }
    for path in &result.unmatched {
        println!("一致なし: {path}");
    }
    for table in &result.tables {
        println!(
            "集計 {}: scanned={} matched={} unmatched={}",
            table.table, table.scanned, table.matched, table.unmatched
        );
    }
    println!(
        "追加イベント={} 更新レコード={}",
        result.events_created.len(),
        result.records_updated
    );
}
