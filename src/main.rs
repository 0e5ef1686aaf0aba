// ==========================================
// 相机陷阱标注系统 - 命令行入口
// ==========================================
// 用法:
//   camtrap-annotate import <database> <spreadsheet> [--locale en]
//   camtrap-annotate export <database> <spreadsheet> [--selection deleted|<classification>] [--locale en]
//
// 结果以 JSON 摘要打印到标准输出;进度写入日志
// ==========================================

use camtrap_annotate::config::ConfigManager;
use camtrap_annotate::domain::types::{FileClassification, FileSelection};
use camtrap_annotate::spreadsheet::{ReadWriteStatus, SpreadsheetOptions};
use camtrap_annotate::{export_file, i18n, import_file, logging, SqliteFileStore};
use std::error::Error;
use std::path::PathBuf;

const USAGE: &str = "usage: camtrap-annotate <import|export> <database> <spreadsheet> \
[--selection deleted|<classification>] [--locale zh-CN|en]";

struct CommandLine {
    command: String,
    database: PathBuf,
    spreadsheet: PathBuf,
    selection: FileSelection,
    locale: Option<String>,
}

fn parse_command_line() -> Result<CommandLine, Box<dyn Error>> {
    let mut positional = Vec::new();
    let mut selection = FileSelection::All;
    let mut locale = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--selection" => {
                let value = args.next().ok_or(USAGE)?;
                selection = if value.eq_ignore_ascii_case("deleted") {
                    FileSelection::MarkedForDeletion
                } else {
                    FileSelection::Classification(value.parse::<FileClassification>()?)
                };
            }
            "--locale" => locale = Some(args.next().ok_or(USAGE)?),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next(), positional.next()) {
        (Some(command), Some(database), Some(spreadsheet), None) => Ok(CommandLine {
            command,
            database: PathBuf::from(database),
            spreadsheet: PathBuf::from(spreadsheet),
            selection,
            locale,
        }),
        _ => Err(USAGE.into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();
    let command_line = parse_command_line()?;
    if let Some(locale) = command_line.locale.as_deref() {
        i18n::set_locale(locale);
    }

    tracing::info!("==================================================");
    tracing::info!("{} {}", camtrap_annotate::APP_NAME, camtrap_annotate::VERSION);
    tracing::info!("文件数据库: {}", command_line.database.display());
    tracing::info!("==================================================");

    let mut store = SqliteFileStore::open(&command_line.database)?;
    store.set_selection(command_line.selection);
    let config_manager = ConfigManager::from_connection(store.connection())?;

    let mut log_progress = |status: &ReadWriteStatus| {
        tracing::info!(percentage = status.percentage(), "{}", status.message());
    };
    let options =
        SpreadsheetOptions::from_config_reader(&config_manager)?.with_progress(&mut log_progress);

    let summary = match command_line.command.as_str() {
        "import" => {
            let result = import_file(&command_line.spreadsheet, &store, options)?;
            serde_json::to_string_pretty(&result.summary())?
        }
        "export" => {
            let summary = export_file(&command_line.spreadsheet, &store, options)?;
            serde_json::to_string_pretty(&summary)?
        }
        _ => return Err(USAGE.into()),
    };
    println!("{}", summary);
    Ok(())
}
