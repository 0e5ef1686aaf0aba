// ==========================================
// 相机陷阱标注系统 - 电子表格导入（对账）
// ==========================================
// 流程:
// 1. 前置条件: 存储无筛选;电子表格目录可表示为数据库目录下的相对路径
// 2. 读表头 -> 校验列结构 -> 定位必需列（结构错误: 不读任何数据行,不改动存储）
// 3. 建立已有记录的身份索引
// 4. 逐行流式读取: 宽度修正 -> 身份匹配 -> 写入字段 -> 分类
// 5. 新增批次一个事务,更新批次一个事务
// 行错误记录后跳过该行,不中止导入
// ==========================================

use crate::domain::control::file_column;
use crate::domain::file_record::{FileIdentity, FileRecord};
use crate::domain::types::FileSelection;
use crate::i18n::{t, t_with_args};
use crate::perf::PerfGuard;
use crate::repository::file_store::{FileStore, IdentityKey};
use crate::spreadsheet::column_schema::ColumnSchema;
use crate::spreadsheet::csv_codec::CsvRowReader;
use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::options::SpreadsheetOptions;
use crate::spreadsheet::progress::ProgressReporter;
use crate::spreadsheet::result::{FileImportResult, SpreadsheetFormat};
use crate::spreadsheet::row::RowSource;
use crate::spreadsheet::xlsx::{XlsxRowReader, FILE_DATA_WORKSHEET_NAME};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Component, Path};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use zip::ZipArchive;

/// 从 CSV 或 XLSX 导入文件数据
///
/// # 参数
/// - path: 电子表格路径（按扩展名判定格式）
/// - store: 文件数据库;必须处于无筛选状态
/// - options: 配置、进度回调、取消标志
///
/// # 返回
/// - Ok(FileImportResult): 计数与错误列表;读取源文件或提交时的异常放在 exception 中
/// - Err(SelectionNotAll): 存储有筛选条件（调用方编程错误）
/// - Err(UnsupportedFormat): 扩展名既不是 .csv 也不是 .xlsx
/// - Err(Cancelled): 导入被取消,存储未改动
#[instrument(skip_all, fields(operation_id = %Uuid::new_v4(), path = %path.display()))]
pub fn import_file(
    path: &Path,
    store: &dyn FileStore,
    mut options: SpreadsheetOptions<'_>,
) -> SpreadsheetResult<FileImportResult> {
    // === 前置条件 ===
    let selection = store.selection();
    if selection != FileSelection::All {
        return Err(SpreadsheetError::SelectionNotAll(selection.to_string()));
    }
    let format = SpreadsheetFormat::from_path(path)
        .ok_or_else(|| SpreadsheetError::UnsupportedFormat(path.display().to_string()))?;

    let mut perf = PerfGuard::new("spreadsheet.import");
    let mut progress = options.reporter();
    let mut result = FileImportResult::default();

    let folder_offset = match folder_offset(store.folder().as_deref(), path) {
        Ok(offset) => offset,
        Err(message) => {
            warn!(error = %message, "电子表格目录不在文件数据库目录下");
            result.errors.push(message);
            return Ok(result);
        }
    };

    info!(format = ?format, folder_offset = %folder_offset, "开始导入");
    let outcome = match format {
        SpreadsheetFormat::Csv => CsvRowReader::open(path)
            .and_then(|mut source| reconcile(&mut source, store, &folder_offset, &mut progress, &mut result)),
        SpreadsheetFormat::Xlsx => import_xlsx(path, store, &folder_offset, &mut progress, &mut result),
    };
    progress.end();
    perf.set_rows(result.files_processed);

    match outcome {
        Ok(()) => {}
        Err(SpreadsheetError::Cancelled) => {
            info!(rows = result.files_processed, "导入已取消，未提交任何变更");
            return Err(SpreadsheetError::Cancelled);
        }
        Err(e) => {
            warn!(error = %e, "导入异常终止");
            result.exception = Some(e);
        }
    }

    info!(
        files_added = result.files_added,
        files_updated = result.files_updated,
        files_unchanged = result.files_unchanged,
        errors = result.errors.len(),
        "导入完成"
    );
    Ok(result)
}

fn import_xlsx(
    path: &Path,
    store: &dyn FileStore,
    folder_offset: &str,
    progress: &mut ProgressReporter<'_>,
    result: &mut FileImportResult,
) -> SpreadsheetResult<()> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut source = match XlsxRowReader::open(&mut archive, FILE_DATA_WORKSHEET_NAME, progress) {
        Ok(source) => source,
        Err(SpreadsheetError::WorksheetNotFound(name)) => {
            result
                .errors
                .push(t_with_args("import.worksheet_not_found", &[("worksheet", name.as_str())]));
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    reconcile(&mut source, store, folder_offset, progress, result)
}

/// 电子表格所在目录相对于文件数据库目录的路径
///
/// # 返回
/// - Ok(""): 同一目录,或存储没有目录
/// - Ok("a/b"): 子目录
/// - Err(String): 需要 ".." 才能到达（不支持）
fn folder_offset(store_folder: Option<&Path>, spreadsheet: &Path) -> Result<String, String> {
    let Some(store_folder) = store_folder else {
        return Ok(String::new());
    };
    let spreadsheet_folder = spreadsheet
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let store_folder = fs::canonicalize(store_folder).unwrap_or_else(|_| store_folder.to_path_buf());
    let spreadsheet_folder =
        fs::canonicalize(spreadsheet_folder).unwrap_or_else(|_| spreadsheet_folder.to_path_buf());

    match spreadsheet_folder.strip_prefix(&store_folder) {
        Ok(relative) => Ok(relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")),
        Err(_) => {
            let spreadsheet_folder = spreadsheet_folder.display().to_string();
            let database_folder = store_folder.display().to_string();
            Err(t_with_args(
                "import.path_traversal",
                &[
                    ("spreadsheet_folder", spreadsheet_folder.as_str()),
                    ("database_folder", database_folder.as_str()),
                ],
            ))
        }
    }
}

/// 行中的相对路径加上目录偏移
fn offset_relative_path(folder_offset: &str, relative_path: &str) -> String {
    match (folder_offset.is_empty(), relative_path.is_empty()) {
        (true, _) => relative_path.to_string(),
        (false, true) => folder_offset.to_string(),
        (false, false) => format!("{}/{}", folder_offset, relative_path),
    }
}

/// 对账主循环
fn reconcile<S: RowSource>(
    source: &mut S,
    store: &dyn FileStore,
    folder_offset: &str,
    progress: &mut ProgressReporter<'_>,
    result: &mut FileImportResult,
) -> SpreadsheetResult<()> {
    let schema = ColumnSchema::build(&store.controls()?);

    // === 步骤 1: 表头校验 ===
    let header: Vec<String> = match source.next_row()? {
        Some(row) => row.as_slice().to_vec(),
        None => {
            result.errors.push(t("import.empty_file"));
            return Ok(());
        }
    };
    let header_errors = schema.validate(&header);
    if !header_errors.is_empty() {
        warn!(errors = header_errors.len(), "表头与文件数据库列不一致");
        result.errors.extend(header_errors);
        return Ok(());
    }

    // === 步骤 2: 定位必需列 ===
    let header_index = ColumnSchema::index_header(&header);
    let missing = header_index.missing_columns();
    let (Some(file_name_index), Some(relative_path_index), Some(_), Some(_)) = (
        header_index.file_name,
        header_index.relative_path,
        header_index.date_time,
        header_index.utc_offset,
    ) else {
        for column in missing {
            result
                .errors
                .push(t_with_args("header.missing_mandatory_column", &[("column", column)]));
        }
        return Ok(());
    };
    // 表头位置 -> 列结构中的列;校验已保证一一对应
    let header_columns: Vec<usize> = header.iter().filter_map(|name| schema.position(name)).collect();
    let width = schema.len();

    // === 步骤 3: 身份索引 ===
    let mut existing = store.index_files_by_identity()?;
    let defaults = schema.defaults();
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(existing.len());
    let mut inserts: Vec<FileRecord> = Vec::new();
    let mut updates: Vec<FileRecord> = Vec::new();

    // === 步骤 4: 逐行对账 ===
    progress.begin_read(source.length());
    let mut row_number = 1usize;
    while let Some(row) = source.next_row()? {
        row_number += 1;
        if progress.is_cancelled() {
            return Err(SpreadsheetError::Cancelled);
        }
        // 宽度修正: 省略了尾随分隔符的行恰好少一个字段
        if row.len() + 1 == width {
            row.push_field();
        } else if row.len() != width {
            let expected = width.to_string();
            let actual = row.len().to_string();
            let line = row_number.to_string();
            let content = row.display();
            warn!(row = row_number, expected = width, actual = row.len(), "行字段数不符");
            result.errors.push(t_with_args(
                "import.row_width_mismatch",
                &[
                    ("row", line.as_str()),
                    ("content", content.as_str()),
                    ("expected", expected.as_str()),
                    ("actual", actual.as_str()),
                ],
            ));
            continue;
        }

        // 文件名与相对路径按原样参与匹配,不去除空白
        let file_name = row.get(file_name_index).unwrap_or("");
        if file_name.trim().is_empty() {
            let line = row_number.to_string();
            let content = row.display();
            warn!(row = row_number, "文件名为空");
            result.errors.push(t_with_args(
                "import.blank_file_name",
                &[("row", line.as_str()), ("content", content.as_str())],
            ));
            continue;
        }
        let relative_path = offset_relative_path(folder_offset, row.get(relative_path_index).unwrap_or(""));
        let identity = FileIdentity::new(&relative_path, file_name);
        let key = identity.index_key();
        if !seen.insert(key.clone()) {
            let line = row_number.to_string();
            let file = identity.to_string();
            warn!(row = row_number, file = %identity, "同一文件在电子表格中重复出现");
            result.errors.push(t_with_args(
                "import.duplicate_file",
                &[("row", line.as_str()), ("file", file.as_str())],
            ));
            continue;
        }

        let (mut file, is_new) = match existing.remove(&key) {
            Some(file) => (file, false),
            None => (FileRecord::new(&identity, defaults.clone()), true),
        };

        // 身份列不写入: 新记录由身份给出,已有记录的身份不可变
        for (position, &column_index) in header_columns.iter().enumerate() {
            let column = &schema.columns()[column_index];
            if column.name == file_column::FILE || column.name == file_column::RELATIVE_PATH {
                continue;
            }
            let text = row.get(position).unwrap_or("");
            match column.column_type.parse_spreadsheet(text, &column.name) {
                Ok(value) => {
                    file.set_value(&column.name, &column.column_type, value);
                }
                Err(message) => {
                    warn!(row = row_number, column = %column.name, "字段值无法解析");
                    result.errors.push(message);
                }
            }
        }

        result.files_processed += 1;
        if is_new {
            inserts.push(file);
        } else if file.has_changes() {
            updates.push(file);
        } else {
            result.files_unchanged += 1;
        }
        progress.report(source.position());
    }
    progress.report_now(source.position());

    if progress.is_cancelled() {
        return Err(SpreadsheetError::Cancelled);
    }

    // === 步骤 5: 提交 ===
    progress.begin_transaction_commit(inserts.len() as u64);
    result.files_added = store.insert_files(&mut inserts)?;
    progress.report_now(inserts.len() as u64);

    progress.begin_transaction_commit(updates.len() as u64);
    result.files_updated = store.update_files(&mut updates)?;
    progress.report_now(updates.len() as u64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_offset_relative_path() {
        assert_eq!(offset_relative_path("", "Station1"), "Station1");
        assert_eq!(offset_relative_path("sub", ""), "sub");
        assert_eq!(offset_relative_path("sub", "Station1"), "sub/Station1");
        // 空白按原样保留
        assert_eq!(offset_relative_path("", " Station1 "), " Station1 ");
    }

    #[test]
    fn test_folder_offset() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(folder_offset(None, &nested.join("x.csv")).unwrap(), "");
        assert_eq!(folder_offset(Some(temp_dir.path()), &temp_dir.path().join("x.csv")).unwrap(), "");
        assert_eq!(folder_offset(Some(temp_dir.path()), &nested.join("x.csv")).unwrap(), "a/b");
        assert!(folder_offset(Some(&nested), &temp_dir.path().join("x.csv")).is_err());
    }
}
