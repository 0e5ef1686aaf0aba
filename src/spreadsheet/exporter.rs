// ==========================================
// 相机陷阱标注系统 - 电子表格导出
// ==========================================
// 按当前筛选与显示顺序整体导出,无对账
// 两种格式都先写同目录临时文件,成功后替换目标文件;
// 取消或失败时目标文件保持原样
// ==========================================

use crate::domain::file_record::FileRecord;
use crate::perf::PerfGuard;
use crate::repository::file_store::FileStore;
use crate::spreadsheet::column_schema::ColumnSchema;
use crate::spreadsheet::csv_codec::CsvRowWriter;
use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::options::SpreadsheetOptions;
use crate::spreadsheet::progress::ProgressReporter;
use crate::spreadsheet::result::{ExportSummary, SpreadsheetFormat};
use crate::spreadsheet::row::RowSink;
use crate::spreadsheet::xlsx::{XlsxPackageWriter, FILE_DATA_WORKSHEET_NAME};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// 导出当前筛选下的文件数据
///
/// # 参数
/// - path: 目标路径（按扩展名判定格式）;.xlsx 已存在时只替换文件数据工作表
/// - store: 文件数据库
/// - options: 配置、进度回调、取消标志
///
/// # 返回
/// - Ok(ExportSummary): 导出行数与列数
/// - Err(Cancelled): 导出被取消,目标文件未改动
#[instrument(skip_all, fields(operation_id = %Uuid::new_v4(), path = %path.display()))]
pub fn export_file(
    path: &Path,
    store: &dyn FileStore,
    mut options: SpreadsheetOptions<'_>,
) -> SpreadsheetResult<ExportSummary> {
    let format = SpreadsheetFormat::from_path(path)
        .ok_or_else(|| SpreadsheetError::UnsupportedFormat(path.display().to_string()))?;
    let mut perf = PerfGuard::new("spreadsheet.export");

    let schema = ColumnSchema::build(&store.controls()?);
    let files = store.load_selected_files()?;
    info!(
        format = ?format,
        selection = %store.selection(),
        files = files.len(),
        columns = schema.len(),
        "开始导出"
    );

    let config = options.config.clone();
    let mut progress = options.reporter();
    match format {
        SpreadsheetFormat::Csv => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let temp = NamedTempFile::new_in(directory)?;
            let mut writer = CsvRowWriter::from_file(temp.reopen()?, config.csv_write_bom)?;
            write_rows(&mut writer, &schema, &files, &mut progress)?;
            drop(writer.finish()?);
            temp.persist(path)?;
        }
        SpreadsheetFormat::Xlsx => {
            let mut writer = XlsxPackageWriter::open(
                path,
                FILE_DATA_WORKSHEET_NAME,
                schema.cell_kinds(),
                files.len(),
                &config,
                &mut progress,
            )?;
            write_rows(&mut writer, &schema, &files, &mut progress)?;
            writer.finish(&mut progress)?;
        }
    }
    progress.end();
    perf.set_rows(files.len());

    info!(files = files.len(), "导出完成");
    Ok(ExportSummary {
        format,
        destination: path.display().to_string(),
        files_exported: files.len(),
        columns: schema.len(),
    })
}

/// 表头 + 每条记录一行
///
/// 值为空的列交给写入器决定表示方式（CSV 空字段,XLSX 省略单元格）
fn write_rows<W: RowSink>(
    sink: &mut W,
    schema: &ColumnSchema,
    files: &[FileRecord],
    progress: &mut ProgressReporter<'_>,
) -> SpreadsheetResult<()> {
    progress.begin_write(files.len() as u64);
    sink.write_header(&schema.names())?;

    let mut cells: Vec<Option<String>> = Vec::with_capacity(schema.len());
    for (index, file) in files.iter().enumerate() {
        if progress.is_cancelled() {
            debug!(rows_written = index, "导出已取消");
            return Err(SpreadsheetError::Cancelled);
        }
        cells.clear();
        cells.extend(
            schema
                .columns()
                .iter()
                .map(|column| column.column_type.format_spreadsheet(file.get(&column.name))),
        );
        sink.write_row(&cells)?;
        progress.report(index as u64 + 1);
    }
    progress.report_now(files.len() as u64);
    Ok(())
}
