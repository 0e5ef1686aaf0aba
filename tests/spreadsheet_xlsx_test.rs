// ==========================================
// XLSX 导入/导出集成测试
// ==========================================
// 测试目标: 工作簿读写、其他工作表保留、第三方读取器兼容
// ==========================================

mod test_helpers;

use calamine::{open_workbook, Data, Reader, Xlsx};
use camtrap_annotate::config::SpreadsheetConfig;
use camtrap_annotate::domain::file_record::FieldValue;
use camtrap_annotate::domain::types::CellKind;
use camtrap_annotate::logging;
use camtrap_annotate::repository::FileStore;
use camtrap_annotate::spreadsheet::progress::ProgressReporter;
use camtrap_annotate::spreadsheet::xlsx::{XlsxPackageWriter, FILE_DATA_WORKSHEET_NAME};
use camtrap_annotate::spreadsheet::{
    export_file, import_file, CancellationFlag, ColumnSchema, RowSink, SpreadsheetError,
};
use std::fs;
use std::path::Path;
use test_helpers::*;

/// 用包写入器直接写一个工作表
fn write_worksheet(path: &Path, worksheet: &str, kinds: Vec<CellKind>, header: &[&str], rows: &[Vec<Option<&str>>]) {
    let mut progress = ProgressReporter::silent();
    let mut writer = XlsxPackageWriter::open(
        path,
        worksheet,
        kinds,
        rows.len(),
        &SpreadsheetConfig::default(),
        &mut progress,
    )
    .unwrap();
    let header: Vec<String> = header.iter().map(|name| name.to_string()).collect();
    writer.write_header(&header).unwrap();
    for row in rows {
        let cells: Vec<Option<String>> = row.iter().copied().map(|cell| cell.map(str::to_string)).collect();
        writer.write_row(&cells).unwrap();
    }
    writer.finish(&mut progress).unwrap();
}

fn write_notes_sheet(path: &Path) {
    write_worksheet(
        path,
        "notes",
        vec![CellKind::SharedString, CellKind::Number],
        &["Topic", "Value"],
        &[vec![Some("keep me"), Some("42")]],
    );
}

#[test]
fn test_xlsx_export_then_import_is_idempotent() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(4).unwrap();
    let path = spreadsheet_path(&temp_dir, "export.xlsx");

    let summary = export_file(&path, &store, quiet_options()).unwrap();
    assert_eq!(summary.files_exported, 4);

    let result = import_file(&path, &store, quiet_options()).unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(result.exception.is_none());
    assert_eq!(result.files_processed, 4);
    assert_eq!(result.files_unchanged, 4);
    assert_eq!(result.files_added + result.files_updated, 0);
    assert!(leftover_entries(temp_dir.path(), &["TimelapseData.ddb", "export.xlsx"]).is_empty());
}

#[test]
fn test_xlsx_export_is_readable_by_calamine() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(3).unwrap();
    let path = spreadsheet_path(&temp_dir, "export.xlsx");
    export_file(&path, &store, quiet_options()).unwrap();

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec![FILE_DATA_WORKSHEET_NAME.to_string()]);
    let range = workbook.worksheet_range(FILE_DATA_WORKSHEET_NAME).unwrap();
    assert_eq!(range.get_size(), (4, 10));

    let mut rows = range.rows();
    let header: Vec<String> = rows.next().unwrap().iter().map(|cell| cell.to_string()).collect();
    let schema = ColumnSchema::build(&store.controls().unwrap());
    assert_eq!(header, schema.names());

    let first = rows
        .find(|row| row[0] == Data::String("IMG_0000.JPG".to_string()))
        .unwrap();
    assert_eq!(first[1], Data::String("Station0".to_string()));
    assert_eq!(first[2], Data::String("2024-06-01T08:00:00.000Z".to_string()));
    assert_eq!(first[3], Data::Float(-7.0));
    assert_eq!(first[5], Data::Bool(false));
    assert_eq!(first[6], Data::Float(0.0));
    assert_eq!(first[7], Data::String("0.250000,0.500000".to_string()));
    assert_eq!(first[9], Data::String("note, \"0\"".to_string()));

    // 奇数条没有标记点: 单元格省略
    let second = range
        .rows()
        .find(|row| row[0] == Data::String("IMG_0001.JPG".to_string()))
        .unwrap();
    assert_eq!(second[7], Data::Empty);
}

#[test]
fn test_xlsx_export_preserves_other_worksheets() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(2).unwrap();
    let path = spreadsheet_path(&temp_dir, "workbook.xlsx");
    write_notes_sheet(&path);

    export_file(&path, &store, quiet_options()).unwrap();
    // 再次导出替换文件数据工作表,不新增工作表
    export_file(&path, &store, quiet_options()).unwrap();

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec!["notes".to_string(), FILE_DATA_WORKSHEET_NAME.to_string()]
    );
    let notes = workbook.worksheet_range("notes").unwrap();
    assert_eq!(notes.get_size(), (2, 2));
    assert_eq!(notes.get((1, 0)), Some(&Data::String("keep me".to_string())));
    assert_eq!(notes.get((1, 1)), Some(&Data::Float(42.0)));

    let files = workbook.worksheet_range(FILE_DATA_WORKSHEET_NAME).unwrap();
    assert_eq!(files.get_size(), (3, 10));

    let result = import_file(&path, &store, quiet_options()).unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.files_unchanged, 2);
}

#[test]
fn test_xlsx_import_without_file_data_worksheet_reports_error() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(1).unwrap();
    let path = spreadsheet_path(&temp_dir, "notes.xlsx");
    write_notes_sheet(&path);

    let result = import_file(&path, &store, quiet_options()).unwrap();
    assert_eq!(result.files_processed, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains(FILE_DATA_WORKSHEET_NAME));
    assert!(result.exception.is_none());
}

#[test]
fn test_xlsx_import_adds_and_updates_files() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(2).unwrap();
    let schema = ColumnSchema::build(&store.controls().unwrap());
    let path = spreadsheet_path(&temp_dir, "edited.xlsx");
    let header: Vec<&str> = [
        "File",
        "RelativePath",
        "DateTime",
        "UtcOffset",
        "Classification",
        "DeleteFlag",
        COUNTER,
        COUNTER_MARKERS,
        SPECIES,
        NOTE,
    ]
    .to_vec();
    write_worksheet(
        &path,
        FILE_DATA_WORKSHEET_NAME,
        schema.cell_kinds(),
        &header,
        &[
            vec![
                Some("IMG_0000.JPG"),
                Some("Station0"),
                Some("2024-06-01T08:00:00.000Z"),
                Some("-7"),
                Some("Color"),
                Some("1"),
                Some("12"),
                Some("0.1,0.2|0.3,0.4"),
                Some("deer"),
                None,
            ],
            vec![
                Some("IMG_0500.JPG"),
                Some("Station5"),
                Some("2024-06-03T10:30:00.000Z"),
                Some("5.50"),
                Some("Video"),
                Some("0"),
                Some("3"),
                None,
                None,
                Some("new file"),
            ],
        ],
    );

    let result = import_file(&path, &store, quiet_options()).unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.files_processed, 2);
    assert_eq!(result.files_updated, 1);
    assert_eq!(result.files_added, 1);

    let updated = find_file(&store, "IMG_0000.JPG");
    assert_eq!(updated.get("DeleteFlag"), &FieldValue::Boolean(true));
    assert_eq!(updated.get(COUNTER), &FieldValue::Integer(12));
    assert_eq!(updated.get(SPECIES), &FieldValue::Text("deer".to_string()));
    // 省略的单元格按空值导入
    assert_eq!(updated.get(NOTE), &FieldValue::Text(String::new()));
    assert!(matches!(updated.get(COUNTER_MARKERS), FieldValue::Blob(packed) if packed.len() == 16));

    let added = find_file(&store, "IMG_0500.JPG");
    assert_eq!(added.relative_path(), "Station5");
    assert_eq!(added.get("UtcOffset"), &FieldValue::Real(5.5));
    assert_eq!(added.get("Classification"), &FieldValue::Text("Video".to_string()));
    assert_eq!(added.get(COUNTER_MARKERS), &FieldValue::Null);
}

#[test]
fn test_cancelled_xlsx_export_leaves_workbook_untouched() {
    logging::init_test();
    let (temp_dir, store) = create_seeded_store(3).unwrap();
    let path = spreadsheet_path(&temp_dir, "workbook.xlsx");
    write_notes_sheet(&path);
    let before = fs::read(&path).unwrap();

    let flag = CancellationFlag::new();
    flag.cancel();
    let err = export_file(&path, &store, quiet_options().with_cancellation(flag)).unwrap_err();
    assert!(matches!(err, SpreadsheetError::Cancelled));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(leftover_entries(temp_dir.path(), &["TimelapseData.ddb", "workbook.xlsx"]).is_empty());
}
