// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的文件数据库初始化、测试记录生成等功能
// ==========================================

#![allow(dead_code)]

use camtrap_annotate::domain::file_record::{FieldValue, FileIdentity, FileRecord};
use camtrap_annotate::domain::markers::pack_positions;
use camtrap_annotate::domain::types::ControlType;
use camtrap_annotate::domain::ControlDefinition;
use camtrap_annotate::repository::{FileStore, SqliteFileStore};
use camtrap_annotate::spreadsheet::{ColumnSchema, SpreadsheetOptions};
use chrono::{TimeZone, Utc};
use std::error::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 测试模板中的用户控件
pub const COUNTER: &str = "Counter1";
pub const COUNTER_MARKERS: &str = "Counter1_MarkerPositions";
pub const SPECIES: &str = "Species";
pub const NOTE: &str = "Note0";

/// 标准控件 + 计数器 + 固定选项 + 备注
pub fn test_controls() -> Vec<ControlDefinition> {
    let mut controls = ControlDefinition::standard_controls();
    controls.push(ControlDefinition::new(COUNTER, ControlType::Counter, 7).with_default("0"));
    controls.push(
        ControlDefinition::new(SPECIES, ControlType::FixedChoice, 8).with_choices(&["", "elk", "deer"]),
    );
    controls.push(ControlDefinition::new(NOTE, ControlType::Note, 9));
    controls
}

/// 在临时目录中创建文件数据库
///
/// # 返回
/// - TempDir: 临时目录（需要保持存活）;电子表格也放在这里
/// - SqliteFileStore: 文件数据库
pub fn create_test_store() -> Result<(TempDir, SqliteFileStore), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("TimelapseData.ddb");
    let store = SqliteFileStore::create(&db_path, &test_controls())?;
    Ok((temp_dir, store))
}

/// 创建文件数据库并插入 count 条测试记录
pub fn create_seeded_store(count: usize) -> Result<(TempDir, SqliteFileStore), Box<dyn Error>> {
    let (temp_dir, store) = create_test_store()?;
    let mut files = sample_files(&store, count)?;
    store.insert_files(&mut files)?;
    Ok((temp_dir, store))
}

/// 生成测试记录
///
/// 第 i 条: Station{i%2}/IMG_{i:04}.JPG,计数 i,偶数条带一个标记点
pub fn sample_files(store: &SqliteFileStore, count: usize) -> Result<Vec<FileRecord>, Box<dyn Error>> {
    let schema = ColumnSchema::build(&store.controls()?);
    let base = Utc
        .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
        .single()
        .ok_or("invalid base date")?;

    let mut files = Vec::with_capacity(count);
    for i in 0..count {
        let identity = FileIdentity::new(&format!("Station{}", i % 2), &format!("IMG_{:04}.JPG", i));
        let mut file = FileRecord::new(&identity, schema.defaults());
        set(&schema, &mut file, "DateTime", FieldValue::DateTime(base + chrono::Duration::minutes(i as i64)));
        set(&schema, &mut file, "UtcOffset", FieldValue::Real(-7.0));
        set(&schema, &mut file, COUNTER, FieldValue::Integer(i as i64));
        if i % 2 == 0 {
            set(&schema, &mut file, COUNTER_MARKERS, FieldValue::Blob(pack_positions(&[(0.25, 0.5)])));
        }
        set(&schema, &mut file, SPECIES, FieldValue::Text("elk".to_string()));
        set(&schema, &mut file, NOTE, FieldValue::Text(format!("note, \"{}\"", i)));
        files.push(file);
    }
    Ok(files)
}

/// 按列结构中的列类型设置字段
pub fn set(schema: &ColumnSchema, file: &mut FileRecord, column: &str, value: FieldValue) {
    let position = schema.position(column).expect("column exists in schema");
    let column_type = schema.columns()[position].column_type.clone();
    file.set_value(column, &column_type, value);
}

/// 全部记录,按文件名排序
pub fn all_files(store: &SqliteFileStore) -> Vec<FileRecord> {
    let mut files = store.load_selected_files().expect("load files");
    files.sort_by(|a, b| a.file_name().cmp(b.file_name()));
    files
}

/// 按文件名查找记录
pub fn find_file(store: &SqliteFileStore, file_name: &str) -> FileRecord {
    all_files(store)
        .into_iter()
        .find(|file| file.file_name() == file_name)
        .unwrap_or_else(|| panic!("file {} not found", file_name))
}

/// 不打开进度回调的默认选项
pub fn quiet_options() -> SpreadsheetOptions<'static> {
    SpreadsheetOptions::default()
}

/// 与文件数据库同目录的电子表格路径
pub fn spreadsheet_path(temp_dir: &TempDir, file_name: &str) -> PathBuf {
    temp_dir.path().join(file_name)
}

/// 目录下除指定文件外是否还有残留（临时文件）
pub fn leftover_entries(directory: &Path, keep: &[&str]) -> Vec<String> {
    std::fs::read_dir(directory)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|name| !keep.contains(&name.as_str()))
        .collect()
}
