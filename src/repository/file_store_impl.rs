// ==========================================
// 相机陷阱标注系统 - 文件数据库 Repository 实现
// ==========================================
// 存储: controls 表（控件定义） + files 表（每个控件一列）
// 计数器额外占一列 BLOB 存放标记点位置
// 身份唯一性: (RelativePath, File) 不区分大小写的唯一索引
// ==========================================

use crate::db::{initialize_fixed_schema, open_sqlite_connection, quote_identifier};
use crate::domain::control::{columns_in_spreadsheet_order, file_column, ControlDefinition};
use crate::domain::file_record::FileRecord;
use crate::domain::types::{ColumnType, ControlType, FileSelection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::file_store::{FileStore, IdentityKey};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// 选项列表分隔符
const CHOICE_SEPARATOR: char = '|';

// ==========================================
// SqliteFileStore
// ==========================================
pub struct SqliteFileStore {
    conn: Arc<Mutex<Connection>>,
    folder: Option<PathBuf>,
    selection: FileSelection,
}

impl SqliteFileStore {
    /// 按模板控件创建新的文件数据库
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - controls: 模板控件（必须包含六个标准控件）
    pub fn create(db_path: &Path, controls: &[ControlDefinition]) -> RepositoryResult<Self> {
        for required in [file_column::FILE, file_column::RELATIVE_PATH] {
            if !controls.iter().any(|control| control.data_label == required) {
                return Err(RepositoryError::ValidationError(format!(
                    "模板缺少标准控件: {}",
                    required
                )));
            }
        }

        let mut conn = open_database(db_path)?;
        {
            let tx = conn.transaction()?;
            initialize_fixed_schema(&tx)?;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO controls (
                        data_label, control_type, control_order, spreadsheet_order,
                        default_value, choices
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )?;
                for control in controls {
                    let choices = control.choices.join(&CHOICE_SEPARATOR.to_string());
                    stmt.execute(params![
                        control.data_label,
                        control.control_type.as_str(),
                        control.control_order,
                        control.spreadsheet_order,
                        control.default_value,
                        choices,
                    ])?;
                }
            }
            tx.execute_batch(&files_table_sql(controls))?;
            tx.commit()?;
        }

        info!(
            db_path = %db_path.display(),
            controls = controls.len(),
            "文件数据库已创建"
        );
        Ok(Self::from_parts(conn, db_path))
    }

    /// 打开已有文件数据库
    pub fn open(db_path: &Path) -> RepositoryResult<Self> {
        if !db_path.exists() {
            return Err(RepositoryError::DatabaseConnectionError(format!(
                "文件数据库不存在: {}",
                db_path.display()
            )));
        }
        let conn = open_database(db_path)?;
        Ok(Self::from_parts(conn, db_path))
    }

    fn from_parts(conn: Connection, db_path: &Path) -> Self {
        let folder = db_path
            .parent()
            .map(|parent| {
                if parent.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    parent.to_path_buf()
                }
            });
        Self {
            conn: Arc::new(Mutex::new(conn)),
            folder,
            selection: FileSelection::All,
        }
    }

    /// 共享连接（供 ConfigManager 复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub fn set_selection(&mut self, selection: FileSelection) {
        self.selection = selection;
    }

    /// 全部文件数量（忽略筛选条件）
    pub fn file_count(&self) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))
    }

    fn read_controls(conn: &Connection) -> RepositoryResult<Vec<ControlDefinition>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT data_label, control_type, control_order, spreadsheet_order,
                   default_value, choices
            FROM controls
            ORDER BY spreadsheet_order, control_order
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut controls = Vec::new();
        for row in rows {
            let (data_label, control_type, control_order, spreadsheet_order, default_value, choices) =
                row?;
            let control_type = control_type
                .parse::<ControlType>()
                .map_err(|message| RepositoryError::FieldValueError {
                    field: data_label.clone(),
                    message,
                })?;
            let choices = if choices.is_empty() {
                Vec::new()
            } else {
                choices.split(CHOICE_SEPARATOR).map(str::to_string).collect()
            };
            controls.push(ControlDefinition {
                data_label,
                control_type,
                control_order,
                spreadsheet_order,
                default_value,
                choices,
            });
        }
        Ok(controls)
    }

    /// 查询文件记录
    ///
    /// # 参数
    /// - selection: None 表示忽略筛选条件
    fn query_files(
        conn: &Connection,
        selection: Option<FileSelection>,
    ) -> RepositoryResult<Vec<FileRecord>> {
        let columns = columns_in_spreadsheet_order(&Self::read_controls(conn)?);
        let column_list = columns
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");

        let (where_clause, where_param) = selection_filter(selection);
        let sql = format!(
            "SELECT id, {} FROM files{} ORDER BY {} COLLATE NOCASE, {}, {} COLLATE NOCASE",
            column_list,
            where_clause,
            quote_identifier(file_column::RELATIVE_PATH),
            quote_identifier(file_column::DATE_TIME),
            quote_identifier(file_column::FILE),
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(where_param.iter()))?;
        let mut files = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let mut values = HashMap::with_capacity(columns.len());
            for (index, (name, column_type)) in columns.iter().enumerate() {
                values.insert(name.clone(), column_type.from_sql(row.get_ref(index + 1)?));
            }
            files.push(FileRecord::from_stored(id, values));
        }
        Ok(files)
    }
}

impl FileStore for SqliteFileStore {
    fn folder(&self) -> Option<PathBuf> {
        self.folder.clone()
    }

    fn selection(&self) -> FileSelection {
        self.selection
    }

    fn controls(&self) -> RepositoryResult<Vec<ControlDefinition>> {
        let conn = self.lock()?;
        Self::read_controls(&conn)
    }

    fn load_selected_files(&self) -> RepositoryResult<Vec<FileRecord>> {
        let conn = self.lock()?;
        let files = Self::query_files(&conn, Some(self.selection))?;
        debug!(selection = %self.selection, files = files.len(), "已加载筛选文件");
        Ok(files)
    }

    fn index_files_by_identity(&self) -> RepositoryResult<HashMap<IdentityKey, FileRecord>> {
        let conn = self.lock()?;
        let files = Self::query_files(&conn, None)?;
        let mut index = HashMap::with_capacity(files.len());
        for file in files {
            index.insert(file.identity().index_key(), file);
        }
        debug!(files = index.len(), "已建立身份索引");
        Ok(index)
    }

    fn insert_files(&self, files: &mut [FileRecord]) -> RepositoryResult<usize> {
        if files.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let columns = columns_in_spreadsheet_order(&Self::read_controls(&conn)?);
        let sql = format!(
            "INSERT INTO files ({}) VALUES ({})",
            columns
                .iter()
                .map(|(name, _)| quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", "),
            (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        let mut ids = Vec::with_capacity(files.len());
        {
            let mut stmt = tx.prepare(&sql)?;
            for file in files.iter() {
                stmt.execute(params_from_iter(columns.iter().map(|(name, _)| file.get(name))))?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for (file, id) in files.iter_mut().zip(ids) {
            file.set_id(id);
            file.accept_changes();
        }
        info!(inserted = files.len(), "文件批量插入完成");
        Ok(files.len())
    }

    fn update_files(&self, files: &mut [FileRecord]) -> RepositoryResult<usize> {
        if files.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let columns = columns_in_spreadsheet_order(&Self::read_controls(&conn)?);
        let sql = format!(
            "UPDATE files SET {} WHERE id = ?{}",
            columns
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{} = ?{}", quote_identifier(name), i + 1))
                .collect::<Vec<_>>()
                .join(", "),
            columns.len() + 1,
        );

        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for file in files.iter() {
                let id = file.id().ok_or_else(|| {
                    RepositoryError::ValidationError(format!("记录尚未持久化，无法更新: {}", file.identity()))
                })?;
                let mut values: Vec<&dyn rusqlite::ToSql> =
                    columns.iter().map(|(name, _)| file.get(name) as &dyn rusqlite::ToSql).collect();
                values.push(&id);
                let affected = stmt.execute(values.as_slice())?;
                if affected == 0 {
                    return Err(RepositoryError::NotFound {
                        entity: "files".to_string(),
                        id: id.to_string(),
                    });
                }
            }
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for file in files.iter_mut() {
            file.accept_changes();
        }
        info!(updated = files.len(), "文件批量更新完成");
        Ok(files.len())
    }
}

fn open_database(db_path: &Path) -> RepositoryResult<Connection> {
    let path = db_path.to_str().ok_or_else(|| {
        RepositoryError::DatabaseConnectionError(format!("路径不是有效 UTF-8: {}", db_path.display()))
    })?;
    let mut conn = open_sqlite_connection(path)
        .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
    crate::perf::install_sqlite_tracing(&mut conn);
    Ok(conn)
}

/// files 表建表语句
fn files_table_sql(controls: &[ControlDefinition]) -> String {
    let mut column_definitions = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for (name, column_type) in columns_in_spreadsheet_order(controls) {
        let collation = if matches!(column_type, ColumnType::Text) {
            " COLLATE NOCASE"
        } else {
            ""
        };
        column_definitions.push(format!(
            "{} {}{}",
            quote_identifier(&name),
            column_type.sql_affinity(),
            collation
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS files ({});\n\
         CREATE UNIQUE INDEX IF NOT EXISTS idx_files_identity ON files ({}, {});",
        column_definitions.join(", "),
        quote_identifier(file_column::RELATIVE_PATH),
        quote_identifier(file_column::FILE),
    )
}

/// 筛选条件 -> (WHERE 子句, 参数)
fn selection_filter(selection: Option<FileSelection>) -> (String, Option<String>) {
    match selection {
        None | Some(FileSelection::All) => (String::new(), None),
        Some(FileSelection::MarkedForDeletion) => (
            format!(" WHERE {} = 1", quote_identifier(file_column::DELETE_FLAG)),
            None,
        ),
        Some(FileSelection::Classification(classification)) => (
            format!(" WHERE {} = ?1", quote_identifier(file_column::CLASSIFICATION)),
            Some(classification.as_str().to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::file_record::{FieldValue, FileIdentity};
    use tempfile::TempDir;

    fn create_store(dir: &TempDir) -> SqliteFileStore {
        let mut controls = ControlDefinition::standard_controls();
        controls.push(ControlDefinition::new("Count", ControlType::Counter, 7).with_default("0"));
        SqliteFileStore::create(&dir.path().join("files.db"), &controls).unwrap()
    }

    fn new_file(relative_path: &str, file_name: &str) -> FileRecord {
        FileRecord::new(
            &FileIdentity::new(relative_path, file_name),
            vec![
                ("Count".to_string(), FieldValue::Integer(0)),
                ("DeleteFlag".to_string(), FieldValue::Boolean(false)),
                ("Classification".to_string(), FieldValue::Text("Color".to_string())),
            ],
        )
    }

    #[test]
    fn test_create_requires_identity_controls() {
        let dir = TempDir::new().unwrap();
        let controls = vec![ControlDefinition::new("Note", ControlType::Note, 1)];
        let result = SqliteFileStore::create(&dir.path().join("bad.db"), &controls);
        assert!(matches!(result, Err(RepositoryError::ValidationError(_))));
    }

    #[test]
    fn test_controls_include_marker_column_in_files_table() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        let controls = store.controls().unwrap();
        assert_eq!(controls.len(), 7);
        assert_eq!(controls[0].data_label, "File");

        let conn = store.connection();
        let conn = conn.lock().unwrap();
        let has_marker: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('files') WHERE name = 'Count_MarkerPositions'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n == 1)
            .unwrap();
        assert!(has_marker);
    }

    #[test]
    fn test_insert_then_update_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        let mut files = vec![new_file("b", "IMG_2.JPG"), new_file("a", "IMG_1.JPG")];
        assert_eq!(store.insert_files(&mut files).unwrap(), 2);
        assert!(files.iter().all(|f| f.id().is_some() && !f.has_changes()));

        let mut index = store.index_files_by_identity().unwrap();
        let mut existing = index
            .remove(&FileIdentity::new("A", "img_1.jpg").index_key())
            .unwrap();
        existing.set_value("Count", &ColumnType::Counter, FieldValue::Integer(4));
        let mut updates = vec![existing];
        assert_eq!(store.update_files(&mut updates).unwrap(), 1);

        let loaded = store.load_selected_files().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].relative_path(), "a");
        assert_eq!(loaded[0].get("Count"), &FieldValue::Integer(4));
        assert_eq!(loaded[0].get("Count_MarkerPositions"), &FieldValue::Null);
    }

    #[test]
    fn test_duplicate_identity_is_rejected_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);

        let mut files = vec![new_file("a", "IMG_1.JPG"), new_file("A", "img_1.jpg")];
        let result = store.insert_files(&mut files);
        assert!(matches!(result, Err(RepositoryError::UniqueConstraintViolation(_))));
        assert_eq!(store.file_count().unwrap(), 0);
    }

    #[test]
    fn test_selection_filters_loaded_files() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);

        let mut marked = new_file("a", "IMG_1.JPG");
        marked.set_value("DeleteFlag", &ColumnType::Flag, FieldValue::Boolean(true));
        let mut files = vec![marked, new_file("a", "IMG_2.JPG")];
        store.insert_files(&mut files).unwrap();

        store.set_selection(FileSelection::MarkedForDeletion);
        let selected = store.load_selected_files().unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].file_name(), "IMG_1.JPG");

        // 身份索引不受筛选影响
        assert_eq!(store.index_files_by_identity().unwrap().len(), 2);
    }
}
