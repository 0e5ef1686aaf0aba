// ==========================================
// 相机陷阱标注系统 - 文件记录
// ==========================================
// 一条记录对应一个图像/视频文件
// 身份 = (相对路径, 文件名),比较时不区分大小写
// 变更跟踪: 首次修改某字段时记下原值,改回原值时撤销
// ==========================================

use crate::domain::control::file_column;
use crate::domain::types::ColumnType;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use std::collections::HashMap;
use std::fmt;

// ==========================================
// 字段值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(text) => write!(f, "{}", text),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Real(r) => write!(f, "{}", r),
            FieldValue::Boolean(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            FieldValue::DateTime(dt) => {
                write!(f, "{}", crate::domain::time_format::format_spreadsheet_date_time(dt))
            }
            FieldValue::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Text(text) => ToSqlOutput::from(text.as_str()),
            FieldValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            FieldValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            FieldValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            FieldValue::DateTime(dt) => ToSqlOutput::Owned(Value::Text(
                crate::domain::time_format::format_spreadsheet_date_time(dt),
            )),
            FieldValue::Blob(bytes) => ToSqlOutput::from(bytes.as_slice()),
        })
    }
}

// ==========================================
// 文件身份
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub relative_path: String,
    pub file_name: String,
}

impl FileIdentity {
    pub fn new(relative_path: &str, file_name: &str) -> Self {
        Self {
            relative_path: normalize_relative_path(relative_path),
            file_name: file_name.to_string(),
        }
    }

    /// 索引键: 小写 + 统一路径分隔符
    pub fn index_key(&self) -> (String, String) {
        (self.relative_path.to_lowercase(), self.file_name.to_lowercase())
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative_path.is_empty() {
            write!(f, "{}", self.file_name)
        } else {
            write!(f, "{}/{}", self.relative_path, self.file_name)
        }
    }
}

/// 规范化相对路径: '\' 转为 '/',去掉首尾分隔符与 "./" 前缀
pub fn normalize_relative_path(relative_path: &str) -> String {
    let unified = relative_path.replace('\\', "/");
    let trimmed = unified.trim_matches('/');
    let mut segments = trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".");
    let mut normalized = String::with_capacity(trimmed.len());
    if let Some(first) = segments.next() {
        normalized.push_str(first);
        for segment in segments {
            normalized.push('/');
            normalized.push_str(segment);
        }
    }
    normalized
}

// ==========================================
// 文件记录
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    id: Option<i64>,
    values: HashMap<String, FieldValue>,
    /// 已变更字段的原值（未变更字段不在其中）
    original: HashMap<String, FieldValue>,
}

impl FileRecord {
    /// 新建记录（尚未持久化）
    ///
    /// # 参数
    /// - identity: 文件身份
    /// - defaults: (列名, 默认值) 列表
    pub fn new(identity: &FileIdentity, defaults: Vec<(String, FieldValue)>) -> Self {
        let mut values: HashMap<String, FieldValue> = defaults.into_iter().collect();
        values.insert(
            file_column::RELATIVE_PATH.to_string(),
            FieldValue::Text(identity.relative_path.clone()),
        );
        values.insert(
            file_column::FILE.to_string(),
            FieldValue::Text(identity.file_name.clone()),
        );
        Self {
            id: None,
            values,
            original: HashMap::new(),
        }
    }

    /// 从存储加载的记录
    pub fn from_stored(id: i64, values: HashMap<String, FieldValue>) -> Self {
        Self {
            id: Some(id),
            values,
            original: HashMap::new(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn file_name(&self) -> &str {
        self.text(file_column::FILE)
    }

    pub fn relative_path(&self) -> &str {
        self.text(file_column::RELATIVE_PATH)
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(self.relative_path(), self.file_name())
    }

    fn text(&self, column: &str) -> &str {
        self.values
            .get(column)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// 取字段值（缺失字段视为 Null）
    pub fn get(&self, column: &str) -> &FieldValue {
        self.values.get(column).unwrap_or(&FieldValue::Null)
    }

    /// 设置字段值并跟踪变更
    ///
    /// # 返回
    /// - true: 值在列语义下发生了变化
    pub fn set_value(&mut self, column: &str, column_type: &ColumnType, value: FieldValue) -> bool {
        let current = self.get(column).clone();
        if column_type.equivalent(&current, &value) {
            return false;
        }

        let reverts = self
            .original
            .get(column)
            .map(|original| column_type.equivalent(original, &value));
        match reverts {
            // 改回原值: 撤销该字段的变更
            Some(true) => {
                self.original.remove(column);
            }
            Some(false) => {}
            None => {
                self.original.insert(column.to_string(), current);
            }
        }
        self.values.insert(column.to_string(), value);
        true
    }

    pub fn has_changes(&self) -> bool {
        !self.original.is_empty()
    }

    /// 已变更的列名
    pub fn changed_columns(&self) -> impl Iterator<Item = &str> {
        self.original.keys().map(String::as_str)
    }

    /// 接受变更（持久化之后调用）
    pub fn accept_changes(&mut self) {
        self.original.clear();
    }
}
