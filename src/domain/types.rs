// ==========================================
// 相机陷阱标注系统 - 领域类型定义
// ==========================================
// 控件类型 / 文件分类 / 文件筛选 / 列类型
// ColumnType 为统一的列类型标签:
// 建表、导出格式化、导入解析三处共用同一套分派
// ==========================================

use crate::domain::file_record::FieldValue;
use crate::domain::markers;
use crate::domain::time_format;
use crate::i18n::t_with_args;
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 控件类型 (Control Type)
// ==========================================
// 前六个为标准控件,其余为用户自定义控件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    File,           // 文件名
    RelativePath,   // 相对路径
    DateTime,       // 拍摄时间（UTC）
    UtcOffset,      // UTC 偏移（小时）
    Classification, // 文件分类
    DeleteFlag,     // 删除标记
    Counter,        // 计数器（附带标记点位置列）
    FixedChoice,    // 固定选项
    Flag,           // 布尔标记
    Note,           // 自由文本
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::File => "File",
            ControlType::RelativePath => "RelativePath",
            ControlType::DateTime => "DateTime",
            ControlType::UtcOffset => "UtcOffset",
            ControlType::Classification => "Classification",
            ControlType::DeleteFlag => "DeleteFlag",
            ControlType::Counter => "Counter",
            ControlType::FixedChoice => "FixedChoice",
            ControlType::Flag => "Flag",
            ControlType::Note => "Note",
        }
    }

    /// 该控件对应的列类型
    pub fn column_type(&self, choices: &[String]) -> ColumnType {
        match self {
            ControlType::File | ControlType::RelativePath | ControlType::Note => ColumnType::Text,
            ControlType::FixedChoice => ColumnType::Choice(choices.to_vec()),
            ControlType::Classification => ColumnType::Classification,
            ControlType::DateTime => ColumnType::DateTime,
            ControlType::UtcOffset => ColumnType::UtcOffset,
            ControlType::DeleteFlag | ControlType::Flag => ColumnType::Flag,
            ControlType::Counter => ColumnType::Counter,
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "File" => Ok(ControlType::File),
            "RelativePath" => Ok(ControlType::RelativePath),
            "DateTime" => Ok(ControlType::DateTime),
            "UtcOffset" => Ok(ControlType::UtcOffset),
            "Classification" => Ok(ControlType::Classification),
            "DeleteFlag" => Ok(ControlType::DeleteFlag),
            "Counter" => Ok(ControlType::Counter),
            "FixedChoice" => Ok(ControlType::FixedChoice),
            "Flag" => Ok(ControlType::Flag),
            "Note" => Ok(ControlType::Note),
            other => Err(format!("未知控件类型: {}", other)),
        }
    }
}

// ==========================================
// 文件分类 (File Classification)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FileClassification {
    #[default]
    Color,
    Corrupt,
    Dark,
    Greyscale,
    NoLongerAvailable,
    Video,
}

impl FileClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileClassification::Color => "Color",
            FileClassification::Corrupt => "Corrupt",
            FileClassification::Dark => "Dark",
            FileClassification::Greyscale => "Greyscale",
            FileClassification::NoLongerAvailable => "NoLongerAvailable",
            FileClassification::Video => "Video",
        }
    }
}

impl fmt::Display for FileClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Color" => Ok(FileClassification::Color),
            "Corrupt" => Ok(FileClassification::Corrupt),
            "Dark" => Ok(FileClassification::Dark),
            "Greyscale" => Ok(FileClassification::Greyscale),
            "NoLongerAvailable" => Ok(FileClassification::NoLongerAvailable),
            "Video" => Ok(FileClassification::Video),
            other => Err(format!("未知文件分类: {}", other)),
        }
    }
}

// ==========================================
// 文件筛选 (File Selection)
// ==========================================
// 导入要求 All: 对账必须能看到全部已有记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSelection {
    #[default]
    All,
    MarkedForDeletion,
    Classification(FileClassification),
}

impl fmt::Display for FileSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSelection::All => write!(f, "All"),
            FileSelection::MarkedForDeletion => write!(f, "MarkedForDeletion"),
            FileSelection::Classification(c) => write!(f, "Classification({})", c),
        }
    }
}

// ==========================================
// 单元格类型 (XLSX Cell Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    SharedString, // t="s",值为共享字符串索引
    Boolean,      // t="b",值为 0/1
    Number,       // 省略 t 属性（格式默认即数值）
}

// ==========================================
// 列类型 (Column Type)
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Text,
    Choice(Vec<String>),
    Classification,
    Counter,
    Flag,
    DateTime,
    UtcOffset,
    MarkerPositions,
}

impl ColumnType {
    /// XLSX 写出时的单元格类型
    ///
    /// 字符串/日期/二进制一律走共享字符串表（内联字符串在部分读取器中会被丢弃）
    pub fn cell_kind(&self) -> CellKind {
        match self {
            ColumnType::Text
            | ColumnType::Choice(_)
            | ColumnType::Classification
            | ColumnType::DateTime
            | ColumnType::MarkerPositions => CellKind::SharedString,
            ColumnType::Flag => CellKind::Boolean,
            ColumnType::Counter | ColumnType::UtcOffset => CellKind::Number,
        }
    }

    /// SQLite 列亲和类型
    pub fn sql_affinity(&self) -> &'static str {
        match self {
            ColumnType::Text
            | ColumnType::Choice(_)
            | ColumnType::Classification
            | ColumnType::DateTime => "TEXT",
            ColumnType::Counter | ColumnType::Flag => "INTEGER",
            ColumnType::UtcOffset => "REAL",
            ColumnType::MarkerPositions => "BLOB",
        }
    }

    /// 新记录的默认值
    ///
    /// 控件默认值可解析时优先使用,否则回落到类型默认值
    pub fn default_value(&self, control_default: &str) -> FieldValue {
        if !control_default.is_empty() {
            if let Ok(value) = self.parse_spreadsheet(control_default, "") {
                return value;
            }
        }

        match self {
            ColumnType::Text => FieldValue::Text(String::new()),
            ColumnType::Choice(_) => FieldValue::Text(String::new()),
            ColumnType::Classification => {
                FieldValue::Text(FileClassification::default().as_str().to_string())
            }
            ColumnType::Counter => FieldValue::Integer(0),
            ColumnType::Flag => FieldValue::Boolean(false),
            ColumnType::DateTime => FieldValue::DateTime(DateTime::<Utc>::default()),
            ColumnType::UtcOffset => FieldValue::Real(0.0),
            ColumnType::MarkerPositions => FieldValue::Null,
        }
    }

    /// 导出: 值 -> 电子表格字符串
    ///
    /// 返回 None 表示无值（XLSX 中省略该单元格,CSV 中为空字段）
    pub fn format_spreadsheet(&self, value: &FieldValue) -> Option<String> {
        match (self, value) {
            (_, FieldValue::Null) => None,
            (ColumnType::Flag, FieldValue::Boolean(flag)) => {
                Some(if *flag { "1" } else { "0" }.to_string())
            }
            (ColumnType::Flag, FieldValue::Integer(flag)) => {
                Some(if *flag != 0 { "1" } else { "0" }.to_string())
            }
            (ColumnType::Counter, FieldValue::Integer(count)) => Some(count.to_string()),
            (ColumnType::DateTime, FieldValue::DateTime(date_time)) => {
                Some(time_format::format_spreadsheet_date_time(date_time))
            }
            (ColumnType::UtcOffset, FieldValue::Real(hours)) => {
                Some(time_format::format_utc_offset_hours(*hours))
            }
            (ColumnType::MarkerPositions, FieldValue::Blob(packed)) => {
                match markers::packed_to_spreadsheet_string(packed) {
                    Ok(positions) => positions,
                    Err(e) => {
                        tracing::warn!(error = %e, "标记点位置数据损坏，按空值导出");
                        None
                    }
                }
            }
            (_, FieldValue::Text(text)) => Some(text.clone()),
            (_, other) => Some(other.to_string()),
        }
    }

    /// 导入: 电子表格字符串 -> 值
    ///
    /// # 返回
    /// - Err(String): 已本地化的错误信息（包含值与列名）
    pub fn parse_spreadsheet(&self, text: &str, column: &str) -> Result<FieldValue, String> {
        let args = [("value", text), ("column", column)];
        match self {
            ColumnType::Text => Ok(FieldValue::Text(text.to_string())),
            ColumnType::Choice(choices) => {
                if text.is_empty() || choices.iter().any(|choice| choice == text) {
                    Ok(FieldValue::Text(text.to_string()))
                } else {
                    Err(t_with_args("value.invalid_choice", &args))
                }
            }
            ColumnType::Classification => match text.parse::<FileClassification>() {
                Ok(classification) => Ok(FieldValue::Text(classification.as_str().to_string())),
                Err(_) => Err(t_with_args("value.invalid_classification", &args)),
            },
            ColumnType::Counter => match text.trim().parse::<i64>() {
                Ok(count) => Ok(FieldValue::Integer(count)),
                Err(_) => Err(t_with_args("value.invalid_counter", &args)),
            },
            ColumnType::Flag => match parse_flag(text) {
                Some(flag) => Ok(FieldValue::Boolean(flag)),
                None => Err(t_with_args("value.invalid_flag", &args)),
            },
            ColumnType::DateTime => match time_format::parse_spreadsheet_date_time(text) {
                Some(date_time) => Ok(FieldValue::DateTime(date_time)),
                None => Err(t_with_args("value.invalid_date_time", &args)),
            },
            ColumnType::UtcOffset => match time_format::parse_utc_offset_hours(text) {
                Some(hours) => Ok(FieldValue::Real(hours)),
                None => Err(t_with_args("value.invalid_utc_offset", &args)),
            },
            ColumnType::MarkerPositions => match markers::parse_spreadsheet_positions(text) {
                Some(packed) if packed.is_empty() => Ok(FieldValue::Null),
                Some(packed) => Ok(FieldValue::Blob(packed)),
                None => Err(t_with_args("value.invalid_markers", &args)),
            },
        }
    }

    /// 两个值在本列语义下是否等价
    ///
    /// 标记点坐标以电子表格精度（6 位小数）比较,
    /// 否则未修改的导出文件再导入时会因 f32 舍入被误判为变更
    pub fn equivalent(&self, left: &FieldValue, right: &FieldValue) -> bool {
        match self {
            ColumnType::MarkerPositions => {
                self.format_spreadsheet(left) == self.format_spreadsheet(right)
            }
            _ => left == right,
        }
    }

    /// 从 SQLite 读取值
    pub fn from_sql(&self, value: ValueRef<'_>) -> FieldValue {
        match (self, value) {
            (_, ValueRef::Null) => FieldValue::Null,
            (ColumnType::Counter, ValueRef::Integer(n)) => FieldValue::Integer(n),
            (ColumnType::Flag, ValueRef::Integer(n)) => FieldValue::Boolean(n != 0),
            (ColumnType::UtcOffset, ValueRef::Real(hours)) => FieldValue::Real(hours),
            (ColumnType::UtcOffset, ValueRef::Integer(hours)) => FieldValue::Real(hours as f64),
            (ColumnType::MarkerPositions, ValueRef::Blob(bytes)) => {
                if bytes.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Blob(bytes.to_vec())
                }
            }
            (ColumnType::DateTime, ValueRef::Text(bytes)) => {
                let text = String::from_utf8_lossy(bytes);
                match time_format::parse_spreadsheet_date_time(&text) {
                    Some(date_time) => FieldValue::DateTime(date_time),
                    None => FieldValue::Null,
                }
            }
            (_, ValueRef::Text(bytes)) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            (_, ValueRef::Integer(n)) => FieldValue::Integer(n),
            (_, ValueRef::Real(r)) => FieldValue::Real(r),
            (_, ValueRef::Blob(bytes)) => FieldValue::Blob(bytes.to_vec()),
        }
    }
}

/// 解析布尔标记
///
/// Excel 与 CSV 导出使用 "0"/"1";也接受 "true"/"false"（不区分大小写）
pub fn parse_flag(text: &str) -> Option<bool> {
    match text {
        "0" => Some(false),
        "1" => Some(true),
        _ if text.eq_ignore_ascii_case("false") => Some(false),
        _ if text.eq_ignore_ascii_case("true") => Some(true),
        _ => None,
    }
}
