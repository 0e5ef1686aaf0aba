// ==========================================
// 相机陷阱标注系统 - 电子表格层错误类型
// ==========================================
// 结构性错误与行错误不走此类型: 它们以本地化字符串
// 累积在 FileImportResult::errors 中
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 电子表格层错误类型
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    // ===== 文件与包格式错误 =====
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML 解析失败: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XLSX 包读写失败: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XLSX 包内容格式错误 (part={part}): {message}")]
    MalformedPackage { part: String, message: String },

    #[error("工作表不存在: {0}")]
    WorksheetNotFound(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 前置条件 =====
    #[error("导入要求文件筛选为 All，当前为 {0}")]
    SelectionNotAll(String),

    #[error("不支持的电子表格格式: {0}（仅支持 .csv / .xlsx）")]
    UnsupportedFormat(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("配置读取失败: {0}")]
    Config(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpreadsheetError {
    pub fn malformed(part: &str, message: impl Into<String>) -> Self {
        SpreadsheetError::MalformedPackage {
            part: part.to_string(),
            message: message.into(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for SpreadsheetError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        SpreadsheetError::Xml(quick_xml::Error::InvalidAttr(err))
    }
}

impl From<tempfile::PersistError> for SpreadsheetError {
    fn from(err: tempfile::PersistError) -> Self {
        SpreadsheetError::Io(err.error)
    }
}

/// Result 类型别名
pub type SpreadsheetResult<T> = Result<T, SpreadsheetError>;
