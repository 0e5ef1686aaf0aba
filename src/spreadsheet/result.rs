// ==========================================
// 相机陷阱标注系统 - 导入/导出结果
// ==========================================

use crate::spreadsheet::error::SpreadsheetError;
use serde::Serialize;
use std::path::Path;

/// 电子表格格式（按扩展名判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Csv,
    Xlsx,
}

impl SpreadsheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("csv") {
            Some(SpreadsheetFormat::Csv)
        } else if extension.eq_ignore_ascii_case("xlsx") {
            Some(SpreadsheetFormat::Xlsx)
        } else {
            None
        }
    }
}

/// 导入结果
///
/// 创建时为空,在整个导入过程中累积,最后一次性返回
#[derive(Debug, Default)]
pub struct FileImportResult {
    pub files_added: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    /// 完成对账的行数（新增 + 更新 + 未变化）
    pub files_processed: usize,
    /// 结构错误与行错误（已本地化）
    pub errors: Vec<String>,
    /// 读取源文件或提交事务时的异常
    pub exception: Option<SpreadsheetError>,
}

impl FileImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.exception.is_some()
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            files_added: self.files_added,
            files_updated: self.files_updated,
            files_unchanged: self.files_unchanged,
            files_processed: self.files_processed,
            errors: self.errors.clone(),
            exception: self.exception.as_ref().map(ToString::to_string),
        }
    }
}

/// 导入结果的可序列化摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub files_added: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_processed: usize,
    pub errors: Vec<String>,
    pub exception: Option<String>,
}

/// 导出结果摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub format: SpreadsheetFormat,
    pub destination: String,
    pub files_exported: usize,
    pub columns: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SpreadsheetFormat::from_path(Path::new("a/b.CSV")), Some(SpreadsheetFormat::Csv));
        assert_eq!(SpreadsheetFormat::from_path(Path::new("b.xlsx")), Some(SpreadsheetFormat::Xlsx));
        assert_eq!(SpreadsheetFormat::from_path(Path::new("b.xls")), None);
        assert_eq!(SpreadsheetFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_summary_serializes_exception_as_text() {
        let result = FileImportResult {
            files_processed: 2,
            exception: Some(SpreadsheetError::Cancelled),
            ..Default::default()
        };
        assert!(result.has_errors());
        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["files_processed"], 2);
        assert!(json["exception"].is_string());
    }
}
