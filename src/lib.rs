// ==========================================
// 相机陷阱标注系统 - 核心库
// ==========================================
// 职责: 文件数据库与 CSV / XLSX 电子表格之间的批量导入导出
// 技术栈: Rust + SQLite + OOXML
// 系统定位: 标注数据互换（人工在电子表格中批量编辑后回写）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 控件、文件记录、值格式
pub mod domain;

// 数据仓储层 - 文件数据库访问
pub mod repository;

// 电子表格互换层 - 导入/导出
pub mod spreadsheet;

// 配置层 - 运行参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// 性能统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CellKind, ColumnType, ControlType, FileClassification, FileSelection};

// 领域实体
pub use domain::{ControlDefinition, FieldValue, FileIdentity, FileRecord};

// 仓储
pub use repository::{FileStore, RepositoryError, SqliteFileStore};

// 导入/导出
pub use spreadsheet::{
    export_file, import_file, CancellationFlag, ExportSummary, FileImportResult, ImportSummary,
    ProgressSink, ReadWriteStatus, SpreadsheetError, SpreadsheetFormat, SpreadsheetOptions,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "相机陷阱标注系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
