// ==========================================
// 相机陷阱标注系统 - 配置层
// ==========================================
// 职责: 电子表格导入/导出运行参数
// 存储: 文件数据库的 config_kv 表
// ==========================================

pub mod config_manager;
pub mod spreadsheet_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use spreadsheet_config::{SpreadsheetConfig, SpreadsheetConfigReader};
