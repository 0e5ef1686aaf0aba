// ==========================================
// 相机陷阱标注系统 - 领域模型层
// ==========================================
// 职责: 定义控件、文件记录、列类型与值格式
// 红线: 不含数据访问逻辑,不含电子表格编解码
// ==========================================

pub mod control;
pub mod file_record;
pub mod markers;
pub mod time_format;
pub mod types;

// 重导出核心类型
pub use control::{file_column, ControlDefinition};
pub use file_record::{FieldValue, FileIdentity, FileRecord};
pub use types::{CellKind, ColumnType, ControlType, FileClassification, FileSelection};
