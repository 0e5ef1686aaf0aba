// ==========================================
// 相机陷阱标注系统 - 电子表格互换层
// ==========================================
// 职责: 文件数据库 <-> CSV / XLSX 的批量导入与导出
// 调用方向: importer/exporter -> column_schema + 编解码器 -> row
// 单线程同步执行,每次调用独占一个行缓冲
// ==========================================

pub mod column_schema;
pub mod csv_codec;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod options;
pub mod progress;
pub mod result;
pub mod row;
pub mod xlsx;

pub use column_schema::{ColumnSchema, HeaderIndex, SchemaColumn};
pub use error::{SpreadsheetError, SpreadsheetResult};
pub use exporter::export_file;
pub use importer::import_file;
pub use options::SpreadsheetOptions;
pub use progress::{CancellationFlag, ProgressSink, ReadWritePhase, ReadWriteStatus};
pub use result::{ExportSummary, FileImportResult, ImportSummary, SpreadsheetFormat};
pub use row::{RowBuffer, RowSink, RowSource};
