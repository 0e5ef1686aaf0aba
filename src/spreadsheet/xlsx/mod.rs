// ==========================================
// 相机陷阱标注系统 - XLSX 包编解码
// ==========================================
// 直接控制包序列化: quick-xml 流式读写部件,zip 读写容器
// ==========================================

pub mod column_ref;
pub mod package;
pub mod reader;
pub mod shared_strings;
pub mod stylesheet;
pub mod writer;

pub use reader::XlsxRowReader;
pub use shared_strings::SharedStringTable;
pub use writer::{column_width, XlsxPackageWriter};

/// 文件数据所在工作表的固定名称
pub const FILE_DATA_WORKSHEET_NAME: &str = "file data";
