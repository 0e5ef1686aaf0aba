// ==========================================
// 相机陷阱标注系统 - 电子表格配置读取 Trait
// ==========================================
// 职责: 定义导入/导出所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入
// ==========================================

use serde::Serialize;
use std::error::Error;
use std::time::Duration;

/// 进度回报最小间隔（毫秒）默认值
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 250;
/// 参考字体（Calibri 11pt）平均字符宽度（像素）默认值
pub const DEFAULT_CHARACTER_WIDTH_PX: u32 = 7;
/// 自动筛选下拉按钮宽度（像素）默认值
pub const DEFAULT_AUTOFILTER_DROPDOWN_PX: u32 = 15;

/// 导入/导出运行参数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadsheetConfig {
    /// 进度回报最小间隔（按经过时间,而非行数）
    pub progress_interval: Duration,
    /// CSV 写出时是否带 UTF-8 BOM
    pub csv_write_bom: bool,
    pub character_width_px: u32,
    pub autofilter_dropdown_px: u32,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            csv_write_bom: true,
            character_width_px: DEFAULT_CHARACTER_WIDTH_PX,
            autofilter_dropdown_px: DEFAULT_AUTOFILTER_DROPDOWN_PX,
        }
    }
}

// ==========================================
// SpreadsheetConfigReader Trait
// ==========================================
// 用途: 导入/导出模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait SpreadsheetConfigReader {
    /// 获取进度回报最小间隔
    ///
    /// # 默认值
    /// - 250 ms
    fn get_progress_interval(&self) -> Result<Duration, Box<dyn Error>>;

    /// CSV 写出时是否带 BOM
    ///
    /// # 默认值
    /// - true
    fn get_csv_write_bom(&self) -> Result<bool, Box<dyn Error>>;

    /// 列宽估算用字符宽度（像素）
    ///
    /// # 默认值
    /// - 7
    fn get_character_width_px(&self) -> Result<u32, Box<dyn Error>>;

    /// 列宽估算用下拉按钮宽度（像素）
    ///
    /// # 默认值
    /// - 15
    fn get_autofilter_dropdown_px(&self) -> Result<u32, Box<dyn Error>>;

    /// 一次读取全部电子表格配置
    fn load_spreadsheet_config(&self) -> Result<SpreadsheetConfig, Box<dyn Error>> {
        Ok(SpreadsheetConfig {
            progress_interval: self.get_progress_interval()?,
            csv_write_bom: self.get_csv_write_bom()?,
            character_width_px: self.get_character_width_px()?,
            autofilter_dropdown_px: self.get_autofilter_dropdown_px()?,
        })
    }
}
