// ==========================================
// 相机陷阱标注系统 - 导入/导出调用选项
// ==========================================

use crate::config::{SpreadsheetConfig, SpreadsheetConfigReader};
use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::progress::{CancellationFlag, ProgressReporter, ProgressSink};

/// 单次导入/导出的选项
///
/// 进度回调在调用线程上同步执行;需要界面响应时由调用方把整个调用放到后台线程
#[derive(Default)]
pub struct SpreadsheetOptions<'a> {
    pub config: SpreadsheetConfig,
    pub progress: Option<&'a mut dyn ProgressSink>,
    pub cancellation: Option<CancellationFlag>,
}

impl<'a> SpreadsheetOptions<'a> {
    /// 从配置读取器加载配置
    pub fn from_config_reader(reader: &dyn SpreadsheetConfigReader) -> SpreadsheetResult<Self> {
        let config = reader
            .load_spreadsheet_config()
            .map_err(|e| SpreadsheetError::Config(e.to_string()))?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    pub fn with_progress(mut self, sink: &'a mut dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub(crate) fn reporter(&mut self) -> ProgressReporter<'_> {
        let sink: Option<&mut dyn ProgressSink> = match self.progress.as_mut() {
            Some(sink) => Some(&mut **sink),
            None => None,
        };
        ProgressReporter::new(
            sink,
            self.cancellation.clone(),
            self.config.progress_interval,
        )
    }
}
