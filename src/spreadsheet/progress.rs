// ==========================================
// 相机陷阱标注系统 - 进度与取消
// ==========================================
// 进度按经过时间节流（而非行数）
// 取消标志在每行边界检查
// ==========================================

use crate::i18n::{t, t_with_args};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 超过该字节数时以 MB 显示读取进度
const MEGABYTE: u64 = 1024 * 1024;
/// 包保存阶段的固定终点（无法获得真实进度）
const PACKAGE_SAVE_END_POSITION: u64 = 6;

// ==========================================
// 阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadWritePhase {
    Idle,
    Read,
    Write,
    SharedStringLoad,
    PackageSave,
    TransactionCommit,
}

/// 一次进度快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadWriteStatus {
    pub phase: ReadWritePhase,
    pub current_position: u64,
    pub end_position: u64,
}

impl ReadWriteStatus {
    fn idle() -> Self {
        Self {
            phase: ReadWritePhase::Idle,
            current_position: 0,
            end_position: 0,
        }
    }

    /// 百分比;终点为 0 时定位不明确,返回 50
    pub fn percentage(&self) -> f64 {
        if self.end_position == 0 {
            return 50.0;
        }
        100.0 * self.current_position as f64 / self.end_position as f64
    }

    /// 本地化进度文本
    pub fn message(&self) -> String {
        match self.phase {
            ReadWritePhase::Idle => String::new(),
            ReadWritePhase::Read => {
                let (divisor, unit) = if self.end_position > MEGABYTE {
                    (MEGABYTE as f64, "MB")
                } else {
                    (1024.0, "kB")
                };
                let current = format!("{:.1}", self.current_position as f64 / divisor);
                let end = format!("{:.1}", self.end_position as f64 / divisor);
                t_with_args(
                    "progress.read",
                    &[("current", &current), ("end", &end), ("unit", unit)],
                )
            }
            ReadWritePhase::Write => {
                let current = self.current_position.to_string();
                let end = self.end_position.to_string();
                t_with_args("progress.write", &[("current", &current), ("end", &end)])
            }
            ReadWritePhase::SharedStringLoad => t("progress.shared_string_load"),
            ReadWritePhase::PackageSave => t("progress.package_save"),
            ReadWritePhase::TransactionCommit => t("progress.transaction_commit"),
        }
    }
}

// ==========================================
// ProgressSink Trait
// ==========================================
// 调用方若需要界面响应,应在工作线程上运行整个调用并自行转发进度
pub trait ProgressSink {
    fn report(&mut self, status: &ReadWriteStatus);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ReadWriteStatus),
{
    fn report(&mut self, status: &ReadWriteStatus) {
        self(status)
    }
}

// ==========================================
// 取消标志
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// ProgressReporter
// ==========================================
pub struct ProgressReporter<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    cancellation: Option<CancellationFlag>,
    interval: Duration,
    last_report: Option<Instant>,
    status: ReadWriteStatus,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(
        sink: Option<&'a mut dyn ProgressSink>,
        cancellation: Option<CancellationFlag>,
        interval: Duration,
    ) -> Self {
        Self {
            sink,
            cancellation,
            interval,
            last_report: None,
            status: ReadWriteStatus::idle(),
        }
    }

    /// 不回报进度、不可取消
    pub fn silent() -> Self {
        Self::new(None, None, Duration::MAX)
    }

    pub fn status(&self) -> &ReadWriteStatus {
        &self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationFlag::is_cancelled)
            .unwrap_or(false)
    }

    pub fn begin_read(&mut self, bytes_to_read: u64) {
        self.begin(ReadWritePhase::Read, bytes_to_read);
    }

    pub fn begin_write(&mut self, rows_to_write: u64) {
        self.begin(ReadWritePhase::Write, rows_to_write);
    }

    pub fn begin_shared_string_load(&mut self, shared_strings: u64) {
        self.begin(ReadWritePhase::SharedStringLoad, shared_strings);
    }

    pub fn begin_package_save(&mut self) {
        self.begin(ReadWritePhase::PackageSave, PACKAGE_SAVE_END_POSITION);
    }

    pub fn end_package_save(&mut self) {
        self.report_now(PACKAGE_SAVE_END_POSITION);
    }

    pub fn begin_transaction_commit(&mut self, files: u64) {
        self.begin(ReadWritePhase::TransactionCommit, files);
    }

    fn begin(&mut self, phase: ReadWritePhase, end_position: u64) {
        self.status = ReadWriteStatus {
            phase,
            current_position: 0,
            end_position,
        };
        self.emit();
    }

    /// 按时间间隔节流的进度回报
    pub fn report(&mut self, position: u64) {
        if self.sink.is_none() {
            return;
        }
        let due = match self.last_report {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        };
        if due {
            self.report_now(position);
        }
    }

    /// 立即回报（阶段结束、事务提交后）
    pub fn report_now(&mut self, position: u64) {
        self.status.current_position = position;
        self.emit();
    }

    fn emit(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.report(&self.status);
            self.last_report = Some(Instant::now());
        }
    }

    /// 结束当前操作
    pub fn end(&mut self) {
        self.status = ReadWriteStatus::idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_with_zero_end_is_fifty() {
        let status = ReadWriteStatus {
            phase: ReadWritePhase::Write,
            current_position: 0,
            end_position: 0,
        };
        assert_eq!(status.percentage(), 50.0);

        let status = ReadWriteStatus {
            phase: ReadWritePhase::Write,
            current_position: 25,
            end_position: 100,
        };
        assert_eq!(status.percentage(), 25.0);
    }

    #[test]
    fn test_phase_begin_is_reported_immediately() {
        let mut seen = Vec::new();
        {
            let mut sink = |status: &ReadWriteStatus| seen.push(status.clone());
            let mut reporter = ProgressReporter::new(Some(&mut sink), None, Duration::from_secs(3600));
            reporter.begin_write(10);
            // 间隔未到,节流
            reporter.report(3);
            reporter.report_now(10);
            reporter.begin_package_save();
        }
        let phases: Vec<_> = seen.iter().map(|s| (s.phase, s.current_position)).collect();
        assert_eq!(
            phases,
            vec![
                (ReadWritePhase::Write, 0),
                (ReadWritePhase::Write, 10),
                (ReadWritePhase::PackageSave, 0),
            ]
        );
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let reporter = ProgressReporter::new(None, Some(flag.clone()), Duration::ZERO);
        assert!(!reporter.is_cancelled());
        flag.cancel();
        assert!(reporter.is_cancelled());
    }

    #[test]
    fn test_read_message_uses_megabytes_for_large_files() {
        let status = ReadWriteStatus {
            phase: ReadWritePhase::Read,
            current_position: MEGABYTE,
            end_position: 4 * MEGABYTE,
        };
        let message = status.message();
        assert!(message.contains("1.0"));
        assert!(message.contains("4.0MB"));
    }
}
