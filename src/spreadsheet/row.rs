// ==========================================
// 相机陷阱标注系统 - 行缓冲与行视图
// ==========================================
// 行缓冲在一次读取循环内分配一次、逐行复用
// RowSource::next_row 以 &mut self 借出缓冲:
// 视图在下一次调用前必须释放,跨迭代别名由借用检查器排除
// ==========================================

use crate::spreadsheet::error::SpreadsheetResult;

/// 可复用的行缓冲
///
/// 字段字符串的容量跨行保留,逻辑宽度由 len 控制
#[derive(Debug, Default)]
pub struct RowBuffer {
    fields: Vec<String>,
    len: usize,
}

impl RowBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// 清空为零宽度
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// 重置为指定宽度,全部字段为空字符串
    pub fn reset(&mut self, width: usize) {
        if self.fields.len() < width {
            self.fields.resize_with(width, String::new);
        }
        for field in &mut self.fields[..width] {
            field.clear();
        }
        self.len = width;
    }

    /// 追加一个空字段并返回其可写引用
    pub fn push_field(&mut self) -> &mut String {
        if self.len == self.fields.len() {
            self.fields.push(String::new());
        }
        let field = &mut self.fields[self.len];
        field.clear();
        self.len += 1;
        field
    }

    /// 取指定列的可写引用;超出当前宽度时以空字段扩展
    pub fn field_mut(&mut self, index: usize) -> &mut String {
        if index >= self.len {
            let old_len = self.len;
            if self.fields.len() <= index {
                self.fields.resize_with(index + 1, String::new);
            }
            for field in &mut self.fields[old_len..=index] {
                field.clear();
            }
            self.len = index + 1;
        }
        &mut self.fields[index]
    }

    /// 截短到指定宽度;比当前宽度大时不变
    pub fn truncate(&mut self, width: usize) {
        self.len = self.len.min(width);
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.as_slice().get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.fields[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 全部字段均为空
    pub fn is_blank(&self) -> bool {
        self.as_slice().iter().all(String::is_empty)
    }

    /// 行内容的可读形式（用于错误信息）
    pub fn display(&self) -> String {
        self.as_slice().join(",")
    }
}

// ==========================================
// RowSource Trait
// ==========================================
// 实现者: CsvRowReader / XlsxRowReader
pub trait RowSource {
    /// 读取下一行
    ///
    /// # 返回
    /// - Ok(Some(row)): 仅在下一次调用前有效的行视图
    /// - Ok(None): 已读完
    fn next_row(&mut self) -> SpreadsheetResult<Option<&mut RowBuffer>>;

    /// 已读取的字节位置（进度用）
    fn position(&self) -> u64;

    /// 数据总字节数（进度用）
    fn length(&self) -> u64;
}

// ==========================================
// RowSink Trait
// ==========================================
// 实现者: CsvRowWriter / XlsxRowWriter
// 单元格为 None 表示无值
pub trait RowSink {
    fn write_header(&mut self, names: &[String]) -> SpreadsheetResult<()>;

    fn write_row(&mut self, cells: &[Option<String>]) -> SpreadsheetResult<()>;
}
