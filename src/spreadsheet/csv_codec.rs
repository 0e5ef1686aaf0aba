// ==========================================
// 相机陷阱标注系统 - CSV 行编解码
// ==========================================
// 写: 字段含逗号/引号/CR/LF 时加引号并双写内部引号;
//     每个字段后都写分隔符（行尾保留一个尾随逗号）
// 读: 单遍状态机;尾随逗号不产生额外字段;
//     引号字段内的换行不支持（读写不对称,属已知限制）
// ==========================================

use crate::spreadsheet::error::SpreadsheetResult;
use crate::spreadsheet::row::{RowBuffer, RowSink, RowSource};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const DELIMITER: u8 = b',';
const QUOTE: u8 = b'"';
const LINE_TERMINATOR: &str = "\r\n";
const BYTE_ORDER_MARK: &str = "\u{feff}";

/// 转义单个字段
///
/// 单遍扫描;无需转义时不分配
pub fn escape_field(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    let first_special = bytes
        .iter()
        .position(|&b| b == DELIMITER || b == QUOTE || b == b'\r' || b == b'\n');
    let Some(first_special) = first_special else {
        return Cow::Borrowed(value);
    };

    let mut escaped = String::with_capacity(value.len() + 8);
    escaped.push('"');
    escaped.push_str(&value[..first_special]);
    for ch in value[first_special..].chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    Cow::Owned(escaped)
}

/// 解析一行到行缓冲
///
/// 状态: 字段之间 / 字段内（按是否以引号开头再分两种）
/// - 无引号字段在下一个逗号处结束
/// - 引号字段在"引号+逗号"或"引号+行尾"处结束;"" 还原为一个引号
/// - 逗号后或行首的空字段为空字符串
pub fn parse_row(line: &str, row: &mut RowBuffer) {
    row.clear();
    let bytes = line.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == QUOTE {
            let field = row.push_field();
            index += 1;
            let mut segment_start = index;
            loop {
                if index >= bytes.len() {
                    // 未闭合的引号: 其余内容按字面保留
                    field.push_str(&line[segment_start..]);
                    return;
                }
                if bytes[index] != QUOTE {
                    index += 1;
                    continue;
                }
                match bytes.get(index + 1) {
                    Some(&QUOTE) => {
                        field.push_str(&line[segment_start..=index]);
                        index += 2;
                        segment_start = index;
                    }
                    Some(&DELIMITER) => {
                        field.push_str(&line[segment_start..index]);
                        index += 2;
                        break;
                    }
                    None => {
                        field.push_str(&line[segment_start..index]);
                        return;
                    }
                    // 字段中间的单个引号按字面保留
                    Some(_) => index += 1,
                }
            }
        } else {
            match line[index..].find(DELIMITER as char) {
                Some(offset) => {
                    row.push_field().push_str(&line[index..index + offset]);
                    index += offset + 1;
                }
                None => {
                    row.push_field().push_str(&line[index..]);
                    return;
                }
            }
        }
    }
}

// ==========================================
// CsvRowReader
// ==========================================
pub struct CsvRowReader<R: BufRead> {
    reader: R,
    line: String,
    row: RowBuffer,
    position: u64,
    length: u64,
}

impl CsvRowReader<BufReader<File>> {
    /// 打开 CSV 文件
    pub fn open(path: &Path) -> SpreadsheetResult<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self::new(BufReader::new(file), length))
    }
}

impl<R: BufRead> CsvRowReader<R> {
    pub fn new(reader: R, length: u64) -> Self {
        Self {
            reader,
            line: String::new(),
            row: RowBuffer::default(),
            position: 0,
            length,
        }
    }
}

impl<R: BufRead> RowSource for CsvRowReader<R> {
    fn next_row(&mut self) -> SpreadsheetResult<Option<&mut RowBuffer>> {
        self.line.clear();
        let bytes_read = self.reader.read_line(&mut self.line)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        let is_first_line = self.position == 0;
        self.position += bytes_read as u64;

        let mut line = self.line.as_str();
        if is_first_line {
            line = line.strip_prefix(BYTE_ORDER_MARK).unwrap_or(line);
        }
        let line = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);

        parse_row(line, &mut self.row);
        Ok(Some(&mut self.row))
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.length
    }
}

// ==========================================
// CsvRowWriter
// ==========================================
pub struct CsvRowWriter<W: Write> {
    writer: W,
}

impl CsvRowWriter<BufWriter<File>> {
    /// 写入到已创建的文件
    pub fn from_file(file: File, write_bom: bool) -> SpreadsheetResult<Self> {
        Self::new(BufWriter::new(file), write_bom)
    }
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(mut writer: W, write_bom: bool) -> SpreadsheetResult<Self> {
        if write_bom {
            writer.write_all(BYTE_ORDER_MARK.as_bytes())?;
        }
        Ok(Self { writer })
    }

    fn write_fields<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> SpreadsheetResult<()> {
        for field in fields {
            self.writer.write_all(escape_field(field).as_bytes())?;
            self.writer.write_all(&[DELIMITER])?;
        }
        self.writer.write_all(LINE_TERMINATOR.as_bytes())?;
        Ok(())
    }

    /// 刷新并取回底层写入器
    pub fn finish(mut self) -> SpreadsheetResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> RowSink for CsvRowWriter<W> {
    fn write_header(&mut self, names: &[String]) -> SpreadsheetResult<()> {
        self.write_fields(names.iter().map(String::as_str))
    }

    fn write_row(&mut self, cells: &[Option<String>]) -> SpreadsheetResult<()> {
        self.write_fields(cells.iter().map(|cell| cell.as_deref().unwrap_or("")))
    }
}
