// ==========================================
// 相机陷阱标注系统 - XLSX 行读取器
// ==========================================
// 职责: 前向流式读取工作表的 <row> 元素,不构建整表文档
// - 先整体读取共享字符串为扁平列表
// - 行宽以表头行为准（最后一个非空表头单元格）;数据区内没有值的行跳过
// - 稀疏单元格: 未出现的单元格为空字符串,不是空值标记
// ==========================================

use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::progress::ProgressReporter;
use crate::spreadsheet::row::{RowBuffer, RowSource};
use crate::spreadsheet::xlsx::column_ref::{column_index, dimension_width};
use crate::spreadsheet::xlsx::package::{relationship_type, PackageManifest};
use crate::spreadsheet::xlsx::shared_strings::read_shared_strings;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufReader, Read, Seek};
use tracing::debug;
use zip::read::ZipFile;
use zip::ZipArchive;

/// 单元格类型属性 t
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellValueType {
    /// t="s": 值为共享字符串索引
    SharedString,
    /// t="inlineStr": 值在 <is><t> 中
    InlineString,
    /// 其他类型（数字、布尔、公式字符串、错误）按字面取值
    Literal,
}

impl CellValueType {
    fn from_attribute(value: Option<&[u8]>) -> Self {
        match value {
            Some(b"s") => CellValueType::SharedString,
            Some(b"inlineStr") => CellValueType::InlineString,
            _ => CellValueType::Literal,
        }
    }
}

pub struct XlsxRowReader<'a> {
    reader: Reader<BufReader<ZipFile<'a>>>,
    buf: Vec<u8>,
    shared_strings: Vec<String>,
    worksheet_path: String,
    row: RowBuffer,
    /// dimension 声明的列数;读到表头后改为表头宽度
    width: usize,
    rows_read: usize,
    length: u64,
    finished: bool,
}

impl<'a> XlsxRowReader<'a> {
    /// 打开指定名称的工作表
    ///
    /// # 参数
    /// - archive: 调用方持有的包,读取器借用其中的工作表条目
    /// - worksheet_name: 工作表名称
    /// - progress: 共享字符串加载阶段的进度回报
    ///
    /// # 返回
    /// - Err(WorksheetNotFound): 包内没有该名称的工作表
    pub fn open<R: Read + Seek>(
        archive: &'a mut ZipArchive<R>,
        worksheet_name: &str,
        progress: &mut ProgressReporter<'_>,
    ) -> SpreadsheetResult<Self> {
        let manifest = PackageManifest::read(archive)?;
        let worksheet_path = manifest
            .worksheet_path(worksheet_name)
            .filter(|path| manifest.has_part(path))
            .ok_or_else(|| SpreadsheetError::WorksheetNotFound(worksheet_name.to_string()))?;

        let shared_strings = match manifest.part_path_by_type(relationship_type::SHARED_STRINGS) {
            Some(path) if manifest.has_part(&path) => {
                read_shared_strings(BufReader::new(archive.by_name(&path)?), progress)?
            }
            _ => Vec::new(),
        };
        debug!(
            worksheet = %worksheet_path,
            shared_strings = shared_strings.len(),
            "已加载共享字符串"
        );

        let entry = archive.by_name(&worksheet_path)?;
        let length = entry.size();
        let mut reader = Self {
            reader: Reader::from_reader(BufReader::new(entry)),
            buf: Vec::with_capacity(1024),
            shared_strings,
            worksheet_path,
            row: RowBuffer::default(),
            width: 0,
            rows_read: 0,
            length,
            finished: false,
        };
        reader.read_to_sheet_data()?;
        Ok(reader)
    }

    /// 读到 <sheetData> 为止,途中记录 dimension
    fn read_to_sheet_data(&mut self) -> SpreadsheetResult<()> {
        loop {
            self.buf.clear();
            let sheet_data_empty = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => Some(false),
                Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => Some(true),
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"dimension" => {
                    if let Some(attr) = e.try_get_attribute("ref")? {
                        let reference = attr.decode_and_unescape_value(&self.reader)?;
                        self.width = dimension_width(&reference).unwrap_or(0);
                    }
                    None
                }
                Event::Eof => {
                    return Err(SpreadsheetError::malformed(&self.worksheet_path, "缺少 sheetData"));
                }
                _ => None,
            };
            if let Some(is_empty) = sheet_data_empty {
                self.finished = is_empty;
                return Ok(());
            }
        }
    }

    /// 读取一个 <row> 的全部单元格到行缓冲
    fn read_row_cells(&mut self) -> SpreadsheetResult<()> {
        let mut next_column = 0usize;
        let mut cell_column = 0usize;
        let mut cell_type = CellValueType::Literal;
        let mut in_cell = false;
        let mut in_value = false;
        let mut value = String::new();

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"c" => {
                        let (column, value_type) = cell_attributes(&e, next_column)?;
                        cell_column = column;
                        cell_type = value_type;
                        next_column = column + 1;
                        in_cell = true;
                        value.clear();
                    }
                    b"v" if in_cell => in_value = true,
                    b"t" if in_cell && cell_type == CellValueType::InlineString => in_value = true,
                    _ => {}
                },
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"c" {
                        let (column, _) = cell_attributes(&e, next_column)?;
                        next_column = column + 1;
                    }
                }
                Event::Text(e) if in_value => value.push_str(&e.unescape()?),
                Event::CData(e) if in_value => {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = false,
                    b"c" if in_cell => {
                        in_cell = false;
                        let resolved = match cell_type {
                            CellValueType::SharedString => {
                                resolve_shared_string(&self.shared_strings, &self.worksheet_path, &value)?
                                    .to_string()
                            }
                            CellValueType::InlineString | CellValueType::Literal => std::mem::take(&mut value),
                        };
                        let field = self.row.field_mut(cell_column);
                        field.clear();
                        field.push_str(&resolved);
                    }
                    b"row" => return Ok(()),
                    _ => {}
                },
                Event::Eof => {
                    return Err(SpreadsheetError::malformed(&self.worksheet_path, "行元素未闭合"));
                }
                _ => {}
            }
        }
    }
}

fn resolve_shared_string<'s>(
    shared_strings: &'s [String],
    worksheet_path: &str,
    value: &str,
) -> SpreadsheetResult<&'s str> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| shared_strings.get(index))
        .map(String::as_str)
        .ok_or_else(|| SpreadsheetError::malformed(worksheet_path, format!("共享字符串索引无效: {}", value)))
}

/// 单元格的列索引与值类型;缺少 r 属性时顺延上一个单元格
fn cell_attributes(e: &BytesStart<'_>, next_column: usize) -> SpreadsheetResult<(usize, CellValueType)> {
    let column = match e.try_get_attribute("r")? {
        Some(attr) => std::str::from_utf8(&attr.value)
            .ok()
            .and_then(column_index)
            .unwrap_or(next_column),
        None => next_column,
    };
    let value_type = match e.try_get_attribute("t")? {
        Some(attr) => CellValueType::from_attribute(Some(attr.value.as_ref())),
        None => CellValueType::from_attribute(None),
    };
    Ok((column, value_type))
}

impl<'a> RowSource for XlsxRowReader<'a> {
    fn next_row(&mut self) -> SpreadsheetResult<Option<&mut RowBuffer>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let row_empty = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"row" => Some(false),
                Event::Empty(ref e) if e.local_name().as_ref() == b"row" => Some(true),
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    self.finished = true;
                    return Ok(None);
                }
                Event::Eof => {
                    self.finished = true;
                    return Ok(None);
                }
                _ => None,
            };
            let Some(is_empty) = row_empty else {
                continue;
            };
            self.row.reset(self.width);
            if !is_empty {
                self.read_row_cells()?;
            }
            if self.rows_read == 0 {
                // 表头决定宽度: dimension 可能因清除过的单元格偏大
                let header_width = self
                    .row
                    .as_slice()
                    .iter()
                    .rposition(|field| !field.is_empty())
                    .map_or(0, |last| last + 1);
                self.row.truncate(header_width);
                self.width = header_width;
            } else if self.row.is_blank() {
                // 数据区内没有值的 <row> 只携带格式
                continue;
            }
            self.rows_read += 1;
            return Ok(Some(&mut self.row));
        }
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn length(&self) -> u64 {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="file data" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;
    const SHARED_STRINGS: &str = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>File</t></si><si><t>Note</t></si><si><t>IMG_1.JPG</t></si></sst>"#;

    fn package(worksheet: &str) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", worksheet),
        ] {
            zip.start_file(name, FileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn read_all(worksheet: &str) -> Vec<Vec<String>> {
        let mut archive = ZipArchive::new(package(worksheet)).unwrap();
        let mut progress = ProgressReporter::silent();
        let mut reader = XlsxRowReader::open(&mut archive, "file data", &mut progress).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().unwrap() {
            rows.push(row.as_slice().to_vec());
        }
        rows
    }

    #[test]
    fn test_sparse_cells_are_empty_strings() {
        let rows = read_all(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C2"/><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="inlineStr"><is><t>Flag</t></is></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="C2" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#,
        );
        assert_eq!(rows, vec![vec!["File", "Note", "Flag"], vec!["IMG_1.JPG", "", "1"]]);
    }

    #[test]
    fn test_missing_dimension_uses_header_width() {
        let rows = read_all(
            r#"<worksheet><sheetData><row><c t="s"><v>0</v></c><c t="s"><v>1</v></c></row><row><c r="A2"><v>5</v></c></row><row/></sheetData></worksheet>"#,
        );
        assert_eq!(rows, vec![vec!["File", "Note"], vec!["5", ""]]);
    }

    #[test]
    fn test_wide_dimension_is_clamped_to_header() {
        // 清除过单元格的工作表: dimension 仍覆盖到 F 列
        let rows = read_all(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:F4"/><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="E1" t="s"/></row>
<row r="2"><c r="A2" t="s"><v>2</v></c></row>
<row r="3" ht="20" customHeight="1"><c r="B3" s="1"/></row>
<row r="4"><c r="A4"><v>7</v></c><c r="F4"><v>8</v></c></row>
</sheetData></worksheet>"#,
        );
        assert_eq!(
            rows,
            vec![
                vec!["File", "Note"],
                vec!["IMG_1.JPG", ""],
                vec!["7", "", "", "", "", "8"],
            ]
        );
    }

    #[test]
    fn test_empty_sheet_data_has_no_rows() {
        assert!(read_all(r#"<worksheet><dimension ref="A1"/><sheetData/></worksheet>"#).is_empty());
    }

    #[test]
    fn test_invalid_shared_string_index_is_malformed() {
        let mut archive = ZipArchive::new(package(
            r#"<worksheet><sheetData><row><c r="A1" t="s"><v>99</v></c></row></sheetData></worksheet>"#,
        ))
        .unwrap();
        let mut progress = ProgressReporter::silent();
        let mut reader = XlsxRowReader::open(&mut archive, "file data", &mut progress).unwrap();
        assert!(matches!(
            reader.next_row(),
            Err(SpreadsheetError::MalformedPackage { .. })
        ));
    }

    #[test]
    fn test_unknown_worksheet_name() {
        let mut archive = ZipArchive::new(package("<worksheet><sheetData/></worksheet>")).unwrap();
        let mut progress = ProgressReporter::silent();
        let result = XlsxRowReader::open(&mut archive, "other", &mut progress);
        assert!(matches!(result, Err(SpreadsheetError::WorksheetNotFound(name)) if name == "other"));
    }
}
