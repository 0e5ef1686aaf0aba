// ==========================================
// 相机陷阱标注系统 - XLSX 样式表
// ==========================================
// 新建包: 写入最小样式表（常规 + 粗体字体,cellXfs 1 引用粗体）
// 已有样式表: 只读扫描粗体字体及引用它的单元格格式,不做修改
// 找不到粗体格式时表头不加样式
// ==========================================

use crate::spreadsheet::error::SpreadsheetResult;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

/// 最小样式表
///
/// fills 必须包含 none 与 gray125 两项,否则 Excel 会提示修复
pub const DEFAULT_STYLESHEET_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="2">"#,
    r#"<font><sz val="11"/><name val="Calibri"/><family val="2"/></font>"#,
    r#"<font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font>"#,
    r#"</fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2">"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>"#,
    r#"</cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    r#"</styleSheet>"#,
);

/// 最小样式表中粗体单元格格式的索引
const DEFAULT_BOLD_CELL_FORMAT: usize = 1;

/// 表头样式信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    /// 引用粗体字体的 cellXfs 索引
    pub bold_cell_format: Option<usize>,
    /// 是否需要写出样式部件（仅新建样式表时为 true）
    pub has_changes: bool,
}

impl Stylesheet {
    /// 新建的最小样式表
    pub fn default_stylesheet() -> Self {
        Self {
            bold_cell_format: Some(DEFAULT_BOLD_CELL_FORMAT),
            has_changes: true,
        }
    }

    /// 扫描已有样式表
    pub fn scan<R: BufRead>(source: R) -> SpreadsheetResult<Self> {
        Ok(Self {
            bold_cell_format: find_bold_cell_format(source)?,
            has_changes: false,
        })
    }

    pub fn accept_changes(&mut self) {
        self.has_changes = false;
    }
}

#[derive(PartialEq)]
enum Section {
    Other,
    Fonts,
    CellFormats,
}

/// 查找第一个粗体字体,再查找第一个引用该字体的 cellXfs 项
fn find_bold_cell_format<R: BufRead>(source: R) -> SpreadsheetResult<Option<usize>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut section = Section::Other;
    let mut font_index = 0usize;
    let mut in_font = false;
    let mut bold_font: Option<usize> = None;
    let mut format_index = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"fonts" if !is_empty => section = Section::Fonts,
                b"cellXfs" if !is_empty => section = Section::CellFormats,
                b"font" if section == Section::Fonts => {
                    if is_empty {
                        font_index += 1;
                    } else {
                        in_font = true;
                    }
                }
                b"b" if in_font && bold_font.is_none() => {
                    let enabled = match e.try_get_attribute("val")? {
                        Some(attr) => !matches!(attr.value.as_ref(), b"0" | b"false"),
                        None => true,
                    };
                    if enabled {
                        bold_font = Some(font_index);
                    }
                }
                b"xf" if section == Section::CellFormats => {
                    if let Some(bold) = bold_font {
                        let font_id = e
                            .try_get_attribute("fontId")?
                            .and_then(|attr| std::str::from_utf8(&attr.value).ok()?.parse::<usize>().ok())
                            .unwrap_or(0);
                        if font_id == bold {
                            return Ok(Some(format_index));
                        }
                    }
                    format_index += 1;
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"font" if in_font => {
                    in_font = false;
                    font_index += 1;
                }
                b"fonts" | b"cellXfs" => section = Section::Other,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stylesheet_bold_format_is_found_by_scan() {
        let scanned = Stylesheet::scan(DEFAULT_STYLESHEET_XML.as_bytes()).unwrap();
        assert_eq!(scanned.bold_cell_format, Some(DEFAULT_BOLD_CELL_FORMAT));
        assert!(!scanned.has_changes);
        assert!(Stylesheet::default_stylesheet().has_changes);
    }

    #[test]
    fn test_stylesheet_without_bold_font() {
        let xml = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="1"><font><sz val="11"/></font></fonts>
<cellXfs count="1"><xf fontId="0"/></cellXfs></styleSheet>"#;
        assert_eq!(Stylesheet::scan(xml.as_bytes()).unwrap().bold_cell_format, None);
    }

    #[test]
    fn test_bold_font_without_matching_format() {
        let xml = r#"<styleSheet><fonts><font/><font><b val="0"/></font><font><b/></font></fonts>
<cellXfs><xf fontId="0"/><xf fontId="1"/></cellXfs></styleSheet>"#;
        assert_eq!(Stylesheet::scan(xml.as_bytes()).unwrap().bold_cell_format, None);

        let xml = r#"<styleSheet><fonts><font/><font><b/></font></fonts>
<cellXfs><xf fontId="0"/><xf fontId="0"/><xf fontId="1"/></cellXfs></styleSheet>"#;
        assert_eq!(Stylesheet::scan(xml.as_bytes()).unwrap().bold_cell_format, Some(2));
    }
}
