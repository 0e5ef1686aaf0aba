// ==========================================
// 相机陷阱标注系统 - 共享字符串表
// ==========================================
// 写: 值 -> 索引的去重表,只追加,索引永不重排
// 读: 索引 -> 值的扁平列表
// 新增值时置脏标志,持久化后由调用方清除
// ==========================================

use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::progress::ProgressReporter;
use crate::spreadsheet::xlsx::package::SPREADSHEETML_NAMESPACE;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::{BufRead, Write};

#[derive(Debug, Default)]
pub struct SharedStringTable {
    values: Vec<String>,
    index: HashMap<String, usize>,
    has_changes: bool,
}

impl SharedStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已有包的扁平列表构建
    ///
    /// 位置即索引;重复值保留首次出现的索引,列表本身原样保留
    pub fn load_from_flat_list(values: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(values.len());
        for (position, value) in values.iter().enumerate() {
            index.entry(value.clone()).or_insert(position);
        }
        Self {
            values,
            index,
            has_changes: false,
        }
    }

    /// 取已有索引或追加新值
    pub fn get_or_add(&mut self, value: &str) -> usize {
        if let Some(&position) = self.index.get(value) {
            return position;
        }
        let position = self.values.len();
        self.values.push(value.to_string());
        self.index.insert(value.to_string(), position);
        self.has_changes = true;
        position
    }

    pub fn to_flat_list(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// 调用方已持久化后清除脏标志
    pub fn accept_changes(&mut self) {
        self.has_changes = false;
    }

    /// 整体写出 sharedStrings.xml
    pub fn write_part<W: Write>(&self, writer: W) -> SpreadsheetResult<()> {
        let mut xml = Writer::new(writer);
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let count = self.values.len().to_string();
        let sst = BytesStart::new("sst").with_attributes([
            ("xmlns", SPREADSHEETML_NAMESPACE),
            ("count", count.as_str()),
            ("uniqueCount", count.as_str()),
        ]);
        xml.write_event(Event::Start(sst))?;
        for value in &self.values {
            xml.write_event(Event::Start(BytesStart::new("si")))?;
            let mut text = BytesStart::new("t");
            if needs_space_preserve(value) {
                text.push_attribute(("xml:space", "preserve"));
            }
            xml.write_event(Event::Start(text))?;
            xml.write_event(Event::Text(BytesText::new(value)))?;
            xml.write_event(Event::End(BytesEnd::new("t")))?;
            xml.write_event(Event::End(BytesEnd::new("si")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("sst")))?;
        Ok(())
    }
}

fn needs_space_preserve(value: &str) -> bool {
    value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace)
}

/// 读取 sharedStrings.xml 为扁平列表
///
/// 每个 <si> 的值为其全部 <t> 文本的拼接（富文本 <r> 逐段拼接,注音 <rPh> 忽略）
pub fn read_shared_strings<R: BufRead>(
    source: R,
    progress: &mut ProgressReporter<'_>,
) -> SpreadsheetResult<Vec<String>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sst" => {
                    let count = e
                        .try_get_attribute("count")?
                        .and_then(|attr| attr.decode_and_unescape_value(&reader).ok())
                        .and_then(|value| value.parse::<u64>().ok())
                        .unwrap_or(0);
                    progress.begin_shared_string_load(count);
                    values.reserve(count as usize);
                }
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"rPh" => phonetic_depth += 1,
                b"t" if in_item && phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"si" {
                    values.push(String::new());
                }
            }
            Event::Text(e) if in_text => current.push_str(&e.unescape()?),
            Event::CData(e) if in_text => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"si" => {
                    in_item = false;
                    values.push(std::mem::take(&mut current));
                    progress.report(values.len() as u64);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if in_item {
        return Err(SpreadsheetError::malformed("sharedStrings", "共享字符串未闭合"));
    }
    Ok(values)
}
