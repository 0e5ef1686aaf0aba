// ==========================================
// 相机陷阱标注系统 - XLSX 包清单
// ==========================================
// 职责: 解析与修补 OPC 清单部件
// - _rels/.rels          -> 定位工作簿
// - xl/workbook.xml      -> 工作表名称与关系 ID
// - xl/_rels/*.rels      -> 关系 ID -> 部件路径
// - [Content_Types].xml  -> 部件内容类型
// 修补采用事件直通: 原样复制全部事件,仅在父元素结束前插入新子元素
// ==========================================

use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use std::io::{Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

// ==========================================
// 命名空间与类型常量
// ==========================================
pub const SPREADSHEETML_NAMESPACE: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
pub const ROOT_RELATIONSHIPS_PATH: &str = "_rels/.rels";
const DEFAULT_WORKBOOK_PATH: &str = "xl/workbook.xml";

/// 关系类型（按后缀匹配,兼容 Strict 命名空间）
pub mod relationship_type {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const WORKSHEET: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub const STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
}

/// 部件内容类型
pub mod content_type {
    pub const WORKBOOK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub const WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub const STYLES: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
}

// ==========================================
// 清单条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub relationship_id: String,
}

/// 工作簿清单
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub workbook_path: String,
    pub sheets: Vec<SheetEntry>,
    pub workbook_relationships: Vec<Relationship>,
    /// 包内全部部件名称
    pub part_names: HashSet<String>,
}

impl PackageManifest {
    /// 从已有包读取清单
    pub fn read<R: Read + Seek>(archive: &mut ZipArchive<R>) -> SpreadsheetResult<Self> {
        let part_names: HashSet<String> = archive.file_names().map(str::to_string).collect();

        let workbook_path = if part_names.contains(ROOT_RELATIONSHIPS_PATH) {
            let root_relationships = parse_relationships(&read_part(archive, ROOT_RELATIONSHIPS_PATH)?)?;
            root_relationships
                .iter()
                .find(|r| is_relationship_type(&r.rel_type, relationship_type::OFFICE_DOCUMENT))
                .map(|r| resolve_target("", &r.target))
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PATH.to_string())
        } else {
            DEFAULT_WORKBOOK_PATH.to_string()
        };
        if !part_names.contains(&workbook_path) {
            return Err(SpreadsheetError::malformed(&workbook_path, "工作簿部件不存在"));
        }

        let sheets = parse_sheets(&read_part(archive, &workbook_path)?)?;
        let rels_path = relationships_path_for(&workbook_path);
        let workbook_relationships = if part_names.contains(&rels_path) {
            parse_relationships(&read_part(archive, &rels_path)?)?
        } else {
            Vec::new()
        };

        Ok(Self {
            workbook_path,
            sheets,
            workbook_relationships,
            part_names,
        })
    }

    /// 新建空包的清单
    pub fn new_package() -> Self {
        Self {
            workbook_path: DEFAULT_WORKBOOK_PATH.to_string(),
            sheets: Vec::new(),
            workbook_relationships: Vec::new(),
            part_names: HashSet::new(),
        }
    }

    pub fn workbook_relationships_path(&self) -> String {
        relationships_path_for(&self.workbook_path)
    }

    /// 按名称查找工作表部件路径
    pub fn worksheet_path(&self, name: &str) -> Option<String> {
        let sheet = self.sheets.iter().find(|sheet| sheet.name == name)?;
        self.workbook_relationships
            .iter()
            .find(|r| r.id == sheet.relationship_id)
            .map(|r| resolve_target(&self.workbook_path, &r.target))
    }

    /// 按关系类型查找工作簿下的部件（共享字符串 / 样式）
    pub fn part_path_by_type(&self, rel_type: &str) -> Option<String> {
        self.workbook_relationships
            .iter()
            .find(|r| is_relationship_type(&r.rel_type, rel_type))
            .map(|r| resolve_target(&self.workbook_path, &r.target))
    }

    pub fn has_part(&self, path: &str) -> bool {
        self.part_names.contains(path)
    }

    pub fn next_sheet_id(&self) -> u32 {
        self.sheets.iter().map(|sheet| sheet.sheet_id).max().unwrap_or(0) + 1
    }

    /// 未使用的关系 ID（rIdN）
    pub fn next_relationship_id(&self) -> String {
        (1..)
            .map(|n| format!("rId{}", n))
            .find(|id| !self.workbook_relationships.iter().any(|r| &r.id == id))
            .unwrap_or_else(|| "rId1".to_string())
    }

    /// 未使用的工作表部件路径（worksheets/sheetN.xml）
    pub fn next_worksheet_path(&self) -> String {
        let directory = part_directory(&self.workbook_path);
        (1..)
            .map(|n| join_part(directory, &format!("worksheets/sheet{}.xml", n)))
            .find(|path| !self.has_part(path))
            .unwrap_or_else(|| join_part(directory, "worksheets/sheet1.xml"))
    }

    /// 与工作簿同目录的部件路径
    pub fn workbook_part_path(&self, file_name: &str) -> String {
        join_part(part_directory(&self.workbook_path), file_name)
    }

    /// 部件相对工作簿的关系目标
    pub fn relative_target(&self, part_path: &str) -> String {
        let directory = part_directory(&self.workbook_path);
        if directory.is_empty() {
            return part_path.to_string();
        }
        match part_path.strip_prefix(directory).and_then(|rest| rest.strip_prefix('/')) {
            Some(relative) => relative.to_string(),
            None => format!("/{}", part_path),
        }
    }

    /// 登记新关系（由调用方写入关系部件）
    pub fn add_relationship(&mut self, rel_type: &str, part_path: &str) -> Relationship {
        let relationship = Relationship {
            id: self.next_relationship_id(),
            rel_type: rel_type.to_string(),
            target: self.relative_target(part_path),
        };
        self.workbook_relationships.push(relationship.clone());
        relationship
    }
}

fn is_relationship_type(actual: &str, expected: &str) -> bool {
    let suffix = expected.rsplit('/').next().unwrap_or(expected);
    actual == expected || actual.rsplit('/').next() == Some(suffix)
}

// ==========================================
// 部件读取与路径
// ==========================================

/// 读取整个部件
pub fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> SpreadsheetResult<Vec<u8>> {
    let mut entry = match archive.by_name(path) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(SpreadsheetError::malformed(path, "部件不存在"));
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn part_directory(part_path: &str) -> &str {
    match part_path.rfind('/') {
        Some(index) => &part_path[..index],
        None => "",
    }
}

fn join_part(directory: &str, relative: &str) -> String {
    if directory.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", directory, relative)
    }
}

/// 部件对应的关系部件路径: xl/workbook.xml -> xl/_rels/workbook.xml.rels
pub fn relationships_path_for(part_path: &str) -> String {
    let directory = part_directory(part_path);
    let file_name = match part_path.rfind('/') {
        Some(index) => &part_path[index + 1..],
        None => part_path,
    };
    join_part(directory, &format!("_rels/{}.rels", file_name))
}

/// 解析关系目标为包内路径
///
/// 以 '/' 开头为包根绝对路径;否则相对于源部件所在目录,并折叠 "." 与 ".."
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => join_part(part_directory(source_part), target),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

// ==========================================
// 清单解析
// ==========================================

fn attribute_value(reader: &Reader<&[u8]>, e: &BytesStart<'_>, name: &str) -> SpreadsheetResult<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.decode_and_unescape_value(reader)?.into_owned())),
        None => Ok(None),
    }
}

/// 解析 .rels 部件
pub fn parse_relationships(xml: &[u8]) -> SpreadsheetResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut relationships = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attribute_value(&reader, &e, "TargetMode")?.as_deref() == Some("External") {
                    continue;
                }
                let id = attribute_value(&reader, &e, "Id")?;
                let rel_type = attribute_value(&reader, &e, "Type")?;
                let target = attribute_value(&reader, &e, "Target")?;
                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    relationships.push(Relationship { id, rel_type, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(relationships)
}

/// 解析 workbook.xml 中的工作表列表
pub fn parse_sheets(xml: &[u8]) -> SpreadsheetResult<Vec<SheetEntry>> {
    let mut reader = Reader::from_reader(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute_value(&reader, &e, "name")?.unwrap_or_default();
                let sheet_id = attribute_value(&reader, &e, "sheetId")?
                    .and_then(|value| value.parse::<u32>().ok())
                    .unwrap_or(0);
                // r:id: 任意前缀、本地名为 id 的属性
                let mut relationship_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        relationship_id = Some(attr.decode_and_unescape_value(&reader)?.into_owned());
                    }
                }
                if let Some(relationship_id) = relationship_id {
                    sheets.push(SheetEntry {
                        name,
                        sheet_id,
                        relationship_id,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

// ==========================================
// 清单修补（事件直通）
// ==========================================

/// 在父元素末尾插入一个空子元素
///
/// 子元素沿用父元素的命名空间前缀;空父元素 <x/> 展开为 <x>..</x>
pub fn insert_child_element(
    xml: &[u8],
    part: &str,
    parent: &str,
    child: &str,
    attributes: &[(&str, &str)],
) -> SpreadsheetResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut inserted = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(e) if !inserted && e.local_name().as_ref() == parent.as_bytes() => {
                let child_name = prefixed_name(&e, child);
                writer.write_event(Event::Start(e))?;
                // 等待对应的结束标签
                loop {
                    match reader.read_event()? {
                        Event::End(end) if end.local_name().as_ref() == parent.as_bytes() => {
                            writer.write_event(Event::Empty(
                                BytesStart::new(child_name.as_str()).with_attributes(attributes.iter().copied()),
                            ))?;
                            writer.write_event(Event::End(end))?;
                            break;
                        }
                        Event::Eof => {
                            return Err(SpreadsheetError::malformed(part, format!("元素 {} 未闭合", parent)));
                        }
                        other => writer.write_event(other)?,
                    }
                }
                inserted = true;
            }
            Event::Empty(e) if !inserted && e.local_name().as_ref() == parent.as_bytes() => {
                let child_name = prefixed_name(&e, child);
                let parent_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Empty(
                    BytesStart::new(child_name.as_str()).with_attributes(attributes.iter().copied()),
                ))?;
                writer.write_event(Event::End(BytesEnd::new(parent_name)))?;
                inserted = true;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if !inserted {
        return Err(SpreadsheetError::malformed(part, format!("缺少元素 {}", parent)));
    }
    Ok(writer.into_inner())
}

fn prefixed_name(parent: &BytesStart<'_>, child: &str) -> String {
    match parent.name().prefix() {
        Some(prefix) => format!("{}:{}", String::from_utf8_lossy(prefix.as_ref()), child),
        None => child.to_string(),
    }
}

/// 根元素是否声明了指定的命名空间前缀
pub fn root_declares_prefix(xml: &[u8], prefix: &str) -> SpreadsheetResult<bool> {
    let declaration = format!("xmlns:{}", prefix);
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(e.try_get_attribute(declaration.as_str())?.is_some());
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
    }
}

/// 向 workbook.xml 登记工作表
pub fn add_sheet(workbook_xml: &[u8], workbook_path: &str, sheet: &SheetEntry) -> SpreadsheetResult<Vec<u8>> {
    let sheet_id = sheet.sheet_id.to_string();
    let mut attributes = vec![
        ("name", sheet.name.as_str()),
        ("sheetId", sheet_id.as_str()),
        ("r:id", sheet.relationship_id.as_str()),
    ];
    if !root_declares_prefix(workbook_xml, "r")? {
        attributes.push(("xmlns:r", RELATIONSHIPS_NAMESPACE));
    }
    insert_child_element(workbook_xml, workbook_path, "sheets", "sheet", &attributes)
}

/// 向 .rels 部件登记关系
pub fn add_relationship(rels_xml: &[u8], rels_path: &str, relationship: &Relationship) -> SpreadsheetResult<Vec<u8>> {
    insert_child_element(
        rels_xml,
        rels_path,
        "Relationships",
        "Relationship",
        &[
            ("Id", relationship.id.as_str()),
            ("Type", relationship.rel_type.as_str()),
            ("Target", relationship.target.as_str()),
        ],
    )
}

/// 向 [Content_Types].xml 登记部件内容类型
pub fn add_content_type_override(
    content_types_xml: &[u8],
    part_path: &str,
    part_content_type: &str,
) -> SpreadsheetResult<Vec<u8>> {
    let part_name = format!("/{}", part_path);
    insert_child_element(
        content_types_xml,
        CONTENT_TYPES_PATH,
        "Types",
        "Override",
        &[("PartName", part_name.as_str()), ("ContentType", part_content_type)],
    )
}

// ==========================================
// 新建包的清单模板
// ==========================================

pub fn new_content_types_xml() -> Vec<u8> {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Types xmlns="{ns}">"#,
            r#"<Default Extension="rels" ContentType="{rels}"/>"#,
            r#"<Default Extension="xml" ContentType="{xml}"/>"#,
            r#"<Override PartName="/{workbook}" ContentType="{workbook_type}"/>"#,
            r#"</Types>"#
        ),
        ns = CONTENT_TYPES_NAMESPACE,
        rels = content_type::RELATIONSHIPS,
        xml = content_type::XML,
        workbook = DEFAULT_WORKBOOK_PATH,
        workbook_type = content_type::WORKBOOK,
    )
    .into_bytes()
}

pub fn new_root_relationships_xml() -> Vec<u8> {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="{ns}">"#,
            r#"<Relationship Id="rId1" Type="{office_document}" Target="{workbook}"/>"#,
            r#"</Relationships>"#
        ),
        ns = PACKAGE_RELATIONSHIPS_NAMESPACE,
        office_document = relationship_type::OFFICE_DOCUMENT,
        workbook = DEFAULT_WORKBOOK_PATH,
    )
    .into_bytes()
}

pub fn new_workbook_xml() -> Vec<u8> {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="{ns}" xmlns:r="{r}">"#,
            r#"<bookViews><workbookView/></bookViews>"#,
            r#"<sheets/>"#,
            r#"</workbook>"#
        ),
        ns = SPREADSHEETML_NAMESPACE,
        r = RELATIONSHIPS_NAMESPACE,
    )
    .into_bytes()
}

pub fn new_workbook_relationships_xml() -> Vec<u8> {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="{ns}"/>"#
        ),
        ns = PACKAGE_RELATIONSHIPS_NAMESPACE,
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/sharedStrings.xml"), "xl/sharedStrings.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "../docProps/app.xml"), "docProps/app.xml");
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_relationships_path_for() {
        assert_eq!(relationships_path_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(relationships_path_for("book.xml"), "_rels/book.xml.rels");
    }

    #[test]
    fn test_add_sheet_expands_empty_sheets_element() {
        let sheet = SheetEntry {
            name: "file data".to_string(),
            sheet_id: 1,
            relationship_id: "rId1".to_string(),
        };
        let patched = add_sheet(&new_workbook_xml(), "xl/workbook.xml", &sheet).unwrap();
        let sheets = parse_sheets(&patched).unwrap();
        assert_eq!(sheets, vec![sheet]);

        let text = String::from_utf8(patched).unwrap();
        assert!(text.contains("<sheets><sheet name=\"file data\" sheetId=\"1\" r:id=\"rId1\"/></sheets>"));
        // 根元素已声明 r 前缀,子元素不重复声明
        assert!(!text.contains("<sheet name=\"file data\" sheetId=\"1\" r:id=\"rId1\" xmlns:r"));
    }

    #[test]
    fn test_add_sheet_keeps_existing_sheets() {
        let xml = br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Other" sheetId="3" r:id="rId7"/></sheets><calcPr calcId="0"/></workbook>"#;
        let sheet = SheetEntry {
            name: "file data".to_string(),
            sheet_id: 4,
            relationship_id: "rId8".to_string(),
        };
        let patched = add_sheet(xml, "xl/workbook.xml", &sheet).unwrap();
        let sheets = parse_sheets(&patched).unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].name, "Other");
        assert_eq!(sheets[1], sheet);
        assert!(String::from_utf8(patched).unwrap().ends_with("<calcPr calcId=\"0\"/></workbook>"));
    }

    #[test]
    fn test_add_relationship_and_content_type() {
        let relationship = Relationship {
            id: "rId1".to_string(),
            rel_type: relationship_type::WORKSHEET.to_string(),
            target: "worksheets/sheet1.xml".to_string(),
        };
        let patched = add_relationship(&new_workbook_relationships_xml(), "xl/_rels/workbook.xml.rels", &relationship)
            .unwrap();
        assert_eq!(parse_relationships(&patched).unwrap(), vec![relationship]);

        let types = add_content_type_override(&new_content_types_xml(), "xl/worksheets/sheet1.xml", content_type::WORKSHEET)
            .unwrap();
        let text = String::from_utf8(types).unwrap();
        assert!(text.contains("PartName=\"/xl/worksheets/sheet1.xml\""));
        assert!(text.contains("PartName=\"/xl/workbook.xml\""));
    }

    #[test]
    fn test_missing_parent_is_malformed() {
        let result = insert_child_element(b"<workbook/>", "xl/workbook.xml", "sheets", "sheet", &[]);
        assert!(matches!(result, Err(SpreadsheetError::MalformedPackage { .. })));
    }

    #[test]
    fn test_manifest_allocates_unused_names() {
        let mut manifest = PackageManifest::new_package();
        manifest.part_names.insert("xl/worksheets/sheet1.xml".to_string());
        manifest.workbook_relationships.push(Relationship {
            id: "rId1".to_string(),
            rel_type: relationship_type::WORKSHEET.to_string(),
            target: "worksheets/sheet1.xml".to_string(),
        });
        manifest.sheets.push(SheetEntry {
            name: "Sheet1".to_string(),
            sheet_id: 5,
            relationship_id: "rId1".to_string(),
        });

        assert_eq!(manifest.next_sheet_id(), 6);
        assert_eq!(manifest.next_relationship_id(), "rId2");
        assert_eq!(manifest.next_worksheet_path(), "xl/worksheets/sheet2.xml");
        assert_eq!(manifest.worksheet_path("Sheet1").as_deref(), Some("xl/worksheets/sheet1.xml"));
        assert_eq!(manifest.relative_target("xl/sharedStrings.xml"), "sharedStrings.xml");
    }
}
