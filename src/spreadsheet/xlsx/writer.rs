// ==========================================
// 相机陷阱标注系统 - XLSX 包写入器
// ==========================================
// 职责: 打开或新建包,流式写出工作表,最后整体替换小部件
// 写入顺序:
// 1. 工作表条目: 前向流式写出（内存占用与行数无关）
// 2. 原包中未改动的条目: 原样复制压缩数据,不重新压缩
// 3. 共享字符串 / 样式: 有变化时整体重写
// 4. 清单部件: 事件直通修补后重写
// 全部写入同目录临时文件,成功后替换目标文件
// ==========================================

use crate::config::SpreadsheetConfig;
use crate::domain::CellKind;
use crate::spreadsheet::error::{SpreadsheetError, SpreadsheetResult};
use crate::spreadsheet::progress::ProgressReporter;
use crate::spreadsheet::row::RowSink;
use crate::spreadsheet::xlsx::column_ref::column_name;
use crate::spreadsheet::xlsx::package::{
    self, content_type, relationship_type, PackageManifest, Relationship, SheetEntry, CONTENT_TYPES_PATH,
    RELATIONSHIPS_NAMESPACE, ROOT_RELATIONSHIPS_PATH, SPREADSHEETML_NAMESPACE,
};
use crate::spreadsheet::xlsx::shared_strings::{read_shared_strings, SharedStringTable};
use crate::spreadsheet::xlsx::stylesheet::{Stylesheet, DEFAULT_STYLESHEET_XML};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 表头行高（磅）
const DEFAULT_ROW_HEIGHT: &str = "15";

fn part_options() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// 列宽估算
///
/// width = round(256 × (L×K + P + 9) / K) / 256
/// L 为表头字符数,K 为参考字体平均字符像素宽度,P 为筛选下拉按钮宽度
pub fn column_width(header_length: usize, character_width_px: u32, dropdown_px: u32) -> f64 {
    let k = f64::from(character_width_px.max(1));
    let pixels = header_length as f64 * k + f64::from(dropdown_px) + 9.0;
    (256.0 * pixels / k).round() / 256.0
}

/// 待登记到清单部件的新条目
#[derive(Debug, Default)]
struct ManifestPatches {
    new_package: bool,
    new_sheet: Option<SheetEntry>,
    relationships: Vec<Relationship>,
    content_types: Vec<(String, &'static str)>,
}

pub struct XlsxPackageWriter {
    destination: PathBuf,
    source: Option<ZipArchive<File>>,
    manifest: PackageManifest,
    patches: ManifestPatches,
    zip: ZipWriter<NamedTempFile>,
    shared_strings: SharedStringTable,
    shared_strings_path: String,
    shared_strings_exists: bool,
    stylesheet: Stylesheet,
    styles_path: String,
    worksheet_path: String,
    cell_kinds: Vec<CellKind>,
    column_letters: Vec<String>,
    row_count: usize,
    row_number: usize,
    character_width_px: u32,
    dropdown_px: u32,
}

impl XlsxPackageWriter {
    /// 打开（或新建）目标包并开始写工作表
    ///
    /// # 参数
    /// - destination: 目标 .xlsx 路径;已存在时保留其中其他工作表与部件
    /// - worksheet_name: 写入的工作表名称;不存在时新建并登记
    /// - cell_kinds: 每列的单元格类型
    /// - row_count: 将写出的数据行数（dimension 用）
    pub fn open(
        destination: &Path,
        worksheet_name: &str,
        cell_kinds: Vec<CellKind>,
        row_count: usize,
        config: &SpreadsheetConfig,
        progress: &mut ProgressReporter<'_>,
    ) -> SpreadsheetResult<Self> {
        let directory = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut zip = ZipWriter::new(NamedTempFile::new_in(directory)?);

        let (mut source, mut manifest) = if destination.exists() {
            let mut archive = ZipArchive::new(File::open(destination)?)?;
            let manifest = PackageManifest::read(&mut archive)?;
            (Some(archive), manifest)
        } else {
            (None, PackageManifest::new_package())
        };
        let mut patches = ManifestPatches {
            new_package: source.is_none(),
            ..Default::default()
        };

        // 共享字符串
        let existing = manifest
            .part_path_by_type(relationship_type::SHARED_STRINGS)
            .filter(|path| manifest.has_part(path));
        let (shared_strings, shared_strings_path, shared_strings_exists) = match (existing, source.as_mut()) {
            (Some(path), Some(archive)) => {
                let values = read_shared_strings(BufReader::new(archive.by_name(&path)?), progress)?;
                (SharedStringTable::load_from_flat_list(values), path, true)
            }
            _ => {
                let path = register_part(
                    &mut manifest,
                    &mut patches,
                    relationship_type::SHARED_STRINGS,
                    "sharedStrings.xml",
                    content_type::SHARED_STRINGS,
                );
                (SharedStringTable::new(), path, false)
            }
        };

        // 样式
        let existing = manifest
            .part_path_by_type(relationship_type::STYLES)
            .filter(|path| manifest.has_part(path));
        let (stylesheet, styles_path) = match (existing, source.as_mut()) {
            (Some(path), Some(archive)) => (Stylesheet::scan(BufReader::new(archive.by_name(&path)?))?, path),
            _ => {
                let path = register_part(
                    &mut manifest,
                    &mut patches,
                    relationship_type::STYLES,
                    "styles.xml",
                    content_type::STYLES,
                );
                (Stylesheet::default_stylesheet(), path)
            }
        };

        // 工作表: 已存在则原位覆盖,否则新建并登记
        let worksheet_path = match manifest.worksheet_path(worksheet_name) {
            Some(path) => {
                if !manifest.has_part(&path) {
                    patches.content_types.push((path.clone(), content_type::WORKSHEET));
                }
                path
            }
            None => {
                let path = manifest.next_worksheet_path();
                let relationship = manifest.add_relationship(relationship_type::WORKSHEET, &path);
                let sheet = SheetEntry {
                    name: worksheet_name.to_string(),
                    sheet_id: manifest.next_sheet_id(),
                    relationship_id: relationship.id.clone(),
                };
                manifest.sheets.push(sheet.clone());
                patches.new_sheet = Some(sheet);
                patches.relationships.push(relationship);
                patches.content_types.push((path.clone(), content_type::WORKSHEET));
                path
            }
        };
        debug!(
            worksheet = %worksheet_path,
            new_package = patches.new_package,
            new_sheet = patches.new_sheet.is_some(),
            shared_strings = shared_strings.len(),
            "XLSX 包已打开"
        );

        zip.start_file(worksheet_path.clone(), part_options())?;
        let column_letters = (0..cell_kinds.len()).map(column_name).collect();

        Ok(Self {
            destination: destination.to_path_buf(),
            source,
            manifest,
            patches,
            zip,
            shared_strings,
            shared_strings_path,
            shared_strings_exists,
            stylesheet,
            styles_path,
            worksheet_path,
            cell_kinds,
            column_letters,
            row_count,
            row_number: 0,
            character_width_px: config.character_width_px,
            dropdown_px: config.autofilter_dropdown_px,
        })
    }

    fn cell_reference(&self, column: usize) -> String {
        match self.column_letters.get(column) {
            Some(letters) => format!("{}{}", letters, self.row_number),
            None => format!("{}{}", column_name(column), self.row_number),
        }
    }

    fn last_column(&self) -> String {
        column_name(self.cell_kinds.len().saturating_sub(1))
    }

    /// 工作表开头: dimension、冻结表头、默认行高、列宽
    fn write_preamble(&mut self, names: &[String]) -> SpreadsheetResult<()> {
        let dimension = format!("A1:{}{}", self.last_column(), self.row_count + 1);
        let widths: Vec<String> = names
            .iter()
            .map(|name| column_width(name.chars().count(), self.character_width_px, self.dropdown_px).to_string())
            .collect();

        let mut xml = Writer::new(&mut self.zip);
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        xml.write_event(Event::Start(BytesStart::new("worksheet").with_attributes([
            ("xmlns", SPREADSHEETML_NAMESPACE),
            ("xmlns:r", RELATIONSHIPS_NAMESPACE),
        ])))?;
        xml.write_event(Event::Empty(
            BytesStart::new("dimension").with_attributes([("ref", dimension.as_str())]),
        ))?;

        xml.write_event(Event::Start(BytesStart::new("sheetViews")))?;
        xml.write_event(Event::Start(
            BytesStart::new("sheetView").with_attributes([("workbookViewId", "0")]),
        ))?;
        xml.write_event(Event::Empty(BytesStart::new("pane").with_attributes([
            ("ySplit", "1"),
            ("topLeftCell", "A2"),
            ("activePane", "bottomLeft"),
            ("state", "frozen"),
        ])))?;
        xml.write_event(Event::Empty(BytesStart::new("selection").with_attributes([
            ("pane", "bottomLeft"),
            ("activeCell", "A1"),
            ("sqref", "A1"),
        ])))?;
        xml.write_event(Event::End(BytesEnd::new("sheetView")))?;
        xml.write_event(Event::End(BytesEnd::new("sheetViews")))?;

        xml.write_event(Event::Empty(
            BytesStart::new("sheetFormatPr").with_attributes([("defaultRowHeight", DEFAULT_ROW_HEIGHT)]),
        ))?;

        if !widths.is_empty() {
            xml.write_event(Event::Start(BytesStart::new("cols")))?;
            for (index, width) in widths.iter().enumerate() {
                let position = (index + 1).to_string();
                xml.write_event(Event::Empty(BytesStart::new("col").with_attributes([
                    ("min", position.as_str()),
                    ("max", position.as_str()),
                    ("width", width.as_str()),
                    ("customWidth", "1"),
                ])))?;
            }
            xml.write_event(Event::End(BytesEnd::new("cols")))?;
        }

        xml.write_event(Event::Start(BytesStart::new("sheetData")))?;
        Ok(())
    }

    /// 写一个单元格
    ///
    /// 字符串类经共享字符串表写索引;布尔写 t="b";数字不写类型属性
    fn write_cell(
        &mut self,
        column: usize,
        kind: CellKind,
        value: &str,
        style: Option<usize>,
    ) -> SpreadsheetResult<()> {
        let reference = self.cell_reference(column);
        let (cell_type, cell_value) = match kind {
            CellKind::SharedString => (Some("s"), self.shared_strings.get_or_add(value).to_string()),
            CellKind::Boolean => (Some("b"), value.to_string()),
            CellKind::Number => (None, value.to_string()),
        };

        let mut cell = BytesStart::new("c");
        cell.push_attribute(("r", reference.as_str()));
        let style = style.map(|s| s.to_string());
        if let Some(style) = style.as_deref() {
            cell.push_attribute(("s", style));
        }
        if let Some(cell_type) = cell_type {
            cell.push_attribute(("t", cell_type));
        }

        let mut xml = Writer::new(&mut self.zip);
        xml.write_event(Event::Start(cell))?;
        xml.write_event(Event::Start(BytesStart::new("v")))?;
        xml.write_event(Event::Text(BytesText::new(&cell_value)))?;
        xml.write_event(Event::End(BytesEnd::new("v")))?;
        xml.write_event(Event::End(BytesEnd::new("c")))?;
        Ok(())
    }

    fn start_row(&mut self) -> SpreadsheetResult<()> {
        self.row_number += 1;
        let number = self.row_number.to_string();
        Writer::new(&mut self.zip)
            .write_event(Event::Start(BytesStart::new("row").with_attributes([("r", number.as_str())])))?;
        Ok(())
    }

    fn end_row(&mut self) -> SpreadsheetResult<()> {
        Writer::new(&mut self.zip).write_event(Event::End(BytesEnd::new("row")))?;
        Ok(())
    }

    /// 修补后的清单部件（路径, 内容）
    fn patched_manifest_parts(&mut self) -> SpreadsheetResult<Vec<(String, Vec<u8>)>> {
        let mut parts = Vec::new();
        let new_package = self.patches.new_package;

        if new_package || !self.patches.content_types.is_empty() {
            let mut xml = if new_package {
                package::new_content_types_xml()
            } else {
                self.read_source_part(CONTENT_TYPES_PATH)?
            };
            for (part, part_content_type) in &self.patches.content_types {
                xml = package::add_content_type_override(&xml, part, part_content_type)?;
            }
            parts.push((CONTENT_TYPES_PATH.to_string(), xml));
        }

        if new_package {
            parts.push((ROOT_RELATIONSHIPS_PATH.to_string(), package::new_root_relationships_xml()));
        }

        let workbook_path = self.manifest.workbook_path.clone();
        if let Some(sheet) = self.patches.new_sheet.clone() {
            let xml = if new_package {
                package::new_workbook_xml()
            } else {
                self.read_source_part(&workbook_path)?
            };
            parts.push((workbook_path.clone(), package::add_sheet(&xml, &workbook_path, &sheet)?));
        }

        if !self.patches.relationships.is_empty() {
            let rels_path = self.manifest.workbook_relationships_path();
            let mut xml = if new_package || !self.manifest.has_part(&rels_path) {
                package::new_workbook_relationships_xml()
            } else {
                self.read_source_part(&rels_path)?
            };
            for relationship in &self.patches.relationships {
                xml = package::add_relationship(&xml, &rels_path, relationship)?;
            }
            parts.push((rels_path, xml));
        }

        Ok(parts)
    }

    fn read_source_part(&mut self, path: &str) -> SpreadsheetResult<Vec<u8>> {
        match self.source.as_mut() {
            Some(archive) => package::read_part(archive, path),
            None => Err(SpreadsheetError::malformed(path, "部件不存在")),
        }
    }

    /// 结束工作表并保存整个包
    ///
    /// 成功后目标文件被替换;任何失败都不改动目标文件（临时文件随之删除）
    pub fn finish(mut self, progress: &mut ProgressReporter<'_>) -> SpreadsheetResult<()> {
        {
            let filter = (!self.cell_kinds.is_empty()).then(|| format!("A1:{}1", self.last_column()));
            let mut xml = Writer::new(&mut self.zip);
            xml.write_event(Event::End(BytesEnd::new("sheetData")))?;
            if let Some(filter) = filter {
                xml.write_event(Event::Empty(
                    BytesStart::new("autoFilter").with_attributes([("ref", filter.as_str())]),
                ))?;
            }
            xml.write_event(Event::End(BytesEnd::new("worksheet")))?;
        }
        progress.begin_package_save();

        let manifest_parts = self.patched_manifest_parts()?;
        let write_shared_strings = self.shared_strings.has_changes() || !self.shared_strings_exists;
        let write_styles = self.stylesheet.has_changes;

        let mut replaced: HashSet<&str> = manifest_parts.iter().map(|(path, _)| path.as_str()).collect();
        replaced.insert(self.worksheet_path.as_str());
        if write_shared_strings {
            replaced.insert(self.shared_strings_path.as_str());
        }
        if write_styles {
            replaced.insert(self.styles_path.as_str());
        }

        // 原包中未改动的条目
        let mut copied = 0usize;
        if let Some(archive) = self.source.as_mut() {
            for index in 0..archive.len() {
                let entry = archive.by_index(index)?;
                if replaced.contains(entry.name()) {
                    continue;
                }
                self.zip.raw_copy_file(entry)?;
                copied += 1;
            }
        }
        progress.report_now(2);

        if write_shared_strings {
            self.zip.start_file(self.shared_strings_path.clone(), part_options())?;
            self.shared_strings.write_part(&mut self.zip)?;
            self.shared_strings.accept_changes();
        }
        progress.report_now(3);

        if write_styles {
            self.zip.start_file(self.styles_path.clone(), part_options())?;
            self.zip.write_all(DEFAULT_STYLESHEET_XML.as_bytes())?;
            self.stylesheet.accept_changes();
        }
        progress.report_now(4);

        for (path, content) in &manifest_parts {
            self.zip.start_file(path.clone(), part_options())?;
            self.zip.write_all(content)?;
        }
        progress.report_now(5);

        let temp = self.zip.finish()?;
        // 先释放原包句柄再替换
        drop(self.source.take());
        temp.persist(&self.destination)?;
        progress.end_package_save();

        info!(
            destination = %self.destination.display(),
            rows = self.row_number.saturating_sub(1),
            shared_strings = self.shared_strings.len(),
            copied_parts = copied,
            "XLSX 包已保存"
        );
        Ok(())
    }
}

/// 登记工作簿下的新部件: 缺少关系时新增关系,并补内容类型
fn register_part(
    manifest: &mut PackageManifest,
    patches: &mut ManifestPatches,
    rel_type: &str,
    file_name: &str,
    part_content_type: &'static str,
) -> String {
    let path = match manifest.part_path_by_type(rel_type) {
        Some(path) => path,
        None => {
            let path = manifest.workbook_part_path(file_name);
            let relationship = manifest.add_relationship(rel_type, &path);
            patches.relationships.push(relationship);
            path
        }
    };
    patches.content_types.push((path.clone(), part_content_type));
    manifest.part_names.insert(path.clone());
    path
}

impl RowSink for XlsxPackageWriter {
    fn write_header(&mut self, names: &[String]) -> SpreadsheetResult<()> {
        self.write_preamble(names)?;
        self.start_row()?;
        let style = self.stylesheet.bold_cell_format;
        // 表头始终为共享字符串
        for (column, name) in names.iter().enumerate() {
            self.write_cell(column, CellKind::SharedString, name, style)?;
        }
        self.end_row()
    }

    /// 空值单元格整体省略（稀疏行）
    fn write_row(&mut self, cells: &[Option<String>]) -> SpreadsheetResult<()> {
        self.start_row()?;
        for (column, cell) in cells.iter().enumerate() {
            if let Some(value) = cell {
                let kind = self.cell_kinds.get(column).copied().unwrap_or(CellKind::SharedString);
                self.write_cell(column, kind, value, None)?;
            }
        }
        self.end_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::row::RowSource;
    use crate::spreadsheet::xlsx::reader::XlsxRowReader;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_package(path: &Path, rows: &[Vec<Option<String>>]) {
        let kinds = vec![CellKind::SharedString, CellKind::Number, CellKind::Boolean];
        let mut progress = ProgressReporter::silent();
        let mut writer = XlsxPackageWriter::open(
            path,
            "file data",
            kinds,
            rows.len(),
            &SpreadsheetConfig::default(),
            &mut progress,
        )
        .unwrap();
        writer
            .write_header(&["File".to_string(), "Counter1".to_string(), "Flag".to_string()])
            .unwrap();
        for row in rows {
            writer.write_row(row).unwrap();
        }
        writer.finish(&mut progress).unwrap();
    }

    fn read_part_text(path: &Path, part: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut text = String::new();
        archive.by_name(part).unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_column_width() {
        // "File": (4*7 + 15 + 9) / 7 = 7.428..
        let width = column_width(4, 7, 15);
        assert!((width - 1902.0 / 256.0).abs() < 1e-9);
        assert!(column_width(10, 7, 15) > width);
    }

    #[test]
    fn test_new_package_sparse_rows_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("export.xlsx");
        write_package(
            &path,
            &[
                vec![Some("IMG_1.JPG".to_string()), Some("3".to_string()), Some("1".to_string())],
                vec![Some("IMG_2.JPG".to_string()), None, Some("0".to_string())],
            ],
        );

        let sheet = read_part_text(&path, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<dimension ref=\"A1:C3\"/>"));
        assert!(sheet.contains("state=\"frozen\""));
        assert!(sheet.contains("<autoFilter ref=\"A1:C1\"/>"));
        assert!(sheet.contains("<c r=\"A1\" s=\"1\" t=\"s\">"));
        assert!(sheet.contains("<c r=\"B2\"><v>3</v></c>"));
        assert!(sheet.contains("<c r=\"C2\" t=\"b\"><v>1</v></c>"));
        // 空值单元格省略
        assert!(!sheet.contains("r=\"B3\""));

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut progress = ProgressReporter::silent();
        let mut reader = XlsxRowReader::open(&mut archive, "file data", &mut progress).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().unwrap() {
            rows.push(row.as_slice().to_vec());
        }
        assert_eq!(
            rows,
            vec![
                vec!["File", "Counter1", "Flag"],
                vec!["IMG_1.JPG", "3", "1"],
                vec!["IMG_2.JPG", "", "0"],
            ]
        );
    }

    #[test]
    fn test_rewrite_keeps_single_sheet_and_shared_string_indices() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("export.xlsx");
        let row = vec![Some("IMG_1.JPG".to_string()), Some("1".to_string()), None];
        write_package(&path, &[row.clone()]);
        let first_strings = read_part_text(&path, "xl/sharedStrings.xml");

        write_package(&path, &[row]);
        let workbook = read_part_text(&path, "xl/workbook.xml");
        assert_eq!(workbook.matches("<sheet ").count(), 1);
        assert_eq!(read_part_text(&path, "xl/sharedStrings.xml"), first_strings);
        assert!(!temp_dir
            .path()
            .read_dir()
            .unwrap()
            .any(|entry| entry.unwrap().file_name() != "export.xlsx"));
    }
}
