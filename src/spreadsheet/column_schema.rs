// ==========================================
// 相机陷阱标注系统 - 电子表格列结构
// ==========================================
// 每次导入/导出调用时由控件定义重新构建,调用结束即丢弃
// 列顺序 = 电子表格顺序;计数器后紧跟其标记点位置列
// 列的身份按名称匹配,与位置无关
// ==========================================

use crate::domain::control::{file_column, ControlDefinition};
use crate::domain::file_record::FieldValue;
use crate::domain::types::{CellKind, ColumnType};
use crate::i18n::t_with_args;
use std::collections::{HashMap, HashSet};

/// 一列
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaColumn {
    pub name: String,
    pub column_type: ColumnType,
    /// 计数器附带的标记点位置列
    pub is_marker_column: bool,
    /// 新建记录时的默认值
    pub default_value: FieldValue,
}

/// 表头中四个必需列的位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    pub file_name: Option<usize>,
    pub relative_path: Option<usize>,
    pub date_time: Option<usize>,
    pub utc_offset: Option<usize>,
}

impl HeaderIndex {
    /// 缺失的必需列名
    pub fn missing_columns(&self) -> Vec<&'static str> {
        [
            (file_column::FILE, self.file_name),
            (file_column::RELATIVE_PATH, self.relative_path),
            (file_column::DATE_TIME, self.date_time),
            (file_column::UTC_OFFSET, self.utc_offset),
        ]
        .into_iter()
        .filter(|(_, position)| position.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    columns: Vec<SchemaColumn>,
    positions: HashMap<String, usize>,
}

impl ColumnSchema {
    /// 由控件定义构建
    pub fn build(controls: &[ControlDefinition]) -> Self {
        let mut ordered: Vec<&ControlDefinition> = controls.iter().collect();
        ordered.sort_by_key(|control| (control.spreadsheet_order, control.control_order));

        let mut columns = Vec::with_capacity(controls.len() + 4);
        for control in ordered {
            let column_type = control.control_type.column_type(&control.choices);
            let default_value = column_type.default_value(&control.default_value);
            columns.push(SchemaColumn {
                name: control.data_label.clone(),
                column_type,
                is_marker_column: false,
                default_value,
            });
            if let Some(marker_column) = control.marker_column_name() {
                columns.push(SchemaColumn {
                    name: marker_column,
                    column_type: ColumnType::MarkerPositions,
                    is_marker_column: true,
                    default_value: FieldValue::Null,
                });
            }
        }

        let positions = columns
            .iter()
            .enumerate()
            .map(|(position, column)| (column.name.clone(), position))
            .collect();
        Self { columns, positions }
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn cell_kinds(&self) -> Vec<CellKind> {
        self.columns.iter().map(|column| column.column_type.cell_kind()).collect()
    }

    /// 新记录的默认值（身份列除外,由身份本身给出）
    pub fn defaults(&self) -> Vec<(String, FieldValue)> {
        self.columns
            .iter()
            .filter(|column| column.name != file_column::FILE && column.name != file_column::RELATIVE_PATH)
            .map(|column| (column.name.clone(), column.default_value.clone()))
            .collect()
    }

    /// 按名称精确匹配定位四个必需列
    pub fn index_header(header: &[String]) -> HeaderIndex {
        let find = |name: &str| header.iter().position(|column| column == name);
        HeaderIndex {
            file_name: find(file_column::FILE),
            relative_path: find(file_column::RELATIVE_PATH),
            date_time: find(file_column::DATE_TIME),
            utc_offset: find(file_column::UTC_OFFSET),
        }
    }

    /// 校验表头
    ///
    /// 双向差集: 每个只在一侧出现的列名各产生一条错误;重复列名也是错误
    ///
    /// # 返回
    /// - 空列表: 表头与列结构一致（不要求顺序相同）
    pub fn validate(&self, header: &[String]) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = HashSet::with_capacity(header.len());
        for name in header {
            if !seen.insert(name.as_str()) {
                errors.push(t_with_args("header.duplicate_column", &[("column", name.as_str())]));
            }
        }

        for column in &self.columns {
            if !seen.contains(column.name.as_str()) {
                errors.push(t_with_args("header.missing_column", &[("column", column.name.as_str())]));
            }
        }

        let mut reported = HashSet::new();
        for name in header {
            if !self.positions.contains_key(name) && reported.insert(name.as_str()) {
                errors.push(t_with_args("header.unexpected_column", &[("column", name.as_str())]));
            }
        }
        errors
    }
}
