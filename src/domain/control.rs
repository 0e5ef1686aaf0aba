// ==========================================
// 相机陷阱标注系统 - 控件定义
// ==========================================
// 控件 = 文件数据库中的一个数据字段
// 标准控件六个,其余为模板中的用户控件
// ==========================================

use crate::domain::types::{ColumnType, ControlType};
use serde::{Deserialize, Serialize};

// ==========================================
// 标准列名
// ==========================================
pub mod file_column {
    pub const FILE: &str = "File";
    pub const RELATIVE_PATH: &str = "RelativePath";
    pub const DATE_TIME: &str = "DateTime";
    pub const UTC_OFFSET: &str = "UtcOffset";
    pub const CLASSIFICATION: &str = "Classification";
    pub const DELETE_FLAG: &str = "DeleteFlag";

    /// 计数器标记点位置列后缀（列名 = 计数器标签 + 后缀）
    pub const MARKER_POSITION_SUFFIX: &str = "_MarkerPositions";

    /// 电子表格中必须出现的列
    pub const MANDATORY: [&str; 4] = [FILE, RELATIVE_PATH, DATE_TIME, UTC_OFFSET];
}

/// 控件定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDefinition {
    pub data_label: String,
    pub control_type: ControlType,
    pub control_order: i64,
    pub spreadsheet_order: i64,
    pub default_value: String,
    pub choices: Vec<String>,
}

impl ControlDefinition {
    /// 创建控件定义
    ///
    /// 控件顺序与电子表格顺序初始相同
    pub fn new(data_label: &str, control_type: ControlType, order: i64) -> Self {
        Self {
            data_label: data_label.to_string(),
            control_type,
            control_order: order,
            spreadsheet_order: order,
            default_value: String::new(),
            choices: Vec::new(),
        }
    }

    pub fn with_default(mut self, default_value: &str) -> Self {
        self.default_value = default_value.to_string();
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|choice| choice.to_string()).collect();
        self
    }

    pub fn with_spreadsheet_order(mut self, spreadsheet_order: i64) -> Self {
        self.spreadsheet_order = spreadsheet_order;
        self
    }

    /// 标准控件集合（新文件数据库模板的前六个控件）
    pub fn standard_controls() -> Vec<ControlDefinition> {
        vec![
            ControlDefinition::new(file_column::FILE, ControlType::File, 1),
            ControlDefinition::new(file_column::RELATIVE_PATH, ControlType::RelativePath, 2),
            ControlDefinition::new(file_column::DATE_TIME, ControlType::DateTime, 3),
            ControlDefinition::new(file_column::UTC_OFFSET, ControlType::UtcOffset, 4),
            ControlDefinition::new(file_column::CLASSIFICATION, ControlType::Classification, 5)
                .with_default("Color"),
            ControlDefinition::new(file_column::DELETE_FLAG, ControlType::DeleteFlag, 6)
                .with_default("0"),
        ]
    }

    pub fn is_counter(&self) -> bool {
        self.control_type == ControlType::Counter
    }

    /// 标记点位置列名（仅计数器）
    pub fn marker_column_name(&self) -> Option<String> {
        if self.is_counter() {
            Some(format!("{}{}", self.data_label, file_column::MARKER_POSITION_SUFFIX))
        } else {
            None
        }
    }

    /// 该控件在文件表中占用的列
    ///
    /// 计数器占两列: 计数值 + 紧随其后的标记点位置
    pub fn columns(&self) -> Vec<(String, ColumnType)> {
        let mut columns = vec![(
            self.data_label.clone(),
            self.control_type.column_type(&self.choices),
        )];
        if let Some(marker_column) = self.marker_column_name() {
            columns.push((marker_column, ColumnType::MarkerPositions));
        }
        columns
    }
}

/// 按电子表格顺序展开全部控件的列
pub fn columns_in_spreadsheet_order(controls: &[ControlDefinition]) -> Vec<(String, ColumnType)> {
    let mut ordered: Vec<&ControlDefinition> = controls.iter().collect();
    ordered.sort_by_key(|control| (control.spreadsheet_order, control.control_order));
    ordered.iter().flat_map(|control| control.columns()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_expands_to_marker_column() {
        let counter = ControlDefinition::new("Deer", ControlType::Counter, 7);
        let columns = counter.columns();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0], ("Deer".to_string(), ColumnType::Counter));
        assert_eq!(
            columns[1],
            ("Deer_MarkerPositions".to_string(), ColumnType::MarkerPositions)
        );
    }

    #[test]
    fn test_spreadsheet_order_wins_over_control_order() {
        let mut controls = ControlDefinition::standard_controls();
        controls.push(ControlDefinition::new("Note1", ControlType::Note, 7).with_spreadsheet_order(0));

        let names: Vec<String> = columns_in_spreadsheet_order(&controls)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names[0], "Note1");
        assert_eq!(names[1], file_column::FILE);
        assert_eq!(names.len(), 7);
    }
}
