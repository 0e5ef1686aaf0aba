// ==========================================
// 相机陷阱标注系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: 文件数据库的 config_kv 表 (key-value + scope)
// ==========================================

use crate::config::spreadsheet_config::{
    SpreadsheetConfigReader, DEFAULT_AUTOFILTER_DROPDOWN_PX, DEFAULT_CHARACTER_WIDTH_PX,
    DEFAULT_PROGRESS_INTERVAL_MS,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::parse_flag;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 全局作用域
const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 文件数据库路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::initialize_fixed_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        tracing::debug!(config_key = key, value, "配置已写入");
        Ok(())
    }

    /// 读取并解析配置值;缺失时返回默认值,格式错误时报错并指明配置键
    fn get_parsed_or_default<T: FromStr>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| format!("配置值格式错误: {}={}", key, raw).into()),
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 返回
    /// - Ok(String): 配置快照的JSON字符串（键有序）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key"
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// SpreadsheetConfigReader Trait 实现
// ==========================================
impl SpreadsheetConfigReader for ConfigManager {
    fn get_progress_interval(&self) -> Result<Duration, Box<dyn Error>> {
        let ms = self.get_parsed_or_default(config_keys::PROGRESS_INTERVAL_MS, DEFAULT_PROGRESS_INTERVAL_MS)?;
        Ok(Duration::from_millis(ms))
    }

    fn get_csv_write_bom(&self) -> Result<bool, Box<dyn Error>> {
        match self.get_config_value(config_keys::CSV_WRITE_BOM)? {
            None => Ok(true),
            Some(raw) => parse_flag(raw.trim())
                .ok_or_else(|| format!("配置值格式错误: {}={}", config_keys::CSV_WRITE_BOM, raw).into()),
        }
    }

    fn get_character_width_px(&self) -> Result<u32, Box<dyn Error>> {
        let px = self.get_parsed_or_default(config_keys::CHARACTER_WIDTH_PX, DEFAULT_CHARACTER_WIDTH_PX)?;
        if px == 0 {
            return Err(format!("配置值格式错误: {}=0", config_keys::CHARACTER_WIDTH_PX).into());
        }
        Ok(px)
    }

    fn get_autofilter_dropdown_px(&self) -> Result<u32, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::AUTOFILTER_DROPDOWN_PX, DEFAULT_AUTOFILTER_DROPDOWN_PX)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 进度
    pub const PROGRESS_INTERVAL_MS: &str = "spreadsheet_progress_interval_ms";

    // CSV
    pub const CSV_WRITE_BOM: &str = "spreadsheet_csv_write_bom";

    // XLSX 列宽估算
    pub const CHARACTER_WIDTH_PX: &str = "spreadsheet_character_width_px";
    pub const AUTOFILTER_DROPDOWN_PX: &str = "spreadsheet_autofilter_dropdown_px";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spreadsheet_config::SpreadsheetConfig;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(file.path().to_str().unwrap()).unwrap();
        (file, manager)
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let (_file, manager) = manager();
        assert_eq!(manager.load_spreadsheet_config().unwrap(), SpreadsheetConfig::default());
    }

    #[test]
    fn test_stored_values_override_defaults() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::PROGRESS_INTERVAL_MS, "1000").unwrap();
        manager.set_global_config_value(config_keys::CSV_WRITE_BOM, "false").unwrap();

        let config = manager.load_spreadsheet_config().unwrap();
        assert_eq!(config.progress_interval, Duration::from_secs(1));
        assert!(!config.csv_write_bom);
        assert_eq!(config.character_width_px, DEFAULT_CHARACTER_WIDTH_PX);
    }

    #[test]
    fn test_malformed_value_names_the_key() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::CHARACTER_WIDTH_PX, "wide").unwrap();

        let err = manager.load_spreadsheet_config().unwrap_err();
        assert!(err.to_string().contains(config_keys::CHARACTER_WIDTH_PX));
    }

    #[test]
    fn test_config_snapshot_is_json() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::CSV_WRITE_BOM, "1").unwrap();

        let snapshot = manager.get_config_snapshot().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed[config_keys::CSV_WRITE_BOM], "1");
    }
}
