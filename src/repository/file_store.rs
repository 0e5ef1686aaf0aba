// ==========================================
// 相机陷阱标注系统 - 文件数据库 Repository Trait
// ==========================================
// 职责: 定义电子表格互换所需的存储接口（不包含对账逻辑）
// 红线: Repository 不含业务规则,只做数据读写
// ==========================================

use crate::domain::control::ControlDefinition;
use crate::domain::file_record::FileRecord;
use crate::domain::types::FileSelection;
use crate::repository::error::RepositoryResult;
use std::collections::HashMap;
use std::path::PathBuf;

/// 身份索引键: (小写相对路径, 小写文件名)
pub type IdentityKey = (String, String);

// ==========================================
// FileStore Trait
// ==========================================
// 用途: 导入对账与导出的数据来源/去向
// 实现者: SqliteFileStore（使用 rusqlite）
pub trait FileStore {
    /// 文件数据库所在目录（相对路径的基准）
    fn folder(&self) -> Option<PathBuf>;

    /// 当前文件筛选条件
    fn selection(&self) -> FileSelection;

    /// 全部控件定义,按电子表格顺序
    fn controls(&self) -> RepositoryResult<Vec<ControlDefinition>>;

    /// 当前筛选下的文件记录,按显示顺序（相对路径, 拍摄时间, 文件名）
    fn load_selected_files(&self) -> RepositoryResult<Vec<FileRecord>>;

    /// 全部文件记录的身份索引（忽略筛选条件）
    fn index_files_by_identity(&self) -> RepositoryResult<HashMap<IdentityKey, FileRecord>>;

    /// 单事务批量插入
    ///
    /// # 返回
    /// - Ok(usize): 插入数量;成功后记录获得 id 并接受变更
    /// - Err: 数据库错误（整个事务回滚）
    fn insert_files(&self, files: &mut [FileRecord]) -> RepositoryResult<usize>;

    /// 单事务批量更新
    ///
    /// # 返回
    /// - Ok(usize): 更新数量;成功后记录接受变更
    /// - Err: 数据库错误（整个事务回滚）
    fn update_files(&self, files: &mut [FileRecord]) -> RepositoryResult<usize>;
}
