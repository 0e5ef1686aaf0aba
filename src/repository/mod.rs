// ==========================================
// 相机陷阱标注系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含对账逻辑
// ==========================================
// 职责: 提供文件数据库访问接口,屏蔽数据库细节
// 约束: 所有值使用参数化绑定;列名统一加引号
// ==========================================

pub mod error;
pub mod file_store;
pub mod file_store_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use file_store::{FileStore, IdentityKey};
pub use file_store_impl::SqliteFileStore;
