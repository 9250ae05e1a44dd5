// ==========================================
// 起重机设备台账导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供分块事务写入接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod equipment_import_repo;
pub mod equipment_import_repo_impl;
pub mod error;

// 重导出核心仓储
pub use equipment_import_repo::{EntityChunkStats, EquipmentImportRepository};
pub use equipment_import_repo_impl::EquipmentImportRepositoryImpl;
pub use error::{RepositoryError, RepositoryResult};
