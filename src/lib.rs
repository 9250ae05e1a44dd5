// ==========================================
// 起重机设备台账导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 设备台账对账与幂等批量导入
// 流程: 原始行 → 规范化 → 标识解析 → 事件关联 → 分块落库 → 对账报告
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 原始行 / 规范设备 / 事件 / 报告
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 对账与落库管道
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ConflictPolicy, EventKind, IssueKind, LinkTier, RunStatus, WritePhase};

// 领域实体
pub use domain::{
    CanonicalEntity, ChildRecord, FieldValue, ImportOutcome, RawRecord, ReconciliationReport,
    ResumePoint,
};

// 导入管道
pub use importer::{CancellationFlag, ImportError, ImportInput, ImportPipeline, ImportResult};

// 配置
pub use config::{ConfigManager, ImportConfig, ImportConfigReader};

// 仓储
pub use repository::{EquipmentImportRepository, EquipmentImportRepositoryImpl};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "起重机设备台账导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
