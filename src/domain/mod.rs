// ==========================================
// 起重机设备台账导入系统 - 领域模型层
// ==========================================
// 职责: 定义原始行 / 规范设备 / 设备事件 / 对账报告
// 红线: 不含数据访问逻辑
// ==========================================

pub mod equipment;
pub mod record;
pub mod report;
pub mod types;

// 重导出核心类型
pub use equipment::{CanonicalEntity, ChildRecord, EntityAttributes, EventAttributes};
pub use record::{fields, FieldValue, NormalizedRecord, RawRecord};
pub use report::{
    ImportIssue, ImportOutcome, ImportRunLog, ReconciliationReport, ResumePoint,
};
pub use types::{ConflictPolicy, EventKind, IssueKind, LinkTier, RunStatus, WritePhase};
