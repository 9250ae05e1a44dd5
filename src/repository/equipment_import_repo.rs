// ==========================================
// 起重机设备台账导入系统 - 设备导入 Repository Trait
// ==========================================
// 职责: 定义导入落库相关数据访问接口（不包含业务逻辑）
// 红线: 每次调用即一个原子事务; 冲突策略只决定 SQL 形态,不做重试
// ==========================================

use crate::domain::equipment::{CanonicalEntity, ChildRecord};
use crate::domain::report::ImportRunLog;
use crate::domain::types::ConflictPolicy;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// EntityChunkStats - 设备分块落库统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityChunkStats {
    pub created: usize,
    pub skipped_existing: usize,
    pub updated: usize,
}

// ==========================================
// EquipmentImportRepository Trait
// ==========================================
// 用途: 设备与事件的分块事务写入 + 运行日志
// 实现者: EquipmentImportRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait EquipmentImportRepository: Send + Sync {
    // ===== 分块写入（事务化）=====

    /// 在单个事务中写入一批设备
    ///
    /// # 参数
    /// - entities: 规范设备
    /// - policy: 冲突策略
    ///
    /// # 返回
    /// - Ok(EntityChunkStats): 新增/跳过/刷新计数
    /// - Err(EntityConflict): FAIL 策略下设备已存在（事务已回滚）
    /// - Err(Transient): 数据库忙,可重试
    async fn apply_entity_chunk(
        &self,
        entities: &[CanonicalEntity],
        policy: ConflictPolicy,
    ) -> RepositoryResult<EntityChunkStats>;

    /// 在单个事务中追加一批事件
    ///
    /// # 说明
    /// - 提交前在事务内校验 parent_id 存在
    ///
    /// # 返回
    /// - Ok(usize): 写入条数
    /// - Err(ReferentialViolation): 引用的设备不存在（事务已回滚）
    async fn apply_child_chunk(
        &self,
        children: &[ChildRecord],
        run_id: &str,
    ) -> RepositoryResult<usize>;

    // ===== 运行日志 =====

    async fn insert_run_log(&self, log: &ImportRunLog) -> RepositoryResult<()>;
}
