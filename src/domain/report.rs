// ==========================================
// 起重机设备台账导入系统 - 对账报告模型
// ==========================================
// 用途: 单次导入运行的计数汇总 + 问题明细 + 续跑点
// 对齐: import_run 表（report_json / resume_*）
// ==========================================

use crate::domain::types::{IssueKind, LinkTier, RunStatus, WritePhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ImportIssue - 非致命问题明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportIssue {
    pub kind: IssueKind,
    pub source: String,          // 来源序列（parents/failures/maintenance）
    pub row_index: Option<usize>,
    pub key: Option<String>,     // 相关标识（如果可解析）
    pub message: String,
}

// ==========================================
// ReconciliationReport - 对账报告
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    // ===== 设备 =====
    pub entities_created: usize,           // 新增设备
    pub entities_skipped_existing: usize,  // 库中已存在而跳过
    pub entities_updated: usize,           // UPSERT 刷新属性
    pub entities_failed: usize,            // 所在分块回滚
    pub entities_skipped_incomplete: usize, // 标识缺失
    pub entities_deduplicated: usize,      // 运行内重复被丢弃
    pub entities_refreshed: usize,         // 运行内重复刷新了属性
    pub entities_synthesized: usize,       // 合成标识

    // ===== 事件 =====
    pub children_linked_exact: usize,
    pub children_linked_fuzzy: usize,
    pub children_fuzzy_ambiguous: usize,
    pub children_fallback_assigned: usize,
    pub children_unmatched: usize,
    pub children_skipped_incomplete: usize,
    pub children_persisted: usize,
    pub children_rejected: usize,          // 引用校验失败被隔离
    pub children_salvaged: usize,          // 分块回滚后重新落库

    // ===== 分块 =====
    pub chunks_committed: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,             // 续跑时跳过

    // ===== 明细 =====
    pub issues: Vec<ImportIssue>,
}

impl ReconciliationReport {
    pub fn record_issue(
        &mut self,
        kind: IssueKind,
        source: &str,
        row_index: Option<usize>,
        key: Option<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(ImportIssue {
            kind,
            source: source.to_string(),
            row_index,
            key,
            message: message.into(),
        });
    }

    /// 按关联层级计数
    pub fn count_link(&mut self, tier: LinkTier) {
        match tier {
            LinkTier::Exact => self.children_linked_exact += 1,
            LinkTier::Fuzzy => self.children_linked_fuzzy += 1,
            LinkTier::Fallback => self.children_fallback_assigned += 1,
        }
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &ImportIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// 真实关联数（不含兜底分配）
    pub fn children_linked_genuine(&self) -> usize {
        self.children_linked_exact + self.children_linked_fuzzy
    }
}

// ==========================================
// ResumePoint - 续跑点
// ==========================================
// 说明: chunk_index 为首个未完成分块; committed_after 为其后已完成的分块（并行落库时出现）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub phase: WritePhase,
    pub chunk_index: usize,
    #[serde(default)]
    pub committed_after: BTreeSet<usize>,
}

impl ResumePoint {
    pub fn new(phase: WritePhase, chunk_index: usize) -> Self {
        Self {
            phase,
            chunk_index,
            committed_after: BTreeSet::new(),
        }
    }

    /// 判断某阶段的某分块是否应跳过
    pub fn skips(&self, phase: WritePhase, chunk_index: usize) -> bool {
        if phase < self.phase {
            return true;
        }
        if phase > self.phase {
            return false;
        }
        chunk_index < self.chunk_index || self.committed_after.contains(&chunk_index)
    }
}

// ==========================================
// ImportOutcome - 运行结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub report: ReconciliationReport,
    pub resume: Option<ResumePoint>, // 取消时给出
    pub elapsed_ms: u128,
}

// ==========================================
// ImportRunLog - 运行日志
// ==========================================
// 对齐: import_run 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRunLog {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_json: String,
    pub report_json: String,
    pub resume: Option<ResumePoint>,
}
