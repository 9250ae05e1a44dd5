// ==========================================
// 起重机设备台账导入系统 - 分块落库器
// ==========================================
// 职责: 先设备后事件,按固定大小分块,每块一个原子事务
// 失败隔离:
// - 分块级错误（引用校验/FAIL 冲突）只回滚该分块,运行继续
// - 瞬时错误（busy/locked）按指数退避重试
// - 重试耗尽或其他存储错误: 停止派发新分块,返回续跑点
// 取消: 只在分块边界检查
// ==========================================

use crate::config::ImportConfig;
use crate::domain::equipment::{CanonicalEntity, ChildRecord};
use crate::domain::report::{ReconciliationReport, ResumePoint};
use crate::domain::types::{ConflictPolicy, EventKind, IssueKind, WritePhase};
use crate::importer::relationship_linker::source_name;
use crate::repository::{
    EntityChunkStats, EquipmentImportRepository, RepositoryError, RepositoryResult,
};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// 退避上限（毫秒）
pub const MAX_BACKOFF_MS: u64 = 5_000;

/// 第 attempt 次重试前的等待时间（attempt 从 0 起）
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.min(16);
    let value = base_ms.saturating_mul(1_u64 << shift);
    Duration::from_millis(value.min(MAX_BACKOFF_MS))
}

// ==========================================
// CancellationFlag - 运行取消标记
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// WriterSettings - 落库参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    pub policy: ConflictPolicy,
    pub chunk_size: usize,
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,
    pub parallelism: usize,
    pub isolate_rejected_children: bool,
}

impl From<&ImportConfig> for WriterSettings {
    fn from(config: &ImportConfig) -> Self {
        Self {
            policy: config.conflict_policy,
            chunk_size: config.chunk_size.max(1),
            retry_limit: config.retry_limit,
            retry_backoff_ms: config.retry_backoff_ms,
            parallelism: config.effective_parallelism(),
            isolate_rejected_children: config.isolate_rejected_children,
        }
    }
}

// ==========================================
// PhaseOutcome - 单阶段落库结果
// ==========================================
#[derive(Debug)]
pub enum PhaseOutcome {
    Completed,
    /// 取消（fatal 为 None）或存储致命错误
    Interrupted {
        resume: ResumePoint,
        fatal: Option<RepositoryError>,
    },
}

/// 被隔离的事件记录
#[derive(Debug, Clone)]
struct RejectedChild {
    kind: EventKind,
    source_row: usize,
    parent_id: String,
    reason: String,
}

impl RejectedChild {
    fn new(child: &ChildRecord, reason: &RepositoryError) -> Self {
        Self {
            kind: child.kind,
            source_row: child.source_row,
            parent_id: child.parent_id.clone(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct ChildChunkOutcome {
    persisted: usize,
    salvaged: usize,
    rejected: Vec<RejectedChild>,
    rolled_back: Option<String>, // 原分块回滚原因
}

enum ChunkResult<T> {
    Skipped,    // 续跑时已完成
    NotStarted, // 取消或已中止,未派发
    Committed(T),
    Failed(RepositoryError),
    Fatal(RepositoryError),
}

/// 按分块顺序折叠结果,计算续跑点
struct ResumeTracker {
    phase: WritePhase,
    first_unfinished: Option<usize>,
    finished_after: BTreeSet<usize>,
    fatal: Option<RepositoryError>,
}

impl ResumeTracker {
    fn new(phase: WritePhase) -> Self {
        Self {
            phase,
            first_unfinished: None,
            finished_after: BTreeSet::new(),
            fatal: None,
        }
    }

    fn finished(&mut self, idx: usize) {
        if self.first_unfinished.is_some() {
            self.finished_after.insert(idx);
        }
    }

    fn unfinished(&mut self, idx: usize) {
        if self.first_unfinished.is_none() {
            self.first_unfinished = Some(idx);
        }
    }

    fn fatal(&mut self, idx: usize, err: RepositoryError) {
        self.unfinished(idx);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    fn finish(self) -> PhaseOutcome {
        match self.first_unfinished {
            None => PhaseOutcome::Completed,
            Some(chunk_index) => PhaseOutcome::Interrupted {
                resume: ResumePoint {
                    phase: self.phase,
                    chunk_index,
                    committed_after: self.finished_after,
                },
                fatal: self.fatal,
            },
        }
    }
}

// ==========================================
// BatchWriter - 分块落库器
// ==========================================
pub struct BatchWriter<R: EquipmentImportRepository> {
    repo: Arc<R>,
    settings: WriterSettings,
    run_id: String,
    cancel: CancellationFlag,
    resume: Option<ResumePoint>,
    halted: AtomicBool,
}

impl<R: EquipmentImportRepository> BatchWriter<R> {
    /// 创建落库器
    ///
    /// # 参数
    /// - repo: 仓储（运行上下文持有）
    /// - config: 导入配置
    /// - run_id: 本次运行标识（写入事件行）
    /// - cancel: 取消标记
    /// - resume: 续跑点（None 表示全新运行）
    pub fn new(
        repo: Arc<R>,
        config: &ImportConfig,
        run_id: impl Into<String>,
        cancel: CancellationFlag,
        resume: Option<ResumePoint>,
    ) -> Self {
        if !config.conflict_policy.allows_parallel_chunks() && config.max_parallel_chunks > 1 {
            warn!(
                policy = %config.conflict_policy,
                requested = config.max_parallel_chunks,
                "UPSERT 策略下分块强制串行落库"
            );
        }

        Self {
            repo,
            settings: WriterSettings::from(config),
            run_id: run_id.into(),
            cancel,
            resume,
            halted: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.halted.load(Ordering::SeqCst)
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    fn resumes_past(&self, phase: WritePhase, idx: usize) -> bool {
        self.resume
            .as_ref()
            .map(|r| r.skips(phase, idx))
            .unwrap_or(false)
    }

    /// 瞬时错误按指数退避重试
    async fn with_retry<T, F, Fut>(
        &self,
        phase: WritePhase,
        chunk_index: usize,
        mut op: F,
    ) -> RepositoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.settings.retry_limit => {
                    let delay = backoff_delay(self.settings.retry_backoff_ms, attempt);
                    warn!(
                        phase = %phase,
                        chunk_index,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "数据库暂时不可用，退避后重试"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    error!(phase = %phase, chunk_index, attempts = attempt + 1, "重试次数耗尽");
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    // ===== 设备阶段 =====

    /// 分块写入规范设备
    #[instrument(skip_all, fields(run_id = %self.run_id, phase = "ENTITIES", total = entities.len()))]
    pub async fn write_entities(
        &self,
        entities: &[CanonicalEntity],
        report: &mut ReconciliationReport,
    ) -> PhaseOutcome {
        let chunks: Vec<&[CanonicalEntity]> = entities.chunks(self.settings.chunk_size).collect();
        info!(chunks = chunks.len(), parallelism = self.settings.parallelism, "开始写入设备");

        let results: Vec<ChunkResult<EntityChunkStats>> = stream::iter(
            chunks
                .iter()
                .enumerate()
                .map(|(idx, chunk)| self.entity_chunk(idx, chunk)),
        )
        .buffered(self.settings.parallelism)
        .collect()
        .await;

        let mut tracker = ResumeTracker::new(WritePhase::Entities);
        for (idx, (chunk, result)) in chunks.iter().zip(results).enumerate() {
            match result {
                ChunkResult::Skipped => {
                    report.chunks_skipped += 1;
                    tracker.finished(idx);
                }
                ChunkResult::NotStarted => tracker.unfinished(idx),
                ChunkResult::Committed(stats) => {
                    report.entities_created += stats.created;
                    report.entities_skipped_existing += stats.skipped_existing;
                    report.entities_updated += stats.updated;
                    report.chunks_committed += 1;
                    tracker.finished(idx);
                }
                ChunkResult::Failed(err) => {
                    report.chunks_failed += 1;
                    report.entities_failed += chunk.len();
                    let key = match &err {
                        RepositoryError::EntityConflict { id } => Some(id.clone()),
                        _ => None,
                    };
                    report.record_issue(
                        IssueKind::EntityConflict,
                        "parents",
                        chunk.first().map(|e| e.source_row),
                        key,
                        format!("设备分块 {} 已回滚: {}", idx, err),
                    );
                    tracker.finished(idx);
                }
                ChunkResult::Fatal(err) => tracker.fatal(idx, err),
            }
        }

        let outcome = tracker.finish();
        info!(
            created = report.entities_created,
            skipped_existing = report.entities_skipped_existing,
            updated = report.entities_updated,
            failed = report.entities_failed,
            interrupted = matches!(outcome, PhaseOutcome::Interrupted { .. }),
            "设备写入结束"
        );
        outcome
    }

    async fn entity_chunk(&self, idx: usize, chunk: &[CanonicalEntity]) -> ChunkResult<EntityChunkStats> {
        if self.resumes_past(WritePhase::Entities, idx) {
            debug!(chunk_index = idx, "续跑跳过设备分块");
            return ChunkResult::Skipped;
        }
        if self.should_stop() {
            return ChunkResult::NotStarted;
        }

        let policy = self.settings.policy;
        match self
            .with_retry(WritePhase::Entities, idx, || self.repo.apply_entity_chunk(chunk, policy))
            .await
        {
            Ok(stats) => {
                debug!(chunk_index = idx, created = stats.created, "设备分块已提交");
                ChunkResult::Committed(stats)
            }
            Err(e) if e.is_chunk_scoped() => {
                warn!(chunk_index = idx, error = %e, "设备分块回滚");
                ChunkResult::Failed(e)
            }
            Err(e) => {
                error!(chunk_index = idx, error = %e, "设备分块遇到致命存储错误");
                self.halt();
                ChunkResult::Fatal(e)
            }
        }
    }

    // ===== 事件阶段 =====

    /// 分块追加事件记录
    #[instrument(skip_all, fields(run_id = %self.run_id, phase = "CHILDREN", total = children.len()))]
    pub async fn write_children(
        &self,
        children: &[ChildRecord],
        report: &mut ReconciliationReport,
    ) -> PhaseOutcome {
        let chunks: Vec<&[ChildRecord]> = children.chunks(self.settings.chunk_size).collect();
        info!(chunks = chunks.len(), parallelism = self.settings.parallelism, "开始写入事件");

        let results: Vec<ChunkResult<ChildChunkOutcome>> = stream::iter(
            chunks
                .iter()
                .enumerate()
                .map(|(idx, chunk)| self.child_chunk(idx, chunk)),
        )
        .buffered(self.settings.parallelism)
        .collect()
        .await;

        let mut tracker = ResumeTracker::new(WritePhase::Children);
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                ChunkResult::Skipped => {
                    report.chunks_skipped += 1;
                    tracker.finished(idx);
                }
                ChunkResult::NotStarted => tracker.unfinished(idx),
                ChunkResult::Committed(outcome) => {
                    if outcome.rolled_back.is_some() {
                        report.chunks_failed += 1;
                    } else {
                        report.chunks_committed += 1;
                    }
                    report.children_persisted += outcome.persisted;
                    report.children_salvaged += outcome.salvaged;
                    report.children_rejected += outcome.rejected.len();
                    for rejected in outcome.rejected {
                        report.record_issue(
                            IssueKind::ReferentialViolation,
                            source_name(rejected.kind),
                            Some(rejected.source_row),
                            Some(rejected.parent_id),
                            format!("事件分块 {} 回滚: {}", idx, rejected.reason),
                        );
                    }
                    tracker.finished(idx);
                }
                ChunkResult::Failed(err) => {
                    // 事件分块的分块级错误已在 child_chunk 内折算为 Committed(rolled_back)
                    report.chunks_failed += 1;
                    warn!(chunk_index = idx, error = %err, "事件分块回滚");
                    tracker.finished(idx);
                }
                ChunkResult::Fatal(err) => tracker.fatal(idx, err),
            }
        }

        let outcome = tracker.finish();
        info!(
            persisted = report.children_persisted,
            rejected = report.children_rejected,
            salvaged = report.children_salvaged,
            interrupted = matches!(outcome, PhaseOutcome::Interrupted { .. }),
            "事件写入结束"
        );
        outcome
    }

    async fn child_chunk(&self, idx: usize, chunk: &[ChildRecord]) -> ChunkResult<ChildChunkOutcome> {
        if self.resumes_past(WritePhase::Children, idx) {
            debug!(chunk_index = idx, "续跑跳过事件分块");
            return ChunkResult::Skipped;
        }
        if self.should_stop() {
            return ChunkResult::NotStarted;
        }

        let run_id = self.run_id.as_str();
        match self
            .with_retry(WritePhase::Children, idx, || self.repo.apply_child_chunk(chunk, run_id))
            .await
        {
            Ok(persisted) => {
                debug!(chunk_index = idx, persisted, "事件分块已提交");
                ChunkResult::Committed(ChildChunkOutcome {
                    persisted,
                    ..Default::default()
                })
            }
            Err(e) if e.is_chunk_scoped() => {
                warn!(chunk_index = idx, error = %e, "事件分块回滚");
                if self.settings.isolate_rejected_children {
                    self.salvage(idx, chunk, e).await
                } else {
                    ChunkResult::Committed(ChildChunkOutcome {
                        rejected: chunk.iter().map(|c| RejectedChild::new(c, &e)).collect(),
                        rolled_back: Some(e.to_string()),
                        ..Default::default()
                    })
                }
            }
            Err(e) => {
                error!(chunk_index = idx, error = %e, "事件分块遇到致命存储错误");
                self.halt();
                ChunkResult::Fatal(e)
            }
        }
    }

    /// 隔离违规记录,其余记录在新事务中重新落库
    async fn salvage(
        &self,
        idx: usize,
        chunk: &[ChildRecord],
        first_error: RepositoryError,
    ) -> ChunkResult<ChildChunkOutcome> {
        let rolled_back = Some(first_error.to_string());
        let mut remaining: Vec<ChildRecord> = chunk.to_vec();
        let mut rejected = Vec::new();
        let mut error = first_error;
        let run_id = self.run_id.as_str();

        loop {
            match &error {
                RepositoryError::ReferentialViolation { parent_id, .. } => {
                    let (bad, good): (Vec<ChildRecord>, Vec<ChildRecord>) =
                        remaining.into_iter().partition(|c| &c.parent_id == parent_id);
                    if bad.is_empty() {
                        // 违规引用不在本分块内: 无法收敛,剩余记录整体拒绝
                        warn!(chunk_index = idx, parent_id = %parent_id, "违规引用不属于本分块");
                        rejected.extend(good.iter().map(|c| RejectedChild::new(c, &error)));
                        remaining = Vec::new();
                    } else {
                        rejected.extend(bad.iter().map(|c| RejectedChild::new(c, &error)));
                        remaining = good;
                    }
                }
                _ => {
                    // 无法定位违规记录: 整块拒绝
                    rejected.extend(remaining.iter().map(|c| RejectedChild::new(c, &error)));
                    remaining.clear();
                }
            }

            if remaining.is_empty() {
                return ChunkResult::Committed(ChildChunkOutcome {
                    persisted: 0,
                    salvaged: 0,
                    rejected,
                    rolled_back,
                });
            }

            match self
                .with_retry(WritePhase::Children, idx, || {
                    self.repo.apply_child_chunk(&remaining, run_id)
                })
                .await
            {
                Ok(persisted) => {
                    info!(
                        chunk_index = idx,
                        salvaged = persisted,
                        rejected = rejected.len(),
                        "事件分块隔离违规记录后重新落库"
                    );
                    return ChunkResult::Committed(ChildChunkOutcome {
                        persisted,
                        salvaged: persisted,
                        rejected,
                        rolled_back,
                    });
                }
                Err(e) if e.is_chunk_scoped() => error = e,
                Err(e) => {
                    error!(chunk_index = idx, error = %e, "重新落库遇到致命存储错误");
                    self.halt();
                    return ChunkResult::Fatal(e);
                }
            }
        }
    }
}
