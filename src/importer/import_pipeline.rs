// ==========================================
// 起重机设备台账导入系统 - 导入管道
// ==========================================
// 职责: 整合导入流程,从原始行到数据库
// 流程: 规范化 → 标识解析 → 事件关联 → 分块落库 → 运行日志
// 红线: 非致命问题只计入对账报告; 只有配置校验与存储致命错误作为运行失败返回
// ==========================================

use crate::config::{ImportConfig, ImportConfigReader};
use crate::domain::equipment::ChildRecord;
use crate::domain::record::{NormalizedRecord, RawRecord};
use crate::domain::report::{ImportOutcome, ImportRunLog, ReconciliationReport, ResumePoint};
use crate::domain::types::{EventKind, IssueKind, RunStatus};
use crate::importer::batch_writer::{BatchWriter, CancellationFlag, PhaseOutcome};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::parse_workbook;
use crate::importer::identity_resolver::IdentityResolver;
use crate::importer::relationship_linker::RelationshipLinker;
use crate::importer::row_normalizer::{EntityDescriptor, NormalizeOutcome, RowNormalizer};
use crate::repository::EquipmentImportRepository;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ImportInput - 三个原始行序列
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ImportInput {
    pub parents: Vec<RawRecord>,     // 设备台账
    pub failures: Vec<RawRecord>,    // 故障报告
    pub maintenance: Vec<RawRecord>, // 维修报告
}

impl ImportInput {
    pub fn total_rows(&self) -> usize {
        self.parents.len() + self.failures.len() + self.maintenance.len()
    }
}

// ==========================================
// PipelineContext - 单次运行上下文
// ==========================================
// 持有仓储句柄; 运行结束（任何出口）随上下文一起释放
struct PipelineContext<R: EquipmentImportRepository> {
    run_id: String,
    config: ImportConfig,
    repo: Arc<R>,
    report: ReconciliationReport,
    cancel: CancellationFlag,
    started_at: DateTime<Utc>,
}

impl<R: EquipmentImportRepository> PipelineContext<R> {
    /// 写入运行日志（失败只告警）
    async fn record_run(&self, status: RunStatus, resume: Option<&ResumePoint>) {
        let log = ImportRunLog {
            run_id: self.run_id.clone(),
            status,
            started_at: self.started_at,
            finished_at: Utc::now(),
            config_json: serde_json::to_string(&self.config).unwrap_or_default(),
            report_json: serde_json::to_string(&self.report).unwrap_or_default(),
            resume: resume.cloned(),
        };

        if let Err(e) = self.repo.insert_run_log(&log).await {
            warn!(run_id = %self.run_id, error = %e, "运行日志写入失败");
        }
    }
}

// ==========================================
// ImportPipeline - 导入管道
// ==========================================
pub struct ImportPipeline<R: EquipmentImportRepository> {
    repo: R,
    config: ImportConfig,
    cancel: CancellationFlag,
    resume: Option<ResumePoint>,
    normalizer: RowNormalizer,
}

impl<R: EquipmentImportRepository> ImportPipeline<R> {
    /// 创建导入管道
    ///
    /// # 返回
    /// - Err(ConfigValueError): 配置非法,运行不会开始
    pub fn new(repo: R, config: ImportConfig) -> ImportResult<Self> {
        config.validate()?;
        Ok(Self {
            repo,
            config,
            cancel: CancellationFlag::new(),
            resume: None,
            normalizer: RowNormalizer::new(),
        })
    }

    /// 通过配置读取器加载配置后创建
    pub async fn from_config_reader<C>(repo: R, reader: &C) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        let config = reader.load_import_config().await?;
        Self::new(repo, config)
    }

    /// 使用外部共享的取消标记
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 从续跑点继续
    pub fn with_resume(mut self, resume: ResumePoint) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// 从工作簿（CraneList / FailureReport / RepairReport）导入
    pub async fn run_workbook<P: AsRef<Path>>(self, path: P) -> ImportResult<ImportOutcome> {
        let input = parse_workbook(path.as_ref())?;
        self.run(input).await
    }

    /// 执行一次导入
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 完成或取消（取消时带续跑点）
    /// - Err(RunAborted): 存储致命错误（带部分报告与续跑点）
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(self, input: ImportInput) -> ImportResult<ImportOutcome> {
        let start = Instant::now();
        let ImportPipeline {
            repo,
            config,
            cancel,
            resume,
            normalizer,
        } = self;

        let mut ctx = PipelineContext {
            run_id: Uuid::new_v4().to_string(),
            config,
            repo: Arc::new(repo),
            report: ReconciliationReport::default(),
            cancel,
            started_at: Utc::now(),
        };
        tracing::Span::current().record("run_id", ctx.run_id.as_str());

        info!(
            parents = input.parents.len(),
            failures = input.failures.len(),
            maintenance = input.maintenance.len(),
            resume = ?resume,
            "开始导入设备台账"
        );

        // === 步骤 1: 规范化 ===
        debug!("步骤 1: 行规范化");
        let parent_descriptor = EntityDescriptor::equipment(&ctx.config);
        let (parents, incomplete) =
            normalize_rows(&normalizer, &input.parents, &parent_descriptor, &mut ctx.report);
        ctx.report.entities_skipped_incomplete += incomplete;

        let mut events: Vec<(EventKind, Vec<NormalizedRecord>)> = Vec::with_capacity(2);
        for (kind, rows) in [
            (EventKind::Failure, &input.failures),
            (EventKind::Maintenance, &input.maintenance),
        ] {
            let descriptor = EntityDescriptor::event(kind, &ctx.config);
            let (records, incomplete) =
                normalize_rows(&normalizer, rows, &descriptor, &mut ctx.report);
            ctx.report.children_skipped_incomplete += incomplete;
            events.push((kind, records));
        }
        info!(
            parents = parents.len(),
            events = events.iter().map(|(_, r)| r.len()).sum::<usize>(),
            "行规范化完成"
        );

        // === 步骤 2: 标识解析 ===
        debug!("步骤 2: 标识解析");
        let resolver = IdentityResolver::new(
            ctx.config.synthetic_key_policy,
            ctx.config.refresh_on_duplicate,
        );
        let identity_map = resolver.resolve(&parents, &mut ctx.report);
        info!(
            entities = identity_map.len(),
            keys = identity_map.key_count(),
            deduplicated = ctx.report.entities_deduplicated,
            synthesized = ctx.report.entities_synthesized,
            "标识解析完成"
        );

        // === 步骤 3: 事件关联 ===
        debug!("步骤 3: 事件关联");
        let linker = RelationshipLinker::new(
            ctx.config.fuzzy_matching,
            ctx.config.fuzzy_min_length,
            ctx.config.allow_fallback_distribution,
        );
        let mut children: Vec<ChildRecord> = Vec::new();
        for (kind, records) in &events {
            children.extend(linker.link_all(
                *kind,
                records,
                &identity_map,
                ctx.config.default_occurred_on,
                &mut ctx.report,
            ));
        }
        info!(
            exact = ctx.report.children_linked_exact,
            fuzzy = ctx.report.children_linked_fuzzy,
            fallback = ctx.report.children_fallback_assigned,
            unmatched = ctx.report.children_unmatched,
            "事件关联完成"
        );
        if ctx.report.children_fallback_assigned > 0 {
            warn!(
                count = ctx.report.children_fallback_assigned,
                "存在兜底分配的事件，其设备归属不可信"
            );
        }

        // === 步骤 4: 分块落库 ===
        debug!("步骤 4: 分块落库");
        let entities = identity_map.into_entities();
        let writer = BatchWriter::new(
            Arc::clone(&ctx.repo),
            &ctx.config,
            ctx.run_id.clone(),
            ctx.cancel.clone(),
            resume,
        );

        let phase = match writer.write_entities(&entities, &mut ctx.report).await {
            PhaseOutcome::Completed => writer.write_children(&children, &mut ctx.report).await,
            interrupted => interrupted,
        };
        drop(writer);

        // === 步骤 5: 收尾 ===
        let elapsed_ms = start.elapsed().as_millis();
        match phase {
            PhaseOutcome::Completed => {
                ctx.record_run(RunStatus::Completed, None).await;
                info!(
                    elapsed_ms = elapsed_ms as u64,
                    chunks_committed = ctx.report.chunks_committed,
                    chunks_failed = ctx.report.chunks_failed,
                    issues = ctx.report.issues.len(),
                    "导入完成"
                );
                Ok(ImportOutcome {
                    run_id: ctx.run_id,
                    status: RunStatus::Completed,
                    report: ctx.report,
                    resume: None,
                    elapsed_ms,
                })
            }
            PhaseOutcome::Interrupted {
                resume,
                fatal: None,
            } => {
                ctx.record_run(RunStatus::Cancelled, Some(&resume)).await;
                warn!(phase = %resume.phase, chunk_index = resume.chunk_index, "导入已取消");
                Ok(ImportOutcome {
                    run_id: ctx.run_id,
                    status: RunStatus::Cancelled,
                    report: ctx.report,
                    resume: Some(resume),
                    elapsed_ms,
                })
            }
            PhaseOutcome::Interrupted {
                resume,
                fatal: Some(cause),
            } => {
                ctx.record_run(RunStatus::Aborted, Some(&resume)).await;
                error!(
                    phase = %resume.phase,
                    chunk_index = resume.chunk_index,
                    error = %cause,
                    "导入因存储致命错误中止"
                );
                Err(ImportError::RunAborted {
                    cause: cause.to_string(),
                    report: Box::new(ctx.report),
                    resume,
                })
            }
        }
    }
}

/// 规范化一个源序列
///
/// # 返回
/// - (完整记录, 不完整行数)
fn normalize_rows(
    normalizer: &RowNormalizer,
    rows: &[RawRecord],
    descriptor: &EntityDescriptor,
    report: &mut ReconciliationReport,
) -> (Vec<NormalizedRecord>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut incomplete = 0;

    for (row_index, raw) in rows.iter().enumerate() {
        let (outcome_record, failures) = match normalizer.normalize(raw, row_index, descriptor) {
            NormalizeOutcome::Normalized {
                record,
                coercion_failures,
            } => (Some(record), coercion_failures),
            NormalizeOutcome::Incomplete {
                coercion_failures, ..
            } => (None, coercion_failures),
        };

        for failure in failures {
            report.record_issue(
                IssueKind::FieldCoercion,
                descriptor.source,
                Some(row_index),
                None,
                format!(
                    "列 {} 的值 '{}' 无法转换为 {}，按缺失处理",
                    failure.source_column, failure.raw, failure.field
                ),
            );
        }

        match outcome_record {
            Some(record) => records.push(record),
            None => {
                incomplete += 1;
                report.record_issue(
                    IssueKind::IncompleteRecord,
                    descriptor.source,
                    Some(row_index),
                    None,
                    format!("缺少必要字段（{}）", descriptor.mandatory_any.join(" / ")),
                );
            }
        }
    }

    (records, incomplete)
}
