// ==========================================
// 起重机设备台账导入系统 - 事件关联器
// ==========================================
// 职责: 将故障/维修记录绑定到唯一规范设备
// 层级: 精确匹配 → 模糊匹配（可关闭）→ 轮询兜底（默认关闭）
// 说明: 模糊与轮询均为启发式,结果以 link_tier 标记并单独计数
// ==========================================

use crate::domain::equipment::{CanonicalEntity, ChildRecord, EventAttributes};
use crate::domain::record::{fields, NormalizedRecord};
use crate::domain::report::ReconciliationReport;
use crate::domain::types::{EventKind, IssueKind, LinkTier};
use crate::importer::identity_resolver::IdentityMap;
use chrono::NaiveDate;
use tracing::{debug, info};

// ==========================================
// LinkDecision - 单条记录的关联结论
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    Linked {
        entity_index: usize,
        tier: LinkTier,
        ambiguous: bool, // 模糊匹配存在多个候选
    },
    Unmatched,
}

// ==========================================
// RelationshipLinker - 事件关联器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RelationshipLinker {
    fuzzy_matching: bool,
    fuzzy_min_length: usize,
    allow_fallback_distribution: bool,
}

impl RelationshipLinker {
    pub fn new(
        fuzzy_matching: bool,
        fuzzy_min_length: usize,
        allow_fallback_distribution: bool,
    ) -> Self {
        Self {
            fuzzy_matching,
            fuzzy_min_length,
            allow_fallback_distribution,
        }
    }

    /// 为单条记录选择设备
    ///
    /// # 参数
    /// - record: 规范化事件记录
    /// - position: 记录在所属源序列中的位置（轮询兜底使用）
    /// - map: 标识映射
    pub fn link(&self, record: &NormalizedRecord, position: usize, map: &IdentityMap) -> LinkDecision {
        if map.is_empty() {
            return LinkDecision::Unmatched;
        }

        // 1. 精确匹配
        if let Some(code) = record.text(fields::PARENT_REF) {
            if let Some(entity_index) = map.position(&code) {
                return LinkDecision::Linked {
                    entity_index,
                    tier: LinkTier::Exact,
                    ambiguous: false,
                };
            }
        }

        // 2. 模糊匹配
        if self.fuzzy_matching {
            let probes = [fields::PARENT_REF, fields::PARENT_NAME]
                .iter()
                .filter_map(|f| record.text(f))
                .map(|p| p.trim().to_lowercase())
                .filter(|p| p.chars().count() >= self.fuzzy_min_length);

            for probe in probes {
                let mut candidates = map
                    .entities()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| self.fuzzy_hit(&probe, e))
                    .map(|(idx, _)| idx);

                if let Some(entity_index) = candidates.next() {
                    return LinkDecision::Linked {
                        entity_index,
                        tier: LinkTier::Fuzzy,
                        ambiguous: candidates.next().is_some(),
                    };
                }
            }
        }

        // 3. 轮询兜底
        if self.allow_fallback_distribution {
            return LinkDecision::Linked {
                entity_index: position % map.len(),
                tier: LinkTier::Fallback,
                ambiguous: false,
            };
        }

        LinkDecision::Unmatched
    }

    /// 编码/名称互为子串（忽略大小写）
    fn fuzzy_hit(&self, probe: &str, entity: &CanonicalEntity) -> bool {
        let candidates = std::iter::once(entity.id.as_str())
            .chain(entity.attributes.display_name.as_deref());

        for candidate in candidates {
            let candidate = candidate.trim().to_lowercase();
            if candidate.chars().count() < self.fuzzy_min_length {
                continue;
            }
            if candidate.contains(probe) || probe.contains(candidate.as_str()) {
                return true;
            }
        }
        false
    }

    /// 关联一个源序列的全部事件记录
    ///
    /// # 参数
    /// - kind: 事件类型
    /// - records: 规范化事件记录（row_index 为源序列位置）
    /// - map: 标识映射
    /// - default_occurred_on: 日期缺失时的替代日期
    /// - report: 计数与问题明细写入目标
    pub fn link_all(
        &self,
        kind: EventKind,
        records: &[NormalizedRecord],
        map: &IdentityMap,
        default_occurred_on: Option<NaiveDate>,
        report: &mut ReconciliationReport,
    ) -> Vec<ChildRecord> {
        let source = source_name(kind);
        let mut children = Vec::with_capacity(records.len());

        for record in records {
            let Some(occurred_on) = record.date(fields::OCCURRED_ON).or(default_occurred_on) else {
                report.children_skipped_incomplete += 1;
                report.record_issue(
                    IssueKind::IncompleteRecord,
                    source,
                    Some(record.row_index),
                    record.text(fields::PARENT_REF),
                    "事件记录缺少发生日期",
                );
                continue;
            };

            match self.link(record, record.row_index, map) {
                LinkDecision::Linked {
                    entity_index,
                    tier,
                    ambiguous,
                } => {
                    let Some(entity) = map.entity_at(entity_index) else {
                        continue;
                    };
                    report.count_link(tier);
                    if ambiguous {
                        report.children_fuzzy_ambiguous += 1;
                        report.record_issue(
                            IssueKind::AmbiguousFuzzyMatch,
                            source,
                            Some(record.row_index),
                            Some(entity.id.clone()),
                            "模糊匹配存在多个候选设备，已按创建顺序取第一个",
                        );
                    }
                    debug!(row = record.row_index, parent = %entity.id, tier = %tier, "事件已关联");

                    children.push(ChildRecord {
                        parent_id: entity.id.clone(),
                        kind,
                        occurred_on,
                        attributes: event_attributes_of(record),
                        link_tier: tier,
                        source_row: record.row_index,
                    });
                }
                LinkDecision::Unmatched => {
                    report.children_unmatched += 1;
                    report.record_issue(
                        IssueKind::UnmatchedChild,
                        source,
                        Some(record.row_index),
                        record.text(fields::PARENT_REF).or_else(|| record.text(fields::PARENT_NAME)),
                        "无法关联到任何设备，已丢弃",
                    );
                }
            }
        }

        info!(
            kind = %kind,
            linked = children.len(),
            unmatched = report.children_unmatched,
            "事件关联完成"
        );
        children
    }
}

pub fn source_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Failure => "failures",
        EventKind::Maintenance => "maintenance",
    }
}

/// 从规范化记录提取事件属性
pub fn event_attributes_of(record: &NormalizedRecord) -> EventAttributes {
    EventAttributes {
        category: record.text(fields::CATEGORY),
        description: record.text(fields::DESCRIPTION),
        severity: record.text(fields::SEVERITY),
        technician: record.text(fields::TECHNICIAN),
        duration_hours: record.number(fields::DURATION_HOURS),
        worker_count: record.number(fields::WORKER_COUNT).map(|n| n as i64),
        work_order: record.text(fields::WORK_ORDER),
        area_name: record.text(fields::AREA_NAME),
        by_device: record.text(fields::BY_DEVICE),
        action_taken: record.text(fields::ACTION_TAKEN),
    }
}
