// ==========================================
// 起重机设备台账导入系统 - 标识解析器
// ==========================================
// 职责: 为每条设备记录确定规范标识,运行内去重,构建 IdentityMap
// 规则: 首个非缺失标识字段为解析键; 重复键首次出现者胜出
// 次标识只作别名,不参与主标识去重; 合成标识不得与真实标识重名
// 红线: 相同输入顺序 + 相同策略开关 → 相同 IdentityMap
// ==========================================

use crate::domain::equipment::{CanonicalEntity, EntityAttributes};
use crate::domain::record::{fields, NormalizedRecord};
use crate::domain::report::ReconciliationReport;
use crate::domain::types::IssueKind;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// 按顺序尝试的标识字段
pub const IDENTITY_FIELDS: [&str; 2] = [fields::PRIMARY_CODE, fields::SECONDARY_CODE];

/// 合成标识的依据字段
pub const SYNTHETIC_BASIS_FIELD: &str = fields::DISPLAY_NAME;

// ==========================================
// IdentityMap - 运行内标识映射
// ==========================================
// 结构: 设备 arena（创建顺序）+ 解析键表 + 次标识别名表
// 查找: 解析键优先于别名; 去重只比对同一命名空间
// 生命周期: 标识解析器构建,下游只读
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityMap {
    entities: Vec<CanonicalEntity>,
    canonical: HashMap<String, usize>, // 规范标识 → arena 下标
    aliases: HashMap<String, usize>,   // 次标识 → arena 下标
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 精确查找（键两端空白忽略）
    pub fn resolve(&self, key: &str) -> Option<&CanonicalEntity> {
        self.position(key).and_then(|idx| self.entities.get(idx))
    }

    /// 键对应的 arena 下标（创建顺序）
    pub fn position(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        self.canonical
            .get(key)
            .or_else(|| self.aliases.get(key))
            .copied()
    }

    pub fn get_id(&self, key: &str) -> Option<&str> {
        self.resolve(key).map(|e| e.id.as_str())
    }

    /// 按创建顺序排列的规范设备
    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn entity_at(&self, index: usize) -> Option<&CanonicalEntity> {
        self.entities.get(index)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 可查找的键数（含别名）
    pub fn key_count(&self) -> usize {
        self.canonical.len()
            + self
                .aliases
                .keys()
                .filter(|k| !self.canonical.contains_key(*k))
                .count()
    }

    /// 按键排序的 (键, 规范标识) 列表,与 `position` 的查找结果一致
    pub fn sorted_keys(&self) -> Vec<(&str, &str)> {
        let mut keys: Vec<(&str, &str)> = self
            .canonical
            .keys()
            .chain(self.aliases.keys().filter(|k| !self.canonical.contains_key(*k)))
            .filter_map(|k| self.resolve(k).map(|e| (k.as_str(), e.id.as_str())))
            .collect();
        keys.sort();
        keys
    }

    pub fn into_entities(self) -> Vec<CanonicalEntity> {
        self.entities
    }

    fn canonical_index(&self, key: &str) -> Option<usize> {
        self.canonical.get(key).copied()
    }

    fn alias_index(&self, key: &str) -> Option<usize> {
        self.aliases.get(key).copied()
    }

    fn push(&mut self, entity: CanonicalEntity) -> usize {
        let idx = self.entities.len();
        self.canonical.insert(entity.id.clone(), idx);
        self.entities.push(entity);
        idx
    }

    /// 登记次标识别名（首次登记者胜出）
    fn register_alias(&mut self, key: &str, idx: usize) {
        self.aliases.entry(key.to_string()).or_insert(idx);
    }
}

/// 记录的解析键及其来源
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolutionKey {
    Primary(String),
    Secondary(String),
    Synthetic(String),
}

impl ResolutionKey {
    fn as_str(&self) -> &str {
        match self {
            Self::Primary(k) | Self::Secondary(k) | Self::Synthetic(k) => k,
        }
    }
}

// ==========================================
// IdentityResolver - 标识解析器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    synthetic_key_policy: bool,
    refresh_on_duplicate: bool,
}

impl IdentityResolver {
    pub fn new(synthetic_key_policy: bool, refresh_on_duplicate: bool) -> Self {
        Self {
            synthetic_key_policy,
            refresh_on_duplicate,
        }
    }

    /// 解析完整的设备记录序列
    ///
    /// # 参数
    /// - records: 规范化后的设备记录（保持源顺序）
    /// - report: 计数与问题明细写入目标
    ///
    /// # 返回
    /// - IdentityMap: 规范设备集合 + 键映射
    pub fn resolve(
        &self,
        records: &[NormalizedRecord],
        report: &mut ReconciliationReport,
    ) -> IdentityMap {
        let mut map = IdentityMap::new();

        // 输入中出现的全部真实标识,合成标识不得与之重名
        let real_keys: HashSet<String> = records
            .iter()
            .flat_map(|r| IDENTITY_FIELDS.iter().filter_map(|f| r.text(f)))
            .collect();

        for record in records {
            let primary = record.text(fields::PRIMARY_CODE);
            let secondary = record.text(fields::SECONDARY_CODE);

            let key = match (&primary, &secondary) {
                (Some(p), _) => ResolutionKey::Primary(p.clone()),
                (None, Some(s)) => ResolutionKey::Secondary(s.clone()),
                (None, None) => match self.synthetic_key(record) {
                    Some(k) if real_keys.contains(&k) => {
                        report.entities_skipped_incomplete += 1;
                        report.record_issue(
                            IssueKind::IncompleteRecord,
                            "parents",
                            Some(record.row_index),
                            Some(k),
                            "合成标识与真实设备标识重名，已跳过",
                        );
                        continue;
                    }
                    Some(k) => ResolutionKey::Synthetic(k),
                    None => {
                        report.entities_skipped_incomplete += 1;
                        report.record_issue(
                            IssueKind::IncompleteRecord,
                            "parents",
                            Some(record.row_index),
                            None,
                            "设备记录缺少标识字段",
                        );
                        continue;
                    }
                },
            };

            let attributes = attributes_of(record);

            // 主标识只与解析键比对; 仅有次标识时先比对次标识别名
            let existing = match &key {
                ResolutionKey::Primary(k) | ResolutionKey::Synthetic(k) => map.canonical_index(k),
                ResolutionKey::Secondary(k) => {
                    map.alias_index(k).or_else(|| map.canonical_index(k))
                }
            };

            let idx = match existing {
                Some(idx) => {
                    self.absorb_duplicate(&mut map, idx, key.as_str(), record, &attributes, report);
                    idx
                }
                None => {
                    let synthetic = matches!(key, ResolutionKey::Synthetic(_));
                    if synthetic {
                        report.entities_synthesized += 1;
                        report.record_issue(
                            IssueKind::SyntheticIdentity,
                            "parents",
                            Some(record.row_index),
                            Some(key.as_str().to_string()),
                            "无标识字段，已按名称与行号合成标识（后续运行无法去重）",
                        );
                    }
                    debug!(key = %key.as_str(), row = record.row_index, "新建规范设备");
                    map.push(CanonicalEntity {
                        id: key.as_str().to_string(),
                        attributes,
                        source_row: record.row_index,
                        synthetic,
                    })
                }
            };

            if let Some(code) = &secondary {
                map.register_alias(code, idx);
            }
        }

        info!(
            entities = map.len(),
            keys = map.key_count(),
            deduplicated = report.entities_deduplicated,
            refreshed = report.entities_refreshed,
            synthesized = report.entities_synthesized,
            "标识解析完成"
        );
        map
    }

    fn synthetic_key(&self, record: &NormalizedRecord) -> Option<String> {
        if !self.synthetic_key_policy {
            return None;
        }
        record
            .text(SYNTHETIC_BASIS_FIELD)
            .map(|basis| format!("{}_{}", basis, record.row_index))
    }

    fn absorb_duplicate(
        &self,
        map: &mut IdentityMap,
        idx: usize,
        key: &str,
        record: &NormalizedRecord,
        attributes: &EntityAttributes,
        report: &mut ReconciliationReport,
    ) {
        let first_row = map.entities[idx].source_row;
        if self.refresh_on_duplicate {
            let changed = map.entities[idx].attributes.overlay(attributes);
            report.entities_refreshed += 1;
            report.record_issue(
                IssueKind::DuplicateIdentity,
                "parents",
                Some(record.row_index),
                Some(key.to_string()),
                format!("与第 {} 行标识重复，已刷新 {} 个属性", first_row, changed),
            );
        } else {
            report.entities_deduplicated += 1;
            report.record_issue(
                IssueKind::DuplicateIdentity,
                "parents",
                Some(record.row_index),
                Some(key.to_string()),
                format!("与第 {} 行标识重复，已丢弃", first_row),
            );
        }
    }
}

/// 从规范化记录提取设备属性
pub fn attributes_of(record: &NormalizedRecord) -> EntityAttributes {
    EntityAttributes {
        display_name: record.text(fields::DISPLAY_NAME),
        section: record.text(fields::SECTION),
        grade: record.text(fields::GRADE),
        drive_type: record.text(fields::DRIVE_TYPE),
        unmanned_operation: record.text(fields::UNMANNED_OPERATION),
        location: record.text(fields::LOCATION),
        model: record.text(fields::MODEL),
        installation_date: record.date(fields::INSTALLATION_DATE),
        inspection_date: record.date(fields::INSPECTION_DATE),
    }
}
