// ==========================================
// 起重机设备台账导入系统 - 行规范化器
// ==========================================
// 职责: 源列名 → 规范字段名映射 + 类型转换 + 必填标识判定
// 红线: 不去重、无副作用（问题随结果返回,由管道计入报告）
// ==========================================

use crate::config::ImportConfig;
use crate::domain::record::{fields, FieldValue, NormalizedRecord, RawRecord};
use crate::domain::types::EventKind;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::equipment_importer_trait::DataCleaner as DataCleanerTrait;

// ===== 事件类型相关的源列 =====
const FAILURE_DATE_SOURCES: &[&str] = &["FailureDate", "date", "Date"];
const FAILURE_CATEGORY_SOURCES: &[&str] = &["FailureType", "failure_type", "type"];
const FAILURE_DESCRIPTION_SOURCES: &[&str] = &["Description", "symptom", "description"];
const MAINTENANCE_DATE_SOURCES: &[&str] = &["ActualStartDateTime", "actualStartDateTime", "date", "Date"];
const MAINTENANCE_CATEGORY_SOURCES: &[&str] = &["TaskType", "taskType", "type"];
const MAINTENANCE_DESCRIPTION_SOURCES: &[&str] = &["TaskName", "taskName", "description"];

// ==========================================
// FieldKind - 规范字段值类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Number,
    Integer,
    Hours, // 小时数或 H:MM
}

// ==========================================
// FieldRule - 单个规范字段的映射规则
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub canonical: &'static str,
    pub sources: Vec<String>, // 按顺序尝试,首个非缺失值生效
    pub kind: FieldKind,
}

impl FieldRule {
    fn new(canonical: &'static str, sources: &[&str], kind: FieldKind) -> Self {
        let mut all = vec![canonical.to_string()];
        all.extend(sources.iter().map(|s| s.to_string()));
        Self {
            canonical,
            sources: all,
            kind,
        }
    }
}

// ==========================================
// EntityDescriptor - 实体类型描述
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub source: &'static str,              // parents / failures / maintenance
    pub rules: Vec<FieldRule>,
    pub mandatory_any: Vec<&'static str>,  // 至少一个有值,否则 Incomplete
}

impl EntityDescriptor {
    /// 设备主数据（CraneList）
    pub fn equipment(config: &ImportConfig) -> Self {
        use FieldKind::*;
        let rules = vec![
            FieldRule::new(fields::PRIMARY_CODE, &["EquipmentCode", "equipment_code"], Text),
            FieldRule::new(fields::SECONDARY_CODE, &["CraneCode", "crane_code", "crane_id"], Text),
            FieldRule::new(fields::DISPLAY_NAME, &["CraneName", "EquipmentName", "crane_name"], Text),
            FieldRule::new(fields::SECTION, &["Plant/Secsion", "Plant/Section", "plant_section"], Text),
            FieldRule::new(fields::GRADE, &["Grade"], Text),
            FieldRule::new(fields::DRIVE_TYPE, &["DriveType", "drive_type"], Text),
            FieldRule::new(fields::UNMANNED_OPERATION, &["UnmannedOperation", "unmanned_operation"], Text),
            FieldRule::new(fields::LOCATION, &["InstallationLocation", "location"], Text),
            FieldRule::new(fields::MODEL, &["HoistingDevice", "model"], Text),
            FieldRule::new(fields::INSTALLATION_DATE, &["InstallationDate", "installation_date"], Date),
            FieldRule::new(fields::INSPECTION_DATE, &["InspectionReferenceDate", "inspection_date"], Date),
        ];

        let mut mandatory_any = vec![fields::PRIMARY_CODE, fields::SECONDARY_CODE];
        if config.synthetic_key_policy {
            mandatory_any.push(fields::DISPLAY_NAME);
        }

        Self {
            source: "parents",
            rules,
            mandatory_any,
        }
        .with_aliases(config)
    }

    /// 事件记录（FailureReport / RepairReport）
    pub fn event(kind: EventKind, config: &ImportConfig) -> Self {
        use FieldKind::*;
        let (source, date_sources, category_sources, description_sources) = match kind {
            EventKind::Failure => (
                "failures",
                FAILURE_DATE_SOURCES,
                FAILURE_CATEGORY_SOURCES,
                FAILURE_DESCRIPTION_SOURCES,
            ),
            EventKind::Maintenance => (
                "maintenance",
                MAINTENANCE_DATE_SOURCES,
                MAINTENANCE_CATEGORY_SOURCES,
                MAINTENANCE_DESCRIPTION_SOURCES,
            ),
        };

        let rules = vec![
            FieldRule::new(fields::PARENT_REF, &["CraneCode", "EquipmentCode", "crane", "crane_id"], Text),
            FieldRule::new(fields::PARENT_NAME, &["CraneName", "EquipmentName"], Text),
            FieldRule::new(fields::OCCURRED_ON, date_sources, Date),
            FieldRule::new(fields::CATEGORY, category_sources, Text),
            FieldRule::new(fields::DESCRIPTION, description_sources, Text),
            FieldRule::new(fields::SEVERITY, &["Severity", "severity"], Text),
            FieldRule::new(fields::TECHNICIAN, &["Technician", "technician", "reported_by"], Text),
            FieldRule::new(fields::DURATION_HOURS, &["TotalWorkTime", "totalWorkTime", "downtime"], Hours),
            FieldRule::new(fields::WORKER_COUNT, &["TotalWorkers", "totalWorkers"], Integer),
            FieldRule::new(fields::WORK_ORDER, &["workOrder", "WorkOrder"], Text),
            FieldRule::new(fields::AREA_NAME, &["areaName", "AreaName"], Text),
            FieldRule::new(fields::BY_DEVICE, &["byDevice", "ByDevice"], Text),
            FieldRule::new(fields::ACTION_TAKEN, &["actionTaken", "ActionTaken"], Text),
        ];

        let mandatory_any = if config.default_occurred_on.is_some() {
            Vec::new()
        } else {
            vec![fields::OCCURRED_ON]
        };

        Self {
            source,
            rules,
            mandatory_any,
        }
        .with_aliases(config)
    }

    /// 追加配置的源列别名（排在内置别名之后）
    fn with_aliases(mut self, config: &ImportConfig) -> Self {
        for rule in &mut self.rules {
            if let Some(extra) = config.field_aliases.get(rule.canonical) {
                for alias in extra {
                    if !rule.sources.iter().any(|s| s == alias) {
                        rule.sources.push(alias.clone());
                    }
                }
            }
        }
        self
    }

    pub fn rule(&self, canonical: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.canonical == canonical)
    }
}

// ==========================================
// 规范化结果
// ==========================================

/// 值存在但无法转换为目标类型（按缺失处理）
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    pub field: &'static str,
    pub source_column: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Normalized {
        record: NormalizedRecord,
        coercion_failures: Vec<CoercionFailure>,
    },
    Incomplete {
        row_index: usize,
        coercion_failures: Vec<CoercionFailure>,
    },
}

// ==========================================
// RowNormalizer - 行规范化器
// ==========================================
pub struct RowNormalizer {
    cleaner: DataCleaner,
}

impl Default for RowNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RowNormalizer {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    /// 规范化单行
    ///
    /// # 参数
    /// - raw: 原始行
    /// - row_index: 源序列内位置（0 起）
    /// - descriptor: 实体类型描述
    pub fn normalize(
        &self,
        raw: &RawRecord,
        row_index: usize,
        descriptor: &EntityDescriptor,
    ) -> NormalizeOutcome {
        let mut record = NormalizedRecord::new(row_index);
        let mut coercion_failures = Vec::new();

        for rule in &descriptor.rules {
            let Some((column, value)) = self.lookup(raw, rule) else {
                continue;
            };

            match self.convert(&value, rule.kind) {
                Some(converted) => record.insert(rule.canonical, converted),
                None => coercion_failures.push(CoercionFailure {
                    field: rule.canonical,
                    source_column: column,
                    raw: self.cleaner.value_to_text(&value).unwrap_or_default(),
                }),
            }
        }

        let complete = !self.is_blank(raw)
            && (descriptor.mandatory_any.is_empty()
                || descriptor.mandatory_any.iter().any(|f| record.has(f)));

        if complete {
            NormalizeOutcome::Normalized {
                record,
                coercion_failures,
            }
        } else {
            NormalizeOutcome::Incomplete {
                row_index,
                coercion_failures,
            }
        }
    }

    /// 所有单元格均为缺失（含占位文本）
    fn is_blank(&self, raw: &RawRecord) -> bool {
        raw.field_names()
            .filter_map(|name| raw.get(name))
            .all(|value| self.cleaner.clean_value(value).is_absent())
    }

    /// 按源列顺序取首个非缺失值（精确匹配优先,其次忽略大小写）
    fn lookup(&self, raw: &RawRecord, rule: &FieldRule) -> Option<(String, FieldValue)> {
        for source in &rule.sources {
            if let Some(value) = raw.get(source) {
                let cleaned = self.cleaner.clean_value(value);
                if !cleaned.is_absent() {
                    return Some((source.clone(), cleaned));
                }
            }
        }

        for source in &rule.sources {
            let found = raw
                .field_names()
                .find(|name| name.trim().eq_ignore_ascii_case(source))
                .map(str::to_string);
            if let Some(name) = found {
                if let Some(value) = raw.get(&name) {
                    let cleaned = self.cleaner.clean_value(value);
                    if !cleaned.is_absent() {
                        return Some((name, cleaned));
                    }
                }
            }
        }
        None
    }

    fn convert(&self, value: &FieldValue, kind: FieldKind) -> Option<FieldValue> {
        match kind {
            FieldKind::Text => self.cleaner.value_to_text(value).map(FieldValue::Text),
            FieldKind::Date => self.cleaner.parse_date(value).map(FieldValue::Date),
            FieldKind::Hours => self.cleaner.parse_hours(value).map(FieldValue::Number),
            FieldKind::Integer => self
                .cleaner
                .parse_integer(value)
                .map(|n| FieldValue::Number(n as f64)),
            FieldKind::Number => match value {
                FieldValue::Number(n) => Some(FieldValue::Number(*n)),
                FieldValue::Text(s) => s.trim().parse::<f64>().ok().map(FieldValue::Number),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn normalized(outcome: NormalizeOutcome) -> NormalizedRecord {
        match outcome {
            NormalizeOutcome::Normalized { record, .. } => record,
            other => panic!("expected normalized record, got {:?}", other),
        }
    }

    #[test]
    fn test_equipment_field_mapping() {
        let descriptor = EntityDescriptor::equipment(&ImportConfig::default());
        let raw = RawRecord::from_pairs([
            ("EquipmentCode", FieldValue::from(" A01 ")),
            ("CraneName", FieldValue::from("Crane A")),
            ("Plant/Secsion", FieldValue::from("1공장")),
            ("InstallationDate", FieldValue::from("2019-05-01")),
        ]);

        let record = normalized(RowNormalizer::new().normalize(&raw, 0, &descriptor));

        assert_eq!(record.text(fields::PRIMARY_CODE), Some("A01".to_string()));
        assert_eq!(record.text(fields::DISPLAY_NAME), Some("Crane A".to_string()));
        assert_eq!(record.text(fields::SECTION), Some("1공장".to_string()));
        assert_eq!(
            record.date(fields::INSTALLATION_DATE),
            NaiveDate::from_ymd_opt(2019, 5, 1)
        );
    }

    #[test]
    fn test_fallback_source_order() {
        let descriptor = EntityDescriptor::equipment(&ImportConfig::default());
        let raw = RawRecord::from_pairs([
            ("CraneName", FieldValue::from("  ")),
            ("EquipmentName", FieldValue::from("Hoist 7")),
            ("EquipmentCode", FieldValue::from("A07")),
        ]);

        let record = normalized(RowNormalizer::new().normalize(&raw, 0, &descriptor));
        assert_eq!(record.text(fields::DISPLAY_NAME), Some("Hoist 7".to_string()));
    }

    #[test]
    fn test_missing_identity_is_incomplete() {
        let descriptor = EntityDescriptor::equipment(&ImportConfig::default());
        let raw = RawRecord::from_pairs([
            ("EquipmentCode", FieldValue::from("nan")),
            ("CraneName", FieldValue::from("Orphan")),
        ]);

        assert!(matches!(
            RowNormalizer::new().normalize(&raw, 4, &descriptor),
            NormalizeOutcome::Incomplete { row_index: 4, .. }
        ));
    }

    #[test]
    fn test_synthetic_policy_accepts_display_name() {
        let config = ImportConfig {
            synthetic_key_policy: true,
            ..Default::default()
        };
        let descriptor = EntityDescriptor::equipment(&config);
        let raw = RawRecord::from_pairs([("CraneName", "Orphan")]);

        let record = normalized(RowNormalizer::new().normalize(&raw, 2, &descriptor));
        assert!(!record.has(fields::PRIMARY_CODE));
        assert_eq!(record.text(fields::DISPLAY_NAME), Some("Orphan".to_string()));
    }

    #[test]
    fn test_numeric_code_rendered_without_decimal() {
        let descriptor = EntityDescriptor::equipment(&ImportConfig::default());
        let raw = RawRecord::from_pairs([("EquipmentCode", FieldValue::Number(1001.0))]);

        let record = normalized(RowNormalizer::new().normalize(&raw, 0, &descriptor));
        assert_eq!(record.text(fields::PRIMARY_CODE), Some("1001".to_string()));
    }

    #[test]
    fn test_event_coercion_failure_recorded() {
        let descriptor = EntityDescriptor::event(EventKind::Maintenance, &ImportConfig::default());
        let raw = RawRecord::from_pairs([
            ("CraneCode", FieldValue::from("A01")),
            ("actualStartDateTime", FieldValue::from("2024-02-01 09:00:00")),
            ("totalWorkTime", FieldValue::from("1:30")),
            ("totalWorkers", FieldValue::from("many")),
        ]);

        match RowNormalizer::new().normalize(&raw, 0, &descriptor) {
            NormalizeOutcome::Normalized {
                record,
                coercion_failures,
            } => {
                assert_eq!(record.date(fields::OCCURRED_ON), NaiveDate::from_ymd_opt(2024, 2, 1));
                assert_eq!(record.number(fields::DURATION_HOURS), Some(1.5));
                assert!(!record.has(fields::WORKER_COUNT));
                assert_eq!(coercion_failures.len(), 1);
                assert_eq!(coercion_failures[0].field, fields::WORKER_COUNT);
                assert_eq!(coercion_failures[0].raw, "many");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_event_without_date_incomplete_unless_default() {
        let raw = RawRecord::from_pairs([("CraneCode", "A01"), ("FailureType", "전기")]);

        let descriptor = EntityDescriptor::event(EventKind::Failure, &ImportConfig::default());
        assert!(matches!(
            RowNormalizer::new().normalize(&raw, 0, &descriptor),
            NormalizeOutcome::Incomplete { .. }
        ));

        let config = ImportConfig {
            default_occurred_on: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        let descriptor = EntityDescriptor::event(EventKind::Failure, &config);
        assert!(matches!(
            RowNormalizer::new().normalize(&raw, 0, &descriptor),
            NormalizeOutcome::Normalized { .. }
        ));
    }

    #[test]
    fn test_configured_alias_and_case_insensitive_lookup() {
        let mut aliases = BTreeMap::new();
        aliases.insert(fields::PRIMARY_CODE.to_string(), vec!["설비코드".to_string()]);
        let config = ImportConfig {
            field_aliases: aliases,
            ..Default::default()
        };
        let descriptor = EntityDescriptor::equipment(&config);

        let raw = RawRecord::from_pairs([("설비코드", "K11"), ("cranename", "Crane K")]);
        let record = normalized(RowNormalizer::new().normalize(&raw, 0, &descriptor));

        assert_eq!(record.text(fields::PRIMARY_CODE), Some("K11".to_string()));
        assert_eq!(record.text(fields::DISPLAY_NAME), Some("Crane K".to_string()));
    }

    #[test]
    fn test_blank_row_incomplete() {
        let descriptor = EntityDescriptor::event(
            EventKind::Failure,
            &ImportConfig {
                default_occurred_on: NaiveDate::from_ymd_opt(2024, 1, 1),
                ..Default::default()
            },
        );
        let raw = RawRecord::from_pairs([("CraneCode", ""), ("FailureDate", "nan")]);

        assert!(matches!(
            RowNormalizer::new().normalize(&raw, 0, &descriptor),
            NormalizeOutcome::Incomplete { .. }
        ));
    }
}
