// ==========================================
// 起重机设备台账导入系统 - 行记录模型
// ==========================================
// 用途: 外部解析器产出的原始行 + 规范化后的中间记录
// 生命周期: 仅在单次导入运行内
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// FieldValue - 单元格值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Absent,
}

impl FieldValue {
    /// 空白字符串与显式缺失等价
    pub fn is_absent(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(n) => n.is_nan(),
            FieldValue::Date(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Absent)
    }
}

// ==========================================
// RawRecord - 原始行记录
// ==========================================
// 红线: 只读,由外部解析器产出,规范化器消费一次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: HashMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new(fields: HashMap<String, FieldValue>) -> Self {
        Self { fields }
    }

    /// 由 (列名, 值) 序列构造
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(FieldValue::is_absent)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

// ==========================================
// 规范字段名
// ==========================================
pub mod fields {
    // ===== 设备标识（按顺序尝试）=====
    pub const PRIMARY_CODE: &str = "primaryCode";
    pub const SECONDARY_CODE: &str = "secondaryCode";

    // ===== 设备属性 =====
    pub const DISPLAY_NAME: &str = "displayName";
    pub const SECTION: &str = "section";
    pub const GRADE: &str = "grade";
    pub const DRIVE_TYPE: &str = "driveType";
    pub const UNMANNED_OPERATION: &str = "unmannedOperation";
    pub const LOCATION: &str = "location";
    pub const MODEL: &str = "model";
    pub const INSTALLATION_DATE: &str = "installationDate";
    pub const INSPECTION_DATE: &str = "inspectionDate";

    // ===== 事件字段 =====
    pub const PARENT_REF: &str = "parentRef";
    pub const PARENT_NAME: &str = "parentName";
    pub const OCCURRED_ON: &str = "occurredOn";
    pub const CATEGORY: &str = "category";
    pub const DESCRIPTION: &str = "description";
    pub const SEVERITY: &str = "severity";
    pub const TECHNICIAN: &str = "technician";
    pub const DURATION_HOURS: &str = "durationHours";
    pub const WORKER_COUNT: &str = "workerCount";
    pub const WORK_ORDER: &str = "workOrder";
    pub const AREA_NAME: &str = "areaName";
    pub const BY_DEVICE: &str = "byDevice";
    pub const ACTION_TAKEN: &str = "actionTaken";
}

// ==========================================
// NormalizedRecord - 规范化记录
// ==========================================
// 用途: 规范字段名 → 已类型转换的值（缺失字段不出现）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub row_index: usize, // 源序列内位置（0 起）
    pub values: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: &str, value: FieldValue) {
        if !value.is_absent() {
            self.values.insert(field.to_string(), value);
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        match self.values.get(field)? {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Absent => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.values.get(field).and_then(FieldValue::as_date)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(FieldValue::as_number)
    }
}

/// 整数值不带小数点输出（编码列常被表格软件读成浮点）
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_absent() {
        assert!(FieldValue::Absent.is_absent());
        assert!(FieldValue::Text("   ".to_string()).is_absent());
        assert!(FieldValue::Number(f64::NAN).is_absent());
        assert!(!FieldValue::Text("A01".to_string()).is_absent());
        assert!(!FieldValue::Number(0.0).is_absent());
    }

    #[test]
    fn test_raw_record_from_json() {
        let record: RawRecord = serde_json::from_value(serde_json::json!({
            "EquipmentCode": "A01",
            "TotalWorkers": 3,
            "Grade": null
        }))
        .unwrap();

        assert_eq!(record.get("EquipmentCode"), Some(&FieldValue::Text("A01".to_string())));
        assert_eq!(record.get("TotalWorkers"), Some(&FieldValue::Number(3.0)));
        assert_eq!(record.get("Grade"), Some(&FieldValue::Absent));
    }

    #[test]
    fn test_normalized_record_skips_absent() {
        let mut record = NormalizedRecord::new(0);
        record.insert(fields::PRIMARY_CODE, FieldValue::Text("".to_string()));
        record.insert(fields::SECONDARY_CODE, FieldValue::Number(1001.0));

        assert!(!record.has(fields::PRIMARY_CODE));
        assert_eq!(record.text(fields::SECONDARY_CODE), Some("1001".to_string()));
    }
}
