// ==========================================
// 起重机设备台账导入系统 - 数据清洗器实现
// ==========================================
// 职责: TRIM / NULL 标准化 / 日期、工时、整数转换
// 说明: 转换失败不报错,返回 None 交由规范化器记录问题
// ==========================================

use crate::domain::record::{format_number, FieldValue};
use crate::importer::equipment_importer_trait::DataCleaner as DataCleanerTrait;
use chrono::{Duration, NaiveDate};

/// 表格导出时空单元格的常见占位文本
const NULL_PLACEHOLDERS: [&str; 4] = ["nan", "none", "null", "nat"];

/// 支持的日期文本格式
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Excel 序列号上限（9999-12-31）
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

pub struct DataCleaner;

impl DataCleanerTrait for DataCleaner {
    fn clean_text(&self, value: &str) -> String {
        value.trim().to_string()
    }

    fn normalize_null(&self, value: Option<String>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() || is_null_placeholder(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn clean_value(&self, value: &FieldValue) -> FieldValue {
        match value {
            FieldValue::Text(s) => self
                .normalize_null(Some(s.clone()))
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Absent),
            FieldValue::Number(n) if !n.is_finite() => FieldValue::Absent,
            other => other.clone(),
        }
    }

    fn parse_date(&self, value: &FieldValue) -> Option<NaiveDate> {
        match self.clean_value(value) {
            FieldValue::Date(d) => Some(d),
            FieldValue::Number(n) => date_from_number(n),
            FieldValue::Text(s) => date_from_text(&s),
            FieldValue::Absent => None,
        }
    }

    fn parse_hours(&self, value: &FieldValue) -> Option<f64> {
        match self.clean_value(value) {
            FieldValue::Number(n) if n >= 0.0 => Some(n),
            FieldValue::Text(s) => hours_from_text(&s),
            _ => None,
        }
    }

    fn parse_integer(&self, value: &FieldValue) -> Option<i64> {
        let n = match self.clean_value(value) {
            FieldValue::Number(n) => n,
            FieldValue::Text(s) => s.replace(',', "").parse::<f64>().ok()?,
            _ => return None,
        };
        if n.is_finite() && n.abs() < i64::MAX as f64 {
            Some(n.trunc() as i64)
        } else {
            None
        }
    }
}

impl DataCleaner {
    /// 单元格值转为文本（编码列常被读成浮点,整数不带小数点）
    pub fn value_to_text(&self, value: &FieldValue) -> Option<String> {
        match self.clean_value(value) {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(n) => Some(format_number(n)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Absent => None,
        }
    }
}

fn is_null_placeholder(value: &str) -> bool {
    NULL_PLACEHOLDERS
        .iter()
        .any(|p| value.eq_ignore_ascii_case(p))
}

/// 数值日期: YYYYMMDD 整数或 Excel 序列号
fn date_from_number(n: f64) -> Option<NaiveDate> {
    if n.fract() == 0.0 && (1_000_01_01.0..=9_999_12_31.0).contains(&n) {
        let digits = format!("{}", n as i64);
        if let Ok(d) = NaiveDate::parse_from_str(&digits, "%Y%m%d") {
            return Some(d);
        }
    }
    if n >= 1.0 && n <= EXCEL_SERIAL_MAX {
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        return epoch.checked_add_signed(Duration::days(n.trunc() as i64));
    }
    None
}

fn date_from_text(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }

    // 日期时间: 取日期部分
    if let Some(prefix) = trimmed.split(|c| c == ' ' || c == 'T').next() {
        if prefix.len() < trimmed.len() {
            if let Some(d) = date_from_text(prefix) {
                return Some(d);
            }
        }
    }

    trimmed.parse::<f64>().ok().and_then(date_from_number)
}

/// 工时文本: "H:MM" / "H:MM:SS" / 小数
fn hours_from_text(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.contains(':') {
        let mut parts = trimmed.split(':');
        let hours = parts.next()?.trim().parse::<u32>().ok()?;
        let minutes = parts.next()?.trim().parse::<u32>().ok()?;
        let seconds = match parts.next() {
            Some(s) => s.trim().parse::<f64>().ok()?,
            None => 0.0,
        };
        if parts.next().is_some() || minutes >= 60 || seconds >= 60.0 {
            return None;
        }
        return Some(hours as f64 + minutes as f64 / 60.0 + seconds / 3600.0);
    }

    trimmed.parse::<f64>().ok().filter(|h| *h >= 0.0 && h.is_finite())
}
