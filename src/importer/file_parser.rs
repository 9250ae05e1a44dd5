// ==========================================
// 起重机设备台账导入系统 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 工作簿: CraneList（设备）/ FailureReport（故障）/ RepairReport（维修）
// 说明: 只负责把单元格搬进 RawRecord,不做类型推断以外的清洗
// ==========================================

use crate::domain::record::{FieldValue, RawRecord};
use crate::importer::equipment_importer_trait::FileParser;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_pipeline::ImportInput;
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// 设备台账工作表
pub const SHEET_CRANE_LIST: &str = "CraneList";
/// 故障报告工作表
pub const SHEET_FAILURE_REPORT: &str = "FailureReport";
/// 维修报告工作表
pub const SHEET_REPAIR_REPORT: &str = "RepairReport";

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRecord>> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result?;
            let pairs: Vec<(String, FieldValue)> = headers
                .iter()
                .zip(row.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, value)| {
                    let value = value.trim();
                    let cell = if value.is_empty() {
                        FieldValue::Absent
                    } else {
                        FieldValue::Text(value.to_string())
                    };
                    (header.clone(), cell)
                })
                .collect();

            if pairs.iter().all(|(_, v)| v.is_absent()) {
                continue;
            }
            records.push(RawRecord::from_pairs(pairs));
        }

        debug!(path = %file_path.display(), rows = records.len(), "CSV 解析完成");
        Ok(records)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ExcelParser {
    sheet: Option<String>, // None 表示第一个工作表
}

impl ExcelParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_sheet(sheet: impl Into<String>) -> Self {
        Self {
            sheet: Some(sheet.into()),
        }
    }
}

impl FileParser for ExcelParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRecord>> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;
        let sheet_name = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?,
        };

        let range = workbook.worksheet_range(&sheet_name)?;
        let records = range_to_records(&range);
        debug!(sheet = %sheet_name, rows = records.len(), "工作表解析完成");
        Ok(records)
    }
}

/// 首行为表头,其余为数据行; 全空行跳过
fn range_to_records(range: &Range<Data>) -> Vec<RawRecord> {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut records = Vec::new();
    for data_row in rows {
        let pairs: Vec<(String, FieldValue)> = headers
            .iter()
            .zip(data_row.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), cell_to_value(cell)))
            .collect();

        if pairs.iter().all(|(_, v)| v.is_absent()) {
            continue;
        }
        records.push(RawRecord::from_pairs(pairs));
    }
    records
}

/// 单元格 → 原始值
///
/// 日期单元格: 序列值 < 1 视为纯时间（输出 `H:MM` 文本）,否则取日期部分
fn cell_to_value(cell: &Data) -> FieldValue {
    match cell {
        Data::Empty | Data::Error(_) => FieldValue::Absent,
        Data::Int(i) => FieldValue::Number(*i as f64),
        Data::Float(f) => FieldValue::Number(*f),
        Data::Bool(b) => FieldValue::Text(b.to_string()),
        Data::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                FieldValue::Absent
            } else {
                FieldValue::Text(s.to_string())
            }
        }
        Data::DateTime(dt) => serial_to_value(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => FieldValue::Text(s.clone()),
    }
}

fn serial_to_value(serial: f64) -> FieldValue {
    if !serial.is_finite() || serial < 0.0 {
        return FieldValue::Absent;
    }
    if serial < 1.0 {
        let minutes = (serial * 24.0 * 60.0).round() as i64;
        return FieldValue::Text(format!("{}:{:02}", minutes / 60, minutes % 60));
    }

    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.trunc() as i64)))
        .map(FieldValue::Date)
        .unwrap_or(FieldValue::Absent)
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRecord>> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.parse_to_raw_records(file_path),
            "xlsx" | "xls" => ExcelParser::new().parse_to_raw_records(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// 读取三表工作簿
///
/// # 说明
/// - CraneList 必须存在
/// - FailureReport / RepairReport 缺失时按空序列处理
pub fn parse_workbook(path: &Path) -> ImportResult<ImportInput> {
    ensure_exists(path)?;
    let ext = extension_of(path);
    if ext != "xlsx" && ext != "xls" {
        return Err(ImportError::UnsupportedFormat(ext));
    }

    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names();

    let mut read_sheet = |name: &str, required: bool| -> ImportResult<Vec<RawRecord>> {
        if !sheet_names.iter().any(|s| s == name) {
            if required {
                return Err(ImportError::ExcelParseError(format!("缺少工作表 {}", name)));
            }
            warn!(sheet = name, "工作表不存在，按空序列处理");
            return Ok(Vec::new());
        }
        let range = workbook.worksheet_range(name)?;
        Ok(range_to_records(&range))
    };

    let input = ImportInput {
        parents: read_sheet(SHEET_CRANE_LIST, true)?,
        failures: read_sheet(SHEET_FAILURE_REPORT, false)?,
        maintenance: read_sheet(SHEET_REPAIR_REPORT, false)?,
    };

    info!(
        path = %path.display(),
        parents = input.parents.len(),
        failures = input.failures.len(),
        maintenance = input.maintenance.len(),
        "工作簿解析完成"
    );
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let file = csv_file(&["EquipmentCode,CraneName,Grade", "A01,Crane A,", "B02,Crane B,G2"]);

        let records = CsvParser.parse_to_raw_records(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("EquipmentCode"), Some(&FieldValue::from("A01")));
        assert_eq!(records[0].get("Grade"), Some(&FieldValue::Absent));
        assert_eq!(records[1].get("Grade"), Some(&FieldValue::from("G2")));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let file = csv_file(&["EquipmentCode,CraneName", "A01,Crane A", ",", "B02,Crane B"]);

        let records = CsvParser.parse_to_raw_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse_to_raw_records(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let result = UniversalFileParser.parse_to_raw_records(Path::new("cranes.json"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(cell_to_value(&Data::Empty), FieldValue::Absent);
        assert_eq!(cell_to_value(&Data::Error(CellErrorType::NA)), FieldValue::Absent);
        assert_eq!(cell_to_value(&Data::Int(7)), FieldValue::Number(7.0));
        assert_eq!(cell_to_value(&Data::String("  ".to_string())), FieldValue::Absent);
        assert_eq!(cell_to_value(&Data::String(" A01 ".to_string())), FieldValue::from("A01"));
    }

    #[test]
    fn test_serial_conversion() {
        assert_eq!(
            serial_to_value(45366.75),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        assert_eq!(serial_to_value(0.5), FieldValue::from("12:00"));
        assert_eq!(serial_to_value(0.0625), FieldValue::from("1:30"));
    }
}
