// ==========================================
// 起重机设备台账导入系统 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道可替换组件的接口（不包含实现）
// 流程: 解析 → 规范化 → 标识解析 → 关联 → 分块落库 → 对账
// ==========================================

use crate::domain::record::{FieldValue, RawRecord};
use crate::importer::error::ImportResult;
use chrono::NaiveDate;
use std::path::Path;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（外部适配器,阶段 0）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(Vec<RawRecord>): 原始记录列表（表头 → 单元格值）
    /// - Err: 文件不存在 / 格式不支持 / 解析失败
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRecord>>;
}

// ==========================================
// DataCleaner Trait
// ==========================================
// 用途: 单元格清洗与类型转换（规范化阶段使用）
// 实现者: DataCleaner
// 约定: 返回 None 表示值存在但无法转换
pub trait DataCleaner: Send + Sync {
    /// 文本清洗（TRIM）
    fn clean_text(&self, value: &str) -> String;

    /// NULL 标准化: 空白与表格导出的占位符（nan/None/null）视为缺失
    fn normalize_null(&self, value: Option<String>) -> Option<String>;

    /// 统一缺失语义后的单元格值
    fn clean_value(&self, value: &FieldValue) -> FieldValue;

    /// 日期解析（多种文本格式 / Excel 序列号 / YYYYMMDD 整数）
    fn parse_date(&self, value: &FieldValue) -> Option<NaiveDate>;

    /// 工时解析（小时数或 H:MM）
    fn parse_hours(&self, value: &FieldValue) -> Option<f64>;

    /// 整数解析（兼容 "3.0"）
    fn parse_integer(&self, value: &FieldValue) -> Option<i64>;
}
