// ==========================================
// 起重机设备台账导入系统 - 导入层
// ==========================================
// 职责: 原始行 → 规范设备 + 已关联事件 → 分块落库 → 对账报告
// 支持: Excel, CSV, 内存行序列
// ==========================================

// 模块声明
pub mod batch_writer;
pub mod data_cleaner;
pub mod equipment_importer_trait;
pub mod error;
pub mod file_parser;
pub mod identity_resolver;
pub mod import_pipeline;
pub mod relationship_linker;
pub mod row_normalizer;

// 重导出核心类型
pub use batch_writer::{BatchWriter, CancellationFlag, PhaseOutcome, WriterSettings};
pub use data_cleaner::DataCleaner as DataCleanerImpl;
pub use error::{ImportError, ImportResult};
pub use file_parser::{parse_workbook, CsvParser, ExcelParser, UniversalFileParser};
pub use identity_resolver::{IdentityMap, IdentityResolver};
pub use import_pipeline::{ImportInput, ImportPipeline};
pub use relationship_linker::{LinkDecision, RelationshipLinker};
pub use row_normalizer::{EntityDescriptor, NormalizeOutcome, RowNormalizer};

// 重导出 Trait 接口
pub use equipment_importer_trait::{DataCleaner, FileParser};
