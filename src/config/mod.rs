// ==========================================
// 起重机设备台账导入系统 - 配置层
// ==========================================
// 职责: 导入策略开关与参数,支持内存配置与 config_kv 表两种来源
// 存储: config_kv 表（global scope）
// ==========================================

pub mod config_manager;
pub mod import_config;
pub mod import_config_trait;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use import_config::ImportConfig;
pub use import_config_trait::ImportConfigReader;
