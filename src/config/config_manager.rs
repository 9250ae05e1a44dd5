// ==========================================
// 起重机设备台账导入系统 - 配置管理器
// ==========================================
// 职责: 从 config_kv 表读取导入配置（global scope）,缺省取默认值
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_FUZZY_MIN_LENGTH, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_RETRY_LIMIT,
};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::ConflictPolicy;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 写入 global scope 配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值,缺省时返回默认值
    fn get_parsed<T>(
        &self,
        key: &str,
        default: T,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> ImportResult<T> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => parse(raw.trim()).ok_or_else(|| ImportError::ConfigValueError {
                key: key.to_string(),
                value: raw.clone(),
                message: format!("期望 {}", expected),
            }),
        }
    }

    fn get_toggle(&self, key: &str, default: bool) -> ImportResult<bool> {
        self.get_parsed(key, default, parse_toggle, "ENABLED/DISABLED")
    }

    fn get_number<T: FromStr>(&self, key: &str, default: T) -> ImportResult<T> {
        self.get_parsed(key, default, |v| v.parse::<T>().ok(), "非负整数")
    }
}

/// 解析开关值（ENABLED/DISABLED 及常见同义写法）
pub fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_uppercase().as_str() {
        "ENABLED" | "ENABLE" | "TRUE" | "1" | "Y" | "YES" | "ON" => Some(true),
        "DISABLED" | "DISABLE" | "FALSE" | "0" | "N" | "NO" | "OFF" => Some(false),
        _ => None,
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    // ===== 标识解析 =====

    async fn get_synthetic_key_policy(&self) -> ImportResult<bool> {
        self.get_toggle(config_keys::SYNTHETIC_KEY_POLICY, false)
    }

    async fn get_refresh_on_duplicate(&self) -> ImportResult<bool> {
        self.get_toggle(config_keys::REFRESH_ON_DUPLICATE, false)
    }

    // ===== 事件关联 =====

    async fn get_fuzzy_matching(&self) -> ImportResult<bool> {
        self.get_toggle(config_keys::FUZZY_MATCHING, true)
    }

    async fn get_fuzzy_min_length(&self) -> ImportResult<usize> {
        self.get_number(config_keys::FUZZY_MIN_LENGTH, DEFAULT_FUZZY_MIN_LENGTH)
    }

    async fn get_allow_fallback_distribution(&self) -> ImportResult<bool> {
        self.get_toggle(config_keys::ALLOW_FALLBACK_DISTRIBUTION, false)
    }

    async fn get_default_occurred_on(&self) -> ImportResult<Option<NaiveDate>> {
        self.get_parsed(
            config_keys::DEFAULT_OCCURRED_ON,
            None,
            |v| {
                if v.is_empty() {
                    Some(None)
                } else {
                    NaiveDate::parse_from_str(v, "%Y-%m-%d").ok().map(Some)
                }
            },
            "YYYY-MM-DD",
        )
    }

    // ===== 落库 =====

    async fn get_conflict_policy(&self) -> ImportResult<ConflictPolicy> {
        self.get_parsed(
            config_keys::CONFLICT_POLICY,
            ConflictPolicy::default(),
            ConflictPolicy::parse,
            "FAIL/SKIP_EXISTING/UPSERT_ATTRIBUTES",
        )
    }

    async fn get_chunk_size(&self) -> ImportResult<usize> {
        self.get_number(config_keys::CHUNK_SIZE, DEFAULT_CHUNK_SIZE)
    }

    async fn get_retry_limit(&self) -> ImportResult<u32> {
        self.get_number(config_keys::RETRY_LIMIT, DEFAULT_RETRY_LIMIT)
    }

    async fn get_retry_backoff_ms(&self) -> ImportResult<u64> {
        self.get_number(config_keys::RETRY_BACKOFF_MS, DEFAULT_RETRY_BACKOFF_MS)
    }

    async fn get_max_parallel_chunks(&self) -> ImportResult<usize> {
        self.get_number(config_keys::MAX_PARALLEL_CHUNKS, 1)
    }

    async fn get_isolate_rejected_children(&self) -> ImportResult<bool> {
        self.get_toggle(config_keys::ISOLATE_REJECTED_CHILDREN, true)
    }

    // ===== 字段映射 =====

    async fn get_field_aliases(&self) -> ImportResult<BTreeMap<String, Vec<String>>> {
        self.get_parsed(
            config_keys::FIELD_ALIASES,
            BTreeMap::new(),
            |v| serde_json::from_str(v).ok(),
            r#"JSON 对象，如 {"primaryCode": ["설비코드"]}"#,
        )
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 标识解析
    pub const SYNTHETIC_KEY_POLICY: &str = "import.synthetic_key_policy";
    pub const REFRESH_ON_DUPLICATE: &str = "import.refresh_on_duplicate";

    // 事件关联
    pub const FUZZY_MATCHING: &str = "import.fuzzy_matching";
    pub const FUZZY_MIN_LENGTH: &str = "import.fuzzy_min_length";
    pub const ALLOW_FALLBACK_DISTRIBUTION: &str = "import.allow_fallback_distribution";
    pub const DEFAULT_OCCURRED_ON: &str = "import.default_occurred_on";

    // 落库
    pub const CONFLICT_POLICY: &str = "import.conflict_policy";
    pub const CHUNK_SIZE: &str = "import.chunk_size";
    pub const RETRY_LIMIT: &str = "import.retry_limit";
    pub const RETRY_BACKOFF_MS: &str = "import.retry_backoff_ms";
    pub const MAX_PARALLEL_CHUNKS: &str = "import.max_parallel_chunks";
    pub const ISOLATE_REJECTED_CHILDREN: &str = "import.isolate_rejected_children";

    // 字段映射（JSON）
    pub const FIELD_ALIASES: &str = "import.field_aliases";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_id, key)
            );
            "#,
        )
        .unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle("enabled"), Some(true));
        assert_eq!(parse_toggle("DISABLED"), Some(false));
        assert_eq!(parse_toggle("1"), Some(true));
        assert_eq!(parse_toggle("maybe"), None);
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let manager = create_manager();
        let config = manager.load_import_config().await.unwrap();
        assert_eq!(config, crate::config::ImportConfig::default());
    }

    #[tokio::test]
    async fn test_reads_overrides() {
        let manager = create_manager();
        manager.set_global_config_value(config_keys::CONFLICT_POLICY, "upsert-attributes").unwrap();
        manager.set_global_config_value(config_keys::CHUNK_SIZE, "25").unwrap();
        manager.set_global_config_value(config_keys::ALLOW_FALLBACK_DISTRIBUTION, "ENABLED").unwrap();
        manager
            .set_global_config_value(config_keys::FIELD_ALIASES, r#"{"primaryCode": ["설비코드"]}"#)
            .unwrap();

        let config = manager.load_import_config().await.unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::UpsertAttributes);
        assert_eq!(config.chunk_size, 25);
        assert!(config.allow_fallback_distribution);
        assert_eq!(config.field_aliases["primaryCode"], vec!["설비코드".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_value_surfaces() {
        let manager = create_manager();
        manager.set_global_config_value(config_keys::RETRY_LIMIT, "-1").unwrap();

        let result = manager.load_import_config().await;
        assert!(matches!(
            result,
            Err(ImportError::ConfigValueError { ref key, .. }) if key == config_keys::RETRY_LIMIT
        ));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_fails_validation() {
        let manager = create_manager();
        manager.set_global_config_value(config_keys::CHUNK_SIZE, "0").unwrap();

        assert!(manager.load_import_config().await.is_err());
    }
}
