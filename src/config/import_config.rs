// ==========================================
// 起重机设备台账导入系统 - 导入配置
// ==========================================
// 职责: 单次导入运行的策略开关与参数（含默认值与校验）
// ==========================================

use crate::config::config_manager::parse_toggle;
use crate::domain::types::ConflictPolicy;
use crate::importer::error::{ImportError, ImportResult};
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// 默认分块大小
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// 默认瞬时错误重试次数
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// 默认重试退避基数（毫秒）
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

/// 默认模糊匹配最小长度
pub const DEFAULT_FUZZY_MIN_LENGTH: usize = 2;

// ==========================================
// ImportConfig - 导入配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    // ===== 标识解析 =====
    #[serde(deserialize_with = "deserialize_toggle")]
    pub synthetic_key_policy: bool, // 无标识时合成 `名称_行号`（破坏跨运行去重）
    #[serde(deserialize_with = "deserialize_toggle")]
    pub refresh_on_duplicate: bool, // 运行内重复行逐字段刷新属性

    // ===== 事件关联 =====
    #[serde(deserialize_with = "deserialize_toggle")]
    pub fuzzy_matching: bool,
    pub fuzzy_min_length: usize,
    #[serde(deserialize_with = "deserialize_toggle")]
    pub allow_fallback_distribution: bool, // 轮询兜底分配
    pub default_occurred_on: Option<NaiveDate>, // 事件日期缺失时的替代值（默认不替代）

    // ===== 落库 =====
    pub conflict_policy: ConflictPolicy,
    pub chunk_size: usize,
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,
    pub max_parallel_chunks: usize,
    #[serde(deserialize_with = "deserialize_toggle")]
    pub isolate_rejected_children: bool, // 分块回滚后隔离违规事件,其余重新落库

    // ===== 字段映射 =====
    pub field_aliases: BTreeMap<String, Vec<String>>, // 规范字段 → 追加的源列名
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            synthetic_key_policy: false,
            refresh_on_duplicate: false,
            fuzzy_matching: true,
            fuzzy_min_length: DEFAULT_FUZZY_MIN_LENGTH,
            allow_fallback_distribution: false,
            default_occurred_on: None,
            conflict_policy: ConflictPolicy::SkipExisting,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            max_parallel_chunks: 1,
            isolate_rejected_children: true,
            field_aliases: BTreeMap::new(),
        }
    }
}

impl ImportConfig {
    /// 校验配置值
    ///
    /// # 返回
    /// - Ok(()): 校验通过
    /// - Err(ConfigValueError): 非法值（运行不会开始）
    pub fn validate(&self) -> ImportResult<()> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "0", "分块大小必须为正整数"));
        }
        if self.max_parallel_chunks == 0 {
            return Err(invalid("max_parallel_chunks", "0", "并行分块数必须为正整数"));
        }
        if self.fuzzy_matching && self.fuzzy_min_length == 0 {
            return Err(invalid("fuzzy_min_length", "0", "模糊匹配最小长度必须为正整数"));
        }
        for (field, aliases) in &self.field_aliases {
            if aliases.iter().any(|a| a.trim().is_empty()) {
                return Err(invalid(
                    &format!("field_aliases.{}", field),
                    &aliases.join(","),
                    "别名不能为空",
                ));
            }
        }
        Ok(())
    }

    /// 实际生效的并行度（UPSERT 策略强制串行）
    pub fn effective_parallelism(&self) -> usize {
        if self.conflict_policy.allows_parallel_chunks() {
            self.max_parallel_chunks.max(1)
        } else {
            1
        }
    }
}

/// 开关值: JSON 布尔或 ENABLED/DISABLED 等文本（与 config_kv 写法一致）
fn deserialize_toggle<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Toggle {
        Flag(bool),
        Text(String),
    }

    match Toggle::deserialize(deserializer)? {
        Toggle::Flag(flag) => Ok(flag),
        Toggle::Text(text) => parse_toggle(&text)
            .ok_or_else(|| de::Error::custom(format!("无法识别的开关值 {}", text))),
    }
}

fn invalid(key: &str, value: &str, message: &str) -> ImportError {
    ImportError::ConfigValueError {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.conflict_policy, ConflictPolicy::SkipExisting);
        assert!(!config.synthetic_key_policy);
        assert!(!config.refresh_on_duplicate);
        assert!(!config.allow_fallback_distribution);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = ImportConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ImportError::ConfigValueError { ref key, .. }) if key == "chunk_size"
        ));
    }

    #[test]
    fn test_upsert_forces_serial() {
        let config = ImportConfig {
            conflict_policy: ConflictPolicy::UpsertAttributes,
            max_parallel_chunks: 4,
            ..Default::default()
        };
        assert_eq!(config.effective_parallelism(), 1);

        let config = ImportConfig {
            max_parallel_chunks: 4,
            ..Default::default()
        };
        assert_eq!(config.effective_parallelism(), 4);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: ImportConfig = serde_json::from_str(
            r#"{"conflictPolicy": "UPSERT_ATTRIBUTES", "chunkSize": 50}"#,
        )
        .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::UpsertAttributes);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.retry_limit, DEFAULT_RETRY_LIMIT);
    }

    #[test]
    fn test_deserialize_accepts_config_kv_spellings() {
        let config: ImportConfig = serde_json::from_str(
            r#"{
                "conflictPolicy": "skip-existing",
                "syntheticKeyPolicy": "enabled",
                "fuzzyMatching": "DISABLED",
                "refreshOnDuplicate": true,
                "isolateRejectedChildren": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::SkipExisting);
        assert!(config.synthetic_key_policy);
        assert!(!config.fuzzy_matching);
        assert!(config.refresh_on_duplicate);
        assert!(!config.isolate_rejected_children);
        assert!(!config.allow_fallback_distribution);

        let round_trip: ImportConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);

        assert!(serde_json::from_str::<ImportConfig>(r#"{"fuzzyMatching": "sometimes"}"#).is_err());
    }
}
