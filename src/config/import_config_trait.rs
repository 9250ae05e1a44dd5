// ==========================================
// 起重机设备台账导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入
// ==========================================

use crate::config::import_config::ImportConfig;
use crate::domain::types::ConflictPolicy;
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（config_kv 表）/ ImportConfig（内存配置）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 标识解析 =====

    /// 无标识字段时是否合成标识
    ///
    /// # 默认值
    /// - DISABLED
    async fn get_synthetic_key_policy(&self) -> ImportResult<bool>;

    /// 运行内重复行是否刷新已解析设备的属性
    ///
    /// # 默认值
    /// - DISABLED
    async fn get_refresh_on_duplicate(&self) -> ImportResult<bool>;

    // ===== 事件关联 =====

    /// 是否启用模糊匹配层
    ///
    /// # 默认值
    /// - ENABLED
    async fn get_fuzzy_matching(&self) -> ImportResult<bool>;

    /// 模糊匹配最小长度（短于此长度的编码/名称不参与）
    ///
    /// # 默认值
    /// - 2
    async fn get_fuzzy_min_length(&self) -> ImportResult<usize>;

    /// 是否允许轮询兜底分配
    ///
    /// # 默认值
    /// - DISABLED
    async fn get_allow_fallback_distribution(&self) -> ImportResult<bool>;

    /// 事件日期缺失时的替代日期
    ///
    /// # 默认值
    /// - None（日期缺失的事件计为不完整）
    async fn get_default_occurred_on(&self) -> ImportResult<Option<NaiveDate>>;

    // ===== 落库 =====

    /// 设备冲突策略
    ///
    /// # 默认值
    /// - SKIP_EXISTING
    async fn get_conflict_policy(&self) -> ImportResult<ConflictPolicy>;

    /// 分块大小
    ///
    /// # 默认值
    /// - 200
    async fn get_chunk_size(&self) -> ImportResult<usize>;

    /// 瞬时错误重试次数
    ///
    /// # 默认值
    /// - 3
    async fn get_retry_limit(&self) -> ImportResult<u32>;

    /// 重试退避基数（毫秒）
    ///
    /// # 默认值
    /// - 200
    async fn get_retry_backoff_ms(&self) -> ImportResult<u64>;

    /// 最大并行分块数
    ///
    /// # 默认值
    /// - 1
    async fn get_max_parallel_chunks(&self) -> ImportResult<usize>;

    /// 事件分块回滚后是否隔离违规记录并重新落库其余记录
    ///
    /// # 默认值
    /// - ENABLED
    async fn get_isolate_rejected_children(&self) -> ImportResult<bool>;

    // ===== 字段映射 =====

    /// 规范字段的追加源列名
    ///
    /// # 默认值
    /// - 空
    async fn get_field_aliases(&self) -> ImportResult<BTreeMap<String, Vec<String>>>;

    /// 汇总读取并校验完整导入配置
    async fn load_import_config(&self) -> ImportResult<ImportConfig> {
        let config = ImportConfig {
            synthetic_key_policy: self.get_synthetic_key_policy().await?,
            refresh_on_duplicate: self.get_refresh_on_duplicate().await?,
            fuzzy_matching: self.get_fuzzy_matching().await?,
            fuzzy_min_length: self.get_fuzzy_min_length().await?,
            allow_fallback_distribution: self.get_allow_fallback_distribution().await?,
            default_occurred_on: self.get_default_occurred_on().await?,
            conflict_policy: self.get_conflict_policy().await?,
            chunk_size: self.get_chunk_size().await?,
            retry_limit: self.get_retry_limit().await?,
            retry_backoff_ms: self.get_retry_backoff_ms().await?,
            max_parallel_chunks: self.get_max_parallel_chunks().await?,
            isolate_rejected_children: self.get_isolate_rejected_children().await?,
            field_aliases: self.get_field_aliases().await?,
        };
        config.validate()?;
        Ok(config)
    }
}

// ==========================================
// ImportConfig 作为内存配置源
// ==========================================
#[async_trait]
impl ImportConfigReader for ImportConfig {
    async fn get_synthetic_key_policy(&self) -> ImportResult<bool> {
        Ok(self.synthetic_key_policy)
    }

    async fn get_refresh_on_duplicate(&self) -> ImportResult<bool> {
        Ok(self.refresh_on_duplicate)
    }

    async fn get_fuzzy_matching(&self) -> ImportResult<bool> {
        Ok(self.fuzzy_matching)
    }

    async fn get_fuzzy_min_length(&self) -> ImportResult<usize> {
        Ok(self.fuzzy_min_length)
    }

    async fn get_allow_fallback_distribution(&self) -> ImportResult<bool> {
        Ok(self.allow_fallback_distribution)
    }

    async fn get_default_occurred_on(&self) -> ImportResult<Option<NaiveDate>> {
        Ok(self.default_occurred_on)
    }

    async fn get_conflict_policy(&self) -> ImportResult<ConflictPolicy> {
        Ok(self.conflict_policy)
    }

    async fn get_chunk_size(&self) -> ImportResult<usize> {
        Ok(self.chunk_size)
    }

    async fn get_retry_limit(&self) -> ImportResult<u32> {
        Ok(self.retry_limit)
    }

    async fn get_retry_backoff_ms(&self) -> ImportResult<u64> {
        Ok(self.retry_backoff_ms)
    }

    async fn get_max_parallel_chunks(&self) -> ImportResult<usize> {
        Ok(self.max_parallel_chunks)
    }

    async fn get_isolate_rejected_children(&self) -> ImportResult<bool> {
        Ok(self.isolate_rejected_children)
    }

    async fn get_field_aliases(&self) -> ImportResult<BTreeMap<String, Vec<String>>> {
        Ok(self.field_aliases.clone())
    }
}
