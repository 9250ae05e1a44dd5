// ==========================================
// 起重机设备台账导入系统 - 领域类型定义
// ==========================================
// 职责: 事件类型 / 关联层级 / 冲突策略 / 运行状态等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

// ==========================================
// 事件类型 (Event Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Failure,     // 故障记录
    Maintenance, // 维修/保养记录
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Failure => "FAILURE",
            EventKind::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 关联层级 (Link Tier)
// ==========================================
// 红线: FALLBACK 只是兜底分配,不代表真实归属
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkTier {
    Exact,    // 编码精确匹配
    Fuzzy,    // 编码/名称模糊匹配
    Fallback, // 轮询兜底分配
}

impl LinkTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkTier::Exact => "EXACT",
            LinkTier::Fuzzy => "FUZZY",
            LinkTier::Fallback => "FALLBACK",
        }
    }

    /// 是否为真实关联（精确/模糊）
    pub fn is_genuine(&self) -> bool {
        !matches!(self, LinkTier::Fallback)
    }
}

impl fmt::Display for LinkTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 设备冲突策略 (Conflict Policy)
// ==========================================
// 默认 SKIP_EXISTING: 重复导入不产生重复行,也不覆盖已有行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictPolicy {
    Fail,             // 已存在即令该分块失败
    #[default]
    SkipExisting,     // 已存在则跳过
    UpsertAttributes, // 已存在则刷新属性（不改主键）
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Fail => "FAIL",
            ConflictPolicy::SkipExisting => "SKIP_EXISTING",
            ConflictPolicy::UpsertAttributes => "UPSERT_ATTRIBUTES",
        }
    }

    /// 解析配置值（兼容 skip-existing / SKIP_EXISTING 两种写法）
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_uppercase().replace('-', "_");
        match normalized.as_str() {
            "FAIL" => Some(ConflictPolicy::Fail),
            "SKIP_EXISTING" => Some(ConflictPolicy::SkipExisting),
            "UPSERT_ATTRIBUTES" => Some(ConflictPolicy::UpsertAttributes),
            _ => None,
        }
    }

    /// 分块之间无共享可变行状态,可并行落库
    pub fn allows_parallel_chunks(&self) -> bool {
        matches!(self, ConflictPolicy::Fail | ConflictPolicy::SkipExisting)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// 反序列化与 config_kv 读取共用 parse 的写法
impl<'de> Deserialize<'de> for ConflictPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ConflictPolicy::parse(&raw).ok_or_else(|| {
            de::Error::custom(format!(
                "未知冲突策略 {}, 应为 FAIL / SKIP_EXISTING / UPSERT_ATTRIBUTES",
                raw
            ))
        })
    }
}

// ==========================================
// 落库阶段 (Write Phase)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WritePhase {
    Entities, // 设备主数据
    Children, // 事件记录
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::Entities => write!(f, "ENTITIES"),
            WritePhase::Children => write!(f, "CHILDREN"),
        }
    }
}

// ==========================================
// 运行状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed, // 全部阶段完成（可能含失败分块）
    Cancelled, // 在分块边界被取消
    Aborted,   // 存储致命错误中止
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 对账问题类型 (Issue Kind)
// ==========================================
// 非致命问题只计数 + 记录,不抛出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    IncompleteRecord,     // 标识字段缺失
    DuplicateIdentity,    // 同一运行内标识重复
    SyntheticIdentity,    // 合成标识（无法跨运行去重）
    FieldCoercion,        // 字段值无法转换,按缺失处理
    AmbiguousFuzzyMatch,  // 模糊匹配多候选
    UnmatchedChild,       // 事件无法关联设备
    ReferentialViolation, // 事件引用的设备不存在
    EntityConflict,       // FAIL 策略下设备已存在
}
