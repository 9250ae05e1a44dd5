// ==========================================
// 起重机设备台账导入系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 瞬时错误（可重试）/ 分块级错误（回滚分块）/ 致命错误（中止运行）
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 瞬时错误（可重试）=====
    #[error("数据库暂时不可用: {0}")]
    Transient(String),

    // ===== 分块级错误 =====
    #[error("引用校验失败 (源行 {source_row}): 设备 {parent_id} 不存在")]
    ReferentialViolation { parent_id: String, source_row: usize },

    #[error("设备已存在 (冲突策略 FAIL): {id}")]
    EntityConflict { id: String },

    // ===== 数据库错误 =====
    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("序列化失败: {0}")]
    SerializationError(String),
}

impl RepositoryError {
    /// 是否可按退避策略重试
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }

    /// 是否只影响当前分块（回滚后运行继续）
    pub fn is_chunk_scoped(&self) -> bool {
        matches!(
            self,
            RepositoryError::ReferentialViolation { .. }
                | RepositoryError::EntityConflict { .. }
                | RepositoryError::ForeignKeyViolation(_)
                | RepositoryError::UniqueConstraintViolation(_)
        )
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                RepositoryError::Transient(err.to_string())
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::SqliteFailure(e, None) => {
                RepositoryError::DatabaseQueryError(e.to_string())
            }
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int, msg: Option<&str>) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            msg.map(|m| m.to_string()),
        )
    }

    #[test]
    fn test_busy_is_transient() {
        let err: RepositoryError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY, None).into();
        assert!(err.is_transient());

        let err: RepositoryError =
            sqlite_failure(rusqlite::ffi::SQLITE_LOCKED, Some("database table is locked")).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_foreign_key_is_chunk_scoped() {
        let err: RepositoryError = sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT,
            Some("FOREIGN KEY constraint failed"),
        )
        .into();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
        assert!(err.is_chunk_scoped());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_query_error_is_fatal() {
        let err: RepositoryError =
            sqlite_failure(rusqlite::ffi::SQLITE_ERROR, Some("no such table: equipment")).into();
        assert!(!err.is_transient());
        assert!(!err.is_chunk_scoped());
    }
}
