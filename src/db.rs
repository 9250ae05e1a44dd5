// ==========================================
// 起重机设备台账导入系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键校验必须每个连接开启）
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 不做迁移: schema 版本不符时仅告警
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 校验 schema 版本,不一致时仅告警
///
/// # 返回
/// - true: 版本一致
/// - false: 版本缺失或不一致（继续运行）
pub fn check_schema_version(conn: &Connection) -> rusqlite::Result<bool> {
    match read_schema_version(conn)? {
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(true),
        Some(v) => {
            tracing::warn!(
                found = v,
                expected = CURRENT_SCHEMA_VERSION,
                "schema_version 与代码期望不一致，请确认数据库已按当前结构建库"
            );
            Ok(false)
        }
        None => {
            tracing::warn!("数据库缺少 schema_version 表，无法确认结构版本");
            Ok(false)
        }
    }
}

/// 默认数据库路径
///
/// 说明：
/// - 优先使用环境变量 CRANE_LEDGER_DB_PATH
/// - 其次为用户数据目录下 crane-ledger/crane_ledger.db
/// - 都拿不到时回退到当前目录
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("CRANE_LEDGER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    match dirs::data_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("crane-ledger");
            // best-effort: 目录创建失败时由打开连接报错
            let _ = std::fs::create_dir_all(&dir);
            dir.join("crane_ledger.db").to_string_lossy().to_string()
        }
        None => "./crane_ledger.db".to_string(),
    }
}

/// 判断表是否存在
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            [table],
            |_row| Ok(true),
        )
        .optional()?;
    Ok(found.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_schema_version_check() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
        assert!(!check_schema_version(&conn).unwrap());

        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER NOT NULL);
             INSERT INTO schema_version (version) VALUES (1);",
        )
        .unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(1));
        assert!(check_schema_version(&conn).unwrap());
    }

    #[test]
    fn test_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!table_exists(&conn, "config_kv").unwrap());
        conn.execute_batch("CREATE TABLE config_kv (key TEXT);").unwrap();
        assert!(table_exists(&conn, "config_kv").unwrap());
    }

    #[test]
    fn test_default_db_path_not_empty() {
        assert!(default_db_path().ends_with(".db"));
    }
}
