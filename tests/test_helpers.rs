// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、原始行构造、故障注入仓储
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use crane_ledger::domain::{CanonicalEntity, ChildRecord, FieldValue, ImportRunLog, RawRecord};
use crane_ledger::repository::{
    EntityChunkStats, EquipmentImportRepository, EquipmentImportRepositoryImpl, RepositoryError,
    RepositoryResult,
};
use crane_ledger::{CancellationFlag, ConflictPolicy};
use rusqlite::{Connection, OptionalExtension};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// 测试库结构（与生产库一致）
pub const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    INSERT OR IGNORE INTO schema_version (version) VALUES (1);

    CREATE TABLE IF NOT EXISTS config_kv (
        scope_id TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (scope_id, key)
    );

    CREATE TABLE IF NOT EXISTS equipment (
        equipment_id TEXT PRIMARY KEY,
        display_name TEXT,
        section TEXT,
        grade TEXT,
        drive_type TEXT,
        unmanned_operation TEXT,
        location TEXT,
        model TEXT,
        installation_date TEXT,
        inspection_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS equipment_event (
        event_id INTEGER PRIMARY KEY AUTOINCREMENT,
        equipment_id TEXT NOT NULL REFERENCES equipment(equipment_id),
        kind TEXT NOT NULL,
        occurred_on TEXT NOT NULL,
        category TEXT,
        description TEXT,
        severity TEXT,
        technician TEXT,
        duration_hours REAL,
        worker_count INTEGER,
        work_order TEXT,
        area_name TEXT,
        by_device TEXT,
        action_taken TEXT,
        link_tier TEXT NOT NULL,
        source_row INTEGER NOT NULL,
        run_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS import_run (
        run_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        config_json TEXT NOT NULL,
        report_json TEXT NOT NULL,
        resume_json TEXT
    );
"#;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = Connection::open(&db_path)?;
    conn.execute_batch(SCHEMA)?;

    Ok((temp_file, db_path))
}

/// 写入全局配置项
pub fn insert_test_config(db_path: &str, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    let conn = Connection::open(db_path)?;
    conn.execute(
        "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// 直接查询单个计数
pub fn count_rows(db_path: &str, sql: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn entity_exists(db_path: &str, equipment_id: &str) -> bool {
    let conn = Connection::open(db_path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM equipment WHERE equipment_id = ?1",
            [equipment_id],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}

/// 按主键排序的全部设备标识
pub fn entity_ids(db_path: &str) -> Vec<String> {
    let conn = Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT equipment_id FROM equipment ORDER BY equipment_id")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// 事件关联到的设备标识（按来源行）
pub fn event_parents(db_path: &str, kind: &str) -> Vec<(i64, String, String)> {
    let conn = Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT source_row, equipment_id, link_tier FROM equipment_event \
             WHERE kind = ?1 ORDER BY source_row",
        )
        .unwrap();
    stmt.query_map([kind], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// import_run 行
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub config_json: String,
    pub report_json: String,
    pub resume_json: Option<String>,
}

pub fn load_run(db_path: &str, run_id: &str) -> Option<StoredRun> {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(
        "SELECT status, started_at, finished_at, config_json, report_json, resume_json \
         FROM import_run WHERE run_id = ?1",
        [run_id],
        |row| {
            Ok(StoredRun {
                status: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                config_json: row.get(3)?,
                report_json: row.get(4)?,
                resume_json: row.get(5)?,
            })
        },
    )
    .optional()
    .unwrap()
}

// ==========================================
// 原始行构造
// ==========================================

pub fn row(pairs: &[(&str, &str)]) -> RawRecord {
    RawRecord::from_pairs(pairs.iter().map(|(k, v)| (*k, FieldValue::from(*v))))
}

pub fn crane(code: &str, name: &str) -> RawRecord {
    row(&[("EquipmentCode", code), ("CraneName", name)])
}

pub fn failure(crane_code: &str, date: &str) -> RawRecord {
    row(&[
        ("CraneCode", crane_code),
        ("FailureDate", date),
        ("FailureType", "Electrical"),
    ])
}

pub fn repair(crane_code: &str, date: &str) -> RawRecord {
    row(&[
        ("CraneCode", crane_code),
        ("ActualStartDateTime", date),
        ("TaskType", "Preventive"),
    ])
}

// ==========================================
// FaultyRepository - 故障注入仓储
// ==========================================
// 按调用序号注入错误; 未命中的调用转发给真实仓储

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    Fatal,
    UnknownParent, // 引用校验失败,但报告的设备不在该分块中
}

pub struct FaultyRepository {
    inner: EquipmentImportRepositoryImpl,
    entity_faults: Mutex<Vec<(usize, Fault)>>, // (第 N 次设备分块调用, 错误)
    child_faults: Mutex<Vec<(usize, Fault)>>,
    entity_calls: AtomicUsize,
    child_calls: AtomicUsize,
    cancel_on_entity: Option<(usize, CancellationFlag)>, // 第 N 次设备分块调用期间触发取消
    pub run_log_fails: bool,
}

impl FaultyRepository {
    pub fn new(db_path: &str) -> Self {
        Self {
            inner: EquipmentImportRepositoryImpl::new(db_path).unwrap(),
            entity_faults: Mutex::new(Vec::new()),
            child_faults: Mutex::new(Vec::new()),
            entity_calls: AtomicUsize::new(0),
            child_calls: AtomicUsize::new(0),
            cancel_on_entity: None,
            run_log_fails: false,
        }
    }

    pub fn fail_entity_call(self, call: usize, fault: Fault) -> Self {
        self.entity_faults.lock().unwrap().push((call, fault));
        self
    }

    pub fn fail_child_call(self, call: usize, fault: Fault) -> Self {
        self.child_faults.lock().unwrap().push((call, fault));
        self
    }

    pub fn cancel_on_entity_call(mut self, call: usize, flag: CancellationFlag) -> Self {
        self.cancel_on_entity = Some((call, flag));
        self
    }

    pub fn entity_calls(&self) -> usize {
        self.entity_calls.load(Ordering::SeqCst)
    }

    pub fn child_calls(&self) -> usize {
        self.child_calls.load(Ordering::SeqCst)
    }

    fn injected(faults: &Mutex<Vec<(usize, Fault)>>, call: usize) -> Option<RepositoryError> {
        faults
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == call)
            .map(|(_, fault)| match fault {
                Fault::Transient => RepositoryError::Transient("database is locked".to_string()),
                Fault::Fatal => RepositoryError::DatabaseQueryError("disk I/O error".to_string()),
                Fault::UnknownParent => RepositoryError::ReferentialViolation {
                    parent_id: "GHOST".to_string(),
                    source_row: 0,
                },
            })
    }
}

#[async_trait]
impl EquipmentImportRepository for FaultyRepository {
    async fn apply_entity_chunk(
        &self,
        entities: &[CanonicalEntity],
        policy: ConflictPolicy,
    ) -> RepositoryResult<EntityChunkStats> {
        let call = self.entity_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((n, flag)) = &self.cancel_on_entity {
            if *n == call {
                flag.cancel();
            }
        }
        if let Some(err) = Self::injected(&self.entity_faults, call) {
            return Err(err);
        }
        self.inner.apply_entity_chunk(entities, policy).await
    }

    async fn apply_child_chunk(
        &self,
        children: &[ChildRecord],
        run_id: &str,
    ) -> RepositoryResult<usize> {
        let call = self.child_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = Self::injected(&self.child_faults, call) {
            return Err(err);
        }
        self.inner.apply_child_chunk(children, run_id).await
    }

    async fn insert_run_log(&self, log: &ImportRunLog) -> RepositoryResult<()> {
        if self.run_log_fails {
            return Err(RepositoryError::DatabaseQueryError("run log unavailable".to_string()));
        }
        self.inner.insert_run_log(log).await
    }
}
