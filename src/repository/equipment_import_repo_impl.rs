// ==========================================
// 起重机设备台账导入系统 - 设备导入 Repository 实现
// ==========================================
// 职责: 实现分块事务写入与运行日志（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::domain::equipment::{CanonicalEntity, ChildRecord, EntityAttributes};
use crate::domain::report::ImportRunLog;
use crate::domain::types::ConflictPolicy;
use crate::repository::equipment_import_repo::{EntityChunkStats, EquipmentImportRepository};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// EquipmentImportRepositoryImpl
// ==========================================
pub struct EquipmentImportRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl EquipmentImportRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（统一 PRAGMA 幂等重放）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn exists_entity_tx(tx: &Transaction, equipment_id: &str) -> RepositoryResult<bool> {
        let found = tx
            .query_row(
                "SELECT 1 FROM equipment WHERE equipment_id = ?1",
                params![equipment_id],
                |_row| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_attributes_tx(
        tx: &Transaction,
        equipment_id: &str,
    ) -> RepositoryResult<Option<EntityAttributes>> {
        let attrs = tx
            .query_row(
                r#"
                SELECT display_name, section, grade, drive_type, unmanned_operation,
                       location, model, installation_date, inspection_date
                FROM equipment WHERE equipment_id = ?1
                "#,
                params![equipment_id],
                |row| {
                    Ok(EntityAttributes {
                        display_name: row.get(0)?,
                        section: row.get(1)?,
                        grade: row.get(2)?,
                        drive_type: row.get(3)?,
                        unmanned_operation: row.get(4)?,
                        location: row.get(5)?,
                        model: row.get(6)?,
                        installation_date: row.get(7)?,
                        inspection_date: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(attrs)
    }

    /// 插入设备（已存在则不动）
    ///
    /// # 返回
    /// - true: 新增
    /// - false: 已存在
    fn insert_entity_tx(tx: &Transaction, entity: &CanonicalEntity, now: &str) -> RepositoryResult<bool> {
        let a = &entity.attributes;
        let changed = tx.execute(
            r#"
            INSERT INTO equipment (
                equipment_id, display_name, section, grade, drive_type,
                unmanned_operation, location, model, installation_date,
                inspection_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT(equipment_id) DO NOTHING
            "#,
            params![
                entity.id,
                a.display_name,
                a.section,
                a.grade,
                a.drive_type,
                a.unmanned_operation,
                a.location,
                a.model,
                a.installation_date,
                a.inspection_date,
                now,
            ],
        )?;
        Ok(changed == 1)
    }

    fn update_attributes_tx(
        tx: &Transaction,
        equipment_id: &str,
        a: &EntityAttributes,
        now: &str,
    ) -> RepositoryResult<()> {
        tx.execute(
            r#"
            UPDATE equipment SET
                display_name = ?2, section = ?3, grade = ?4, drive_type = ?5,
                unmanned_operation = ?6, location = ?7, model = ?8,
                installation_date = ?9, inspection_date = ?10, updated_at = ?11
            WHERE equipment_id = ?1
            "#,
            params![
                equipment_id,
                a.display_name,
                a.section,
                a.grade,
                a.drive_type,
                a.unmanned_operation,
                a.location,
                a.model,
                a.installation_date,
                a.inspection_date,
                now,
            ],
        )?;
        Ok(())
    }

    /// 在事务中按冲突策略写入设备
    fn apply_entities_tx(
        tx: &Transaction,
        entities: &[CanonicalEntity],
        policy: ConflictPolicy,
    ) -> RepositoryResult<EntityChunkStats> {
        let now = Utc::now().to_rfc3339();
        let mut stats = EntityChunkStats::default();

        for entity in entities {
            match policy {
                ConflictPolicy::Fail => {
                    if Self::exists_entity_tx(tx, &entity.id)? {
                        return Err(RepositoryError::EntityConflict {
                            id: entity.id.clone(),
                        });
                    }
                    Self::insert_entity_tx(tx, entity, &now)?;
                    stats.created += 1;
                }
                ConflictPolicy::SkipExisting => {
                    if Self::insert_entity_tx(tx, entity, &now)? {
                        stats.created += 1;
                    } else {
                        stats.skipped_existing += 1;
                    }
                }
                ConflictPolicy::UpsertAttributes => {
                    match Self::load_attributes_tx(tx, &entity.id)? {
                        None => {
                            Self::insert_entity_tx(tx, entity, &now)?;
                            stats.created += 1;
                        }
                        Some(mut stored) => {
                            // 缺失值不覆盖已存储的值
                            if stored.overlay(&entity.attributes) > 0 {
                                Self::update_attributes_tx(tx, &entity.id, &stored, &now)?;
                                stats.updated += 1;
                            } else {
                                stats.skipped_existing += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(stats)
    }

    /// 在事务中追加事件（提交前校验引用）
    fn insert_children_tx(
        tx: &Transaction,
        children: &[ChildRecord],
        run_id: &str,
    ) -> RepositoryResult<usize> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO equipment_event (
                equipment_id, kind, occurred_on, category, description, severity,
                technician, duration_hours, worker_count, work_order, area_name,
                by_device, action_taken, link_tier, source_row, run_id, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17
            )
            "#,
        )?;

        let mut count = 0;
        for child in children {
            if !Self::exists_entity_tx(tx, &child.parent_id)? {
                return Err(RepositoryError::ReferentialViolation {
                    parent_id: child.parent_id.clone(),
                    source_row: child.source_row,
                });
            }

            let a = &child.attributes;
            stmt.execute(params![
                child.parent_id,
                child.kind.as_str(),
                child.occurred_on,
                a.category,
                a.description,
                a.severity,
                a.technician,
                a.duration_hours,
                a.worker_count,
                a.work_order,
                a.area_name,
                a.by_device,
                a.action_taken,
                child.link_tier.as_str(),
                child.source_row as i64,
                run_id,
                now,
            ])?;
            count += 1;
        }

        Ok(count)
    }
}

#[async_trait]
impl EquipmentImportRepository for EquipmentImportRepositoryImpl {
    async fn apply_entity_chunk(
        &self,
        entities: &[CanonicalEntity],
        policy: ConflictPolicy,
    ) -> RepositoryResult<EntityChunkStats> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // 出错时 tx 随作用域结束回滚
        let stats = Self::apply_entities_tx(&tx, entities, policy)?;

        tx.commit()?;
        Ok(stats)
    }

    async fn apply_child_chunk(
        &self,
        children: &[ChildRecord],
        run_id: &str,
    ) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let count = Self::insert_children_tx(&tx, children, run_id)?;

        tx.commit()?;
        Ok(count)
    }

    async fn insert_run_log(&self, log: &ImportRunLog) -> RepositoryResult<()> {
        let resume_json = match &log.resume {
            Some(resume) => Some(serde_json::to_string(resume)?),
            None => None,
        };

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_run (
                run_id, status, started_at, finished_at, config_json, report_json, resume_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.run_id,
                log.status.as_str(),
                log.started_at.to_rfc3339(),
                log.finished_at.to_rfc3339(),
                log.config_json,
                log.report_json,
                resume_json,
            ],
        )?;
        Ok(())
    }
}
