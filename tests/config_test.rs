// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: config_kv 读取 → ImportConfig → 导入管道
// ==========================================

mod test_helpers;

use crane_ledger::config::{config_keys, ConfigManager, ImportConfigReader};
use crane_ledger::importer::{ImportInput, ImportPipeline};
use crane_ledger::repository::EquipmentImportRepositoryImpl;
use crane_ledger::{ConflictPolicy, ImportError};
use test_helpers::{crane, create_test_db, failure, insert_test_config};

#[tokio::test]
async fn test_defaults_when_table_empty() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let manager = ConfigManager::new(&db_path).unwrap();

    let config = manager.load_import_config().await.unwrap();
    assert_eq!(config, crane_ledger::ImportConfig::default());
}

#[tokio::test]
async fn test_values_from_config_kv() {
    let (_tmp, db_path) = create_test_db().unwrap();
    insert_test_config(&db_path, config_keys::CONFLICT_POLICY, "upsert-attributes").unwrap();
    insert_test_config(&db_path, config_keys::CHUNK_SIZE, "50").unwrap();
    insert_test_config(&db_path, config_keys::ALLOW_FALLBACK_DISTRIBUTION, "ENABLED").unwrap();
    insert_test_config(&db_path, config_keys::DEFAULT_OCCURRED_ON, "2024-01-01").unwrap();
    insert_test_config(&db_path, config_keys::FIELD_ALIASES, r#"{"primaryCode":["설비코드"]}"#)
        .unwrap();

    let config = ConfigManager::new(&db_path)
        .unwrap()
        .load_import_config()
        .await
        .unwrap();

    assert_eq!(config.conflict_policy, ConflictPolicy::UpsertAttributes);
    assert_eq!(config.chunk_size, 50);
    assert!(config.allow_fallback_distribution);
    assert_eq!(
        config.default_occurred_on,
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
    );
    assert_eq!(
        config.field_aliases.get("primaryCode"),
        Some(&vec!["설비코드".to_string()])
    );
    // UPSERT 强制串行
    assert_eq!(config.effective_parallelism(), 1);
}

#[tokio::test]
async fn test_invalid_value_prevents_run() {
    let (_tmp, db_path) = create_test_db().unwrap();
    insert_test_config(&db_path, config_keys::CHUNK_SIZE, "0").unwrap();

    let manager = ConfigManager::new(&db_path).unwrap();
    let repo = EquipmentImportRepositoryImpl::new(&db_path).unwrap();
    let result = ImportPipeline::from_config_reader(repo, &manager).await;
    assert!(matches!(result, Err(ImportError::ConfigValueError { .. })));

    insert_test_config(&db_path, config_keys::CHUNK_SIZE, "many").unwrap();
    let result = manager.load_import_config().await;
    assert!(matches!(result, Err(ImportError::ConfigValueError { .. })));
}

#[tokio::test]
async fn test_default_occurred_on_fills_missing_dates() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let manager = ConfigManager::new(&db_path).unwrap();
    manager
        .set_global_config_value(config_keys::DEFAULT_OCCURRED_ON, "2024-01-01")
        .unwrap();

    let repo = EquipmentImportRepositoryImpl::new(&db_path).unwrap();
    let pipeline = ImportPipeline::from_config_reader(repo, &manager).await.unwrap();

    let input = ImportInput {
        parents: vec![crane("A01", "Crane A")],
        failures: vec![
            failure("A01", "2024-03-01"),
            test_helpers::row(&[("CraneCode", "A01"), ("FailureType", "Mechanical")]),
        ],
        maintenance: Vec::new(),
    };
    let outcome = pipeline.run(input).await.unwrap();

    assert_eq!(outcome.report.children_skipped_incomplete, 0);
    assert_eq!(outcome.report.children_persisted, 2);
    assert_eq!(
        test_helpers::count_rows(
            &db_path,
            "SELECT COUNT(*) FROM equipment_event WHERE occurred_on = '2024-01-01'"
        ),
        1
    );
}
