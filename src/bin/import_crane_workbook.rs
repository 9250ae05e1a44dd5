// Import a crane workbook (CraneList / FailureReport / RepairReport) into the ledger database.
//
// Usage:
//   cargo run --bin import_crane_workbook -- [db_path] <workbook.xlsx>
//
// The database schema must already exist. Import settings come from config_kv when the
// table is present, otherwise defaults are used. The run outcome is printed as JSON.

use anyhow::{bail, Context};
use crane_ledger::config::{ConfigManager, ImportConfig, ImportConfigReader};
use crane_ledger::db::{check_schema_version, default_db_path, open_sqlite_connection, table_exists};
use crane_ledger::importer::ImportPipeline;
use crane_ledger::repository::EquipmentImportRepositoryImpl;
use crane_ledger::{logging, ImportError};
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, workbook) = match args.as_slice() {
        [workbook] => (default_db_path(), workbook.clone()),
        [db_path, workbook] => (db_path.clone(), workbook.clone()),
        _ => bail!("usage: import_crane_workbook [db_path] <workbook.xlsx>"),
    };

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("failed to open database {}", db_path))?;
    check_schema_version(&conn)?;
    let has_config = table_exists(&conn, "config_kv")?;
    let conn = Arc::new(Mutex::new(conn));

    let config = if has_config {
        ConfigManager::from_connection(conn.clone())?
            .load_import_config()
            .await?
    } else {
        ImportConfig::default()
    };

    let repo = EquipmentImportRepositoryImpl::from_connection(conn)?;
    let pipeline = ImportPipeline::new(repo, config)?;

    match pipeline.run_workbook(&workbook).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(ImportError::RunAborted {
            cause,
            report,
            resume,
        }) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            bail!(
                "import aborted at {} chunk {}: {}",
                resume.phase,
                resume.chunk_index,
                cause
            )
        }
        Err(e) => Err(e.into()),
    }
}
