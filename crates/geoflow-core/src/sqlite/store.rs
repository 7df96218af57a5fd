use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{
    CoreError, CoreErrorKind, ResultId, ResultRecord, TaskId, TaskRecord, TaskStatus, TaskSummary,
    WorkflowId, WorkflowRecord, WorkflowStatus,
};
use crate::persistence::{MigrationStore, PersistenceResult, ResultStore, TaskStore, WorkflowStore};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "geoflow_schema_migrations";

const WORKFLOW_COLUMNS: &str =
    "workflow_id, name, client_id, status, final_result, created_at_unix";

const TASK_COLUMNS: &str = "task_id, workflow_id, client_id, input, task_type, step_number, \
     status, progress, output, result_id, depends_on, created_at_unix";

const RESULT_COLUMNS: &str = "result_id, task_id, data, created_at_unix";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // All DDL uses IF NOT EXISTS, so replaying it repairs a database
                // whose version row survived while tables were dropped.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl WorkflowStore for SqliteStore {
    fn next_workflow_id(&self) -> PersistenceResult<u64> {
        self.with_connection("next_workflow_id", |connection| {
            ensure_schema_ready(connection)?;
            next_id(connection, "SELECT MAX(workflow_id) FROM workflows")
        })
    }

    fn create_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        self.with_connection("create_workflow", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO workflows (workflow_id, name, client_id, status, final_result, created_at_unix)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
",
                params![
                    u64_to_i64(workflow.id.0)?,
                    workflow.name.as_str(),
                    workflow.client_id.as_str(),
                    workflow.status.as_str(),
                    final_result_to_sqlite(workflow.final_result.as_deref())?,
                    to_unix_seconds(workflow.created_at)?,
                ],
            )?;
            Ok(())
        })
    }

    fn update_workflow(&self, workflow: &WorkflowRecord) -> PersistenceResult<()> {
        self.with_connection("update_workflow", |connection| {
            ensure_schema_ready(connection)?;
            let updated = connection.execute(
                "
UPDATE workflows
SET name = ?2, client_id = ?3, status = ?4, final_result = ?5
WHERE workflow_id = ?1
",
                params![
                    u64_to_i64(workflow.id.0)?,
                    workflow.name.as_str(),
                    workflow.client_id.as_str(),
                    workflow.status.as_str(),
                    final_result_to_sqlite(workflow.final_result.as_deref())?,
                ],
            )?;

            if updated == 0 {
                return Err(storage_error_sqlite("workflow id was not found for update"));
            }
            Ok(())
        })
    }

    fn find_workflow(&self, workflow_id: WorkflowId) -> PersistenceResult<Option<WorkflowRecord>> {
        self.with_connection("find_workflow", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE workflow_id = ?1"),
                    params![u64_to_i64(workflow_id.0)?],
                    workflow_from_row,
                )
                .optional()
        })
    }

    fn list_recent_workflows(&self, limit: usize) -> PersistenceResult<Vec<WorkflowRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_recent_workflows", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "
SELECT {WORKFLOW_COLUMNS}
FROM workflows
ORDER BY created_at_unix DESC, workflow_id DESC
LIMIT ?1
"
            ))?;
            let rows = statement.query_map(params![to_i64(limit)?], workflow_from_row)?;
            rows.collect()
        })
    }
}

impl TaskStore for SqliteStore {
    fn next_task_id(&self) -> PersistenceResult<u64> {
        self.with_connection("next_task_id", |connection| {
            ensure_schema_ready(connection)?;
            next_id(connection, "SELECT MAX(task_id) FROM tasks")
        })
    }

    fn create_tasks(&self, tasks: &[TaskRecord]) -> PersistenceResult<()> {
        self.with_connection("create_tasks", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            {
                let mut statement = transaction.prepare(&format!(
                    "INSERT INTO tasks ({TASK_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ))?;

                for task in tasks {
                    statement.execute(params![
                        u64_to_i64(task.id.0)?,
                        u64_to_i64(task.workflow_id.0)?,
                        task.client_id.as_str(),
                        task.input.as_str(),
                        task.task_type.as_str(),
                        i64::from(task.step_number),
                        task.status.as_str(),
                        task.progress.as_deref(),
                        json_to_sqlite(task.output.as_ref())?,
                        task.result_id.map(|id| u64_to_i64(id.0)).transpose()?,
                        task.depends_on.map(|id| u64_to_i64(id.0)).transpose()?,
                        to_unix_seconds(task.created_at)?,
                    ])?;
                }
            }
            transaction.commit()?;
            Ok(())
        })
    }

    fn update_task(&self, task: &TaskRecord) -> PersistenceResult<()> {
        self.with_connection("update_task", |connection| {
            ensure_schema_ready(connection)?;
            write_task_update(connection, task)
        })
    }

    fn find_task(&self, task_id: TaskId) -> PersistenceResult<Option<TaskRecord>> {
        self.with_connection("find_task", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
                    params![u64_to_i64(task_id.0)?],
                    task_from_row,
                )
                .optional()
        })
    }

    fn list_workflow_tasks(&self, workflow_id: WorkflowId) -> PersistenceResult<Vec<TaskRecord>> {
        self.with_connection("list_workflow_tasks", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "
SELECT {TASK_COLUMNS}
FROM tasks
WHERE workflow_id = ?1
ORDER BY step_number, task_id
"
            ))?;
            let rows = statement.query_map(params![u64_to_i64(workflow_id.0)?], task_from_row)?;
            rows.collect()
        })
    }
}

impl ResultStore for SqliteStore {
    fn next_result_id(&self) -> PersistenceResult<u64> {
        self.with_connection("next_result_id", |connection| {
            ensure_schema_ready(connection)?;
            next_id(connection, "SELECT MAX(result_id) FROM results")
        })
    }

    fn commit_result(
        &self,
        result: &ResultRecord,
        completed_task: &TaskRecord,
    ) -> PersistenceResult<()> {
        self.with_connection("commit_result", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                &format!("INSERT INTO results ({RESULT_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
                params![
                    u64_to_i64(result.id.0)?,
                    u64_to_i64(result.task_id.0)?,
                    result.data.as_str(),
                    to_unix_seconds(result.created_at)?,
                ],
            )?;
            write_task_update(&transaction, completed_task)?;
            transaction.commit()?;
            Ok(())
        })
    }

    fn find_result(&self, result_id: ResultId) -> PersistenceResult<Option<ResultRecord>> {
        self.with_connection("find_result", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    &format!("SELECT {RESULT_COLUMNS} FROM results WHERE result_id = ?1"),
                    params![u64_to_i64(result_id.0)?],
                    result_from_row,
                )
                .optional()
        })
    }

    fn list_task_results(&self, task_id: TaskId) -> PersistenceResult<Vec<ResultRecord>> {
        self.with_connection("list_task_results", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM results WHERE task_id = ?1 ORDER BY result_id"
            ))?;
            let rows = statement.query_map(params![u64_to_i64(task_id.0)?], result_from_row)?;
            rows.collect()
        })
    }
}

fn write_task_update(connection: &Connection, task: &TaskRecord) -> rusqlite::Result<()> {
    let updated = connection.execute(
        "
UPDATE tasks
SET status = ?2, progress = ?3, output = ?4, result_id = ?5, depends_on = ?6
WHERE task_id = ?1
",
        params![
            u64_to_i64(task.id.0)?,
            task.status.as_str(),
            task.progress.as_deref(),
            json_to_sqlite(task.output.as_ref())?,
            task.result_id.map(|id| u64_to_i64(id.0)).transpose()?,
            task.depends_on.map(|id| u64_to_i64(id.0)).transpose()?,
        ],
    )?;

    if updated == 0 {
        return Err(storage_error_sqlite("task id was not found for update"));
    }
    Ok(())
}

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRecord> {
    let workflow_id_raw: i64 = row.get(0)?;
    let status_raw: String = row.get(3)?;
    let final_result_raw: Option<String> = row.get(4)?;
    let created_at_unix: i64 = row.get(5)?;

    Ok(WorkflowRecord {
        id: WorkflowId(i64_to_u64(workflow_id_raw)?),
        name: row.get(1)?,
        client_id: row.get(2)?,
        status: parse_workflow_status(&status_raw)?,
        final_result: final_result_raw
            .as_deref()
            .map(parse_json::<Vec<TaskSummary>>)
            .transpose()?,
        created_at: from_unix_seconds(created_at_unix)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let task_id_raw: i64 = row.get(0)?;
    let workflow_id_raw: i64 = row.get(1)?;
    let step_number_raw: i64 = row.get(5)?;
    let status_raw: String = row.get(6)?;
    let output_raw: Option<String> = row.get(8)?;
    let result_id_raw: Option<i64> = row.get(9)?;
    let depends_on_raw: Option<i64> = row.get(10)?;
    let created_at_unix: i64 = row.get(11)?;

    Ok(TaskRecord {
        id: TaskId(i64_to_u64(task_id_raw)?),
        workflow_id: WorkflowId(i64_to_u64(workflow_id_raw)?),
        client_id: row.get(2)?,
        input: row.get(3)?,
        task_type: row.get(4)?,
        step_number: u32::try_from(step_number_raw)
            .map_err(|_| storage_error_sqlite("step number out of range in sqlite record"))?,
        status: parse_task_status(&status_raw)?,
        progress: row.get(7)?,
        output: output_raw
            .as_deref()
            .map(parse_json::<serde_json::Value>)
            .transpose()?,
        result_id: result_id_raw.map(i64_to_u64).transpose()?.map(ResultId),
        depends_on: depends_on_raw.map(i64_to_u64).transpose()?.map(TaskId),
        created_at: from_unix_seconds(created_at_unix)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    let result_id_raw: i64 = row.get(0)?;
    let task_id_raw: i64 = row.get(1)?;
    let created_at_unix: i64 = row.get(3)?;

    Ok(ResultRecord {
        id: ResultId(i64_to_u64(result_id_raw)?),
        task_id: TaskId(i64_to_u64(task_id_raw)?),
        data: row.get(2)?,
        created_at: from_unix_seconds(created_at_unix)?,
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before engine operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn next_id(connection: &Connection, max_query: &str) -> rusqlite::Result<u64> {
    let max_id: Option<i64> = connection.query_row(max_query, [], |row| row.get(0))?;
    match max_id {
        Some(id) => Ok(i64_to_u64(id)?.saturating_add(1)),
        None => Ok(1),
    }
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn parse_task_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    raw.parse::<TaskStatus>().map_err(|_| {
        storage_error_sqlite(&format!("unknown task status '{raw}' in sqlite record"))
    })
}

fn parse_workflow_status(raw: &str) -> rusqlite::Result<WorkflowStatus> {
    raw.parse::<WorkflowStatus>().map_err(|_| {
        storage_error_sqlite(&format!("unknown workflow status '{raw}' in sqlite record"))
    })
}

fn json_to_sqlite(value: Option<&serde_json::Value>) -> rusqlite::Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))
}

fn final_result_to_sqlite(summaries: Option<&[TaskSummary]>) -> rusqlite::Result<Option<String>> {
    summaries
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|error| storage_error_sqlite(&format!("invalid json in sqlite record: {error}")))
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    let seconds = i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))?;
    Ok(seconds)
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    if value < 0 {
        return Err(storage_error_sqlite("negative unix timestamps are not supported"));
    }
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("failed to convert unix timestamp to u64"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn u64_to_i64(value: u64) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("record id exceeds i64 range"))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative record id in sqlite record"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
