#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_engine_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS workflows (
    workflow_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    client_id TEXT NOT NULL,
    status TEXT NOT NULL,
    final_result TEXT,
    created_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id INTEGER PRIMARY KEY,
    workflow_id INTEGER NOT NULL REFERENCES workflows (workflow_id),
    client_id TEXT NOT NULL,
    input TEXT NOT NULL,
    task_type TEXT NOT NULL,
    step_number INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    progress TEXT,
    output TEXT,
    result_id INTEGER,
    depends_on INTEGER REFERENCES tasks (task_id),
    created_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS results (
    result_id INTEGER PRIMARY KEY,
    task_id INTEGER NOT NULL REFERENCES tasks (task_id),
    data TEXT NOT NULL,
    created_at_unix INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_task
    ON results (task_id);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_results_task;
DROP TABLE IF EXISTS results;
DROP TABLE IF EXISTS tasks;
DROP TABLE IF EXISTS workflows;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "unique_workflow_step_numbers",
    up_sql: r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_workflow_step
    ON tasks (workflow_id, step_number);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_tasks_workflow_step;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
