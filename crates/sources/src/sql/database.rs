//! Database collaborator for the SQL guard.

use relay_core::sources::MEMORY_DATABASE;
use relay_core::{AppError, AppResult};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Sample rows shown per table in the schema description.
pub const SAMPLE_ROWS: usize = 3;

/// A database the SQL guard can describe and query.
#[async_trait::async_trait]
pub trait SqlDatabase: Send + Sync {
    /// Dialect name shown to the model.
    fn dialect(&self) -> &str;

    /// Table definitions with a few sample rows each.
    ///
    /// `include` restricts the tables (all when empty); `ignore` removes
    /// tables from the result.
    async fn table_info(&self, include: &[String], ignore: &[String]) -> AppResult<String>;

    /// Run a statement and return its rows as a JSON array.
    async fn run(&self, sql: &str) -> AppResult<String>;
}

/// SQLite database accessed through a single connection.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(path: &str) -> AppResult<Self> {
        let conn = if path == MEMORY_DATABASE {
            Connection::open_in_memory()
        } else {
            Connection::open(Path::new(path))
        }
        .map_err(|e| AppError::Sql(format!("Failed to open database '{}': {}", path, e)))?;

        tracing::debug!("Opened SQL database at {}", path);
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a batch of statements directly (fixtures, migrations).
    pub fn execute_batch(&self, sql: &str) -> AppResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Sql("Database connection lock poisoned".to_string()))?;
        conn.execute_batch(sql)
            .map_err(|e| AppError::Sql(format!("Failed to execute batch: {}", e)))
    }

    async fn blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Sql("Database connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Sql(format!("Database task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    async fn table_info(&self, include: &[String], ignore: &[String]) -> AppResult<String> {
        let include = include.to_vec();
        let ignore = ignore.to_vec();
        self.blocking(move |conn| describe_tables(conn, &include, &ignore))
            .await
    }

    async fn run(&self, sql: &str) -> AppResult<String> {
        let sql = sql.to_string();
        self.blocking(move |conn| run_statement(conn, &sql)).await
    }
}

fn describe_tables(conn: &Connection, include: &[String], ignore: &[String]) -> AppResult<String> {
    let mut stmt = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(|e| AppError::Sql(format!("Failed to list tables: {}", e)))?;

    let tables: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default())))
        .map_err(|e| AppError::Sql(format!("Failed to list tables: {}", e)))?
        .collect::<Result<_, _>>()
        .map_err(|e| AppError::Sql(format!("Failed to read table list: {}", e)))?;

    if let Some(missing) = include.iter().find(|t| !tables.iter().any(|(name, _)| name == *t)) {
        return Err(AppError::Sql(format!("Included table not found: {}", missing)));
    }

    let mut sections = Vec::new();
    for (name, create_sql) in tables {
        if (!include.is_empty() && !include.contains(&name)) || ignore.contains(&name) {
            continue;
        }
        sections.push(format!(
            "{}\n\n/*\n{}\n*/",
            create_sql.trim(),
            sample_rows(conn, &name)?
        ));
    }

    Ok(sections.join("\n\n"))
}

fn sample_rows(conn: &Connection, table: &str) -> AppResult<String> {
    let sql = format!(
        "SELECT * FROM \"{}\" LIMIT {}",
        table.replace('"', "\"\""),
        SAMPLE_ROWS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Sql(format!("Failed to sample table {}: {}", table, e)))?;

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut lines = vec![
        format!("{} rows from {} table:", SAMPLE_ROWS, table),
        columns.join("\t"),
    ];

    let mut rows = stmt
        .query([])
        .map_err(|e| AppError::Sql(format!("Failed to sample table {}: {}", table, e)))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| AppError::Sql(format!("Failed to read sample row: {}", e)))?
    {
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value = row
                .get_ref(i)
                .map_err(|e| AppError::Sql(format!("Failed to read sample cell: {}", e)))?;
            cells.push(match to_json(value) {
                Value::String(s) => s,
                other => other.to_string(),
            });
        }
        lines.push(cells.join("\t"));
    }

    Ok(lines.join("\n"))
}

fn run_statement(conn: &Connection, sql: &str) -> AppResult<String> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Sql(format!("Failed to prepare statement: {}", e)))?;

    if stmt.column_count() == 0 {
        let affected = stmt
            .execute([])
            .map_err(|e| AppError::Sql(format!("Failed to execute statement: {}", e)))?;
        return Ok(serde_json::json!([{ "rowsAffected": affected }]).to_string());
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt
        .query([])
        .map_err(|e| AppError::Sql(format!("Failed to execute query: {}", e)))?;

    let mut records = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| AppError::Sql(format!("Failed to read row: {}", e)))?
    {
        let mut record = Map::new();
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| AppError::Sql(format!("Failed to read column {}: {}", column, e)))?;
            record.insert(column.clone(), to_json(value));
        }
        records.push(Value::Object(record));
    }

    Ok(Value::Array(records).to_string())
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_db() -> SqliteDatabase {
        let db = SqliteDatabase::open(MEMORY_DATABASE).unwrap();
        db.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL);
             INSERT INTO orders (id, total) VALUES (1, 10.5), (2, 20.0), (3, 7.25), (4, 1.0);
             CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO customers (id, name) VALUES (1, 'Ada');",
        )
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_table_info_includes_schema_and_samples() {
        let db = orders_db();
        let info = db.table_info(&[], &[]).await.unwrap();

        assert!(info.contains("CREATE TABLE orders"));
        assert!(info.contains("CREATE TABLE customers"));
        assert!(info.contains("3 rows from orders table:"));
        assert!(info.contains("id\ttotal"));
        assert!(info.contains("1\t10.5"));
        assert!(!info.contains("4\t1.0"));
    }

    #[tokio::test]
    async fn test_table_info_include_and_ignore() {
        let db = orders_db();

        let only_orders = db.table_info(&["orders".to_string()], &[]).await.unwrap();
        assert!(only_orders.contains("CREATE TABLE orders"));
        assert!(!only_orders.contains("customers"));

        let no_orders = db.table_info(&[], &["orders".to_string()]).await.unwrap();
        assert!(!no_orders.contains("CREATE TABLE orders"));
        assert!(no_orders.contains("CREATE TABLE customers"));

        let missing = db.table_info(&["invoices".to_string()], &[]).await;
        assert!(matches!(missing, Err(AppError::Sql(_))));
    }

    #[tokio::test]
    async fn test_run_select_returns_json_rows() {
        let db = orders_db();
        let result = db
            .run("SELECT id, total FROM orders WHERE id <= 2 ORDER BY id")
            .await
            .unwrap();

        let rows: Vec<Value> = serde_json::from_str(&result).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[1]["total"], 20.0);
    }

    #[tokio::test]
    async fn test_run_update_reports_rows_affected() {
        let db = orders_db();
        let result = db.run("UPDATE orders SET total = 0 WHERE id > 2").await.unwrap();
        assert_eq!(result, r#"[{"rowsAffected":2}]"#);
    }

    #[tokio::test]
    async fn test_run_invalid_sql() {
        let db = orders_db();
        assert!(matches!(
            db.run("SELEC nothing").await,
            Err(AppError::Sql(_))
        ));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.sqlite");
        let path = path.to_string_lossy();

        SqliteDatabase::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY); INSERT INTO orders VALUES (1);")
            .unwrap();

        let reopened = SqliteDatabase::open(&path).unwrap();
        assert_eq!(reopened.run("SELECT id FROM orders").await.unwrap(), "[{\"id\":1}]");
    }
}
