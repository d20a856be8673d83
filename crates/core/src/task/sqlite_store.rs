//! SQLite-backed task table

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::model::{Task, TaskStatus};
use super::query::{TaskFilter, TaskPage};
use super::repository::{ChangeSet, TaskChange, TaskTable, TaskUnitOfWork};
use crate::storage::Database;
use crate::{Error, Result};

const COLUMNS: &str = "id, name, description, status, assignee, created_at, updated_at";

/// Task table stored in SQLite
#[derive(Clone)]
pub struct SqliteTaskTable {
    db: Database,
}

impl SqliteTaskTable {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

/// Fixed width so that text order matches time order.
fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str, column: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRow {
            column,
            detail: format!("{raw}: {e}"),
        })
}

/// Escape LIKE special characters for use with `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// WHERE clause and its positional parameters for `filter`.
fn where_clause(filter: &TaskFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(term) = filter.search_term() {
        values.push(Value::Text(format!("%{}%", escape_like(term))));
        let n = values.len();
        clauses.push(format!(
            "(name LIKE ?{n} ESCAPE '\\' OR description LIKE ?{n} ESCAPE '\\' OR assignee LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if let Some(status) = filter.status() {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn row_to_task(row: &Row<'_>) -> Result<Task> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Task {
        id: Uuid::parse_str(&id).map_err(|e| Error::CorruptRow {
            column: "id",
            detail: format!("{id}: {e}"),
        })?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: status
            .parse::<TaskStatus>()
            .map_err(|detail| Error::CorruptRow {
                column: "status",
                detail,
            })?,
        assignee: row.get(4)?,
        created_at: decode_timestamp(&created_at, "created_at")?,
        updated_at: decode_timestamp(&updated_at, "updated_at")?,
    })
}

fn select_by_id(conn: &Connection, id: Uuid) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"))?;
    let mut rows = stmt.query([id.to_string()])?;
    let row = rows.next()?;
    row.map(row_to_task).transpose()
}

fn apply(conn: &Connection, change: TaskChange) -> Result<()> {
    match change {
        TaskChange::Insert(task) => {
            conn.execute(
                &format!("INSERT INTO tasks ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    task.id.to_string(),
                    task.name,
                    task.description,
                    task.status.as_str(),
                    task.assignee,
                    encode_timestamp(&task.created_at),
                    encode_timestamp(&task.updated_at),
                ],
            )?;
        }
        TaskChange::Replace(task) => {
            let changed = conn.execute(
                "UPDATE tasks
                 SET name = ?2, description = ?3, status = ?4, assignee = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    task.id.to_string(),
                    task.name,
                    task.description,
                    task.status.as_str(),
                    task.assignee,
                    encode_timestamp(&task.updated_at),
                ],
            )?;
            if changed == 0 {
                return Err(Error::Missing(task.id));
            }
        }
        TaskChange::Remove(id) => {
            let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.to_string()])?;
            if changed == 0 {
                return Err(Error::Missing(id));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl TaskTable for SqliteTaskTable {
    #[instrument(skip(self, filter), fields(search = ?filter.search_term(), status = ?filter.status()))]
    async fn query(&self, filter: &TaskFilter, offset: u64, limit: u32) -> Result<TaskPage> {
        let (clause, values) = where_clause(filter);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        self.blocking(move |db| {
            db.with_conn(|conn| {
                let total_count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM tasks{clause}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;

                let n = values.len();
                let sql = format!(
                    "SELECT {COLUMNS} FROM tasks{clause}
                     ORDER BY updated_at DESC, name ASC
                     LIMIT ?{} OFFSET ?{}",
                    n + 1,
                    n + 2
                );
                let mut paged = values;
                paged.push(Value::Integer(i64::from(limit)));
                paged.push(Value::Integer(offset));

                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params_from_iter(paged.iter()))?;
                let mut items = Vec::new();
                while let Some(row) = rows.next()? {
                    items.push(row_to_task(row)?);
                }

                Ok(TaskPage {
                    total_count: total_count.max(0) as u64,
                    items,
                })
            })
        })
        .await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Task>> {
        self.blocking(move |db| db.with_conn(|conn| select_by_id(conn, id)))
            .await
    }

    async fn count(&self) -> Result<u64> {
        self.blocking(|db| {
            db.with_conn(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
                Ok(count.max(0) as u64)
            })
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn TaskUnitOfWork>> {
        Ok(Box::new(SqliteUnitOfWork {
            table: self.clone(),
            changes: ChangeSet::default(),
        }))
    }
}

struct SqliteUnitOfWork {
    table: SqliteTaskTable,
    changes: ChangeSet,
}

#[async_trait]
impl TaskUnitOfWork for SqliteUnitOfWork {
    async fn find(&mut self, id: Uuid) -> Result<Option<Task>> {
        let stored = self.table.find(id).await?;
        Ok(self.changes.overlay(id, stored))
    }

    fn insert(&mut self, task: Task) {
        self.changes.push(TaskChange::Insert(task));
    }

    fn replace(&mut self, task: Task) {
        self.changes.push(TaskChange::Replace(task));
    }

    fn remove(&mut self, id: Uuid) {
        self.changes.push(TaskChange::Remove(id));
    }

    async fn commit(&mut self) -> Result<()> {
        let changes = self.changes.take();
        if changes.is_empty() {
            return Ok(());
        }
        let staged = changes.len();

        self.table
            .blocking(move |db| {
                db.with_conn_mut(|conn| {
                    let tx = conn.transaction()?;
                    for change in changes {
                        apply(&tx, change)?;
                    }
                    tx.commit()?;
                    Ok(())
                })
            })
            .await?;

        debug!(changes = staged, "committed task changes");
        Ok(())
    }
}
