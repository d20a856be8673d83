//! File-backed task table
//!
//! Keeps tasks in memory and, when given a path, rewrites them as JSON
//! after every commit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::model::Task;
use super::query::{listing_order, TaskFilter, TaskPage};
use super::repository::{ChangeSet, TaskChange, TaskTable, TaskUnitOfWork};
use crate::{Error, Result};

/// Task table held in memory, optionally mirrored to a JSON file
#[derive(Clone)]
pub struct FileTaskTable {
    inner: Arc<Inner>,
}

struct Inner {
    /// Path to the JSON file, `None` for a purely in-memory table
    path: Option<PathBuf>,
    cache: RwLock<HashMap<Uuid, Task>>,
}

impl FileTaskTable {
    /// Open a table backed by `path`
    ///
    /// If the file doesn't exist, it will be created on first commit.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let tasks: Vec<Task> = serde_json::from_str(&content)?;
            tasks.into_iter().map(|t| (t.id, t)).collect()
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), tasks = cache.len(), "Opened task file");

        Ok(Self {
            inner: Arc::new(Inner {
                path: Some(path),
                cache: RwLock::new(cache),
            }),
        })
    }

    /// A table that never touches disk
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Inner {
                path: None,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl Inner {
    /// Write `tasks` to disk, replacing the previous file in one rename
    async fn persist(&self, tasks: &HashMap<Uuid, Task>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut ordered: Vec<&Task> = tasks.values().collect();
        ordered.sort_by(|a, b| listing_order(a, b));
        let content = serde_json::to_string_pretty(&ordered)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

fn apply(tasks: &mut HashMap<Uuid, Task>, change: TaskChange) -> Result<()> {
    match change {
        TaskChange::Insert(task) => {
            if tasks.contains_key(&task.id) {
                return Err(Error::Storage(format!(
                    "Task with ID {} already exists",
                    task.id
                )));
            }
            tasks.insert(task.id, task);
        }
        TaskChange::Replace(task) => {
            let existing = tasks
                .get_mut(&task.id)
                .ok_or(Error::Missing(task.id))?;
            existing.name = task.name;
            existing.description = task.description;
            existing.status = task.status;
            existing.assignee = task.assignee;
            existing.updated_at = task.updated_at;
        }
        TaskChange::Remove(id) => {
            if tasks.remove(&id).is_none() {
                return Err(Error::Missing(id));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl TaskTable for FileTaskTable {
    async fn query(&self, filter: &TaskFilter, offset: u64, limit: u32) -> Result<TaskPage> {
        let cache = self.inner.cache.read().await;
        let mut matching: Vec<&Task> = cache.values().filter(|t| filter.matches(t)).collect();
        let total_count = matching.len() as u64;

        matching.sort_by(|a, b| listing_order(a, b));
        let items = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(TaskPage { total_count, items })
    }

    async fn find(&self, id: Uuid) -> Result<Option<Task>> {
        let cache = self.inner.cache.read().await;
        Ok(cache.get(&id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        let cache = self.inner.cache.read().await;
        Ok(cache.len() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn TaskUnitOfWork>> {
        Ok(Box::new(FileUnitOfWork {
            inner: Arc::clone(&self.inner),
            changes: ChangeSet::default(),
        }))
    }
}

struct FileUnitOfWork {
    inner: Arc<Inner>,
    changes: ChangeSet,
}

#[async_trait]
impl TaskUnitOfWork for FileUnitOfWork {
    async fn find(&mut self, id: Uuid) -> Result<Option<Task>> {
        let stored = self.inner.cache.read().await.get(&id).cloned();
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

        // Build the next state aside so a failed change or write leaves
        // the table untouched.
        let mut cache = self.inner.cache.write().await;
        let mut next = cache.clone();
        for change in changes {
            apply(&mut next, change)?;
        }
        self.inner.persist(&next).await?;
        *cache = next;
        Ok(())
    }
}
