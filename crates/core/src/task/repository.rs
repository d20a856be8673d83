//! Task table traits
//!
//! Defines the persistence boundary the task service is written against.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::Task;
use super::query::{TaskFilter, TaskPage};
use crate::Result;

/// A table of task records
#[async_trait]
pub trait TaskTable: Send + Sync {
    /// Count rows matching `filter` and return up to `limit` of them,
    /// ordered by `updated_at` descending then `name`, skipping `offset`.
    async fn query(&self, filter: &TaskFilter, offset: u64, limit: u32) -> Result<TaskPage>;

    /// Get a task by ID
    async fn find(&self, id: Uuid) -> Result<Option<Task>>;

    /// Number of stored tasks
    async fn count(&self) -> Result<u64>;

    /// Open a unit of work
    async fn begin(&self) -> Result<Box<dyn TaskUnitOfWork>>;
}

/// Staged changes against a task table
///
/// Nothing is visible to other readers until `commit` succeeds. Dropping
/// the unit of work discards everything staged on it.
#[async_trait]
pub trait TaskUnitOfWork: Send {
    /// Get a task by ID, as it would look after commit
    async fn find(&mut self, id: Uuid) -> Result<Option<Task>>;

    fn insert(&mut self, task: Task);

    /// Overwrite the mutable fields of an existing task
    fn replace(&mut self, task: Task);

    fn remove(&mut self, id: Uuid);

    /// Apply all staged changes atomically
    async fn commit(&mut self) -> Result<()>;
}

/// A single staged change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskChange {
    Insert(Task),
    Replace(Task),
    Remove(Uuid),
}

impl TaskChange {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Insert(task) | Self::Replace(task) => task.id,
            Self::Remove(id) => *id,
        }
    }
}

/// Ordered list of staged changes, shared by the storage engines
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<TaskChange>,
}

impl ChangeSet {
    pub fn push(&mut self, change: TaskChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn take(&mut self) -> Vec<TaskChange> {
        std::mem::take(&mut self.changes)
    }

    /// Replay staged changes for `id` on top of the stored row.
    pub fn overlay(&self, id: Uuid, stored: Option<Task>) -> Option<Task> {
        self.changes
            .iter()
            .filter(|change| change.id() == id)
            .fold(stored, |current, change| match change {
                TaskChange::Insert(task) => Some(task.clone()),
                TaskChange::Replace(task) => current.map(|_| task.clone()),
                TaskChange::Remove(_) => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use chrono::Utc;

    fn task(name: &str) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            status: TaskStatus::New,
            assignee: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_overlay_replays_in_order() {
        let stored = task("stored");
        let id = stored.id;
        let mut changes = ChangeSet::default();
        assert_eq!(changes.overlay(id, Some(stored.clone())), Some(stored.clone()));

        let renamed = Task {
            name: "renamed".into(),
            ..stored.clone()
        };
        changes.push(TaskChange::Replace(renamed.clone()));
        assert_eq!(changes.overlay(id, Some(stored.clone())), Some(renamed));

        changes.push(TaskChange::Remove(id));
        assert_eq!(changes.overlay(id, Some(stored)), None);
    }

    #[test]
    fn test_overlay_ignores_other_ids() {
        let inserted = task("inserted");
        let mut changes = ChangeSet::default();
        changes.push(TaskChange::Insert(inserted.clone()));

        assert_eq!(changes.overlay(inserted.id, None), Some(inserted));
        assert_eq!(changes.overlay(Uuid::new_v4(), None), None);
    }

    #[test]
    fn test_replace_of_missing_row_stays_missing() {
        let ghost = task("ghost");
        let mut changes = ChangeSet::default();
        changes.push(TaskChange::Replace(ghost.clone()));

        assert_eq!(changes.overlay(ghost.id, None), None);
        assert_eq!(changes.take().len(), 1);
        assert!(changes.is_empty());
    }
}
