//! Task service
//!
//! The single gateway between callers and the task table. Owns identity
//! and timestamp assignment and normalizes caller input before it is
//! stored.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{normalize_optional_text, Task, TaskDraft};
use super::query::{PagedResult, TaskQueryOptions};
use super::repository::{TaskTable, TaskUnitOfWork};
use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Runs `fut` unless `cancel` fires first.
async fn guarded<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

#[derive(Clone)]
pub struct TaskService {
    table: Arc<dyn TaskTable>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(table: Arc<dyn TaskTable>) -> Self {
        Self::with_clock(table, Arc::new(SystemClock))
    }

    pub fn with_clock(table: Arc<dyn TaskTable>, clock: Arc<dyn Clock>) -> Self {
        Self { table, clock }
    }

    pub fn table(&self) -> &Arc<dyn TaskTable> {
        &self.table
    }

    /// Current instant at the precision every table can store.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Commit unless cancellation was requested first.
    ///
    /// The commit runs on its own task, so dropping the caller's future
    /// cannot stop it halfway.
    async fn commit(&self, mut uow: Box<dyn TaskUnitOfWork>, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::spawn(async move { uow.commit().await }).await?
    }

    /// Commit a replace or remove of task `id`.
    ///
    /// Returns `false` when another writer removed the task between our
    /// read and the commit; the store rolls back and nothing is written.
    async fn commit_existing(
        &self,
        uow: Box<dyn TaskUnitOfWork>,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        match self.commit(uow, cancel).await {
            Ok(()) => Ok(true),
            Err(Error::Missing(missing)) if missing == id => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// List one page of tasks matching `options`.
    ///
    /// Paging is clamped rather than rejected, so a page past the end
    /// yields no items.
    pub async fn list_paged(
        &self,
        options: &TaskQueryOptions,
        cancel: &CancellationToken,
    ) -> Result<PagedResult<Task>> {
        let query = options.normalize();
        let page = guarded(
            cancel,
            self.table
                .query(&query.filter, query.offset(), query.page_size),
        )
        .await?;

        info!(
            page = query.page_number,
            page_size = query.page_size,
            total = page.total_count,
            "Loaded tasks page"
        );

        Ok(PagedResult::new(
            page.items,
            page.total_count,
            query.page_number,
            query.page_size,
        ))
    }

    pub async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<Task>> {
        guarded(cancel, self.table.find(id)).await
    }

    /// Store a new task built from `draft`.
    pub async fn create(&self, draft: TaskDraft, cancel: &CancellationToken) -> Result<Task> {
        let now = self.now();
        let task = Task {
            id: draft.id.filter(|id| !id.is_nil()).unwrap_or_else(Uuid::new_v4),
            name: draft.name.trim().to_string(),
            description: normalize_optional_text(draft.description),
            status: draft.status,
            assignee: normalize_optional_text(draft.assignee),
            created_at: now,
            updated_at: now,
        };

        let mut uow = guarded(cancel, self.table.begin()).await?;
        uow.insert(task.clone());
        self.commit(uow, cancel).await?;

        info!(task_id = %task.id, "Task created");
        Ok(task)
    }

    /// Overwrite the editable fields of task `id`.
    ///
    /// Returns `false` without writing when the task does not exist.
    pub async fn update(&self, id: Uuid, draft: TaskDraft, cancel: &CancellationToken) -> Result<bool> {
        let mut uow = guarded(cancel, self.table.begin()).await?;
        let Some(mut current) = guarded(cancel, uow.find(id)).await? else {
            warn!(task_id = %id, "Update skipped. Task was not found");
            return Ok(false);
        };

        current.name = draft.name.trim().to_string();
        current.description = normalize_optional_text(draft.description);
        current.assignee = normalize_optional_text(draft.assignee);
        current.status = draft.status;

        // updated_at must move forward even if the clock has not.
        let now = self.now();
        current.updated_at = if now > current.updated_at {
            now
        } else {
            current.updated_at + Duration::microseconds(1)
        };

        uow.replace(current);
        if !self.commit_existing(uow, id, cancel).await? {
            warn!(task_id = %id, "Update skipped. Task was removed concurrently");
            return Ok(false);
        }

        info!(task_id = %id, "Task updated");
        Ok(true)
    }

    /// Remove task `id`. Returns `false` when it does not exist.
    pub async fn delete(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        let mut uow = guarded(cancel, self.table.begin()).await?;
        if guarded(cancel, uow.find(id)).await?.is_none() {
            warn!(task_id = %id, "Delete skipped. Task was not found");
            return Ok(false);
        }

        uow.remove(id);
        if !self.commit_existing(uow, id, cancel).await? {
            warn!(task_id = %id, "Delete skipped. Task was removed concurrently");
            return Ok(false);
        }

        info!(task_id = %id, "Task deleted");
        Ok(true)
    }
}
