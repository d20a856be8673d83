//! Application state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tb_core::clock::SystemClock;
use tb_core::storage::Database;
use tb_core::task::{seed_default_tasks, FileTaskTable, SqliteTaskTable, TaskService, TaskTable};

use crate::config::{ServerConfig, StorageKind};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    tasks: TaskService,
    storage: StorageKind,
    shutdown: CancellationToken,
}

impl AppState {
    /// Open the configured task table and seed it if asked to
    pub async fn new(config: &ServerConfig, shutdown: CancellationToken) -> tb_core::Result<Self> {
        let table: Arc<dyn TaskTable> = match config.storage {
            StorageKind::Sqlite => {
                let path = config.data_dir.join("tasks.db");
                let db = tokio::task::spawn_blocking(move || Database::open(&path)).await??;
                Arc::new(SqliteTaskTable::new(db))
            }
            StorageKind::File => {
                Arc::new(FileTaskTable::new(config.data_dir.join("tasks.json")).await?)
            }
            StorageKind::Memory => Arc::new(FileTaskTable::in_memory()),
        };

        if config.seed {
            seed_default_tasks(table.as_ref(), &SystemClock).await?;
        }

        Ok(Self::with_service(
            TaskService::new(table),
            config.storage,
            shutdown,
        ))
    }

    pub fn with_service(tasks: TaskService, storage: StorageKind, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                tasks,
                storage,
                shutdown,
            }),
        }
    }

    /// Get reference to the task service
    pub fn tasks(&self) -> &TaskService {
        &self.inner.tasks
    }

    pub fn storage(&self) -> StorageKind {
        self.inner.storage
    }

    /// Token for one request; cancelled when the server shuts down
    pub fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tb_core::task::TaskQueryOptions;

    async fn seeded_ids(state: &AppState) -> Vec<uuid::Uuid> {
        let page = state
            .tasks()
            .list_paged(&TaskQueryOptions::default(), &state.request_token())
            .await
            .unwrap();
        page.items.into_iter().map(|task| task.id).collect()
    }

    fn config(dir: &TempDir, storage: StorageKind, seed: bool) -> ServerConfig {
        ServerConfig {
            data_dir: dir.path().join("data"),
            storage,
            seed,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn seeds_each_storage_kind_once() {
        for storage in [StorageKind::Sqlite, StorageKind::File, StorageKind::Memory] {
            let dir = TempDir::new().unwrap();
            let cfg = config(&dir, storage, true);

            let state = AppState::new(&cfg, CancellationToken::new()).await.unwrap();
            let first = seeded_ids(&state).await;
            assert_eq!(first.len(), 3, "{:?}", storage);
            assert_eq!(state.storage(), storage);
            drop(state);

            // Persistent engines keep their rows and are not seeded again
            let reopened = AppState::new(&cfg, CancellationToken::new()).await.unwrap();
            let second = seeded_ids(&reopened).await;
            assert_eq!(second.len(), 3, "{:?}", storage);
            assert_eq!(first == second, storage != StorageKind::Memory, "{:?}", storage);
        }
    }

    #[tokio::test]
    async fn seeding_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(&config(&dir, StorageKind::Sqlite, false), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.tasks().table().count().await.unwrap(), 0);
        assert!(dir.path().join("data").join("tasks.db").exists());
    }

    #[tokio::test]
    async fn request_tokens_follow_shutdown() {
        let shutdown = CancellationToken::new();
        let dir = TempDir::new().unwrap();
        let state = AppState::new(&config(&dir, StorageKind::Memory, false), shutdown.clone())
            .await
            .unwrap();

        let token = state.request_token();
        assert!(!token.is_cancelled());
        shutdown.cancel();
        assert!(token.is_cancelled());
        assert!(state.request_token().is_cancelled());
    }
}
