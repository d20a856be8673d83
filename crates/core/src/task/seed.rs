//! Demonstration data for an empty task table

use chrono::{Duration, SubsecRound};
use tracing::info;
use uuid::Uuid;

use super::model::{Task, TaskStatus};
use super::repository::TaskTable;
use crate::clock::Clock;
use crate::Result;

/// Insert the starter tasks when `table` is empty.
///
/// Returns how many tasks were inserted, which is zero for a table that
/// already holds anything.
pub async fn seed_default_tasks(table: &dyn TaskTable, clock: &dyn Clock) -> Result<usize> {
    if table.count().await? > 0 {
        return Ok(0);
    }

    // Same precision the task service stamps with
    let now = clock.now().trunc_subsecs(6);
    let starters = [
        (
            "Define domain entities",
            "Document task model and status model.",
            TaskStatus::InProgress,
            "Developer",
            Duration::days(-2),
            Duration::days(-1),
        ),
        (
            "Implement CRUD endpoints",
            "Build create, read, update and delete flows.",
            TaskStatus::New,
            "Developer",
            Duration::days(-1),
            Duration::days(-1),
        ),
        (
            "Prepare documentation",
            "Write up the API and deployment notes.",
            TaskStatus::Completed,
            "Analyst",
            Duration::days(-3),
            Duration::hours(-10),
        ),
    ];

    let mut uow = table.begin().await?;
    for (name, description, status, assignee, created, updated) in starters.iter().cloned() {
        uow.insert(Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some(description.to_string()),
            status,
            assignee: Some(assignee.to_string()),
            created_at: now + created,
            updated_at: now + updated,
        });
    }
    uow.commit().await?;

    info!(count = starters.len(), "Seeded starter tasks");
    Ok(starters.len())
}
