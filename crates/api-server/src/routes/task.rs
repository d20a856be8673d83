//! Task API endpoints
//!
//! RESTful API for task CRUD operations and paged search.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use tb_core::task::{
    PagedResult, Task, TaskDraft, TaskQueryOptions, TaskStatus, ASSIGNEE_MAX_LEN,
    DEFAULT_PAGE_SIZE, DESCRIPTION_MAX_LEN, NAME_MAX_LEN, NAME_MIN_LEN,
};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Body for both create and update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    #[serde(default)]
    pub search_term: Option<String>,
    /// Blank means "any status"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub status_display_name: &'static str,
    pub assignee: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedTasksResponse {
    pub items: Vec<TaskResponse>,
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOption {
    pub value: TaskStatus,
    pub display_name: &'static str,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            description: task.description,
            status: task.status,
            status_display_name: task.status.display_name(),
            assignee: task.assignee,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}

impl From<PagedResult<Task>> for PagedTasksResponse {
    fn from(page: PagedResult<Task>) -> Self {
        let total_pages = page.total_pages();
        let has_previous_page = page.has_previous_page();
        let has_next_page = page.has_next_page();
        let page = page.map(TaskResponse::from);

        Self {
            items: page.items,
            total_count: page.total_count,
            page_number: page.page_number,
            page_size: page.page_size,
            total_pages,
            has_previous_page,
            has_next_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

type RouteError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Helpers
// ============================================================================

fn not_found(id: Uuid) -> RouteError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Task {} not found", id),
            field: None,
        }),
    )
}

fn invalid_field(field: &'static str, error: impl Into<String>) -> RouteError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
            field: Some(field),
        }),
    )
}

fn service_error(err: tb_core::Error) -> RouteError {
    match err {
        tb_core::Error::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Request cancelled".to_string(),
                field: None,
            }),
        ),
        err => {
            error!("Task request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to process task request".to_string(),
                    field: None,
                }),
            )
        }
    }
}

/// Check field lengths; the service assumes input that already passed.
fn validate(req: &TaskRequest) -> Result<(), RouteError> {
    let name_len = req.name.trim().chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
        return Err(invalid_field(
            "name",
            format!(
                "Name must be between {} and {} characters",
                NAME_MIN_LEN, NAME_MAX_LEN
            ),
        ));
    }

    let too_long = |value: &Option<String>, max: usize| {
        value
            .as_deref()
            .is_some_and(|text| text.trim().chars().count() > max)
    };
    if too_long(&req.description, DESCRIPTION_MAX_LEN) {
        return Err(invalid_field(
            "description",
            format!("Description must be at most {} characters", DESCRIPTION_MAX_LEN),
        ));
    }
    if too_long(&req.assignee, ASSIGNEE_MAX_LEN) {
        return Err(invalid_field(
            "assignee",
            format!("Assignee must be at most {} characters", ASSIGNEE_MAX_LEN),
        ));
    }

    Ok(())
}

impl From<TaskRequest> for TaskDraft {
    fn from(req: TaskRequest) -> Self {
        TaskDraft {
            id: None,
            name: req.name,
            description: req.description,
            assignee: req.assignee,
            status: req.status.unwrap_or_default(),
        }
    }
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<TaskStatus>, RouteError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|err: String| invalid_field("status", err)),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/tasks - List one page of matching tasks
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<PagedTasksResponse>, RouteError> {
    let options = TaskQueryOptions {
        search_term: query.search_term,
        status: parse_status_filter(query.status.as_deref())?,
        page_number: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    };

    let page = state
        .tasks()
        .list_paged(&options, &state.request_token())
        .await
        .map_err(service_error)?;

    Ok(Json(PagedTasksResponse::from(page)))
}

/// POST /api/tasks - Create a new task
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), RouteError> {
    validate(&req)?;

    let created = state
        .tasks()
        .create(req.into(), &state.request_token())
        .await
        .map_err(service_error)?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(created))))
}

/// GET /api/tasks/{id} - Get a single task
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, RouteError> {
    let task = state
        .tasks()
        .get_by_id(id, &state.request_token())
        .await
        .map_err(service_error)?;

    match task {
        Some(t) => Ok(Json(TaskResponse::from(t))),
        None => Err(not_found(id)),
    }
}

/// PUT /api/tasks/{id} - Replace the editable fields of a task
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, RouteError> {
    validate(&req)?;

    let cancel = state.request_token();
    let updated = state
        .tasks()
        .update(id, req.into(), &cancel)
        .await
        .map_err(service_error)?;
    if !updated {
        return Err(not_found(id));
    }

    // Deleted between the write and this read
    let task = state
        .tasks()
        .get_by_id(id, &cancel)
        .await
        .map_err(service_error)?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(TaskResponse::from(task)))
}

/// DELETE /api/tasks/{id} - Delete a task
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RouteError> {
    let deleted = state
        .tasks()
        .delete(id, &state.request_token())
        .await
        .map_err(service_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

/// GET /api/task-statuses - Status values with their labels
async fn list_statuses() -> Json<Vec<StatusOption>> {
    Json(
        TaskStatus::ALL
            .into_iter()
            .map(|status| StatusOption {
                value: status,
                display_name: status.display_name(),
            })
            .collect(),
    )
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/task-statuses", get(list_statuses))
}
