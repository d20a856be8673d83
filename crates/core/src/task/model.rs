//! Task model definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a task name, in characters
pub const NAME_MAX_LEN: usize = 50;
/// Minimum length of a trimmed task name, in characters
pub const NAME_MIN_LEN: usize = 3;
/// Maximum length of a task description, in characters
pub const DESCRIPTION_MAX_LEN: usize = 255;
/// Maximum length of an assignee, in characters
pub const ASSIGNEE_MAX_LEN: usize = 50;

/// Task status
///
/// Stored and serialized by variant name, never by ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    New,
    InProgress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::New
    }
}

impl TaskStatus {
    /// Every status, in declaration order
    pub const ALL: [TaskStatus; 3] = [Self::New, Self::InProgress, Self::Completed];

    /// Name used for storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
        }
    }

    /// Human readable label
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A persisted task record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller supplied fields of a task
///
/// Identity and timestamps are assigned by the task service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub status: TaskStatus,
}

impl TaskDraft {
    /// Create a draft with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Request a specific identity on create
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// Trim optional text, mapping blank input to `None`
pub fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
