//! Query options, filters and paged results for task listings

use std::cmp::Ordering;

use super::model::{Task, TaskStatus};

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Largest page a caller can request
pub const MAX_PAGE_SIZE: i64 = 50;

/// Raw listing request, as received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQueryOptions {
    pub search_term: Option<String>,
    pub status: Option<TaskStatus>,
    pub page_number: i64,
    pub page_size: i64,
}

impl Default for TaskQueryOptions {
    fn default() -> Self {
        Self {
            search_term: None,
            status: None,
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TaskQueryOptions {
    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_page(mut self, page_number: i64, page_size: i64) -> Self {
        self.page_number = page_number;
        self.page_size = page_size;
        self
    }

    /// Clamp paging into range and build the filter predicate.
    pub fn normalize(&self) -> NormalizedQuery {
        let page_number = self.page_number.clamp(1, i64::from(u32::MAX)) as u32;
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE) as u32;

        NormalizedQuery {
            filter: TaskFilter::new(self.search_term.as_deref(), self.status),
            page_number,
            page_size,
        }
    }
}

/// Listing request after clamping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub filter: TaskFilter,
    /// 1-based
    pub page_number: u32,
    /// Within `1..=MAX_PAGE_SIZE`
    pub page_size: u32,
}

impl NormalizedQuery {
    /// Number of matching records to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number - 1) * u64::from(self.page_size)
    }
}

/// Predicate over task records
///
/// A blank search term matches everything. Search is a case-insensitive
/// substring match over name, description and assignee, folding ASCII
/// letters only. Conditions combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    search_term: Option<String>,
    status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn new(search_term: Option<&str>, status: Option<TaskStatus>) -> Self {
        let search_term = search_term
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string);
        Self {
            search_term,
            status,
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.status
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }

        let Some(term) = self.search_term.as_deref() else {
            return true;
        };
        let needle = term.to_ascii_lowercase();
        let hit = |value: &str| value.to_ascii_lowercase().contains(&needle);

        hit(&task.name)
            || task.description.as_deref().is_some_and(hit)
            || task.assignee.as_deref().is_some_and(hit)
    }
}

/// Listing order: most recently updated first, then by name.
pub fn listing_order(a: &Task, b: &Task) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.name.cmp(&b.name))
}

/// One page of matching rows as returned by a task table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPage {
    /// Matching rows before paging
    pub total_count: u64,
    pub items: Vec<Task>,
}

/// A page of results plus the metadata to navigate around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page_number: u32, page_size: u32) -> Self {
        Self {
            items,
            total_count,
            page_number,
            page_size,
        }
    }

    /// `max(1, ceil(total_count / page_size))`
    pub fn total_pages(&self) -> u64 {
        let page_size = u64::from(self.page_size.max(1));
        self.total_count.div_ceil(page_size).max(1)
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_number) < self.total_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn task(name: &str, description: Option<&str>, assignee: Option<&str>) -> Task {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            status: TaskStatus::New,
            assignee: assignee.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_normalize_clamps_paging() {
        let query = TaskQueryOptions::default().with_page(-4, 0).normalize();
        assert_eq!(query.page_number, 1);
        assert_eq!(query.page_size, 1);
        assert_eq!(query.offset(), 0);

        let query = TaskQueryOptions::default().with_page(3, 500).normalize();
        assert_eq!(query.page_number, 3);
        assert_eq!(i64::from(query.page_size), MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 100);
    }

    #[test]
    fn test_default_options() {
        let query = TaskQueryOptions::default().normalize();
        assert_eq!(query.page_number, 1);
        assert_eq!(query.page_size, 10);
        assert_eq!(query.filter, TaskFilter::default());
    }

    #[test]
    fn test_blank_search_term_is_dropped() {
        let filter = TaskFilter::new(Some("   "), None);
        assert_eq!(filter.search_term(), None);

        let filter = TaskFilter::new(Some("  alpha "), None);
        assert_eq!(filter.search_term(), Some("alpha"));
    }

    #[test]
    fn test_search_covers_all_text_fields() {
        let filter = TaskFilter::new(Some("QA"), None);

        assert!(filter.matches(&task("qa sweep", None, None)));
        assert!(filter.matches(&task("Sweep", Some("ask qa first"), None)));
        assert!(filter.matches(&task("Sweep", None, Some("Qa Team"))));
        assert!(!filter.matches(&task("Sweep", None, None)));
    }

    #[test]
    fn test_status_and_search_combine() {
        let filter = TaskFilter::new(Some("task"), Some(TaskStatus::Completed));
        let mut done = task("Task done", None, None);
        done.status = TaskStatus::Completed;

        assert!(filter.matches(&done));
        assert!(!filter.matches(&task("Task open", None, None)));
        assert!(!filter.matches(&Task {
            name: "Other".into(),
            ..done
        }));
    }

    #[test]
    fn test_listing_order() {
        let mut older = task("b", None, None);
        older.updated_at -= Duration::hours(1);
        let newer_b = task("b", None, None);
        let newer_a = task("a", None, None);

        let mut tasks = vec![older.clone(), newer_b.clone(), newer_a.clone()];
        tasks.sort_by(listing_order);

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer_a.id, newer_b.id, older.id]);
    }

    #[test]
    fn test_paged_result_navigation() {
        let empty: PagedResult<()> = PagedResult::new(vec![], 0, 1, 10);
        assert_eq!(empty.total_pages(), 1);
        assert!(!empty.has_previous_page());
        assert!(!empty.has_next_page());

        let middle: PagedResult<()> = PagedResult::new(vec![], 21, 2, 10);
        assert_eq!(middle.total_pages(), 3);
        assert!(middle.has_previous_page());
        assert!(middle.has_next_page());

        let last: PagedResult<()> = PagedResult::new(vec![], 20, 2, 10);
        assert_eq!(last.total_pages(), 2);
        assert!(!last.has_next_page());
    }
}
