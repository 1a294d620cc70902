use serde_json::Map;
use time::{Duration, OffsetDateTime};

use super::task::{Priority, Task, TaskId, TaskStatus};
use super::timeutil::Timestamp;

/// Default collection written to an empty slot on first start.
pub fn seed_tasks(now: OffsetDateTime) -> Vec<Task> {
    vec![
        seed(
            "1",
            "Complete project documentation",
            "Write documentation",
            TaskStatus::Incomplete,
            Priority::High,
            now,
        ),
        seed(
            "2",
            "Fix navigation bug",
            "Sidebar bug",
            TaskStatus::Complete,
            Priority::Medium,
            now,
        ),
        seed(
            "3",
            "Implement user feedback",
            "Add feedback form",
            TaskStatus::Incomplete,
            Priority::Low,
            now + Duration::days(1),
        ),
        seed(
            "4",
            "Update dependencies",
            "Update npm packages",
            TaskStatus::Incomplete,
            Priority::Medium,
            now + Duration::days(2),
        ),
    ]
}

fn seed(
    id: &str,
    title: &str,
    description: &str,
    status: TaskStatus,
    priority: Priority,
    due: OffsetDateTime,
) -> Task {
    Task {
        id: TaskId::from(id),
        title: title.to_owned(),
        description: description.to_owned(),
        status,
        priority: Some(priority.into()),
        due_date: Some(Timestamp::at(due)),
        updated_at: None,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn seed_has_four_titled_tasks_in_order() {
        let now = datetime!(2026-10-16 12:00 UTC);
        let tasks = seed_tasks(now);

        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
        assert!(tasks.iter().all(|t| !t.title.trim().is_empty()));
        assert_eq!(tasks.iter().filter(|t| t.is_complete()).count(), 1);
        assert_eq!(
            tasks[3].due_date.as_ref().map(Timestamp::as_str),
            Some("2026-10-18T12:00:00.000Z")
        );
    }
}
