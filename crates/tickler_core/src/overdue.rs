use crate::calendar::{is_strictly_before_day, parse_long_date};
use crate::model::Task;
use time::Date;
use tracing::warn;

/// A due date strictly before `today`. Absent or unreadable dates are never
/// overdue.
pub fn is_overdue(due_date: Option<&str>, today: Date) -> bool {
    let Some(raw) = due_date else {
        return false;
    };
    match parse_long_date(raw) {
        Ok(due) => is_strictly_before_day(due, today),
        Err(err) => {
            warn!(due_date = raw, error = %err, "unreadable due date treated as absent");
            false
        }
    }
}

/// Overdue and still open.
pub fn task_overdue(task: &Task, today: Date) -> bool {
    !task.done && is_overdue(task.due_date.as_deref(), today)
}

pub fn count_overdue(tasks: &[Task], today: Date) -> usize {
    tasks.iter().filter(|task| task_overdue(task, today)).count()
}

#[cfg(test)]
mod tests {
    use super::{count_overdue, is_overdue, task_overdue};
    use crate::model::Task;
    use time::macros::date;

    #[test]
    fn overdue_boundary_is_the_previous_day() {
        let today = date!(2024 - 09 - 01);

        assert!(is_overdue(Some("August 31st, 2024"), today));
        assert!(!is_overdue(Some("September 1st, 2024"), today));
        assert!(!is_overdue(Some("September 2nd, 2024"), today));
        assert!(!is_overdue(None, today));
    }

    #[test]
    fn unreadable_due_date_is_not_overdue() {
        let today = date!(2024 - 09 - 01);

        assert!(!is_overdue(Some("last week"), today));
        assert!(!is_overdue(Some(""), today));
    }

    #[test]
    fn done_tasks_are_not_counted() {
        let today = date!(2024 - 09 - 01);
        let mut open = Task::new(1, "open");
        open.due_date = Some("August 30th, 2024".into());
        let mut closed = open.clone();
        closed.id = 2;
        closed.done = true;
        let mut upcoming = Task::new(3, "upcoming");
        upcoming.due_date = Some("December 1st, 2024".into());

        assert!(task_overdue(&open, today));
        assert!(!task_overdue(&closed, today));
        assert_eq!(count_overdue(&[open, closed, upcoming], today), 1);
    }

    #[test]
    fn comparison_is_by_date_not_by_string() {
        // "April" sorts before "August" alphabetically but is later in the year.
        let mut task = Task::new(1, "tax return");
        task.due_date = Some("April 15th, 2025".into());

        assert!(!task_overdue(&task, date!(2024 - 09 - 01)));
    }
}
