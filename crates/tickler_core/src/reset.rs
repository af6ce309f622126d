//! Recurrence resets.
//!
//! Each [`ResetKind`] is evaluated independently over a snapshot of tasks and
//! yields proposed mutations; nothing here touches storage. A task that was
//! already reset (or completed) today is skipped, which makes re-running a kind
//! for the same day a no-op once its mutations have been applied.

use crate::calendar::{format_iso_date, is_strictly_before_day, parse_iso_date};
use crate::model::{Task, TaskId, TaskMutation};
use crate::recurrence::Recurrence;
use time::Date;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    Daily,
    Weekly,
    Monthly,
}

impl ResetKind {
    /// Evaluation order used on every refresh.
    pub const ORDER: [ResetKind; 3] = [ResetKind::Daily, ResetKind::Weekly, ResetKind::Monthly];

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    fn matches(self, recurrence: &Recurrence) -> bool {
        matches!(
            (self, recurrence),
            (Self::Daily, Recurrence::Daily)
                | (Self::Weekly, Recurrence::Weekly(_))
                | (Self::Monthly, Recurrence::Monthly(_))
        )
    }
}

/// A proposed reset: clear `done` and stamp `last_reset_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetMutation {
    pub task_id: TaskId,
    pub last_reset_date: Date,
}

impl ResetMutation {
    pub fn to_task_mutation(&self) -> TaskMutation {
        TaskMutation {
            done: Some(false),
            last_reset_date: Some(Some(format_iso_date(self.last_reset_date))),
            ..TaskMutation::default()
        }
    }
}

/// Computes the resets of one kind that are due on `today`.
pub fn reset(kind: ResetKind, tasks: &[Task], today: Date) -> Vec<ResetMutation> {
    let mutations: Vec<ResetMutation> = tasks
        .iter()
        .filter(|task| {
            let recurrence = task.recurrence();
            kind.matches(&recurrence) && recurrence.occurs_on(today)
        })
        .filter(|task| not_reset_on(task, today))
        .map(|task| ResetMutation {
            task_id: task.id,
            last_reset_date: today,
        })
        .collect();

    debug!(
        kind = kind.label(),
        today = %format_iso_date(today),
        count = mutations.len(),
        "computed recurrence resets"
    );
    mutations
}

/// Computes every kind in [`ResetKind::ORDER`], keeping the batches separate.
pub fn plan_resets(tasks: &[Task], today: Date) -> Vec<(ResetKind, Vec<ResetMutation>)> {
    ResetKind::ORDER
        .iter()
        .map(|kind| (*kind, reset(*kind, tasks, today)))
        .collect()
}

fn not_reset_on(task: &Task, today: Date) -> bool {
    let Some(raw) = task.last_reset_date.as_deref() else {
        return true;
    };
    match parse_iso_date(raw) {
        Ok(last) => is_strictly_before_day(last, today),
        Err(err) => {
            warn!(task_id = task.id, error = %err, "ignoring unreadable last_reset_date");
            true
        }
    }
}
