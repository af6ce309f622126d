use crate::recurrence::{self, Recurrence};
use serde::{Deserialize, Serialize};

pub type TaskId = u64;

/// A single tracked task as persisted by the store.
///
/// Date and time fields keep their user-facing string encodings so existing
/// data round-trips untouched; the engine parses them on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub favorite: bool,
    /// Time of day such as `2:30 PM`.
    #[serde(default)]
    pub alarm: Option<String>,
    /// Long-form date such as `August 31st, 2024`.
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub repeat_schedule: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO date of the last recurrence reset or completion.
    #[serde(default)]
    pub last_reset_date: Option<String>,
}

impl Task {
    pub fn new<T: Into<String>>(id: TaskId, text: T) -> Self {
        Self {
            id,
            text: text.into(),
            done: false,
            favorite: false,
            alarm: None,
            due_date: None,
            repeat_schedule: None,
            description: None,
            last_reset_date: None,
        }
    }

    pub fn recurrence(&self) -> Recurrence {
        recurrence::classify(self.repeat_schedule.as_deref().unwrap_or_default())
    }
}

/// Partial update proposed against a stored task.
///
/// `None` leaves a field untouched; for optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskMutation {
    pub text: Option<String>,
    pub done: Option<bool>,
    pub favorite: Option<bool>,
    pub alarm: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub repeat_schedule: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub last_reset_date: Option<Option<String>>,
}

impl TaskMutation {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(done) = self.done {
            task.done = done;
        }
        if let Some(favorite) = self.favorite {
            task.favorite = favorite;
        }
        if let Some(alarm) = &self.alarm {
            task.alarm = alarm.clone();
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = due_date.clone();
        }
        if let Some(repeat_schedule) = &self.repeat_schedule {
            task.repeat_schedule = repeat_schedule.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(last_reset_date) = &self.last_reset_date {
            task.last_reset_date = last_reset_date.clone();
        }
    }
}
