//! Alarm matching at minute granularity.

use crate::calendar::{parse_time_of_day, truncate_to_minute};
use crate::model::{Task, TaskId};
use std::collections::HashMap;
use time::{Date, PrimitiveDateTime, Time};
use tracing::{debug, warn};

/// Ids of not-done tasks whose alarm falls in the same minute as `now`.
///
/// Stateless: calling it twice within one minute matches the same tasks twice.
/// Wrap it with [`AlarmGuard`] to fire each task at most once per minute.
pub fn match_alarms(tasks: &[Task], now: Time) -> Vec<TaskId> {
    let current = truncate_to_minute(now);
    tasks
        .iter()
        .filter(|task| !task.done)
        .filter_map(|task| {
            let raw = task.alarm.as_deref()?;
            match parse_time_of_day(raw) {
                Ok(alarm) => (truncate_to_minute(alarm) == current).then_some(task.id),
                Err(err) => {
                    warn!(task_id = task.id, error = %err, "skipping unreadable alarm");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MinuteKey {
    date: Date,
    hour: u8,
    minute: u8,
}

impl From<PrimitiveDateTime> for MinuteKey {
    fn from(value: PrimitiveDateTime) -> Self {
        Self {
            date: value.date(),
            hour: value.hour(),
            minute: value.minute(),
        }
    }
}

/// Remembers the last minute each task fired in.
#[derive(Debug, Default)]
pub struct AlarmGuard {
    enabled: bool,
    last_fired: HashMap<TaskId, MinuteKey>,
}

impl AlarmGuard {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_fired: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Splits `matched` into ids that should fire now and ids already fired
    /// in this minute. Disabled guards let everything through.
    pub fn admit(
        &mut self,
        matched: Vec<TaskId>,
        now: PrimitiveDateTime,
    ) -> (Vec<TaskId>, Vec<TaskId>) {
        if !self.enabled {
            return (matched, Vec::new());
        }

        let key = MinuteKey::from(now);
        self.last_fired.retain(|_, fired| *fired == key);

        let mut admitted = Vec::new();
        let mut suppressed = Vec::new();
        for task_id in matched {
            if self.last_fired.insert(task_id, key).is_some() {
                debug!(task_id, "alarm already fired this minute");
                suppressed.push(task_id);
            } else {
                admitted.push(task_id);
            }
        }
        (admitted, suppressed)
    }

    /// Allows `task_id` to fire again within the current minute, used when
    /// delivering its notification failed.
    pub fn forget(&mut self, task_id: TaskId) {
        self.last_fired.remove(&task_id);
    }
}
