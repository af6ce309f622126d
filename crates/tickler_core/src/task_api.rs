use crate::alarm::AlarmGuard;
use crate::calendar::{
    format_iso_date, format_long_date, format_time_of_day, parse_long_date, parse_time_of_day,
    parse_user_date,
};
use crate::engine::{self, AlarmOutcome, RefreshOutcome, SummaryOutcome};
use crate::error::AppError;
use crate::model::{Task, TaskId, TaskMutation};
use crate::notify::{Notifier, notifier_from_env};
use crate::recurrence::Recurrence;
use crate::storage::{JsonStore, TaskStore};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use time::{Date, PrimitiveDateTime};

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub incomplete: Vec<Task>,
    pub completed: Vec<Task>,
}

/// Field changes requested by `edit`; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub text: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub alarm: Option<Option<String>>,
    pub repeat: Option<Option<String>>,
}

pub fn add_task(text: &str, due: Option<&str>, alarm: Option<&str>) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    add_task_with_store(&store, text, due, alarm)
}

pub fn list_tasks(today: Date, favorites_first: bool) -> Result<ListResult, AppError> {
    let store = JsonStore::from_env()?;
    list_tasks_with_store(&store, today, favorites_first)
}

pub fn get_task_by_id(id: TaskId) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    get_task_by_id_with_store(&store, id)
}

pub fn delete_task(id: TaskId) -> Result<Task, AppError> {
    JsonStore::from_env()?.delete_task(id)
}

pub fn set_task_done(id: TaskId, done: bool, today: Date) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    set_task_done_with_store(&store, id, done, today)
}

pub fn set_task_favorite(id: TaskId, favorite: bool) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    set_task_favorite_with_store(&store, id, favorite)
}

pub fn edit_task(id: TaskId, edit: &TaskEdit) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    edit_task_with_store(&store, id, edit)
}

pub fn tasks_due_on(date: Date) -> Result<Vec<Task>, AppError> {
    let store = JsonStore::from_env()?;
    tasks_due_on_with_store(&store, date)
}

pub fn due_dates() -> Result<Vec<Date>, AppError> {
    let store = JsonStore::from_env()?;
    due_dates_with_store(&store)
}

pub fn refresh_tasks(today: Date) -> Result<RefreshOutcome, AppError> {
    let store = JsonStore::from_env()?;
    engine::refresh(&store, today)
}

/// One alarm tick. A fresh guard is used, so nothing is de-duplicated
/// against earlier invocations.
pub fn check_alarms(now: PrimitiveDateTime) -> Result<AlarmOutcome, AppError> {
    let store = JsonStore::from_env()?;
    let notifier = notifier_from_env()?;
    check_alarms_with_store(&store, notifier.as_ref(), now)
}

pub fn notify_overdue(today: Date) -> Result<SummaryOutcome, AppError> {
    let store = JsonStore::from_env()?;
    let notifier = notifier_from_env()?;
    engine::notify_overdue_summary(&store, notifier.as_ref(), today)
}

fn add_task_with_store(
    store: &JsonStore,
    text: &str,
    due: Option<&str>,
    alarm: Option<&str>,
) -> Result<Task, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("text is required"));
    }

    let mut task = Task::new(0, trimmed);
    task.due_date = due.map(normalize_due).transpose()?;
    task.alarm = alarm.map(normalize_alarm).transpose()?;
    store.insert_task(task)
}

fn list_tasks_with_store(
    store: &JsonStore,
    today: Date,
    favorites_first: bool,
) -> Result<ListResult, AppError> {
    engine::refresh(store, today)?;

    let mut tasks = store.fetch_all_tasks()?;
    tasks.sort_by_key(|task| Reverse(task.id));
    if favorites_first {
        tasks.sort_by_key(|task| !task.favorite);
    }

    let (completed, incomplete): (Vec<Task>, Vec<Task>) =
        tasks.into_iter().partition(|task| task.done);
    Ok(ListResult {
        incomplete,
        completed,
    })
}

fn get_task_by_id_with_store(store: &JsonStore, id: TaskId) -> Result<Task, AppError> {
    store
        .fetch_all_tasks()?
        .into_iter()
        .find(|task| task.id == id)
        .ok_or_else(|| AppError::not_found(id))
}

fn set_task_done_with_store(
    store: &JsonStore,
    id: TaskId,
    done: bool,
    today: Date,
) -> Result<Task, AppError> {
    let task = get_task_by_id_with_store(store, id)?;
    if task.done == done {
        let message = if done {
            "task already completed"
        } else {
            "task is not completed"
        };
        return Err(AppError::invalid_input(message));
    }

    // Completing records today so a recurring task is not reset again until
    // its next occurrence.
    let last_reset_date = done.then(|| format_iso_date(today));
    let mutation = TaskMutation {
        done: Some(done),
        last_reset_date: Some(last_reset_date),
        ..TaskMutation::default()
    };
    store.apply_mutation(id, &mutation)
}

fn set_task_favorite_with_store(
    store: &JsonStore,
    id: TaskId,
    favorite: bool,
) -> Result<Task, AppError> {
    let mutation = TaskMutation {
        favorite: Some(favorite),
        ..TaskMutation::default()
    };
    store.apply_mutation(id, &mutation)
}

fn edit_task_with_store(store: &JsonStore, id: TaskId, edit: &TaskEdit) -> Result<Task, AppError> {
    let mut mutation = TaskMutation::default();

    if let Some(text) = &edit.text {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AppError::invalid_input("text is required"));
        }
        mutation.text = Some(trimmed.to_string());
    }
    if let Some(description) = &edit.description {
        let cleaned = description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        mutation.description = Some(cleaned);
    }
    if let Some(due) = &edit.due_date {
        mutation.due_date = Some(due.as_deref().map(normalize_due).transpose()?);
    }
    if let Some(alarm) = &edit.alarm {
        mutation.alarm = Some(alarm.as_deref().map(normalize_alarm).transpose()?);
    }
    if let Some(repeat) = &edit.repeat {
        mutation.repeat_schedule = Some(repeat.as_deref().map(normalize_repeat).transpose()?);
    }

    if mutation.is_empty() {
        return Err(AppError::invalid_input("nothing to edit"));
    }
    store.apply_mutation(id, &mutation)
}

fn tasks_due_on_with_store(store: &JsonStore, date: Date) -> Result<Vec<Task>, AppError> {
    let mut tasks: Vec<Task> = store
        .fetch_all_tasks()?
        .into_iter()
        .filter(|task| stored_due_date(task) == Some(date))
        .collect();
    tasks.sort_by_key(|task| task.id);
    Ok(tasks)
}

fn due_dates_with_store(store: &JsonStore) -> Result<Vec<Date>, AppError> {
    let dates: BTreeSet<Date> = store
        .fetch_all_tasks()?
        .iter()
        .filter_map(stored_due_date)
        .collect();
    Ok(dates.into_iter().collect())
}

fn check_alarms_with_store(
    store: &JsonStore,
    notifier: &dyn Notifier,
    now: PrimitiveDateTime,
) -> Result<AlarmOutcome, AppError> {
    let mut guard = AlarmGuard::new(false);
    engine::check_alarms(store, notifier, &mut guard, now)
}

fn stored_due_date(task: &Task) -> Option<Date> {
    task.due_date
        .as_deref()
        .and_then(|value| parse_long_date(value).ok())
}

fn normalize_due(raw: &str) -> Result<String, AppError> {
    Ok(format_long_date(parse_user_date(raw)?))
}

fn normalize_alarm(raw: &str) -> Result<String, AppError> {
    Ok(format_time_of_day(parse_time_of_day(raw)?))
}

fn normalize_repeat(raw: &str) -> Result<String, AppError> {
    Recurrence::from_shorthand(raw)?
        .encode()
        .ok_or_else(|| AppError::invalid_input(format!("invalid repeat schedule '{raw}'")))
}
