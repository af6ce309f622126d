//! One tick of each periodic trigger, plus the long-running watch loop.
//!
//! Every tick reads a fresh snapshot from the store, computes proposals with
//! the pure engines, and hands the results to storage or the notifier. A
//! failed tick has no effect; the next one starts again from scratch.

use crate::alarm::{AlarmGuard, match_alarms};
use crate::calendar::format_iso_date;
use crate::clock::Clock;
use crate::error::AppError;
use crate::model::{Task, TaskId, TaskMutation};
use crate::notify::{Notifier, REMINDER_TITLE, alarm_body, overdue_summary_body};
use crate::overdue::count_overdue;
use crate::reset::{ResetKind, plan_resets};
use crate::scheduler::PeriodicTask;
use crate::storage::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use time::{Date, PrimitiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ResetFailure {
    pub kind: ResetKind,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub reset: Vec<(ResetKind, Vec<TaskId>)>,
    pub failures: Vec<ResetFailure>,
}

impl RefreshOutcome {
    pub fn reset_count(&self) -> usize {
        self.reset.iter().map(|(_, ids)| ids.len()).sum()
    }
}

#[derive(Debug)]
pub struct NotificationFailure {
    pub task_id: TaskId,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct AlarmOutcome {
    pub notified: Vec<Task>,
    pub suppressed: Vec<TaskId>,
    pub failures: Vec<NotificationFailure>,
}

#[derive(Debug)]
pub struct SummaryOutcome {
    pub overdue: usize,
    pub notified: bool,
}

/// Runs the daily, weekly and monthly resets for `today`, in that order.
///
/// Each kind is written as its own batch; a storage failure in one batch is
/// recorded and the remaining kinds still run. Only a failed fetch aborts.
pub fn refresh(store: &dyn TaskStore, today: Date) -> Result<RefreshOutcome, AppError> {
    let tasks = store.fetch_all_tasks()?;
    let mut outcome = RefreshOutcome::default();

    for (kind, mutations) in plan_resets(&tasks, today) {
        if mutations.is_empty() {
            continue;
        }

        let batch: Vec<(TaskId, TaskMutation)> = mutations
            .iter()
            .map(|mutation| (mutation.task_id, mutation.to_task_mutation()))
            .collect();

        match store.apply_batch(&batch) {
            Ok(_) => {
                let ids: Vec<TaskId> = batch.iter().map(|(task_id, _)| *task_id).collect();
                info!(
                    kind = kind.label(),
                    today = %format_iso_date(today),
                    tasks = ?ids,
                    "reset recurring tasks"
                );
                outcome.reset.push((kind, ids));
            }
            Err(error) => {
                warn!(kind = kind.label(), error = %error, "failed to apply resets");
                outcome.failures.push(ResetFailure { kind, error });
            }
        }
    }

    Ok(outcome)
}

/// Sends a reminder for every open task whose alarm is due in `now`'s minute.
pub fn check_alarms(
    store: &dyn TaskStore,
    notifier: &dyn Notifier,
    guard: &mut AlarmGuard,
    now: PrimitiveDateTime,
) -> Result<AlarmOutcome, AppError> {
    let tasks = store.fetch_all_tasks()?;
    let matched = match_alarms(&tasks, now.time());
    let (admitted, suppressed) = guard.admit(matched, now);
    let mut outcome = AlarmOutcome {
        suppressed,
        ..AlarmOutcome::default()
    };

    for task_id in admitted {
        let Some(task) = tasks.iter().find(|task| task.id == task_id) else {
            continue;
        };
        match notifier.notify(REMINDER_TITLE, &alarm_body(task)) {
            Ok(()) => {
                info!(task_id, "sent alarm reminder");
                outcome.notified.push(task.clone());
            }
            Err(error) => {
                warn!(task_id, error = %error, "failed to send alarm reminder");
                guard.forget(task_id);
                outcome.failures.push(NotificationFailure { task_id, error });
            }
        }
    }

    Ok(outcome)
}

/// Sends the overdue-count summary when at least one open task is overdue.
pub fn notify_overdue_summary(
    store: &dyn TaskStore,
    notifier: &dyn Notifier,
    today: Date,
) -> Result<SummaryOutcome, AppError> {
    let tasks = store.fetch_all_tasks()?;
    let overdue = count_overdue(&tasks, today);
    if overdue == 0 {
        return Ok(SummaryOutcome {
            overdue,
            notified: false,
        });
    }

    notifier.notify(REMINDER_TITLE, &overdue_summary_body(overdue))?;
    info!(overdue, "sent overdue summary");
    Ok(SummaryOutcome {
        overdue,
        notified: true,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub alarm_interval: Duration,
    pub summary_interval: Duration,
    pub alarm_dedup: bool,
}

/// The two periodic triggers of a running session.
pub struct Watch {
    cancel: CancellationToken,
    tick: PeriodicTask,
    summary: PeriodicTask,
}

impl Watch {
    /// Starts the refresh-and-alarm tick and the overdue summary tick.
    ///
    /// Both run once immediately. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: WatchSettings,
    ) -> Self {
        let cancel = CancellationToken::new();

        let tick = {
            let store = store.clone();
            let notifier = notifier.clone();
            let clock = clock.clone();
            let mut guard = AlarmGuard::new(settings.alarm_dedup);
            PeriodicTask::spawn(
                "refresh-and-alarms",
                settings.alarm_interval,
                cancel.child_token(),
                move || {
                    let now = clock.now();
                    if let Err(err) = refresh(store.as_ref(), now.date()) {
                        warn!(error = %err, "refresh tick failed");
                    }
                    if let Err(err) = check_alarms(store.as_ref(), notifier.as_ref(), &mut guard, now)
                    {
                        warn!(error = %err, "alarm tick failed");
                    }
                },
            )
        };

        let summary = PeriodicTask::spawn(
            "overdue-summary",
            settings.summary_interval,
            cancel.child_token(),
            move || {
                if let Err(err) =
                    notify_overdue_summary(store.as_ref(), notifier.as_ref(), clock.today())
                {
                    warn!(error = %err, "overdue summary tick failed");
                }
            },
        );

        Self {
            cancel,
            tick,
            summary,
        }
    }

    /// Cancels both triggers and waits until neither is running.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.tick.join().await;
        self.summary.join().await;
        info!("watch stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::{Watch, WatchSettings, check_alarms, notify_overdue_summary, refresh};
    use crate::alarm::AlarmGuard;
    use crate::clock::ManualClock;
    use crate::error::AppError;
    use crate::model::{Task, TaskId, TaskMutation};
    use crate::notify::Notifier;
    use crate::reset::ResetKind;
    use crate::storage::{JsonStore, TaskStore};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use time::macros::{date, datetime};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tickler-{nanos}-{file_name}"))
    }

    /// In-memory store that can be told to fail batches touching given ids.
    #[derive(Default)]
    struct MemoryStore {
        tasks: Mutex<Vec<Task>>,
        failing_ids: Vec<TaskId>,
        fail_fetch: bool,
    }

    impl MemoryStore {
        fn with_tasks(tasks: Vec<Task>) -> Self {
            Self {
                tasks: Mutex::new(tasks),
                ..Self::default()
            }
        }

        fn snapshot(&self) -> Vec<Task> {
            self.tasks.lock().unwrap().clone()
        }
    }

    impl TaskStore for MemoryStore {
        fn fetch_all_tasks(&self) -> Result<Vec<Task>, AppError> {
            if self.fail_fetch {
                return Err(AppError::io("disk unavailable"));
            }
            Ok(self.snapshot())
        }

        fn apply_mutation(
            &self,
            task_id: TaskId,
            mutation: &TaskMutation,
        ) -> Result<Task, AppError> {
            if self.failing_ids.contains(&task_id) {
                return Err(AppError::io("write failed"));
            }
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks
                .iter_mut()
                .find(|task| task.id == task_id)
                .ok_or_else(|| AppError::not_found(task_id))?;
            mutation.apply_to(task);
            Ok(task.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::io("notification daemon unavailable"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn recurring(id: TaskId, schedule: &str, last_reset: Option<&str>) -> Task {
        let mut task = Task::new(id, format!("task {id}"));
        task.done = true;
        task.repeat_schedule = Some(schedule.to_string());
        task.last_reset_date = last_reset.map(str::to_string);
        task
    }

    fn with_alarm(id: TaskId, text: &str, alarm: &str) -> Task {
        let mut task = Task::new(id, text);
        task.alarm = Some(alarm.to_string());
        task
    }

    #[test]
    fn refresh_resets_daily_task_once_per_day() {
        let path = temp_path("refresh.json");
        let store = JsonStore::new(&path);
        let mut state = store.load_state().unwrap();
        state.tasks.push(recurring(1, "Daily", Some("2024-09-01")));
        state.next_id = 2;
        store.save_state(&state).unwrap();

        let first = refresh(&store, date!(2024 - 09 - 02)).unwrap();
        let after_first = store.fetch_all_tasks().unwrap();
        let second = refresh(&store, date!(2024 - 09 - 02)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(first.reset, vec![(ResetKind::Daily, vec![1])]);
        assert!(!after_first[0].done);
        assert_eq!(after_first[0].last_reset_date.as_deref(), Some("2024-09-02"));
        assert_eq!(second.reset_count(), 0);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn refresh_failure_in_one_kind_does_not_block_others() {
        let store = MemoryStore {
            failing_ids: vec![2],
            ..MemoryStore::with_tasks(vec![
                recurring(1, "Daily", None),
                recurring(2, "Weekly\nMON", None),
                recurring(3, "Monthly\n2", None),
            ])
        };

        let outcome = refresh(&store, date!(2024 - 09 - 02)).unwrap();
        let tasks = store.snapshot();

        assert_eq!(
            outcome.reset,
            vec![(ResetKind::Daily, vec![1]), (ResetKind::Monthly, vec![3])]
        );
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, ResetKind::Weekly);
        assert!(!tasks[0].done);
        assert!(tasks[1].done);
        assert!(!tasks[2].done);
    }

    #[test]
    fn refresh_aborts_when_fetch_fails() {
        let store = MemoryStore {
            fail_fetch: true,
            ..MemoryStore::default()
        };

        let err = refresh(&store, date!(2024 - 09 - 02)).unwrap_err();
        assert_eq!(err.code(), "io_error");
    }

    #[test]
    fn check_alarms_notifies_matching_open_tasks() {
        let mut finished = with_alarm(2, "Finished", "2:30 PM");
        finished.done = true;
        let store = MemoryStore::with_tasks(vec![
            with_alarm(1, "Stretch", "2:30 PM"),
            finished,
            with_alarm(3, "Later", "2:31 PM"),
        ]);
        let notifier = RecordingNotifier::default();
        let mut guard = AlarmGuard::new(true);

        let outcome =
            check_alarms(&store, &notifier, &mut guard, datetime!(2024-09-02 14:30:10)).unwrap();

        let ids: Vec<TaskId> = outcome.notified.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(
            notifier.sent(),
            vec![("Task Reminder".to_string(), "It's time for: Stretch".to_string())]
        );
    }

    #[test]
    fn check_alarms_does_not_double_fire_within_a_minute() {
        let store = MemoryStore::with_tasks(vec![with_alarm(1, "Stretch", "2:30 PM")]);
        let notifier = RecordingNotifier::default();
        let mut guard = AlarmGuard::new(true);

        check_alarms(&store, &notifier, &mut guard, datetime!(2024-09-02 14:30:05)).unwrap();
        let second =
            check_alarms(&store, &notifier, &mut guard, datetime!(2024-09-02 14:30:50)).unwrap();

        assert!(second.notified.is_empty());
        assert_eq!(second.suppressed, vec![1]);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn check_alarms_without_dedup_reproduces_double_fire() {
        let store = MemoryStore::with_tasks(vec![with_alarm(1, "Stretch", "2:30 PM")]);
        let notifier = RecordingNotifier::default();
        let mut guard = AlarmGuard::new(false);

        check_alarms(&store, &notifier, &mut guard, datetime!(2024-09-02 14:30:05)).unwrap();
        check_alarms(&store, &notifier, &mut guard, datetime!(2024-09-02 14:30:50)).unwrap();

        assert_eq!(notifier.sent().len(), 2);
    }

    #[test]
    fn check_alarms_reports_failures_and_allows_retry() {
        let store = MemoryStore::with_tasks(vec![with_alarm(1, "Stretch", "2:30 PM")]);
        let failing = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let working = RecordingNotifier::default();
        let mut guard = AlarmGuard::new(true);

        let failed =
            check_alarms(&store, &failing, &mut guard, datetime!(2024-09-02 14:30:05)).unwrap();
        let retried =
            check_alarms(&store, &working, &mut guard, datetime!(2024-09-02 14:30:35)).unwrap();

        assert_eq!(failed.failures.len(), 1);
        assert_eq!(failed.failures[0].task_id, 1);
        assert_eq!(retried.notified.len(), 1);
    }

    #[test]
    fn overdue_summary_counts_open_overdue_tasks() {
        let mut late = Task::new(1, "late");
        late.due_date = Some("August 31st, 2024".into());
        let mut late_done = late.clone();
        late_done.id = 2;
        late_done.done = true;
        let mut today_due = Task::new(3, "today");
        today_due.due_date = Some("September 1st, 2024".into());
        let store = MemoryStore::with_tasks(vec![late, late_done, today_due]);
        let notifier = RecordingNotifier::default();

        let outcome = notify_overdue_summary(&store, &notifier, date!(2024 - 09 - 01)).unwrap();

        assert_eq!(outcome.overdue, 1);
        assert!(outcome.notified);
        assert_eq!(
            notifier.sent()[0].1,
            "You have 1 overdue tasks. Please check them!"
        );
    }

    #[test]
    fn overdue_summary_is_silent_when_nothing_is_overdue() {
        let store = MemoryStore::with_tasks(vec![Task::new(1, "no due date")]);
        let notifier = RecordingNotifier::default();

        let outcome = notify_overdue_summary(&store, &notifier, date!(2024 - 09 - 01)).unwrap();

        assert!(!outcome.notified);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_resets_and_reminds_on_ticks() {
        let store = Arc::new(MemoryStore::with_tasks(vec![
            recurring(1, "Daily", Some("2024-09-01")),
            with_alarm(2, "Stretch", "9:01 AM"),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = ManualClock::new(datetime!(2024-09-02 9:00));
        let settings = WatchSettings {
            alarm_interval: Duration::from_secs(60),
            summary_interval: Duration::from_secs(86_400),
            alarm_dedup: true,
        };

        let watch = Watch::start(store.clone(), notifier.clone(), Arc::new(clock.clone()), settings);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!store.snapshot()[0].done);
        assert!(notifier.sent().is_empty());

        clock.set(datetime!(2024-09-02 9:01));
        tokio::time::sleep(Duration::from_secs(60)).await;
        watch.stop().await;

        assert_eq!(
            notifier.sent(),
            vec![("Task Reminder".to_string(), "It's time for: Stretch".to_string())]
        );
    }
}
