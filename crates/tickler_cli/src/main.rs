use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead};
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tickler_cli::cli::{Cli, Command, edit_field, parse_config_overrides};
use tickler_core::calendar::{format_iso_date, parse_user_date};
use tickler_core::clock::{Clock, SystemClock};
use tickler_core::config::{Config, Palette, load_config_with_fallback, merge_overrides};
use tickler_core::engine::{RefreshOutcome, Watch, WatchSettings};
use tickler_core::error::AppError;
use tickler_core::model::Task;
use tickler_core::notify::{Notifier, notifier_from_env};
use tickler_core::overdue::task_overdue;
use tickler_core::storage::{JsonStore, TaskStore};
use tickler_core::task_api::{self, TaskEdit};
use time::Date;
use tracing::warn;
use tracing_subscriber::EnvFilter;

struct Session {
    config: Config,
    clock: SystemClock,
}

impl Session {
    fn for_command(&self, cli: &Cli) -> Result<(Config, Palette), AppError> {
        let overrides = parse_config_overrides(&cli.config_override)?;
        let config = merge_overrides(&self.config, &overrides);
        let palette = config.palette();
        Ok((config, palette))
    }
}

#[derive(Tabled)]
struct DueDateRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Tasks")]
    tasks: usize,
}

fn status_label(task: &Task, today: Date) -> &'static str {
    if task.done {
        "done"
    } else if task_overdue(task, today) {
        "open (overdue)"
    } else {
        "open"
    }
}

fn repeat_label(task: &Task) -> Option<String> {
    task.recurrence()
        .encode()
        .map(|encoded| encoded.replace('\n', ": "))
}

fn print_task_plain(task: &Task, today: Date, palette: &Palette) {
    let prefix = if task.favorite { "[FAV] " } else { "" };
    let status = status_label(task, today);
    let status = if task_overdue(task, today) {
        palette.accentize(status)
    } else {
        status.to_string()
    };
    let line = format!(
        "{}{} | {} | {} | {} | {} | {}",
        prefix,
        task.id,
        task.text,
        status,
        task.due_date.as_deref().unwrap_or("-"),
        task.alarm.as_deref().unwrap_or("-"),
        repeat_label(task).as_deref().unwrap_or("-"),
    );
    if task.done {
        println!("{}", palette.mutedize(&line));
    } else {
        println!("{line}");
    }
}

fn print_task_details(task: &Task, today: Date) {
    println!("ID: {}", task.id);
    println!("Text: {}", task.text);
    println!("Status: {}", status_label(task, today));
    println!("Favorite: {}", if task.favorite { "yes" } else { "no" });
    println!("Due: {}", task.due_date.as_deref().unwrap_or("-"));
    println!("Alarm: {}", task.alarm.as_deref().unwrap_or("-"));
    println!("Repeat: {}", repeat_label(task).as_deref().unwrap_or("-"));
    println!(
        "Description: {}",
        task.description.as_deref().unwrap_or("-")
    );
    println!(
        "Last reset: {}",
        task.last_reset_date.as_deref().unwrap_or("-")
    );
}

fn task_json(task: &Task, today: Date) -> serde_json::Value {
    serde_json::json!({
        "id": task.id,
        "text": task.text,
        "done": task.done,
        "favorite": task.favorite,
        "due_date": task.due_date,
        "alarm": task.alarm,
        "repeat_schedule": task.repeat_schedule,
        "description": task.description,
        "last_reset_date": task.last_reset_date,
        "overdue": task_overdue(task, today),
    })
}

fn tasks_json(tasks: &[Task], today: Date) -> serde_json::Value {
    serde_json::Value::Array(tasks.iter().map(|task| task_json(task, today)).collect())
}

fn print_task_result(verb: &str, task: &Task, today: Date, json: bool) {
    if json {
        println!("{}", task_json(task, today));
    } else {
        println!("{verb} task: {} ({})", task.text, task.id);
    }
}

fn report_refresh(outcome: RefreshOutcome, json: bool) -> Result<(), AppError> {
    if json {
        let reset: Vec<serde_json::Value> = outcome
            .reset
            .iter()
            .map(|(kind, ids)| serde_json::json!({ "kind": kind.label(), "tasks": ids }))
            .collect();
        let failures: Vec<serde_json::Value> = outcome
            .failures
            .iter()
            .map(|failure| {
                serde_json::json!({
                    "kind": failure.kind.label(),
                    "code": failure.error.code(),
                    "message": failure.error.message(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({ "reset": reset, "failures": failures })
        );
    } else if outcome.reset.is_empty() {
        println!("No tasks to reset");
    } else {
        for (kind, ids) in &outcome.reset {
            let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
            println!("Reset {} tasks: {}", kind.label(), ids.join(", "));
        }
    }

    match outcome.failures.into_iter().next() {
        Some(failure) => Err(failure.error),
        None => Ok(()),
    }
}

/// `--help` and `--version` surface as parse errors but are not failures.
fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_watch(config: &Config, clock: SystemClock) -> Result<(), AppError> {
    let store: Arc<dyn TaskStore> = Arc::new(JsonStore::from_env()?);
    let notifier: Arc<dyn Notifier> = Arc::from(notifier_from_env()?);
    let settings = WatchSettings {
        alarm_interval: config.alarm_interval(),
        summary_interval: config.summary_interval(),
        alarm_dedup: config.alarm_dedup(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let watch = Watch::start(store, notifier, Arc::new(clock), settings);
        println!("Watching tasks, press Ctrl-C to stop");
        let signal = tokio::signal::ctrl_c().await;
        watch.stop().await;
        signal.map_err(AppError::from)
    })
}

fn run_command(cli: Cli, session: &Session) -> Result<(), AppError> {
    let (config, palette) = session.for_command(&cli)?;
    let today = session.clock.today();
    let json = cli.json;

    match cli.command {
        Command::Add { text, due, alarm } => {
            let text = match text {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::invalid_input("text is required")),
            };

            let task = task_api::add_task(&text, due.as_deref(), alarm.as_deref())?;
            print_task_result("Added", &task, today, json);
        }
        Command::List { favorites_first } => {
            let result = task_api::list_tasks(today, favorites_first)?;
            if json {
                let payload = serde_json::json!({
                    "incomplete": tasks_json(&result.incomplete, today),
                    "completed": tasks_json(&result.completed, today),
                });
                println!("{payload}");
            } else {
                for task in result.incomplete.iter().chain(&result.completed) {
                    print_task_plain(task, today, &palette);
                }
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task_by_id(id)?;
            if json {
                println!("{}", task_json(&task, today));
            } else {
                print_task_details(&task, today);
            }
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(id)?;
            print_task_result("Deleted", &task, today, json);
        }
        Command::Done { id } => {
            let task = task_api::set_task_done(id, true, today)?;
            print_task_result("Completed", &task, today, json);
        }
        Command::Undone { id } => {
            let task = task_api::set_task_done(id, false, today)?;
            print_task_result("Reopened", &task, today, json);
        }
        Command::Favorite { id, clear } => {
            let task = task_api::set_task_favorite(id, !clear)?;
            let verb = if clear { "Unfavorited" } else { "Favorited" };
            print_task_result(verb, &task, today, json);
        }
        Command::Edit {
            id,
            text,
            description,
            due,
            clear_due,
            alarm,
            clear_alarm,
            repeat,
            clear_repeat,
        } => {
            let edit = TaskEdit {
                text,
                description: description.map(Some),
                due_date: edit_field(due, clear_due),
                alarm: edit_field(alarm, clear_alarm),
                repeat: edit_field(repeat, clear_repeat),
            };
            let task = task_api::edit_task(id, &edit)?;
            print_task_result("Updated", &task, today, json);
        }
        Command::Calendar { date: Some(raw) } => {
            let date = parse_user_date(&raw)?;
            let tasks = task_api::tasks_due_on(date)?;
            if json {
                println!("{}", tasks_json(&tasks, today));
            } else if tasks.is_empty() {
                println!("No tasks due on {}", format_iso_date(date));
            } else {
                for task in &tasks {
                    print_task_plain(task, today, &palette);
                }
            }
        }
        Command::Calendar { date: None } => {
            let mut rows = Vec::new();
            for date in task_api::due_dates()? {
                rows.push(DueDateRow {
                    date: format_iso_date(date),
                    tasks: task_api::tasks_due_on(date)?.len(),
                });
            }
            if json {
                let payload: Vec<serde_json::Value> = rows
                    .iter()
                    .map(|row| serde_json::json!({ "date": row.date, "tasks": row.tasks }))
                    .collect();
                println!("{}", serde_json::Value::Array(payload));
            } else if rows.is_empty() {
                println!("No due dates");
            } else {
                let mut table = Table::new(rows);
                table.with(Style::psql());
                println!("{table}");
            }
        }
        Command::Refresh => {
            report_refresh(task_api::refresh_tasks(today)?, json)?;
        }
        Command::Alarms => {
            let outcome = task_api::check_alarms(session.clock.now())?;
            if json {
                let failures: Vec<serde_json::Value> = outcome
                    .failures
                    .iter()
                    .map(|failure| {
                        serde_json::json!({
                            "id": failure.task_id,
                            "code": failure.error.code(),
                            "message": failure.error.message(),
                        })
                    })
                    .collect();
                let payload = serde_json::json!({
                    "notified": tasks_json(&outcome.notified, today),
                    "failures": failures,
                });
                println!("{payload}");
            } else if outcome.notified.is_empty() && outcome.failures.is_empty() {
                println!("No alarms due");
            } else {
                for task in &outcome.notified {
                    println!("Reminder sent: {} ({})", task.text, task.id);
                }
            }
            if let Some(failure) = outcome.failures.into_iter().next() {
                return Err(failure.error);
            }
        }
        Command::Notify => {
            let outcome = task_api::notify_overdue(today)?;
            if json {
                let payload = serde_json::json!({
                    "overdue": outcome.overdue,
                    "notified": outcome.notified,
                });
                println!("{payload}");
            } else if outcome.notified {
                println!("Overdue summary sent: {} overdue tasks", outcome.overdue);
            } else {
                println!("No overdue tasks");
            }
        }
        Command::Watch => run_watch(&config, session.clock.clone())?,
    }

    Ok(())
}

fn run_interactive(session: &Session) -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock.read_line(&mut input)?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("tickler".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) if is_informational(&err) => {
                println!("{err}");
                continue;
            }
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if let Err(err) = run_command(cli, session) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn main() {
    // The fallback offset is read before any other thread exists.
    let clock = SystemClock::local();
    let loaded = load_config_with_fallback();

    let mut args = std::env::args_os();
    args.next();
    let interactive = args.next().is_none();

    let cli = if interactive {
        None
    } else {
        match Cli::try_parse() {
            Ok(cli) => Some(cli),
            Err(err) if is_informational(&err) => err.exit(),
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                std::process::exit(1);
            }
        }
    };

    let logging_config = match &cli {
        Some(cli) => match parse_config_overrides(&cli.config_override) {
            Ok(overrides) => merge_overrides(&loaded.config, &overrides),
            Err(_) => loaded.config.clone(),
        },
        None => loaded.config.clone(),
    };
    init_tracing(&logging_config);
    if let Some(err) = &loaded.error {
        warn!(error = %err, "failed to load config, using defaults");
    }

    let session = Session {
        config: loaded.config,
        clock,
    };

    let result = match cli {
        Some(cli) => run_command(cli, &session),
        None => run_interactive(&session),
    };

    if let Err(err) = result {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
