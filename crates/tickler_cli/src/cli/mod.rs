use clap::{Parser, Subcommand};
use tickler_core::config::ConfigOverrides;
use tickler_core::error::AppError;
use tickler_core::model::TaskId;

#[derive(Parser, Debug)]
#[command(name = "tickler", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: tickler add "Pay rent" --due "August 31st, 2024" --alarm "9:00 AM"
    Add {
        text: Option<String>,
        /// Due date, e.g. "August 31st, 2024" or 2024-08-31
        #[arg(long)]
        due: Option<String>,
        /// Alarm time of day, e.g. "2:30 PM"
        #[arg(long)]
        alarm: Option<String>,
    },
    /// List tasks, incomplete first
    ///
    /// Recurring tasks are reset for today before listing.
    ///
    /// Example: tickler list --favorites-first
    List {
        #[arg(long)]
        favorites_first: bool,
    },
    /// Show details of a task
    ///
    /// Example: tickler show 1
    Show { id: TaskId },
    /// Delete a task
    ///
    /// Example: tickler delete 1
    Delete { id: TaskId },
    /// Mark a task as done
    ///
    /// Example: tickler done 1
    Done { id: TaskId },
    /// Mark a task as not done
    ///
    /// Example: tickler undone 1
    Undone { id: TaskId },
    /// Mark a task as favourite or clear it
    ///
    /// Example: tickler favorite 1
    /// Example: tickler favorite 1 --clear
    Favorite {
        id: TaskId,
        #[arg(long)]
        clear: bool,
    },
    /// Edit fields of a task
    ///
    /// Example: tickler edit 1 --text "Pay rent" --repeat monthly:1
    /// Example: tickler edit 1 --repeat weekly:MON,WED --clear-alarm
    Edit {
        id: TaskId,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long, conflicts_with = "clear_alarm")]
        alarm: Option<String>,
        #[arg(long)]
        clear_alarm: bool,
        /// daily, weekly:MON,WED or monthly:1,15
        #[arg(long, conflicts_with = "clear_repeat")]
        repeat: Option<String>,
        #[arg(long)]
        clear_repeat: bool,
    },
    /// Show due dates, or the tasks due on one date
    ///
    /// Example: tickler calendar
    /// Example: tickler calendar 2024-08-31
    Calendar { date: Option<String> },
    /// Reset recurring tasks that are due again today
    ///
    /// Example: tickler refresh
    Refresh,
    /// Send reminders for alarms set to the current minute
    ///
    /// Example: tickler alarms
    Alarms,
    /// Send the overdue task summary
    ///
    /// Example: tickler notify
    Notify,
    /// Keep running, resetting tasks and sending reminders until Ctrl-C
    ///
    /// Example: tickler watch
    Watch,
}

/// Flag name used to identify config override arguments by the runtime.
pub const CONFIG_OVERRIDE_FLAG: &str = "--config-override";

/// Collects raw `KEY=VALUE` override strings into typed overrides.
pub fn parse_config_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let (key, value) = entry.trim().split_once('=').ok_or_else(|| {
            AppError::invalid_input(format!(
                "{CONFIG_OVERRIDE_FLAG} must be in KEY=VALUE format"
            ))
        })?;
        overrides.set(key, value)?;
    }
    Ok(overrides)
}

/// Picks the set, clear or untouched state of an optional edit field.
pub fn edit_field(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}
