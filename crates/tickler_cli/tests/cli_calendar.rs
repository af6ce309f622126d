use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("tickler-{nanos}-{file_name}"))
}

fn run(store_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tickler"))
        .args(args)
        .env("TICKLER_STORE_PATH", store_path)
        .env("TICKLER_CONFIG_PATH", temp_path("missing-config.json"))
        .env("TICKLER_DISABLE_NOTIFICATIONS", "1")
        .env("TZ", "UTC")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tickler")
}

fn seed(file_name: &str) -> PathBuf {
    let store_path = temp_path(file_name);
    let content = serde_json::json!({
        "schema_version": 1,
        "next_id": 4,
        "tasks": [
            { "id": 1, "text": "rent", "due_date": "August 31st, 2024" },
            { "id": 2, "text": "taxes", "due_date": "September 1st, 2024" },
            { "id": 3, "text": "groceries", "due_date": "August 31st, 2024" }
        ]
    });
    std::fs::write(&store_path, content.to_string()).unwrap();
    store_path
}

#[test]
fn calendar_without_date_lists_due_dates() {
    let store_path = seed("cli-calendar.json");

    let output = run(&store_path, &["calendar"]);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Date"));
    assert!(stdout.contains("Tasks"));
    let first = stdout.find("2024-08-31").expect("first date");
    let second = stdout.find("2024-09-01").expect("second date");
    assert!(first < second);
}

#[test]
fn calendar_json_reports_task_counts() {
    let store_path = seed("cli-calendar-json.json");

    let output = run(&store_path, &["calendar", "--json"]);
    std::fs::remove_file(&store_path).ok();

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        payload,
        serde_json::json!([
            { "date": "2024-08-31", "tasks": 2 },
            { "date": "2024-09-01", "tasks": 1 }
        ])
    );
}

#[test]
fn calendar_with_date_lists_tasks_due_that_day() {
    let store_path = seed("cli-calendar-day.json");

    let iso = run(&store_path, &["calendar", "2024-08-31"]);
    let long = run(&store_path, &["calendar", "August 31st, 2024"]);
    let empty = run(&store_path, &["calendar", "2024-12-25"]);
    std::fs::remove_file(&store_path).ok();

    let stdout = String::from_utf8_lossy(&iso.stdout);
    assert!(stdout.contains("1 | rent"));
    assert!(stdout.contains("3 | groceries"));
    assert!(!stdout.contains("taxes"));
    assert_eq!(iso.stdout, long.stdout);
    assert!(String::from_utf8_lossy(&empty.stdout).contains("No tasks due on 2024-12-25"));
}

#[test]
fn calendar_rejects_invalid_date() {
    let store_path = seed("cli-calendar-bad.json");

    let output = run(&store_path, &["calendar", "2024-02-30"]);
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: invalid_input"));
}
