use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;
use tempfile::TempDir;

const EXPECTED_ROOT_HELP: &str = "poolquota - random drug and alcohol testing quota planner

Usage:
  poolquota <command>

Start here:
  poolquota calendar 2026-01-01
  poolquota run --help
  poolquota trials --runs 20
";

struct CliOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

fn temp_home() -> TempDir {
    let dir = tempfile::Builder::new().prefix("poolquota-cli").tempdir();
    assert!(dir.is_ok());
    match dir {
        Ok(value) => value,
        Err(_) => unreachable!(),
    }
}

fn run_cli_in_home(home: &Path, args: &[&str]) -> CliOutput {
    let mut command = Command::new(env!("CARGO_BIN_EXE_poolquota"));
    command.args(args);
    command.env("POOLQUOTA_HOME", home.join("state"));
    command.env_remove("POOLQUOTA_LOG");
    let output = command.output();
    assert!(output.is_ok());
    match output {
        Ok(result) => CliOutput {
            code: result.status.code(),
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        },
        Err(_) => unreachable!(),
    }
}

fn write_pool(home: &Path, name: &str, rows: &[(&str, u32)]) -> String {
    let mut body = String::from("date,count\n");
    for (date, count) in rows {
        body.push_str(&format!("{date},{count}\n"));
    }
    let path = home.join(name);
    let written = fs::write(&path, body);
    assert!(written.is_ok());
    path.display().to_string()
}

fn constant_year(home: &Path, count: u32) -> String {
    let mut body = String::from("date,count\n");
    let mut day = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default();
    let end = chrono::NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or_default();
    while day <= end {
        body.push_str(&format!("{},{count}\n", day.format("%Y-%m-%d")));
        day += chrono::Duration::days(1);
    }
    let path = home.join("constant.csv");
    let written = fs::write(&path, body);
    assert!(written.is_ok());
    path.display().to_string()
}

fn parse_json(body: &str) -> Value {
    let parsed = serde_json::from_str::<Value>(body);
    assert!(parsed.is_ok(), "not JSON: {body}");
    parsed.unwrap_or(Value::Null)
}

#[test]
fn root_command_uses_short_plaintext_help() {
    let home = temp_home();
    let output = run_cli_in_home(home.path(), &[]);
    assert_eq!(output.code, Some(0));
    assert_eq!(output.stdout, EXPECTED_ROOT_HELP);
}

#[test]
fn top_level_help_and_version_succeed() {
    let home = temp_home();
    let help = run_cli_in_home(home.path(), &["--help"]);
    assert_eq!(help.code, Some(0));
    assert!(help.stdout.contains("Plan a year of tests:"));
    assert!(help.stdout.contains("POOLQUOTA_LOG=debug"));

    let version = run_cli_in_home(home.path(), &["--version"]);
    assert_eq!(version.code, Some(0));
    assert_eq!(version.stdout.trim(), "poolquota 0.1.0");
}

#[test]
fn run_help_explains_file_formats() {
    let home = temp_home();
    let output = run_cli_in_home(home.path(), &["run", "--help"]);
    assert_eq!(output.code, Some(0));
    assert!(output.stdout.contains("Population file:"));
    assert!(output.stdout.contains("--checkpoint"));
    assert!(output.stdout.contains("What to do next:"));
}

#[test]
fn run_json_reports_every_tracker() {
    let home = temp_home();
    let path = constant_year(home.path(), 100);
    let output = run_cli_in_home(
        home.path(),
        &["run", &path, "--checkpoint", "2026-12-15", "--json"],
    );
    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    let payload = parse_json(&output.stdout);
    assert_eq!(payload["ok"], Value::Bool(true));
    assert_eq!(payload["command"], "run");
    let trackers = payload["data"]["trackers"].as_array().cloned().unwrap_or_default();
    assert_eq!(trackers.len(), 2);
    for tracker in trackers {
        let final_overcount = tracker["final_overcount"].as_i64().unwrap_or(i64::MIN);
        assert!((-1..=1).contains(&final_overcount));
    }
}

#[test]
fn run_text_and_persisted_state() {
    let home = temp_home();
    let path = constant_year(home.path(), 40);
    let csv_out = home.path().join("report.csv").display().to_string();
    let output = run_cli_in_home(
        home.path(),
        &[
            "run",
            &path,
            "--cadence",
            "monthly",
            "--substance",
            "drug=0.5",
            "--persist",
            "--csv-out",
            &csv_out,
        ],
    );
    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.starts_with("Planned 1 substance(s) over 12 monthly period(s)"));
    assert!(output.stdout.contains("Saved state:"));
    assert!(home.path().join("state").join("state.db").exists());

    let report = fs::read_to_string(&csv_out);
    assert!(report.is_ok());
    if let Ok(text) = report {
        assert_eq!(text.lines().count(), 13);
    }
}

#[test]
fn calendar_text_lists_periods() {
    let home = temp_home();
    let output = run_cli_in_home(home.path(), &["calendar", "2026-08-20"]);
    assert_eq!(output.code, Some(0));
    assert!(output.stdout.starts_with("2 quarterly period(s) from 2026-08-20"));
    assert!(output.stdout.contains("2026-09-30"));
}

#[test]
fn generate_then_run_round_trip() {
    let home = temp_home();
    let path = home.path().join("random.csv").display().to_string();
    let generated = run_cli_in_home(
        home.path(),
        &["generate", &path, "--start", "2026-05-04", "--start-count", "60", "--json"],
    );
    assert_eq!(generated.code, Some(0), "stderr: {}", generated.stderr);
    let payload = parse_json(&generated.stdout);
    assert_eq!(payload["data"]["inception"], "2026-05-04");
    assert_eq!(payload["data"]["format"], "delta");

    let run = run_cli_in_home(home.path(), &["run", &path, "--format", "delta", "--json"]);
    assert_eq!(run.code, Some(0), "stderr: {}", run.stderr);
    assert_eq!(parse_json(&run.stdout)["data"]["inception"], "2026-05-04");
}

#[test]
fn trials_json_counts_every_run() {
    let home = temp_home();
    let output = run_cli_in_home(
        home.path(),
        &["trials", "--runs", "4", "--year", "2026", "--seed", "8", "--json"],
    );
    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    let payload = parse_json(&output.stdout);
    assert_eq!(payload["data"]["runs"], 4);
    for substance in payload["data"]["substances"].as_array().cloned().unwrap_or_default() {
        let total = substance["severity_counts"]
            .as_object()
            .map(|counts| counts.values().filter_map(Value::as_u64).sum::<u64>())
            .unwrap_or_default();
        assert_eq!(total, 4);
    }
}

#[test]
fn data_errors_exit_with_one_and_a_guided_message() {
    let home = temp_home();
    let path = write_pool(
        home.path(),
        "gap.csv",
        &[("2026-01-01", 5), ("2026-01-02", 5), ("2026-01-04", 5)],
    );
    let text = run_cli_in_home(home.path(), &["run", &path]);
    assert_eq!(text.code, Some(1));
    assert!(text.stdout.contains("  Error:    population_gap"));
    assert!(text.stdout.contains("What to do next:"));

    let json = run_cli_in_home(home.path(), &["run", &path, "--json"]);
    assert_eq!(json.code, Some(1));
    let payload = parse_json(&json.stdout);
    assert_eq!(payload["error"]["code"], "population_gap");
    assert_eq!(payload["error"]["data"]["first_missing"], "2026-01-03");
    assert!(payload.get("ok").is_none());
}

#[test]
fn parse_errors_use_the_invalid_argument_contract() {
    let home = temp_home();
    let output = run_cli_in_home(home.path(), &["run", "pool.csv", "--substance", "drug", "--json"]);
    assert_eq!(output.code, Some(1));
    let payload = parse_json(&output.stdout);
    assert_eq!(payload["error"]["code"], "invalid_argument");
    assert!(
        payload["error"]["recovery_steps"][0]
            .as_str()
            .unwrap_or_default()
            .contains("poolquota run --help")
    );
}

#[test]
fn unwritable_state_home_exits_with_two() {
    let home = temp_home();
    let blocker = home.path().join("state");
    assert!(fs::write(&blocker, "not a directory").is_ok());
    let path = constant_year(home.path(), 10);
    let output = run_cli_in_home(home.path(), &["run", &path, "--persist", "--json"]);
    assert_eq!(output.code, Some(2));
    let payload = parse_json(&output.stdout);
    let code = payload["error"]["code"].as_str().unwrap_or_default();
    assert!(code.starts_with("store_"), "unexpected code {code}");
}

#[test]
fn debug_logging_goes_to_stderr_only() {
    let home = temp_home();
    let path = constant_year(home.path(), 20);
    let mut command = Command::new(env!("CARGO_BIN_EXE_poolquota"));
    command.args(["run", &path, "--json"]);
    command.env("POOLQUOTA_HOME", home.path().join("state"));
    command.env("POOLQUOTA_LOG", "debug");
    let output = command.output();
    assert!(output.is_ok());
    if let Ok(result) = output {
        assert!(result.status.success());
        let stdout = String::from_utf8_lossy(&result.stdout);
        parse_json(&stdout);
        assert!(!result.stderr.is_empty());
    }
}

#[test]
fn output_pipe_close_does_not_panic() {
    let home = temp_home();
    let mut producer = Command::new(env!("CARGO_BIN_EXE_poolquota"));
    producer.args(["calendar", "2026-01-01", "--cadence", "semi-monthly"]);
    producer.env("POOLQUOTA_HOME", home.path().join("state"));
    producer.stdout(Stdio::piped());
    producer.stderr(Stdio::piped());

    let spawned = producer.spawn();
    assert!(spawned.is_ok());
    if let Ok(mut child) = spawned {
        if let Some(stdout_pipe) = child.stdout.take() {
            let mut reader = BufReader::new(stdout_pipe);
            let mut first_line = String::new();
            assert!(reader.read_line(&mut first_line).is_ok());
            assert!(!first_line.is_empty());
        }
        let status = child.wait();
        assert!(status.is_ok());

        if let Some(mut stderr_pipe) = child.stderr.take() {
            let mut stderr = String::new();
            assert!(stderr_pipe.read_to_string(&mut stderr).is_ok());
            assert!(!stderr.contains("Broken pipe"));
            assert!(!stderr.contains("panicked"));
        }
    }
}
