//! CLI Integration Tests
//!
//! Tests for:
//! - Flag and subcommand recognition (--format, --junit-xml, run --slot)
//! - Settings resolution from qttest.toml
//! - Reporters fed from real executables
//! - The qttest binary end to end against a fake ctest

#[cfg(unix)]
mod common;

use clap::Parser;
use qttest_core::config::{Cli, Commands, OutputFormat, Settings, CONFIG_FILE_NAME};
use qttest_core::junit::JunitReporter;
use qttest_core::paths::MatchPolicy;
use qttest_core::reporter::{
    ExecutableReport, HumanReporter, JsonReporter, MultiReporter, Reporter,
};
use qttest_core::TestExecutable;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_cli_format_flag() {
    let cli = Cli::try_parse_from(["qttest", "--format", "json", "list"]).unwrap();
    assert_eq!(cli.format, OutputFormat::Json);
    assert_eq!(cli.command, Some(Commands::List));
}

#[test]
fn test_cli_defaults_without_subcommand() {
    let cli = Cli::try_parse_from(["qttest"]).unwrap();
    assert_eq!(cli.command, None);
    assert!(!cli.verbose);
    assert!(cli.junit_xml.is_none());
}

#[test]
fn test_cli_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "qttest",
        "run",
        "--show-output",
        "--junit-xml",
        "report.xml",
        "--exclude",
        "tst_view",
        "--exclude",
        "tst_window",
    ])
    .unwrap();

    assert_eq!(cli.junit_xml, Some(PathBuf::from("report.xml")));
    assert_eq!(cli.exclude, vec!["tst_view", "tst_window"]);
    assert_eq!(
        cli.command,
        Some(Commands::Run {
            slot: None,
            cwd: None,
            show_output: true
        })
    );
}

#[test]
fn test_cli_target_requires_codemodel() {
    assert!(Cli::try_parse_from(["qttest", "target", "/build/test1"]).is_err());
}

#[test]
fn test_settings_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &config,
        "loose_match = true\nhelp_filter = true\nexclude = [\"tst_view\"]\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "qttest".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ])
    .unwrap();
    let settings = Settings::from_cli(&cli).unwrap();

    assert_eq!(settings.match_policy, MatchPolicy::BasenameIfMissing);
    assert!(settings.help_filter);
    assert!(settings.exclude.unwrap().is_match("/build/tst_view"));
}

#[test]
fn test_reporters_accept_unintrospected_executable() {
    let exe = TestExecutable::new("/build/test1", "/build");
    let report = ExecutableReport::from_run(&exe, None, false, 12);

    let reporters: Vec<Box<dyn Reporter>> = vec![Box::new(HumanReporter), Box::new(JsonReporter)];
    let mut multi = MultiReporter::new(reporters);
    multi.on_run_start(1);
    multi.on_executable_start(&report.id, None);
    multi.on_executable_finished(&report);
    multi.on_run_finished(0, 1, 12);
}

#[test]
fn test_junit_reporter_through_multi_reporter() {
    let temp_dir = TempDir::new().unwrap();
    let xml_path = temp_dir.path().join("junit.xml");

    let exe = TestExecutable::new("/build/test1", "/build");
    let report = ExecutableReport::from_run(&exe, None, true, 3);

    let mut multi = MultiReporter::new(vec![
        Box::new(HumanReporter),
        Box::new(JunitReporter::new(xml_path.clone())),
    ]);
    multi.on_run_start(1);
    multi.on_executable_finished(&report);
    multi.on_run_finished(1, 0, 3);

    let xml = std::fs::read_to_string(&xml_path).unwrap();
    assert!(xml.contains("<testsuites>"));
    assert!(xml.contains("<testcase name=\"test1\""));
    assert!(!xml.contains("<failure"));
}

#[cfg(unix)]
mod binary {
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    use super::common::{write_ctest, write_qttest, CannedRun, Exit, SPAWN_LOCK};

    const PASSING_TAP: &str = "TAP version 13\nok 1 - initTestCase()\nok 2 - testA()\nok 3 - cleanupTestCase()\n1..3\n";
    const FAILING_TAP: &str = "TAP version 13
not ok 1 - testB()
  ---
  file: /src/tst_b.cpp
  line: 7
  ...
1..1
";

    fn project(dir: &Path) -> std::path::PathBuf {
        let a = write_qttest(
            dir,
            "tst_a",
            &["testA"],
            &[CannedRun {
                slot: None,
                tap: PASSING_TAP,
                exit: Exit::Code(0),
            }],
        );
        let b = write_qttest(
            dir,
            "tst_b",
            &["testB"],
            &[CannedRun {
                slot: None,
                tap: FAILING_TAP,
                exit: Exit::Code(1),
            }],
        );
        write_ctest(dir, &[a, b])
    }

    fn qttest(dir: &Path, ctest: &Path, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_qttest"))
            .current_dir(dir)
            .arg("-B")
            .arg(dir)
            .arg("--ctest")
            .arg(ctest)
            .arg("--no-linkage-filter")
            .args(args)
            .output()
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_prints_discovered_executables() {
        let _guard = SPAWN_LOCK.lock().await;
        let temp_dir = TempDir::new().unwrap();
        let ctest = project(temp_dir.path());

        let output = qttest(temp_dir.path(), &ctest, &["list"]);
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("tst_a"));
        assert!(lines[1].ends_with("tst_b"));
    }

    #[tokio::test]
    async fn test_slots_lists_slot_names() {
        let _guard = SPAWN_LOCK.lock().await;
        let temp_dir = TempDir::new().unwrap();
        let ctest = project(temp_dir.path());

        let output = qttest(temp_dir.path(), &ctest, &["slots"]);
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("    - testA\n"));
        assert!(stdout.contains("    - testB\n"));
    }

    #[tokio::test]
    async fn test_run_json_reports_failures() {
        let _guard = SPAWN_LOCK.lock().await;
        let temp_dir = TempDir::new().unwrap();
        let ctest = project(temp_dir.path());

        let output = qttest(temp_dir.path(), &ctest, &["--format", "json", "run"]);
        assert!(!output.status.success());

        // stdout carries nothing but NDJSON
        let stdout = String::from_utf8_lossy(&output.stdout);
        let events: Vec<serde_json::Value> = stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.first().unwrap()["event"], "run_start");
        assert_eq!(events.first().unwrap()["count"], 2);
        let finished = events.last().unwrap();
        assert_eq!(finished["event"], "run_finished");
        assert_eq!(finished["passed"], 1);
        assert_eq!(finished["failed"], 1);

        let failure = events
            .iter()
            .find(|e| e["event"] == "executable_finished" && e["status"] == "fail")
            .unwrap();
        assert_eq!(failure["failures"][0]["slot_name"], "testB");
        assert_eq!(failure["failures"][0]["line_number"], 7);
    }

    #[tokio::test]
    async fn test_run_unknown_slot_fails() {
        let _guard = SPAWN_LOCK.lock().await;
        let temp_dir = TempDir::new().unwrap();
        let ctest = project(temp_dir.path());

        let output = qttest(temp_dir.path(), &ctest, &["run", "--slot", "testZ"]);
        assert!(!output.status.success());
    }
}
