//! Integration tests for running executables and attributing failures
//!
//! Fake QtTest executables write canned TAP logs the way QtTest does with
//! `-o file,tap`.
#![cfg(unix)]

mod common;

use common::{write_ctest, write_qttest, CannedRun, Exit, SPAWN_LOCK};
use qttest_core::correlate::ExpectedFailurePolicy;
use qttest_core::error::{CorrelationError, RunError};
use qttest_core::logger;
use qttest_core::process::OutputSink;
use qttest_core::{RunOptions, TestExecutable, TestSuite};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const TEST1_TAP: &str = "TAP version 13
# test1
ok 1 - initTestCase()
ok 2 - testA()
ok 3 - testB()
ok 4 - testC()
ok 5 - cleanupTestCase()
1..5
# tests 5
# pass 5
# fail 0
";

const TEST2_TAP: &str = "TAP version 13
# test2
ok 1 - initTestCase()
ok 2 - testD()
ok 3 - testE()
not ok 4 - testF()
  ---
  type: QVERIFY
  message: Verification failed
  wanted: true (false)
  found: false (false)
  expected: true (false)
  actual: false (false)
  at: test2::testF() (/src/qt_test/test2.cpp:13)
  file: /src/qt_test/test2.cpp
  line: 13
  ...
ok 5 - cleanupTestCase()
1..5
";

const TEST2_TESTF_TAP: &str = "TAP version 13
# test2
ok 1 - initTestCase()
not ok 2 - testF()
  ---
  type: QVERIFY
  message: Verification failed
  at: test2::testF() (/src/qt_test/test2.cpp:13)
  file: /src/qt_test/test2.cpp
  line: 13
  ...
ok 3 - cleanupTestCase()
1..3
";

const TEST2_TESTD_TAP: &str = "TAP version 13
# test2
ok 1 - initTestCase()
ok 2 - testD()
ok 3 - cleanupTestCase()
1..3
";

const TEST3_TAP: &str = "TAP version 13
# test3
ok 1 - initTestCase()
";

const XFAIL_TAP: &str = "TAP version 13
# test_xfail
ok 1 - initTestCase()
not ok 2 - testXFAIL() # TODO 'false' returned FALSE. (Expected)
  ---
  at: test_xfail::testXFAIL() (/src/qt_test/test_xfail.cpp:10)
  file: /src/qt_test/test_xfail.cpp
  line: 10
  ...
ok 3 - testXPASS() # TODO 'true' returned TRUE unexpectedly. (Not expected)
not ok 4 - testMixXFAILWithFAIL() # TODO 'false' returned FALSE. (To be fixed)
  ---
  at: test_xfail::testMixXFAILWithFAIL() (/src/qt_test/test_xfail.cpp:20)
  file: /src/qt_test/test_xfail.cpp
  line: 20
  ...
not ok 4 - testMixXFAILWithFAIL()
  ---
  type: QVERIFY
  at: test_xfail::testMixXFAILWithFAIL() (/src/qt_test/test_xfail.cpp:22)
  file: /src/qt_test/test_xfail.cpp
  line: 22
  ...
ok 5 - cleanupTestCase()
1..5
";

/// test1 passes, test2's testF fails, test3 dies in its first slot
fn write_project(dir: &Path) -> PathBuf {
    let test1 = write_qttest(
        dir,
        "test1",
        &["testA", "testB", "testC"],
        &[CannedRun {
            slot: None,
            tap: TEST1_TAP,
            exit: Exit::Code(0),
        }],
    );
    let test2 = write_qttest(
        dir,
        "test2",
        &["testD", "testE", "testF"],
        &[
            CannedRun {
                slot: None,
                tap: TEST2_TAP,
                exit: Exit::Code(1),
            },
            CannedRun {
                slot: Some("testF"),
                tap: TEST2_TESTF_TAP,
                exit: Exit::Code(1),
            },
            CannedRun {
                slot: Some("testD"),
                tap: TEST2_TESTD_TAP,
                exit: Exit::Code(0),
            },
        ],
    );
    let test3 = write_qttest(
        dir,
        "test3",
        &["testH", "testI", "testJ"],
        &[CannedRun {
            slot: None,
            tap: TEST3_TAP,
            exit: Exit::Killed,
        }],
    );
    write_ctest(dir, &[test1, test2, test3])
}

async fn discovered_suite(dir: &Path) -> TestSuite {
    let ctest = write_project(dir);
    let mut suite = TestSuite::default().with_ctest_program(&ctest);
    suite.discover(dir).await;
    assert_eq!(suite.len(), 3);
    assert!(suite.introspect_all().await.is_empty());
    suite
}

#[tokio::test]
async fn test_run_all_executables() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let mut suite = discovered_suite(temp_dir.path()).await;

    let options = RunOptions::default();
    let mut results = Vec::new();
    for ex in suite.executables_mut() {
        results.push(ex.run(None, &options).await.unwrap());
    }
    assert_eq!(results, vec![true, false, false]);

    let executables = suite.executables();
    assert_eq!(executables[0].last_exit_code(), Some(0));
    assert_ne!(executables[1].last_exit_code(), Some(0));
    assert!(executables[1].last_exit_code().is_some());
    assert_eq!(executables[2].last_exit_code(), Some(-1));

    let failure = executables[1]
        .slot_by_name("testF")
        .and_then(|slot| slot.last_failure())
        .expect("testF should have failed");
    assert_eq!(failure.slot_name, "testF");
    assert!(failure.file_path.as_ref().unwrap().ends_with("test2.cpp"));
    assert!(failure.line_number.unwrap() > 0);

    for slot in executables[0].slots().unwrap() {
        assert!(slot.last_failure().is_none());
    }
    assert!(executables[1].slot_by_name("testD").unwrap().last_failure().is_none());
    // A crash is not pinned on any slot
    for slot in executables[2].slots().unwrap() {
        assert!(slot.last_failure().is_none());
    }
}

#[tokio::test]
async fn test_run_single_slot() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let mut suite = discovered_suite(dir).await;

    let test2 = suite.get_mut(&dir.join("test2").display().to_string()).unwrap();
    let options = RunOptions::default();

    assert!(!test2.run(Some("testF"), &options).await.unwrap());
    assert!(dir.join("test2_testF.tap").exists());
    assert!(test2.slot_by_name("testF").unwrap().last_failure().is_some());
    // Single-slot runs leave the executable's exit code alone
    assert_eq!(test2.last_exit_code(), None);

    assert!(test2.run(Some("testD"), &options).await.unwrap());
    assert!(test2.slot_by_name("testD").unwrap().last_failure().is_none());
    assert!(test2.slot_by_name("testF").unwrap().last_failure().is_some());
}

#[tokio::test]
async fn test_slot_rerun_replaces_its_own_failure() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let failing = [CannedRun {
        slot: Some("testF"),
        tap: TEST2_TESTF_TAP,
        exit: Exit::Code(1),
    }];
    let path = write_qttest(dir, "test2", &["testD", "testF"], &failing);
    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();

    let options = RunOptions::default();
    assert!(!exe.run(Some("testF"), &options).await.unwrap());
    assert!(exe.slot_by_name("testF").unwrap().last_failure().is_some());

    // testF gets fixed and rebuilt
    write_qttest(
        dir,
        "test2",
        &["testD", "testF"],
        &[CannedRun {
            slot: Some("testF"),
            tap: "TAP version 13\nok 1 - testF()\n1..1\n",
            exit: Exit::Code(0),
        }],
    );

    assert!(exe.run(Some("testF"), &options).await.unwrap());
    assert!(exe.slot_by_name("testF").unwrap().last_failure().is_none());
}

#[tokio::test]
async fn test_unknown_slot_is_rejected_before_spawning() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let mut suite = discovered_suite(dir).await;

    let test1 = suite.get_mut(&dir.join("test1").display().to_string()).unwrap();
    let err = test1
        .run(Some("testZ"), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::UnknownSlot { ref slot, .. } if slot == "testZ"));
    assert!(!dir.join("test1_testZ.tap").exists());
}

#[tokio::test]
async fn test_full_run_clears_previous_failures() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let path = write_qttest(
        dir,
        "test2",
        &["testD", "testF"],
        &[
            CannedRun {
                slot: Some("testF"),
                tap: TEST2_TESTF_TAP,
                exit: Exit::Code(1),
            },
            CannedRun {
                slot: None,
                tap: TEST2_TESTD_TAP,
                exit: Exit::Code(0),
            },
        ],
    );
    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();

    let options = RunOptions::default();
    exe.run(Some("testF"), &options).await.unwrap();
    assert!(exe.slot_by_name("testF").unwrap().last_failure().is_some());

    // The full run reports fewer failures than the slot run did
    assert!(exe.run(None, &options).await.unwrap());
    assert!(exe.slot_by_name("testF").unwrap().last_failure().is_none());
    assert_eq!(exe.last_exit_code(), Some(0));
}

#[tokio::test]
async fn test_expected_failures_and_unexpected_passes() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let path = write_qttest(
        dir,
        "test_xfail",
        &["testXFAIL", "testXPASS", "testMixXFAILWithFAIL"],
        &[CannedRun {
            slot: None,
            tap: XFAIL_TAP,
            exit: Exit::Code(2),
        }],
    );
    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();

    assert!(!exe.run(None, &RunOptions::default()).await.unwrap());

    assert!(exe.slot_by_name("testXFAIL").unwrap().last_failure().is_none());

    let xpass = exe.slot_by_name("testXPASS").unwrap().last_failure().unwrap();
    assert_eq!(xpass.file_path, None);
    assert_eq!(xpass.line_number, None);

    let mixed = exe
        .slot_by_name("testMixXFAILWithFAIL")
        .unwrap()
        .last_failure()
        .unwrap();
    assert_eq!(mixed.line_number, Some(22));
}

#[tokio::test]
async fn test_custom_unexpected_pass_marker() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let path = write_qttest(
        dir,
        "test_xfail",
        &["testXFAIL", "testXPASS", "testMixXFAILWithFAIL"],
        &[CannedRun {
            slot: None,
            tap: XFAIL_TAP,
            exit: Exit::Code(2),
        }],
    );
    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();

    let options =
        RunOptions::default().with_policy(ExpectedFailurePolicy::with_marker("XPASS-marker"));
    exe.run(None, &options).await.unwrap();

    assert!(exe.slot_by_name("testXPASS").unwrap().last_failure().is_none());
}

#[tokio::test]
async fn test_output_is_streamed_to_sink() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let path = write_qttest(
        dir,
        "test1",
        &["testA"],
        &[CannedRun {
            slot: None,
            tap: TEST1_TAP,
            exit: Exit::Code(0),
        }],
    );

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let sink: OutputSink = Arc::new(move |line: &str| {
        sink_lines.lock().unwrap().push(line.to_string());
    });

    let mut exe = TestExecutable::new(&path, dir);
    assert!(exe.run(None, &RunOptions::default().with_output(sink)).await.unwrap());

    assert!(lines.lock().unwrap().iter().any(|line| line == "running all"));
}

#[tokio::test]
async fn test_run_in_custom_cwd() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let path = write_qttest(
        dir,
        "test1",
        &["testA", "testB", "testC"],
        &[CannedRun {
            slot: None,
            tap: TEST1_TAP,
            exit: Exit::Code(0),
        }],
    );

    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();
    assert!(exe
        .run(None, &RunOptions::default().with_cwd(cwd.path()))
        .await
        .unwrap());

    assert!(cwd.path().join("test1.tap").exists());
    assert!(!dir.join("test1.tap").exists());
}

#[tokio::test]
async fn test_missing_log_is_logged_not_propagated() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    // No canned run: the process exits 0 without writing a log
    let path = write_qttest(dir, "test_nolog", &["testA"], &[]);

    let (logger, lines) = logger::collecting();
    let mut exe = TestExecutable::new(&path, dir).with_logger(logger);
    exe.introspect().await.unwrap();

    assert!(exe.run(None, &RunOptions::default()).await.unwrap());
    assert!(lines
        .lock()
        .unwrap()
        .iter()
        .any(|line| line.contains("Failed to read log file")));

    let err = exe
        .correlate(dir, None, &ExpectedFailurePolicy::default())
        .unwrap_err();
    assert!(matches!(err, CorrelationError::Unreadable { .. }));
}

#[tokio::test]
async fn test_stale_log_is_not_reused() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let path = write_qttest(dir, "test2", &["testD", "testF"], &[]);
    std::fs::write(dir.join("test2.tap"), TEST2_TAP).unwrap();

    let mut exe = TestExecutable::new(&path, dir);
    exe.introspect().await.unwrap();
    exe.run(None, &RunOptions::default()).await.unwrap();

    assert!(!dir.join("test2.tap").exists());
    assert!(exe.slot_by_name("testF").unwrap().last_failure().is_none());
}

#[tokio::test]
async fn test_failed_log_removal_is_logged() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let path = write_qttest(dir, "test_blocked", &["testA"], &[]);
    // A directory where the log file goes can't be removed with remove_file
    std::fs::create_dir(dir.join("test_blocked.tap")).unwrap();

    let (logger, lines) = logger::collecting();
    let mut exe = TestExecutable::new(&path, dir).with_logger(logger);
    exe.introspect().await.unwrap();
    exe.run(None, &RunOptions::default()).await.unwrap();

    assert!(lines
        .lock()
        .unwrap()
        .iter()
        .any(|line| line.contains("Failed to remove stale log file")));
}
