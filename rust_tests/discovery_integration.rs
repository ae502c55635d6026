//! Integration tests for ctest discovery, filtering and introspection
//!
//! ctest and the test executables are shell scripts, so these only run on
//! unix.
#![cfg(unix)]

mod common;

use common::{write_ctest, write_non_qttest, write_qttest, SPAWN_LOCK};
use qttest_core::ctest::CTest;
use qttest_core::error::{DiscoveryError, IntrospectionError};
use qttest_core::logger;
use qttest_core::{SlotState, TestExecutable, TestSuite};
use regex::Regex;
use tempfile::TempDir;

#[tokio::test]
async fn test_ctest_listing_via_fake_ctest() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let ctest = write_ctest(dir, &[dir.join("test1"), dir.join("test2")]);

    let tests = CTest::new(dir)
        .with_program(&ctest)
        .list_tests()
        .await
        .expect("listing should succeed");

    let labels: Vec<&str> = tests.iter().map(|t| t.label()).collect();
    assert_eq!(labels, vec!["test1", "test2"]);
    assert_eq!(tests[0].cwd, dir.to_string_lossy());
}

#[tokio::test]
async fn test_failing_ctest_is_reported() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let ctest = temp_dir.path().join("broken-ctest");
    common::write_script(&ctest, "echo 'no build dir' >&2\nexit 8\n");

    let err = CTest::new(temp_dir.path())
        .with_program(&ctest)
        .list_tests()
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Failed { code: 8, .. }));
}

#[tokio::test]
async fn test_silent_ctest_is_reported() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let ctest = temp_dir.path().join("silent-ctest");
    common::write_script(&ctest, "exit 0\n");

    let err = CTest::new(temp_dir.path())
        .with_program(&ctest)
        .list_tests()
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::EmptyOutput(_)));
}

#[tokio::test]
async fn test_discover_then_introspect() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let test1 = write_qttest(dir, "test1", &["testA", "testB", "testC"], &[]);
    let test2 = write_qttest(dir, "test2", &["testD", "testE", "testF"], &[]);
    let ctest = write_ctest(dir, &[test1.clone(), test2.clone()]);

    let (logger, lines) = logger::collecting();
    let mut suite = TestSuite::new(logger).with_ctest_program(&ctest);
    suite.discover(dir).await;

    assert_eq!(suite.len(), 2);
    assert!(suite.executables().iter().all(|ex| !ex.is_introspected()));
    assert!(lines
        .lock()
        .unwrap()
        .iter()
        .any(|line| line.contains("--show-only=json-v1")));

    let errors = suite.introspect_all().await;
    assert!(errors.is_empty());

    let slots: Vec<&str> = suite.executables()[1]
        .slots()
        .unwrap()
        .iter()
        .map(|slot| slot.name())
        .collect();
    assert_eq!(slots, vec!["testD", "testE", "testF"]);

    assert_eq!(suite.find_by_slot_name("testF").len(), 1);
    assert_eq!(
        suite.find_by_slot_name("testF")[0].path(),
        test2.as_path()
    );
    assert!(suite.find_by_slot_name("testZ").is_empty());

    let dump = suite.dump_slots();
    assert!(dump.contains(&format!("{}\n    - testA\n", test1.display())));
}

#[tokio::test]
async fn test_help_filter_drops_non_qttest_executables() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let qt = write_qttest(dir, "tst_docks", &["testA"], &[]);
    let doctest = write_non_qttest(dir, "doctest_runner");
    let ctest = write_ctest(dir, &[qt.clone(), doctest]);

    let mut suite = TestSuite::default().with_ctest_program(&ctest);
    suite.discover(dir).await;
    assert_eq!(suite.len(), 2);

    suite.filter_by_help_text().await;
    assert_eq!(suite.len(), 1);
    assert_eq!(suite.executables()[0].path(), qt.as_path());
}

#[tokio::test]
async fn test_linkage_filter_keeps_uninspectable_executables() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    // A shell script is not a dynamic executable, ldd can't tell
    let qt = write_qttest(dir, "tst_script", &["testA"], &[]);
    let mut suite = TestSuite::default();
    suite.push(TestExecutable::new(&qt, dir));

    suite.filter_by_linkage().await;
    assert_eq!(suite.len(), 1);
}

#[tokio::test]
async fn test_exclude_and_include_after_discovery() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let names = ["tst_docks", "tst_view", "tst_window", "tst_qtwidgets"];
    let executables: Vec<_> = names.iter().map(|name| dir.join(name)).collect();
    let ctest = write_ctest(dir, &executables);

    let mut suite = TestSuite::default().with_ctest_program(&ctest);
    suite.discover(dir).await;
    suite.exclude_matching(&Regex::new("tst_view|tst_window").unwrap());
    suite.retain_matching(&Regex::new("tst_qtwidgets").unwrap());

    assert_eq!(suite.len(), 1);
    assert_eq!(suite.executables()[0].label(), "tst_qtwidgets");
}

#[tokio::test]
async fn test_failed_introspection_leaves_state_untouched() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tst_broken");
    common::write_script(&path, "echo 'cannot load platform plugin' >&2\nexit 3\n");

    let mut exe = TestExecutable::new(&path, temp_dir.path());
    let err = exe.introspect().await.unwrap_err();

    match err {
        IntrospectionError::Failed { code, stderr, .. } => {
            assert_eq!(code, 3);
            assert!(stderr.contains("platform plugin"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(exe.slot_state(), SlotState::NotIntrospected));
}

#[tokio::test]
async fn test_executable_without_slots_is_introspected_empty() {
    let _guard = SPAWN_LOCK.lock().await;
    let temp_dir = TempDir::new().unwrap();
    let path = write_qttest(temp_dir.path(), "tst_empty", &[], &[]);

    let mut exe = TestExecutable::new(&path, temp_dir.path());
    exe.introspect().await.unwrap();

    assert!(exe.is_introspected());
    assert!(!exe.has_slots());
    assert_eq!(exe.slots().map(<[_]>::len), Some(0));
}
