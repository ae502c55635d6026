//! Integration tests for codemodel lookups
//!
//! Codemodels are shaped like the ones cmake-tools hands to its extensions.

use qttest_core::codemodel::{sources_for_executable, target_name_for_executable, CodeModel};
use qttest_core::logger::{self, Logger};
use qttest_core::paths::MatchPolicy;
use std::path::PathBuf;
use tempfile::TempDir;

const CODEMODEL: &str = r#"{
  "kind": "codemodel",
  "projects": [
    {
      "name": "qt_test",
      "targets": [
        {
          "name": "test1_autogen",
          "type": "UTILITY",
          "sourceDirectory": "/src/qt_test",
          "artifacts": []
        },
        {
          "name": "test1",
          "type": "EXECUTABLE",
          "sourceDirectory": "/src/qt_test",
          "artifacts": ["/build/qt_test/test1"],
          "fileGroups": [
            {
              "language": "CXX",
              "isGenerated": true,
              "sources": ["/build/qt_test/test1_autogen/mocs_compilation.cpp"]
            },
            {
              "language": "CXX",
              "sources": ["test1.cpp", "mocs_compilation.cpp", "helpers.cpp"]
            }
          ]
        },
        {
          "name": "test2",
          "type": "EXECUTABLE",
          "sourceDirectory": "/src/qt_test",
          "artifacts": [{ "path": "/build/qt_test/test2" }],
          "fileGroups": [
            { "language": "CXX", "sources": ["test2.cpp", "mocs_compilation_Debug.cpp"] }
          ]
        },
        {
          "name": "win_test",
          "type": "EXECUTABLE",
          "sourceDirectory": "C:/src/qt_test",
          "artifacts": ["C:\\build\\qt_test\\win_test.exe"],
          "fileGroups": [{ "language": "CXX", "sources": ["win_test.cpp"] }]
        }
      ]
    }
  ]
}"#;

fn codemodel() -> CodeModel {
    CodeModel::from_json(CODEMODEL).expect("codemodel should parse")
}

#[test]
fn test_target_name_for_known_executables() {
    let model = codemodel();
    let logger = Logger::noop();

    assert_eq!(
        target_name_for_executable("/build/qt_test/test1", &model, MatchPolicy::Exact, &logger),
        Some("test1".to_string())
    );
    assert_eq!(
        target_name_for_executable("/build/qt_test/test2", &model, MatchPolicy::Exact, &logger),
        Some("test2".to_string())
    );
}

#[test]
fn test_sources_skip_generated_groups_and_automoc() {
    let model = codemodel();
    let sources = sources_for_executable(
        "/build/qt_test/test1",
        &model,
        MatchPolicy::Exact,
        &Logger::noop(),
    );

    assert_eq!(
        sources,
        vec![
            PathBuf::from("/src/qt_test/test1.cpp"),
            PathBuf::from("/src/qt_test/helpers.cpp"),
        ]
    );

    // Multi-config generators suffix the automoc unit
    let sources = sources_for_executable(
        "/build/qt_test/test2",
        &model,
        MatchPolicy::Exact,
        &Logger::noop(),
    );
    assert_eq!(sources, vec![PathBuf::from("/src/qt_test/test2.cpp")]);
}

#[test]
fn test_backslashes_and_exe_suffix_are_normalized() {
    let model = codemodel();
    assert_eq!(
        target_name_for_executable(
            "C:/build/qt_test/win_test",
            &model,
            MatchPolicy::Exact,
            &Logger::noop()
        ),
        Some("win_test".to_string())
    );
}

#[test]
fn test_unknown_executable_is_logged() {
    let model = codemodel();
    let (logger, lines) = logger::collecting();

    assert_eq!(
        target_name_for_executable("/build/qt_test/test3", &model, MatchPolicy::Exact, &logger),
        None
    );
    assert!(sources_for_executable("/build/qt_test/test3", &model, MatchPolicy::Exact, &logger)
        .is_empty());

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("Could not find target for executable /build/qt_test/test3"));
    assert!(lines[1].contains("Could not find cpp files"));
}

#[test]
fn test_loose_match_recovers_bogus_artifact_paths() {
    // Some generators report artifacts under a directory that never exists
    let model = CodeModel::from_json(
        r#"{"projects":[{"targets":[{
            "name": "tst_docks",
            "type": "EXECUTABLE",
            "sourceDirectory": "/src/tests",
            "artifacts": ["/bogus/output/dir/tst_docks"],
            "fileGroups": [{ "language": "CXX", "sources": ["tst_docks.cpp"] }]
        }]}]}"#,
    )
    .unwrap();
    let real = "/build/bin/tst_docks";

    assert_eq!(
        target_name_for_executable(real, &model, MatchPolicy::Exact, &Logger::noop()),
        None
    );
    assert_eq!(
        target_name_for_executable(real, &model, MatchPolicy::BasenameIfMissing, &Logger::noop()),
        Some("tst_docks".to_string())
    );
}

#[test]
fn test_loose_match_respects_existing_artifacts() {
    // An artifact that exists on disk is a different executable with the same name
    let temp_dir = TempDir::new().unwrap();
    let artifact = temp_dir.path().join("tst_docks");
    std::fs::write(&artifact, b"").unwrap();

    let model = CodeModel::from_value(&serde_json::json!({
        "projects": [{ "targets": [{
            "name": "tst_docks",
            "type": "EXECUTABLE",
            "artifacts": [artifact.to_string_lossy()]
        }]}]
    }))
    .unwrap();

    assert_eq!(
        target_name_for_executable(
            "/build/bin/tst_docks",
            &model,
            MatchPolicy::BasenameIfMissing,
            &Logger::noop()
        ),
        None
    );
}
