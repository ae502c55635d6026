//! Failure attribution
//!
//! Reads the TAP log written by the last run and pins every reportable
//! failure on the slot that produced it.

use crate::error::{AttributionError, CorrelationError};
use crate::executable::{Failure, TestExecutable};
use crate::tap::{self, Assertion};
use std::path::{Path, PathBuf};

/// QtTest's wording for a QEXPECT_FAIL whose check passed
pub const DEFAULT_UNEXPECTED_PASS_MARKER: &str = "returned TRUE unexpectedly";

/// What a single test point means for its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    /// QEXPECT_FAIL that failed, reported by QtTest as `not ok ... # TODO`
    ExpectedFail,
    /// QEXPECT_FAIL that passed, reported as `ok ... # TODO <marker>`
    UnexpectedPass,
}

impl Outcome {
    pub fn is_reportable(self) -> bool {
        matches!(self, Outcome::Fail | Outcome::UnexpectedPass)
    }
}

/// Classification rule for QEXPECT_FAIL annotated test points.
///
/// QtTest emits both expected failures and unexpected passes with a TODO
/// directive; only the directive text tells an unexpected pass apart from a
/// plain TODO, so the marker is configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFailurePolicy {
    pub unexpected_pass_marker: String,
}

impl Default for ExpectedFailurePolicy {
    fn default() -> Self {
        Self {
            unexpected_pass_marker: DEFAULT_UNEXPECTED_PASS_MARKER.to_string(),
        }
    }
}

impl ExpectedFailurePolicy {
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            unexpected_pass_marker: marker.into(),
        }
    }

    pub fn classify(&self, assertion: &Assertion) -> Outcome {
        match (assertion.ok, assertion.todo()) {
            (false, Some(_)) => Outcome::ExpectedFail,
            (false, None) => Outcome::Fail,
            (true, Some(todo)) if todo.contains(&self.unexpected_pass_marker) => {
                Outcome::UnexpectedPass
            }
            (true, _) => Outcome::Pass,
        }
    }
}

/// `testFoo(row1)` -> `testFoo`
pub fn slot_name_from_description(description: &str) -> &str {
    match (description.find('('), description.rfind(')')) {
        (Some(open), Some(close)) if close > open => description[..open].trim_end(),
        _ => description.trim(),
    }
}

/// Reportable failures of a parsed log, in log order
pub fn collect_failures(log: &tap::TapLog, policy: &ExpectedFailurePolicy) -> Vec<Failure> {
    log.assertions
        .iter()
        .filter(|assertion| policy.classify(assertion).is_reportable())
        .map(|assertion| {
            // An unexpected pass carries no file:line, leave it unset
            let diag = assertion.diagnostics.as_ref();
            Failure {
                slot_name: slot_name_from_description(&assertion.description).to_string(),
                file_path: diag.and_then(|d| d.file.as_ref()).map(PathBuf::from),
                line_number: diag.and_then(|d| d.line),
            }
        })
        .collect()
}

/// Result of attributing one log to an executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub attributed: usize,
    /// Failures naming slots the executable does not have
    pub unattributed: Vec<AttributionError>,
    /// Records skipped because they could not be parsed
    pub malformed_records: usize,
}

impl TestExecutable {
    /// Attributes the failures of the last run to slots.
    ///
    /// `slot` restricts attribution to a single-slot run. Failures for unknown
    /// slots are logged and dropped.
    pub fn correlate(
        &mut self,
        working_dir: &Path,
        slot: Option<&str>,
        policy: &ExpectedFailurePolicy,
    ) -> Result<CorrelationSummary, CorrelationError> {
        let tap_path = working_dir.join(self.tap_output_file_name(slot));
        let text = std::fs::read_to_string(&tap_path).map_err(|source| {
            self.logger.log("ERROR: Failed to read log file");
            CorrelationError::Unreadable {
                path: tap_path.clone(),
                source,
            }
        })?;

        let log = tap::parse(&text);
        if !text.trim().is_empty() && !log.has_tap_content() {
            return Err(CorrelationError::Malformed(tap_path));
        }

        for record in &log.malformed {
            self.logger.log(format!(
                "ERROR: Skipping malformed record at {}:{}: {}",
                tap_path.display(),
                record.log_line,
                record.reason
            ));
        }

        let mut summary = CorrelationSummary {
            malformed_records: log.malformed.len(),
            ..CorrelationSummary::default()
        };

        for failure in collect_failures(&log, policy) {
            if slot.is_some_and(|only| only != failure.slot_name) {
                // We executed a single slot, ignore anything else
                continue;
            }

            let executable = self.path().to_path_buf();
            match self.slot_by_name_mut(&failure.slot_name) {
                Some(target) => {
                    target.last_failure = Some(failure);
                    summary.attributed += 1;
                }
                None => {
                    let err = AttributionError {
                        executable,
                        slot: failure.slot_name,
                    };
                    self.logger.log(format!("ERROR: {}", err));
                    summary.unattributed.push(err);
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::{Slot, SlotState};
    use tempfile::TempDir;

    fn assertion(ok: bool, todo: Option<&str>) -> Assertion {
        Assertion {
            ok,
            number: Some(1),
            description: "testX()".to_string(),
            directive: todo.map(|t| tap::Directive::Todo(t.to_string())),
            diagnostics: None,
            log_line: 1,
        }
    }

    fn executable(dir: &Path, slots: &[&str]) -> TestExecutable {
        let path = dir.join("test2");
        let mut exe = TestExecutable::new(&path, dir);
        exe.slots = SlotState::Introspected(
            slots
                .iter()
                .map(|name| Slot::new(name.to_string(), path.clone()))
                .collect(),
        );
        exe
    }

    #[test]
    fn test_classify_expected_failure_outcomes() {
        let policy = ExpectedFailurePolicy::default();
        assert_eq!(policy.classify(&assertion(true, None)), Outcome::Pass);
        assert_eq!(policy.classify(&assertion(false, None)), Outcome::Fail);
        assert_eq!(
            policy.classify(&assertion(false, Some("'false' returned FALSE. (To be fixed)"))),
            Outcome::ExpectedFail
        );
        assert_eq!(
            policy.classify(&assertion(
                true,
                Some("'true' returned TRUE unexpectedly. (To be fixed)")
            )),
            Outcome::UnexpectedPass
        );
        assert_eq!(
            policy.classify(&assertion(true, Some("something else"))),
            Outcome::Pass
        );
    }

    #[test]
    fn test_custom_marker() {
        let policy = ExpectedFailurePolicy::with_marker("XPASS");
        assert_eq!(
            policy.classify(&assertion(true, Some("XPASS: fixed upstream"))),
            Outcome::UnexpectedPass
        );
        assert_eq!(
            policy.classify(&assertion(
                true,
                Some("'true' returned TRUE unexpectedly.")
            )),
            Outcome::Pass
        );
    }

    #[test]
    fn test_slot_name_from_description() {
        assert_eq!(slot_name_from_description("testF()"), "testF");
        assert_eq!(slot_name_from_description("testData(row 1)"), "testData");
        assert_eq!(slot_name_from_description("plain"), "plain");
        assert_eq!(slot_name_from_description("odd)("), "odd)(");
    }

    #[test]
    fn test_collect_failures_skips_expected_failures() {
        let log = tap::parse(
            "not ok 1 - testXFAIL() # TODO 'false' returned FALSE. (To be fixed)
  ---
  file: /src/test1.cpp
  line: 18
  ...
ok 2 - testXPASS() # TODO 'true' returned TRUE unexpectedly. (To be fixed)
not ok 3 - testF()
  ---
  file: /src/test2.cpp
  line: 13
  ...
",
        );
        let failures = collect_failures(&log, &ExpectedFailurePolicy::default());
        assert_eq!(failures.len(), 2);

        assert_eq!(failures[0].slot_name, "testXPASS");
        assert_eq!(failures[0].file_path, None);
        assert_eq!(failures[0].line_number, None);

        assert_eq!(failures[1].slot_name, "testF");
        assert_eq!(failures[1].file_path, Some(PathBuf::from("/src/test2.cpp")));
        assert_eq!(failures[1].line_number, Some(13));
    }

    #[test]
    fn test_correlate_attributes_and_drops_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let (logger, sink) = crate::logger::collecting();
        let mut exe = executable(temp_dir.path(), &["testD", "testF"]).with_logger(logger);

        std::fs::write(
            temp_dir.path().join("test2.tap"),
            "TAP version 13
not ok 1 - testF()
  ---
  file: /src/test2.cpp
  line: 13
  ...
not ok 2 - testGhost()
",
        )
        .unwrap();

        let summary = exe
            .correlate(temp_dir.path(), None, &ExpectedFailurePolicy::default())
            .unwrap();

        assert_eq!(summary.attributed, 1);
        assert_eq!(summary.unattributed.len(), 1);
        assert_eq!(summary.unattributed[0].slot, "testGhost");
        assert!(exe.slot_by_name("testD").unwrap().last_failure().is_none());
        let failure = exe.slot_by_name("testF").unwrap().last_failure().unwrap();
        assert_eq!(failure.line_number, Some(13));
        assert!(exe.slot_by_name("testGhost").is_none());
        assert!(sink
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains("testGhost")));
    }

    #[test]
    fn test_correlate_single_slot_ignores_others() {
        let temp_dir = TempDir::new().unwrap();
        let mut exe = executable(temp_dir.path(), &["testD", "testF"]);

        std::fs::write(
            temp_dir.path().join("test2_testF.tap"),
            "not ok 1 - testD()\nnot ok 2 - testF()\n",
        )
        .unwrap();

        let summary = exe
            .correlate(temp_dir.path(), Some("testF"), &ExpectedFailurePolicy::default())
            .unwrap();

        assert_eq!(summary.attributed, 1);
        assert!(exe.slot_by_name("testD").unwrap().last_failure().is_none());
        assert!(exe.slot_by_name("testF").unwrap().last_failure().is_some());
    }

    #[test]
    fn test_correlate_missing_log_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let mut exe = executable(temp_dir.path(), &["testD"]);
        let err = exe
            .correlate(temp_dir.path(), None, &ExpectedFailurePolicy::default())
            .unwrap_err();
        assert!(matches!(err, CorrelationError::Unreadable { .. }));
    }

    #[test]
    fn test_correlate_non_tap_log_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let mut exe = executable(temp_dir.path(), &["testD"]);
        std::fs::write(temp_dir.path().join("test2.tap"), "<xml>not tap</xml>\n").unwrap();

        let err = exe
            .correlate(temp_dir.path(), None, &ExpectedFailurePolicy::default())
            .unwrap_err();
        assert!(matches!(err, CorrelationError::Malformed(_)));
    }

    #[test]
    fn test_correlate_counts_malformed_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut exe = executable(temp_dir.path(), &["testD", "testF"]);
        std::fs::write(
            temp_dir.path().join("test2.tap"),
            "not ok 1 - testD()\n  ---\n  line: x\n  ...\nnot ok 2 - testF()\n",
        )
        .unwrap();

        let summary = exe
            .correlate(temp_dir.path(), None, &ExpectedFailurePolicy::default())
            .unwrap();
        assert_eq!(summary.malformed_records, 1);
        assert!(exe.slot_by_name("testD").unwrap().last_failure().is_none());
        assert!(exe.slot_by_name("testF").unwrap().last_failure().is_some());
    }
}
