//! JUnit XML Reporter for CI Integration
//!
//! One `<testsuite>` per executable, one `<testcase>` per slot. Monolithic
//! executables get a single case named after the executable.

use crate::reporter::{ExecutableReport, Reporter};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Suite that collects run errors such as unknown slots or spawn failures
const ERRORS_SUITE: &str = "qttest";

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "$text")]
    body: String,
}

impl TestSuite {
    fn from_report(report: &ExecutableReport) -> Self {
        let time = report.duration_ms as f64 / 1000.0;

        let cases: Vec<TestCase> = if report.slots.is_empty() {
            vec![TestCase {
                name: report.label.clone(),
                classname: report.label.clone(),
                time,
                failure: (!report.passed).then(|| Failure {
                    message: "Test failed".to_string(),
                    body: match report.exit_code {
                        Some(code) => format!("exit code {}", code),
                        None => "test failed".to_string(),
                    },
                }),
                error: None,
            }]
        } else {
            report
                .slots
                .iter()
                .map(|slot| TestCase {
                    name: slot.name.clone(),
                    classname: report.label.clone(),
                    time: 0.0,
                    failure: slot.failure.as_ref().map(|f| Failure {
                        message: "Test failed".to_string(),
                        body: f.location().unwrap_or_else(|| f.slot_name.clone()),
                    }),
                    error: None,
                })
                .collect()
        };

        // A crash may fail the executable without any slot failure
        let errors = usize::from(!report.passed && cases.iter().all(|c| c.failure.is_none()));

        Self {
            name: report.id.clone(),
            tests: cases.len(),
            failures: cases.iter().filter(|c| c.failure.is_some()).count(),
            errors,
            time,
            cases,
        }
    }

    /// Errors that aren't tied to a test result, as `<error>` cases
    fn from_errors(messages: &[String]) -> Self {
        let cases: Vec<TestCase> = messages
            .iter()
            .enumerate()
            .map(|(i, message)| TestCase {
                name: format!("error {}", i + 1),
                classname: ERRORS_SUITE.to_string(),
                time: 0.0,
                failure: None,
                error: Some(Failure {
                    message: message.clone(),
                    body: message.clone(),
                }),
            })
            .collect();

        Self {
            name: ERRORS_SUITE.to_string(),
            tests: cases.len(),
            failures: 0,
            errors: cases.len(),
            time: 0.0,
            cases,
        }
    }
}

// =============================================================================
// JunitReporter
// =============================================================================

/// Reporter that buffers results and writes JUnit XML on completion
pub struct JunitReporter {
    output_path: PathBuf,
    suites: Vec<TestSuite>,
    errors: Vec<String>,
}

impl JunitReporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            output_path: path,
            suites: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn render(&mut self) -> Result<String, quick_xml::DeError> {
        let mut suites = std::mem::take(&mut self.suites);
        if !self.errors.is_empty() {
            suites.push(TestSuite::from_errors(&std::mem::take(&mut self.errors)));
        }
        let root = TestSuites { suites };
        let xml = quick_xml::se::to_string(&root)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }

    fn write(&mut self) -> anyhow::Result<()> {
        let xml = self.render()?;
        let mut writer = BufWriter::new(File::create(&self.output_path)?);
        writer.write_all(xml.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl Reporter for JunitReporter {
    fn on_run_start(&mut self, _count: usize) {
        self.suites.clear();
        self.errors.clear();
    }

    fn on_executable_start(&mut self, _id: &str, _slot: Option<&str>) {}

    fn on_executable_finished(&mut self, report: &ExecutableReport) {
        self.suites.push(TestSuite::from_report(report));
    }

    fn on_run_finished(&mut self, _passed: usize, _failed: usize, _duration_ms: u64) {
        match self.write() {
            Ok(()) => tracing::info!(
                "JUnit report written to {}",
                self.output_path.display()
            ),
            Err(e) => tracing::error!(
                "Failed to write JUnit report {}: {:#}",
                self.output_path.display(),
                e
            ),
        }
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable;
    use crate::reporter::SlotReport;
    use tempfile::TempDir;

    fn report(passed: bool, slots: Vec<SlotReport>) -> ExecutableReport {
        ExecutableReport {
            id: "/build/test2".to_string(),
            label: "test2".to_string(),
            slot: None,
            passed,
            exit_code: Some(if passed { 0 } else { 1 }),
            duration_ms: 1500,
            slots,
        }
    }

    fn slot(name: &str, line: Option<u32>) -> SlotReport {
        SlotReport {
            name: name.to_string(),
            failure: line.map(|line| executable::Failure {
                slot_name: name.to_string(),
                file_path: Some(PathBuf::from("/src/test2.cpp")),
                line_number: Some(line),
            }),
        }
    }

    #[test]
    fn test_suite_per_executable_case_per_slot() {
        let suite = TestSuite::from_report(&report(
            false,
            vec![slot("testD", None), slot("testF", Some(13))],
        ));
        assert_eq!(suite.tests, 2);
        assert_eq!(suite.failures, 1);
        assert_eq!(suite.errors, 0);
        assert!((suite.time - 1.5).abs() < 0.001);
        assert_eq!(suite.cases[1].classname, "test2");
        assert_eq!(
            suite.cases[1].failure.as_ref().unwrap().body,
            "/src/test2.cpp:13"
        );
    }

    #[test]
    fn test_monolithic_executable_is_one_case() {
        let suite = TestSuite::from_report(&report(false, vec![]));
        assert_eq!(suite.tests, 1);
        assert_eq!(suite.failures, 1);
        assert_eq!(suite.cases[0].name, "test2");
        assert_eq!(suite.cases[0].failure.as_ref().unwrap().body, "exit code 1");
    }

    #[test]
    fn test_crash_without_slot_failures_is_error() {
        let suite = TestSuite::from_report(&report(false, vec![slot("testH", None)]));
        assert_eq!(suite.failures, 0);
        assert_eq!(suite.errors, 1);
    }

    #[test]
    fn test_report_is_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junit.xml");
        let mut reporter = JunitReporter::new(path.clone());

        reporter.on_run_start(1);
        reporter.on_executable_finished(&report(false, vec![slot("testF", Some(13))]));
        reporter.on_run_finished(0, 1, 1500);

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuite name=\"/build/test2\""));
        assert!(xml.contains("<testcase name=\"testF\""));
        assert!(xml.contains("/src/test2.cpp:13"));
    }

    #[test]
    fn test_run_errors_are_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junit.xml");
        let mut reporter = JunitReporter::new(path.clone());

        reporter.on_run_start(1);
        reporter.on_error("failed to spawn /build/test4: No such file or directory");
        reporter.on_executable_finished(&report(true, vec![]));
        reporter.on_run_finished(1, 0, 10);

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<testsuite name=\"qttest\""));
        assert!(xml.contains("<error message=\"failed to spawn /build/test4"));
        assert!(reporter.errors.is_empty());
    }

    #[test]
    fn test_run_start_clears_state() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_executable_finished(&report(true, vec![]));
        reporter.on_error("some error");

        reporter.on_run_start(0);
        assert!(reporter.suites.is_empty());
        assert!(reporter.errors.is_empty());
    }
}
