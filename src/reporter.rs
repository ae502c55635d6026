//! Reporter Module: Trait-based output for Human (CLI) and Machine (JSON) formats
//!
//! ## Architecture
//!
//! - `Reporter` trait defines the event callbacks
//! - `JsonReporter` outputs NDJSON to stdout (for --format=json)
//! - `HumanReporter` outputs human-readable text to stderr
//!
//! When JsonReporter is active, ONLY valid JSON goes to stdout.
//! All other output (logs, errors, debug) must go to stderr.

use crate::executable::{Failure, TestExecutable};
use serde::Serialize;

/// Outcome of one slot after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub name: String,
    pub failure: Option<Failure>,
}

/// Outcome of running one executable (or one of its slots)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableReport {
    pub id: String,
    pub label: String,
    pub slot: Option<String>,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub slots: Vec<SlotReport>,
}

impl ExecutableReport {
    /// Snapshot of `executable` after `run(slot)` returned `passed`
    pub fn from_run(
        executable: &TestExecutable,
        slot: Option<&str>,
        passed: bool,
        duration_ms: u64,
    ) -> Self {
        let slots = executable
            .slots()
            .unwrap_or_default()
            .iter()
            .filter(|s| slot.map_or(true, |only| s.name() == only))
            .map(|s| SlotReport {
                name: s.name().to_string(),
                failure: s.last_failure().cloned(),
            })
            .collect();

        Self {
            id: executable.id(),
            label: executable.label(),
            slot: slot.map(str::to_string),
            passed,
            exit_code: executable.last_exit_code(),
            duration_ms,
            slots,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.slots.iter().filter_map(|s| s.failure.as_ref())
    }
}

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    /// Emitted at start of test run
    RunStart { count: usize },
    /// Emitted when an executable begins execution
    ExecutableStart {
        id: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        slot: Option<&'a str>,
    },
    /// Emitted when an executable completes
    ExecutableFinished {
        id: &'a str,
        status: &'a str, // "pass", "fail"
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        duration_ms: u64,
        failures: Vec<&'a Failure>,
    },
    /// Emitted at end of test run
    RunFinished {
        passed: usize,
        failed: usize,
        duration_ms: u64,
    },
    /// Emitted on fatal error
    Error { message: &'a str },
}

fn status_str(passed: bool) -> &'static str {
    if passed {
        "pass"
    } else {
        "fail"
    }
}

/// Reporter trait for output abstraction
pub trait Reporter {
    /// Called at start of test run
    fn on_run_start(&mut self, count: usize);

    /// Called when an executable begins execution
    fn on_executable_start(&mut self, id: &str, slot: Option<&str>);

    /// Called when an executable completes
    fn on_executable_finished(&mut self, report: &ExecutableReport);

    /// Called at end of test run
    fn on_run_finished(&mut self, passed: usize, failed: usize, duration_ms: u64);

    /// Called on fatal error
    fn on_error(&mut self, message: &str);
}

/// JSON Reporter - outputs NDJSON to stdout
pub struct JsonReporter;

impl JsonReporter {
    fn emit(event: &MachineEvent<'_>) {
        match serde_json::to_string(event) {
            // ONLY JsonReporter touches stdout
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("failed to serialize event: {}", e),
        }
    }
}

impl Reporter for JsonReporter {
    fn on_run_start(&mut self, count: usize) {
        Self::emit(&MachineEvent::RunStart { count });
    }

    fn on_executable_start(&mut self, id: &str, slot: Option<&str>) {
        Self::emit(&MachineEvent::ExecutableStart { id, slot });
    }

    fn on_executable_finished(&mut self, report: &ExecutableReport) {
        Self::emit(&MachineEvent::ExecutableFinished {
            id: &report.id,
            status: status_str(report.passed),
            exit_code: report.exit_code,
            duration_ms: report.duration_ms,
            failures: report.failures().collect(),
        });
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, duration_ms: u64) {
        Self::emit(&MachineEvent::RunFinished {
            passed,
            failed,
            duration_ms,
        });
    }

    fn on_error(&mut self, message: &str) {
        Self::emit(&MachineEvent::Error { message });
    }
}

/// Human Reporter - outputs readable text to stderr
pub struct HumanReporter;

impl Reporter for HumanReporter {
    fn on_run_start(&mut self, count: usize) {
        eprintln!("[qttest] Running {} executables...\n", count);
    }

    fn on_executable_start(&mut self, id: &str, slot: Option<&str>) {
        match slot {
            Some(name) => eprint!("  {} {} ... ", id, name),
            None => eprint!("  {} ... ", id),
        }
    }

    fn on_executable_finished(&mut self, report: &ExecutableReport) {
        if report.passed {
            eprintln!("✓ ({}ms)", report.duration_ms);
        } else {
            match report.exit_code {
                Some(code) if report.slot.is_none() => {
                    eprintln!("✗ exit {} ({}ms)", code, report.duration_ms)
                }
                _ => eprintln!("✗ ({}ms)", report.duration_ms),
            }
        }

        for failure in report.failures() {
            match failure.location() {
                Some(location) => eprintln!("    {} at {}", failure.slot_name, location),
                None => eprintln!("    {}", failure.slot_name),
            }
        }
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, duration_ms: u64) {
        eprintln!();
        eprintln!(
            "[qttest] {} passed, {} failed in {}ms",
            passed, failed, duration_ms
        );
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[qttest] FATAL ERROR: {}", message);
    }
}

// =============================================================================
// MultiReporter
// =============================================================================

/// MultiReporter - broadcasts events to multiple reporters
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn on_run_start(&mut self, count: usize) {
        for r in &mut self.reporters {
            r.on_run_start(count);
        }
    }

    fn on_executable_start(&mut self, id: &str, slot: Option<&str>) {
        for r in &mut self.reporters {
            r.on_executable_start(id, slot);
        }
    }

    fn on_executable_finished(&mut self, report: &ExecutableReport) {
        for r in &mut self.reporters {
            r.on_executable_finished(report);
        }
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, duration_ms: u64) {
        for r in &mut self.reporters {
            r.on_run_finished(passed, failed, duration_ms);
        }
    }

    fn on_error(&mut self, message: &str) {
        for r in &mut self.reporters {
            r.on_error(message);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_json_event_serialization() {
        let failure = Failure {
            slot_name: "testF".to_string(),
            file_path: Some(PathBuf::from("/src/test2.cpp")),
            line_number: Some(13),
        };
        let event = MachineEvent::ExecutableFinished {
            id: "/build/test2",
            status: "fail",
            exit_code: Some(1),
            duration_ms: 42,
            failures: vec![&failure],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"executable_finished\""));
        assert!(json.contains("\"status\":\"fail\""));
        assert!(json.contains("\"slot_name\":\"testF\""));
        assert!(json.contains("\"line_number\":13"));
    }

    #[test]
    fn test_json_event_skips_missing_location() {
        let failure = Failure {
            slot_name: "testXPASS".to_string(),
            file_path: None,
            line_number: None,
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert!(!json.contains("file_path"));
        assert!(!json.contains("line_number"));
    }

    #[test]
    fn test_executable_start_without_slot() {
        let event = MachineEvent::ExecutableStart {
            id: "/build/test1",
            slot: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"executable_start","id":"/build/test1"}"#);
    }

    #[test]
    fn test_error_event() {
        let event = MachineEvent::Error {
            message: "ctest not found",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
    }

    #[test]
    fn test_report_from_unintrospected_executable() {
        let exe = TestExecutable::new("/build/test1", "/build");
        let report = ExecutableReport::from_run(&exe, None, true, 5);
        assert_eq!(report.label, "test1");
        assert!(report.slots.is_empty());
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn test_multi_reporter_creation() {
        let reporters: Vec<Box<dyn Reporter>> = vec![Box::new(HumanReporter)];
        let mut multi = MultiReporter::new(reporters);
        multi.on_run_start(0);
        multi.on_run_finished(0, 0, 0);
    }
}
