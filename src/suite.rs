//! The list of all QtTest executables in a project

use crate::ctest::CTest;
use crate::error::IntrospectionError;
use crate::executable::TestExecutable;
use crate::logger::Logger;
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct TestSuite {
    executables: Vec<TestExecutable>,
    logger: Logger,
    ctest_program: Option<PathBuf>,
}

impl TestSuite {
    pub fn new(logger: Logger) -> Self {
        Self {
            executables: Vec::new(),
            logger,
            ctest_program: None,
        }
    }

    /// Use a specific ctest binary for discovery
    pub fn with_ctest_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ctest_program = Some(program.into());
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn executables(&self) -> &[TestExecutable] {
        &self.executables
    }

    pub fn executables_mut(&mut self) -> &mut [TestExecutable] {
        &mut self.executables
    }

    pub fn len(&self) -> usize {
        self.executables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }

    /// Appends an executable, handing it the suite's logger
    pub fn push(&mut self, executable: TestExecutable) {
        self.executables
            .push(executable.with_logger(self.logger.clone()));
    }

    pub fn get(&self, id: &str) -> Option<&TestExecutable> {
        self.executables.iter().find(|ex| ex.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TestExecutable> {
        self.executables.iter_mut().find(|ex| ex.id() == id)
    }

    /// Appends every executable ctest knows about in `build_dir`.
    /// On failure the suite is left untouched.
    pub async fn discover(&mut self, build_dir: &Path) {
        let mut ctest = CTest::new(build_dir).with_logger(self.logger.clone());
        if let Some(program) = &self.ctest_program {
            ctest = ctest.with_program(program);
        }

        match ctest.list_tests().await {
            Ok(tests) => {
                for test in tests {
                    self.push(TestExecutable::new(test.executable_path(), build_dir));
                }
            }
            Err(err) => {
                self.logger
                    .log(format!("ERROR: Failed to retrieve ctests! {}", err));
            }
        }
    }

    /// Removes executables that don't link to libQt*Test.
    ///
    /// Heuristic for skipping doctest and friends; only effective where a
    /// dependency lister exists. Executables that can't be inspected stay.
    pub async fn filter_by_linkage(&mut self) {
        let mut accepted = Vec::with_capacity(self.executables.len());
        for ex in std::mem::take(&mut self.executables) {
            match ex.links_to_qttest_lib().await {
                Ok(Some(false)) => {}
                Ok(_) => accepted.push(ex),
                Err(err) => {
                    self.logger.log(format!(
                        "ERROR: Could not inspect {}: {}",
                        ex.path().display(),
                        err
                    ));
                    accepted.push(ex);
                }
            }
        }
        self.executables = accepted;
    }

    /// Removes executables whose `-help` doesn't look like QtTest's
    pub async fn filter_by_help_text(&mut self) {
        let mut accepted = Vec::with_capacity(self.executables.len());
        for ex in std::mem::take(&mut self.executables) {
            if ex.is_qttest_via_help().await {
                accepted.push(ex);
            }
        }
        self.executables = accepted;
    }

    /// Removes any executable whose path matches `pattern`
    pub fn exclude_matching(&mut self, pattern: &Regex) {
        self.executables
            .retain(|ex| !pattern.is_match(&ex.path().to_string_lossy()));
    }

    /// Removes any executable whose path doesn't match `pattern`
    pub fn retain_matching(&mut self, pattern: &Regex) {
        self.executables
            .retain(|ex| pattern.is_match(&ex.path().to_string_lossy()));
    }

    /// Runs `-functions` on every executable not introspected yet.
    /// Returns the failures; other executables are unaffected.
    pub async fn introspect_all(&mut self) -> Vec<(PathBuf, IntrospectionError)> {
        let mut errors = Vec::new();
        for ex in &mut self.executables {
            if let Err(err) = ex.ensure_introspected().await {
                self.logger.log(format!("ERROR: {}", err));
                errors.push((ex.path().to_path_buf(), err));
            }
        }
        errors
    }

    /// All executables that contain a slot with the specified name
    pub fn find_by_slot_name(&self, name: &str) -> Vec<&TestExecutable> {
        self.executables
            .iter()
            .filter(|ex| ex.slot_by_name(name).is_some())
            .collect()
    }

    /// One path per line
    pub fn dump_executable_paths(&self) -> String {
        let mut out = String::new();
        for ex in &self.executables {
            let _ = writeln!(out, "{}", ex.path().display());
        }
        out
    }

    /// Paths followed by their slots, one per line
    pub fn dump_slots(&self) -> String {
        let mut out = String::new();
        for ex in &self.executables {
            let _ = writeln!(out, "{}", ex.path().display());
            for slot in ex.slots().unwrap_or_default() {
                let _ = writeln!(out, "    - {}", slot.name());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::{Slot, SlotState};

    fn exe(path: &str, slots: &[&str]) -> TestExecutable {
        let mut ex = TestExecutable::new(path, "/build");
        ex.slots = SlotState::Introspected(
            slots
                .iter()
                .map(|name| Slot::new(name.to_string(), PathBuf::from(path)))
                .collect(),
        );
        ex
    }

    fn suite(executables: Vec<TestExecutable>) -> TestSuite {
        let mut suite = TestSuite::default();
        for ex in executables {
            suite.push(ex);
        }
        suite
    }

    fn paths(suite: &TestSuite) -> Vec<String> {
        suite.executables().iter().map(TestExecutable::id).collect()
    }

    #[test]
    fn test_find_by_slot_name_in_suite_order() {
        let suite = suite(vec![
            exe("/build/E1", &["a", "b"]),
            exe("/build/E2", &["b", "c"]),
        ]);

        let found: Vec<String> = suite
            .find_by_slot_name("b")
            .into_iter()
            .map(TestExecutable::id)
            .collect();
        assert_eq!(found, vec!["/build/E1", "/build/E2"]);
        assert_eq!(suite.find_by_slot_name("a").len(), 1);
        assert!(suite.find_by_slot_name("non_existing").is_empty());
    }

    #[test]
    fn test_exclude_and_retain_preserve_order() {
        let mut suite = suite(vec![
            exe("/build/tst_docks", &[]),
            exe("/build/tst_view", &[]),
            exe("/build/tst_window", &[]),
            exe("/build/tst_multisplitter", &[]),
            exe("/build/tst_qtwidgets", &[]),
        ]);

        suite.exclude_matching(&Regex::new("(tst_view|tst_window)").unwrap());
        assert_eq!(
            paths(&suite),
            vec!["/build/tst_docks", "/build/tst_multisplitter", "/build/tst_qtwidgets"]
        );

        suite.retain_matching(&Regex::new("(tst_qtwidgets|tst_docks)").unwrap());
        assert_eq!(paths(&suite), vec!["/build/tst_docks", "/build/tst_qtwidgets"]);
    }

    #[test]
    fn test_dump_helpers() {
        let mut suite = suite(vec![exe("/build/test1", &["testA", "testB"])]);
        suite.push(TestExecutable::new("/build/mono", "/build"));

        assert_eq!(suite.dump_executable_paths(), "/build/test1\n/build/mono\n");
        assert_eq!(
            suite.dump_slots(),
            "/build/test1\n    - testA\n    - testB\n/build/mono\n"
        );
    }

    #[test]
    fn test_get_by_id() {
        let mut suite = suite(vec![exe("/build/test1", &[])]);
        assert!(suite.get("/build/test1").is_some());
        assert!(suite.get_mut("/build/test2").is_none());
        assert_eq!(suite.len(), 1);
        assert!(!suite.is_empty());
    }

    #[tokio::test]
    async fn test_discover_failure_leaves_suite_unchanged() {
        let (logger, sink) = crate::logger::collecting();
        let mut suite = TestSuite::new(logger).with_ctest_program("/definitely/not/ctest");
        suite.push(exe("/build/already_there", &[]));

        suite.discover(Path::new("/tmp")).await;

        assert_eq!(paths(&suite), vec!["/build/already_there"]);
        assert!(sink
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains("Failed to retrieve ctests")));
    }

    #[tokio::test]
    async fn test_introspect_all_reports_missing_files() {
        let mut suite = suite(vec![TestExecutable::new("/definitely/not/tst_x", "/build")]);
        let errors = suite.introspect_all().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].1, IntrospectionError::MissingExecutable(_)));
    }
}
