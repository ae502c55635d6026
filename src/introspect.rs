//! Slot discovery and QtTest detection
//!
//! - `-functions` lists the runnable test functions
//! - `-help` tells QtTest binaries apart from doctest & co
//! - `ldd` / `otool -L` check linkage against the QtTest library

use crate::error::IntrospectionError;
use crate::executable::{Slot, SlotState, TestExecutable};
use crate::process;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::sync::OnceLock;

const FUNCTIONS_FLAG: &str = "-functions";
const HELP_FLAG: &str = "-help";

/// Only QtTest's usage text mentions this
pub const HELP_SIGNATURE: &str = "[testfunction[:testdata]]";

/// Turns `-functions` output into slot names, keeping the listed order
pub fn parse_function_list(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .lines()
        .map(str::trim)
        .map(|line| line.strip_suffix("()").unwrap_or(line).trim_end())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

fn qttest_library_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"libQt\d+Test(_debug)?(\.\d+)*\.(so|dylib)|QtTest\.framework")
            .expect("static pattern")
    })
}

/// Whether `ldd`/`otool` output mentions the QtTest runtime, any major version
pub fn mentions_qttest_library(output: &str) -> bool {
    qttest_library_pattern().is_match(output)
}

/// Dynamic-dependency lister for this platform, if there is one
fn linkage_tool() -> Option<(&'static str, &'static [&'static str])> {
    const LDD_ARGS: &[&str] = &[];
    const OTOOL_ARGS: &[&str] = &["-L"];

    if cfg!(target_os = "linux") {
        Some(("ldd", LDD_ARGS))
    } else if cfg!(target_os = "macos") {
        Some(("otool", OTOOL_ARGS))
    } else {
        None
    }
}

impl TestExecutable {
    /// Calls `./yourqttest -functions` and stores the slots
    pub async fn introspect(&mut self) -> Result<(), IntrospectionError> {
        if !self.path().exists() {
            return Err(IntrospectionError::MissingExecutable(
                self.path().to_path_buf(),
            ));
        }

        let captured = process::capture(self.path(), &[FUNCTIONS_FLAG], Some(self.build_dir()))
            .await
            .map_err(|source| IntrospectionError::Spawn {
                path: self.path().to_path_buf(),
                source,
            })?;

        if !captured.success() {
            return Err(IntrospectionError::Failed {
                code: captured.code,
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }

        let parent = self.path().to_path_buf();
        let slots = parse_function_list(&captured.stdout)
            .into_iter()
            .map(|name| Slot::new(name, parent.clone()))
            .collect();
        self.slots = SlotState::Introspected(slots);
        Ok(())
    }

    /// Introspects unless it already happened
    pub async fn ensure_introspected(&mut self) -> Result<(), IntrospectionError> {
        if self.is_introspected() {
            return Ok(());
        }
        self.introspect().await
    }

    /// Whether this executable links to libQt*Test.
    ///
    /// Only implemented where a dependency lister exists (Linux, macOS);
    /// `Ok(None)` elsewhere.
    pub async fn links_to_qttest_lib(&self) -> std::io::Result<Option<bool>> {
        let Some((tool, tool_args)) = linkage_tool() else {
            return Ok(None);
        };

        if self.verbose {
            self.logger
                .log(format!("qttest: Running {} on {}", tool, self.path().display()));
        }

        let mut args: Vec<&OsStr> = tool_args.iter().map(|arg| OsStr::new(arg)).collect();
        args.push(self.path().as_os_str());
        let captured = process::capture(tool, &args, None).await?;

        if self.verbose {
            self.logger.log(&captured.stdout);
        }

        if !captured.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("qttest: Failed to run {} (code {})", tool, captured.code),
            ));
        }

        Ok(Some(mentions_qttest_library(&captured.stdout)))
    }

    /// Whether `-help` prints QtTest's usage text.
    ///
    /// A non-QtTest binary may ignore `-help` and run its tests instead.
    pub async fn is_qttest_via_help(&self) -> bool {
        match process::capture(self.path(), &[HELP_FLAG], None).await {
            Ok(captured) => captured.success() && captured.stdout.contains(HELP_SIGNATURE),
            Err(err) => {
                self.logger.log(format!(
                    "ERROR: Failed to run {} -help: {}",
                    self.path().display(),
                    err
                ));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_list_trims_and_strips_parens() {
        let names = parse_function_list("testA()\n testB()\n\n");
        assert_eq!(names, vec!["testA", "testB"]);
    }

    #[test]
    fn test_parse_function_list_handles_crlf_and_blanks() {
        let names = parse_function_list("initTestCase()\r\n   \r\ntestC()\r\n");
        assert_eq!(names, vec!["initTestCase", "testC"]);
    }

    #[test]
    fn test_parse_function_list_empty_output() {
        assert!(parse_function_list("").is_empty());
        assert!(parse_function_list("\n\n  \n").is_empty());
    }

    #[test]
    fn test_parse_function_list_collapses_duplicates() {
        let names = parse_function_list("testA()\ntestA()\ntestB()\n");
        assert_eq!(names, vec!["testA", "testB"]);
    }

    #[test]
    fn test_qttest_library_detection() {
        assert!(mentions_qttest_library(
            "\tlibQt5Test.so.5 => /usr/lib/libQt5Test.so.5 (0x00007f)"
        ));
        assert!(mentions_qttest_library(
            "\tlibQt6Test.so.6 => /opt/qt/lib/libQt6Test.so.6"
        ));
        assert!(mentions_qttest_library(
            "\t@rpath/QtTest.framework/Versions/A/QtTest (compatibility version 6.0.0)"
        ));
        assert!(mentions_qttest_library(
            "\t@rpath/libQt6Test.6.dylib (compatibility version 6.0.0, current version 6.5.3)"
        ));
        assert!(mentions_qttest_library(
            "\t/usr/local/lib/libQt5Test_debug.5.15.2.dylib"
        ));
        assert!(!mentions_qttest_library(
            "\tlibQt6Core.so.6 => /opt/qt/lib/libQt6Core.so.6"
        ));
    }

    #[tokio::test]
    async fn test_introspect_missing_file() {
        let mut exe = TestExecutable::new("/definitely/not/here/tst_x", "/tmp");
        let err = exe.introspect().await.unwrap_err();
        assert!(matches!(err, IntrospectionError::MissingExecutable(_)));
        assert!(!exe.is_introspected());
    }
}
