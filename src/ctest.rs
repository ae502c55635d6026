//! Test discovery via `ctest --show-only=json-v1`
//!
//! Every test registered with `add_test()` becomes a `DiscoveredTest`. We
//! don't need a cmake plugin API for this, only a configured build directory.

use crate::error::DiscoveryError;
use crate::logger::Logger;
use crate::paths::basename_without_exe;
use crate::process;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CTEST: &str = "ctest";
const SHOW_ONLY_JSON: &str = "--show-only=json-v1";

/// Drivers that people sometimes call from `add_test()` instead of a real binary
const DRIVER_NAMES: [&str; 2] = ["ctest", "cmake"];

/// An individual ctest test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredTest {
    pub name: Option<String>,
    pub command: Vec<String>,
    pub cwd: String,
}

impl DiscoveredTest {
    pub fn id(&self) -> String {
        self.command.join(",")
    }

    pub fn executable_path(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn label(&self) -> &str {
        let path = self.executable_path();
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Empty commands and recursive ctest/cmake invocations are not tests
    fn is_valid(&self) -> bool {
        if self.command.is_empty() {
            return false;
        }
        let base = basename_without_exe(self.executable_path()).to_lowercase();
        !DRIVER_NAMES.contains(&base.as_str())
    }
}

// =============================================================================
// JSON Schema (json-v1)
// =============================================================================

#[derive(Deserialize)]
struct Listing {
    tests: Option<Vec<ListedTest>>,
}

#[derive(Deserialize)]
struct ListedTest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    command: Option<Vec<String>>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    properties: Vec<Property>,
}

#[derive(Deserialize)]
struct Property {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl ListedTest {
    fn into_discovered(self) -> DiscoveredTest {
        let cwd = self.cwd.or_else(|| {
            self.properties
                .iter()
                .find(|p| p.name == "WORKING_DIRECTORY")
                .and_then(|p| p.value.as_str().map(str::to_string))
        });

        DiscoveredTest {
            name: self.name,
            command: self.command.unwrap_or_default(),
            cwd: cwd.unwrap_or_default(),
        }
    }
}

/// Decodes ctest's json-v1 document. A document without `tests` is a
/// project with zero tests.
pub fn parse_listing(json: &str) -> Result<Vec<DiscoveredTest>, DiscoveryError> {
    let listing: Listing = serde_json::from_str(json)?;

    Ok(listing
        .tests
        .unwrap_or_default()
        .into_iter()
        .map(ListedTest::into_discovered)
        .filter(DiscoveredTest::is_valid)
        .collect())
}

// =============================================================================
// Lister
// =============================================================================

/// Lists the tests cmake registered in a build directory
#[derive(Debug, Clone)]
pub struct CTest {
    program: PathBuf,
    build_dir: PathBuf,
    logger: Logger,
}

impl CTest {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_CTEST),
            build_dir: build_dir.into(),
            logger: Logger::noop(),
        }
    }

    /// Use a specific ctest binary instead of the one in PATH
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Invokes `ctest --show-only=json-v1` in the build directory
    pub async fn list_tests(&self) -> Result<Vec<DiscoveredTest>, DiscoveryError> {
        if self.build_dir.as_os_str().is_empty() {
            return Err(DiscoveryError::EmptyBuildDir);
        }

        let program = self.program.display().to_string();
        self.logger.log(format!(
            "Running {} {} with cwd={}",
            program,
            SHOW_ONLY_JSON,
            self.build_dir.display()
        ));

        let captured = process::capture(&self.program, &[SHOW_ONLY_JSON], Some(&self.build_dir))
            .await
            .map_err(|source| DiscoveryError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !captured.success() {
            return Err(DiscoveryError::Failed {
                program,
                code: captured.code,
                build_dir: self.build_dir.clone(),
            });
        }

        if captured.stdout.trim().is_empty() {
            return Err(DiscoveryError::EmptyOutput(self.build_dir.clone()));
        }

        parse_listing(&captured.stdout)
    }
}
