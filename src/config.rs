//! Configuration Loader
//! - CLI argument parsing with clap
//! - Optional `qttest.toml` with project defaults; CLI flags win

use crate::correlate::ExpectedFailurePolicy;
use crate::ctest::DEFAULT_CTEST;
use crate::error::ConfigError;
use crate::paths::MatchPolicy;
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "qttest.toml";

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for results
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Human-readable CLI output (to stderr)
    #[default]
    Human,
    /// Machine-readable NDJSON (to stdout)
    Json,
}

/// qttest - discover and run QtTest executables of a CMake build
#[derive(Parser, Debug)]
#[command(name = "qttest", version, about = "Discover and run QtTest executables via CTest")]
pub struct Cli {
    /// CMake build directory (also: QTTEST_BUILD_DIR env var)
    #[arg(long, short = 'B', default_value = ".", env = "QTTEST_BUILD_DIR", global = true)]
    pub build_dir: PathBuf,

    /// ctest binary to use for discovery
    #[arg(long, global = true)]
    pub ctest: Option<PathBuf>,

    /// Configuration file (default: ./qttest.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Drop executables whose path matches this regex (repeatable)
    #[arg(long, global = true)]
    pub exclude: Vec<String>,

    /// Keep only executables whose path matches this regex (repeatable)
    #[arg(long, global = true)]
    pub include: Vec<String>,

    /// Keep executables even if they don't link to libQtTest
    #[arg(long, global = true)]
    pub no_linkage_filter: bool,

    /// Keep only executables whose -help output looks like QtTest's
    #[arg(long, global = true)]
    pub help_filter: bool,

    /// Compare basenames when the codemodel reports bogus artifact paths
    #[arg(long, global = true)]
    pub loose_match: bool,

    /// Output format (also: QTTEST_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "QTTEST_FORMAT", global = true)]
    pub format: OutputFormat,

    /// Path to generate JUnit XML report (also: QTTEST_JUNIT_XML env var)
    #[arg(long, env = "QTTEST_JUNIT_XML", global = true)]
    pub junit_xml: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Commands {
    /// List discovered test executables (default if no subcommand)
    List,
    /// List executables with their test slots
    Slots,
    /// Run the test executables
    Run {
        /// Only run this slot, in every executable that has it
        #[arg(long)]
        slot: Option<String>,
        /// Working directory for the test processes
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Forward test output to stderr
        #[arg(long)]
        show_output: bool,
    },
    /// Print the cmake target that builds an executable
    Target {
        /// CMake codemodel JSON (as provided by cmake-tools)
        #[arg(long)]
        codemodel: PathBuf,
        executable: String,
    },
    /// Print the C++ sources of an executable
    Sources {
        /// CMake codemodel JSON (as provided by cmake-tools)
        #[arg(long)]
        codemodel: PathBuf,
        executable: String,
    },
    /// Scan the build directory for executables without asking ctest
    Scan,
}

// =============================================================================
// qttest.toml
// =============================================================================

#[derive(Deserialize, Default, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub ctest: Option<PathBuf>,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub linkage_filter: Option<bool>,
    pub help_filter: Option<bool>,
    pub loose_match: Option<bool>,
    pub unexpected_pass_marker: Option<String>,
}

/// Reads `path`; a missing file means defaults
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// Effective Settings
// =============================================================================

/// CLI flags merged over `qttest.toml`
#[derive(Debug)]
pub struct Settings {
    pub build_dir: PathBuf,
    pub ctest: PathBuf,
    pub exclude: Option<Regex>,
    pub include: Option<Regex>,
    pub linkage_filter: bool,
    pub help_filter: bool,
    pub match_policy: MatchPolicy,
    pub expected_failures: ExpectedFailurePolicy,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let exclude: Vec<&String> = file.exclude.iter().chain(&cli.exclude).collect();
        let include: Vec<&String> = if cli.include.is_empty() {
            file.include.iter().collect()
        } else {
            cli.include.iter().collect()
        };

        let expected_failures = file
            .unexpected_pass_marker
            .map(ExpectedFailurePolicy::with_marker)
            .unwrap_or_default();

        Ok(Self {
            build_dir: cli.build_dir.clone(),
            ctest: cli
                .ctest
                .clone()
                .or(file.ctest)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CTEST)),
            exclude: any_of(&exclude)?,
            include: any_of(&include)?,
            linkage_filter: !cli.no_linkage_filter && file.linkage_filter.unwrap_or(true),
            help_filter: cli.help_filter || file.help_filter.unwrap_or(false),
            match_policy: MatchPolicy::from_loose(
                cli.loose_match || file.loose_match.unwrap_or(false),
            ),
            expected_failures,
        })
    }

    /// Loads the config file named on the command line, or `./qttest.toml`
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::resolve(cli, load_file_config(&path)?)
    }
}

/// Single regex matching any of `patterns`; `None` when there are none
fn any_of(patterns: &[&String]) -> Result<Option<Regex>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    for pattern in patterns {
        Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
    }

    let joined = patterns
        .iter()
        .map(|pattern| format!("(?:{})", pattern))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&joined)
        .map(Some)
        .map_err(|source| ConfigError::Pattern {
            pattern: joined,
            source,
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
