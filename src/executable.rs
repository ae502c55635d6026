//! QtTest executables and their slots
//!
//! A `TestExecutable` owns its slots. Slot discovery lives in `introspect`,
//! running in `runner` and failure attribution in `correlate`.

use crate::logger::Logger;
use crate::paths::strip_exe_suffix;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a failing assertion was reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub slot_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl Failure {
    /// `file:line`, or whatever part of it is known
    pub fn location(&self) -> Option<String> {
        match (&self.file_path, self.line_number) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file.display(), line)),
            (Some(file), None) => Some(file.display().to_string()),
            _ => None,
        }
    }
}

/// One independently runnable test function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    name: String,
    /// Path of the owning executable
    parent: PathBuf,
    pub(crate) last_failure: Option<Failure>,
}

impl Slot {
    pub(crate) fn new(name: String, parent: PathBuf) -> Self {
        Self {
            name,
            parent,
            last_failure: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_path(&self) -> &Path {
        &self.parent
    }

    pub fn last_failure(&self) -> Option<&Failure> {
        self.last_failure.as_ref()
    }

    pub fn id(&self) -> String {
        format!("{}{}", self.parent.display(), self.name)
    }

    pub fn command(&self) -> TestCommand {
        TestCommand {
            label: self.name.clone(),
            executable: self.parent.clone(),
            args: vec![self.name.clone()],
        }
    }
}

/// Slot knowledge of an executable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    NotIntrospected,
    /// Empty for monolithic tests without named functions
    Introspected(Vec<Slot>),
}

/// What an IDE needs to launch a test under a debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCommand {
    pub label: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
}

/// A single QtTest executable
#[derive(Debug, Clone)]
pub struct TestExecutable {
    path: PathBuf,
    build_dir: PathBuf,
    pub(crate) slots: SlotState,
    pub(crate) last_exit_code: Option<i32>,
    pub(crate) logger: Logger,
    /// Log every line of `ldd` output during linkage inspection
    pub verbose: bool,
}

impl TestExecutable {
    pub fn new(path: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            build_dir: build_dir.into(),
            slots: SlotState::NotIntrospected,
            last_exit_code: None,
            logger: Logger::noop(),
            verbose: false,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn id(&self) -> String {
        self.path.display().to_string()
    }

    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id())
    }

    /// Path with a trailing `.exe` removed
    pub fn path_without_extension(&self) -> String {
        strip_exe_suffix(&self.id()).to_string()
    }

    /// Path relative to `base`, without `.exe` and with forward slashes.
    /// Falls back to the full path when it is not under `base`.
    pub fn relative_path(&self, base: &Path) -> String {
        let relative = self.path.strip_prefix(base).unwrap_or(&self.path);
        let text = relative.to_string_lossy();
        strip_exe_suffix(&text).replace('\\', "/")
    }

    pub fn slot_state(&self) -> &SlotState {
        &self.slots
    }

    pub fn is_introspected(&self) -> bool {
        matches!(self.slots, SlotState::Introspected(_))
    }

    /// Slots, or `None` if `-functions` was never run
    pub fn slots(&self) -> Option<&[Slot]> {
        match &self.slots {
            SlotState::NotIntrospected => None,
            SlotState::Introspected(slots) => Some(slots),
        }
    }

    /// True when introspection found at least one slot
    pub fn has_slots(&self) -> bool {
        self.slots().is_some_and(|slots| !slots.is_empty())
    }

    pub fn slot_by_name(&self, name: &str) -> Option<&Slot> {
        self.slots()?.iter().find(|slot| slot.name == name)
    }

    pub(crate) fn slot_by_name_mut(&mut self, name: &str) -> Option<&mut Slot> {
        match &mut self.slots {
            SlotState::NotIntrospected => None,
            SlotState::Introspected(slots) => slots.iter_mut().find(|slot| slot.name == name),
        }
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    /// Forgets every slot failure
    pub fn clear_slot_failures(&mut self) {
        if let SlotState::Introspected(slots) = &mut self.slots {
            for slot in slots {
                slot.last_failure = None;
            }
        }
    }

    pub fn command(&self) -> TestCommand {
        TestCommand {
            label: self.label(),
            executable: self.path.clone(),
            args: Vec::new(),
        }
    }

    /// `-o` target for the TAP log, relative to the run's working directory
    pub fn tap_output_file_name(&self, slot: Option<&str>) -> String {
        self.output_file_name(slot, "tap")
    }

    pub fn txt_output_file_name(&self, slot: Option<&str>) -> String {
        self.output_file_name(slot, "txt")
    }

    fn output_file_name(&self, slot: Option<&str>, extension: &str) -> String {
        match slot {
            Some(name) => format!("{}_{}.{}", self.label(), name, extension),
            None => format!("{}.{}", self.label(), extension),
        }
    }
}
