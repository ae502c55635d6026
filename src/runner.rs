//! Running a QtTest executable, whole or one slot at a time

use crate::correlate::ExpectedFailurePolicy;
use crate::error::RunError;
use crate::executable::TestExecutable;
use crate::process::{self, OutputSink};
use std::path::PathBuf;

/// Knobs for a single run
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Working directory; the executable's build directory when `None`
    pub cwd: Option<PathBuf>,
    /// Receives stdout and stderr of the test process
    pub output: Option<OutputSink>,
    pub policy: ExpectedFailurePolicy,
}

impl RunOptions {
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn with_policy(mut self, policy: ExpectedFailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("cwd", &self.cwd)
            .field("output", &self.output.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl TestExecutable {
    /// Command-line arguments for a run: optional slot, then TAP and txt logs
    /// plus txt on stdout
    pub fn run_arguments(&self, slot: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = slot {
            args.push(name.to_string());
        }
        args.push("-o".to_string());
        args.push(format!("{},tap", self.tap_output_file_name(slot)));
        args.push("-o".to_string());
        args.push(format!("{},txt", self.txt_output_file_name(slot)));
        args.push("-o".to_string());
        args.push("-,txt".to_string());
        args
    }

    /// Runs this test, or only `slot` if given. Returns whether the process
    /// exited with code 0.
    ///
    /// Full runs reset every slot failure and record the exit code; slot runs
    /// reset only the failure of that slot. Slot failures are refreshed from
    /// the TAP log whenever slots are known, even for a crashed process; a
    /// log that can't be read is only logged.
    pub async fn run(&mut self, slot: Option<&str>, options: &RunOptions) -> Result<bool, RunError> {
        if let Some(name) = slot {
            if self.is_introspected() && self.slot_by_name(name).is_none() {
                return Err(RunError::UnknownSlot {
                    executable: self.path().to_path_buf(),
                    slot: name.to_string(),
                });
            }
            if let Some(target) = self.slot_by_name_mut(name) {
                target.last_failure = None;
            }
        } else {
            self.clear_slot_failures();
        }

        let args = self.run_arguments(slot);
        let cwd = options
            .cwd
            .clone()
            .unwrap_or_else(|| self.build_dir().to_path_buf());

        // A log left over from an earlier run must not be read back if this
        // process dies before writing its own
        let tap_path = cwd.join(self.tap_output_file_name(slot));
        match tokio::fs::remove_file(&tap_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => self.logger.log(format!(
                "ERROR: Failed to remove stale log file {}: {}",
                tap_path.display(),
                err
            )),
        }

        self.logger.log(format!(
            "Running {} {} with cwd={}",
            self.path().display(),
            args.join(" "),
            cwd.display()
        ));

        let status = process::run_streaming(self.path(), &args, &cwd, options.output.as_ref())
            .await
            .map_err(|source| RunError::Spawn {
                path: self.path().to_path_buf(),
                source,
            })?;
        let code = process::exit_code(status);

        if slot.is_none() {
            self.last_exit_code = Some(code);
        }

        if self.has_slots() {
            if let Err(err) = self.correlate(&cwd, slot, &options.policy) {
                self.logger
                    .log(format!("Failed to update sub-test states: {}", err));
            }
        }

        Ok(code == 0)
    }
}
