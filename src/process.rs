//! Async process helpers on top of `tokio::process`

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Receives the output of a running test, one line at a time
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct Captured {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Exit code, or -1 when the process was killed by a signal
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Runs `program` to completion and captures both output streams
pub async fn capture<S: AsRef<std::ffi::OsStr>>(
    program: impl AsRef<std::ffi::OsStr>,
    args: &[S],
    cwd: Option<&Path>,
) -> std::io::Result<Captured> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.output().await?;
    Ok(Captured {
        code: exit_code(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs `program` to completion, forwarding its output to `sink` line by
/// line. Without a sink the output is discarded.
pub async fn run_streaming<S: AsRef<std::ffi::OsStr>>(
    program: impl AsRef<std::ffi::OsStr>,
    args: &[S],
    cwd: &Path,
    sink: Option<&OutputSink>,
) -> std::io::Result<ExitStatus> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let Some(sink) = sink else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
        return command.status().await;
    };

    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, _, _) = tokio::join!(
        child.wait(),
        forward_lines(stdout, sink),
        forward_lines(stderr, sink)
    );
    status
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: Option<R>, sink: &OutputSink) {
    let Some(stream) = stream else {
        return;
    };
    // Test output is not guaranteed to be UTF-8; the pipe must keep draining
    let mut segments = BufReader::new(stream).split(b'\n');
    while let Ok(Some(segment)) = segments.next_segment().await {
        let line = String::from_utf8_lossy(&segment);
        sink(line.trim_end_matches('\r'));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_capture_collects_stdout_and_code() {
        let captured = capture("sh", &["-c", "echo hello; echo oops >&2; exit 3"], None)
            .await
            .unwrap();
        assert_eq!(captured.code, 3);
        assert_eq!(captured.stdout, "hello\n");
        assert_eq!(captured.stderr, "oops\n");
        assert!(!captured.success());
    }

    #[tokio::test]
    async fn test_run_streaming_forwards_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&lines);
        let sink: OutputSink = Arc::new(move |line| writer.lock().unwrap().push(line.to_string()));

        let status = run_streaming(
            "sh",
            &["-c", "echo one; echo two"],
            Path::new("."),
            Some(&sink),
        )
        .await
        .unwrap();

        assert!(status.success());
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_capture_missing_program_is_io_error() {
        let result = capture("/definitely/not/a/program", &[] as &[&str], None).await;
        assert!(result.is_err());
    }
}
