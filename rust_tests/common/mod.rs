//! Shell-script stand-ins for ctest and QtTest executables
#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Serializes tests that write and then exec scripts. A script still open
/// for writing in a sibling thread's fork fails to exec with ETXTBSY.
pub static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// How a fake test process ends
#[derive(Clone, Copy)]
pub enum Exit {
    Code(i32),
    Killed,
}

/// One canned run: which slot (`None` for the full run), the TAP log it
/// writes and how it exits
pub struct CannedRun<'a> {
    pub slot: Option<&'a str>,
    pub tap: &'a str,
    pub exit: Exit,
}

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// A ctest that lists `executables` as json-v1, one test each
pub fn write_ctest(dir: &Path, executables: &[PathBuf]) -> PathBuf {
    let tests: Vec<serde_json::Value> = executables
        .iter()
        .map(|exe| {
            serde_json::json!({
                "name": exe.file_name().unwrap().to_string_lossy(),
                "command": [exe.to_string_lossy()],
                "cwd": dir.to_string_lossy(),
            })
        })
        .collect();
    let listing = serde_json::json!({ "kind": "ctestInfo", "version": { "major": 1, "minor": 0 }, "tests": tests });

    let path = dir.join("fake-ctest");
    write_script(
        &path,
        &format!(
            "[ \"$1\" = \"--show-only=json-v1\" ] || exit 2\ncat <<'EOF'\n{}\nEOF\n",
            listing
        ),
    );
    path
}

/// A QtTest-like executable: answers `-functions` and `-help`, and for runs
/// writes the TAP log named by `-o <file>,tap`
pub fn write_qttest(dir: &Path, name: &str, slots: &[&str], runs: &[CannedRun<'_>]) -> PathBuf {
    let mut body = String::new();

    body.push_str("case \"$1\" in\n");
    body.push_str("  -functions)\n");
    for slot in slots {
        let _ = writeln!(body, "    echo '{}()'", slot);
    }
    body.push_str("    exit 0;;\n");
    body.push_str("  -help)\n");
    body.push_str("    echo 'Usage: test [options] [testfunction[:testdata]]...'\n");
    body.push_str("    exit 0;;\n");
    body.push_str("esac\n");

    body.push_str("slot=\"\"\n");
    body.push_str("case \"$1\" in -*) ;; *) slot=\"$1\"; shift;; esac\n");
    body.push_str("tap=\"\"\n");
    body.push_str("while [ $# -gt 0 ]; do\n");
    body.push_str("  if [ \"$1\" = \"-o\" ]; then\n");
    body.push_str("    case \"$2\" in *,tap) tap=\"${2%,tap}\";; esac\n");
    body.push_str("    shift\n");
    body.push_str("  fi\n");
    body.push_str("  shift\n");
    body.push_str("done\n");
    body.push_str("echo \"running ${slot:-all}\"\n");

    body.push_str("case \"$slot\" in\n");
    for run in runs {
        let _ = writeln!(body, "  \"{}\")", run.slot.unwrap_or(""));
        let _ = writeln!(body, "    cat > \"$tap\" <<'EOF'\n{}\nEOF", run.tap.trim_end());
        match run.exit {
            Exit::Code(code) => {
                let _ = writeln!(body, "    exit {};;", code);
            }
            Exit::Killed => body.push_str("    kill -9 $$;;\n"),
        }
    }
    body.push_str("esac\n");
    body.push_str("exit 0\n");

    let path = dir.join(name);
    write_script(&path, &body);
    path
}

/// An executable that ignores `-help` and just prints something else
pub fn write_non_qttest(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    write_script(&path, "echo '[doctest] doctest version is 2.4.11'\nexit 0\n");
    path
}
