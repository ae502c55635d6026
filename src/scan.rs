//! Build-directory scan for executables
//!
//! Fallback discovery when ctest is unavailable: walks the build tree and
//! returns every executable file that isn't a shared library.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// cmake keeps compiler-id probes and try_compile binaries here
const CMAKE_FILES_DIR: &str = "CMakeFiles";

const LIBRARY_EXTENSIONS: [&str; 3] = ["so", "dll", "dylib"];

/// Whether `filename` is a shared library, ignoring version suffixes
/// (`libFoo.so.2.0.9`)
pub fn is_library(filename: &str) -> bool {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() <= 1 {
        return false;
    }

    parts
        .iter()
        .rev()
        .find(|part| part.parse::<f64>().is_err())
        .is_some_and(|ext| LIBRARY_EXTENSIONS.contains(ext))
}

#[cfg(windows)]
pub fn is_executable(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn is_executable(_path: &Path) -> bool {
    false
}

/// Recursively looks for executable files in `folder`, sorted by path
pub fn executable_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut executables = Vec::new();

    let walker = WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != CMAKE_FILES_DIR);

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !is_library(&name) && is_executable(entry.path()) {
            executables.push(entry.into_path());
        }
    }

    Ok(executables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_library() {
        assert!(is_library("libFoo.so"));
        assert!(is_library("libFoo.so.2.0.9"));
        assert!(is_library("Qt6Test.dll"));
        assert!(is_library("libQt6Test.6.dylib"));
        assert!(!is_library("tst_docks"));
        assert!(!is_library("tst_docks.exe"));
        assert!(!is_library("notes.txt"));
        assert!(!is_library("1.2.3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_files_skips_libraries_and_cmakefiles() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let make_exec = |path: &Path| {
            std::fs::write(path, b"#!/bin/sh\n").unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        };

        std::fs::create_dir_all(root.join("CMakeFiles/3.28")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        make_exec(&root.join("CMakeFiles/3.28/a.out"));
        make_exec(&root.join("tests/test1"));
        make_exec(&root.join("libhelper.so.1"));
        std::fs::write(root.join("CMakeCache.txt"), b"").unwrap();

        let found = executable_files(root).unwrap();
        assert_eq!(found, vec![root.join("tests/test1")]);
    }
}
