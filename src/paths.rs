//! Path equivalence between ctest, the codemodel and the filesystem
//!
//! The same executable shows up as `C:\build\test1.exe`, `C:/build/test1`
//! or, with some cmake-tools versions, under a bogus directory with only the
//! basename intact (microsoft/vscode-cmake-tools-api#7).

use std::path::Path;

const EXE_SUFFIX: &str = ".exe";

/// How strictly two executable paths must agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Normalized full paths must be equal
    #[default]
    Exact,
    /// Fall back to comparing basenames when the candidate does not exist on
    /// disk, i.e. when the reported path is known to be bogus
    BasenameIfMissing,
}

impl MatchPolicy {
    pub fn from_loose(loose: bool) -> Self {
        if loose {
            MatchPolicy::BasenameIfMissing
        } else {
            MatchPolicy::Exact
        }
    }
}

/// Strips a trailing `.exe`
pub fn strip_exe_suffix(path: &str) -> &str {
    path.strip_suffix(EXE_SUFFIX).unwrap_or(path)
}

/// Whether the filesystem compares names case-insensitively
pub fn case_insensitive_fs() -> bool {
    cfg!(windows)
}

/// Canonical form used for comparisons: no `.exe`, forward slashes, and
/// lowercase on case-insensitive filesystems
pub fn normalize(path: &str) -> String {
    normalize_with(path, case_insensitive_fs())
}

/// Case is folded before the suffix is stripped, so `TEST1.EXE` loses it too
fn normalize_with(path: &str, case_insensitive: bool) -> String {
    let folded = if case_insensitive {
        path.to_lowercase()
    } else {
        path.to_string()
    };
    strip_exe_suffix(&folded).replace('\\', "/")
}

/// Final path component with `.exe` stripped. Both separators are accepted.
pub fn basename_without_exe(path: &str) -> &str {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    strip_exe_suffix(base)
}

/// Returns whether `query` and `candidate` name the same executable.
///
/// With `MatchPolicy::BasenameIfMissing` a failed exact comparison is retried
/// on basenames, but only when `candidate` does not exist on disk.
pub fn paths_equivalent(query: &str, candidate: &str, policy: MatchPolicy) -> bool {
    if normalize(query) == normalize(candidate) {
        return true;
    }

    match policy {
        MatchPolicy::Exact => false,
        MatchPolicy::BasenameIfMissing => {
            if Path::new(candidate).exists() {
                // A real file: genuinely different executable
                return false;
            }
            normalize(basename_without_exe(query)) == normalize(basename_without_exe(candidate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_is_ignored() {
        assert!(paths_equivalent(
            "/build/test1.exe",
            "/build/test1",
            MatchPolicy::Exact
        ));
        assert!(paths_equivalent(
            "/build/test1",
            "/build/test1.exe",
            MatchPolicy::Exact
        ));
    }

    #[test]
    fn test_uppercase_exe_suffix_on_case_insensitive_fs() {
        assert_eq!(
            normalize_with("C:\\b\\TEST1.EXE", true),
            normalize_with("C:/b/test1", true)
        );
        // Case-sensitive filesystems keep a differently cased suffix
        assert_eq!(normalize_with("/b/test1.EXE", false), "/b/test1.EXE");
    }

    #[test]
    fn test_separators_are_normalized() {
        assert!(paths_equivalent(
            "C:\\build\\test1.exe",
            "C:/build/test1",
            MatchPolicy::Exact
        ));
    }

    #[test]
    fn test_case_follows_platform() {
        let equal = paths_equivalent("/Build/Test1", "/build/test1", MatchPolicy::Exact);
        assert_eq!(equal, case_insensitive_fs());
    }

    #[test]
    fn test_different_directories_do_not_match_exactly() {
        assert!(!paths_equivalent(
            "/real/build/test1",
            "/bogus/dir/test1",
            MatchPolicy::Exact
        ));
    }

    #[test]
    fn test_basename_fallback_when_candidate_missing() {
        assert!(paths_equivalent(
            "/real/build/test1",
            "/bogus/dir/test1.exe",
            MatchPolicy::BasenameIfMissing
        ));
        assert!(!paths_equivalent(
            "/real/build/test1",
            "/bogus/dir/test2",
            MatchPolicy::BasenameIfMissing
        ));
    }

    #[test]
    fn test_basename_fallback_refused_when_candidate_exists() {
        let temp_dir = TempDir::new().unwrap();
        let candidate = temp_dir.path().join("test1");
        std::fs::write(&candidate, b"").unwrap();

        assert!(!paths_equivalent(
            "/somewhere/else/test1",
            &candidate.to_string_lossy(),
            MatchPolicy::BasenameIfMissing
        ));
    }

    #[test]
    fn test_basename_without_exe() {
        assert_eq!(basename_without_exe("/a/b/ctest.exe"), "ctest");
        assert_eq!(basename_without_exe("C:\\a\\cmake"), "cmake");
        assert_eq!(basename_without_exe("plain"), "plain");
    }

    #[test]
    fn test_match_policy_from_loose() {
        assert_eq!(MatchPolicy::from_loose(false), MatchPolicy::Exact);
        assert_eq!(
            MatchPolicy::from_loose(true),
            MatchPolicy::BasenameIfMissing
        );
    }
}
