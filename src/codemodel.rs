//! CMake codemodel lookups
//!
//! Maps a test executable back to the cmake target that builds it, and to
//! the C++ sources of that target. The codemodel is loaded by the host
//! (usually the cmake-tools extension); we only read it.

use crate::logger::Logger;
use crate::paths::{paths_equivalent, MatchPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const EXECUTABLE_TYPE: &str = "EXECUTABLE";
const CXX_LANGUAGE: &str = "CXX";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeModel {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub target_type: Option<String>,
    #[serde(default)]
    pub source_directory: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub file_groups: Vec<FileGroup>,
}

/// cmake-tools reports artifacts as strings, the raw file API as objects
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Path(String),
    Object { path: String },
}

impl Artifact {
    pub fn path(&self) -> &str {
        match self {
            Artifact::Path(path) | Artifact::Object { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl CodeModel {
    pub fn from_value(value: &serde_json::Value) -> serde_json::Result<Self> {
        CodeModel::deserialize(value)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Executable targets across every project, in codemodel order
    fn executable_targets(&self) -> impl Iterator<Item = &Target> {
        self.projects
            .iter()
            .flat_map(|project| project.targets.iter())
            .filter(|target| target.is_executable())
    }

    /// Executable targets with an artifact equivalent to `executable`
    pub fn targets_for_executable<'a, 'b>(
        &'a self,
        executable: &'b str,
        policy: MatchPolicy,
    ) -> impl Iterator<Item = &'a Target> + 'b
    where
        'a: 'b,
    {
        self.executable_targets().filter(move |target| {
            target
                .artifacts
                .iter()
                .any(|artifact| paths_equivalent(executable, artifact.path(), policy))
        })
    }

    /// First executable target with an artifact equivalent to `executable`
    pub fn target_for_executable(&self, executable: &str, policy: MatchPolicy) -> Option<&Target> {
        self.targets_for_executable(executable, policy).next()
    }
}

impl Target {
    pub fn is_executable(&self) -> bool {
        self.target_type.as_deref() == Some(EXECUTABLE_TYPE)
    }

    /// Sources of the first non-generated CXX file group, joined to the
    /// source directory, minus the automoc translation unit
    pub fn cpp_sources(&self) -> Vec<PathBuf> {
        let Some(source_dir) = self.source_directory.as_deref() else {
            return Vec::new();
        };

        let Some(group) = self
            .file_groups
            .iter()
            .find(|group| group.language.as_deref() == Some(CXX_LANGUAGE) && !group.is_generated)
        else {
            return Vec::new();
        };

        group
            .sources
            .iter()
            .filter(|source| !is_automoc_unit(source))
            .map(|source| Path::new(source_dir).join(source))
            .collect()
    }
}

/// `mocs_compilation.cpp`, or `mocs_compilation_<Config>.cpp` with
/// multi-config generators
fn is_automoc_unit(source: &str) -> bool {
    let name = source.rsplit(['/', '\\']).next().unwrap_or(source);
    name.starts_with("mocs_compilation") && name.ends_with(".cpp")
}

/// Returns the cmake target name for the specified executable
pub fn target_name_for_executable(
    executable: &str,
    codemodel: &CodeModel,
    policy: MatchPolicy,
    logger: &Logger,
) -> Option<String> {
    let name = codemodel
        .target_for_executable(executable, policy)
        .and_then(|target| target.name.clone());

    if name.is_none() {
        logger.log(format!(
            "targetNameForExecutable: Could not find target for executable {}",
            executable
        ));
    }
    name
}

/// Returns the list of .cpp files for the specified executable
pub fn sources_for_executable(
    executable: &str,
    codemodel: &CodeModel,
    policy: MatchPolicy,
    logger: &Logger,
) -> Vec<PathBuf> {
    // Targets without a source directory can't resolve sources, keep looking
    let sources = codemodel
        .targets_for_executable(executable, policy)
        .find(|target| target.source_directory.is_some())
        .map(Target::cpp_sources)
        .unwrap_or_default();

    if sources.is_empty() {
        logger.log(format!(
            "cppFilesForExecutable: Could not find cpp files for executable {}",
            executable
        ));
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CodeModel {
        CodeModel::from_value(&json!({
            "projects": [{
                "name": "qt_test",
                "targets": [
                    {
                        "name": "test1_autogen",
                        "type": "UTILITY",
                        "sourceDirectory": "/src/qt_test",
                        "artifacts": ["/build/test1"]
                    },
                    {
                        "name": "test1",
                        "type": "EXECUTABLE",
                        "sourceDirectory": "/src/qt_test",
                        "artifacts": ["/build/test1"],
                        "fileGroups": [
                            { "language": "CXX", "isGenerated": true, "sources": ["gen.cpp"] },
                            { "language": "CXX", "sources": ["test1.cpp", "build/test1_autogen/mocs_compilation.cpp"] }
                        ]
                    },
                    {
                        "name": "test2",
                        "type": "EXECUTABLE",
                        "sourceDirectory": "C:\\src\\qt_test",
                        "artifacts": [{ "path": "C:\\build\\test2.exe" }],
                        "fileGroups": [
                            { "language": "CXX", "sources": ["test2.cpp"] }
                        ]
                    }
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_utility_targets_are_skipped() {
        let model = sample();
        let target = model
            .target_for_executable("/build/test1", MatchPolicy::Exact)
            .unwrap();
        assert_eq!(target.name.as_deref(), Some("test1"));
    }

    #[test]
    fn test_generated_groups_and_automoc_are_skipped() {
        let model = sample();
        let sources =
            sources_for_executable("/build/test1", &model, MatchPolicy::Exact, &Logger::noop());
        assert_eq!(sources, vec![PathBuf::from("/src/qt_test/test1.cpp")]);
    }

    #[test]
    fn test_object_artifacts_and_backslashes() {
        let model = sample();
        let name =
            target_name_for_executable("C:/build/test2", &model, MatchPolicy::Exact, &Logger::noop());
        assert_eq!(name.as_deref(), Some("test2"));
    }

    #[test]
    fn test_target_without_source_directory_is_passed_over() {
        let model = CodeModel::from_value(&json!({
            "projects": [
                { "targets": [{
                    "name": "test1_imported",
                    "type": "EXECUTABLE",
                    "artifacts": ["/build/test1"]
                }]},
                { "targets": [{
                    "name": "test1",
                    "type": "EXECUTABLE",
                    "sourceDirectory": "/src/qt_test",
                    "artifacts": ["/build/test1"],
                    "fileGroups": [{ "language": "CXX", "sources": ["test1.cpp"] }]
                }]}
            ]
        }))
        .unwrap();

        let sources =
            sources_for_executable("/build/test1", &model, MatchPolicy::Exact, &Logger::noop());
        assert_eq!(sources, vec![PathBuf::from("/src/qt_test/test1.cpp")]);
    }

    #[test]
    fn test_miss_is_logged() {
        let (logger, sink) = crate::logger::collecting();
        let model = sample();
        assert!(sources_for_executable("/build/nope", &model, MatchPolicy::Exact, &logger).is_empty());
        assert!(target_name_for_executable("/build/nope", &model, MatchPolicy::Exact, &logger).is_none());
        assert_eq!(sink.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_projects_is_empty() {
        let model = CodeModel::from_json("{}").unwrap();
        assert!(model.projects.is_empty());
        assert!(model
            .target_for_executable("/build/test1", MatchPolicy::Exact)
            .is_none());
    }

    #[test]
    fn test_automoc_unit_detection() {
        assert!(is_automoc_unit("mocs_compilation.cpp"));
        assert!(is_automoc_unit("x_autogen/mocs_compilation_Debug.cpp"));
        assert!(!is_automoc_unit("test1.cpp"));
    }
}
