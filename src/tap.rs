//! TAP (Test Anything Protocol) reader for QtTest's `-o file,tap` output
//!
//! ```text
//! TAP version 13
//! # MyTest
//! ok 1 - initTestCase()
//! not ok 2 - testF()
//!   ---
//!   type: QFAIL
//!   message: failed
//!   file: /src/test2.cpp
//!   line: 13
//!   ...
//! ok 3 - testXPASS() # TODO 'true' returned TRUE unexpectedly. ()
//! 1..3
//! ```
//!
//! Only the pieces needed for failure attribution are decoded. A broken record
//! is reported in `TapLog::malformed` and does not affect its neighbours.

const VERSION_PREFIX: &str = "TAP version";
const BAIL_OUT: &str = "Bail out!";
const YAML_START: &str = "---";
const YAML_END: &str = "...";

/// `# TODO` / `# SKIP` after a test point description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Todo(String),
    Skip(String),
}

/// The YAML diagnostics block below a test point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub kind: Option<String>,
    pub message: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// One `ok` / `not ok` test point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub ok: bool,
    pub number: Option<u32>,
    pub description: String,
    pub directive: Option<Directive>,
    pub diagnostics: Option<Diagnostics>,
    /// 1-based line of the test point in the log
    pub log_line: usize,
}

impl Assertion {
    pub fn todo(&self) -> Option<&str> {
        match &self.directive {
            Some(Directive::Todo(text)) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub log_line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapLog {
    pub version: Option<u32>,
    pub plan: Option<(u32, u32)>,
    pub assertions: Vec<Assertion>,
    pub malformed: Vec<MalformedRecord>,
    pub bail_out: Option<String>,
}

impl TapLog {
    /// False when nothing in the input looked like TAP at all
    pub fn has_tap_content(&self) -> bool {
        self.version.is_some()
            || self.plan.is_some()
            || self.bail_out.is_some()
            || !self.assertions.is_empty()
            || !self.malformed.is_empty()
    }
}

/// Parses a complete TAP document
pub fn parse(text: &str) -> TapLog {
    let lines: Vec<&str> = text.lines().collect();
    let mut log = TapLog::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if let Some(mut assertion) = parse_test_point(trimmed, i + 1) {
            i += 1;

            // Optional indented YAML block right below the test point
            if i < lines.len() && lines[i].trim() == YAML_START && is_indented(lines[i]) {
                match collect_yaml_block(&lines, i + 1) {
                    Ok((block, next)) => {
                        i = next;
                        match parse_diagnostics(&block) {
                            Ok(diag) => assertion.diagnostics = Some(diag),
                            Err(reason) => {
                                log.malformed.push(MalformedRecord {
                                    log_line: assertion.log_line,
                                    reason,
                                });
                                continue;
                            }
                        }
                    }
                    Err(next) => {
                        log.malformed.push(MalformedRecord {
                            log_line: assertion.log_line,
                            reason: "unterminated diagnostics block".to_string(),
                        });
                        i = next;
                        continue;
                    }
                }
            }

            log.assertions.push(assertion);
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(VERSION_PREFIX) {
            log.version = rest.trim().parse().ok();
        } else if let Some(rest) = trimmed.strip_prefix(BAIL_OUT) {
            log.bail_out = Some(rest.trim().to_string());
        } else if let Some(plan) = parse_plan(trimmed) {
            log.plan = Some(plan);
        }
        // Comments, stray YAML and anything else are ignored

        i += 1;
    }

    log
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

/// Collects the lines of a YAML block starting at `start`.
///
/// Returns the block and the index after the closing `...`, or the index of
/// the line that interrupted an unterminated block.
fn collect_yaml_block<'a>(lines: &[&'a str], start: usize) -> Result<(Vec<&'a str>, usize), usize> {
    let mut block = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        if trimmed == YAML_END {
            return Ok((block, i + 1));
        }
        if parse_test_point(trimmed, i + 1).is_some() && !is_indented(line) {
            return Err(i);
        }
        block.push(line);
        i += 1;
    }
    Err(i)
}

/// Reads the top-level scalar keys of a diagnostics block
fn parse_diagnostics(block: &[&str]) -> Result<Diagnostics, String> {
    let indent_of = |line: &str| line.len() - line.trim_start().len();
    let base = block
        .iter()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);

    let mut diag = Diagnostics::default();
    for line in block {
        let content = line.trim();
        if content.is_empty() || content.starts_with('#') || indent_of(line) != base {
            continue;
        }
        let Some((key, value)) = content.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());

        match key.trim() {
            "type" => diag.kind = Some(value),
            "message" => diag.message = Some(value),
            "file" => diag.file = Some(value),
            "line" => {
                let number = value
                    .parse()
                    .map_err(|_| format!("invalid line number {:?}", value))?;
                diag.line = Some(number);
            }
            _ => {}
        }
    }
    Ok(diag)
}

fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// `1..N`, optionally followed by a `# SKIP` comment
fn parse_plan(line: &str) -> Option<(u32, u32)> {
    let plan = line.split('#').next()?.trim();
    let (first, last) = plan.split_once("..")?;
    Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
}

/// `ok 1 - name # TODO reason` / `not ok 2 name`
fn parse_test_point(line: &str, log_line: usize) -> Option<Assertion> {
    let (ok, rest) = if let Some(rest) = line.strip_prefix("not ok") {
        (false, rest)
    } else if let Some(rest) = line.strip_prefix("ok") {
        (true, rest)
    } else {
        return None;
    };

    // "okay" or "not okay" are not test points
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim_start();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let number = rest[..digits_end].parse().ok();
    let rest = rest[digits_end..].trim_start();
    let rest = rest.strip_prefix('-').unwrap_or(rest).trim_start();

    let (description, directive) = split_directive(rest);

    Some(Assertion {
        ok,
        number,
        description: description.replace("\\#", "#"),
        directive,
        diagnostics: None,
        log_line,
    })
}

/// Splits at the first unescaped `#`
fn split_directive(text: &str) -> (String, Option<Directive>) {
    let bytes = text.as_bytes();
    let hash = (0..bytes.len()).find(|&i| bytes[i] == b'#' && (i == 0 || bytes[i - 1] != b'\\'));

    let Some(hash) = hash else {
        return (text.trim_end().to_string(), None);
    };

    let description = text[..hash].trim_end().to_string();
    let comment = text[hash + 1..].trim_start();
    let keyword_end = comment
        .find(char::is_whitespace)
        .unwrap_or(comment.len());
    let keyword = comment[..keyword_end].to_ascii_uppercase();
    let reason = comment[keyword_end..].trim().to_string();

    let directive = if keyword.starts_with("TODO") {
        Some(Directive::Todo(reason))
    } else if keyword.starts_with("SKIP") {
        Some(Directive::Skip(reason))
    } else {
        None
    };

    match directive {
        Some(directive) => (description, Some(directive)),
        // Not a directive, the '#' belongs to the description
        None => (text.trim_end().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QT_LOG: &str = "TAP version 13
# MyTest
ok 1 - initTestCase()
ok 2 - testD()
not ok 3 - testF()
  ---
  type: QFAIL
  message: failed
  at: MyTest::testF() (/src/qt_test/test2.cpp:13)
  file: /src/qt_test/test2.cpp
  line: 13
  ...
ok 4 - testXPASS() # TODO 'true' returned TRUE unexpectedly. ()
not ok 5 - testMixXFAILWithFAIL() # TODO 'false' returned FALSE. (To be fixed)
  ---
  # To be fixed
  at: MyTest::testMixXFAILWithFAIL() (/src/qt_test/test2.cpp:20)
  file: /src/qt_test/test2.cpp
  line: 20
  ...
ok 6 - cleanupTestCase()
1..6
# tests 6
";

    #[test]
    fn test_parse_qt_log() {
        let log = parse(QT_LOG);
        assert_eq!(log.version, Some(13));
        assert_eq!(log.plan, Some((1, 6)));
        assert_eq!(log.assertions.len(), 6);
        assert!(log.malformed.is_empty());

        let failed = &log.assertions[2];
        assert!(!failed.ok);
        assert_eq!(failed.number, Some(3));
        assert_eq!(failed.description, "testF()");
        let diag = failed.diagnostics.as_ref().unwrap();
        assert_eq!(diag.kind.as_deref(), Some("QFAIL"));
        assert_eq!(diag.file.as_deref(), Some("/src/qt_test/test2.cpp"));
        assert_eq!(diag.line, Some(13));
    }

    #[test]
    fn test_todo_directive_is_split_off() {
        let log = parse(QT_LOG);
        let xpass = &log.assertions[3];
        assert!(xpass.ok);
        assert_eq!(xpass.description, "testXPASS()");
        assert_eq!(
            xpass.todo(),
            Some("'true' returned TRUE unexpectedly. ()")
        );
        assert!(xpass.diagnostics.is_none());
    }

    #[test]
    fn test_skip_directive() {
        let log = parse("ok 1 - testSkipped() # SKIP not on this platform\n");
        assert_eq!(
            log.assertions[0].directive,
            Some(Directive::Skip("not on this platform".to_string()))
        );
        assert_eq!(log.assertions[0].todo(), None);
    }

    #[test]
    fn test_escaped_hash_stays_in_description() {
        let log = parse("not ok 1 - test\\#1 # TODO later\n");
        assert_eq!(log.assertions[0].description, "test#1");
        assert!(log.assertions[0].todo().is_some());
    }

    #[test]
    fn test_non_directive_comment_is_kept() {
        let log = parse("ok 1 - testA(row #2)\n");
        assert_eq!(log.assertions[0].description, "testA(row #2)");
        assert!(log.assertions[0].directive.is_none());
    }

    #[test]
    fn test_unterminated_block_only_drops_its_record() {
        let text = "TAP version 13
not ok 1 - testA()
  ---
  file: /src/a.cpp
not ok 2 - testB()
  ---
  file: /src/b.cpp
  line: 7
  ...
";
        let log = parse(text);
        assert_eq!(log.malformed.len(), 1);
        assert_eq!(log.malformed[0].log_line, 2);
        assert_eq!(log.assertions.len(), 1);
        assert_eq!(log.assertions[0].description, "testB()");
        assert_eq!(log.assertions[0].diagnostics.as_ref().unwrap().line, Some(7));
    }

    #[test]
    fn test_bad_line_number_is_malformed() {
        let text = "not ok 1 - testA()
  ---
  line: twelve
  ...
ok 2 - testB()
";
        let log = parse(text);
        assert_eq!(log.malformed.len(), 1);
        assert_eq!(log.assertions.len(), 1);
        assert!(log.assertions[0].ok);
    }

    #[test]
    fn test_nested_yaml_keys_are_ignored() {
        let text = "not ok 1 - testA()
  ---
  extensions:
    messages:
      - severity: debug
        line: not-a-number
  file: '/src/a.cpp'
  line: 3
  ...
";
        let log = parse(text);
        assert!(log.malformed.is_empty());
        let diag = log.assertions[0].diagnostics.as_ref().unwrap();
        assert_eq!(diag.file.as_deref(), Some("/src/a.cpp"));
        assert_eq!(diag.line, Some(3));
    }

    #[test]
    fn test_okay_is_not_a_test_point() {
        let log = parse("okay then\nnot okay\n");
        assert!(log.assertions.is_empty());
        assert!(!log.has_tap_content());
    }

    #[test]
    fn test_bail_out_and_truncated_log() {
        let log = parse("TAP version 13\nok 1 - initTestCase()\nBail out! aborting\n");
        assert_eq!(log.bail_out.as_deref(), Some("aborting"));
        assert_eq!(log.assertions.len(), 1);
        assert!(log.has_tap_content());
    }

    #[test]
    fn test_test_point_without_number_or_dash() {
        let log = parse("not ok testZ()\n");
        assert_eq!(log.assertions[0].number, None);
        assert_eq!(log.assertions[0].description, "testZ()");
    }
}
