//! Project-relative glob matching.
//!
//! Grammar: `*` and `?` never cross `/`, `**/` spans zero or more
//! directories, `{a,b}` alternates. Patterns are anchored to the whole
//! relative path.

use glob::{MatchOptions, Pattern};

use crate::security::errors::SandboxError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Upper bound on expanded alternatives for one pattern.
const MAX_EXPANSIONS: usize = 256;

const MAX_PATTERN_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct GlobMatcher {
    source: String,
    patterns: Vec<Pattern>,
}

impl GlobMatcher {
    pub fn new(pattern: &str, operation: &'static str) -> Result<Self, SandboxError> {
        let invalid = |reason: String| SandboxError::InvalidArgument { operation, reason };

        if pattern.trim().is_empty() {
            return Err(SandboxError::EmptyPath { operation });
        }
        if pattern.starts_with('/') || pattern.starts_with('\\') {
            return Err(SandboxError::AbsolutePath {
                operation,
                path: pattern.to_string(),
            });
        }
        if pattern.split('/').any(|segment| segment == "..") {
            return Err(invalid(format!(
                "glob '{pattern}' must not contain '..' segments"
            )));
        }

        if pattern.len() > MAX_PATTERN_LEN {
            return Err(invalid(format!(
                "glob is longer than {MAX_PATTERN_LEN} bytes"
            )));
        }

        let too_many = || invalid(format!("glob '{pattern}' expands to too many patterns"));
        let mut alternatives = Vec::new();
        expand_braces(pattern, &mut alternatives).map_err(|TooMany| too_many())?;
        let mut expanded = Vec::new();
        for alternative in &alternatives {
            expand_recursive_prefix(alternative, &mut expanded).map_err(|TooMany| too_many())?;
        }

        let patterns = expanded
            .iter()
            .map(|candidate| {
                Pattern::new(candidate).map_err(|err| invalid(format!("invalid glob '{pattern}': {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            patterns,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `path` is relative to the project root and uses `/` separators.
    pub fn is_match(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
    }
}

/// Expansion stopped at `MAX_EXPANSIONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TooMany;

fn push_bounded(out: &mut Vec<String>, candidate: String) -> Result<(), TooMany> {
    if out.len() >= MAX_EXPANSIONS {
        return Err(TooMany);
    }
    out.push(candidate);
    Ok(())
}

/// Expand the first `{a,b}` group, recursing until none remain. Stops as
/// soon as the output would pass `MAX_EXPANSIONS`.
fn expand_braces(pattern: &str, out: &mut Vec<String>) -> Result<(), TooMany> {
    let Some(open) = pattern.find('{') else {
        return push_bounded(out, pattern.to_string());
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (offset, ch) in pattern[open..].char_indices() {
        let index = open + offset;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(index),
            _ => {}
        }
    }
    let Some(close) = close else {
        // Unbalanced brace: treat literally.
        return push_bounded(out, pattern.to_string());
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(&splits);
    bounds.push(close);

    for window in bounds.windows(2) {
        let alternative = &pattern[window[0] + 1..window[1]];
        expand_braces(&format!("{prefix}{alternative}{suffix}"), out)?;
    }
    Ok(())
}

/// `**/` may match zero directories; emit the variant without it as well.
fn expand_recursive_prefix(pattern: &str, out: &mut Vec<String>) -> Result<(), TooMany> {
    if out.iter().any(|existing| existing == pattern) {
        return Ok(());
    }
    push_bounded(out, pattern.to_string())?;
    let mut search_from = 0;
    while let Some(found) = pattern[search_from..].find("**/") {
        let index = search_from + found;
        let at_segment_start = index == 0 || pattern[..index].ends_with('/');
        if at_segment_start {
            let collapsed = format!("{}{}", &pattern[..index], &pattern[index + 3..]);
            expand_recursive_prefix(&collapsed, out)?;
        }
        search_from = index + 3;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matcher(pattern: &str) -> GlobMatcher {
        GlobMatcher::new(pattern, "test").unwrap()
    }

    #[test]
    fn double_star_matches_root_and_nested() {
        let glob = matcher("**/*.md");
        let selected: Vec<&str> = ["a.md", "b/c.md", "b/d.txt"]
            .into_iter()
            .filter(|path| glob.is_match(path))
            .collect();
        assert_eq!(selected, vec!["a.md", "b/c.md"]);
    }

    #[test]
    fn single_star_stays_in_one_segment() {
        let glob = matcher("src/*.rs");
        assert!(glob.is_match("src/lib.rs"));
        assert!(!glob.is_match("src/nested/mod.rs"));
        assert!(!glob.is_match("other/src/lib.rs"));
    }

    #[test]
    fn braces_and_question_mark() {
        let glob = matcher("config/{dev,prod}.toml");
        assert!(glob.is_match("config/dev.toml"));
        assert!(glob.is_match("config/prod.toml"));
        assert!(!glob.is_match("config/test.toml"));

        let glob = matcher("v?.txt");
        assert!(glob.is_match("v1.txt"));
        assert!(!glob.is_match("v10.txt"));
    }

    #[test]
    fn nested_braces_expand() {
        let mut out = Vec::new();
        expand_braces("a{b,c{d,e}}f", &mut out).unwrap();
        assert_eq!(out, vec!["abf", "acdf", "acef"]);
    }

    #[test]
    fn brace_bomb_is_rejected_early() {
        let started = std::time::Instant::now();
        let result = GlobMatcher::new(&"{a,b}".repeat(30), "test");
        assert!(matches!(result, Err(SandboxError::InvalidArgument { .. })));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn stacked_double_stars_are_bounded() {
        let glob = matcher(&format!("{}*.md", "**/".repeat(40)));
        assert!(glob.is_match("a.md"));

        let spread: String = (0..20).map(|i| format!("d{i}/**/")).collect();
        assert!(matches!(
            GlobMatcher::new(&format!("{spread}*.md"), "test"),
            Err(SandboxError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn expansion_at_the_limit_is_accepted() {
        // 2^8 alternatives.
        let glob = matcher(&"{a,b}".repeat(8));
        assert!(glob.is_match("abababab"));
    }

    #[test]
    fn middle_double_star() {
        let glob = matcher("docs/**/index.html");
        assert!(glob.is_match("docs/index.html"));
        assert!(glob.is_match("docs/api/v1/index.html"));
        assert!(!glob.is_match("site/docs/index.html"));
    }

    #[test]
    fn rejects_escaping_patterns() {
        assert!(matches!(
            GlobMatcher::new("/etc/*", "test"),
            Err(SandboxError::AbsolutePath { .. })
        ));
        assert!(matches!(
            GlobMatcher::new("../**/*.rs", "test"),
            Err(SandboxError::InvalidArgument { .. })
        ));
        assert!(matches!(
            GlobMatcher::new("", "test"),
            Err(SandboxError::EmptyPath { .. })
        ));
    }
}
