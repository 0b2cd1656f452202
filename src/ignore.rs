use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::io::ErrorKind;
use std::path::Path;

/// Name of the ignore file looked up at the root of the build context.
pub const IGNORE_FILE: &str = ".dockerignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

struct Rule {
    pattern: Pattern,
    /// `!pattern` re-includes paths excluded by earlier rules.
    negated: bool,
}

/// Parsed `.dockerignore` rules. Later rules override earlier ones.
#[derive(Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads rules from `path`. A missing file means nothing is ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read ignore file: {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|line| {
                let (negated, pattern) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, line),
                };
                let pattern = pattern
                    .trim_start_matches("./")
                    .trim_start_matches('/')
                    .trim_end_matches('/');
                if pattern.is_empty() {
                    return None;
                }
                Pattern::new(pattern)
                    .ok()
                    .map(|pattern| Rule { pattern, negated })
            })
            .collect();

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any `!` rule exists. Excluded directories must then still be
    /// walked, since something below them may be re-included.
    pub fn has_exceptions(&self) -> bool {
        self.rules.iter().any(|r| r.negated)
    }

    /// Returns true if `path` (relative to the context root) is excluded.
    ///
    /// A rule matching a directory also matches everything below it.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let mut ignored = false;

        for rule in &self.rules {
            let matched = path.ancestors().any(|ancestor| {
                let s = ancestor.to_string_lossy();
                !s.is_empty() && s != "." && rule.pattern.matches_with(&s, MATCH_OPTIONS)
            });
            if matched {
                ignored = !rule.negated;
            }
        }

        ignored
    }
}
