//! Path-pattern matching for the optimization layer.
//!
//! Safeguards, pipeline, and sampling policies are expressed as glob
//! patterns. Compilation goes through `globset`, whose RE2-class automata
//! match in time linear in the input regardless of pattern shape, so
//! pathological patterns cannot stall the service.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::core::errors::{ElenchusError, Result};

/// A compiled, reusable set of path globs.
#[derive(Debug)]
pub struct PathMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl PathMatcher {
    /// Compile a pattern list. Invalid patterns are rejected up front so
    /// policy typos surface at configuration time, not at match time.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                ElenchusError::validation_field(
                    format!("Invalid path pattern '{pattern}': {e}"),
                    "patterns",
                )
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| ElenchusError::validation(format!("Pattern set build failed: {e}")))?;
        Ok(Self {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// An empty matcher that matches nothing.
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// True when `path` matches any pattern.
    pub fn is_match(&self, path: &str) -> bool {
        !self.patterns.is_empty() && self.set.is_match(path)
    }

    /// The source patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when no patterns are present.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Merge two pattern lists, deduplicating while preserving order.
pub fn merge_patterns(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for pattern in base.iter().chain(extra.iter()) {
        if !merged.contains(pattern) {
            merged.push(pattern.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_basic_matching() {
        let matcher = PathMatcher::compile(&patterns(&["**/auth/**", "**/*auth*"])).unwrap();
        assert!(matcher.is_match("src/auth/login.ts"));
        assert!(matcher.is_match("src/oauth_client.py"));
        assert!(!matcher.is_match("src/render/view.ts"));
    }

    #[test]
    fn test_empty_matcher_matches_nothing() {
        let matcher = PathMatcher::empty();
        assert!(!matcher.is_match("anything"));
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = PathMatcher::compile(&patterns(&["[unclosed"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_pathological_pattern_is_linear() {
        // Nested star groups would be catastrophic for a backtracking
        // engine; the automaton answers immediately.
        let matcher =
            PathMatcher::compile(&patterns(&["**/a*a*a*a*a*a*a*a*a*a*a*a*a*a*a*b"])).unwrap();
        let adversarial = format!("src/{}", "a".repeat(4096));
        assert!(!matcher.is_match(&adversarial));
    }

    proptest::proptest! {
        /// Matching stays total and panic-free over arbitrary paths.
        #[test]
        fn matching_never_panics(path in "\\PC{0,256}") {
            let matcher =
                PathMatcher::compile(&patterns(&["**/auth/**", "**/*.min.js"])).unwrap();
            let _ = matcher.is_match(&path);
        }
    }

    #[test]
    fn test_merge_deduplicates() {
        let merged = merge_patterns(
            &patterns(&["**/auth/**", "**/crypto/**"]),
            &patterns(&["**/crypto/**", "**/payment/**"]),
        );
        assert_eq!(
            merged,
            patterns(&["**/auth/**", "**/crypto/**", "**/payment/**"])
        );
    }
}
