//! Common AST extraction abstractions.
//!
//! Language adapters reduce a source file to the structural facts the
//! dependency layer needs: imports, exports, functions, and classes.

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// A function extracted from a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    /// Simple function name.
    pub name: String,
    /// Starting line (1-based).
    pub start_line: usize,
    /// Ending line (1-based).
    pub end_line: usize,
    /// Declared async.
    #[serde(default)]
    pub is_async: bool,
    /// Visible outside the file (exported / public).
    #[serde(default)]
    pub is_exported: bool,
}

impl FunctionInfo {
    /// True when `line` falls inside this function's range.
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// A class-like declaration extracted from a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    /// Class (or struct/type) name.
    pub name: String,
    /// Starting line (1-based).
    pub start_line: usize,
    /// Ending line (1-based).
    pub end_line: usize,
    /// Extended base class, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Implemented interfaces/traits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    /// Method names declared on the class.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Structural facts extracted from one source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFileAnalysis {
    /// File path the analysis describes.
    pub path: String,
    /// Language key the file was parsed as.
    pub language: String,
    /// Raw import specifiers as written in the source.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Exported symbol names.
    #[serde(default)]
    pub exports: Vec<String>,
    /// Extracted functions.
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    /// Extracted classes.
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
}

impl SourceFileAnalysis {
    /// Names of functions whose line range contains `line`.
    pub fn functions_at_line(&self, line: usize) -> Vec<String> {
        self.functions
            .iter()
            .filter(|f| f.contains_line(line))
            .map(|f| f.name.clone())
            .collect()
    }
}

/// A language-specific structural extractor.
///
/// Adapters own a tree-sitter parser configured once at construction and
/// reused across files (set_language then parse, never shared between
/// concurrent tasks).
pub trait LanguageAdapter: Send {
    /// Canonical language key (matches registry usage, e.g. "py").
    fn language_key(&self) -> &'static str;

    /// Parse `source` and extract structural facts.
    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis>;
}

/// Fallback extractor used when no grammar covers a file.
///
/// Scans lines for import-like and definition-like prefixes so unknown
/// languages still contribute coarse graph nodes instead of failing.
pub struct GenericAdapter;

impl LanguageAdapter for GenericAdapter {
    fn language_key(&self) -> &'static str {
        "generic"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "generic".to_string(),
            ..Default::default()
        };

        for (idx, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed
                .strip_prefix("import ")
                .or_else(|| trimmed.strip_prefix("#include "))
            {
                let spec = rest
                    .trim()
                    .trim_matches(|c| matches!(c, '"' | '\'' | '<' | '>' | ';'));
                if !spec.is_empty() {
                    analysis.imports.push(spec.to_string());
                }
            } else if let Some(rest) = trimmed
                .strip_prefix("function ")
                .or_else(|| trimmed.strip_prefix("def "))
                .or_else(|| trimmed.strip_prefix("fn "))
                .or_else(|| trimmed.strip_prefix("func "))
            {
                let name: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if !name.is_empty() {
                    analysis.functions.push(FunctionInfo {
                        name,
                        start_line: idx + 1,
                        end_line: idx + 1,
                        is_async: false,
                        is_exported: false,
                    });
                }
            }
        }

        Ok(analysis)
    }
}

/// Test-file naming conventions shared by ripple classification and
/// sampling weights.
pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let basename = lower.rsplit('/').next().unwrap_or(&lower);
    lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("/__tests__/")
        || basename.contains(".test.")
        || basename.contains(".spec.")
        || basename.ends_with("_test.py")
        || basename.ends_with("_test.go")
        || basename.ends_with("_test.rs")
        || basename.starts_with("test_")
}
