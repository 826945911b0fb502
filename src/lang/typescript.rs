//! TypeScript language adapter with tree-sitter integration.
//!
//! TypeScript shares the JavaScript extraction walk; the grammar is a
//! superset and the walk matches on the common node kinds.

use tree_sitter::Parser;

use super::common::{LanguageAdapter, SourceFileAnalysis};
use super::javascript;
use crate::core::errors::{ElenchusError, Result};

/// TypeScript-specific structural extraction.
pub struct TypeScriptAdapter {
    /// Tree-sitter parser for TypeScript, reused across files.
    parser: Parser,
}

impl TypeScriptAdapter {
    /// Create a new TypeScript adapter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| {
                ElenchusError::parse("typescript", format!("Failed to set language: {e}"))
            })?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn language_key(&self) -> &'static str {
        "ts"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ElenchusError::parse_in_file("typescript", "Parse failed", file_path))?;

        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "ts".to_string(),
            ..Default::default()
        };
        javascript::walk(tree.root_node(), source, false, &mut analysis);
        Ok(analysis)
    }
}
