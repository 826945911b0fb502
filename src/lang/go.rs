//! Go language adapter with tree-sitter integration.
//!
//! Struct types map onto the class model; method declarations attach to
//! their receiver type. Exported-ness follows Go capitalization.

use std::collections::HashMap;

use tree_sitter::{Node, Parser};

use super::common::{ClassInfo, FunctionInfo, LanguageAdapter, SourceFileAnalysis};
use super::javascript::{name_of, text, unquote};
use crate::core::errors::{ElenchusError, Result};

/// Go-specific structural extraction.
pub struct GoAdapter {
    /// Tree-sitter parser for Go, reused across files.
    parser: Parser,
}

impl GoAdapter {
    /// Create a new Go adapter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| ElenchusError::parse("go", format!("Failed to set language: {e}")))?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for GoAdapter {
    fn language_key(&self) -> &'static str {
        "go"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ElenchusError::parse_in_file("go", "Parse failed", file_path))?;

        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "go".to_string(),
            ..Default::default()
        };
        let mut methods_by_type: HashMap<String, Vec<String>> = HashMap::new();
        walk(tree.root_node(), source, &mut analysis, &mut methods_by_type);

        for class in &mut analysis.classes {
            if let Some(methods) = methods_by_type.remove(&class.name) {
                class.methods = methods;
            }
        }
        Ok(analysis)
    }
}

fn walk(
    node: Node,
    source: &str,
    out: &mut SourceFileAnalysis,
    methods_by_type: &mut HashMap<String, Vec<String>>,
) {
    match node.kind() {
        "import_spec" => {
            if let Some(path) = node.child_by_field_name("path").and_then(|p| unquote(p, source)) {
                out.imports.push(path);
            }
        }
        "function_declaration" => {
            if let Some(name) = name_of(node, source) {
                let exported = is_capitalized(&name);
                if exported {
                    out.exports.push(name.clone());
                }
                out.functions.push(FunctionInfo {
                    name,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    is_async: false,
                    is_exported: exported,
                });
            }
        }
        "method_declaration" => {
            if let Some(name) = name_of(node, source) {
                let exported = is_capitalized(&name);
                if exported {
                    out.exports.push(name.clone());
                }
                out.functions.push(FunctionInfo {
                    name: name.clone(),
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    is_async: false,
                    is_exported: exported,
                });
                if let Some(receiver_type) = receiver_type(node, source) {
                    methods_by_type.entry(receiver_type).or_default().push(name);
                }
            }
        }
        "type_spec" => {
            let is_struct = node
                .child_by_field_name("type")
                .is_some_and(|t| matches!(t.kind(), "struct_type" | "interface_type"));
            if is_struct {
                if let Some(name) = name_of(node, source) {
                    let exported = is_capitalized(&name);
                    if exported {
                        out.exports.push(name.clone());
                    }
                    out.classes.push(ClassInfo {
                        name,
                        start_line: node.start_position().row + 1,
                        end_line: node.end_position().row + 1,
                        extends: None,
                        implements: Vec::new(),
                        methods: Vec::new(),
                    });
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, out, methods_by_type);
    }
}

/// Receiver type name of a method declaration (`func (s *Store) Get`).
fn receiver_type(node: Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.children(&mut cursor) {
        if param.kind() == "parameter_declaration" {
            if let Some(ty) = param.child_by_field_name("type") {
                let raw = text(ty, source)?;
                return Some(raw.trim_start_matches('*').to_string());
            }
        }
    }
    None
}

fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
