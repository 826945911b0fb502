//! Rust language adapter with tree-sitter integration.
//!
//! Structs and enums map onto the class model; methods come from `impl`
//! blocks and trait impls populate the implements list.

use std::collections::HashMap;

use tree_sitter::{Node, Parser};

use super::common::{ClassInfo, FunctionInfo, LanguageAdapter, SourceFileAnalysis};
use super::javascript::{name_of, text};
use crate::core::errors::{ElenchusError, Result};

/// Rust-specific structural extraction.
pub struct RustAdapter {
    /// Tree-sitter parser for Rust, reused across files.
    parser: Parser,
}

impl RustAdapter {
    /// Create a new Rust adapter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| ElenchusError::parse("rust", format!("Failed to set language: {e}")))?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for RustAdapter {
    fn language_key(&self) -> &'static str {
        "rs"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ElenchusError::parse_in_file("rust", "Parse failed", file_path))?;

        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "rs".to_string(),
            ..Default::default()
        };
        let mut impls: HashMap<String, (Vec<String>, Vec<String>)> = HashMap::new();
        walk(tree.root_node(), source, &mut analysis, &mut impls);

        // Fold impl-block methods and trait names into their types.
        for class in &mut analysis.classes {
            if let Some((methods, traits)) = impls.remove(&class.name) {
                class.methods = methods;
                class.implements = traits;
            }
        }
        Ok(analysis)
    }
}

fn walk(
    node: Node,
    source: &str,
    out: &mut SourceFileAnalysis,
    impls: &mut HashMap<String, (Vec<String>, Vec<String>)>,
) {
    match node.kind() {
        "use_declaration" => {
            if let Some(arg) = node.child_by_field_name("argument") {
                if let Some(path) = text(arg, source) {
                    out.imports.push(path);
                }
            }
        }
        "function_item" => {
            if let Some(name) = name_of(node, source) {
                let exported = is_pub(node);
                if exported {
                    out.exports.push(name.clone());
                }
                out.functions.push(FunctionInfo {
                    name,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    is_async: has_async_modifier(node),
                    is_exported: exported,
                });
            }
        }
        "struct_item" | "enum_item" => {
            if let Some(name) = name_of(node, source) {
                let exported = is_pub(node);
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
        "impl_item" => {
            let type_name = node
                .child_by_field_name("type")
                .and_then(|t| text(t, source))
                .map(|t| strip_generics(&t));
            let trait_name = node
                .child_by_field_name("trait")
                .and_then(|t| text(t, source))
                .map(|t| strip_generics(&t));

            if let Some(type_name) = type_name {
                let entry = impls.entry(type_name).or_default();
                if let Some(trait_name) = trait_name {
                    entry.1.push(trait_name);
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for member in body.children(&mut cursor) {
                        if member.kind() == "function_item" {
                            if let Some(method) = name_of(member, source) {
                                out.functions.push(FunctionInfo {
                                    name: method.clone(),
                                    start_line: member.start_position().row + 1,
                                    end_line: member.end_position().row + 1,
                                    is_async: has_async_modifier(member),
                                    is_exported: is_pub(member),
                                });
                                entry.0.push(method);
                            }
                        }
                    }
                }
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, out, impls);
    }
}

fn is_pub(node: Node) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier");
    result
}

fn has_async_modifier(node: Node) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_modifiers" {
            let mut inner = child.walk();
            if child.children(&mut inner).any(|m| m.kind() == "async") {
                return true;
            }
        }
    }
    false
}

/// Drop a trailing generic argument list from a type path.
fn strip_generics(name: &str) -> String {
    match name.find('<') {
        Some(pos) => name[..pos].to_string(),
        None => name.to_string(),
    }
}
