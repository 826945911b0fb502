//! JavaScript language adapter with tree-sitter integration.

use tree_sitter::{Node, Parser};

use super::common::{ClassInfo, FunctionInfo, LanguageAdapter, SourceFileAnalysis};
use crate::core::errors::{ElenchusError, Result};

/// JavaScript-specific structural extraction.
pub struct JavaScriptAdapter {
    /// Tree-sitter parser for JavaScript, reused across files.
    parser: Parser,
}

impl JavaScriptAdapter {
    /// Create a new JavaScript adapter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| {
                ElenchusError::parse("javascript", format!("Failed to set language: {e}"))
            })?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for JavaScriptAdapter {
    fn language_key(&self) -> &'static str {
        "js"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ElenchusError::parse_in_file("javascript", "Parse failed", file_path))?;

        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "js".to_string(),
            ..Default::default()
        };
        walk(tree.root_node(), source, false, &mut analysis);
        Ok(analysis)
    }
}

/// Recursive extraction walk shared with the TypeScript adapter.
pub(crate) fn walk(node: Node, source: &str, exported: bool, out: &mut SourceFileAnalysis) {
    match node.kind() {
        "import_statement" => {
            if let Some(spec) = string_child(node, "source", source) {
                out.imports.push(spec);
            }
        }
        "call_expression" => {
            // CommonJS require("...")
            if node
                .child_by_field_name("function")
                .and_then(|f| text(f, source))
                .as_deref()
                == Some("require")
            {
                if let Some(args) = node.child_by_field_name("arguments") {
                    let mut cursor = args.walk();
                    for arg in args.children(&mut cursor) {
                        if arg.kind() == "string" {
                            if let Some(spec) = unquote(arg, source) {
                                out.imports.push(spec);
                            }
                        }
                    }
                }
            }
        }
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk(child, source, true, out);
            }
            return;
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = name_of(node, source) {
                if exported {
                    out.exports.push(name.clone());
                }
                out.functions.push(FunctionInfo {
                    name,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    is_async: has_async_keyword(node, source),
                    is_exported: exported,
                });
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            // Arrow functions bound to a const/let/var name.
            let mut cursor = node.walk();
            for declarator in node.children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let value = declarator.child_by_field_name("value");
                let is_fn = value.is_some_and(|v| {
                    matches!(v.kind(), "arrow_function" | "function_expression" | "function")
                });
                if let Some(name) = name_of(declarator, source) {
                    if exported {
                        out.exports.push(name.clone());
                    }
                    if is_fn {
                        let value = value.expect("checked above");
                        out.functions.push(FunctionInfo {
                            name,
                            start_line: declarator.start_position().row + 1,
                            end_line: declarator.end_position().row + 1,
                            is_async: has_async_keyword(value, source),
                            is_exported: exported,
                        });
                    }
                }
            }
        }
        "class_declaration" => {
            if let Some(name) = name_of(node, source) {
                if exported {
                    out.exports.push(name.clone());
                }
                out.classes.push(extract_class(node, name, source));
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, exported, out);
    }
}

/// Build a [`ClassInfo`] from a class declaration node.
pub(crate) fn extract_class(node: Node, name: String, source: &str) -> ClassInfo {
    let mut extends = None;
    let mut implements = Vec::new();
    let mut methods = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                // JS: bare `extends <expr>`. TS: extends_clause and
                // implements_clause nodes wrapping their identifiers.
                let mut inner = child.walk();
                let mut mode = "extends";
                for part in child.children(&mut inner) {
                    match part.kind() {
                        "extends" => mode = "extends",
                        "implements" => mode = "implements",
                        "identifier" | "member_expression" | "type_identifier" => {
                            let Some(ident) = text(part, source) else {
                                continue;
                            };
                            if mode == "implements" {
                                implements.push(ident);
                            } else if extends.is_none() {
                                extends = Some(ident);
                            }
                        }
                        "extends_clause" | "implements_clause" | "extends_type_clause"
                        | "implements_type_clause" => {
                            let is_implements = part.kind().starts_with("implements");
                            let mut deep = part.walk();
                            for id in part.children(&mut deep) {
                                if matches!(
                                    id.kind(),
                                    "identifier" | "type_identifier" | "member_expression"
                                ) {
                                    if let Some(ident) = text(id, source) {
                                        if is_implements {
                                            implements.push(ident);
                                        } else if extends.is_none() {
                                            extends = Some(ident);
                                        }
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            "class_body" => {
                let mut inner = child.walk();
                for member in child.children(&mut inner) {
                    if member.kind() == "method_definition" {
                        if let Some(method) = name_of(member, source) {
                            methods.push(method);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    ClassInfo {
        name,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        extends,
        implements,
        methods,
    }
}

/// Text of a node's `name` field.
pub(crate) fn name_of(node: Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| text(n, source))
}

/// UTF-8 text of a node.
pub(crate) fn text(node: Node, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes()).ok().map(str::to_string)
}

/// Unquoted text of a string field child.
pub(crate) fn string_child(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| unquote(n, source))
}

/// Strip the quotes from a string literal node.
pub(crate) fn unquote(node: Node, source: &str) -> Option<String> {
    text(node, source).map(|s| s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
}

/// True when the declaration carries an `async` keyword token.
pub(crate) fn has_async_keyword(node: Node, source: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "async" {
            return true;
        }
        // Some grammars expose the keyword as an anonymous leading token.
        if child.start_position() == node.start_position() {
            if let Some(t) = text(child, source) {
                if t == "async" {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_creation() {
        assert!(JavaScriptAdapter::new().is_ok());
    }

    #[test]
    fn test_imports_and_functions() {
        let mut adapter = JavaScriptAdapter::new().unwrap();
        let source = r#"
import { api } from './api';
const db = require('./db');

export function handler(req) {
    return api.get(req);
}

const helper = async () => db.query();
"#;
        let analysis = adapter.analyze(source, "src/handler.js").unwrap();
        assert_eq!(analysis.imports, vec!["./api", "./db"]);
        assert!(analysis.exports.contains(&"handler".to_string()));

        let handler = analysis
            .functions
            .iter()
            .find(|f| f.name == "handler")
            .expect("handler extracted");
        assert!(handler.is_exported);
        assert!(!handler.is_async);

        let helper = analysis
            .functions
            .iter()
            .find(|f| f.name == "helper")
            .expect("helper extracted");
        assert!(helper.is_async);
    }

    #[test]
    fn test_class_extraction() {
        let mut adapter = JavaScriptAdapter::new().unwrap();
        let source = r#"
export class ApiClient extends BaseClient {
    constructor(url) { this.url = url; }
    get(path) { return fetch(this.url + path); }
}
"#;
        let analysis = adapter.analyze(source, "src/client.js").unwrap();
        assert_eq!(analysis.classes.len(), 1);
        let class = &analysis.classes[0];
        assert_eq!(class.name, "ApiClient");
        assert_eq!(class.extends.as_deref(), Some("BaseClient"));
        assert!(class.methods.contains(&"constructor".to_string()));
        assert!(class.methods.contains(&"get".to_string()));
        assert!(analysis.exports.contains(&"ApiClient".to_string()));
    }

    #[test]
    fn test_empty_file() {
        let mut adapter = JavaScriptAdapter::new().unwrap();
        let analysis = adapter.analyze("// comment only\n", "empty.js").unwrap();
        assert!(analysis.imports.is_empty());
        assert!(analysis.functions.is_empty());
        assert!(analysis.classes.is_empty());
    }
}
