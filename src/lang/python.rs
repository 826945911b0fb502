//! Python language adapter with tree-sitter integration.

use tree_sitter::{Node, Parser};

use super::common::{ClassInfo, FunctionInfo, LanguageAdapter, SourceFileAnalysis};
use super::javascript::{name_of, text};
use crate::core::errors::{ElenchusError, Result};

/// Python-specific structural extraction.
pub struct PythonAdapter {
    /// Tree-sitter parser for Python, reused across files.
    parser: Parser,
}

impl PythonAdapter {
    /// Create a new Python adapter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ElenchusError::parse("python", format!("Failed to set language: {e}")))?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language_key(&self) -> &'static str {
        "py"
    }

    fn analyze(&mut self, source: &str, file_path: &str) -> Result<SourceFileAnalysis> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ElenchusError::parse_in_file("python", "Parse failed", file_path))?;

        let mut analysis = SourceFileAnalysis {
            path: file_path.to_string(),
            language: "py".to_string(),
            ..Default::default()
        };
        walk(tree.root_node(), source, true, &mut analysis);
        Ok(analysis)
    }
}

fn walk(node: Node, source: &str, top_level: bool, out: &mut SourceFileAnalysis) {
    match node.kind() {
        "import_statement" => {
            // `import a.b.c` and `import a as x`
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => {
                        if let Some(module) = text(child, source) {
                            out.imports.push(module);
                        }
                    }
                    "aliased_import" => {
                        if let Some(module) =
                            child.child_by_field_name("name").and_then(|n| text(n, source))
                        {
                            out.imports.push(module);
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            // `from a.b import c`; relative dots matter for resolution.
            if let Some(module) = node
                .child_by_field_name("module_name")
                .and_then(|n| text(n, source))
            {
                out.imports.push(module);
            }
        }
        "function_definition" => {
            if let Some(name) = name_of(node, source) {
                let exported = top_level && !name.starts_with('_');
                if exported {
                    out.exports.push(name.clone());
                }
                out.functions.push(FunctionInfo {
                    name,
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    is_async: is_async_def(node),
                    is_exported: exported,
                });
            }
            // Nested defs are not re-walked as top level.
            if let Some(body) = node.child_by_field_name("body") {
                walk(body, source, false, out);
            }
            return;
        }
        "class_definition" => {
            if let Some(name) = name_of(node, source) {
                let exported = top_level && !name.starts_with('_');
                if exported {
                    out.exports.push(name.clone());
                }
                let class = extract_class(node, name, source, out);
                out.classes.push(class);
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, top_level, out);
    }
}

/// Multiple inheritance maps onto extends (first base) + implements (rest).
fn extract_class(
    node: Node,
    name: String,
    source: &str,
    out: &mut SourceFileAnalysis,
) -> ClassInfo {
    let mut extends = None;
    let mut implements = Vec::new();
    let mut methods = Vec::new();

    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for base in superclasses.children(&mut cursor) {
            if matches!(base.kind(), "identifier" | "attribute") {
                if let Some(base_name) = text(base, source) {
                    if extends.is_none() {
                        extends = Some(base_name);
                    } else {
                        implements.push(base_name);
                    }
                }
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            let def = match member.kind() {
                "function_definition" => Some(member),
                "decorated_definition" => member
                    .child_by_field_name("definition")
                    .filter(|d| d.kind() == "function_definition"),
                _ => None,
            };
            if let Some(def) = def {
                if let Some(method) = name_of(def, source) {
                    out.functions.push(FunctionInfo {
                        name: method.clone(),
                        start_line: def.start_position().row + 1,
                        end_line: def.end_position().row + 1,
                        is_async: is_async_def(def),
                        is_exported: false,
                    });
                    methods.push(method);
                }
            }
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

fn is_async_def(node: Node) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == "async");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_creation() {
        assert!(PythonAdapter::new().is_ok());
    }

    #[test]
    fn test_imports() {
        let mut adapter = PythonAdapter::new().unwrap();
        let source = "import os\nimport json as j\nfrom app.models import User\nfrom . import utils\n";
        let analysis = adapter.analyze(source, "app/views.py").unwrap();
        assert!(analysis.imports.contains(&"os".to_string()));
        assert!(analysis.imports.contains(&"json".to_string()));
        assert!(analysis.imports.contains(&"app.models".to_string()));
    }

    #[test]
    fn test_functions_and_privacy() {
        let mut adapter = PythonAdapter::new().unwrap();
        let source = r#"
async def fetch(url):
    return await client.get(url)

def _internal():
    pass
"#;
        let analysis = adapter.analyze(source, "app/http.py").unwrap();

        let fetch = analysis
            .functions
            .iter()
            .find(|f| f.name == "fetch")
            .expect("fetch extracted");
        assert!(fetch.is_async);
        assert!(fetch.is_exported);

        let internal = analysis
            .functions
            .iter()
            .find(|f| f.name == "_internal")
            .expect("_internal extracted");
        assert!(!internal.is_exported);
        assert_eq!(analysis.exports, vec!["fetch"]);
    }

    #[test]
    fn test_class_with_bases_and_methods() {
        let mut adapter = PythonAdapter::new().unwrap();
        let source = r#"
class UserService(BaseService, Auditable):
    def get(self, user_id):
        return self.db.find(user_id)

    async def save(self, user):
        await self.db.store(user)
"#;
        let analysis = adapter.analyze(source, "app/service.py").unwrap();
        assert_eq!(analysis.classes.len(), 1);
        let class = &analysis.classes[0];
        assert_eq!(class.extends.as_deref(), Some("BaseService"));
        assert_eq!(class.implements, vec!["Auditable"]);
        assert_eq!(class.methods, vec!["get", "save"]);
    }
}
