//! Import-path resolution against a session's context file set.
//!
//! Raw specifiers from the adapters are resolved to known context paths
//! with language-family rules: extension search order for web languages,
//! attribute chains for Python, module paths for Rust and Go. Specifiers
//! that resolve to nothing are recorded by the caller and excluded from
//! the graph.

use std::collections::BTreeSet;

/// Extension candidates tried, in order, for web-language imports.
const WEB_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

/// Index files tried when a web import names a directory.
const WEB_INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.js",
    "index.jsx",
];

/// Resolve one import specifier to a known context path.
///
/// `importer` and every entry of `known` are normalized relative paths
/// with `/` separators.
pub fn resolve_import(
    spec: &str,
    importer: &str,
    language: &str,
    known: &BTreeSet<String>,
) -> Option<String> {
    match language {
        "js" | "ts" => resolve_web(spec, importer, known),
        "py" => resolve_python(spec, importer, known),
        "rs" => resolve_rust(spec, importer, known),
        "go" => resolve_go(spec, known),
        _ => resolve_generic(spec, importer, known),
    }
}

/// Relative specifiers search the extension order, then index files.
/// Bare (package) specifiers stay unresolved.
fn resolve_web(spec: &str, importer: &str, known: &BTreeSet<String>) -> Option<String> {
    if !spec.starts_with("./") && !spec.starts_with("../") {
        return None;
    }
    let base = join_relative(parent_dir(importer), spec)?;

    if known.contains(&base) {
        return Some(base);
    }
    for ext in WEB_EXTENSIONS {
        let candidate = format!("{base}{ext}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    for index in WEB_INDEX_FILES {
        let candidate = format!("{base}/{index}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Dotted module chains (`a.b.c`) map onto `a/b/c.py` or a package
/// `__init__.py`, tried from the project root and the importer's package.
fn resolve_python(spec: &str, importer: &str, known: &BTreeSet<String>) -> Option<String> {
    let dots = spec.chars().take_while(|&c| c == '.').count();
    let remainder = &spec[dots..];
    let module_path = remainder.replace('.', "/");

    let mut bases = Vec::new();
    if dots > 0 {
        // `from . import x` resolves against the importing package; each
        // additional dot climbs one level.
        let mut dir = parent_dir(importer).to_string();
        for _ in 1..dots {
            dir = parent_dir(&dir).to_string();
        }
        bases.push(dir);
    } else {
        bases.push(String::new());
        bases.push(parent_dir(importer).to_string());
    }

    for base in bases {
        let stem = if base.is_empty() {
            module_path.clone()
        } else if module_path.is_empty() {
            base.clone()
        } else {
            format!("{base}/{module_path}")
        };
        if stem.is_empty() {
            continue;
        }
        let file = format!("{stem}.py");
        if known.contains(&file) {
            return Some(file);
        }
        let package = format!("{stem}/__init__.py");
        if known.contains(&package) {
            return Some(package);
        }
    }
    None
}

/// `use` paths map onto module files under `src/`; `super`/`self` walk
/// from the importing file's directory.
fn resolve_rust(spec: &str, importer: &str, known: &BTreeSet<String>) -> Option<String> {
    let mut segments: Vec<&str> = spec.split("::").map(str::trim).collect();
    if segments.is_empty() {
        return None;
    }

    let mut base = match segments[0] {
        "crate" => {
            segments.remove(0);
            // Conventionally the crate root is the importer's src/ prefix.
            importer
                .find("src/")
                .map(|pos| importer[..pos + 3].to_string())
                .unwrap_or_else(|| "src".to_string())
        }
        "self" => {
            segments.remove(0);
            parent_dir(importer).to_string()
        }
        "super" => {
            let mut dir = parent_dir(importer).to_string();
            while segments.first() == Some(&"super") {
                segments.remove(0);
                dir = parent_dir(&dir).to_string();
            }
            dir
        }
        _ => return None, // external crate
    };

    // The trailing segments may name items, not modules: probe from the
    // longest module path down.
    while !segments.is_empty() {
        let module: Vec<&str> = segments
            .iter()
            .copied()
            .take_while(|s| !s.is_empty() && *s != "*" && !s.starts_with('{'))
            .collect();
        if module.is_empty() {
            break;
        }
        let stem = if base.is_empty() {
            module.join("/")
        } else {
            format!("{}/{}", base, module.join("/"))
        };
        let file = format!("{stem}.rs");
        if known.contains(&file) {
            return Some(file);
        }
        let module_file = format!("{stem}/mod.rs");
        if known.contains(&module_file) {
            return Some(module_file);
        }
        segments.pop();
    }

    if !base.is_empty() {
        base.push_str("/mod.rs");
        if known.contains(&base) {
            return Some(base);
        }
    }
    None
}

/// Module paths resolve by package-directory suffix match; the winner is
/// the lexically first file in the matched package.
fn resolve_go(spec: &str, known: &BTreeSet<String>) -> Option<String> {
    let package_dir = spec.rsplit('/').next().unwrap_or(spec);
    if package_dir.is_empty() {
        return None;
    }
    known
        .iter()
        .find(|path| {
            path.ends_with(".go")
                && parent_dir(path)
                    .rsplit('/')
                    .next()
                    .is_some_and(|dir| dir == package_dir)
        })
        .cloned()
}

/// Unknown languages: exact or extensionless match relative to the importer.
fn resolve_generic(spec: &str, importer: &str, known: &BTreeSet<String>) -> Option<String> {
    if known.contains(spec) {
        return Some(spec.to_string());
    }
    let joined = join_relative(parent_dir(importer), spec)?;
    known.contains(&joined).then_some(joined)
}

/// Parent directory of a relative path ("" at the root).
fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |pos| &path[..pos])
}

/// Join a `./`-style specifier onto a directory, normalizing `.` and `..`.
/// Returns `None` when `..` would escape the project root.
fn join_relative(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_web_extension_search() {
        let files = known(&["src/api.ts", "src/db/index.ts", "src/handler.ts"]);
        assert_eq!(
            resolve_import("./api", "src/handler.ts", "ts", &files),
            Some("src/api.ts".to_string())
        );
        assert_eq!(
            resolve_import("./db", "src/handler.ts", "ts", &files),
            Some("src/db/index.ts".to_string())
        );
        // Packages stay unresolved.
        assert_eq!(resolve_import("express", "src/handler.ts", "ts", &files), None);
    }

    #[test]
    fn test_web_parent_traversal() {
        let files = known(&["src/util.ts", "src/api/client.ts"]);
        assert_eq!(
            resolve_import("../util", "src/api/client.ts", "ts", &files),
            Some("src/util.ts".to_string())
        );
        // Escaping the root is not a resolution.
        assert_eq!(
            resolve_import("../../../util", "src/api/client.ts", "ts", &files),
            None
        );
    }

    #[test]
    fn test_python_dotted_and_relative() {
        let files = known(&["app/models.py", "app/db/__init__.py", "app/views.py"]);
        assert_eq!(
            resolve_import("app.models", "app/views.py", "py", &files),
            Some("app/models.py".to_string())
        );
        assert_eq!(
            resolve_import("app.db", "app/views.py", "py", &files),
            Some("app/db/__init__.py".to_string())
        );
        assert_eq!(
            resolve_import(".models", "app/views.py", "py", &files),
            Some("app/models.py".to_string())
        );
    }

    #[test]
    fn test_rust_crate_paths() {
        let files = known(&["src/core/errors.rs", "src/core/mod.rs", "src/lib.rs"]);
        assert_eq!(
            resolve_import(
                "crate::core::errors::Result",
                "src/engine.rs",
                "rs",
                &files
            ),
            Some("src/core/errors.rs".to_string())
        );
        assert_eq!(
            resolve_import("crate::core", "src/engine.rs", "rs", &files),
            Some("src/core/mod.rs".to_string())
        );
        assert_eq!(
            resolve_import("std::collections::HashMap", "src/engine.rs", "rs", &files),
            None
        );
    }

    #[test]
    fn test_go_package_suffix() {
        let files = known(&["models/user.go", "store/store.go"]);
        assert_eq!(
            resolve_import("example.com/app/models", "store/store.go", "go", &files),
            Some("models/user.go".to_string())
        );
        assert_eq!(
            resolve_import("fmt", "store/store.go", "go", &files),
            None
        );
    }
}
