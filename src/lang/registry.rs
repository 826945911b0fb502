//! Factory utilities and metadata for language adapters.

use std::path::Path;

use tree_sitter::Language;

use crate::core::errors::{ElenchusError, Result};
use crate::lang::common::{GenericAdapter, LanguageAdapter};
use crate::lang::go::GoAdapter;
use crate::lang::javascript::JavaScriptAdapter;
use crate::lang::python::PythonAdapter;
use crate::lang::rust_lang::RustAdapter;
use crate::lang::typescript::TypeScriptAdapter;

/// Metadata describing one of the built-in language adapters.
#[derive(Debug, Clone, Copy)]
pub struct LanguageInfo {
    /// Canonical short key (e.g. "py").
    pub key: &'static str,
    /// Human-friendly display name.
    pub name: &'static str,
    /// Supported file extensions (without leading dots).
    pub extensions: &'static [&'static str],
}

const REGISTERED_LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo {
        key: "py",
        name: "Python",
        extensions: &["py", "pyi"],
    },
    LanguageInfo {
        key: "ts",
        name: "TypeScript",
        extensions: &["ts", "tsx", "cts", "mts"],
    },
    LanguageInfo {
        key: "js",
        name: "JavaScript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageInfo {
        key: "rs",
        name: "Rust",
        extensions: &["rs"],
    },
    LanguageInfo {
        key: "go",
        name: "Go",
        extensions: &["go"],
    },
];

/// Return the languages that are compiled into this build.
pub fn registered_languages() -> &'static [LanguageInfo] {
    REGISTERED_LANGUAGES
}

/// Identify the canonical language key for a file path.
pub fn language_key_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    find_language_by_extension(&ext).map(|info| info.key)
}

/// Create a language adapter suitable for analysing the provided file.
///
/// Files with no registered grammar get the generic line-scan adapter so
/// unknown languages degrade instead of failing.
pub fn adapter_for_file(path: &Path) -> Result<Box<dyn LanguageAdapter>> {
    match language_key_for_path(path) {
        Some(key) => adapter_for_language(key),
        None => Ok(Box::new(GenericAdapter)),
    }
}

/// Create a language adapter for a specific language key.
pub fn adapter_for_language(language: &str) -> Result<Box<dyn LanguageAdapter>> {
    match normalize_language_key(language) {
        Some("py") => Ok(Box::new(PythonAdapter::new()?)),
        Some("js") => Ok(Box::new(JavaScriptAdapter::new()?)),
        Some("ts") => Ok(Box::new(TypeScriptAdapter::new()?)),
        Some("rs") => Ok(Box::new(RustAdapter::new()?)),
        Some("go") => Ok(Box::new(GoAdapter::new()?)),
        _ => Ok(Box::new(GenericAdapter)),
    }
}

/// Get the tree-sitter grammar for a given language key.
pub fn get_tree_sitter_language(language_key: &str) -> Result<Language> {
    match normalize_language_key(language_key) {
        Some("py") => Ok(tree_sitter_python::LANGUAGE.into()),
        Some("rs") => Ok(tree_sitter_rust::LANGUAGE.into()),
        Some("js") => Ok(tree_sitter_javascript::LANGUAGE.into()),
        Some("ts") => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Some("go") => Ok(tree_sitter_go::LANGUAGE.into()),
        _ => Err(ElenchusError::parse(
            language_key,
            "No tree-sitter grammar registered",
        )),
    }
}

/// Create a parser pre-configured for the given language.
pub fn create_parser_for_language(language_key: &str) -> Result<tree_sitter::Parser> {
    let mut parser = tree_sitter::Parser::new();
    let grammar = get_tree_sitter_language(language_key)?;
    parser.set_language(&grammar).map_err(|e| {
        ElenchusError::parse(language_key, format!("Failed to set parser language: {e}"))
    })?;
    Ok(parser)
}

/// Check whether a file extension (with or without leading dot) has a
/// registered grammar.
pub fn extension_is_supported(ext: &str) -> bool {
    let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
    find_language_by_extension(&normalized).is_some()
}

/// Finds the language info for a given file extension.
fn find_language_by_extension(ext: &str) -> Option<&'static LanguageInfo> {
    let target = ext.trim_start_matches('.').to_ascii_lowercase();
    registered_languages().iter().find(|info| {
        info.extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&target))
    })
}

/// Normalizes a language identifier to its canonical key.
fn normalize_language_key(language: &str) -> Option<&'static str> {
    match language.to_ascii_lowercase().as_str() {
        "py" | "pyi" | "python" => Some("py"),
        "js" | "jsx" | "mjs" | "cjs" | "javascript" => Some("js"),
        "ts" | "tsx" | "cts" | "mts" | "typescript" => Some("ts"),
        "rs" | "rust" => Some("rs"),
        "go" | "golang" => Some("go"),
        other => registered_languages()
            .iter()
            .find(|info| info.key == other)
            .map(|info| info.key),
    }
}
