//! File store: context collection and AST extraction.
//!
//! Walks a session target, loads supported source files into the
//! verification context (size- and count-capped), and drives the
//! language adapters to produce per-file structural analyses.

use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::core::config::SessionConfig;
use crate::core::errors::{ElenchusError, Result};
use crate::core::session::FileContext;
use crate::lang::common::SourceFileAnalysis;
use crate::lang::registry::{adapter_for_file, extension_is_supported};

/// Collects context files and runs AST extraction.
#[derive(Debug, Clone)]
pub struct FileStore {
    max_file_bytes: u64,
    max_context_files: usize,
}

impl FileStore {
    /// Create a store with the session limits.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            max_context_files: config.max_context_files,
        }
    }

    /// Walk `target` and load every supported source file into a context
    /// map keyed by normalized relative path.
    ///
    /// Respects ignore files, skips oversized files, and stops at the
    /// context-file ceiling.
    pub async fn collect_context(&self, target: &Path) -> Result<IndexMap<String, FileContext>> {
        if !target.exists() {
            return Err(ElenchusError::validation_field(
                format!("Target does not exist: {}", target.display()),
                "target",
            ));
        }

        let mut files = IndexMap::new();

        if target.is_file() {
            if let Some(context) = self.load_one(target, target.parent().unwrap_or(target)).await {
                files.insert(context.path.clone(), context);
            }
            return Ok(files);
        }

        let mut paths: Vec<std::path::PathBuf> = ignore::WalkBuilder::new(target)
            .hidden(true)
            .build()
            .flatten()
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(extension_is_supported)
            })
            .collect();
        paths.sort();

        for path in paths {
            if files.len() >= self.max_context_files {
                warn!(
                    limit = self.max_context_files,
                    "Context file ceiling reached; remaining files skipped"
                );
                break;
            }
            if let Some(context) = self.load_one(&path, target).await {
                files.insert(context.path.clone(), context);
            }
        }

        Ok(files)
    }

    /// Run the language adapters over every file with content.
    ///
    /// Files a grammar cannot handle fall back to the generic extractor;
    /// hard parse failures are logged and skipped rather than failing the
    /// whole context.
    pub fn analyze_context(files: &IndexMap<String, FileContext>) -> Vec<SourceFileAnalysis> {
        let mut analyses = Vec::with_capacity(files.len());
        for (path, context) in files {
            let Some(content) = &context.content else {
                continue;
            };
            let mut adapter = match adapter_for_file(Path::new(path)) {
                Ok(adapter) => adapter,
                Err(e) => {
                    warn!(path, error = %e, "No adapter for file");
                    continue;
                }
            };
            match adapter.analyze(content, path) {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => warn!(path, error = %e, "AST extraction failed; file skipped"),
            }
        }
        analyses
    }

    async fn load_one(&self, path: &Path, root: &Path) -> Option<FileContext> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        if metadata.len() > self.max_file_bytes {
            debug!(path = %path.display(), size = metadata.len(), "File exceeds size cap; skipped");
            return None;
        }
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read file; skipped");
                return None;
            }
        };
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let mut context = FileContext::base(relative);
        context.content = Some(content);
        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> FileStore {
        FileStore::new(&SessionConfig::default())
    }

    #[tokio::test]
    async fn test_collect_context_from_directory() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("index.ts"), "import { x } from './util';\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("util.ts"), "export const x = 1;\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("README.md"), "# readme\n")
            .await
            .unwrap();

        let files = store().collect_context(dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("index.ts"));
        assert!(files.contains_key("util.ts"));
        assert!(files["index.ts"].content.is_some());
    }

    #[tokio::test]
    async fn test_missing_target_rejected() {
        let result = store().collect_context(Path::new("/no/such/dir")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_oversized_file_skipped() {
        let dir = TempDir::new().unwrap();
        let small = FileStore {
            max_file_bytes: 8,
            max_context_files: 100,
        };
        tokio::fs::write(dir.path().join("big.ts"), "x".repeat(100))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("ok.ts"), "y = 1;")
            .await
            .unwrap();

        let files = small.collect_context(dir.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("ok.ts"));
    }

    #[tokio::test]
    async fn test_analyze_context_builds_analyses() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("index.ts"),
            "import { x } from './util';\nexport function main() { return x; }\n",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("util.ts"), "export const x = 1;\n")
            .await
            .unwrap();

        let files = store().collect_context(dir.path()).await.unwrap();
        let analyses = FileStore::analyze_context(&files);
        assert_eq!(analyses.len(), 2);

        let index = analyses.iter().find(|a| a.path == "index.ts").unwrap();
        assert_eq!(index.imports, vec!["./util"]);
        assert!(index.functions.iter().any(|f| f.name == "main"));
    }
}
