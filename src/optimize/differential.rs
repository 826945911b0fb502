//! Differential change detection.
//!
//! Detects files changed relative to a base reference, preferring a git
//! subprocess when the working directory is a repository and falling back
//! to content-hash comparison against the stored baseline. Git output is
//! consumed through a bounded buffer and the scanner fails fast on
//! overruns; a missing binary or non-repo directory degrades to the hash
//! path with a warning.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::config::DifferentialConfig;
use crate::core::errors::{ElenchusError, Result};
use crate::core::session::ChangeStatus;
use crate::graph::DependencyGraph;
use crate::lang::registry::extension_is_supported;
use crate::optimize::baseline::{VcsInfo, VerificationBaseline};
use crate::optimize::cache::content_hash;

/// Ceiling on captured subprocess output (10 MiB).
const MAX_TOOL_OUTPUT: usize = 10 * 1024 * 1024;

/// Hunk lines captured per file before truncation.
const MAX_HUNK_LINES: usize = 100;

/// How the changed set was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMethod {
    /// VCS-driven diff.
    Git,
    /// Content-hash comparison against the baseline.
    Hash,
    /// Git change list merged with hash verification.
    Hybrid,
}

/// One changed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Path relative to the working directory.
    pub path: String,
    /// Change classification.
    pub status: ChangeStatus,
    /// Changed line numbers, when hunks were requested (truncated).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_lines: Vec<u32>,
}

/// Result of one differential scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Derivation method.
    pub method: DiffMethod,
    /// Reference the diff was computed against.
    pub base_ref: String,
    /// Changed files.
    pub changed_files: Vec<ChangedFile>,
    /// Files pulled in through the dependency closure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files: Vec<String>,
    /// Human-readable summary.
    pub summary: String,
}

impl DiffResult {
    /// An empty result for degraded paths.
    pub fn empty(base_ref: &str, method: DiffMethod) -> Self {
        Self {
            method,
            base_ref: base_ref.to_string(),
            changed_files: Vec::new(),
            affected_files: Vec::new(),
            summary: "No changes detected".to_string(),
        }
    }
}

/// Diff scanner over a working directory.
#[derive(Debug)]
pub struct DiffScanner {
    config: DifferentialConfig,
}

impl DiffScanner {
    /// Create a scanner with the given configuration.
    pub fn new(config: DifferentialConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &DifferentialConfig {
        &self.config
    }

    /// Scan for changes against the configured base reference.
    pub async fn scan(
        &self,
        workdir: &Path,
        baseline: Option<&VerificationBaseline>,
    ) -> Result<DiffResult> {
        let base_ref = self.config.base_ref.as_str();

        if let Some(resolved) = self.resolve_git_ref(workdir, base_ref, baseline).await {
            match self.git_scan(workdir, &resolved).await {
                Ok(mut result) => {
                    result.base_ref = base_ref.to_string();
                    if let Some(baseline) = baseline {
                        self.hash_verify(workdir, baseline, &mut result).await;
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!(error = %e, "Git diff failed; falling back to hash comparison");
                }
            }
        }

        match baseline {
            Some(baseline) => self.hash_scan(workdir, baseline).await,
            None => {
                debug!("No baseline available; reporting empty diff");
                Ok(DiffResult::empty(base_ref, DiffMethod::Hash))
            }
        }
    }

    /// Capture the current VCS position, when the directory is a repo.
    pub async fn current_vcs_info(&self, workdir: &Path) -> Option<VcsInfo> {
        if !self.is_git_repo(workdir).await {
            return None;
        }
        let commit = run_git(workdir, &["rev-parse", "HEAD"]).await.ok()?;
        let branch = run_git(workdir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok();
        Some(VcsInfo {
            commit: commit.trim().to_string(),
            branch: branch.map(|b| b.trim().to_string()),
            remote: None,
        })
    }

    /// Extend a changed set with the files importing it, up to the
    /// configured closure depth.
    pub fn affected_closure(
        &self,
        graph: &DependencyGraph,
        changed: &[String],
    ) -> Vec<String> {
        if !self.config.trace_dependencies {
            return Vec::new();
        }
        let changed_set: HashSet<&String> = changed.iter().collect();
        let mut affected: Vec<String> = graph
            .affected_set(changed, self.config.max_affected_depth)
            .into_iter()
            .filter(|path| !changed_set.contains(path))
            .collect();
        affected.sort();
        affected
    }

    async fn is_git_repo(&self, workdir: &Path) -> bool {
        run_git(workdir, &["rev-parse", "--git-dir"]).await.is_ok()
    }

    /// Resolve the configured base ref to a concrete git ref, or `None`
    /// when git cannot serve the diff.
    async fn resolve_git_ref(
        &self,
        workdir: &Path,
        base_ref: &str,
        baseline: Option<&VerificationBaseline>,
    ) -> Option<String> {
        if !self.is_git_repo(workdir).await {
            return None;
        }
        if base_ref == "last-verified" {
            // Last-verified resolves through the baseline's recorded commit.
            return baseline
                .and_then(|b| b.vcs.as_ref())
                .map(|vcs| vcs.commit.clone());
        }
        // Commits, branches, and HEAD~N all resolve through rev-parse.
        run_git(workdir, &["rev-parse", base_ref])
            .await
            .ok()
            .map(|out| out.trim().to_string())
    }

    async fn git_scan(&self, workdir: &Path, resolved_ref: &str) -> Result<DiffResult> {
        let name_status = run_git(workdir, &["diff", "--name-status", resolved_ref]).await?;
        let mut changed_files = parse_name_status(&name_status);

        // Untracked files count as added.
        if let Ok(untracked) =
            run_git(workdir, &["ls-files", "--others", "--exclude-standard"]).await
        {
            for line in untracked.lines().filter(|l| !l.is_empty()) {
                changed_files.push(ChangedFile {
                    path: line.to_string(),
                    status: ChangeStatus::Added,
                    changed_lines: Vec::new(),
                });
            }
        }

        if self.config.include_hunks {
            for file in &mut changed_files {
                if file.status == ChangeStatus::Modified {
                    file.changed_lines = self.hunk_lines(workdir, resolved_ref, &file.path).await;
                }
            }
        }

        let stat = run_git(workdir, &["diff", "--stat", resolved_ref])
            .await
            .unwrap_or_default();
        let summary = stat
            .lines()
            .last()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} file(s) changed", changed_files.len()));

        Ok(DiffResult {
            method: DiffMethod::Git,
            base_ref: resolved_ref.to_string(),
            changed_files,
            affected_files: Vec::new(),
            summary,
        })
    }

    /// Changed line numbers from a zero-context diff, truncated.
    async fn hunk_lines(&self, workdir: &Path, resolved_ref: &str, path: &str) -> Vec<u32> {
        let Ok(diff) = run_git(workdir, &["diff", "-U0", resolved_ref, "--", path]).await else {
            return Vec::new();
        };
        let mut lines = Vec::new();
        for line in diff.lines() {
            // Hunk headers look like `@@ -a,b +c,d @@`.
            if let Some(rest) = line.strip_prefix("@@ ") {
                if let Some(plus) = rest.split(' ').find(|part| part.starts_with('+')) {
                    let spec = &plus[1..];
                    let (start, count) = match spec.split_once(',') {
                        Some((s, c)) => (s.parse().unwrap_or(0), c.parse().unwrap_or(1)),
                        None => (spec.parse().unwrap_or(0), 1u32),
                    };
                    for offset in 0..count {
                        if lines.len() >= MAX_HUNK_LINES {
                            return lines;
                        }
                        lines.push(start + offset);
                    }
                }
            }
        }
        lines
    }

    /// Cross-check a git change list against the baseline's hash map:
    /// files whose current content still matches the baseline (touched
    /// but reverted) are dropped. Marks the result hybrid.
    async fn hash_verify(
        &self,
        workdir: &Path,
        baseline: &VerificationBaseline,
        result: &mut DiffResult,
    ) {
        let mut confirmed = Vec::with_capacity(result.changed_files.len());
        for file in result.changed_files.drain(..) {
            if file.status == ChangeStatus::Modified {
                if let Some(known) = baseline.file_hashes.get(&file.path) {
                    if let Ok(content) = tokio::fs::read(workdir.join(&file.path)).await {
                        if content_hash(&content) == *known {
                            continue;
                        }
                    }
                }
            }
            confirmed.push(file);
        }
        result.changed_files = confirmed;
        result.method = DiffMethod::Hybrid;
    }

    async fn hash_scan(
        &self,
        workdir: &Path,
        baseline: &VerificationBaseline,
    ) -> Result<DiffResult> {
        let mut changed_files = Vec::new();
        let mut seen = HashSet::new();

        let walker = ignore::WalkBuilder::new(workdir).hidden(true).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !extension_is_supported(ext) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(workdir) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            seen.insert(relative.clone());

            let content = tokio::fs::read(path)
                .await
                .map_err(|e| ElenchusError::io("Cannot read file for hashing", e))?;
            let hash = content_hash(&content);

            match baseline.file_hashes.get(&relative) {
                Some(previous) if *previous == hash => {}
                Some(_) => changed_files.push(ChangedFile {
                    path: relative,
                    status: ChangeStatus::Modified,
                    changed_lines: Vec::new(),
                }),
                None => changed_files.push(ChangedFile {
                    path: relative,
                    status: ChangeStatus::Added,
                    changed_lines: Vec::new(),
                }),
            }
        }

        for known in baseline.file_hashes.keys() {
            if !seen.contains(known) {
                changed_files.push(ChangedFile {
                    path: known.clone(),
                    status: ChangeStatus::Deleted,
                    changed_lines: Vec::new(),
                });
            }
        }

        changed_files.sort_by(|a, b| a.path.cmp(&b.path));
        let summary = format!(
            "{} file(s) differ from baseline {}",
            changed_files.len(),
            baseline.session_id
        );
        Ok(DiffResult {
            method: DiffMethod::Hash,
            base_ref: "last-verified".to_string(),
            changed_files,
            affected_files: Vec::new(),
            summary,
        })
    }
}

/// Run a git command, returning trimmed stdout.
///
/// Output beyond the bound fails fast rather than truncating silently.
async fn run_git(workdir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .await
        .map_err(|e| ElenchusError::external_tool("git", format!("Cannot invoke git: {e}")))?;

    if output.stdout.len() > MAX_TOOL_OUTPUT {
        return Err(ElenchusError::external_tool(
            "git",
            format!(
                "Output exceeded {} bytes for 'git {}'",
                MAX_TOOL_OUTPUT,
                args.join(" ")
            ),
        ));
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ElenchusError::external_tool(
            "git",
            format!("'git {}' failed: {}", args.join(" "), stderr.trim()),
        ));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| ElenchusError::external_tool("git", format!("Non-UTF8 output: {e}")))
}

/// Parse `git diff --name-status` output.
fn parse_name_status(output: &str) -> Vec<ChangedFile> {
    let mut files = Vec::new();
    for line in output.lines() {
        let mut parts = line.split('\t');
        let Some(status_code) = parts.next() else {
            continue;
        };
        let status = match status_code.chars().next() {
            Some('A') => ChangeStatus::Added,
            Some('M') => ChangeStatus::Modified,
            Some('D') => ChangeStatus::Deleted,
            Some('R') => ChangeStatus::Renamed,
            _ => continue,
        };
        // Renames carry old and new paths; the new path is last.
        let Some(path) = parts.last() else {
            continue;
        };
        if path.is_empty() {
            continue;
        }
        files.push(ChangedFile {
            path: path.to_string(),
            status,
            changed_lines: Vec::new(),
        });
    }
    files
}
