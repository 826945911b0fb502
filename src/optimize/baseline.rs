//! Per-project verification baselines.
//!
//! A baseline is the file-hash snapshot of the last session that ended
//! with a PASS verdict; differential analysis diffs against it. Each
//! project keeps one live baseline plus the metadata of up to ten
//! predecessors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::errors::{ElenchusError, Result};

/// Baseline history entries kept per project.
const MAX_HISTORY: usize = 10;

/// Stable project identifier: first 16 hex chars of SHA-256 of the
/// absolute project path.
pub fn project_hash(absolute_path: &str) -> String {
    let digest = Sha256::digest(absolute_path.as_bytes());
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(16)
        .collect()
}

/// VCS position captured alongside a baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcsInfo {
    /// Commit hash at baseline time.
    pub commit: String,
    /// Branch name at baseline time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Remote URL, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// A PASS snapshot of a project's file hashes plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationBaseline {
    /// Stable project identifier.
    pub project_id: String,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Target path the session verified.
    pub target: String,
    /// Session that produced the baseline.
    pub session_id: String,
    /// Always `PASS`; other verdicts are never stored.
    pub verdict: String,
    /// VCS position, when the target is a repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsInfo>,
    /// File path to SHA-256 content hash.
    pub file_hashes: BTreeMap<String, String>,
    /// Files hashed.
    pub total_files: usize,
    /// Issues still open (non-blocking) when the session passed.
    pub remaining_issues: usize,
}

/// Metadata kept for superseded baselines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineHistoryEntry {
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Session that produced the baseline.
    pub session_id: String,
    /// Files hashed.
    pub total_files: usize,
    /// Open issues at capture time.
    pub remaining_issues: usize,
}

/// Per-project baseline index, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BaselineIndex {
    /// Prior baselines' metadata, truncated to the last ten.
    pub history: Vec<BaselineHistoryEntry>,
}

/// On-disk baseline store under `<data_dir>/baselines/<projectHash>/`.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: PathBuf,
}

impl BaselineStore {
    /// Create a store rooted at the data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("baselines"),
        }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    /// Persist a baseline, rolling the previous one into the history.
    ///
    /// Only PASS baselines are accepted; the caller enforces the verdict
    /// before building one.
    pub async fn save(&self, baseline: &VerificationBaseline) -> Result<()> {
        if baseline.verdict != "PASS" {
            return Err(ElenchusError::validation_field(
                "Only PASS baselines are stored",
                "verdict",
            ));
        }

        let dir = self.project_dir(&baseline.project_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ElenchusError::io("Cannot create baseline directory", e))?;

        let mut index = self.load_index(&baseline.project_id).await;
        if let Some(previous) = self.load_by_id(&baseline.project_id).await? {
            index.history.insert(
                0,
                BaselineHistoryEntry {
                    timestamp: previous.timestamp,
                    session_id: previous.session_id,
                    total_files: previous.total_files,
                    remaining_issues: previous.remaining_issues,
                },
            );
            index.history.truncate(MAX_HISTORY);
        }

        let baseline_json = serde_json::to_string_pretty(baseline)?;
        tokio::fs::write(dir.join("baseline.json"), baseline_json)
            .await
            .map_err(|e| ElenchusError::io("Cannot write baseline", e))?;

        let index_json = serde_json::to_string_pretty(&index)?;
        tokio::fs::write(dir.join("index.json"), index_json)
            .await
            .map_err(|e| ElenchusError::io("Cannot write baseline index", e))?;

        Ok(())
    }

    /// Load the live baseline for a project path.
    pub async fn load(&self, absolute_target: &str) -> Result<Option<VerificationBaseline>> {
        self.load_by_id(&project_hash(absolute_target)).await
    }

    /// Load the live baseline by project id.
    pub async fn load_by_id(&self, project_id: &str) -> Result<Option<VerificationBaseline>> {
        let path = self.project_dir(project_id).join("baseline.json");
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ElenchusError::io("Cannot read baseline", e)),
        };
        match serde_json::from_str(&raw) {
            Ok(baseline) => Ok(Some(baseline)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed baseline ignored");
                Ok(None)
            }
        }
    }

    /// Project history, newest first (empty when absent or malformed).
    pub async fn history(&self, absolute_target: &str) -> Vec<BaselineHistoryEntry> {
        self.load_index(&project_hash(absolute_target)).await.history
    }

    async fn load_index(&self, project_id: &str) -> BaselineIndex {
        let path = self.project_dir(project_id).join("index.json");
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Malformed baseline index reset");
                BaselineIndex::default()
            }),
            Err(_) => BaselineIndex::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn baseline(session: &str, project_id: &str) -> VerificationBaseline {
        let mut hashes = BTreeMap::new();
        hashes.insert("src/index.ts".to_string(), "ab".repeat(32));
        VerificationBaseline {
            project_id: project_id.to_string(),
            timestamp: Utc::now(),
            target: "/home/user/project".to_string(),
            session_id: session.to_string(),
            verdict: "PASS".to_string(),
            vcs: None,
            total_files: hashes.len(),
            remaining_issues: 0,
            file_hashes: hashes,
        }
    }

    #[test]
    fn test_project_hash_is_stable_prefix() {
        let a = project_hash("/home/user/project");
        let b = project_hash("/home/user/project");
        let c = project_hash("/home/user/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        let id = project_hash("/home/user/project");

        store.save(&baseline("s1", &id)).await.unwrap();
        let loaded = store.load("/home/user/project").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.total_files, 1);
    }

    #[tokio::test]
    async fn test_non_pass_rejected() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        let mut bad = baseline("s1", &project_hash("/p"));
        bad.verdict = "FAIL".to_string();
        assert!(store.save(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_history_truncated_to_ten() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        let id = project_hash("/home/user/project");

        for i in 0..13 {
            store.save(&baseline(&format!("s{i}"), &id)).await.unwrap();
        }

        let history = store.history("/home/user/project").await;
        assert_eq!(history.len(), MAX_HISTORY);
        // Newest superseded baseline first.
        assert_eq!(history[0].session_id, "s11");

        let live = store.load("/home/user/project").await.unwrap().unwrap();
        assert_eq!(live.session_id, "s12");
    }

    #[tokio::test]
    async fn test_missing_baseline_is_none() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        assert!(store.load("/nope").await.unwrap().is_none());
        assert!(store.history("/nope").await.is_empty());
    }
}
