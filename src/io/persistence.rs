//! Persistence for sessions and safeguards trackers.
//!
//! Layout under the data directory:
//!
//! ```text
//! sessions/{id}/session.json
//! baselines/{projectHash}/{baseline.json,index.json}
//! safeguards/periodic-trackers.json
//! ```
//!
//! Loads validate against the typed data model; malformed records are
//! treated as absent and logged, never auto-repaired. Writes are retried
//! once before the failure surfaces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::core::errors::{ElenchusError, Result};
use crate::core::session::{validate_session_id, Session};
use crate::optimize::coordinator::PeriodicTracker;

/// On-disk session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("sessions"),
        }
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join("session.json")
    }

    /// Persist a session, retrying the write once on I/O failure.
    pub async fn save(&self, session: &Session) -> Result<()> {
        validate_session_id(&session.id)?;
        let dir = self.root.join(&session.id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ElenchusError::io("Cannot create session directory", e))?;

        let json = serde_json::to_string_pretty(session)?;
        let path = self.session_path(&session.id);
        write_with_retry(&path, &json).await
    }

    /// Load a persisted session.
    ///
    /// The id is pattern-validated before touching the filesystem. The
    /// JSON must deserialize into the full session model and pass the
    /// structural invariants; anything else yields `None` with a logged
    /// error.
    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        validate_session_id(id)?;
        let path = self.session_path(id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ElenchusError::io("Cannot read session", e)),
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                error!(id, error = %e, "Persisted session failed schema validation");
                return Ok(None);
            }
        };

        if let Err(e) = check_invariants(&session, id) {
            error!(id, error = %e, "Persisted session failed integrity checks");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Ids of all persisted sessions.
    pub async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return ids;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_session_id(&name).is_ok() {
                ids.push(name);
            }
        }
        ids.sort();
        ids
    }
}

/// Structural invariants checked on load.
fn check_invariants(session: &Session, expected_id: &str) -> Result<()> {
    if session.id != expected_id {
        return Err(ElenchusError::integrity(
            format!("Stored id '{}' does not match '{expected_id}'", session.id),
            None,
        ));
    }
    for (i, round) in session.rounds.iter().enumerate() {
        let expected = (i + 1) as u32;
        if round.number != expected {
            return Err(ElenchusError::integrity(
                format!("Round {} numbered {}", expected, round.number),
                None,
            ));
        }
        if i > 0 && round.timestamp < session.rounds[i - 1].timestamp {
            return Err(ElenchusError::integrity(
                format!("Round {} timestamp precedes round {}", expected, i),
                None,
            ));
        }
    }
    if session.current_round as usize != session.rounds.len() {
        return Err(ElenchusError::integrity(
            format!(
                "currentRound {} does not match {} stored round(s)",
                session.current_round,
                session.rounds.len()
            ),
            None,
        ));
    }
    Ok(())
}

/// On-disk store for per-project periodic trackers.
#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    /// Create a store rooted at the data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("safeguards").join("periodic-trackers.json"),
        }
    }

    /// Load all trackers (empty on absence or corruption).
    pub async fn load(&self) -> HashMap<String, PeriodicTracker> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Malformed tracker store reset");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    /// Persist all trackers.
    pub async fn save(&self, trackers: &HashMap<String, PeriodicTracker>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ElenchusError::io("Cannot create safeguards directory", e))?;
        }
        let json = serde_json::to_string_pretty(trackers)?;
        write_with_retry(&self.path, &json).await
    }
}

/// Write a file, retrying once before surfacing the failure.
async fn write_with_retry(path: &Path, contents: &str) -> Result<()> {
    match tokio::fs::write(path, contents).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "Write failed; retrying once");
            tokio::fs::write(path, contents)
                .await
                .map_err(|e| ElenchusError::io(format!("Cannot write {}", path.display()), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ModeConfig;
    use crate::core::session::{
        Role, Round, RoundInput, SessionStatus, VerificationContext,
    };
    use chrono::Utc;
    use tempfile::TempDir;

    fn session(id: &str, rounds: u32) -> Session {
        let now = Utc::now();
        let mut session = Session {
            id: id.to_string(),
            target: "./demo".to_string(),
            requirements: "demo".to_string(),
            status: SessionStatus::Verifying,
            phase: "verification".to_string(),
            current_round: rounds,
            max_rounds: 10,
            mode: ModeConfig::default(),
            rounds: Vec::new(),
            checkpoints: Vec::new(),
            issues: Vec::new(),
            context: VerificationContext::default(),
            verdict: None,
            created_at: now,
            updated_at: now,
        };
        for n in 1..=rounds {
            session.rounds.push(Round {
                number: n,
                role: if n % 2 == 1 { Role::Verifier } else { Role::Critic },
                input: RoundInput::Full {
                    summary: String::new(),
                },
                output: format!("round {n}"),
                timestamp: now,
                issues_raised: Vec::new(),
                issues_resolved: Vec::new(),
                context_expanded: false,
                new_files_discovered: 0,
            });
        }
        session
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let original = session("2025-06-01_demo_abc123", 2);

        store.save(&original).await.unwrap();
        let loaded = store.load("2025-06-01_demo_abc123").await.unwrap().unwrap();

        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.rounds.len(), 2);
        assert_eq!(loaded.rounds[1].output, "round 2");
        assert_eq!(loaded.current_round, original.current_round);
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_before_fs() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_json_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let session_dir = dir.path().join("sessions").join("bad-session");
        tokio::fs::create_dir_all(&session_dir).await.unwrap();
        tokio::fs::write(session_dir.join("session.json"), "{not json")
            .await
            .unwrap();

        assert!(store.load("bad-session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_integrity_violation_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut broken = session("2025-06-01_demo_abc123", 2);
        broken.rounds[1].number = 7;
        store.save(&broken).await.unwrap();

        assert!(store.load("2025-06-01_demo_abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&session("2025-06-01_a_aaaaaa", 0)).await.unwrap();
        store.save(&session("2025-06-01_b_bbbbbb", 0)).await.unwrap();
        assert_eq!(
            store.list().await,
            vec!["2025-06-01_a_aaaaaa", "2025-06-01_b_bbbbbb"]
        );
    }

    #[tokio::test]
    async fn test_tracker_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = TrackerStore::new(dir.path());
        assert!(store.load().await.is_empty());

        let mut trackers = HashMap::new();
        trackers.insert(
            "abcd1234".to_string(),
            PeriodicTracker {
                incremental_count: 3,
                last_full_verification: Some(Utc::now()),
            },
        );
        store.save(&trackers).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["abcd1234"].incremental_count, 3);
    }
}
