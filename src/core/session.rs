//! Session, round, and checkpoint model.
//!
//! A [`Session`] is a long-lived aggregate mutated only by the session
//! engine and persisted after every mutation. Checkpoints hold deep copies
//! of the issue set and context file list so rollback severs all references
//! to post-checkpoint state.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::config::ModeConfig;
use crate::core::errors::{ElenchusError, Result};
use crate::core::issues::Issue;

/// Maximum session id length accepted by [`validate_session_id`].
pub const MAX_SESSION_ID_LEN: usize = 100;

/// Maximum slug length inside a generated session id.
const MAX_SLUG_LEN: usize = 30;

/// Participant role in the adversarial dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Raises issues in the code under review.
    Verifier,
    /// Adjudicates raised issues.
    Critic,
    /// Breaks deadlocks between the other two roles.
    Arbiter,
}

impl Role {
    /// Canonical wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verifier => "verifier",
            Self::Critic => "critic",
            Self::Arbiter => "arbiter",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ElenchusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "verifier" => Ok(Self::Verifier),
            "critic" => Ok(Self::Critic),
            "arbiter" => Ok(Self::Arbiter),
            other => Err(ElenchusError::validation_field(
                format!("Unknown role: {other}"),
                "role",
            )),
        }
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initialized,
    Framing,
    Verifying,
    Converging,
    Converged,
    ForcedStop,
    Error,
    ReVerifying,
}

impl SessionStatus {
    /// Terminal sessions accept no further rounds.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::ForcedStop | Self::Error)
    }
}

/// Final verdict recorded when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionVerdict {
    Pass,
    Fail,
    Conditional,
}

/// Context membership layer for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextLayer {
    /// Present when the session started.
    #[default]
    Base,
    /// Added during a later round.
    Discovered,
}

/// Change status for a file relative to the diff baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Unchanged,
}

/// Differential attributes attached to a file context when diff-scoped
/// verification is active.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffAttributes {
    /// Change classification against the base reference.
    pub change_status: Option<ChangeStatus>,
    /// Changed line numbers, when hunks were requested.
    pub changed_lines: Vec<u32>,
    /// Pulled in through the affected-dependency closure.
    pub affected_by_change: bool,
    /// Out of diff scope; eligible for sampling only.
    pub skip_verification: bool,
}

/// One file participating in a session's verification context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContext {
    /// Path relative to the session target.
    pub path: String,
    /// File content, when loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Resolved dependency paths (graph edges are derived from these).
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Base vs discovered membership.
    #[serde(default)]
    pub layer: ContextLayer,
    /// Round in which a discovered file entered the context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_in_round: Option<u32>,
    /// Differential attributes, when diff scoping is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffAttributes>,
}

impl FileContext {
    /// Create a base-layer file context.
    pub fn base(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            dependencies: Vec::new(),
            layer: ContextLayer::Base,
            added_in_round: None,
            diff: None,
        }
    }

    /// Create a discovered-layer file context added in `round`.
    pub fn discovered(path: impl Into<String>, round: u32) -> Self {
        Self {
            path: path.into(),
            content: None,
            dependencies: Vec::new(),
            layer: ContextLayer::Discovered,
            added_in_round: Some(round),
            diff: None,
        }
    }
}

/// Verification context: the target, requirements, and file map.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationContext {
    /// Target path under review.
    pub target: String,
    /// Free-text requirements.
    pub requirements: String,
    /// File path to context mapping, insertion-ordered.
    pub files: IndexMap<String, FileContext>,
}

/// Files added since a reference round, stored instead of a full context
/// summary to keep round storage proportional to change size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDelta {
    /// Round whose context this delta extends.
    pub base_round: u32,
    /// Paths added since the base round.
    pub added_files: Vec<String>,
}

/// Input captured for a round: either a full context summary or a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RoundInput {
    /// Complete context summary text.
    Full {
        /// Rendered context summary handed to the submitting role.
        summary: String,
    },
    /// Space-efficient delta against an earlier round.
    Delta(ContextDelta),
}

/// One submission by a role; the unit of convergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Monotonic 1-based round number.
    pub number: u32,
    /// Submitting role.
    pub role: Role,
    /// Context input captured at submission time.
    pub input: RoundInput,
    /// LLM output text for the round.
    pub output: String,
    /// Submission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Issue ids raised in this round.
    #[serde(default)]
    pub issues_raised: Vec<String>,
    /// Issue ids resolved in this round.
    #[serde(default)]
    pub issues_resolved: Vec<String>,
    /// Whether the context grew during this round.
    #[serde(default)]
    pub context_expanded: bool,
    /// Number of files discovered during this round.
    #[serde(default)]
    pub new_files_discovered: u32,
}

/// Deep-copied snapshot enabling rollback to an earlier round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Round the checkpoint was taken after.
    pub round: u32,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Deep copy of the issue set at capture time.
    pub issues: Vec<Issue>,
    /// File paths present in context at capture time.
    pub context_files: Vec<String>,
    /// False once a later rollback invalidates this checkpoint.
    pub can_rollback_to: bool,
}

/// A long-lived adversarial review session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Generated identifier matching the session-id grammar.
    pub id: String,
    /// Target path under review.
    pub target: String,
    /// Free-text requirements.
    pub requirements: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Coarse phase tag mirrored to clients.
    pub phase: String,
    /// Number of the most recent round (0 before the first).
    pub current_round: u32,
    /// Round ceiling.
    pub max_rounds: u32,
    /// Verification mode configuration.
    pub mode: ModeConfig,
    /// Ordered rounds.
    #[serde(default)]
    pub rounds: Vec<Round>,
    /// Ordered checkpoints.
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    /// Issue set, keyed by canonical id.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Verification context.
    pub context: VerificationContext,
    /// Final verdict once ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<SessionVerdict>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// The role expected for the next round, or `None` when the session is
    /// terminal.
    ///
    /// Alternation is verifier -> critic -> verifier with two exceptions:
    /// in fast-track mode a clean verifier round skips the Critic, and in
    /// single-pass mode the role never leaves verifier.
    pub fn next_role(&self) -> Option<Role> {
        use crate::core::config::VerificationMode;

        if self.status.is_terminal() {
            return None;
        }
        let Some(last) = self.rounds.last() else {
            return Some(Role::Verifier);
        };
        match self.mode.mode {
            VerificationMode::SinglePass => Some(Role::Verifier),
            VerificationMode::FastTrack => match last.role {
                Role::Verifier if last.issues_raised.is_empty() => Some(Role::Verifier),
                Role::Verifier => Some(Role::Critic),
                Role::Critic | Role::Arbiter => Some(Role::Verifier),
            },
            VerificationMode::Standard => match last.role {
                Role::Verifier => Some(Role::Critic),
                Role::Critic | Role::Arbiter => Some(Role::Verifier),
            },
        }
    }

    /// Look up an issue by id (case-insensitive).
    pub fn issue(&self, id: &str) -> Option<&Issue> {
        let canonical = id.to_uppercase();
        self.issues.iter().find(|issue| issue.id == canonical)
    }

    /// Mutable issue lookup by id (case-insensitive).
    pub fn issue_mut(&mut self, id: &str) -> Option<&mut Issue> {
        let canonical = id.to_uppercase();
        self.issues.iter_mut().find(|issue| issue.id == canonical)
    }

    /// Count of files currently in context.
    pub fn context_file_count(&self) -> usize {
        self.context.files.len()
    }

    /// Touch the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Validate a session identifier against the id grammar.
///
/// Ids are path components of persisted session directories; the pattern
/// `[A-Za-z0-9_-]{1,100}` rules out traversal sequences.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
        return Err(ElenchusError::validation_field(
            format!("Session id length must be 1..={MAX_SESSION_ID_LEN}"),
            "sessionId",
        ));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ElenchusError::validation_field(
            "Session id may contain only letters, digits, '_' and '-'",
            "sessionId",
        ));
    }
    Ok(())
}

/// Generate a session id of the form `YYYY-MM-DD_<slug>_<6-random>`.
///
/// The slug collapses non-alphanumerics to `-` and is truncated to 30
/// characters; the random suffix comes from a v4 UUID.
pub fn generate_session_id(target: &str, now: DateTime<Utc>) -> String {
    let date = now.format("%Y-%m-%d");
    let slug = slugify_target(target);
    let random = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &random[..6];
    let id = format!("{date}_{slug}_{suffix}");
    debug_assert!(validate_session_id(&id).is_ok());
    id
}

/// Collapse a target path into a bounded id slug.
fn slugify_target(target: &str) -> String {
    let base = std::path::Path::new(target)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| target.to_string());

    let mut slug = String::with_capacity(base.len());
    let mut last_dash = false;
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("session");
    }
    slug
}
