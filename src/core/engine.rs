//! Session and round engine.
//!
//! The engine is the only component that mutates session state. Every
//! mutating operation runs the same shape: validate, snapshot, mutate in
//! memory, persist (one retry), and roll the memory back if persistence
//! ultimately fails. Round admission enforces role alternation and issue
//! referential integrity before anything is recorded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::config::{ElenchusConfig, ModeConfig};
use crate::core::convergence::{ConvergenceEvaluator, ConvergenceSnapshot};
use crate::core::errors::{ElenchusError, Result};
use crate::core::issue_index::IssueIndex;
use crate::core::issues::{
    CriticVerdict, Issue, IssueCategory, IssueStatus, IssueTransition, Severity, TransitionKind,
};
use crate::core::session::{
    generate_session_id, ChangeStatus, Checkpoint, ContextDelta, DiffAttributes, FileContext,
    Role, Round, RoundInput, Session, SessionStatus, SessionVerdict, VerificationContext,
};
use crate::graph::mediator::{Mediator, MediatorSummary, RippleAnalysis};
use crate::io::files::FileStore;
use crate::io::persistence::{SessionStore, TrackerStore};
use crate::optimize::baseline::{project_hash, BaselineStore, VerificationBaseline};
use crate::optimize::cache::{content_hash, CacheStats, VerificationCache};
use crate::optimize::confidence::{ConfidenceScore, SessionConfidence, VerificationSource};
use crate::optimize::coordinator::{
    ActiveOptimizations, ConvergenceGate, PeriodicDecision, QualityAssessment,
    SafeguardsCoordinator,
};
use crate::optimize::differential::{DiffResult, DiffScanner};
use crate::optimize::pipeline::{PipelineStatus, Tier, TierCompletion, TierPipeline, TierResult};
use crate::optimize::sampling::{SamplingEngine, SamplingSelection, SkippedFile};

/// Per-session optimization overrides supplied at start time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationSettings {
    /// Differential verification override.
    pub differential: Option<crate::core::config::DifferentialConfig>,
    /// Cache override.
    pub cache: Option<crate::core::config::CacheConfig>,
    /// Pipeline override.
    pub pipeline: Option<crate::core::config::PipelineConfig>,
    /// Sampling override.
    pub sampling: Option<crate::core::config::SamplingConfig>,
}

/// A new issue raised in a round submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssueInput {
    /// Issue id (`SEC-01` style); upper-cased on storage.
    pub id: String,
    /// Category.
    pub category: IssueCategory,
    /// Severity.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Supporting evidence.
    #[serde(default)]
    pub evidence: String,
    /// Location in `file:line` form.
    #[serde(default)]
    pub location: Option<String>,
}

/// A resolution (and optional adjudication) in a round submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionInput {
    /// Referenced issue id.
    pub issue_id: String,
    /// Critic verdict recorded before resolving.
    #[serde(default)]
    pub verdict: Option<CriticVerdict>,
    /// Rationale.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Acknowledgement returned by `submit_round`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundAck {
    /// Allocated round number.
    pub round_number: u32,
    /// Next expected role, or `complete` once converged.
    pub next_role: String,
    /// Canonical ids of issues raised.
    pub issues_raised: Vec<String>,
    /// Canonical ids of issues resolved.
    pub issues_resolved: Vec<String>,
    /// Whether the context grew during this round.
    pub context_expanded: bool,
    /// Files discovered during this round.
    pub new_files_discovered: u32,
    /// Convergence snapshot after the round.
    pub convergence: ConvergenceSnapshot,
    /// Intervention hint (round ceiling, deadlock).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<String>,
}

/// Summary returned by `create_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAck {
    /// Generated session id.
    pub session_id: String,
    /// Initial status.
    pub status: SessionStatus,
    /// Files loaded into context.
    pub file_count: usize,
    /// Role expected for round 1.
    pub next_role: String,
    /// Differential scan outcome, when differential mode is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
    /// Critical files flagged by the mediator.
    pub unverified_critical: Vec<String>,
}

/// Runtime state kept per live session.
struct SessionState {
    session: Session,
    index: IssueIndex,
    mediator: Mediator,
    coordinator: SafeguardsCoordinator,
    pipeline: TierPipeline,
    sampler: SamplingEngine,
    optimizations: ActiveOptimizations,
    diff: Option<DiffResult>,
}

/// The session engine: the only mutator of session state.
pub struct SessionEngine {
    config: ElenchusConfig,
    data_dir: PathBuf,
    file_store: FileStore,
    session_store: SessionStore,
    baseline_store: BaselineStore,
    tracker_store: TrackerStore,
    /// Process-wide verification cache behind the engine API.
    cache: Mutex<VerificationCache>,
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionEngine {
    /// Create an engine rooted at the configured data directory.
    pub fn new(config: ElenchusConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.storage.resolve_data_dir();
        Ok(Self {
            file_store: FileStore::new(&config.session),
            session_store: SessionStore::new(&data_dir),
            baseline_store: BaselineStore::new(&data_dir),
            tracker_store: TrackerStore::new(&data_dir),
            cache: Mutex::new(VerificationCache::new(config.cache.clone())),
            sessions: Mutex::new(HashMap::new()),
            data_dir,
            config,
        })
    }

    /// Data directory in use.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create a session over `target`, populate the file store, build the
    /// dependency graph, and persist the initial record.
    pub async fn create_session(
        &self,
        target: String,
        requirements: String,
        max_rounds: Option<u32>,
        mode: Option<ModeConfig>,
        optimizations: Option<OptimizationSettings>,
    ) -> Result<SessionAck> {
        let target_path = PathBuf::from(&target);
        let files = self.file_store.collect_context(&target_path).await?;
        let analyses = FileStore::analyze_context(&files);

        let opts = optimizations.unwrap_or_default();
        let differential = opts
            .differential
            .unwrap_or_else(|| self.config.differential.clone());
        let cache_cfg = opts.cache.unwrap_or_else(|| self.config.cache.clone());
        let pipeline_cfg = opts.pipeline.unwrap_or_else(|| self.config.pipeline.clone());
        let sampling_cfg = opts.sampling.unwrap_or_else(|| self.config.sampling.clone());

        let active = ActiveOptimizations {
            differential: differential.enabled,
            cache: cache_cfg.enabled,
            pipeline: pipeline_cfg.enabled,
        };

        let mediator = Mediator::new(&analyses, self.config.mediator.clone());
        let mut context = VerificationContext {
            target: target.clone(),
            requirements: requirements.clone(),
            files,
        };
        // Resolved dependencies back-fill the file contexts.
        for (path, file) in context.files.iter_mut() {
            file.dependencies = mediator.graph().dependencies_of(path);
        }

        let scanner = DiffScanner::new(differential.clone());
        let mut diff = None;
        if differential.enabled {
            let absolute = absolute_target(&target_path);
            let baseline = self.baseline_store.load(&absolute).await?;
            let mut result = scanner.scan(&target_path, baseline.as_ref()).await?;
            let changed: Vec<String> = result
                .changed_files
                .iter()
                .map(|f| f.path.clone())
                .collect();
            result.affected_files = scanner.affected_closure(mediator.graph(), &changed);
            apply_diff_attributes(&mut context, &result);
            diff = Some(result);
        }

        let project_id = project_hash(&absolute_target(&target_path));
        let tracker = self
            .tracker_store
            .load()
            .await
            .remove(&project_id)
            .unwrap_or_default();
        let mut coordinator = SafeguardsCoordinator::new(
            self.config.safeguards.clone(),
            sampling_cfg,
            active,
            tracker,
        )?;
        coordinator.set_total_files(context.files.len());

        let sampler = SamplingEngine::new(coordinator.effective_sampling().clone())?;
        let pipeline = TierPipeline::new(pipeline_cfg)?;

        let now = Utc::now();
        let id = generate_session_id(&target, now);
        let session = Session {
            id: id.clone(),
            target,
            requirements,
            status: SessionStatus::Initialized,
            phase: "framing".to_string(),
            current_round: 0,
            max_rounds: max_rounds.unwrap_or(self.config.session.default_max_rounds),
            mode: mode.unwrap_or_else(|| self.config.mode.clone()),
            rounds: Vec::new(),
            checkpoints: Vec::new(),
            issues: Vec::new(),
            context,
            verdict: None,
            created_at: now,
            updated_at: now,
        };

        self.session_store.save(&session).await?;
        info!(session_id = %id, files = session.context.files.len(), "Session created");

        let ack = SessionAck {
            session_id: id.clone(),
            status: session.status,
            file_count: session.context.files.len(),
            next_role: Role::Verifier.as_str().to_string(),
            diff: diff.clone(),
            unverified_critical: mediator.unverified_critical().to_vec(),
        };

        let state = SessionState {
            session,
            index: IssueIndex::new(),
            mediator,
            coordinator,
            pipeline,
            sampler,
            optimizations: active,
            diff,
        };
        self.sessions
            .lock()
            .insert(id, Arc::new(Mutex::new(state)));
        Ok(ack)
    }

    /// Fetch a session snapshot: memory first, then disk (with schema
    /// validation and state reconstruction).
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        if let Some(state) = self.state_for(id) {
            return Ok(Some(state.lock().session.clone()));
        }
        match self.session_store.load(id).await? {
            Some(session) => {
                let snapshot = session.clone();
                self.admit_loaded(session)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Submit a round for a session.
    pub async fn submit_round(
        &self,
        id: &str,
        role: Role,
        output: String,
        issues_raised: Vec<NewIssueInput>,
        issues_resolved: Vec<ResolutionInput>,
    ) -> Result<RoundAck> {
        let state = self.require_state(id).await?;

        // Issue locations naming files outside the context are prefetched
        // with the lock released; admission re-checks membership, so a
        // context that grew in between just ignores the stale prefetch.
        let (candidates, target) = {
            let guard = state.lock();
            (
                Self::discovery_candidates(&guard, &issues_raised),
                guard.session.target.clone(),
            )
        };
        let mut discovered_contents = HashMap::new();
        for file in candidates {
            let path = Path::new(&target).join(&file);
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                discovered_contents.insert(file, content);
            }
        }

        // Mutate under the lock, then persist outside it.
        let (ack, snapshot, pre_mutation) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();
            let ack = Self::admit_round(
                &mut guard,
                role,
                output,
                issues_raised,
                issues_resolved,
                &discovered_contents,
            )?;
            (ack, guard.session.clone(), pre_mutation)
        };

        if let Err(e) = self.session_store.save(&snapshot).await {
            // Roll the in-memory state back to the pre-mutation snapshot.
            let mut guard = state.lock();
            guard.index = IssueIndex::rebuild(&pre_mutation.issues);
            guard.session = pre_mutation;
            error!(session_id = id, error = %e, "Round persistence failed; state rolled back");
            return Err(e);
        }
        Ok(ack)
    }

    /// Issue locations naming files outside the current context; these
    /// are the paths `submit_round` prefetches before admission.
    fn discovery_candidates(
        state: &SessionState,
        issues_raised: &[NewIssueInput],
    ) -> Vec<String> {
        let mut candidates = Vec::new();
        for input in issues_raised {
            let Some(location) = input.location.as_deref() else {
                continue;
            };
            let file = location.rsplit_once(':').map_or(location, |(file, _)| file);
            if !state.session.context.files.contains_key(file)
                && !candidates.iter().any(|c| c == file)
            {
                candidates.push(file.to_string());
            }
        }
        candidates
    }

    /// Round admission and state mutation (validation first, no partial
    /// effects on failure). Discovered-file content arrives prefetched in
    /// `discovered_contents`; no I/O happens here.
    fn admit_round(
        state: &mut SessionState,
        role: Role,
        output: String,
        issues_raised: Vec<NewIssueInput>,
        issues_resolved: Vec<ResolutionInput>,
        discovered_contents: &HashMap<String, String>,
    ) -> Result<RoundAck> {
        let session = &state.session;
        if session.status.is_terminal() {
            return Err(ElenchusError::state_in_session(
                format!("Session is terminal ({:?})", session.status),
                session.id.as_str(),
            ));
        }
        let expected = session.next_role().ok_or_else(|| {
            ElenchusError::state_in_session("Session accepts no further rounds", session.id.as_str())
        })?;
        if role != expected {
            return Err(ElenchusError::state_in_session(
                format!(
                    "Expected {} for round {}, got {}",
                    expected.as_str(),
                    session.current_round + 1,
                    role.as_str()
                ),
                session.id.as_str(),
            ));
        }

        // Referential integrity before any mutation.
        for resolution in &issues_resolved {
            if !state.index.contains(&resolution.issue_id) {
                return Err(ElenchusError::not_found_entity(
                    format!("Unknown issue id: {}", resolution.issue_id),
                    "issue",
                ));
            }
        }
        let mut batch_ids = std::collections::HashSet::new();
        for raised in &issues_raised {
            let canonical = raised.id.to_uppercase();
            if state.index.contains(&canonical) || !batch_ids.insert(canonical) {
                return Err(ElenchusError::validation_field(
                    format!("Issue id already exists: {}", raised.id),
                    "issuesRaised",
                ));
            }
        }
        // Resolution requires an adjudication: an existing verdict or one
        // carried by this submission.
        for resolution in &issues_resolved {
            let adjudicated = resolution.verdict.is_some()
                || state
                    .index
                    .get(&resolution.issue_id)
                    .is_some_and(Issue::has_critic_review);
            if !adjudicated {
                return Err(ElenchusError::state(format!(
                    "Issue {} has no Critic verdict; it cannot be resolved",
                    resolution.issue_id
                )));
            }
        }

        let round_number = state.session.current_round + 1;
        let now = Utc::now();

        // Raised issues enter the index with impact attachments; locations
        // naming unknown files expand the context.
        let mut raised_ids = Vec::with_capacity(issues_raised.len());
        let mut discovered_files: Vec<String> = Vec::new();
        for input in issues_raised {
            let mut issue = Issue::raised(
                &input.id,
                input.category,
                input.severity,
                input.summary,
                role,
                round_number,
            );
            issue.description = input.description;
            issue.evidence = input.evidence;
            issue.location = input.location;

            if let Some(file) = issue.location_file().map(str::to_string) {
                if !state.session.context.files.contains_key(&file)
                    && !discovered_files.contains(&file)
                {
                    discovered_files.push(file.clone());
                }
                issue.impact =
                    Some(state.mediator.impact_for_location(&file, issue.location_line()));
            }

            raised_ids.push(issue.id.clone());
            state.session.issues.push(issue.clone());
            state.index.insert(issue);
        }

        let mut resolved_ids = Vec::with_capacity(issues_resolved.len());
        for resolution in issues_resolved {
            let canonical = resolution.issue_id.to_uppercase();
            let reason = resolution
                .reason
                .unwrap_or_else(|| "Resolved in round".to_string());
            let verdict = resolution.verdict;
            state.index.update(&canonical, |issue| {
                if let Some(verdict) = verdict {
                    issue.critic_verdict = Some(verdict);
                    issue.critic_review_round = Some(round_number);
                }
                let kind = match issue.critic_verdict {
                    Some(CriticVerdict::Invalid) => TransitionKind::Invalidated,
                    Some(CriticVerdict::Partial) => TransitionKind::Refined,
                    _ => TransitionKind::Validated,
                };
                let from_status = issue.status;
                issue.status = IssueStatus::Resolved;
                issue.resolved_in_round = Some(round_number);
                issue.transitions.push(IssueTransition {
                    kind,
                    from_status,
                    to_status: IssueStatus::Resolved,
                    from_severity: None,
                    to_severity: None,
                    round: round_number,
                    reason: reason.clone(),
                    triggered_by: role,
                    timestamp: now,
                });
            });
            // Mirror the index mutation into the session's issue list.
            if let Some(updated) = state.index.get(&canonical).cloned() {
                if let Some(slot) = state.session.issue_mut(&canonical) {
                    *slot = updated;
                }
            }
            resolved_ids.push(canonical);
        }

        // Context expansion: prefetched discovered files enter the
        // context and the importance cache is invalidated over the union.
        let mut new_files_discovered = 0u32;
        if !discovered_files.is_empty() {
            for file in &discovered_files {
                let Some(content) = discovered_contents.get(file) else {
                    continue;
                };
                let mut context = FileContext::discovered(file.clone(), round_number);
                context.content = Some(content.clone());
                state
                    .session
                    .context
                    .files
                    .insert(file.clone(), context);
                new_files_discovered += 1;
            }
            if new_files_discovered > 0 {
                let discovered_map: indexmap::IndexMap<String, FileContext> = state
                    .session
                    .context
                    .files
                    .iter()
                    .filter(|(path, _)| discovered_files.contains(path))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let new_analyses = FileStore::analyze_context(&discovered_map);
                state.mediator.invalidate_cached_importance(&new_analyses);
                state
                    .coordinator
                    .set_total_files(state.session.context.files.len());
            }
        }
        let context_expanded = new_files_discovered > 0;

        // Round input: full summary on round 1, delta afterwards.
        let input = if round_number == 1 {
            RoundInput::Full {
                summary: render_context_summary(&state.session.context),
            }
        } else {
            RoundInput::Delta(ContextDelta {
                base_round: round_number - 1,
                added_files: discovered_files.clone(),
            })
        };

        state.session.rounds.push(Round {
            number: round_number,
            role,
            input,
            output,
            timestamp: now,
            issues_raised: raised_ids.clone(),
            issues_resolved: resolved_ids.clone(),
            context_expanded,
            new_files_discovered,
        });
        state.session.current_round = round_number;
        state.session.status = SessionStatus::Verifying;
        state.session.phase = "verification".to_string();
        state.session.touch();

        // Convergence snapshot, gated by safeguards when optimizations
        // are active.
        let mut convergence = ConvergenceEvaluator::evaluate(&state.session);
        if convergence.is_converged && state.optimizations.any() {
            let gate = state.coordinator.should_allow_convergence();
            if !gate.allowed {
                convergence.is_converged = false;
                convergence.reason = format!(
                    "Safeguards blocked convergence: {}",
                    gate.reasons.join("; ")
                );
            }
        }
        if convergence.is_converged {
            state.session.status = SessionStatus::Converging;
            state.session.phase = "converged".to_string();
        }

        let mut intervention = None;
        if state.session.current_round >= state.session.max_rounds && !convergence.is_converged {
            intervention = Some(format!(
                "Round ceiling ({}) reached without convergence; end the session or roll back",
                state.session.max_rounds
            ));
        }

        let next_role = if convergence.is_converged {
            "complete".to_string()
        } else {
            state
                .session
                .next_role()
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "complete".to_string())
        };

        Ok(RoundAck {
            round_number,
            next_role,
            issues_raised: raised_ids,
            issues_resolved: resolved_ids,
            context_expanded,
            new_files_discovered,
            convergence,
            intervention,
        })
    }

    /// Take a checkpoint after the current round.
    pub async fn checkpoint(&self, id: &str) -> Result<Checkpoint> {
        let state = self.require_state(id).await?;
        let (checkpoint, snapshot, pre_mutation) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();
            let checkpoint = Checkpoint {
                round: guard.session.current_round,
                timestamp: Utc::now(),
                // Deep copies: rollback must sever every reference to the
                // post-checkpoint instances.
                issues: guard.session.issues.clone(),
                context_files: guard.session.context.files.keys().cloned().collect(),
                can_rollback_to: true,
            };
            guard.session.checkpoints.push(checkpoint.clone());
            guard.session.touch();
            (checkpoint, guard.session.clone(), pre_mutation)
        };
        self.persist_or_rollback(id, &state, snapshot, pre_mutation)
            .await?;
        Ok(checkpoint)
    }

    /// Roll back to a checkpointed round. Later rounds are truncated,
    /// later checkpoints invalidated, and the issue set restored from the
    /// checkpoint's deep copy.
    pub async fn rollback(&self, id: &str, round: u32) -> Result<Session> {
        let state = self.require_state(id).await?;
        let (snapshot, pre_mutation) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();

            let checkpoint = guard
                .session
                .checkpoints
                .iter()
                .find(|c| c.round == round && c.can_rollback_to)
                .cloned()
                .ok_or_else(|| {
                    ElenchusError::not_found_entity(
                        format!("No rollback-capable checkpoint at round {round}"),
                        "checkpoint",
                    )
                })?;

            guard.session.rounds.truncate(round as usize);
            guard.session.current_round = round;
            guard.session.issues = checkpoint.issues.clone();
            guard
                .session
                .context
                .files
                .retain(|path, _| checkpoint.context_files.contains(path));
            for later in guard
                .session
                .checkpoints
                .iter_mut()
                .filter(|c| c.round > round)
            {
                later.can_rollback_to = false;
            }
            guard.session.status = SessionStatus::Verifying;
            guard.session.verdict = None;
            guard.session.touch();

            guard.index = IssueIndex::rebuild(&guard.session.issues);
            (guard.session.clone(), pre_mutation)
        };
        self.persist_or_rollback(id, &state, snapshot.clone(), pre_mutation)
            .await?;
        info!(session_id = id, round, "Session rolled back");
        Ok(snapshot)
    }

    /// End a session with a final verdict. PASS persists a new baseline.
    pub async fn end_session(&self, id: &str, verdict: SessionVerdict) -> Result<Session> {
        let state = self.require_state(id).await?;
        let (snapshot, pre_mutation, project_id, tracker) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();
            guard.session.verdict = Some(verdict);
            guard.session.status = match verdict {
                SessionVerdict::Pass | SessionVerdict::Conditional => SessionStatus::Converged,
                SessionVerdict::Fail => SessionStatus::ForcedStop,
            };
            guard.session.phase = "complete".to_string();
            guard.session.touch();

            let now = Utc::now();
            if guard.optimizations.any() {
                guard.coordinator.record_incremental();
            } else {
                guard.coordinator.record_full_verification(now);
            }
            let project_id =
                project_hash(&absolute_target(Path::new(&guard.session.target)));
            (
                guard.session.clone(),
                pre_mutation,
                project_id,
                guard.coordinator.tracker().clone(),
            )
        };
        self.persist_or_rollback(id, &state, snapshot.clone(), pre_mutation)
            .await?;

        let mut trackers = self.tracker_store.load().await;
        trackers.insert(project_id.clone(), tracker);
        if let Err(e) = self.tracker_store.save(&trackers).await {
            warn!(error = %e, "Tracker persistence failed");
        }

        if verdict == SessionVerdict::Pass {
            let baseline = self.build_baseline(&snapshot, &project_id).await;
            self.baseline_store.save(&baseline).await?;
            info!(session_id = id, "PASS baseline persisted");
        }

        // Evicted from memory, retained on disk.
        self.sessions.lock().remove(id);
        Ok(snapshot)
    }

    /// Mark an issue fixed. Requires an existing Critic verdict; records
    /// a Refined transition and optionally flips the session into
    /// re-verification.
    pub async fn apply_fix(
        &self,
        id: &str,
        issue_id: &str,
        fix_description: &str,
        reverify: bool,
    ) -> Result<Issue> {
        let state = self.require_state(id).await?;
        let (issue, snapshot, pre_mutation) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();
            let canonical = issue_id.to_uppercase();

            let existing = guard.index.get(&canonical).ok_or_else(|| {
                ElenchusError::not_found_entity(format!("Unknown issue id: {issue_id}"), "issue")
            })?;
            if !existing.has_critic_review() {
                return Err(ElenchusError::state(format!(
                    "Issue {canonical} has no Critic verdict; apply_fix requires one"
                )));
            }

            let round = guard.session.current_round;
            let reason = format!("Fix applied: {fix_description}");
            guard.index.update(&canonical, |issue| {
                let from_status = issue.status;
                issue.status = IssueStatus::Resolved;
                issue.resolved_in_round = Some(round);
                issue.transitions.push(IssueTransition {
                    kind: TransitionKind::Refined,
                    from_status,
                    to_status: IssueStatus::Resolved,
                    from_severity: None,
                    to_severity: None,
                    round,
                    reason,
                    triggered_by: Role::Arbiter,
                    timestamp: Utc::now(),
                });
            });
            let updated = guard.index.get(&canonical).cloned().expect("just updated");
            if let Some(slot) = guard.session.issue_mut(&canonical) {
                *slot = updated.clone();
            }
            if reverify {
                guard.session.status = SessionStatus::ReVerifying;
                guard.session.phase = "re-verification".to_string();
            }
            guard.session.touch();
            (updated, guard.session.clone(), pre_mutation)
        };
        self.persist_or_rollback(id, &state, snapshot, pre_mutation)
            .await?;
        Ok(issue)
    }

    /// Reset convergence-relevant state for a re-verification pass.
    pub async fn start_reverification(&self, id: &str) -> Result<Session> {
        let state = self.require_state(id).await?;
        let (snapshot, pre_mutation) = {
            let mut guard = state.lock();
            let pre_mutation = guard.session.clone();
            if guard.session.status.is_terminal() {
                return Err(ElenchusError::state_in_session(
                    "Cannot re-verify a terminal session",
                    guard.session.id.as_str(),
                ));
            }
            guard.session.status = SessionStatus::ReVerifying;
            guard.session.phase = "re-verification".to_string();
            guard.session.touch();
            (guard.session.clone(), pre_mutation)
        };
        self.persist_or_rollback(id, &state, snapshot.clone(), pre_mutation)
            .await?;
        Ok(snapshot)
    }

    /// Issues, optionally filtered by status/severity/category.
    pub async fn get_issues(
        &self,
        id: &str,
        status: Option<IssueStatus>,
        severity: Option<Severity>,
        category: Option<IssueCategory>,
    ) -> Result<Vec<Issue>> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        let mut issues: Vec<Issue> = guard
            .index
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .filter(|i| severity.map_or(true, |s| i.severity == s))
            .filter(|i| category.map_or(true, |c| i.category == c))
            .cloned()
            .collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }

    /// Convergence snapshot without mutating anything.
    pub async fn convergence(&self, id: &str) -> Result<ConvergenceSnapshot> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(ConvergenceEvaluator::evaluate(&guard.session))
    }

    /// Ripple analysis through the session's mediator.
    pub async fn ripple_effect(
        &self,
        id: &str,
        file: &str,
        function: Option<&str>,
    ) -> Result<RippleAnalysis> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        if !guard.mediator.graph().contains(file) {
            return Err(ElenchusError::not_found_entity(
                format!("File not in dependency graph: {file}"),
                "file",
            ));
        }
        Ok(guard.mediator.analyze_ripple_effect(file, function))
    }

    /// Mediator summary for the session.
    pub async fn mediator_summary(&self, id: &str) -> Result<MediatorSummary> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(guard.mediator.summary())
    }

    /// Differential scan captured at session start.
    pub async fn diff_summary(&self, id: &str) -> Result<Option<DiffResult>> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(guard.diff.clone())
    }

    /// Manually persist a PASS baseline for the session's current context.
    pub async fn save_baseline(&self, id: &str) -> Result<VerificationBaseline> {
        let state = self.require_state(id).await?;
        let (session, project_id) = {
            let guard = state.lock();
            let project_id =
                project_hash(&absolute_target(Path::new(&guard.session.target)));
            (guard.session.clone(), project_id)
        };
        let baseline = self.build_baseline(&session, &project_id).await;
        self.baseline_store.save(&baseline).await?;
        Ok(baseline)
    }

    /// Baseline history for a project path.
    pub async fn project_history(
        &self,
        target: &str,
    ) -> Vec<crate::optimize::baseline::BaselineHistoryEntry> {
        self.baseline_store
            .history(&absolute_target(Path::new(target)))
            .await
    }

    /// Ids of all persisted sessions.
    pub async fn session_ids(&self) -> Vec<String> {
        self.session_store.list().await
    }

    /// Process-wide cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Clear the process-wide verification cache.
    pub fn clear_cache(&self) -> usize {
        self.cache.lock().clear()
    }

    /// Access the verification cache for lookups/stores.
    pub fn with_cache<T>(&self, f: impl FnOnce(&mut VerificationCache) -> T) -> T {
        f(&mut self.cache.lock())
    }

    /// Pipeline status for a session.
    pub async fn pipeline_status(&self, id: &str) -> Result<PipelineStatus> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(guard.pipeline.status())
    }

    /// Record a completed tier and decide escalation.
    pub async fn complete_tier(&self, id: &str, result: TierResult) -> Result<TierCompletion> {
        let state = self.require_state(id).await?;
        let mut guard = state.lock();
        let completion = guard.pipeline.complete_tier(result);
        let reached = guard.pipeline.current_tier();
        let skipped = guard.pipeline.skipped_tiers();
        // Tier completions feed the confidence layer.
        let score = ConfidenceScore::tiered(reached, skipped);
        guard.coordinator.record_confidence(
            &format!("tier:{}", reached.as_str()),
            score,
        );
        Ok(completion)
    }

    /// Manually escalate the session's pipeline.
    pub async fn escalate_tier(&self, id: &str) -> Result<Tier> {
        let state = self.require_state(id).await?;
        let mut guard = state.lock();
        guard.pipeline.escalate()
    }

    /// Safeguards status: quality assessment, session confidence, the
    /// periodic decision, and the current spot-check selection.
    pub async fn safeguards_status(
        &self,
        id: &str,
    ) -> Result<(
        QualityAssessment,
        SessionConfidence,
        PeriodicDecision,
        SamplingSelection,
    )> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        let changed: Vec<String> = guard
            .diff
            .as_ref()
            .map(|d| d.changed_files.iter().map(|f| f.path.clone()).collect())
            .unwrap_or_default();
        Ok((
            guard.coordinator.quality_assessment(),
            guard.coordinator.session_confidence(),
            guard.coordinator.periodic_check(&changed, Utc::now()),
            Self::sample_for(&guard),
        ))
    }

    /// Record a per-file confidence observation.
    pub async fn update_confidence(
        &self,
        id: &str,
        path: &str,
        source: VerificationSource,
        productive: Option<bool>,
    ) -> Result<ConfidenceScore> {
        let state = self.require_state(id).await?;
        let mut guard = state.lock();
        let score = match source {
            VerificationSource::Full => ConfidenceScore::full(),
            VerificationSource::Sampled => {
                ConfidenceScore::sampled(productive.unwrap_or(false))
            }
            VerificationSource::Tiered => {
                let tier = guard.pipeline.current_tier();
                let skipped = guard.pipeline.skipped_tiers();
                ConfidenceScore::tiered(tier, skipped)
            }
            VerificationSource::Cache => {
                let cache_cfg = &self.config.cache;
                ConfidenceScore::cache(
                    0,
                    cache_cfg.ttl_seconds,
                    cache_cfg.decay_rate_per_hour,
                    false,
                    false,
                )
            }
            VerificationSource::Chunk => ConfidenceScore::chunk(1.0, false, 0),
        };
        guard.coordinator.record_confidence(path, score.clone());
        if source == VerificationSource::Full {
            guard.mediator.mark_verified(path);
        }
        Ok(score)
    }

    /// Record the outcome of verifying one sampled file.
    pub async fn record_sampling_result(
        &self,
        id: &str,
        path: &str,
        issues_found: u32,
    ) -> Result<()> {
        let state = self.require_state(id).await?;
        let mut guard = state.lock();
        guard
            .coordinator
            .record_sampling_result(path, issues_found, Utc::now());
        let score = ConfidenceScore::sampled(issues_found > 0);
        guard.coordinator.record_confidence(path, score);
        Ok(())
    }

    /// Draw a spot-check sample over the files optimizations skipped.
    pub async fn select_sample(&self, id: &str) -> Result<SamplingSelection> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(Self::sample_for(&guard))
    }

    /// Weighted draw over the files the active optimizations skipped.
    fn sample_for(state: &SessionState) -> SamplingSelection {
        let skipped: Vec<SkippedFile> = state
            .session
            .context
            .files
            .iter()
            .filter(|(_, f)| {
                f.diff
                    .as_ref()
                    .is_some_and(|d| d.skip_verification)
            })
            .map(|(path, f)| SkippedFile {
                path: path.clone(),
                skipped_by: Some("differential".to_string()),
                change_status: f.diff.as_ref().and_then(|d| d.change_status),
                fan_in: state.mediator.graph().dependents_of(path).len() as u32,
                dependency_count: state.mediator.graph().dependencies_of(path).len() as u32,
            })
            .collect();
        let seed = state
            .sampler
            .config()
            .seed
            .unwrap_or_else(|| session_seed(&state.session.id));
        state
            .sampler
            .select_files(&skipped, state.coordinator.history(), seed)
    }

    /// Safeguards convergence gate.
    pub async fn check_convergence_allowed(&self, id: &str) -> Result<ConvergenceGate> {
        let state = self.require_state(id).await?;
        let guard = state.lock();
        Ok(guard.coordinator.should_allow_convergence())
    }

    async fn build_baseline(
        &self,
        session: &Session,
        project_id: &str,
    ) -> VerificationBaseline {
        let mut file_hashes = std::collections::BTreeMap::new();
        for (path, file) in &session.context.files {
            if let Some(content) = &file.content {
                file_hashes.insert(path.clone(), content_hash(content.as_bytes()));
            }
        }
        let scanner = DiffScanner::new(self.config.differential.clone());
        let vcs = scanner
            .current_vcs_info(Path::new(&session.target))
            .await;
        let remaining_issues = session.issues.iter().filter(|i| i.is_active()).count();
        VerificationBaseline {
            project_id: project_id.to_string(),
            timestamp: Utc::now(),
            target: session.target.clone(),
            session_id: session.id.clone(),
            verdict: "PASS".to_string(),
            vcs,
            total_files: file_hashes.len(),
            remaining_issues,
            file_hashes,
        }
    }

    fn state_for(&self, id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Fetch live state, reconstructing from disk when evicted.
    async fn require_state(&self, id: &str) -> Result<Arc<Mutex<SessionState>>> {
        if let Some(state) = self.state_for(id) {
            return Ok(state);
        }
        match self.session_store.load(id).await? {
            Some(session) => {
                self.admit_loaded(session)?;
                self.state_for(id).ok_or_else(|| {
                    ElenchusError::internal("Session vanished during reconstruction")
                })
            }
            None => Err(ElenchusError::not_found_entity(
                format!("Unknown session: {id}"),
                "session",
            )),
        }
    }

    /// Rebuild runtime state around a session loaded from disk.
    fn admit_loaded(&self, session: Session) -> Result<()> {
        let analyses = FileStore::analyze_context(&session.context.files);
        let mediator = Mediator::new(&analyses, self.config.mediator.clone());
        let coordinator = SafeguardsCoordinator::new(
            self.config.safeguards.clone(),
            self.config.sampling.clone(),
            ActiveOptimizations::default(),
            Default::default(),
        )?;
        let state = SessionState {
            index: IssueIndex::rebuild(&session.issues),
            mediator,
            coordinator,
            pipeline: TierPipeline::new(self.config.pipeline.clone())?,
            sampler: SamplingEngine::new(self.config.sampling.clone())?,
            optimizations: ActiveOptimizations::default(),
            diff: None,
            session,
        };
        let id = state.session.id.clone();
        self.sessions
            .lock()
            .insert(id, Arc::new(Mutex::new(state)));
        Ok(())
    }

    async fn persist_or_rollback(
        &self,
        id: &str,
        state: &Arc<Mutex<SessionState>>,
        snapshot: Session,
        pre_mutation: Session,
    ) -> Result<()> {
        if let Err(e) = self.session_store.save(&snapshot).await {
            let mut guard = state.lock();
            guard.index = IssueIndex::rebuild(&pre_mutation.issues);
            guard.session = pre_mutation;
            error!(session_id = id, error = %e, "Persistence failed; state rolled back");
            return Err(e);
        }
        Ok(())
    }
}

/// Differential attributes projected onto the context files.
fn apply_diff_attributes(context: &mut VerificationContext, diff: &DiffResult) {
    let changed: HashMap<&str, ChangeStatus> = diff
        .changed_files
        .iter()
        .map(|f| (f.path.as_str(), f.status))
        .collect();
    let affected: std::collections::HashSet<&str> =
        diff.affected_files.iter().map(String::as_str).collect();

    for (path, file) in context.files.iter_mut() {
        let status = changed.get(path.as_str()).copied();
        let is_affected = affected.contains(path.as_str());
        let changed_lines = diff
            .changed_files
            .iter()
            .find(|f| f.path == *path)
            .map(|f| f.changed_lines.clone())
            .unwrap_or_default();
        file.diff = Some(DiffAttributes {
            change_status: Some(status.unwrap_or(ChangeStatus::Unchanged)),
            changed_lines,
            affected_by_change: is_affected,
            skip_verification: status.is_none() && !is_affected,
        });
    }
}

/// Render the full context summary captured on round 1.
fn render_context_summary(context: &VerificationContext) -> String {
    let mut summary = format!(
        "Target: {}\nRequirements: {}\nFiles ({}):\n",
        context.target,
        context.requirements,
        context.files.len()
    );
    for (path, file) in &context.files {
        let deps = if file.dependencies.is_empty() {
            String::new()
        } else {
            format!(" -> {}", file.dependencies.join(", "))
        };
        summary.push_str(&format!("  {path}{deps}\n"));
    }
    summary
}

/// Deterministic per-session sampling seed from the id.
fn session_seed(id: &str) -> u32 {
    id.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
        & 0x7fff_ffff
}

/// Canonical absolute path string for a target.
fn absolute_target(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VerificationMode;
    use tempfile::TempDir;

    async fn engine_with_project() -> (SessionEngine, TempDir, TempDir) {
        let data = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        tokio::fs::write(
            project.path().join("index.ts"),
            "import { util } from './util';\nexport function main() { return util(); }\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            project.path().join("util.ts"),
            "export function util() { return 1; }\n",
        )
        .await
        .unwrap();

        let mut config = ElenchusConfig::default();
        config.storage.data_dir = Some(data.path().to_path_buf());
        (SessionEngine::new(config).unwrap(), data, project)
    }

    fn mode(mode: VerificationMode, stable: Option<u32>) -> ModeConfig {
        ModeConfig {
            mode,
            min_rounds: None,
            stable_rounds_required: stable,
        }
    }

    fn issue(id: &str, severity: Severity, location: Option<&str>) -> NewIssueInput {
        NewIssueInput {
            id: id.to_string(),
            category: IssueCategory::Security,
            severity,
            summary: format!("issue {id}"),
            description: String::new(),
            evidence: String::new(),
            location: location.map(str::to_string),
        }
    }

    const CLEAN: &str = "Reviewed security, correctness, reliability, maintainability, \
        performance. Edge cases: empty input, null, overflow. No issues found.";

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "check it".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(ack.file_count, 2);
        assert_eq!(ack.next_role, "verifier");

        let session = engine.get_session(&ack.session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Initialized);
        assert_eq!(session.context.files.len(), 2);
        // index.ts imports util.ts.
        assert_eq!(
            session.context.files["index.ts"].dependencies,
            vec!["util.ts"]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_none() {
        let (engine, _data, _project) = engine_with_project().await;
        assert!(engine
            .get_session("2025-01-01_nope_aaaaaa")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_role_alternation_enforced() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        // Critic cannot open the debate.
        let err = engine
            .submit_round(&ack.session_id, Role::Critic, "x".to_string(), vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::State { .. }));

        engine
            .submit_round(
                &ack.session_id,
                Role::Verifier,
                "found something".to_string(),
                vec![issue("SEC-01", Severity::Medium, Some("index.ts:1"))],
                vec![],
            )
            .await
            .unwrap();

        // Verifier cannot go twice in standard mode.
        let err = engine
            .submit_round(&ack.session_id, Role::Verifier, "x".to_string(), vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::State { .. }));
    }

    #[tokio::test]
    async fn test_unknown_issue_reference_rejected() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let err = engine
            .submit_round(
                &ack.session_id,
                Role::Verifier,
                "resolving ghosts".to_string(),
                vec![],
                vec![ResolutionInput {
                    issue_id: "GHOST-01".to_string(),
                    verdict: None,
                    reason: None,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::NotFound { .. }));

        // Nothing was recorded.
        let session = engine.get_session(&ack.session_id).await.unwrap().unwrap();
        assert_eq!(session.current_round, 0);
    }

    #[tokio::test]
    async fn test_fast_track_clean_converges_and_baseline_written() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::FastTrack, Some(0))),
                None,
            )
            .await
            .unwrap();

        let round = engine
            .submit_round(&ack.session_id, Role::Verifier, CLEAN.to_string(), vec![], vec![])
            .await
            .unwrap();
        assert!(round.convergence.is_converged, "{}", round.convergence.reason);
        assert!(round.next_role == "complete" || round.next_role == "verifier");

        let ended = engine
            .end_session(&ack.session_id, SessionVerdict::Pass)
            .await
            .unwrap();
        assert_eq!(ended.status, SessionStatus::Converged);

        let history = engine
            .project_history(&project.path().to_string_lossy())
            .await;
        // Live baseline exists; history still empty (first PASS).
        assert!(history.is_empty());
        let baseline = engine
            .baseline_store
            .load(&absolute_target(project.path()))
            .await
            .unwrap();
        assert!(baseline.is_some());
        assert_eq!(baseline.unwrap().total_files, 2);
    }

    #[tokio::test]
    async fn test_critic_rejection_flow() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let id = &ack.session_id;

        let round = engine
            .submit_round(
                id,
                Role::Verifier,
                "Raising SEC-01".to_string(),
                vec![issue("sec-01", Severity::Medium, Some("index.ts:1"))],
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(round.issues_raised, vec!["SEC-01"]);
        assert!(!round.convergence.is_converged);

        let round = engine
            .submit_round(
                id,
                Role::Critic,
                "SEC-01 is INVALID: the input is constant".to_string(),
                vec![],
                vec![ResolutionInput {
                    issue_id: "SEC-01".to_string(),
                    verdict: Some(CriticVerdict::Invalid),
                    reason: Some("not exploitable".to_string()),
                }],
            )
            .await
            .unwrap();
        assert_eq!(round.issues_resolved, vec!["SEC-01"]);
        // Standard mode: still needs rounds, coverage, assertions.
        assert!(!round.convergence.is_converged);

        let issues = engine.get_issues(id, None, None, None).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Resolved);
        assert_eq!(issues[0].critic_verdict, Some(CriticVerdict::Invalid));
        assert!(issues[0]
            .transitions
            .iter()
            .any(|t| t.kind == TransitionKind::Invalidated));
    }

    #[tokio::test]
    async fn test_resolution_without_verdict_rejected() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::SinglePass, None)),
                None,
            )
            .await
            .unwrap();
        let id = &ack.session_id;

        engine
            .submit_round(
                id,
                Role::Verifier,
                "raising".to_string(),
                vec![issue("COR-01", Severity::Low, None)],
                vec![],
            )
            .await
            .unwrap();

        // Single-pass: next role is verifier again; resolving without any
        // verdict must fail.
        let err = engine
            .submit_round(
                id,
                Role::Verifier,
                "resolving".to_string(),
                vec![],
                vec![ResolutionInput {
                    issue_id: "COR-01".to_string(),
                    verdict: None,
                    reason: None,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::State { .. }));
    }

    #[tokio::test]
    async fn test_checkpoint_rollback_severs_issues() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::SinglePass, None)),
                None,
            )
            .await
            .unwrap();
        let id = &ack.session_id;

        engine
            .submit_round(
                id,
                Role::Verifier,
                "r1".to_string(),
                vec![issue("SEC-01", Severity::Medium, None)],
                vec![],
            )
            .await
            .unwrap();
        let checkpoint = engine.checkpoint(id).await.unwrap();
        assert_eq!(checkpoint.round, 1);

        engine
            .submit_round(
                id,
                Role::Verifier,
                "r2".to_string(),
                vec![issue("SEC-02", Severity::High, None)],
                vec![],
            )
            .await
            .unwrap();

        let restored = engine.rollback(id, 1).await.unwrap();
        assert_eq!(restored.current_round, 1);
        assert_eq!(restored.rounds.len(), 1);
        assert_eq!(restored.issues.len(), 1);
        assert_eq!(restored.issues[0].id, "SEC-01");

        // Post-rollback issue set is queryable and coherent.
        let issues = engine.get_issues(id, None, None, None).await.unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_invalidates_later_checkpoints() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::SinglePass, None)),
                None,
            )
            .await
            .unwrap();
        let id = &ack.session_id;

        engine
            .submit_round(id, Role::Verifier, "r1".to_string(), vec![], vec![])
            .await
            .unwrap();
        engine.checkpoint(id).await.unwrap();
        engine
            .submit_round(id, Role::Verifier, "r2".to_string(), vec![], vec![])
            .await
            .unwrap();
        engine.checkpoint(id).await.unwrap();

        engine.rollback(id, 1).await.unwrap();
        // The round-2 checkpoint can no longer be rolled back to.
        let err = engine.rollback(id, 2).await.unwrap_err();
        assert!(matches!(err, ElenchusError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_rounds() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::SinglePass, None)),
                None,
            )
            .await
            .unwrap();
        let id = ack.session_id.clone();

        engine
            .submit_round(&id, Role::Verifier, "r1".to_string(), vec![], vec![])
            .await
            .unwrap();
        engine.end_session(&id, SessionVerdict::Fail).await.unwrap();

        // Reloaded from disk, the terminal state still refuses rounds.
        let err = engine
            .submit_round(&id, Role::Verifier, "r2".to_string(), vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::State { .. }));
    }

    #[tokio::test]
    async fn test_persistence_round_trip_via_disk() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                Some(mode(VerificationMode::SinglePass, None)),
                None,
            )
            .await
            .unwrap();
        let id = ack.session_id.clone();
        engine
            .submit_round(
                &id,
                Role::Verifier,
                "r1".to_string(),
                vec![issue("SEC-01", Severity::Low, Some("index.ts:1"))],
                vec![],
            )
            .await
            .unwrap();

        // Evict and reload.
        engine.sessions.lock().remove(&id);
        let reloaded = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_round, 1);
        assert_eq!(reloaded.issues.len(), 1);
        assert_eq!(reloaded.issues[0].id, "SEC-01");
        assert!(reloaded.issues[0].impact.is_some());
    }

    #[tokio::test]
    async fn test_ripple_and_summary() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let ripple = engine
            .ripple_effect(&ack.session_id, "util.ts", None)
            .await
            .unwrap();
        assert_eq!(ripple.total_affected, 1);
        assert_eq!(ripple.affected[0].path, "index.ts");

        let summary = engine.mediator_summary(&ack.session_id).await.unwrap();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.total_edges, 1);

        let err = engine
            .ripple_effect(&ack.session_id, "ghost.ts", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_token_budget_halt_via_engine() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                Some(OptimizationSettings {
                    pipeline: Some(crate::core::config::PipelineConfig {
                        enabled: true,
                        max_total_tokens: 500,
                        enforce_token_budget: true,
                        quality_first: false,
                        always_exhaustive_patterns: vec![],
                    }),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let completion = engine
            .complete_tier(
                &ack.session_id,
                TierResult {
                    tier: Tier::Screen,
                    files_verified: 2,
                    issues_found: 1,
                    critical_issues: 1,
                    high_issues: 0,
                    tokens_used: 600,
                    time_ms: 10,
                },
            )
            .await
            .unwrap();
        assert!(!completion.should_escalate);
        assert!(completion.token_budget_exceeded);
        assert!(completion.reason.contains("Token budget exceeded"));
    }

    #[tokio::test]
    async fn test_apply_fix_requires_verdict() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let id = &ack.session_id;

        engine
            .submit_round(
                id,
                Role::Verifier,
                "raising".to_string(),
                vec![issue("COR-01", Severity::Medium, None)],
                vec![],
            )
            .await
            .unwrap();

        let err = engine
            .apply_fix(id, "COR-01", "patched", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ElenchusError::State { .. }));

        // After Critic review the fix applies.
        engine
            .submit_round(
                id,
                Role::Critic,
                "COR-01 is VALID".to_string(),
                vec![],
                vec![ResolutionInput {
                    issue_id: "COR-01".to_string(),
                    verdict: Some(CriticVerdict::Valid),
                    reason: Some("confirmed".to_string()),
                }],
            )
            .await
            .unwrap();
        let fixed = engine.apply_fix(id, "COR-01", "patched", true).await.unwrap();
        assert_eq!(fixed.status, IssueStatus::Resolved);

        let session = engine.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::ReVerifying);
    }

    #[tokio::test]
    async fn test_sampling_result_recording() {
        let (engine, _data, project) = engine_with_project().await;
        let ack = engine
            .create_session(
                project.path().to_string_lossy().to_string(),
                "reqs".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        engine
            .record_sampling_result(&ack.session_id, "util.ts", 1)
            .await
            .unwrap();
        let (assessment, confidence, _periodic, _sample) =
            engine.safeguards_status(&ack.session_id).await.unwrap();
        assert_eq!(confidence.files_scored, 1);
        assert!(assessment.metrics.sampling_productivity > 0.0);
    }
}
