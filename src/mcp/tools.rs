//! Tool parameter types and execution glue.
//!
//! Each tool deserializes its arguments into a typed parameter struct
//! (the schema-validation step), calls the engine, and serializes the
//! outcome. Engine errors map onto `{errorType, message}` payloads with
//! `isError` set.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::config::{ModeConfig, VerificationMode};
use crate::core::engine::{
    NewIssueInput, OptimizationSettings, ResolutionInput, SessionEngine,
};
use crate::core::errors::{ElenchusError, Result};
use crate::core::issues::{IssueCategory, IssueStatus, Severity};
use crate::core::session::{Role, SessionVerdict};
use crate::mcp::protocol::ToolResult;
use crate::optimize::confidence::VerificationSource;
use crate::optimize::pipeline::{Tier, TierResult};
use crate::roles::{RoleConfig, RoleRegistry, Strictness};

/// Shared state handed to every tool execution.
pub struct ToolContext {
    /// The session engine.
    pub engine: Arc<SessionEngine>,
    /// Role configuration registry.
    pub roles: Arc<RoleRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionParams {
    target: String,
    requirements: String,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    mode: Option<VerificationMode>,
    #[serde(default)]
    min_rounds: Option<u32>,
    #[serde(default)]
    stable_rounds_required: Option<u32>,
    #[serde(default)]
    optimizations: Option<OptimizationSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRoundParams {
    session_id: String,
    role: String,
    output: String,
    #[serde(default)]
    issues_raised: Vec<NewIssueInput>,
    #[serde(default)]
    issues_resolved: Vec<ResolutionInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndSessionParams {
    session_id: String,
    verdict: SessionVerdict,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetIssuesParams {
    session_id: String,
    #[serde(default)]
    status: Option<IssueStatus>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    category: Option<IssueCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollbackParams {
    session_id: String,
    round: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyFixParams {
    session_id: String,
    issue_id: String,
    fix_description: String,
    #[serde(default)]
    reverify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RippleParams {
    session_id: String,
    file: String,
    #[serde(default)]
    function: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolePromptParams {
    session_id: String,
    role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRoleParams {
    role: String,
    #[serde(default)]
    focus_categories: Option<Vec<IssueCategory>>,
    #[serde(default)]
    strictness: Option<Strictness>,
    #[serde(default)]
    require_evidence: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectHistoryParams {
    target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTierParams {
    session_id: String,
    tier: String,
    #[serde(default)]
    files_verified: u32,
    #[serde(default)]
    issues_found: u32,
    #[serde(default)]
    critical_issues: u32,
    #[serde(default)]
    high_issues: u32,
    tokens_used: u64,
    #[serde(default)]
    time_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateConfidenceParams {
    session_id: String,
    path: String,
    source: VerificationSource,
    #[serde(default)]
    productive: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SamplingResultParams {
    session_id: String,
    path: String,
    issues_found: u32,
}

/// Execute a tool by name. Unknown names are the caller's concern; this
/// function only runs names advertised by `tools/list`.
pub async fn execute_tool(ctx: &ToolContext, name: &str, args: Value) -> ToolResult {
    match run_tool(ctx, name, args).await {
        Ok(value) => ToolResult::json(&value),
        Err(e) => ToolResult::error(e.error_type(), &e.to_string()),
    }
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ElenchusError::validation(format!("Invalid parameters: {e}")))
}

async fn run_tool(ctx: &ToolContext, name: &str, args: Value) -> Result<Value> {
    match name {
        "start_session" => {
            let p: StartSessionParams = parse(args)?;
            let mode = p.mode.map(|mode| ModeConfig {
                mode,
                min_rounds: p.min_rounds,
                stable_rounds_required: p.stable_rounds_required,
            });
            let ack = ctx
                .engine
                .create_session(p.target, p.requirements, p.max_rounds, mode, p.optimizations)
                .await?;
            Ok(serde_json::to_value(ack)?)
        }
        "get_context" => {
            let p: SessionIdParams = parse(args)?;
            let session = ctx
                .engine
                .get_session(&p.session_id)
                .await?
                .ok_or_else(|| not_found(&p.session_id))?;
            Ok(json!({
                "target": session.context.target,
                "requirements": session.context.requirements,
                "status": session.status,
                "currentRound": session.current_round,
                "maxRounds": session.max_rounds,
                "nextRole": session.next_role().map(|r| r.as_str()),
                "files": session.context.files.values().map(|f| json!({
                    "path": f.path,
                    "layer": f.layer,
                    "addedInRound": f.added_in_round,
                    "dependencies": f.dependencies,
                    "diff": f.diff,
                })).collect::<Vec<_>>(),
            }))
        }
        "submit_round" => {
            let p: SubmitRoundParams = parse(args)?;
            let role = Role::from_str(&p.role)?;
            let ack = ctx
                .engine
                .submit_round(&p.session_id, role, p.output, p.issues_raised, p.issues_resolved)
                .await?;
            Ok(serde_json::to_value(ack)?)
        }
        "end_session" => {
            let p: EndSessionParams = parse(args)?;
            let session = ctx.engine.end_session(&p.session_id, p.verdict).await?;
            Ok(json!({
                "sessionId": session.id,
                "status": session.status,
                "verdict": session.verdict,
                "rounds": session.current_round,
                "openIssues": session.issues.iter().filter(|i| i.is_active()).count(),
            }))
        }
        "get_issues" => {
            let p: GetIssuesParams = parse(args)?;
            let issues = ctx
                .engine
                .get_issues(&p.session_id, p.status, p.severity, p.category)
                .await?;
            Ok(serde_json::to_value(issues)?)
        }
        "checkpoint" => {
            let p: SessionIdParams = parse(args)?;
            let checkpoint = ctx.engine.checkpoint(&p.session_id).await?;
            Ok(json!({
                "round": checkpoint.round,
                "timestamp": checkpoint.timestamp,
                "issueCount": checkpoint.issues.len(),
                "contextFiles": checkpoint.context_files.len(),
            }))
        }
        "rollback" => {
            let p: RollbackParams = parse(args)?;
            let session = ctx.engine.rollback(&p.session_id, p.round).await?;
            Ok(json!({
                "sessionId": session.id,
                "currentRound": session.current_round,
                "issueCount": session.issues.len(),
                "status": session.status,
            }))
        }
        "apply_fix" => {
            let p: ApplyFixParams = parse(args)?;
            let issue = ctx
                .engine
                .apply_fix(&p.session_id, &p.issue_id, &p.fix_description, p.reverify)
                .await?;
            Ok(serde_json::to_value(issue)?)
        }
        "start_reverification" => {
            let p: SessionIdParams = parse(args)?;
            let session = ctx.engine.start_reverification(&p.session_id).await?;
            Ok(json!({
                "sessionId": session.id,
                "status": session.status,
                "phase": session.phase,
            }))
        }
        "ripple_effect" => {
            let p: RippleParams = parse(args)?;
            let ripple = ctx
                .engine
                .ripple_effect(&p.session_id, &p.file, p.function.as_deref())
                .await?;
            Ok(serde_json::to_value(ripple)?)
        }
        "mediator_summary" => {
            let p: SessionIdParams = parse(args)?;
            let summary = ctx.engine.mediator_summary(&p.session_id).await?;
            Ok(serde_json::to_value(summary)?)
        }
        "get_role_prompt" => {
            let p: RolePromptParams = parse(args)?;
            let role = Role::from_str(&p.role)?;
            let session = ctx
                .engine
                .get_session(&p.session_id)
                .await?
                .ok_or_else(|| not_found(&p.session_id))?;
            Ok(json!({
                "role": role.as_str(),
                "prompt": ctx.roles.prompt(role, &session.requirements),
            }))
        }
        "role_summary" => Ok(serde_json::to_value(ctx.roles.summaries())?),
        "update_role_config" => {
            let p: UpdateRoleParams = parse(args)?;
            let role = Role::from_str(&p.role)?;
            let mut config = ctx.roles.config(role);
            if let Some(categories) = p.focus_categories {
                config.focus_categories = categories;
            }
            if let Some(strictness) = p.strictness {
                config.strictness = strictness;
            }
            if let Some(require) = p.require_evidence {
                config.require_evidence = require;
            }
            ctx.roles.update(role, config.clone())?;
            Ok(serde_json::to_value(RoleConfigEcho {
                role: role.as_str(),
                config,
            })?)
        }
        "save_baseline" => {
            let p: SessionIdParams = parse(args)?;
            let baseline = ctx.engine.save_baseline(&p.session_id).await?;
            Ok(json!({
                "projectId": baseline.project_id,
                "sessionId": baseline.session_id,
                "totalFiles": baseline.total_files,
                "timestamp": baseline.timestamp,
            }))
        }
        "get_diff_summary" => {
            let p: SessionIdParams = parse(args)?;
            let diff = ctx.engine.diff_summary(&p.session_id).await?;
            match diff {
                Some(diff) => Ok(serde_json::to_value(diff)?),
                None => Ok(json!({"summary": "Differential mode not active"})),
            }
        }
        "get_project_history" => {
            let p: ProjectHistoryParams = parse(args)?;
            let history = ctx.engine.project_history(&p.target).await;
            Ok(serde_json::to_value(history)?)
        }
        "get_cache_stats" => Ok(serde_json::to_value(ctx.engine.cache_stats())?),
        "clear_cache" => {
            let removed = ctx.engine.clear_cache();
            Ok(json!({"entriesRemoved": removed}))
        }
        "get_pipeline_status" => {
            let p: SessionIdParams = parse(args)?;
            let status = ctx.engine.pipeline_status(&p.session_id).await?;
            Ok(serde_json::to_value(status)?)
        }
        "escalate_tier" => {
            let p: SessionIdParams = parse(args)?;
            let tier = ctx.engine.escalate_tier(&p.session_id).await?;
            Ok(json!({"currentTier": tier.as_str()}))
        }
        "complete_tier" => {
            let p: CompleteTierParams = parse(args)?;
            let tier = Tier::from_str(&p.tier)?;
            let completion = ctx
                .engine
                .complete_tier(
                    &p.session_id,
                    TierResult {
                        tier,
                        files_verified: p.files_verified,
                        issues_found: p.issues_found,
                        critical_issues: p.critical_issues,
                        high_issues: p.high_issues,
                        tokens_used: p.tokens_used,
                        time_ms: p.time_ms,
                    },
                )
                .await?;
            Ok(serde_json::to_value(completion)?)
        }
        "get_safeguards_status" => {
            let p: SessionIdParams = parse(args)?;
            let (assessment, confidence, periodic, sample) =
                ctx.engine.safeguards_status(&p.session_id).await?;
            Ok(json!({
                "quality": assessment,
                "confidence": confidence,
                "periodic": periodic,
                "sampling": sample,
            }))
        }
        "update_confidence" => {
            let p: UpdateConfidenceParams = parse(args)?;
            let score = ctx
                .engine
                .update_confidence(&p.session_id, &p.path, p.source, p.productive)
                .await?;
            Ok(serde_json::to_value(score)?)
        }
        "record_sampling_result" => {
            let p: SamplingResultParams = parse(args)?;
            ctx.engine
                .record_sampling_result(&p.session_id, &p.path, p.issues_found)
                .await?;
            Ok(json!({"recorded": true}))
        }
        "check_convergence_allowed" => {
            let p: SessionIdParams = parse(args)?;
            let gate = ctx.engine.check_convergence_allowed(&p.session_id).await?;
            Ok(serde_json::to_value(gate)?)
        }
        other => Err(ElenchusError::validation(format!("Unknown tool: {other}"))),
    }
}

#[derive(serde::Serialize)]
struct RoleConfigEcho {
    role: &'static str,
    config: RoleConfig,
}

fn not_found(session_id: &str) -> ElenchusError {
    ElenchusError::not_found_entity(format!("Unknown session: {session_id}"), "session")
}
