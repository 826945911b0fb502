//! MCP protocol integration tests.
//!
//! Exercises the dispatcher the way a host client does: JSON-RPC lines
//! in, JSON-RPC responses out, including the optimization tool surface
//! and the resource URIs.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use elenchus_rs::core::config::ElenchusConfig;
use elenchus_rs::core::engine::SessionEngine;
use elenchus_rs::mcp::server::McpServer;

struct Fixture {
    server: McpServer,
    _data: TempDir,
    project: TempDir,
}

async fn fixture() -> Fixture {
    let data = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    tokio::fs::write(
        project.path().join("index.ts"),
        "import { db } from './db';\nexport function main() { return db(); }\n",
    )
    .await
    .unwrap();
    tokio::fs::write(
        project.path().join("db.ts"),
        "export function db() { return 1; }\n",
    )
    .await
    .unwrap();

    let mut config = ElenchusConfig::default();
    config.storage.data_dir = Some(data.path().to_path_buf());
    let engine = Arc::new(SessionEngine::new(config).unwrap());
    Fixture {
        server: McpServer::new(engine, "test"),
        _data: data,
        project,
    }
}

async fn call(server: &McpServer, method: &str, params: Value) -> Value {
    let line = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}).to_string();
    let response = server.handle_line(&line).await.expect("response expected");
    serde_json::to_value(&response).unwrap()
}

/// Call a tool and parse the JSON text payload it returns.
async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> (bool, Value) {
    let response = call(
        server,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
    )
    .await;
    let result = &response["result"];
    let is_error = result["isError"].as_bool().unwrap_or(false);
    let text = result["content"][0]["text"].as_str().unwrap();
    (is_error, serde_json::from_str(text).unwrap())
}

async fn start_session(f: &Fixture, extra: Value) -> String {
    let mut arguments = json!({
        "target": f.project.path().to_string_lossy(),
        "requirements": "must be clean",
    });
    if let (Some(base), Some(extra)) = (arguments.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    let (is_error, ack) = call_tool(&f.server, "start_session", arguments).await;
    assert!(!is_error, "start_session failed: {ack}");
    ack["sessionId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_protocol_handshake() {
    let f = fixture().await;
    let init = call(&f.server, "initialize", json!({})).await;
    assert_eq!(init["result"]["serverInfo"]["name"], "elenchus");

    let tools = call(&f.server, "tools/list", json!({})).await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"start_session"));
    assert!(names.contains(&"check_convergence_allowed"));
}

/// Scenario: token budget halt. A screen tier burning past the ceiling
/// with a critical finding must not escalate.
#[tokio::test]
async fn token_budget_halts_escalation() {
    let f = fixture().await;
    let session_id = start_session(
        &f,
        json!({
            "optimizations": {
                "pipeline": {
                    "enabled": true,
                    "maxTotalTokens": 500,
                    "enforceTokenBudget": true,
                    "qualityFirst": false,
                    "alwaysExhaustivePatterns": []
                }
            }
        }),
    )
    .await;

    let (is_error, completion) = call_tool(
        &f.server,
        "complete_tier",
        json!({
            "sessionId": session_id,
            "tier": "screen",
            "tokensUsed": 600,
            "criticalIssues": 1,
            "issuesFound": 1
        }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(completion["shouldEscalate"], false);
    assert_eq!(completion["tokenBudgetExceeded"], true);
    assert!(completion["reason"]
        .as_str()
        .unwrap()
        .contains("Token budget exceeded"));

    let (_, status) = call_tool(
        &f.server,
        "get_pipeline_status",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(status["tokenBudgetExceeded"], true);
    assert_eq!(status["currentTier"], "screen");
}

/// Scenario: mediator surface over the protocol — summary, ripple, and
/// convergence resource.
#[tokio::test]
async fn mediator_and_resources() {
    let f = fixture().await;
    let session_id = start_session(&f, json!({})).await;

    let (_, summary) = call_tool(
        &f.server,
        "mediator_summary",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(summary["totalFiles"], 2);
    assert_eq!(summary["totalEdges"], 1);

    let (_, ripple) = call_tool(
        &f.server,
        "ripple_effect",
        json!({"sessionId": session_id, "file": "db.ts"}),
    )
    .await;
    assert_eq!(ripple["totalAffected"], 1);
    assert_eq!(ripple["affected"][0]["path"], "index.ts");

    let resource = call(
        &f.server,
        "resources/read",
        json!({"uri": format!("elenchus://sessions/{session_id}/convergence")}),
    )
    .await;
    let text = resource["result"]["contents"][0]["text"].as_str().unwrap();
    let snapshot: Value = serde_json::from_str(text).unwrap();
    assert_eq!(snapshot["isConverged"], false);
}

/// Safeguards flow: sampling results feed productivity; the convergence
/// gate answers through the protocol.
#[tokio::test]
async fn safeguards_flow() {
    let f = fixture().await;
    let session_id = start_session(
        &f,
        json!({
            "optimizations": {
                "differential": {"enabled": true, "baseRef": "last-verified"}
            }
        }),
    )
    .await;

    let (_, _score) = call_tool(
        &f.server,
        "update_confidence",
        json!({
            "sessionId": session_id,
            "path": "index.ts",
            "source": "full"
        }),
    )
    .await;

    let (_, recorded) = call_tool(
        &f.server,
        "record_sampling_result",
        json!({"sessionId": session_id, "path": "db.ts", "issuesFound": 0}),
    )
    .await;
    assert_eq!(recorded["recorded"], true);

    let (_, status) = call_tool(
        &f.server,
        "get_safeguards_status",
        json!({"sessionId": session_id}),
    )
    .await;
    assert!(status["quality"]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(status["confidence"]["filesScored"], 2);

    let (_, gate) = call_tool(
        &f.server,
        "check_convergence_allowed",
        json!({"sessionId": session_id}),
    )
    .await;
    assert!(gate["allowed"].is_boolean());
}

/// Error payloads carry the `{errorType, message}` shape with isError.
#[tokio::test]
async fn error_payload_shape() {
    let f = fixture().await;

    // Unknown session: execution failure.
    let (is_error, payload) = call_tool(
        &f.server,
        "get_context",
        json!({"sessionId": "2020-01-01_ghost_aaaaaa"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(payload["errorType"], "NotFound");

    // Bad parameter type: validation failure.
    let (is_error, payload) =
        call_tool(&f.server, "start_session", json!({"target": 17})).await;
    assert!(is_error);
    assert_eq!(payload["errorType"], "ValidationError");

    // Wrong role: state failure, and the session is untouched.
    let session_id = start_session(&f, json!({})).await;
    let (is_error, payload) = call_tool(
        &f.server,
        "submit_round",
        json!({
            "sessionId": session_id,
            "role": "critic",
            "output": "jumping the queue"
        }),
    )
    .await;
    assert!(is_error);
    assert_eq!(payload["errorType"], "StateError");

    let (_, context) = call_tool(
        &f.server,
        "get_context",
        json!({"sessionId": session_id}),
    )
    .await;
    assert_eq!(context["currentRound"], 0);
}

/// The full adversarial loop through the protocol: raise, adjudicate,
/// converge, end with PASS, inspect history.
#[tokio::test]
async fn adversarial_loop_to_pass() {
    let f = fixture().await;
    let session_id = start_session(
        &f,
        json!({"mode": "fast-track", "stableRoundsRequired": 0}),
    )
    .await;

    let (_, round) = call_tool(
        &f.server,
        "submit_round",
        json!({
            "sessionId": session_id,
            "role": "verifier",
            "output": "Raising one concern.",
            "issuesRaised": [{
                "id": "COR-01",
                "category": "CORRECTNESS",
                "severity": "MEDIUM",
                "summary": "off-by-one in main",
                "location": "index.ts:2"
            }]
        }),
    )
    .await;
    assert_eq!(round["nextRole"], "critic");

    let (_, round) = call_tool(
        &f.server,
        "submit_round",
        json!({
            "sessionId": session_id,
            "role": "critic",
            "output": "COR-01 INVALID; loop bound is exclusive by design.",
            "issuesResolved": [{
                "issueId": "COR-01",
                "verdict": "INVALID",
                "reason": "bound is correct"
            }]
        }),
    )
    .await;
    assert_eq!(round["issuesResolved"][0], "COR-01");

    let (_, round) = call_tool(
        &f.server,
        "submit_round",
        json!({
            "sessionId": session_id,
            "role": "verifier",
            "output": "Security, correctness, reliability, maintainability, performance \
                all reviewed. Edge cases: empty, null, overflow. No issues found. Verified."
        }),
    )
    .await;
    assert_eq!(round["convergence"]["isConverged"], true);

    let (_, ended) = call_tool(
        &f.server,
        "end_session",
        json!({"sessionId": session_id, "verdict": "PASS"}),
    )
    .await;
    assert_eq!(ended["status"], "converged");

    let (_, history) = call_tool(
        &f.server,
        "get_project_history",
        json!({"target": f.project.path().to_string_lossy()}),
    )
    .await;
    // First PASS: live baseline exists, history of superseded ones empty.
    assert_eq!(history.as_array().unwrap().len(), 0);
}
