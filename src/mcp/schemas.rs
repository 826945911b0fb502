//! Declared JSON schemas for the tool surface.
//!
//! These schemas are the single source of truth: the dispatcher validates
//! parameters against them (via typed deserialization) and advertises them
//! verbatim through `tools/list`.

use serde_json::json;

use crate::mcp::protocol::McpTool;

fn tool(name: &str, description: &str, schema: serde_json::Value) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: schema,
    }
}

fn session_id_property() -> serde_json::Value {
    json!({
        "type": "string",
        "pattern": "^[A-Za-z0-9_-]{1,100}$",
        "description": "Session identifier"
    })
}

/// All tool definitions advertised by the server.
pub fn tool_definitions() -> Vec<McpTool> {
    let issue_schema = json!({
        "type": "object",
        "properties": {
            "id": {"type": "string", "description": "Issue id, e.g. SEC-01"},
            "category": {
                "type": "string",
                "enum": ["SECURITY", "CORRECTNESS", "RELIABILITY", "MAINTAINABILITY", "PERFORMANCE"]
            },
            "severity": {
                "type": "string",
                "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW"]
            },
            "summary": {"type": "string"},
            "description": {"type": "string"},
            "evidence": {"type": "string"},
            "location": {"type": "string", "description": "file:line"}
        },
        "required": ["id", "category", "severity", "summary"]
    });
    let resolution_schema = json!({
        "type": "object",
        "properties": {
            "issueId": {"type": "string"},
            "verdict": {"type": "string", "enum": ["VALID", "INVALID", "PARTIAL"]},
            "reason": {"type": "string"}
        },
        "required": ["issueId"]
    });

    vec![
        tool(
            "start_session",
            "Create an adversarial review session over a target path",
            json!({
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "Path to the code under review"},
                    "requirements": {"type": "string", "description": "What the code must satisfy"},
                    "maxRounds": {"type": "integer", "minimum": 1, "maximum": 100},
                    "mode": {
                        "type": "string",
                        "enum": ["standard", "fast-track", "single-pass"],
                        "default": "standard"
                    },
                    "minRounds": {"type": "integer", "minimum": 1},
                    "stableRoundsRequired": {"type": "integer", "minimum": 0},
                    "optimizations": {
                        "type": "object",
                        "description": "Per-session optimization overrides"
                    }
                },
                "required": ["target", "requirements"]
            }),
        ),
        tool(
            "get_context",
            "Return the session's verification context",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "submit_round",
            "Submit one role's round output with raised/resolved issues",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "role": {"type": "string", "enum": ["verifier", "critic", "arbiter"]},
                    "output": {"type": "string"},
                    "issuesRaised": {"type": "array", "items": issue_schema},
                    "issuesResolved": {"type": "array", "items": resolution_schema}
                },
                "required": ["sessionId", "role", "output"]
            }),
        ),
        tool(
            "end_session",
            "End a session with a final verdict; PASS persists a baseline",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "verdict": {"type": "string", "enum": ["PASS", "FAIL", "CONDITIONAL"]}
                },
                "required": ["sessionId", "verdict"]
            }),
        ),
        tool(
            "get_issues",
            "List session issues, optionally filtered",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "status": {
                        "type": "string",
                        "enum": ["RAISED", "CHALLENGED", "RESOLVED", "UNRESOLVED", "DISMISSED", "MERGED", "SPLIT"]
                    },
                    "severity": {"type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW"]},
                    "category": {
                        "type": "string",
                        "enum": ["SECURITY", "CORRECTNESS", "RELIABILITY", "MAINTAINABILITY", "PERFORMANCE"]
                    }
                },
                "required": ["sessionId"]
            }),
        ),
        tool(
            "checkpoint",
            "Snapshot the session for later rollback",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "rollback",
            "Roll the session back to a checkpointed round",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "round": {"type": "integer", "minimum": 0}
                },
                "required": ["sessionId", "round"]
            }),
        ),
        tool(
            "apply_fix",
            "Mark an adjudicated issue fixed",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "issueId": {"type": "string"},
                    "fixDescription": {"type": "string"},
                    "reverify": {"type": "boolean", "default": false}
                },
                "required": ["sessionId", "issueId", "fixDescription"]
            }),
        ),
        tool(
            "start_reverification",
            "Flip the session into a re-verification pass",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "ripple_effect",
            "Files a hypothetical change to one file would invalidate",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "file": {"type": "string"},
                    "function": {"type": "string"}
                },
                "required": ["sessionId", "file"]
            }),
        ),
        tool(
            "mediator_summary",
            "Dependency-graph summary: files, edges, cycles, importance",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "get_role_prompt",
            "Prompt text for a role, with session requirements folded in",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "role": {"type": "string", "enum": ["verifier", "critic", "arbiter"]}
                },
                "required": ["sessionId", "role"]
            }),
        ),
        tool(
            "role_summary",
            "Summaries of all role configurations",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "update_role_config",
            "Replace one role's configuration",
            json!({
                "type": "object",
                "properties": {
                    "role": {"type": "string", "enum": ["verifier", "critic", "arbiter"]},
                    "focusCategories": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["SECURITY", "CORRECTNESS", "RELIABILITY", "MAINTAINABILITY", "PERFORMANCE"]
                        }
                    },
                    "strictness": {"type": "string", "enum": ["lenient", "balanced", "strict"]},
                    "requireEvidence": {"type": "boolean"}
                },
                "required": ["role"]
            }),
        ),
        tool(
            "save_baseline",
            "Persist a PASS baseline for the session's current context",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "get_diff_summary",
            "Differential scan captured at session start",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "get_project_history",
            "Baseline history for a project path",
            json!({
                "type": "object",
                "properties": {"target": {"type": "string"}},
                "required": ["target"]
            }),
        ),
        tool(
            "get_cache_stats",
            "Verification cache statistics",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "clear_cache",
            "Drop all verification cache entries",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_pipeline_status",
            "Tier pipeline status for a session",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "escalate_tier",
            "Manually escalate the session's pipeline one tier",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "complete_tier",
            "Record a completed tier and decide escalation",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "tier": {"type": "string", "enum": ["screen", "focused", "exhaustive"]},
                    "filesVerified": {"type": "integer", "minimum": 0},
                    "issuesFound": {"type": "integer", "minimum": 0},
                    "criticalIssues": {"type": "integer", "minimum": 0},
                    "highIssues": {"type": "integer", "minimum": 0},
                    "tokensUsed": {"type": "integer", "minimum": 0},
                    "timeMs": {"type": "integer", "minimum": 0}
                },
                "required": ["sessionId", "tier", "tokensUsed"]
            }),
        ),
        tool(
            "get_safeguards_status",
            "Quality assessment, session confidence, and periodic status",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
        tool(
            "update_confidence",
            "Record how a file was verified, producing its confidence score",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "path": {"type": "string"},
                    "source": {"type": "string", "enum": ["full", "cache", "chunk", "tiered", "sampled"]},
                    "productive": {"type": "boolean"}
                },
                "required": ["sessionId", "path", "source"]
            }),
        ),
        tool(
            "record_sampling_result",
            "Record the outcome of verifying one sampled file",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id_property(),
                    "path": {"type": "string"},
                    "issuesFound": {"type": "integer", "minimum": 0}
                },
                "required": ["sessionId", "path", "issuesFound"]
            }),
        ),
        tool(
            "check_convergence_allowed",
            "Safeguards gate: may the session declare convergence",
            json!({
                "type": "object",
                "properties": {"sessionId": session_id_property()},
                "required": ["sessionId"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_surface_is_complete() {
        let names: Vec<String> = tool_definitions().iter().map(|t| t.name.clone()).collect();
        let expected = [
            "start_session",
            "get_context",
            "submit_round",
            "end_session",
            "get_issues",
            "checkpoint",
            "rollback",
            "apply_fix",
            "start_reverification",
            "ripple_effect",
            "mediator_summary",
            "get_role_prompt",
            "role_summary",
            "update_role_config",
            "save_baseline",
            "get_diff_summary",
            "get_project_history",
            "get_cache_stats",
            "clear_cache",
            "get_pipeline_status",
            "escalate_tier",
            "complete_tier",
            "get_safeguards_status",
            "update_confidence",
            "record_sampling_result",
            "check_convergence_allowed",
        ];
        for name in expected {
            assert!(names.contains(&name.to_string()), "missing tool {name}");
        }
        assert_eq!(names.len(), expected.len());
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        for tool in tool_definitions() {
            let schema = &tool.input_schema;
            assert_eq!(schema["type"], "object", "{} schema type", tool.name);
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                let properties = schema["properties"].as_object().unwrap();
                for field in required {
                    assert!(
                        properties.contains_key(field.as_str().unwrap()),
                        "{}: required field {} not declared",
                        tool.name,
                        field
                    );
                }
            }
        }
    }

    #[test]
    fn test_submit_round_schema_roles() {
        let tools = tool_definitions();
        let submit = tools.iter().find(|t| t.name == "submit_round").unwrap();
        let roles = submit.input_schema["properties"]["role"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(roles.len(), 3);
    }
}
