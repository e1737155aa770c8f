// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent message processor.
//!
//! The single place that understands the SDK's streamed message shapes.
//! Pure: one untyped JSON message in, activities and extracted result data
//! out. Unknown message types are ignored for forward compatibility.

use ap_core::{ActivityEntry, ActivityKind};
use serde_json::Value;
use std::path::Path;

/// Payload of a successful `result` message.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSuccess {
    pub result: String,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

/// What one streamed message contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedMessage {
    pub activities: Vec<ActivityEntry>,
    pub session_id: Option<String>,
    pub success: Option<AgentSuccess>,
    /// Full error text; the activity summary holds the truncated form.
    pub error: Option<String>,
}

/// Decode one streamed message.
pub fn process_message(
    message: &Value,
    working_dir: Option<&Path>,
    now_ms: u64,
) -> ProcessedMessage {
    let mut out = ProcessedMessage::default();
    let is_subagent = message
        .get("parent_tool_use_id")
        .is_some_and(|id| !id.is_null());

    match message["type"].as_str() {
        Some("system") if message["subtype"] == "init" => {
            out.session_id = message["session_id"].as_str().map(String::from);
            out.activities.push(
                ActivityEntry::new(ActivityKind::Status, "Agent started", now_ms)
                    .subagent(is_subagent),
            );
        }
        Some("assistant") => {
            for block in message["message"]["content"].as_array().into_iter().flatten() {
                match block["type"].as_str() {
                    Some("tool_use") => {
                        let name = block["name"].as_str().unwrap_or("unknown");
                        let summary = tool_summary(name, &block["input"], working_dir);
                        out.activities.push(
                            ActivityEntry::new(ActivityKind::ToolUse, summary, now_ms)
                                .subagent(is_subagent),
                        );
                    }
                    Some("text") => {
                        let text = block["text"].as_str().unwrap_or_default();
                        if text.trim().is_empty() {
                            continue;
                        }
                        out.activities.push(
                            ActivityEntry::new(ActivityKind::Text, text, now_ms)
                                .with_detail(text)
                                .subagent(is_subagent),
                        );
                    }
                    _ => {}
                }
            }
        }
        Some("result") => {
            if message["subtype"] == "success" {
                let result = message["result"].as_str().unwrap_or_default().to_string();
                let summary = if result.is_empty() {
                    "Agent completed".to_string()
                } else {
                    result.clone()
                };
                out.activities.push(
                    ActivityEntry::new(ActivityKind::Result, summary, now_ms)
                        .subagent(is_subagent),
                );
                out.success = Some(AgentSuccess {
                    result,
                    cost_usd: message["total_cost_usd"].as_f64(),
                    duration_ms: message["duration_ms"].as_u64(),
                    num_turns: message["num_turns"].as_u64().map(|turns| turns as u32),
                });
            } else {
                let subtype = message["subtype"].as_str().unwrap_or("unknown");
                let error = message["errors"]
                    .as_array()
                    .filter(|errors| !errors.is_empty())
                    .map(|errors| {
                        errors
                            .iter()
                            .map(|err| match err.as_str() {
                                Some(text) => text.to_string(),
                                None => err.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .unwrap_or_else(|| subtype.to_string());
                out.activities.push(
                    ActivityEntry::new(ActivityKind::Error, &error, now_ms)
                        .subagent(is_subagent),
                );
                out.error = Some(error);
            }
        }
        _ => {}
    }
    out
}

/// Fixed per-tool summary rules; everything unknown is `Tool: <name>`.
fn tool_summary(name: &str, input: &Value, working_dir: Option<&Path>) -> String {
    match name {
        "Read" | "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => {
            let path = input["file_path"].as_str().unwrap_or_default();
            format!("{name}: {}", strip_working_dir(path, working_dir))
        }
        "Bash" => format!("Bash: {}", input["command"].as_str().unwrap_or_default()),
        "Glob" | "Grep" => {
            format!("{name}: {}", input["pattern"].as_str().unwrap_or_default())
        }
        "WebFetch" => format!("WebFetch: {}", input["url"].as_str().unwrap_or_default()),
        "WebSearch" => format!("WebSearch: {}", input["query"].as_str().unwrap_or_default()),
        "Task" => {
            let what = input["description"]
                .as_str()
                .or_else(|| input["subagent_type"].as_str())
                .unwrap_or("task");
            format!("Subagent: {what}")
        }
        _ => format!("Tool: {name}"),
    }
}

/// Strip the agent's working directory prefix from a path summary.
fn strip_working_dir<'a>(path: &'a str, working_dir: Option<&Path>) -> &'a str {
    let Some(working_dir) = working_dir else {
        return path;
    };
    let prefix = working_dir.to_string_lossy();
    path.strip_prefix(prefix.as_ref())
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(path)
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
