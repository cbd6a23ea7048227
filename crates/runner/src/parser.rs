// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool output parsing
//!
//! Two layers live in the raw stream: JSON-lines events (any line opening
//! with `{`; malformed candidates are skipped with a warning) and a status
//! marker line the injected prompt instructions ask the tool to emit at
//! the end. The last marker in the log wins; its absence is not an error.

use crate::rundir::RunStatus;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Marker line prefix, e.g. `::STATUS::DONE`.
pub const MARKER_PREFIX: &str = "::STATUS::";

/// File-change actions a tool can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Create => "create",
            FileAction::Modify => "modify",
            FileAction::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "create" | "created" | "add" | "added" => FileAction::Create,
            "delete" | "deleted" | "remove" | "removed" => FileAction::Delete,
            _ => FileAction::Modify,
        }
    }
}

/// One recognized event from the stream. Out-of-vocabulary types are kept
/// opaque rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Message {
        text: String,
    },
    FileChange {
        path: String,
        action: FileAction,
        content: Option<String>,
    },
    CommandRun {
        command: String,
        exit_code: Option<i64>,
        output: Option<String>,
    },
    Completion {
        status: Option<String>,
    },
    Error {
        message: String,
    },
    Other {
        event_type: String,
    },
}

/// Parsed event paired with its raw value, so re-serialization preserves
/// exactly what the tool emitted.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event: ToolEvent,
    pub raw: Value,
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Parse one line as an event. Returns `None` for non-candidates and for
/// malformed JSON (logged, skipped).
pub fn parse_line(line: &str) -> Option<ParsedEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let raw: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            let mut shown = trimmed.to_string();
            shown.truncate(100);
            warn!(error = %e, line = %shown, "skipping malformed event line");
            return None;
        }
    };

    let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("");
    let event = match event_type {
        "message" => ToolEvent::Message {
            text: string_field(&raw, &["content", "text", "message"]).unwrap_or_default(),
        },
        "file.change" => ToolEvent::FileChange {
            path: string_field(&raw, &["path", "file"])?,
            action: raw
                .get("action")
                .and_then(Value::as_str)
                .map(FileAction::parse)
                .unwrap_or(FileAction::Modify),
            content: string_field(&raw, &["content"]),
        },
        "command.run" => ToolEvent::CommandRun {
            command: string_field(&raw, &["command", "cmd"])?,
            exit_code: raw.get("exit_code").and_then(Value::as_i64),
            output: string_field(&raw, &["output", "stdout"]),
        },
        "completion" => ToolEvent::Completion {
            status: string_field(&raw, &["status"]),
        },
        "error" => ToolEvent::Error {
            message: string_field(&raw, &["message", "error"])
                .unwrap_or_else(|| raw.to_string()),
        },
        other => ToolEvent::Other {
            event_type: other.to_string(),
        },
    };

    Some(ParsedEvent { event, raw })
}

/// Parse every event line in a log, order preserved.
pub fn parse_log(log: &str) -> Vec<ParsedEvent> {
    log.lines().filter_map(parse_line).collect()
}

/// Terminal disposition markers a tool can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMarker {
    Done,
    NeedUser,
    Error,
    Timeout,
}

impl StatusMarker {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "DONE" => Some(StatusMarker::Done),
            "NEED_USER" => Some(StatusMarker::NeedUser),
            "ERROR" => Some(StatusMarker::Error),
            "TIMEOUT" => Some(StatusMarker::Timeout),
            _ => None,
        }
    }

    pub fn as_status(&self) -> RunStatus {
        match self {
            StatusMarker::Done => RunStatus::Done,
            StatusMarker::NeedUser => RunStatus::NeedUser,
            StatusMarker::Error => RunStatus::Error,
            StatusMarker::Timeout => RunStatus::Timeout,
        }
    }
}

/// The last status marker in the log, scanning bottom-up.
pub fn last_marker(log: &str) -> Option<StatusMarker> {
    for line in log.lines().rev() {
        if let Some(pos) = line.find(MARKER_PREFIX) {
            if let Some(marker) = StatusMarker::parse(&line[pos + MARKER_PREFIX.len()..]) {
                return Some(marker);
            }
        }
    }
    None
}

/// Append the marker instruction to a task prompt so the parser and the
/// instruction can never disagree on the vocabulary.
pub fn inject_marker_instructions(task: &str) -> String {
    format!(
        "{}\n\nWhen you are finished, print exactly one final line:\n\
         {MARKER_PREFIX}DONE if the task is complete,\n\
         {MARKER_PREFIX}NEED_USER if you need input from a human,\n\
         {MARKER_PREFIX}ERROR if the task cannot be completed.",
        task.trim()
    )
}

/// Aggregated view of a run's events.
#[derive(Debug, Default)]
pub struct OutputSummary {
    pub total_events: usize,
    pub counts: BTreeMap<String, usize>,
    /// Final action per path.
    pub files: BTreeMap<String, FileAction>,
    pub commands: Vec<String>,
    pub errors: Vec<String>,
    /// Payload of the last completion event, when one was emitted.
    pub final_response: Option<Value>,
}

/// Summarize a parsed event stream.
pub fn summarize(events: &[ParsedEvent]) -> OutputSummary {
    let mut summary = OutputSummary {
        total_events: events.len(),
        ..OutputSummary::default()
    };

    for parsed in events {
        let key = match &parsed.event {
            ToolEvent::Message { .. } => "message",
            ToolEvent::FileChange { .. } => "file.change",
            ToolEvent::CommandRun { .. } => "command.run",
            ToolEvent::Completion { .. } => "completion",
            ToolEvent::Error { .. } => "error",
            ToolEvent::Other { event_type } => event_type.as_str(),
        };
        *summary.counts.entry(key.to_string()).or_insert(0) += 1;

        match &parsed.event {
            ToolEvent::FileChange { path, action, .. } => {
                summary.files.insert(path.clone(), *action);
            }
            ToolEvent::CommandRun { command, .. } => {
                summary.commands.push(command.clone());
            }
            ToolEvent::Error { message } => {
                summary.errors.push(message.clone());
            }
            ToolEvent::Completion { .. } => {
                summary.final_response = Some(parsed.raw.clone());
            }
            _ => {}
        }
    }

    summary
}

/// Free-text fallback when no marker and no usable exit code exist.
pub fn heuristic_status(log: &str) -> Option<RunStatus> {
    let lower = log.to_lowercase();
    const NEED_USER: [&str; 3] = [
        "need more information",
        "please clarify",
        "waiting for your input",
    ];
    const SUCCESS: [&str; 3] = ["task complete", "all done", "finished successfully"];

    if NEED_USER.iter().any(|p| lower.contains(p)) {
        return Some(RunStatus::NeedUser);
    }
    if SUCCESS.iter().any(|p| lower.contains(p)) {
        return Some(RunStatus::Done);
    }
    None
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
