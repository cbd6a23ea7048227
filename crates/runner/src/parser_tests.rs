// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// ── Event layer ──────────────────────────────────────────────────────────────

#[test]
fn message_event_parses() {
    let parsed = parse_line(r#"{"type":"message","content":"thinking..."}"#).unwrap();
    assert_eq!(
        parsed.event,
        ToolEvent::Message {
            text: "thinking...".to_string()
        }
    );
}

#[test]
fn file_change_event_parses_actions() {
    let parsed =
        parse_line(r#"{"type":"file.change","path":"src/a.py","action":"create"}"#).unwrap();
    assert_eq!(
        parsed.event,
        ToolEvent::FileChange {
            path: "src/a.py".to_string(),
            action: FileAction::Create,
            content: None,
        }
    );

    // Unknown action defaults to modify
    let parsed = parse_line(r#"{"type":"file.change","path":"b.py","action":"touched"}"#).unwrap();
    assert!(matches!(
        parsed.event,
        ToolEvent::FileChange {
            action: FileAction::Modify,
            ..
        }
    ));
}

#[test]
fn command_run_event_parses() {
    let parsed = parse_line(
        r#"{"type":"command.run","command":"pytest -q","exit_code":1,"output":"1 failed"}"#,
    )
    .unwrap();
    assert_eq!(
        parsed.event,
        ToolEvent::CommandRun {
            command: "pytest -q".to_string(),
            exit_code: Some(1),
            output: Some("1 failed".to_string()),
        }
    );
}

#[test]
fn unknown_event_type_is_preserved_opaquely() {
    let parsed = parse_line(r#"{"type":"token.usage","total":1234}"#).unwrap();
    assert_eq!(
        parsed.event,
        ToolEvent::Other {
            event_type: "token.usage".to_string()
        }
    );
    assert_eq!(parsed.raw["total"], 1234);
}

#[test]
fn non_json_lines_are_not_candidates() {
    assert!(parse_line("plain progress output").is_none());
    assert!(parse_line("").is_none());
}

#[test]
fn malformed_json_candidate_is_skipped() {
    assert!(parse_line(r#"{"type": "message", broken"#).is_none());
}

#[test]
fn parse_log_preserves_order_and_skips_noise() {
    let log = "starting up\n\
               {\"type\":\"message\",\"content\":\"a\"}\n\
               {not json}\n\
               {\"type\":\"completion\",\"status\":\"done\"}\n";
    let events = parse_log(log);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0].event, ToolEvent::Message { .. }));
    assert!(matches!(events[1].event, ToolEvent::Completion { .. }));
}

#[test]
fn reserializing_raw_events_is_idempotent() {
    let line = r#"{"type":"file.change","path":"a.py","action":"modify","extra":{"k":1}}"#;
    let parsed = parse_line(line).unwrap();
    let reserialized = serde_json::to_string(&parsed.raw).unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&reserialized).unwrap();
    assert_eq!(parsed.raw, reparsed);
}

// ── Marker layer ─────────────────────────────────────────────────────────────

#[yare::parameterized(
    done      = { "::STATUS::DONE", Some(StatusMarker::Done) },
    need_user = { "::STATUS::NEED_USER", Some(StatusMarker::NeedUser) },
    error     = { "::STATUS::ERROR", Some(StatusMarker::Error) },
    timeout   = { "::STATUS::TIMEOUT", Some(StatusMarker::Timeout) },
    unknown   = { "::STATUS::MAYBE", None },
    absent    = { "no marker here", None },
)]
fn marker_parsing(log: &str, expected: Option<StatusMarker>) {
    assert_eq!(last_marker(log), expected);
}

#[test]
fn last_marker_wins() {
    let log = "::STATUS::NEED_USER\nsome more work\n::STATUS::DONE\ntrailing output";
    assert_eq!(last_marker(log), Some(StatusMarker::Done));
}

#[test]
fn marker_in_the_middle_of_a_line_is_found() {
    let log = "tool says: ::STATUS::DONE and exits";
    assert_eq!(last_marker(log), Some(StatusMarker::Done));
}

#[test]
fn marker_statuses_map() {
    assert_eq!(StatusMarker::Done.as_status(), RunStatus::Done);
    assert_eq!(StatusMarker::NeedUser.as_status(), RunStatus::NeedUser);
    assert_eq!(StatusMarker::Error.as_status(), RunStatus::Error);
    assert_eq!(StatusMarker::Timeout.as_status(), RunStatus::Timeout);
}

#[test]
fn injected_instructions_contain_the_vocabulary() {
    let prompt = inject_marker_instructions("  count the files  ");
    assert!(prompt.starts_with("count the files"));
    assert!(prompt.contains("::STATUS::DONE"));
    assert!(prompt.contains("::STATUS::NEED_USER"));
    assert!(prompt.contains("::STATUS::ERROR"));
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[test]
fn summary_counts_and_collects() {
    let log = r#"{"type":"message","content":"working"}
{"type":"file.change","path":"a.py","action":"create"}
{"type":"file.change","path":"a.py","action":"modify"}
{"type":"file.change","path":"b.py","action":"delete"}
{"type":"command.run","command":"pytest","exit_code":0}
{"type":"error","message":"transient hiccup"}
{"type":"completion","status":"done","summary":"all good"}
"#;
    let events = parse_log(log);
    let summary = summarize(&events);

    assert_eq!(summary.total_events, 7);
    assert_eq!(summary.counts["file.change"], 3);
    assert_eq!(summary.counts["message"], 1);
    // Last action per file wins
    assert_eq!(summary.files["a.py"], FileAction::Modify);
    assert_eq!(summary.files["b.py"], FileAction::Delete);
    assert_eq!(summary.commands, vec!["pytest"]);
    assert_eq!(summary.errors, vec!["transient hiccup"]);
    let response = summary.final_response.unwrap();
    assert_eq!(response["summary"], "all good");
}

#[test]
fn heuristics_cover_both_directions() {
    assert_eq!(
        heuristic_status("...\ntask complete.\n"),
        Some(RunStatus::Done)
    );
    assert_eq!(
        heuristic_status("I need more information about the schema"),
        Some(RunStatus::NeedUser)
    );
    assert_eq!(heuristic_status("neutral output"), None);
}
