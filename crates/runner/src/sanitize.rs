// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for captured tool output
//!
//! Applied line-wise as the last step before anything is persisted, so a
//! leaked credential never reaches `log.txt` or a response file. Matches
//! are replaced in place, which keeps JSON-lines structure intact (the
//! replacement contains no quotes or newlines).

use regex::Regex;
use std::sync::OnceLock;

const REDACTED: &str = "[REDACTED]";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Common API key shapes
            r"sk-[A-Za-z0-9_-]{20,}",
            r"gh[pousr]_[A-Za-z0-9]{36,}",
            r"xox[baprs]-[A-Za-z0-9-]{10,}",
            r"AKIA[0-9A-Z]{16}",
            // Bearer / OAuth tokens
            r"(?i)bearer\s+[A-Za-z0-9._~+/=-]{16,}",
            // JWTs
            r"eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
            // PEM framing (bodies are caught by the base64 run below)
            r"-----(BEGIN|END)[A-Z ]*(PRIVATE KEY|CERTIFICATE)-----",
            // Long base64 runs (key material, certificate bodies)
            r"[A-Za-z0-9+/]{64,}={0,2}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Redact secrets in one line.
pub fn sanitize_line(line: &str) -> String {
    let mut out = line.to_string();
    for pattern in patterns() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}

/// Redact secrets in a block of text, preserving line structure exactly.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('\n') {
        out.push_str(&sanitize_line(&rest[..pos]));
        out.push('\n');
        rest = &rest[pos + 1..];
    }
    out.push_str(&sanitize_line(rest));
    out
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
