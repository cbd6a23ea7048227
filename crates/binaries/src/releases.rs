// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Release API client
//!
//! Talks to the upstream artifact host's releases API to resolve `latest`,
//! fetch release metadata, and locate downloadable assets. A rate-limit
//! response becomes a typed error carrying the reset time so callers can
//! schedule a retry instead of guessing.

use crate::error::BinaryError;
use crate::registry::Variant;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Upstream project the server builds come from.
pub const RELEASES_REPO: &str = "ggml-org/llama.cpp";

/// Env vars checked (in order) for an API token to lift rate limits.
pub const TOKEN_ENVS: [&str; 2] = ["HERD_GITHUB_TOKEN", "GITHUB_TOKEN"];

const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("herd/", env!("CARGO_PKG_VERSION"));

/// Release metadata kept with installed binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    target_commitish: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<AssetPayload>,
}

#[derive(Debug, Deserialize)]
struct AssetPayload {
    name: String,
    browser_download_url: String,
}

/// Download URL for a release asset, by naming convention:
/// `llama-<tag>-bin-<variant>.{zip|tar.gz}`.
pub fn build_download_url(version: &str, variant: Variant) -> String {
    format!(
        "https://github.com/{RELEASES_REPO}/releases/download/{version}/llama-{version}-bin-{}{}",
        variant.as_str(),
        variant.archive_ext()
    )
}

/// Client for the releases API.
pub struct ReleaseClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ReleaseClient {
    pub fn new() -> Self {
        let token = TOKEN_ENVS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        Self::with_base_url(
            format!("https://api.github.com/repos/{RELEASES_REPO}/releases"),
            token,
        )
    }

    /// Client against a custom endpoint (tests, mirrors).
    pub fn with_base_url(base_url: String, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_API_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            token,
        }
    }

    async fn get(&self, path: &str) -> Result<ReleasePayload, BinaryError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url, "querying release API");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        if status == 403 {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok());
            if remaining == Some("0") {
                let reset = response
                    .headers()
                    .get("x-ratelimit-reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                return Err(BinaryError::RateLimited { reset });
            }
        }

        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(BinaryError::Api { status, message });
        }

        Ok(response.json().await?)
    }

    /// Resolve `latest` to a concrete tag.
    pub async fn resolve_latest_tag(&self) -> Result<String, BinaryError> {
        Ok(self.get("/latest").await?.tag_name)
    }

    /// Structured metadata for a tag (or the latest release).
    pub async fn release_info(&self, tag: &str) -> Result<ReleaseInfo, BinaryError> {
        let payload = if tag == "latest" {
            self.get("/latest").await?
        } else {
            self.get(&format!("/tags/{tag}")).await?
        };
        Ok(ReleaseInfo {
            tag_name: payload.tag_name,
            published_at: payload
                .published_at
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            commit_sha: payload.target_commitish,
            html_url: payload.html_url,
        })
    }

    /// Direct asset URL for `(tag, variant)`; falls back to the
    /// constructed URL when the asset listing doesn't include it.
    pub async fn asset_url(&self, tag: &str, variant: Variant) -> Result<String, BinaryError> {
        let payload = self.get(&format!("/tags/{tag}")).await?;
        let expected = format!(
            "llama-{}-bin-{}{}",
            payload.tag_name,
            variant.as_str(),
            variant.archive_ext()
        );

        if let Some(asset) = payload.assets.iter().find(|a| a.name == expected) {
            return Ok(asset.browser_download_url.clone());
        }

        warn!(tag, asset = %expected, "asset not listed in release, using constructed URL");
        Ok(build_download_url(&payload.tag_name, variant))
    }
}

impl Default for ReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "releases_tests.rs"]
mod tests;
