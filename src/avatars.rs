//! Featured avatar listings.
//!
//! The media search endpoint returns avatar entries with glTF refs and tag
//! lists; bots prefer full-body rigs when any are tagged. Lists keep
//! first-seen order so the deterministic per-bot assignment is stable
//! between refreshes.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

pub const REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Default)]
pub struct AvatarCatalog {
    pub all_refs: Vec<String>,
    pub fullbody_refs: Vec<String>,
}

impl AvatarCatalog {
    /// Collect refs from a `media/search` listing payload.
    #[must_use]
    pub fn from_listing(listing: &Value) -> Self {
        let mut all_refs = Vec::new();
        let mut fullbody_refs = Vec::new();
        let mut seen_all = HashSet::new();
        let mut seen_full = HashSet::new();
        let entries = listing
            .get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in &entries {
            let Some(avatar) = entry.pointer("/gltfs/avatar").and_then(Value::as_str) else {
                continue;
            };
            if seen_all.insert(avatar.to_string()) {
                all_refs.push(avatar.to_string());
            }
            let fullbody = entry
                .pointer("/tags/tags")
                .and_then(Value::as_array)
                .is_some_and(|tags| {
                    tags.iter().filter_map(Value::as_str).any(|t| {
                        t.eq_ignore_ascii_case("fullbody") || t.eq_ignore_ascii_case("rpm")
                    })
                });
            if fullbody && seen_full.insert(avatar.to_string()) {
                fullbody_refs.push(avatar.to_string());
            }
        }
        Self {
            all_refs,
            fullbody_refs,
        }
    }

    /// Full-body rigs when available, otherwise everything.
    #[must_use]
    pub fn preferred(&self) -> &[String] {
        if self.fullbody_refs.is_empty() {
            &self.all_refs
        } else {
            &self.fullbody_refs
        }
    }
}

/// Fetch the featured avatar listing from the media search API.
pub async fn fetch_featured(client: &reqwest::Client, base: &Url) -> Result<AvatarCatalog> {
    let url = base
        .join("/api/v1/media/search")
        .context("media search url")?;
    let listing: Value = client
        .get(url)
        .query(&[("source", "avatar_listings"), ("filter", "featured")])
        .send()
        .await
        .context("fetch avatar listing")?
        .error_for_status()
        .context("avatar listing status")?
        .json()
        .await
        .context("decode avatar listing")?;
    Ok(AvatarCatalog::from_listing(&listing))
}
