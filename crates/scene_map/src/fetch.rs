//! Ranged download of the scene model.
//!
//! The first request asks for the leading 256 KiB; most scene GLBs keep the
//! whole JSON chunk inside that window. When the chunk is longer we grow the
//! range to its exact extent (capped at 2 MiB) before falling back to a full
//! download.

use crate::{glb, SceneError};
use reqwest::header::RANGE;
use reqwest::StatusCode;

const HEAD_RANGE_BYTES: usize = 256 * 1024;
const MAX_RANGED_EXTENT: usize = 2 * 1024 * 1024;

/// Fetch `url` and return the parsed glTF JSON, downloading as little of the
/// body as the server and the chunk layout allow.
pub async fn fetch_model_json(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, SceneError> {
    let resp = client
        .get(url)
        .header(RANGE, format!("bytes=0-{}", HEAD_RANGE_BYTES - 1))
        .send()
        .await?;
    // 200 means the server ignored the range and handed us the whole file.
    let ranged = resp.status() == StatusCode::PARTIAL_CONTENT;
    let bytes = resp.error_for_status()?.bytes().await?;

    if !glb::is_glb(&bytes) {
        if ranged {
            // Only a prefix of a text glTF; refetch whole.
            let full = client.get(url).send().await?.error_for_status()?.bytes().await?;
            return glb::parse_model_json(&full);
        }
        return glb::parse_model_json(&bytes);
    }

    let extent = glb::json_chunk_extent(&bytes)?;
    if extent <= bytes.len() {
        return glb::parse_model_json(&bytes);
    }
    if !ranged {
        // Full body in hand but shorter than the declared chunk.
        return Err(SceneError::GlbIncompleteJsonChunk);
    }
    if extent <= MAX_RANGED_EXTENT {
        let resp = client
            .get(url)
            .header(RANGE, format!("bytes=0-{}", extent - 1))
            .send()
            .await?
            .error_for_status()?;
        let grown = resp.bytes().await?;
        if grown.len() >= extent {
            return glb::parse_model_json(&grown);
        }
        log::debug!(
            "ranged refetch still short ({} < {}), downloading full model",
            grown.len(),
            extent
        );
    }
    let full = client.get(url).send().await?.error_for_status()?.bytes().await?;
    glb::parse_model_json(&full)
}
