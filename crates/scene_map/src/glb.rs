//! Byte-level GLB container parsing: just enough to pull out the JSON chunk.
//!
//! Layout of a GLB: 12-byte header (`glTF` magic, version, total length),
//! then chunks. The first chunk header sits at offset 12: `u32` length,
//! `u32` type. The JSON chunk body therefore spans `[20, 20 + chunk_length)`.

use crate::SceneError;

pub const GLB_MAGIC: &[u8; 4] = b"glTF";
/// ASCII `JSON` read as a little-endian u32 at chunk-header offset 16.
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;

/// True when the body begins with the binary container magic.
#[must_use]
pub fn is_glb(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == GLB_MAGIC
}

/// Number of bytes from the start of the file through the end of the JSON
/// chunk, i.e. `20 + chunk_length`. Validates the chunk type word.
pub fn json_chunk_extent(bytes: &[u8]) -> Result<usize, SceneError> {
    if bytes.len() < 20 {
        return Err(SceneError::GlbTooSmall);
    }
    let chunk_length = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let chunk_type = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    if chunk_type != CHUNK_TYPE_JSON {
        return Err(SceneError::GlbMissingJsonChunk);
    }
    Ok(20 + chunk_length)
}

/// Slice out the JSON chunk body, failing if the buffer is shorter than the
/// declared chunk.
pub fn json_chunk(bytes: &[u8]) -> Result<&[u8], SceneError> {
    let extent = json_chunk_extent(bytes)?;
    if extent > bytes.len() {
        return Err(SceneError::GlbIncompleteJsonChunk);
    }
    Ok(&bytes[20..extent])
}

/// Parse a complete model body: GLB JSON chunk when the magic is present,
/// plain-text glTF JSON otherwise.
pub fn parse_model_json(bytes: &[u8]) -> Result<serde_json::Value, SceneError> {
    let json_bytes = if is_glb(bytes) { json_chunk(bytes)? } else { bytes };
    let text = std::str::from_utf8(json_bytes).map_err(|_| SceneError::GltfInvalidJson)?;
    serde_json::from_str(text).map_err(|_| SceneError::GltfInvalidJson)
}
