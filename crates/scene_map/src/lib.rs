//! `scene_map`: navigation data extracted from a room's 3D scene model.
//!
//! Scope
//! - Partial download and parse of the binary glTF container (JSON chunk only)
//! - Node-tree traversal collecting waypoints and oriented box colliders
//! - Segment line-of-sight test against the collected colliders
//!
//! A failed fetch or parse is never fatal to a runner: callers fall back to
//! `SceneMap::default()` and bots wander near the origin.

pub mod extract;
pub mod fetch;
pub mod geom;
pub mod glb;

use glam::{Mat4, Vec3};

/// A named world-space point bots can spawn at or patrol between.
#[derive(Debug, Clone)]
pub struct Waypoint {
    pub name: String,
    pub position: Vec3,
    pub is_spawn_candidate: bool,
    /// Name (trimmed, lowercased) begins with `spawbot-`.
    pub is_named_spawbot: bool,
}

/// An obstacle: the unit cube `[-0.5, 0.5]^3` under `world`.
///
/// Only colliders with an invertible world matrix are kept; the inverse is
/// what the line-of-sight test actually uses.
#[derive(Debug, Clone)]
pub struct BoxCollider {
    pub name: String,
    pub world: Mat4,
    pub inv_world: Mat4,
}

/// Everything the simulator needs from the scene.
#[derive(Debug, Clone, Default)]
pub struct SceneMap {
    pub all_waypoints: Vec<Waypoint>,
    pub spawn_points: Vec<Waypoint>,
    pub patrol_points: Vec<Waypoint>,
    pub colliders: Vec<BoxCollider>,
}

/// Scene extraction failures. Variants mirror the wire-level error kinds the
/// runner logs; all of them degrade to an empty scene map at the call site.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("gltf_invalid_json")]
    GltfInvalidJson,
    #[error("glb_missing_json_chunk")]
    GlbMissingJsonChunk,
    #[error("glb_incomplete_json_chunk")]
    GlbIncompleteJsonChunk,
    #[error("glb_too_small")]
    GlbTooSmall,
    #[error("scene_empty")]
    SceneEmpty,
    #[error("scene_fetch: {0}")]
    Fetch(#[from] reqwest::Error),
}
