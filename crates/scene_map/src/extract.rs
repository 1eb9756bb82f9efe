//! Walk the glTF node tree and collect navigation data.
//!
//! World matrices come from a depth-first traversal of the chosen scene's
//! roots; nodes the scene never reaches are traversed again from identity so
//! every node ends up with some world transform. Component metadata rides in
//! per-node `extensions`.

use crate::{BoxCollider, SceneError, SceneMap, Waypoint};
use glam::{EulerRot, Mat4, Quat, Vec3};
use serde_json::Value;

const EXT_PRIMARY: &str = "MOZ_hubs_components";
const EXT_FALLBACK: &str = "HUBS_components";
const SPAWBOT_PREFIX: &str = "spawbot-";

/// Extract a [`SceneMap`] from parsed glTF JSON.
pub fn extract_scene(gltf: &Value) -> Result<SceneMap, SceneError> {
    let nodes = gltf
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or(SceneError::SceneEmpty)?;
    if nodes.is_empty() {
        return Err(SceneError::SceneEmpty);
    }

    let mut worlds: Vec<Option<Mat4>> = vec![None; nodes.len()];
    for root in scene_roots(gltf) {
        visit(nodes, root, Mat4::IDENTITY, &mut worlds);
    }
    // Orphan subtrees (unreferenced by the scene) still get world matrices,
    // rooted at identity.
    for idx in 0..nodes.len() {
        if worlds[idx].is_none() {
            visit(nodes, idx, Mat4::IDENTITY, &mut worlds);
        }
    }

    let mut all_waypoints = Vec::new();
    let mut colliders = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        let world = worlds[idx].unwrap_or(Mat4::IDENTITY);
        let Some(components) = hubs_components(node) else {
            continue;
        };
        let name = node_name(node, idx);

        let waypoint = components.get("waypoint");
        let spawn_point = components
            .get("spawn-point")
            .or_else(|| components.get("spawn_point"));
        if waypoint.is_some() || spawn_point.is_some() {
            let can_spawn = waypoint
                .and_then(|w| w.get("canBeSpawnPoint"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            all_waypoints.push(Waypoint {
                position: world.transform_point3(Vec3::ZERO),
                is_spawn_candidate: can_spawn || spawn_point.is_some(),
                is_named_spawbot: name.to_lowercase().starts_with(SPAWBOT_PREFIX),
                name: name.clone(),
            });
        }

        if let Some(bc) = components.get("box-collider") {
            if let Some(c) = build_collider(&name, world, bc) {
                colliders.push(c);
            } else {
                log::debug!("dropping non-invertible collider '{name}'");
            }
        }
    }

    Ok(derive_sets(all_waypoints, colliders))
}

/// Root node indices of `scenes[gltf.scene ?? 0]`.
fn scene_roots(gltf: &Value) -> Vec<usize> {
    let scene_idx = gltf.get("scene").and_then(Value::as_u64).unwrap_or(0) as usize;
    gltf.get("scenes")
        .and_then(Value::as_array)
        .and_then(|s| s.get(scene_idx))
        .and_then(|s| s.get("nodes"))
        .and_then(Value::as_array)
        .map(|roots| {
            roots
                .iter()
                .filter_map(Value::as_u64)
                .map(|i| i as usize)
                .collect()
        })
        .unwrap_or_default()
}

fn visit(nodes: &[Value], idx: usize, parent: Mat4, worlds: &mut Vec<Option<Mat4>>) {
    let Some(node) = nodes.get(idx) else { return };
    if worlds[idx].is_some() {
        return;
    }
    let world = parent * local_matrix(node);
    worlds[idx] = Some(world);
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children.iter().filter_map(Value::as_u64) {
            visit(nodes, child as usize, world, worlds);
        }
    }
}

/// Local transform: `matrix` verbatim (column-major) when present, else TRS.
fn local_matrix(node: &Value) -> Mat4 {
    if let Some(m) = node.get("matrix").and_then(Value::as_array) {
        if m.len() == 16 {
            let mut cols = [0.0f32; 16];
            for (i, v) in m.iter().enumerate() {
                cols[i] = v.as_f64().unwrap_or(0.0) as f32;
            }
            return Mat4::from_cols_array(&cols);
        }
    }
    let t = vec3_field(node.get("translation")).unwrap_or(Vec3::ZERO);
    let r = quat_field(node.get("rotation")).unwrap_or(Quat::IDENTITY);
    let s = vec3_field(node.get("scale")).unwrap_or(Vec3::ONE);
    Mat4::from_scale_rotation_translation(s, r, t)
}

fn hubs_components(node: &Value) -> Option<&serde_json::Map<String, Value>> {
    let ext = node.get("extensions")?;
    ext.get(EXT_PRIMARY)
        .or_else(|| ext.get(EXT_FALLBACK))
        .and_then(Value::as_object)
}

fn node_name(node: &Value, idx: usize) -> String {
    let name = node
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if name.is_empty() {
        format!("node-{idx}")
    } else {
        name.to_string()
    }
}

/// Collider local frame is `T * R_euler(degrees) * S` from the component
/// fields, composed under the node's world matrix.
fn build_collider(name: &str, node_world: Mat4, component: &Value) -> Option<BoxCollider> {
    let t = vec3_field(component.get("position")).unwrap_or(Vec3::ZERO);
    let r_deg = vec3_field(component.get("rotation")).unwrap_or(Vec3::ZERO);
    let s = vec3_field(component.get("scale")).unwrap_or(Vec3::ONE);
    let local = Mat4::from_translation(t)
        * Mat4::from_euler(
            EulerRot::XYZ,
            r_deg.x.to_radians(),
            r_deg.y.to_radians(),
            r_deg.z.to_radians(),
        )
        * Mat4::from_scale(s);
    let world = node_world * local;
    if world.determinant().abs() <= 1e-8 {
        return None;
    }
    let inv_world = world.inverse();
    if !inv_world.is_finite() {
        return None;
    }
    Some(BoxCollider {
        name: name.to_string(),
        world,
        inv_world,
    })
}

/// Accept both `{x, y, z}` objects and `[x, y, z]` arrays.
fn vec3_field(v: Option<&Value>) -> Option<Vec3> {
    let v = v?;
    if let Some(arr) = v.as_array() {
        if arr.len() >= 3 {
            return Some(Vec3::new(
                arr[0].as_f64()? as f32,
                arr[1].as_f64()? as f32,
                arr[2].as_f64()? as f32,
            ));
        }
        return None;
    }
    let obj = v.as_object()?;
    Some(Vec3::new(
        obj.get("x")?.as_f64()? as f32,
        obj.get("y")?.as_f64()? as f32,
        obj.get("z")?.as_f64()? as f32,
    ))
}

fn quat_field(v: Option<&Value>) -> Option<Quat> {
    let arr = v?.as_array()?;
    if arr.len() < 4 {
        return None;
    }
    Some(Quat::from_xyzw(
        arr[0].as_f64()? as f32,
        arr[1].as_f64()? as f32,
        arr[2].as_f64()? as f32,
        arr[3].as_f64()? as f32,
    ))
}

/// Apply the spawn/patrol preference ladders.
fn derive_sets(all_waypoints: Vec<Waypoint>, colliders: Vec<BoxCollider>) -> SceneMap {
    let spawbots: Vec<Waypoint> = all_waypoints
        .iter()
        .filter(|w| w.is_named_spawbot)
        .cloned()
        .collect();
    let candidates: Vec<Waypoint> = all_waypoints
        .iter()
        .filter(|w| w.is_spawn_candidate)
        .cloned()
        .collect();

    let spawn_points = if !spawbots.is_empty() {
        spawbots.clone()
    } else if !candidates.is_empty() {
        candidates.clone()
    } else {
        all_waypoints.clone()
    };

    let patrol_points = if spawbots.len() >= 2 {
        spawbots
    } else if all_waypoints.len() >= 2 {
        all_waypoints.clone()
    } else if candidates.len() >= 2 {
        candidates
    } else {
        Vec::new()
    };

    SceneMap {
        all_waypoints,
        spawn_points,
        patrol_points,
        colliders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_nodes_is_scene_empty() {
        assert!(matches!(
            extract_scene(&json!({"nodes": []})),
            Err(SceneError::SceneEmpty)
        ));
        assert!(matches!(
            extract_scene(&json!({})),
            Err(SceneError::SceneEmpty)
        ));
    }

    #[test]
    fn trs_chain_places_waypoint_in_world_space() {
        let gltf = json!({
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [
                {"name": "root", "translation": [10.0, 0.0, 0.0], "children": [1]},
                {
                    "name": "spawbot-east",
                    "translation": [0.0, 0.0, 2.0],
                    "extensions": {"MOZ_hubs_components": {"waypoint": {"canBeSpawnPoint": true}}}
                }
            ]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.all_waypoints.len(), 1);
        let wp = &map.all_waypoints[0];
        assert!((wp.position - Vec3::new(10.0, 0.0, 2.0)).length() < 1e-6);
        assert!(wp.is_spawn_candidate);
        assert!(wp.is_named_spawbot);
    }

    #[test]
    fn matrix_local_transform_used_verbatim() {
        // Column-major translation matrix moving +5 on Z.
        let gltf = json!({
            "scenes": [{"nodes": [0]}],
            "nodes": [{
                "name": "wp",
                "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,5,1],
                "extensions": {"MOZ_hubs_components": {"spawn-point": {}}}
            }]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert!((map.all_waypoints[0].position.z - 5.0).abs() < 1e-6);
        assert!(map.all_waypoints[0].is_spawn_candidate);
    }

    #[test]
    fn orphan_nodes_still_receive_world_matrices() {
        let gltf = json!({
            "scenes": [{"nodes": [0]}],
            "nodes": [
                {"name": "in-scene"},
                {
                    "name": "orphan-wp",
                    "translation": [1.0, 2.0, 3.0],
                    "extensions": {"MOZ_hubs_components": {"waypoint": {}}}
                }
            ]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.all_waypoints.len(), 1);
        assert!((map.all_waypoints[0].position - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn unnamed_nodes_get_synthetic_names() {
        let gltf = json!({
            "scenes": [{"nodes": [0]}],
            "nodes": [{
                "name": "   ",
                "extensions": {"HUBS_components": {"waypoint": {}}}
            }]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.all_waypoints[0].name, "node-0");
    }

    #[test]
    fn zero_scale_collider_is_dropped() {
        let gltf = json!({
            "scenes": [{"nodes": [0, 1]}],
            "nodes": [
                {
                    "name": "flat",
                    "extensions": {"MOZ_hubs_components": {"box-collider": {
                        "scale": {"x": 1.0, "y": 0.0, "z": 1.0}
                    }}}
                },
                {
                    "name": "solid",
                    "extensions": {"MOZ_hubs_components": {"box-collider": {
                        "position": {"x": 0.0, "y": 1.0, "z": 0.0},
                        "rotation": {"x": 0.0, "y": 45.0, "z": 0.0},
                        "scale": {"x": 2.0, "y": 2.0, "z": 2.0}
                    }}}
                }
            ]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.colliders.len(), 1);
        assert_eq!(map.colliders[0].name, "solid");
    }

    #[test]
    fn spawbots_win_spawn_and_patrol_preference() {
        let wp = |name: &str, cand: bool| {
            json!({
                "name": name,
                "extensions": {"MOZ_hubs_components": {
                    "waypoint": {"canBeSpawnPoint": cand}
                }}
            })
        };
        let gltf = json!({
            "scenes": [{"nodes": [0, 1, 2]}],
            "nodes": [wp("spawbot-a", false), wp("spawbot-b", false), wp("c", true)]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.spawn_points.len(), 2);
        assert!(map.spawn_points.iter().all(|w| w.is_named_spawbot));
        assert_eq!(map.patrol_points.len(), 2);
    }

    #[test]
    fn single_waypoint_yields_no_patrol() {
        let gltf = json!({
            "scenes": [{"nodes": [0]}],
            "nodes": [{
                "name": "only",
                "extensions": {"MOZ_hubs_components": {"waypoint": {}}}
            }]
        });
        let map = extract_scene(&gltf).expect("extract");
        assert_eq!(map.spawn_points.len(), 1);
        assert!(map.patrol_points.is_empty());
    }
}
