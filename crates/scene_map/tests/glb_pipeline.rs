use glam::Vec3;
use scene_map::extract::extract_scene;
use scene_map::geom::{is_path_clear, DEFAULT_EPS};
use scene_map::glb::{parse_model_json, CHUNK_TYPE_JSON, GLB_MAGIC};
use serde_json::json;

fn wrap_glb(json: &str) -> Vec<u8> {
    let body = json.as_bytes();
    let mut out = Vec::with_capacity(20 + body.len());
    out.extend_from_slice(GLB_MAGIC);
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&((20 + body.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn demo_gltf() -> serde_json::Value {
    json!({
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0, 1, 2, 3]}],
        "nodes": [
            {
                "name": "spawbot-west",
                "translation": [-6.0, 0.0, 0.0],
                "extensions": {"MOZ_hubs_components": {"waypoint": {"canBeSpawnPoint": true}}}
            },
            {
                "name": "spawbot-east",
                "translation": [6.0, 0.0, 0.0],
                "extensions": {"MOZ_hubs_components": {"waypoint": {"canBeSpawnPoint": true}}}
            },
            {
                "name": "pillar",
                "translation": [0.0, 0.0, 0.0],
                "extensions": {"MOZ_hubs_components": {"box-collider": {
                    "position": {"x": 0.0, "y": 1.0, "z": 0.0},
                    "rotation": {"x": 0.0, "y": 0.0, "z": 0.0},
                    "scale": {"x": 1.0, "y": 3.0, "z": 8.0}
                }}}
            },
            {
                "name": "decor",
                "translation": [0.0, 5.0, 0.0]
            }
        ]
    })
}

#[test]
fn glb_chunk_matches_plain_json_parse() {
    let gltf = demo_gltf();
    let text = gltf.to_string();
    let glb = wrap_glb(&text);
    let from_glb = parse_model_json(&glb).expect("parse glb");
    let from_text = parse_model_json(text.as_bytes()).expect("parse text");
    assert_eq!(from_glb, from_text);
    assert_eq!(from_glb, gltf);
}

#[test]
fn extracted_scene_blocks_the_line_between_spawbots() {
    let gltf = parse_model_json(&wrap_glb(&demo_gltf().to_string())).expect("parse");
    let scene = extract_scene(&gltf).expect("extract");

    assert_eq!(scene.all_waypoints.len(), 2);
    assert_eq!(scene.spawn_points.len(), 2);
    assert_eq!(scene.patrol_points.len(), 2);
    assert_eq!(scene.colliders.len(), 1);

    let west = scene
        .all_waypoints
        .iter()
        .find(|w| w.name == "spawbot-west")
        .expect("west waypoint");
    let east = scene
        .all_waypoints
        .iter()
        .find(|w| w.name == "spawbot-east")
        .expect("east waypoint");
    assert!((west.position - Vec3::new(-6.0, 0.0, 0.0)).length() < 1e-6);

    // The pillar stands between them; a sidestepped line misses it.
    assert!(!is_path_clear(
        west.position,
        east.position,
        &scene.colliders,
        DEFAULT_EPS
    ));
    let side_a = west.position + Vec3::new(0.0, 0.0, 6.0);
    let side_b = east.position + Vec3::new(0.0, 0.0, 6.0);
    assert!(is_path_clear(side_a, side_b, &scene.colliders, DEFAULT_EPS));
}
