use bot_core::{BotSim, BotsConfig, Mobility, SimSettings};
use glam::Vec3;
use net_channel::EntityMsg;
use scene_map::{SceneMap, Waypoint};

fn sim_with_bots(count: u32) -> BotSim {
    let wps: Vec<Waypoint> = (0..3)
        .map(|i| Waypoint {
            name: format!("spawbot-{i}"),
            position: Vec3::new((i as f32) * 3.0, 0.0, 0.0),
            is_spawn_candidate: true,
            is_named_spawbot: true,
        })
        .collect();
    let mut sim = BotSim::new("abc123", "sess-self", SimSettings::default(), 5);
    sim.set_scene(SceneMap {
        all_waypoints: wps.clone(),
        spawn_points: wps.clone(),
        patrol_points: wps,
        colliders: Vec::new(),
    });
    sim.apply_config(BotsConfig {
        enabled: true,
        count,
        mobility: Mobility::Medium,
        chat_enabled: false,
    });
    sim.reconcile(1_000);
    sim
}

#[test]
fn late_joiner_gets_one_create_per_bot() {
    let mut sim = sim_with_bots(3);
    let spawn_msgs = sim.drain_outbox();
    let spawn_ids: Vec<(String, i64)> = spawn_msgs
        .iter()
        .map(|m| match m {
            EntityMsg::Create {
                network_id,
                last_owner_time,
                ..
            } => (network_id.clone(), *last_owner_time),
            other => panic!("expected create, got {other:?}"),
        })
        .collect();

    // Presence reported one new peer well after spawn.
    sim.tick(2_500);
    sim.drain_outbox();
    sim.full_sync();
    let msgs = sim.drain_outbox();
    assert_eq!(msgs.len(), 3);
    for m in &msgs {
        let EntityMsg::Create {
            network_id,
            last_owner_time,
            ..
        } = m
        else {
            panic!("full sync must replay creates, got {m:?}");
        };
        // Identity and ownership time survive the resync unchanged.
        assert!(spawn_ids
            .iter()
            .any(|(id, t)| id == network_id && t == last_owner_time));
        let v = m.to_value();
        assert_eq!(v["data"]["isFirstSync"], true);
    }
}

#[test]
fn full_sync_carries_the_live_segment_of_a_walking_bot() {
    let mut sim = sim_with_bots(1);
    sim.drain_outbox();
    sim.handle_command(
        &serde_json::json!({"bot_id": "bot-1", "type": "go_to_waypoint", "waypoint": "spawbot-2"}),
        2_000,
    );
    sim.drain_outbox();
    sim.full_sync();
    let msgs = sim.drain_outbox();
    assert_eq!(msgs.len(), 1);
    let EntityMsg::Create { path, .. } = &msgs[0] else {
        panic!("expected create");
    };
    assert!(path.dur > 0);
    assert!((path.ex - 6.0).abs() < 1e-5);
}

#[test]
fn shutdown_removes_every_bot_once() {
    let mut sim = sim_with_bots(3);
    sim.drain_outbox();
    sim.remove_all();
    let msgs = sim.drain_outbox();
    assert_eq!(msgs.len(), 3);
    let mut ids: Vec<String> = msgs
        .iter()
        .map(|m| match m {
            EntityMsg::Remove { network_id } => network_id.clone(),
            other => panic!("expected remove, got {other:?}"),
        })
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(sim.bots().is_empty());
    assert!(sim.reservations().is_empty());
}
