use serde_json::{json, Value};
use supervisor::{RunnerState, Spawner, Supervisor, SupervisorCfg};

/// Records spawn/kill calls instead of touching the OS.
#[derive(Default)]
struct FakeSpawner {
    spawned: Vec<(String, u64)>,
    killed: Vec<String>,
    next_handle: u32,
    fail_count: u32,
}

impl Spawner for FakeSpawner {
    type Handle = u32;

    fn spawn(&mut self, hub_sid: &str, generation: u64) -> anyhow::Result<u32> {
        if self.fail_count > 0 {
            self.fail_count -= 1;
            anyhow::bail!("spawn refused");
        }
        self.spawned.push((hub_sid.to_string(), generation));
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn kill(&mut self, hub_sid: &str, _handle: &mut u32) {
        self.killed.push(hub_sid.to_string());
    }
}

fn cfg(max_active: usize) -> SupervisorCfg {
    SupervisorCfg {
        autostart: true,
        max_active_rooms: max_active,
        ..SupervisorCfg::default()
    }
}

fn sup(max_active: usize) -> Supervisor<FakeSpawner> {
    Supervisor::new(cfg(max_active), FakeSpawner::default())
}

fn bots(count: u32) -> Value {
    json!({"enabled": true, "count": count, "mobility": "medium", "chat_enabled": true})
}

#[test]
fn admission_and_queueing_promote_in_fifo_order() {
    let mut s = sup(1);
    let (_, state) = s.apply_room_config("hubA", &bots(2), 0);
    assert_eq!(state, RunnerState::Running);
    let (_, state) = s.apply_room_config("hubB", &bots(2), 0);
    assert_eq!(state, RunnerState::QueuedCapacity);

    let health = s.health();
    assert_eq!(health["active_rooms"], 1);
    assert_eq!(health["queued_rooms"], 1);
    assert_eq!(health["active_hubs"], json!(["hubA"]));
    assert_eq!(health["queued_hubs"], json!(["hubB"]));

    assert_eq!(s.room_stop("hubA"), RunnerState::Stopped);
    let health = s.health();
    assert_eq!(health["active_hubs"], json!(["hubB"]));
    assert_eq!(health["queued_hubs"], json!([]));
}

#[test]
fn ensure_is_idempotent_and_spawns_once() {
    let mut s = sup(2);
    let (_, first) = s.apply_room_config("hubA", &bots(1), 0);
    let (_, second) = s.apply_room_config("hubA", &bots(1), 10);
    assert_eq!(first, RunnerState::Running);
    assert_eq!(second, RunnerState::Running);
    assert_eq!(s.spawner().spawned.len(), 1);
}

#[test]
fn disabled_or_zero_count_config_stops_the_runner() {
    let mut s = sup(1);
    s.apply_room_config("hubA", &bots(2), 0);
    let (_, state) =
        s.apply_room_config("hubA", &json!({"enabled": false, "count": 2}), 10);
    assert_eq!(state, RunnerState::Stopped);
    assert_eq!(s.spawner().killed, vec!["hubA".to_string()]);
    assert_eq!(s.active_count(), 0);

    s.apply_room_config("hubB", &bots(0), 20);
    assert_eq!(s.active_count(), 0);
    assert_eq!(s.queued_count(), 0);
}

#[test]
fn autostart_disabled_never_spawns() {
    let mut s = Supervisor::new(
        SupervisorCfg {
            autostart: false,
            ..cfg(1)
        },
        FakeSpawner::default(),
    );
    let (_, state) = s.apply_room_config("hubA", &bots(2), 0);
    assert_eq!(state, RunnerState::Stopped);
    assert!(s.spawner().spawned.is_empty());
}

#[test]
fn count_is_clamped_to_the_room_ceiling() {
    let mut s = sup(1);
    let (bots_cfg, _) = s.apply_room_config("hubA", &bots(99), 0);
    assert_eq!(bots_cfg.count, SupervisorCfg::default().max_bots_per_room);
}

#[test]
fn capacity_bound_holds_across_arbitrary_call_sequences() {
    let hubs = ["h1", "h2", "h3", "h4", "h5"];
    let mut s = sup(2);
    // A fixed pseudo-random walk over config/stop operations.
    let mut x: u64 = 0x2545_f491_4f6c_dd1d;
    for step in 0..200u32 {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        let hub = hubs[(x as usize) % hubs.len()];
        match (x >> 8) % 3 {
            0 => {
                s.apply_room_config(hub, &bots(1 + (step % 3)), i64::from(step));
            }
            1 => {
                s.room_stop(hub);
            }
            _ => {
                s.apply_room_config(hub, &json!({"enabled": false}), i64::from(step));
            }
        }
        assert!(s.active_count() <= 2, "active overflow at step {step}");
        for hub in hubs {
            assert!(
                !(s.is_running(hub) && s.is_queued(hub)),
                "{hub} is both active and queued at step {step}"
            );
        }
    }
}

#[test]
fn exit_with_free_slot_schedules_a_restart_ticket() {
    let mut s = sup(1);
    s.apply_room_config("hubA", &bots(1), 0);
    let generation = s.spawner().spawned[0].1;

    let ticket = s.on_runner_exit("hubA", generation).expect("restart ticket");
    assert_eq!(ticket.hub_sid, "hubA");
    assert_eq!(s.active_count(), 0);

    s.on_restart_due(&ticket);
    assert!(s.is_running("hubA"));
    assert_eq!(s.spawner().spawned.len(), 2);
}

#[test]
fn room_stop_invalidates_a_pending_restart() {
    let mut s = sup(1);
    s.apply_room_config("hubA", &bots(1), 0);
    let generation = s.spawner().spawned[0].1;
    let ticket = s.on_runner_exit("hubA", generation).expect("restart ticket");

    s.room_stop("hubA");
    s.on_restart_due(&ticket);
    assert!(!s.is_running("hubA"));
    assert_eq!(s.spawner().spawned.len(), 1);
}

#[test]
fn stale_exit_events_are_ignored() {
    let mut s = sup(1);
    s.apply_room_config("hubA", &bots(1), 0);
    let old_generation = s.spawner().spawned[0].1;
    // Stop delivers SIGTERM and removes the slot; the exit event for the
    // killed child arrives afterwards.
    s.room_stop("hubA");
    assert!(s.on_runner_exit("hubA", old_generation).is_none());
    assert_eq!(s.active_count(), 0);
}

#[test]
fn exit_at_capacity_promotes_the_queue_and_requeues_the_room() {
    let mut s = sup(1);
    s.apply_room_config("hubA", &bots(1), 0);
    s.apply_room_config("hubB", &bots(1), 0);
    assert!(s.is_queued("hubB"));
    let generation = s.spawner().spawned[0].1;

    // hubA dies: a restart is scheduled for it, but hubB takes the slot
    // immediately, so the due restart lands hubA in the queue.
    let ticket = s.on_runner_exit("hubA", generation).expect("restart ticket");
    assert!(s.is_running("hubB"));
    s.on_restart_due(&ticket);
    assert!(s.is_queued("hubA"));
    assert!(!s.is_running("hubA"));
    assert_eq!(s.active_count(), 1);
}

#[test]
fn failed_spawn_leaves_the_room_queued_for_retry() {
    let mut s = sup(1);
    // Fail both the direct start and the immediate queue-fill retry.
    s.spawner_mut().fail_count = 2;
    let (_, state) = s.apply_room_config("hubA", &bots(1), 0);
    assert_eq!(state, RunnerState::QueuedCapacity);
    assert!(s.is_queued("hubA"));
    // The next config touch retries and succeeds.
    let (_, state) = s.apply_room_config("hubA", &bots(1), 10);
    assert_eq!(state, RunnerState::Running);
    assert_eq!(s.spawner().spawned.len(), 1);
}

#[test]
fn chat_rate_limit_gates_per_room() {
    let mut s = sup(1);
    assert!(s.chat_allowed("hubA", 0));
    assert!(!s.chat_allowed("hubA", 300));
    assert!(s.chat_allowed("hubB", 300));
    assert!(s.chat_allowed("hubA", 800));
}
