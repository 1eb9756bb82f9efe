//! The per-room state machine.
//!
//! One [`BotSim`] owns every live [`BotRecord`], the waypoint reservation
//! index, and an outbox of entity messages. The runner drives it with the
//! server clock: `reconcile` every 3 s, `tick` every 100 ms, plus inbound
//! command/refresh/presence callbacks between ticks.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use net_channel::{EntityMsg, InfoComponent, PathComponent};
use scene_map::geom::{is_path_clear, DEFAULT_EPS};
use scene_map::{SceneMap, Waypoint};

use crate::config::{BotsConfig, MAX_BOTS};
use crate::records::{
    bot_id, network_id, normalize_deg, BotRecord, BotState, Destination, Segment,
};

/// Squared XZ distance below which two bots count as stacked.
const SEPARATION_DIST2: f32 = 0.6 * 0.6;
/// Squared XZ distance below which a patrol point is "where I already am".
const TOO_CLOSE_DIST2: f32 = 0.04;
/// Walks shorter than this are not worth animating.
const MIN_WALK_DISTANCE: f32 = 0.08;
/// Idle pause after aborting a degenerate walk.
const ABORT_IDLE_MS: i64 = 800;
/// How many shuffled patrol candidates get a line-of-sight check.
const PATROL_LOS_TRIES: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct SimSettings {
    /// `false` disables every collider check (`GHOST_RAYCAST_MODE`).
    pub raycast_enabled: bool,
    /// Lead time before a published segment starts animating.
    pub path_start_delay_ms: i64,
    pub min_walk_duration_ms: i64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            raycast_enabled: true,
            path_start_delay_ms: 450,
            min_walk_duration_ms: 600,
        }
    }
}

pub struct BotSim {
    hub_sid: String,
    session_id: String,
    settings: SimSettings,
    config: BotsConfig,
    scene: SceneMap,
    avatars: Vec<String>,
    avatar_rotation: u32,
    bots: BTreeMap<u32, BotRecord>,
    reservations: HashMap<String, String>,
    outbox: Vec<EntityMsg>,
    rng: StdRng,
}

impl BotSim {
    pub fn new(hub_sid: &str, session_id: &str, settings: SimSettings, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let avatar_rotation = rng.gen_range(0..1000);
        Self {
            hub_sid: hub_sid.to_string(),
            session_id: session_id.to_string(),
            settings,
            config: BotsConfig::default(),
            scene: SceneMap::default(),
            avatars: Vec::new(),
            avatar_rotation,
            bots: BTreeMap::new(),
            reservations: HashMap::new(),
            outbox: Vec::new(),
            rng,
        }
    }

    pub fn set_scene(&mut self, scene: SceneMap) {
        log::info!(
            "scene: {} waypoints, {} spawn, {} patrol, {} colliders",
            scene.all_waypoints.len(),
            scene.spawn_points.len(),
            scene.patrol_points.len(),
            scene.colliders.len()
        );
        self.scene = scene;
    }

    pub fn set_avatars(&mut self, refs: Vec<String>) {
        self.avatars = refs;
    }

    /// Deterministic avatar pick for `bot-<n>`, rotated by the per-process
    /// offset so rooms do not all start with the same avatar.
    #[must_use]
    pub fn avatar_for(&self, n: u32) -> String {
        if self.avatars.is_empty() {
            return String::new();
        }
        let idx = ((n - 1) as usize + self.avatar_rotation as usize) % self.avatars.len();
        self.avatars[idx].clone()
    }

    pub fn config(&self) -> &BotsConfig {
        &self.config
    }

    pub fn apply_config(&mut self, config: BotsConfig) {
        self.config = config;
    }

    /// Replace the config from hub `user_data` when it carries a `bots` key.
    pub fn apply_user_data(&mut self, user_data: &Value) {
        if let Some(bots) = user_data.get("bots") {
            let config = BotsConfig::normalize(bots, MAX_BOTS);
            log::info!("bots config now {config:?}");
            self.config = config;
        }
    }

    pub fn bots(&self) -> &BTreeMap<u32, BotRecord> {
        &self.bots
    }

    pub fn reservations(&self) -> &HashMap<String, String> {
        &self.reservations
    }

    /// Take everything queued for publishing.
    pub fn drain_outbox(&mut self) -> Vec<EntityMsg> {
        std::mem::take(&mut self.outbox)
    }

    /// Align membership with the config: kill surplus records, spawn missing
    /// ones, then re-apply mobility to everyone.
    pub fn reconcile(&mut self, now_ms: i64) {
        let cfg = self.config;
        if !cfg.wants_bots() {
            self.remove_all();
            return;
        }
        let desired = cfg.count.min(MAX_BOTS);
        let surplus: Vec<u32> = self
            .bots
            .keys()
            .copied()
            .filter(|n| *n > desired)
            .collect();
        for n in surplus {
            self.remove_bot(n);
        }
        for n in 1..=desired {
            if !self.bots.contains_key(&n) {
                self.spawn_bot(n, now_ms);
            }
        }
        // Config changes take effect on the next planned walk; a segment
        // already in flight finishes at its old speed.
        for rec in self.bots.values_mut() {
            rec.mobility = cfg.mobility;
        }
    }

    /// One 100 ms step: integrate positions, fire due state transitions.
    pub fn tick(&mut self, now_ms: i64) {
        let ids: Vec<u32> = self.bots.keys().copied().collect();
        for n in ids {
            let due = {
                let Some(rec) = self.bots.get_mut(&n) else { continue };
                if let Some(path) = rec.path {
                    rec.position = path.position_at(now_ms);
                }
                (now_ms >= rec.state_ends_at_ms).then_some(rec.state)
            };
            match due {
                Some(BotState::Idle) => self.start_walking(n, None, now_ms),
                Some(BotState::Walk) => self.set_idle(n, now_ms),
                None => {}
            }
        }
    }

    /// Inbound `bot_command` body. Unknown bots and types are ignored.
    pub fn handle_command(&mut self, body: &Value, now_ms: i64) {
        let kind = body.get("type").and_then(Value::as_str);
        if kind != Some("go_to_waypoint") {
            log::debug!("ignoring bot_command type {kind:?}");
            return;
        }
        let Some(id) = body.get("bot_id").and_then(Value::as_str) else {
            return;
        };
        let Some(n) = id
            .strip_prefix("bot-")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| self.bots.contains_key(n))
        else {
            log::debug!("bot_command for unknown bot {id}");
            return;
        };
        let Some(waypoint) = body.get("waypoint").and_then(Value::as_str) else {
            return;
        };
        self.start_walking(n, Some(waypoint), now_ms);
    }

    /// A peer joined: replay a full create for every live bot so its empty
    /// local state catches up. Idempotent on the peer via stable network ids.
    pub fn full_sync(&mut self) {
        let creates: Vec<EntityMsg> = self.bots.values().map(|r| self.create_msg(r)).collect();
        self.outbox.extend(creates);
    }

    /// Remove every bot, announcing each removal. Used for disable, shutdown,
    /// and room teardown.
    pub fn remove_all(&mut self) {
        let ids: Vec<u32> = self.bots.keys().copied().collect();
        for n in ids {
            self.remove_bot(n);
        }
    }

    fn remove_bot(&mut self, n: u32) {
        if let Some(mut rec) = self.bots.remove(&n) {
            if let Some(name) = rec.reserved_target_name.take() {
                self.reservations.remove(&name);
            }
            self.outbox.push(EntityMsg::Remove {
                network_id: rec.network_id,
            });
        }
    }

    fn spawn_bot(&mut self, n: u32, now_ms: i64) {
        let list = if self.scene.spawn_points.is_empty() {
            &self.scene.patrol_points
        } else {
            &self.scene.spawn_points
        };
        let base = if list.is_empty() {
            Vec3::ZERO
        } else {
            list[(n as usize - 1) % list.len()].position
        };
        let placed: Vec<Vec3> = self.bots.values().map(|r| r.position).collect();
        let position = separate_nearby(base, &placed, n);
        let id = bot_id(n);
        let rec = BotRecord {
            index: n,
            network_id: network_id(&self.hub_sid, &id),
            bot_id: id,
            last_owner_time_ms: now_ms,
            position,
            home_position: position,
            yaw_deg: self.rng.gen_range(0.0..360.0),
            state: BotState::Idle,
            state_ends_at_ms: now_ms + self.config.mobility.initial_idle_ms(&mut self.rng),
            mobility: self.config.mobility,
            destination: None,
            reserved_target_name: None,
            path: None,
        };
        let msg = self.create_msg(&rec);
        self.outbox.push(msg);
        self.bots.insert(n, rec);
    }

    fn create_msg(&self, rec: &BotRecord) -> EntityMsg {
        let path = rec
            .path
            .map(|p| p.to_component())
            .unwrap_or_else(|| PathComponent::freeze(rec.position, rec.yaw_deg, rec.last_owner_time_ms));
        EntityMsg::Create {
            network_id: rec.network_id.clone(),
            owner: self.session_id.clone(),
            creator: self.session_id.clone(),
            last_owner_time: rec.last_owner_time_ms,
            path,
            info: InfoComponent {
                bot_id: rec.bot_id.clone(),
                avatar_id: self.avatar_for(rec.index),
                display_name: rec.bot_id.clone(),
                is_bot: true,
            },
        }
    }

    fn line_clear(&self, from: Vec3, to: Vec3) -> bool {
        !self.settings.raycast_enabled
            || is_path_clear(from, to, &self.scene.colliders, DEFAULT_EPS)
    }

    /// Plan and announce a walk. `desired` comes from a chat command; `None`
    /// is an autonomous patrol/wander pick.
    pub fn start_walking(&mut self, n: u32, desired: Option<&str>, now_ms: i64) {
        // Start from where the bot visibly is right now.
        let (cur_pos, home, current_dest, id) = {
            let Some(rec) = self.bots.get_mut(&n) else { return };
            if let Some(path) = rec.path {
                rec.position = path.position_at(now_ms);
            }
            (
                rec.position,
                rec.home_position,
                rec.destination.as_ref().and_then(|d| d.name.clone()),
                rec.bot_id.clone(),
            )
        };

        let picked: Option<Waypoint> = match desired {
            Some(name) => {
                let Some(wp) = self
                    .scene
                    .all_waypoints
                    .iter()
                    .find(|w| w.name.eq_ignore_ascii_case(name))
                    .cloned()
                else {
                    log::debug!("{id}: unknown waypoint '{name}'");
                    return;
                };
                if !self.line_clear(cur_pos, wp.position) {
                    log::debug!("{id}: line of sight to '{}' blocked", wp.name);
                    return;
                }
                Some(wp)
            }
            None => self.pick_patrol_point(&id, cur_pos, current_dest.as_deref()),
        };

        let (dest_name, raw_target) = match picked {
            Some(wp) => (Some(wp.name), wp.position),
            None => {
                let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
                let radius = self.rng.gen_range(0.8..2.0);
                let target = Vec3::new(
                    home.x + radius * angle.cos(),
                    cur_pos.y,
                    home.z + radius * angle.sin(),
                );
                (None, target)
            }
        };

        // Reservation swap: drop the old claim, take the new one (named
        // targets only).
        if let Some(prev) = self
            .bots
            .get_mut(&n)
            .and_then(|r| r.reserved_target_name.take())
        {
            self.reservations.remove(&prev);
        }
        if let Some(name) = &dest_name {
            if let Some(prev_owner) = self.reservations.insert(name.clone(), id.clone()) {
                // A relaxed pick may steal a claimed slot; the old holder
                // loses its claim and plans fresh on its next walk.
                if let Some(m) = prev_owner
                    .strip_prefix("bot-")
                    .and_then(|s| s.parse::<u32>().ok())
                {
                    if let Some(other) = self.bots.get_mut(&m) {
                        other.reserved_target_name = None;
                    }
                }
            }
        }

        // Spawn-time separation semantics: planning nudges against nobody.
        let target = separate_nearby(raw_target, &[], n);

        let dx = target.x - cur_pos.x;
        let dz = target.z - cur_pos.z;
        let distance = (dx * dx + dz * dz).sqrt();

        let min_walk_duration_ms = self.settings.min_walk_duration_ms;
        let path_start_delay_ms = self.settings.path_start_delay_ms;
        let session_id = self.session_id.clone();

        let Some(rec) = self.bots.get_mut(&n) else { return };
        rec.reserved_target_name = dest_name.clone();
        if distance <= MIN_WALK_DISTANCE {
            rec.path = None;
            rec.state = BotState::Idle;
            rec.state_ends_at_ms = now_ms + ABORT_IDLE_MS;
            return;
        }

        let speed = rec.mobility.speed_mps().max(0.05);
        let duration = ((1000.0 * distance / speed) as i64).max(min_walk_duration_ms);
        let t0 = now_ms + path_start_delay_ms;
        let yaw1 = normalize_deg(dx.atan2(dz).to_degrees());
        let segment = Segment {
            start: cur_pos,
            end: target,
            t0_ms: t0,
            duration_ms: duration,
            yaw0_deg: rec.yaw_deg,
            yaw1_deg: yaw1,
        };
        rec.state = BotState::Walk;
        rec.destination = Some(Destination {
            name: dest_name,
            position: target,
        });
        rec.path = Some(segment);
        rec.state_ends_at_ms = t0 + duration;
        rec.yaw_deg = yaw1;
        let msg = EntityMsg::Update {
            network_id: rec.network_id.clone(),
            owner: session_id.clone(),
            creator: session_id,
            last_owner_time: rec.last_owner_time_ms,
            path: segment.to_component(),
        };
        self.outbox.push(msg);
    }

    /// Stop at the interpolated position and dwell.
    pub fn set_idle(&mut self, n: u32, now_ms: i64) {
        let session_id = self.session_id.clone();
        let Some(rec) = self.bots.get_mut(&n) else { return };
        if let Some(path) = rec.path {
            rec.position = path.position_at(now_ms);
        }
        rec.destination = None;
        if let Some(name) = rec.reserved_target_name.take() {
            self.reservations.remove(&name);
        }
        rec.path = None;
        rec.state = BotState::Idle;
        let (lo, hi) = rec.mobility.idle_range_ms();
        rec.state_ends_at_ms = now_ms + self.rng.gen_range(lo..hi);
        let msg = EntityMsg::Update {
            network_id: rec.network_id.clone(),
            owner: session_id.clone(),
            creator: session_id,
            last_owner_time: rec.last_owner_time_ms,
            path: PathComponent::freeze(rec.position, rec.yaw_deg, now_ms),
        };
        self.outbox.push(msg);
    }

    /// Patrol target choice: avoid our own destination, other bots' claims,
    /// and the spot we are standing on; relax the latter two when nothing
    /// survives. Up to [`PATROL_LOS_TRIES`] shuffled candidates get a
    /// line-of-sight check before giving up on visibility.
    fn pick_patrol_point(
        &mut self,
        id: &str,
        from: Vec3,
        current_dest: Option<&str>,
    ) -> Option<Waypoint> {
        if self.scene.patrol_points.is_empty() {
            return None;
        }
        let not_current = |w: &Waypoint| current_dest.map_or(true, |d| w.name != d);
        let strict: Vec<Waypoint> = self
            .scene
            .patrol_points
            .iter()
            .filter(|w| {
                not_current(w)
                    && self
                        .reservations
                        .get(&w.name)
                        .map_or(true, |owner| owner == id)
                    && xz_dist2(w.position, from) > TOO_CLOSE_DIST2
            })
            .cloned()
            .collect();
        let relaxed: Vec<Waypoint> = self
            .scene
            .patrol_points
            .iter()
            .filter(|w| not_current(w))
            .cloned()
            .collect();
        let mut pool = if strict.is_empty() {
            relaxed.clone()
        } else {
            strict
        };
        pool.shuffle(&mut self.rng);
        for w in pool.iter().take(PATROL_LOS_TRIES) {
            if self.line_clear(from, w.position) {
                return Some(w.clone());
            }
        }
        relaxed.choose(&mut self.rng).cloned()
    }
}

/// Push `target` radially when at least one already-placed bot crowds it on
/// the XZ plane. Only meaningful for `n >= 2`.
fn separate_nearby(target: Vec3, placed: &[Vec3], n: u32) -> Vec3 {
    if n < 2 {
        return target;
    }
    let conflicts = placed
        .iter()
        .filter(|p| xz_dist2(**p, target) < SEPARATION_DIST2)
        .count();
    if conflicts == 0 {
        return target;
    }
    let angle = (n - 1) as f32 * std::f32::consts::FRAC_PI_3;
    let radius = 0.8 + (conflicts.min(2) as f32) * 0.2;
    Vec3::new(
        target.x + radius * angle.cos(),
        target.y,
        target.z + radius * angle.sin(),
    )
}

fn xz_dist2(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}
