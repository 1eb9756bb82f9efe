//! `supervisor`: admission control for ghost runners.
//!
//! One runner process per admitted room, at most `MAX_ACTIVE_ROOMS` at a
//! time; rooms beyond capacity wait in a FIFO queue. The core here is plain
//! synchronous state behind a spawner seam so tests drive it without real
//! processes; `process` provides the real child-process backend and `http`
//! the management API.

pub mod http;
pub mod process;

use std::collections::{HashMap, VecDeque};

use bot_core::BotsConfig;
use serde_json::{json, Value};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_MAX_ACTIVE_ROOMS: usize = 1;
pub const DEFAULT_MAX_BOTS_PER_ROOM: u32 = 5;
pub const DEFAULT_CHAT_RATE_LIMIT_MS: i64 = 700;
pub const RESTART_DELAY_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct SupervisorCfg {
    pub port: u16,
    pub bot_access_key: Option<String>,
    pub autostart: bool,
    pub runner_bin: String,
    pub hubs_base_url: String,
    pub max_active_rooms: usize,
    pub max_bots_per_room: u32,
    pub chat_rate_limit_ms: i64,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bot_access_key: None,
            autostart: false,
            runner_bin: "ghost-runner".to_string(),
            hubs_base_url: "https://meta-hubs.org".to_string(),
            max_active_rooms: DEFAULT_MAX_ACTIVE_ROOMS,
            max_bots_per_room: DEFAULT_MAX_BOTS_PER_ROOM,
            chat_rate_limit_ms: DEFAULT_CHAT_RATE_LIMIT_MS,
            llm_api_key: None,
            llm_model: None,
        }
    }
}

impl SupervisorCfg {
    /// Read everything from the environment, with defaults matching the
    /// deployment contract.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|s| !s.is_empty());
        Self {
            port: var("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            bot_access_key: var("BOT_ACCESS_KEY"),
            autostart: var("RUNNER_AUTOSTART").as_deref() == Some("true"),
            runner_bin: var("RUNNER_SCRIPT").unwrap_or_else(|| "ghost-runner".to_string()),
            hubs_base_url: var("HUBS_BASE_URL")
                .unwrap_or_else(|| "https://meta-hubs.org".to_string()),
            max_active_rooms: var("MAX_ACTIVE_ROOMS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ACTIVE_ROOMS),
            max_bots_per_room: var("MAX_BOTS_PER_ROOM")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_BOTS_PER_ROOM),
            chat_rate_limit_ms: var("CHAT_RATE_LIMIT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CHAT_RATE_LIMIT_MS),
            llm_api_key: var("LLM_API_KEY"),
            llm_model: var("LLM_MODEL"),
        }
    }

    #[must_use]
    pub fn llm_enabled(&self) -> bool {
        self.llm_api_key.is_some() && self.llm_model.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Running,
    QueuedCapacity,
    Stopped,
}

impl RunnerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::QueuedCapacity => "queued_capacity",
            Self::Stopped => "stopped",
        }
    }
}

/// Seam between the admission core and the operating system.
pub trait Spawner {
    type Handle;
    fn spawn(&mut self, hub_sid: &str, generation: u64) -> anyhow::Result<Self::Handle>;
    fn kill(&mut self, hub_sid: &str, handle: &mut Self::Handle);
}

#[derive(Debug, Clone)]
pub struct RoomEntry {
    pub bots: BotsConfig,
    pub updated_at_ms: i64,
}

struct RunnerSlot<H> {
    handle: H,
    generation: u64,
}

/// A due restart scheduled `RESTART_DELAY_MS` after a child exit. The
/// generation invalidates tickets that a later stop or exit superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartTicket {
    pub hub_sid: String,
    pub generation: u64,
}

pub struct Supervisor<S: Spawner> {
    pub cfg: SupervisorCfg,
    spawner: S,
    room_configs: HashMap<String, RoomEntry>,
    room_runners: HashMap<String, RunnerSlot<S::Handle>>,
    runner_queue: VecDeque<String>,
    pending_restart: HashMap<String, u64>,
    last_chat_at: HashMap<String, i64>,
    next_generation: u64,
}

impl<S: Spawner> Supervisor<S> {
    pub fn new(cfg: SupervisorCfg, spawner: S) -> Self {
        Self {
            cfg,
            spawner,
            room_configs: HashMap::new(),
            room_runners: HashMap::new(),
            runner_queue: VecDeque::new(),
            pending_restart: HashMap::new(),
            last_chat_at: HashMap::new(),
            next_generation: 0,
        }
    }

    /// `room-config`: store the normalised config and settle the runner.
    pub fn apply_room_config(
        &mut self,
        hub_sid: &str,
        bots: &Value,
        now_ms: i64,
    ) -> (BotsConfig, RunnerState) {
        let bots = BotsConfig::normalize(bots, self.cfg.max_bots_per_room);
        self.room_configs.insert(
            hub_sid.to_string(),
            RoomEntry {
                bots,
                updated_at_ms: now_ms,
            },
        );
        let state = self.ensure_runner_state(hub_sid);
        self.fill_queued_slots();
        (bots, state)
    }

    /// `room-stop`: forget the room entirely and free its slot.
    pub fn room_stop(&mut self, hub_sid: &str) -> RunnerState {
        self.room_configs.remove(hub_sid);
        self.stop_runner(hub_sid);
        self.fill_queued_slots();
        RunnerState::Stopped
    }

    /// Settle one room against its stored config. Idempotent: calling it
    /// twice in a row changes nothing.
    pub fn ensure_runner_state(&mut self, hub_sid: &str) -> RunnerState {
        let wants = self
            .room_configs
            .get(hub_sid)
            .is_some_and(|r| r.bots.wants_bots());
        if !wants {
            self.stop_runner(hub_sid);
            return RunnerState::Stopped;
        }
        if self.room_runners.contains_key(hub_sid) {
            self.dequeue(hub_sid);
            return RunnerState::Running;
        }
        if !self.cfg.autostart {
            self.dequeue(hub_sid);
            return RunnerState::Stopped;
        }
        if self.room_runners.len() < self.cfg.max_active_rooms {
            self.dequeue(hub_sid);
            match self.start_runner(hub_sid) {
                Ok(()) => RunnerState::Running,
                Err(e) => {
                    log::error!("failed to start runner for {hub_sid}: {e:#}");
                    self.enqueue(hub_sid);
                    RunnerState::QueuedCapacity
                }
            }
        } else {
            self.enqueue(hub_sid);
            RunnerState::QueuedCapacity
        }
    }

    /// A child exited. Returns a restart ticket the caller should fire after
    /// [`RESTART_DELAY_MS`], when the room still wants a runner and a slot
    /// was free at exit time.
    pub fn on_runner_exit(&mut self, hub_sid: &str, generation: u64) -> Option<RestartTicket> {
        match self.room_runners.get(hub_sid) {
            Some(slot) if slot.generation == generation => {}
            // A stop or replacement already superseded this child.
            _ => return None,
        }
        self.room_runners.remove(hub_sid);
        self.pending_restart.remove(hub_sid);

        let wants = self
            .room_configs
            .get(hub_sid)
            .is_some_and(|r| r.bots.wants_bots())
            && self.cfg.autostart;
        let ticket = if wants {
            if self.room_runners.len() < self.cfg.max_active_rooms {
                self.next_generation += 1;
                let generation = self.next_generation;
                self.pending_restart.insert(hub_sid.to_string(), generation);
                Some(RestartTicket {
                    hub_sid: hub_sid.to_string(),
                    generation,
                })
            } else {
                self.enqueue(hub_sid);
                None
            }
        } else {
            None
        };
        self.fill_queued_slots();
        ticket
    }

    /// The restart delay elapsed; start the room if the ticket still stands.
    pub fn on_restart_due(&mut self, ticket: &RestartTicket) {
        if self.pending_restart.get(&ticket.hub_sid) != Some(&ticket.generation) {
            return;
        }
        self.pending_restart.remove(&ticket.hub_sid);
        self.ensure_runner_state(&ticket.hub_sid);
        self.fill_queued_slots();
    }

    /// Promote queued rooms while slots are free.
    pub fn fill_queued_slots(&mut self) {
        while self.room_runners.len() < self.cfg.max_active_rooms {
            let Some(hub_sid) = self.runner_queue.pop_front() else {
                break;
            };
            let wants = self
                .room_configs
                .get(&hub_sid)
                .is_some_and(|r| r.bots.wants_bots())
                && self.cfg.autostart;
            if !wants {
                continue;
            }
            if let Err(e) = self.start_runner(&hub_sid) {
                log::error!("failed to promote queued room {hub_sid}: {e:#}");
                self.runner_queue.push_front(hub_sid);
                break;
            }
        }
    }

    /// Rate-limit gate for the chat boundary.
    pub fn chat_allowed(&mut self, hub_sid: &str, now_ms: i64) -> bool {
        if let Some(last) = self.last_chat_at.get(hub_sid) {
            if now_ms - last < self.cfg.chat_rate_limit_ms {
                return false;
            }
        }
        self.last_chat_at.insert(hub_sid.to_string(), now_ms);
        true
    }

    /// `/health` snapshot.
    #[must_use]
    pub fn health(&self) -> Value {
        let mut active_hubs: Vec<&String> = self.room_runners.keys().collect();
        active_hubs.sort();
        let queued_hubs: Vec<&String> = self.runner_queue.iter().collect();
        json!({
            "ok": true,
            "rooms": self.room_configs.len(),
            "active_rooms": self.room_runners.len(),
            "queued_rooms": self.runner_queue.len(),
            "max_active_rooms": self.cfg.max_active_rooms,
            "max_bots_per_room": self.cfg.max_bots_per_room,
            "llm_enabled": self.cfg.llm_enabled(),
            "model": self.cfg.llm_model.clone().unwrap_or_default(),
            "active_hubs": active_hubs,
            "queued_hubs": queued_hubs,
        })
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn spawner_mut(&mut self) -> &mut S {
        &mut self.spawner
    }

    pub fn active_count(&self) -> usize {
        self.room_runners.len()
    }

    pub fn queued_count(&self) -> usize {
        self.runner_queue.len()
    }

    pub fn is_running(&self, hub_sid: &str) -> bool {
        self.room_runners.contains_key(hub_sid)
    }

    pub fn is_queued(&self, hub_sid: &str) -> bool {
        self.runner_queue.iter().any(|h| h == hub_sid)
    }

    fn start_runner(&mut self, hub_sid: &str) -> anyhow::Result<()> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = self.spawner.spawn(hub_sid, generation)?;
        self.room_runners
            .insert(hub_sid.to_string(), RunnerSlot { handle, generation });
        Ok(())
    }

    fn stop_runner(&mut self, hub_sid: &str) {
        self.dequeue(hub_sid);
        self.pending_restart.remove(hub_sid);
        if let Some(mut slot) = self.room_runners.remove(hub_sid) {
            self.spawner.kill(hub_sid, &mut slot.handle);
        }
    }

    fn enqueue(&mut self, hub_sid: &str) {
        if !self.runner_queue.iter().any(|h| h == hub_sid) {
            self.runner_queue.push_back(hub_sid.to_string());
        }
    }

    fn dequeue(&mut self, hub_sid: &str) {
        self.runner_queue.retain(|h| h != hub_sid);
    }
}
