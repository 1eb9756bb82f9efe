//! ghost-runner: a headless participant that joins one room and animates a
//! small cohort of bot avatars for everyone else in it.
//!
//! The binary is spawned per room by the supervisor (`bot-supervisor`). Its
//! pieces: a server-clock estimator, an avatar catalog, and the main loop
//! that wires `scene_map`, `net_channel`, and `bot_core` together on a
//! 100 ms tick.

pub mod avatars;
pub mod runner;
pub mod timekeeper;
