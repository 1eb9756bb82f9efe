//! `bot_core`: the per-room bot simulation.
//!
//! Pure state machine, no I/O: inbound commands and ticks mutate the
//! [`sim::BotSim`], which accumulates outbound entity messages in a drain
//! outbox the runner publishes over the channel. All time is caller-supplied
//! server-clock milliseconds, so tests drive the clock directly.

pub mod config;
pub mod records;
pub mod sim;

pub use config::{BotsConfig, Mobility, MAX_BOTS};
pub use records::{bot_id, network_id, BotRecord, BotState, Destination, Segment};
pub use sim::{BotSim, SimSettings};
