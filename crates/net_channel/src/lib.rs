//! `net_channel`: typed access to a room's realtime channel.
//!
//! Scope
//! - Phoenix V2 array framing with join/heartbeat/ref bookkeeping
//! - Entity message schema (`naf` create/remove, `nafr` reliable updates)
//! - A WebSocket client that joins `hub:<sid>`, folds presence events, and
//!   surfaces inbound commands
//!
//! Transport failures after the initial join are fatal by design: the caller
//! exits non-zero and the supervisor restarts the runner.

pub mod client;
pub mod entity;
pub mod phoenix;
pub mod presence;

pub use client::{ChannelEvent, HubChannel, JoinInfo};
pub use entity::{EntityMsg, InfoComponent, PathComponent};
