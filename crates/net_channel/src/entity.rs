//! Entity message schema for the networked-entity protocol.
//!
//! The wire format keys component slots by numeric strings (`"0"`, `"1"`);
//! internally the slots are typed. Creates and removes ride the best-effort
//! `naf` event; incremental updates ride `nafr`, whose payload wraps the
//! serialized message so the transport relays it reliably.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TEMPLATE_BOT_AVATAR: &str = "#remote-bot-avatar";

/// Slot 0: a clock-anchored straight-line path segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathComponent {
    pub sx: f32,
    pub sy: f32,
    pub sz: f32,
    pub ex: f32,
    pub ey: f32,
    pub ez: f32,
    pub t0: i64,
    pub dur: i64,
    pub yaw0: f32,
    pub yaw1: f32,
}

impl PathComponent {
    /// A zero-duration segment pinning the avatar at `pos` with `yaw`.
    #[must_use]
    pub fn freeze(pos: Vec3, yaw: f32, t0: i64) -> Self {
        Self {
            sx: pos.x,
            sy: pos.y,
            sz: pos.z,
            ex: pos.x,
            ey: pos.y,
            ez: pos.z,
            t0,
            dur: 0,
            yaw0: yaw,
            yaw1: yaw,
        }
    }

    #[must_use]
    pub fn segment(start: Vec3, end: Vec3, t0: i64, dur: i64, yaw0: f32, yaw1: f32) -> Self {
        Self {
            sx: start.x,
            sy: start.y,
            sz: start.z,
            ex: end.x,
            ey: end.y,
            ez: end.z,
            t0,
            dur,
            yaw0,
            yaw1,
        }
    }
}

/// Slot 1: identity metadata, sent only on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoComponent {
    pub bot_id: String,
    pub avatar_id: String,
    pub display_name: String,
    pub is_bot: bool,
}

/// One outbound entity message.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityMsg {
    Create {
        network_id: String,
        owner: String,
        creator: String,
        last_owner_time: i64,
        path: PathComponent,
        info: InfoComponent,
    },
    Update {
        network_id: String,
        owner: String,
        creator: String,
        last_owner_time: i64,
        path: PathComponent,
    },
    Remove {
        network_id: String,
    },
}

impl EntityMsg {
    /// Updates go out over the reliable `nafr` event; creates and removes
    /// over plain `naf`.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Update { .. })
    }

    /// Wire payload (`{dataType, data}`).
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Create {
                network_id,
                owner,
                creator,
                last_owner_time,
                path,
                info,
            } => json!({
                "dataType": "u",
                "data": {
                    "networkId": network_id,
                    "owner": owner,
                    "creator": creator,
                    "lastOwnerTime": last_owner_time,
                    "template": TEMPLATE_BOT_AVATAR,
                    "persistent": false,
                    "parent": null,
                    "components": {"0": path, "1": info},
                    "isFirstSync": true,
                }
            }),
            Self::Update {
                network_id,
                owner,
                creator,
                last_owner_time,
                path,
            } => json!({
                "dataType": "u",
                "data": {
                    "networkId": network_id,
                    "owner": owner,
                    "creator": creator,
                    "lastOwnerTime": last_owner_time,
                    "template": TEMPLATE_BOT_AVATAR,
                    "persistent": false,
                    "parent": null,
                    "components": {"0": path},
                }
            }),
            Self::Remove { network_id } => json!({
                "dataType": "r",
                "data": {"networkId": network_id}
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_create() -> EntityMsg {
        EntityMsg::Create {
            network_id: "room-bot-abc123-bot-1".into(),
            owner: "sess-1".into(),
            creator: "sess-1".into(),
            last_owner_time: 1000,
            path: PathComponent::freeze(Vec3::new(1.0, 0.0, 2.0), 90.0, 1000),
            info: InfoComponent {
                bot_id: "bot-1".into(),
                avatar_id: "https://example/avatar.glb".into(),
                display_name: "bot-1".into(),
                is_bot: true,
            },
        }
    }

    #[test]
    fn create_carries_both_slots_and_first_sync() {
        let v = sample_create().to_value();
        assert_eq!(v["dataType"], "u");
        let data = &v["data"];
        assert_eq!(data["isFirstSync"], true);
        assert_eq!(data["template"], TEMPLATE_BOT_AVATAR);
        assert_eq!(data["persistent"], false);
        assert!(data["parent"].is_null());
        assert_eq!(data["components"]["0"]["sx"], 1.0);
        assert_eq!(data["components"]["1"]["botId"], "bot-1");
        assert_eq!(data["components"]["1"]["isBot"], true);
    }

    #[test]
    fn update_has_single_slot_and_no_first_sync() {
        let msg = EntityMsg::Update {
            network_id: "room-bot-abc123-bot-2".into(),
            owner: "sess-1".into(),
            creator: "sess-1".into(),
            last_owner_time: 2000,
            path: PathComponent::segment(Vec3::ZERO, Vec3::new(3.0, 0.0, 4.0), 2450, 6667, 0.0, 36.9),
        };
        assert!(msg.is_reliable());
        let v = msg.to_value();
        let data = &v["data"];
        assert!(data.get("isFirstSync").is_none());
        assert!(data["components"].get("1").is_none());
        assert_eq!(data["components"]["0"]["dur"], 6667);
    }

    #[test]
    fn remove_is_minimal() {
        let msg = EntityMsg::Remove {
            network_id: "room-bot-abc123-bot-1".into(),
        };
        assert!(!msg.is_reliable());
        let v = msg.to_value();
        assert_eq!(v["dataType"], "r");
        assert_eq!(v["data"]["networkId"], "room-bot-abc123-bot-1");
        assert!(v["data"].get("components").is_none());
    }

    #[test]
    fn freeze_segment_is_zero_length() {
        let p = PathComponent::freeze(Vec3::new(5.0, 1.0, -2.0), 12.0, 99);
        assert_eq!((p.sx, p.sy, p.sz), (p.ex, p.ey, p.ez));
        assert_eq!(p.dur, 0);
        assert_eq!(p.yaw0, p.yaw1);
    }
}
