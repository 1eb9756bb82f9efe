//! Phoenix V2 array serializer: `[join_ref, ref, topic, event, payload]`.
//!
//! Only the handful of events the runner speaks are named here; anything
//! else passes through as an opaque `(event, payload)` pair.

use anyhow::{bail, Result};
use serde_json::{json, Value};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const TOPIC_PHOENIX: &str = "phoenix";

/// One wire frame, either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl Frame {
    #[must_use]
    pub fn encode(&self) -> String {
        let arr = json!([
            self.join_ref,
            self.msg_ref,
            self.topic,
            self.event,
            self.payload,
        ]);
        arr.to_string()
    }

    pub fn decode(text: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(text)?;
        let Some(arr) = v.as_array() else {
            bail!("phoenix frame is not an array");
        };
        if arr.len() != 5 {
            bail!("phoenix frame has {} elements, expected 5", arr.len());
        }
        let opt_str = |v: &Value| v.as_str().map(str::to_string);
        let Some(topic) = arr[2].as_str() else {
            bail!("phoenix frame topic is not a string");
        };
        let Some(event) = arr[3].as_str() else {
            bail!("phoenix frame event is not a string");
        };
        Ok(Self {
            join_ref: opt_str(&arr[0]),
            msg_ref: opt_str(&arr[1]),
            topic: topic.to_string(),
            event: event.to_string(),
            payload: arr[4].clone(),
        })
    }

    /// True for `phx_reply` frames carrying `status: "ok"`.
    #[must_use]
    pub fn is_ok_reply(&self) -> bool {
        self.event == EVENT_REPLY
            && self.payload.get("status").and_then(Value::as_str) == Some("ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let f = Frame {
            join_ref: Some("1".into()),
            msg_ref: Some("7".into()),
            topic: "hub:abc123".into(),
            event: "naf".into(),
            payload: json!({"dataType": "u"}),
        };
        let decoded = Frame::decode(&f.encode()).expect("decode");
        assert_eq!(decoded, f);
    }

    #[test]
    fn null_refs_decode_to_none() {
        let f = Frame::decode(r#"[null,null,"hub:x","presence_diff",{}]"#).expect("decode");
        assert_eq!(f.join_ref, None);
        assert_eq!(f.msg_ref, None);
        assert_eq!(f.event, "presence_diff");
    }

    #[test]
    fn non_array_frames_are_rejected() {
        assert!(Frame::decode(r#"{"topic":"hub:x"}"#).is_err());
        assert!(Frame::decode(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn ok_reply_detection() {
        let ok = Frame::decode(r#"["1","1","hub:x","phx_reply",{"status":"ok","response":{}}]"#)
            .expect("decode");
        assert!(ok.is_ok_reply());
        let err =
            Frame::decode(r#"["1","1","hub:x","phx_reply",{"status":"error"}]"#).expect("decode");
        assert!(!err.is_ok_reply());
    }
}
