//! WebSocket channel client for one room.
//!
//! Connects to `{ws|wss}://<host>/socket/websocket`, joins `hub:<sid>`, then
//! pumps inbound frames into typed [`ChannelEvent`]s. Heartbeats run inside
//! [`HubChannel::next_event`] so callers just select on it.

use anyhow::{anyhow, bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::phoenix::{
    Frame, EVENT_ERROR, EVENT_HEARTBEAT, EVENT_JOIN, EVENT_LEAVE, EVENT_REPLY, TOPIC_PHOENIX,
};
use crate::presence::PresenceTracker;

const HEARTBEAT_SECS: u64 = 30;

/// What the join reply told us about the room.
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub session_id: String,
    pub scene_url: Option<String>,
    pub user_data: Option<Value>,
}

/// Inbound events the simulator cares about.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// `message` payload body with `type: "bot_command"`.
    BotCommand(Value),
    /// `hub_refresh` hub `user_data` (may carry a new bots config).
    HubRefresh(Value),
    /// Presence keys that appeared since the previous sync, own session
    /// excluded.
    PresenceJoined(Vec<String>),
}

pub struct HubChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    topic: String,
    session_id: String,
    join_ref: String,
    next_ref: u64,
    presence: PresenceTracker,
    heartbeat: tokio::time::Interval,
}

impl HubChannel {
    /// Connect, join `hub:<hub_sid>`, and return the join info. Any failure
    /// here is grounds for the process to exit non-zero.
    pub async fn connect(
        base_url: &Url,
        hub_sid: &str,
        access_key: Option<&str>,
    ) -> Result<(Self, JoinInfo)> {
        let ws_url = socket_url(base_url)?;
        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("connect websocket {ws_url}"))?;

        let mut join_payload = json!({
            "profile": {"displayName": "bot-runner", "avatarId": ""},
            "context": {"mobile": false, "embed": false, "hmd": false, "bot_runner": true},
        });
        if let Some(key) = access_key {
            join_payload["bot_access_key"] = json!(key);
        }

        let topic = format!("hub:{hub_sid}");
        let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_SECS));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut chan = Self {
            ws,
            topic: topic.clone(),
            session_id: String::new(),
            join_ref: "1".to_string(),
            next_ref: 1,
            presence: PresenceTracker::default(),
            heartbeat,
        };
        let join_ref = chan.join_ref.clone();
        chan.send_frame(Frame {
            join_ref: Some(join_ref.clone()),
            msg_ref: Some(join_ref.clone()),
            topic,
            event: EVENT_JOIN.to_string(),
            payload: join_payload,
        })
        .await?;

        let info = chan.await_join_reply(&join_ref).await?;
        chan.session_id = info.session_id.clone();
        Ok((chan, info))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn await_join_reply(&mut self, join_ref: &str) -> Result<JoinInfo> {
        loop {
            let msg = self
                .ws
                .next()
                .await
                .ok_or_else(|| anyhow!("socket closed before join reply"))??;
            let Message::Text(text) = msg else { continue };
            let frame = match Frame::decode(&text) {
                Ok(f) => f,
                Err(e) => {
                    log::debug!("undecodable frame before join reply: {e}");
                    continue;
                }
            };
            if frame.event == EVENT_REPLY && frame.msg_ref.as_deref() == Some(join_ref) {
                if !frame.is_ok_reply() {
                    bail!("channel join rejected: {}", frame.payload);
                }
                let response = &frame.payload["response"];
                let hub = response
                    .get("hubs")
                    .and_then(|h| h.get(0))
                    .ok_or_else(|| anyhow!("join reply missing hubs[0]"))?;
                let session_id = response
                    .get("session_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("join reply missing session_id"))?
                    .to_string();
                let scene_url = hub
                    .pointer("/scene/model_url")
                    .or_else(|| hub.get("scene_url"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let user_data = hub.get("user_data").cloned().filter(|v| !v.is_null());
                return Ok(JoinInfo {
                    session_id,
                    scene_url,
                    user_data,
                });
            }
            // Presence may land before the reply; fold it so the first sync
            // after join sees the whole room.
            self.presence.fold(&frame.event, &frame.payload);
        }
    }

    /// Wait for the next simulator-relevant event, servicing heartbeats.
    /// Errors are transport-fatal.
    pub async fn next_event(&mut self) -> Result<ChannelEvent> {
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => {
                    let frame = self.heartbeat_frame();
                    self.send_frame(frame).await?;
                }
                msg = self.ws.next() => {
                    let msg = msg.ok_or_else(|| anyhow!("socket stream ended"))??;
                    match msg {
                        Message::Text(text) => {
                            if let Some(event) = self.handle_frame(&text)? {
                                return Ok(event);
                            }
                        }
                        Message::Close(frame) => bail!("socket closed: {frame:?}"),
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, text: &str) -> Result<Option<ChannelEvent>> {
        let frame = match Frame::decode(text) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("undecodable inbound frame: {e}");
                return Ok(None);
            }
        };
        if frame.event == EVENT_ERROR && frame.topic == self.topic {
            bail!("channel errored: {}", frame.payload);
        }
        match frame.event.as_str() {
            EVENT_REPLY => {
                if !frame.is_ok_reply() && frame.topic != TOPIC_PHOENIX {
                    log::warn!("publish rejected on {}: {}", frame.topic, frame.payload);
                }
                Ok(None)
            }
            "message" => {
                let is_cmd =
                    frame.payload.get("type").and_then(Value::as_str) == Some("bot_command");
                let body = frame.payload.get("body");
                match (is_cmd, body) {
                    (true, Some(body)) if body.is_object() => {
                        Ok(Some(ChannelEvent::BotCommand(body.clone())))
                    }
                    _ => Ok(None),
                }
            }
            "hub_refresh" => {
                let user_data = frame
                    .payload
                    .pointer("/hubs/0/user_data")
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(Some(ChannelEvent::HubRefresh(user_data)))
            }
            "presence_state" | "presence_diff" => {
                self.presence.fold(&frame.event, &frame.payload);
                let joined = self.presence.sync(&self.session_id);
                if joined.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(ChannelEvent::PresenceJoined(joined)))
                }
            }
            _ => Ok(None),
        }
    }

    /// Fire-and-forget best-effort entity event.
    pub async fn publish_naf(&mut self, payload: &Value) -> Result<()> {
        let frame = self.push_frame("naf", payload.clone());
        self.send_frame(frame).await
    }

    /// Reliable entity update: payload is wrapped as `{naf: <json string>}`.
    pub async fn publish_nafr(&mut self, payload: &Value) -> Result<()> {
        let wrapped = json!({ "naf": payload.to_string() });
        let frame = self.push_frame("nafr", wrapped);
        self.send_frame(frame).await
    }

    /// Leave the topic and close the socket (clean shutdown only).
    pub async fn leave(&mut self) -> Result<()> {
        let frame = self.push_frame(EVENT_LEAVE, json!({}));
        self.send_frame(frame).await?;
        self.ws.close(None).await?;
        Ok(())
    }

    fn push_frame(&mut self, event: &str, payload: Value) -> Frame {
        Frame {
            join_ref: Some(self.join_ref.clone()),
            msg_ref: Some(self.bump_ref()),
            topic: self.topic.clone(),
            event: event.to_string(),
            payload,
        }
    }

    fn heartbeat_frame(&mut self) -> Frame {
        Frame {
            join_ref: None,
            msg_ref: Some(self.bump_ref()),
            topic: TOPIC_PHOENIX.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
        }
    }

    fn bump_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.ws
            .send(Message::Text(frame.encode()))
            .await
            .context("websocket send")
    }
}

/// Derive the socket endpoint from the HTTP base URL.
fn socket_url(base: &Url) -> Result<Url> {
    let mut ws = base.clone();
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    ws.set_scheme(scheme)
        .map_err(|()| anyhow!("cannot derive ws scheme from {base}"))?;
    ws.set_path("/socket/websocket");
    ws.set_query(Some("vsn=2.0.0"));
    Ok(ws)
}
