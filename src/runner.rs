//! The per-room main loop.
//!
//! Wiring order: prime the clock, join the channel (fatal on failure), pull
//! the scene and avatar catalog (best effort), then tick the simulator at
//! 100 ms against the estimated server clock. Inbound channel events mutate
//! the simulator between ticks; SIGTERM/SIGINT tears everything down
//! cleanly.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use url::Url;

use bot_core::{BotSim, SimSettings};
use net_channel::{ChannelEvent, HubChannel};

use crate::avatars;
use crate::timekeeper::{Timekeeper, REFRESH_INTERVAL_SECS};

const TICK_MS: u64 = 100;
const RECONCILE_SECS: u64 = 3;
const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RunnerOpts {
    pub base_url: Url,
    pub hub_sid: String,
    pub access_key: Option<String>,
    pub settings: SimSettings,
}

/// Read the simulator knobs from the environment.
#[must_use]
pub fn settings_from_env() -> SimSettings {
    let defaults = SimSettings::default();
    SimSettings {
        raycast_enabled: std::env::var("GHOST_RAYCAST_MODE")
            .map_or(true, |v| v == "spoke_colliders"),
        path_start_delay_ms: env_ms("PATH_START_DELAY_MS", defaults.path_start_delay_ms),
        min_walk_duration_ms: env_ms("MIN_WALK_DURATION_MS", defaults.min_walk_duration_ms),
    }
}

fn env_ms(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub async fn run(opts: RunnerOpts) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("build http client")?;

    let mut timekeeper = Timekeeper::new(client.clone(), opts.base_url.clone());
    timekeeper.prime().await;

    let (mut chan, join) = HubChannel::connect(
        &opts.base_url,
        &opts.hub_sid,
        opts.access_key.as_deref(),
    )
    .await
    .context("join room channel")?;
    log::info!("joined hub:{} as session {}", opts.hub_sid, join.session_id);

    let mut sim = BotSim::new(&opts.hub_sid, &join.session_id, opts.settings, rand::random());
    if let Some(user_data) = &join.user_data {
        sim.apply_user_data(user_data);
    }

    match &join.scene_url {
        Some(url) => {
            let scene = scene_map::fetch::fetch_model_json(&client, url)
                .await
                .and_then(|gltf| scene_map::extract::extract_scene(&gltf));
            match scene {
                Ok(scene) => sim.set_scene(scene),
                Err(e) => log::warn!("scene extraction failed ({e}); bots wander near origin"),
            }
        }
        None => log::warn!("join reply carried no scene url; bots wander near origin"),
    }

    match avatars::fetch_featured(&client, &opts.base_url).await {
        Ok(catalog) => sim.set_avatars(catalog.preferred().to_vec()),
        Err(e) => log::warn!("avatar listing fetch failed: {e:#}"),
    }

    sim.reconcile(timekeeper.now_ms());
    publish_outbox(&mut chan, &mut sim).await?;

    let mut tick = tokio::time::interval(Duration::from_millis(TICK_MS));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let period = |secs: u64| {
        let d = Duration::from_secs(secs);
        let mut iv = tokio::time::interval_at(tokio::time::Instant::now() + d, d);
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        iv
    };
    let mut reconcile_tick = period(RECONCILE_SECS);
    let mut avatar_tick = period(avatars::REFRESH_INTERVAL_SECS);
    let mut time_tick = period(REFRESH_INTERVAL_SECS);
    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                sim.tick(timekeeper.now_ms());
                publish_outbox(&mut chan, &mut sim).await?;
            }
            _ = reconcile_tick.tick() => {
                sim.reconcile(timekeeper.now_ms());
                publish_outbox(&mut chan, &mut sim).await?;
            }
            _ = avatar_tick.tick() => {
                match avatars::fetch_featured(&client, &opts.base_url).await {
                    Ok(catalog) => sim.set_avatars(catalog.preferred().to_vec()),
                    Err(e) => log::debug!("avatar refresh failed: {e:#}"),
                }
            }
            _ = time_tick.tick() => {
                timekeeper.sample().await;
            }
            event = chan.next_event() => {
                match event.context("room channel")? {
                    ChannelEvent::BotCommand(body) => {
                        sim.handle_command(&body, timekeeper.now_ms());
                    }
                    ChannelEvent::HubRefresh(user_data) => {
                        sim.apply_user_data(&user_data);
                    }
                    ChannelEvent::PresenceJoined(keys) => {
                        for key in keys {
                            log::info!("presence join {key}; replaying bot creates");
                            sim.full_sync();
                        }
                    }
                }
                publish_outbox(&mut chan, &mut sim).await?;
            }
            _ = sigterm.recv() => {
                log::info!("SIGTERM received");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("SIGINT received");
                break;
            }
        }
    }

    // Clean shutdown: peers see the bots leave before the socket drops.
    sim.remove_all();
    publish_outbox(&mut chan, &mut sim).await?;
    if let Err(e) = chan.leave().await {
        log::debug!("channel leave failed during shutdown: {e:#}");
    }
    Ok(())
}

async fn publish_outbox(chan: &mut HubChannel, sim: &mut BotSim) -> Result<()> {
    for msg in sim.drain_outbox() {
        let payload = msg.to_value();
        if msg.is_reliable() {
            chan.publish_nafr(&payload).await?;
        } else {
            chan.publish_naf(&payload).await?;
        }
    }
    Ok(())
}
