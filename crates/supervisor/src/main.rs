use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use supervisor::process::{ProcessSpawner, RunnerEvent};
use supervisor::{http, Supervisor, SupervisorCfg, RESTART_DELAY_MS};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Developer-friendly default logging (info+) unless RUST_LOG overrides
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let cfg = SupervisorCfg::from_env();
    log::info!(
        "bot-supervisor: max_active_rooms={} max_bots_per_room={} autostart={}",
        cfg.max_active_rooms,
        cfg.max_bots_per_room,
        cfg.autostart
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<RunnerEvent>();
    let spawner = ProcessSpawner::new(&cfg, events_tx);
    let port = cfg.port;
    let sup = Arc::new(Mutex::new(Supervisor::new(cfg, spawner)));

    // Child-exit pump: restart with backoff when the room still wants bots.
    let exit_sup = sup.clone();
    tokio::spawn(async move {
        while let Some(RunnerEvent::Exited { hub_sid, generation }) = events_rx.recv().await {
            let ticket = exit_sup.lock().await.on_runner_exit(&hub_sid, generation);
            if let Some(ticket) = ticket {
                let restart_sup = exit_sup.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(RESTART_DELAY_MS)).await;
                    restart_sup.lock().await.on_restart_due(&ticket);
                });
            }
        }
    });

    let app = http::router(sup);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
