use clap::Parser;
use url::Url;

use ghost_runner::runner::{self, RunnerOpts};

#[derive(Parser)]
#[command(name = "ghost-runner", about = "Headless bot participant for realtime 3D rooms")]
struct Cli {
    /// Base URL of the room server
    #[arg(long, default_value = "https://meta-hubs.org")]
    url: String,
    /// Room id (hub sid) to join
    #[arg(long)]
    room: Option<String>,
    /// Set by the supervisor when it spawns us; informational only
    #[arg(long)]
    runner: bool,
}

#[tokio::main]
async fn main() {
    // Developer-friendly default logging (info+) unless RUST_LOG overrides
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
    let cli = Cli::parse();
    let Some(room) = cli.room else {
        eprintln!("error: --room <hub_sid> is required");
        std::process::exit(1);
    };
    log::info!(
        "ghost-runner starting for room {room}{}",
        if cli.runner { " (supervised)" } else { "" }
    );
    let base_url = match Url::parse(&cli.url) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("error: invalid --url '{}': {e}", cli.url);
            std::process::exit(1);
        }
    };
    let opts = RunnerOpts {
        base_url,
        hub_sid: room,
        access_key: std::env::var("BOT_ACCESS_KEY").ok().filter(|s| !s.is_empty()),
        settings: runner::settings_from_env(),
    };
    if let Err(e) = runner::run(opts).await {
        log::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
