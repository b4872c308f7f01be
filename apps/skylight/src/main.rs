use anyhow::{Context, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skylight_client_core::api::HttpApi;
use skylight_client_core::config::Config;
use skylight_client_core::settings::{Settings, SettingsStore};
use skylight_client_core::sync::{ScopeFilter, SyncController, View};
use skylight_client_core::telemetry::logging::{self, LogConfig, LogLevel};
use skylight_client_core::transport::sse::SseTransport;

#[derive(Parser, Debug)]
#[command(name = "skylight", about = "Headless monitor for the gateway dashboard")]
struct Cli {
    /// Gateway base URL (falls back to saved settings, then SKYLIGHT_SERVER)
    #[arg(long)]
    server: Option<String>,

    /// Dashboard API key (falls back to saved settings)
    #[arg(long, env = "SKYLIGHT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Polling fallback period in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Restrict history and logs to one user
    #[arg(long)]
    user: Option<String>,

    /// Follow the live log stream instead of the overview
    #[arg(long)]
    follow_logs: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Settings file location
    #[arg(long, default_value = ".skylight.json")]
    settings_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })
    .context("failed to initialize logging")?;

    let store = SettingsStore::new(&cli.settings_file);
    let saved = store.load();

    let mut config = Config::from_env();
    if let Some(server) = cli.server.as_deref().or(saved.server_url.as_deref()) {
        config = config.with_server_url(server);
    }
    if let Some(secs) = cli.interval {
        config.poll_interval = Duration::from_secs(secs.max(1));
    }

    let api_key = cli
        .api_key
        .clone()
        .or(saved.api_key.clone())
        .ok_or_else(|| anyhow!("no API key: pass --api-key or set SKYLIGHT_API_KEY"))?;

    let api = Arc::new(HttpApi::new(&config.server_url)?);
    let transport = Arc::new(SseTransport::new()?);
    let controller = SyncController::new(config.clone(), api, transport);

    controller
        .start_session(&api_key)
        .await
        .context("could not start dashboard session")?;

    // --follow-logs wins; otherwise come back up in the last active view.
    let view = if cli.follow_logs {
        View::Logs
    } else {
        saved
            .active_view
            .as_deref()
            .and_then(View::parse)
            .unwrap_or_default()
    };
    store.save(&Settings {
        api_key: Some(api_key),
        server_url: Some(config.server_url.clone()),
        active_view: Some(view.as_str().to_string()),
    });

    if let Some(user) = cli.user.clone() {
        controller
            .on_user_scope_filter_changed(ScopeFilter::User(user))
            .await;
    }
    if view != View::Overview {
        controller.on_view_focus_changed(view).await;
    }

    let follow_logs = view == View::Logs;
    run(&controller, follow_logs).await;

    controller.end_session().await;
    Ok(())
}

/// Print a one-line state summary per period (or new log lines when
/// following) until Ctrl-C.
async fn run(controller: &SyncController, follow_logs: bool) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut printed_logs = 0usize;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !controller.is_authenticated() {
                    eprintln!("session expired, exiting");
                    return;
                }
                let snapshot = controller.snapshot();
                if follow_logs {
                    let logs = &snapshot.logs;
                    // The buffer evicts from the front; re-sync the cursor
                    // when it moved past us.
                    if printed_logs > logs.len() {
                        printed_logs = 0;
                    }
                    for entry in &logs[printed_logs..] {
                        println!("[{}] [{}] {}", entry.timestamp, entry.level, entry.message);
                    }
                    printed_logs = logs.len();
                } else {
                    let total = snapshot
                        .stats
                        .get("requests")
                        .and_then(|r| r.get("total"))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    let pool = snapshot
                        .browser_pool
                        .get("instances")
                        .and_then(|v| v.as_array())
                        .map(|a| a.len())
                        .unwrap_or(0);
                    println!(
                        "feed={} requests={} history={} pool={} logs={}",
                        controller.feed_state().as_str(),
                        total,
                        snapshot.history.len(),
                        pool,
                        snapshot.logs.len(),
                    );
                }
                if let Some(toast) = controller.take_toast() {
                    eprintln!("! {}", toast.message);
                }
            }
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    eprintln!("shutting down");
                }
                return;
            }
        }
    }
}
