//! Real-time listener for Club Sincrónica
//!
//! Connects as a user, prints incoming chat messages and the unread notification count,
//! and runs until interrupted.
//!
//! Usage:
//!   cargo run --bin sincronica-listen -- 42
//!   SINCRONICA_USER_ID=42 cargo run --bin sincronica-listen
//!
//! Environment:
//! - SINCRONICA_API_URL: backend base URL (required)
//! - SINCRONICA_SOCKET_URL: socket endpoint (defaults to `<api>/ws`)
//! - SINCRONICA_LOG_FORMAT: `json` for structured log output
//! - RUST_LOG: log filter (defaults to `info`)

use std::env;

use anyhow::Context;
use sincronica_client::realtime::EnsureOutcome;
use sincronica_client::{AppContext, Config, Dispatch};
use sincronica_shared::{MessageEvent, UserId};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let raw_user = env::args()
        .nth(1)
        .or_else(|| env::var("SINCRONICA_USER_ID").ok())
        .context("user id required as first argument or SINCRONICA_USER_ID")?;
    let user_id = UserId::try_from(raw_user.as_str())?;

    let config = Config::from_env()?;
    let ctx = AppContext::new(config)?;

    ctx.connections.on_error(|err| {
        eprintln!("connection error: {err}");
    });

    let _subscription = ctx.bus.subscribe(|event: &MessageEvent| {
        println!(
            "[{}] {} -> {}: {}",
            event.conversation_id,
            event.sender_name.as_deref().unwrap_or("?"),
            event.receiver_id,
            event.text
        );
        Dispatch::Continue
    });

    if let Some(EnsureOutcome::Connecting(task)) = ctx.set_user(Some(user_id))? {
        match task.wait().await {
            Ok(session) => tracing::info!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                "Listening for messages"
            ),
            Err(e) => tracing::warn!(error = %e, "Initial connection failed"),
        }
    }

    match ctx.notifications.unread_count().await {
        Ok(count) => println!("{count} unread notification(s)"),
        Err(e) => tracing::warn!(error = %e, "Could not load notifications"),
    }
    let poller = ctx.spawn_notification_polling();

    tokio::signal::ctrl_c().await?;

    poller.abort();
    ctx.connections.disconnect();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("SINCRONICA_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
