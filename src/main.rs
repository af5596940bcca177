//! Slackbridge - Slack-Matrix chat bridge
//!
//! Relays messages between linked Slack channels and Matrix rooms, posting
//! as linked users where possible and as lazily provisioned ghost users and
//! puppets otherwise.

mod bridge;
mod common;
mod config;
mod db;
mod matrix;
mod slack;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use backon::BackoffBuilder;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bridge::{Bridge, ClientFactory, HttpClientFactory, Provisioner, RoomLinks, UserLinks};
use common::{ClientResult, EchoSuppresser};
use config::{env::get_config_path, load_and_validate, Config};
use db::Database;
use matrix::{MatrixListener, MatrixUser};
use slack::{ChannelMembers, SlackListener, SlackUser};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Slackbridge v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Homeserver: {} ({})", config.matrix.homeserver_url, config.matrix.homeserver_name);
    info!("  Slack API: {}", config.slack.api_url);
    info!("  Database: {}", config.bridge.database);

    let db = Arc::new(Database::open(Path::new(&config.bridge.database))?);
    let echo = Arc::new(match config.bridge.echo_retention_secs {
        Some(secs) => EchoSuppresser::with_retention(Duration::from_secs(secs)),
        None => EchoSuppresser::new(),
    });
    let factory = Arc::new(HttpClientFactory::new(reqwest::Client::new(), &config));

    let rooms = Arc::new(RoomLinks::load(Arc::clone(&db))?);
    let users = Arc::new(UserLinks::load(Arc::clone(&db), factory.as_ref())?);
    apply_config_links(&config, &rooms, &users, factory.as_ref());

    let members = Arc::new(ChannelMembers::new());
    let slack_users = users.real_slack_users();
    for channel in rooms.slack_channels() {
        for user in &slack_users {
            members.add(&channel, Arc::clone(user));
        }
        debug!(channel = %channel, members = members.len(&channel), "Seeded channel members");
    }

    let provisioner = Provisioner::new(
        Arc::clone(&users),
        Arc::clone(&members),
        factory.clone(),
        factory.matrix_service()?,
        &config.bridge.user_prefix,
        &config.matrix.homeserver_name,
    );
    let bridge = Arc::new(Bridge::new(
        Arc::clone(&rooms),
        provisioner,
        Arc::clone(&echo),
        config.matrix.media_base_url(),
    ));

    // ============================================================
    // Spawn receive loops
    // ============================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    for user in &slack_users {
        let listener = Arc::new(SlackListener::new(
            user.id.clone(),
            factory.http_slack(user.client.access_token()),
            Arc::clone(&bridge),
            Arc::clone(&echo),
        ));
        let name = format!("slack {}", listener.user_id());
        tasks.push(tokio::spawn(reconnect_loop(name, shutdown_rx.clone(), move |rx| {
            let listener = Arc::clone(&listener);
            async move { listener.run(rx).await }
        })));
    }

    for user in users.real_matrix_users() {
        let client = user.client();
        let client = match factory.http_matrix(client.access_token(), client.homeserver()) {
            Ok(client) => client,
            Err(e) => {
                warn!(user = user.user_id(), "Not polling Matrix events: {}", e);
                continue;
            }
        };
        let listener = Arc::new(MatrixListener::new(
            user.user_id(),
            client,
            Arc::clone(&bridge),
            Arc::clone(&echo),
        ));
        let name = format!("matrix {}", listener.user_id());
        tasks.push(tokio::spawn(reconnect_loop(name, shutdown_rx.clone(), move |rx| {
            let listener = Arc::clone(&listener);
            async move { listener.run(rx).await }
        })));
    }

    info!(loops = tasks.len(), "Bridge running");

    shutdown_signal().await;
    info!("Shutdown signal received - stopping receive loops...");

    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed (loops already exited): {}", e);
    }
    let timeout = Duration::from_secs(5);
    match tokio::time::timeout(timeout, futures::future::join_all(tasks)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    warn!("Receive loop task panicked: {}", e);
                }
            }
            info!("Receive loops stopped");
        }
        Err(_) => warn!("Receive loops did not stop in time"),
    }

    info!("Exiting...");
    Ok(())
}

/// Apply the room and user links listed in the config file.
///
/// Conflicting links are logged and skipped.
fn apply_config_links(config: &Config, rooms: &RoomLinks, users: &UserLinks, factory: &dyn ClientFactory) {
    for link in &config.links {
        if let Err(e) = rooms.link(&link.slack, &link.matrix) {
            warn!(slack = %link.slack, matrix = %link.matrix, "Skipping room link: {}", e);
        }
    }

    for link in &config.users {
        let matrix_client = match factory.matrix(&link.matrix_token, &config.matrix.homeserver_url) {
            Ok(client) => client,
            Err(e) => {
                warn!(matrix = %link.matrix_user, "Skipping user link: {}", e);
                continue;
            }
        };
        let slack = Arc::new(SlackUser::new(link.slack_user.clone(), factory.slack(&link.slack_token)));
        let matrix = Arc::new(MatrixUser::new(link.matrix_user.clone(), matrix_client));
        if let Err(e) = users.link(slack, matrix) {
            warn!(slack = %link.slack_user, matrix = %link.matrix_user, "Skipping user link: {}", e);
        }
    }
}

/// Create an exponential backoff iterator for receive loop restarts.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn reconnect_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Run a receive loop, restarting it with backoff until shutdown.
async fn reconnect_loop<F, Fut>(name: String, mut shutdown_rx: watch::Receiver<bool>, mut run: F)
where
    F: FnMut(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = ClientResult<()>>,
{
    let mut backoff = reconnect_backoff();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match run(shutdown_rx.clone()).await {
            Ok(()) => {
                info!("{} disconnected", name);
                backoff = reconnect_backoff();
            }
            Err(e) => error!("{} failed: {}", name, e),
        }

        if *shutdown_rx.borrow() {
            break;
        }

        let delay = backoff.next().unwrap_or(Duration::from_secs(300));
        info!("Reconnecting {} in {:.1} seconds...", name, delay.as_secs_f64());

        // Wait for delay OR shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received during backoff");
                    break;
                }
            }
        }
    }

    debug!("{} stopped", name);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
