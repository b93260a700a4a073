use anyhow::Result;
use chat_socket::bin_common::{config_path, init_tracing};
use chat_socket::channelsocket::{ExponentialBackoff, Payload, Socket};
use chat_socket::config::ProbeConfig;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = config_path();
    let config = ProbeConfig::load(&config_path)?;

    init_tracing(&config.log_level);
    info!("Config file: {}", config_path.display());
    config.log();

    let socket = chat_socket::channelsocket::builder()
        .socket_config(config.socket_config())
        .url(config.url.clone())
        .params(config.params.clone())
        .reconnect_strategy(ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            config.reconnect_max_attempts,
        ))
        .build()?;

    // Channels do not survive a reconnect; join again on every connect
    let (connected_tx, mut connected_rx) = unbounded_channel();
    socket.on_connect(move || {
        let _ = connected_tx.send(());
    });
    socket.on_disconnect(|reason| match reason {
        Some(reason) => warn!("Disconnected: {}", reason),
        None => info!("Disconnected"),
    });

    socket.connect()?;
    print_banner(&config);

    let mut stats = tokio::time::interval(Duration::from_secs(60));
    stats.tick().await;

    loop {
        tokio::select! {
            Some(()) = connected_rx.recv() => join_topics(&socket, &config),
            _ = stats.tick() => {
                let metrics = socket.metrics();
                info!(
                    "Stats: state={:?} sent={} received={} dropped={} heartbeats={} reconnects={}",
                    metrics.connection_state,
                    metrics.messages_sent,
                    metrics.messages_received,
                    metrics.frames_dropped,
                    metrics.heartbeats_sent,
                    metrics.reconnect_count,
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    socket.disconnect();
    print_shutdown();
    Ok(())
}

fn join_topics(socket: &Socket, config: &ProbeConfig) {
    for topic in &config.topics {
        let channel = socket.channel(topic, Payload::new());

        for event in config.events.iter().map(String::as_str).chain(["phx_error", "phx_close"]) {
            let label = format!("{} {}", topic, event);
            channel.on(event, move |payload| {
                info!("[{}] {}", label, serde_json::Value::Object(payload.clone()));
            });
        }

        let ok_topic = topic.clone();
        let err_topic = topic.clone();
        channel
            .join(Payload::new())
            .receive("ok", move |_| info!("Joined {}", ok_topic))
            .receive("error", move |response| {
                error!("Failed to join {}: {}", err_topic, response)
            });
    }
}

fn print_banner(config: &ProbeConfig) {
    info!("");
    info!("========================================");
    info!("Starting channel probe");
    info!("Endpoint: {}", config.url);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown() {
    info!("");
    info!("========================================");
    info!("Channel probe stopped gracefully");
    info!("========================================");
}
