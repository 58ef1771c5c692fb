//! pf-collect - point-and-figure market data collector.
//!
//! Streams quotes from a market data provider over a secure WebSocket
//! connection and hands each frame to the collection pipeline.

use pf_collect::collector::Collector;
use pf_collect::config::Config;
use pf_collect::feed;
use pf_collect::stream::{StopScheduler, StreamClient};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        host = %config.stream.host,
        port = config.stream.port,
        tickers = config.collect.tickers.len(),
        "Starting pf-collect"
    );

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (client, handle) = StreamClient::new(config.stream.endpoint(), frames_tx);

    handle.set_stop_callback(|| info!("stream client stopped"));

    // The subscribe request is queued now and flushed once the upgrade
    // handshake completes.
    if !config.collect.tickers.is_empty() {
        let api_key = config.stream.api_key.as_deref().unwrap_or_default();
        handle.send(feed::subscribe_frame(
            config.collect.provider,
            api_key,
            &config.collect.tickers,
        ));
    }

    // Shutdown sends the provider farewell first, so the feed drops the
    // subscription server-side before the connection goes away.
    let farewell = (!config.collect.tickers.is_empty()).then(|| {
        feed::unsubscribe_frame(
            config.collect.provider,
            config.stream.api_key.as_deref().unwrap_or_default(),
            &config.collect.tickers,
        )
    });

    // Stop on Ctrl-C.
    {
        let handle = handle.clone();
        let farewell = farewell.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; stopping");
                if let Some(frame) = farewell {
                    handle.send(frame);
                }
                handle.stop();
            }
        });
    }

    // Optional max-runtime policy via the deferred stop scheduler.
    let mut scheduler = StopScheduler::new();
    if let Some(secs) = config.collect.max_runtime_secs {
        let handle = handle.clone();
        let farewell = farewell.clone();
        info!(secs, "max runtime configured");
        scheduler.schedule(Duration::from_secs(secs), move || {
            if let Some(frame) = farewell {
                handle.send(frame);
            }
            handle.stop();
        });
    }

    let consumer = tokio::spawn(Collector::new().run(frames_rx));

    client
        .run(config.stream.connect_timeout(), config.stream.read_timeout())
        .await;

    scheduler.cancel();
    let collector = consumer.await?;
    info!(
        frames = collector.frames_seen(),
        bytes = collector.bytes_seen(),
        "collection finished"
    );

    Ok(())
}
