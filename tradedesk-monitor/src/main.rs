//! Tradedesk stream monitor
//!
//! Connects to the dashboard stream, keeps the configured subscriptions
//! alive and periodically logs the price and position read models.

use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradedesk_core::{Channel, StreamEvent, Subscription};
use tradedesk_stream::{StreamClient, StreamConfig};

const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tradedesk_stream=debug")),
        )
        .init();

    info!("Starting Tradedesk stream monitor");

    let mut config = StreamConfig::from_env()?;
    if config.initial_subscriptions.is_empty() {
        info!("STREAM_CHANNELS not set, following all prices and positions");
        config = config
            .with_subscription(Subscription::all(Channel::PRICES))
            .with_subscription(Subscription::all(Channel::POSITIONS));
    }
    for subscription in &config.initial_subscriptions {
        match &subscription.symbols {
            Some(symbols) => info!("Subscribing to {} {:?}", subscription.channel, symbols),
            None => info!("Subscribing to {} (all symbols)", subscription.channel),
        }
    }

    let report_every = report_interval()?;

    let mut client = StreamClient::websocket(config);
    let events = client.events();
    client.start()?;

    let event_logger = tokio::spawn(log_events(events));

    let mut ticker = interval_at(Instant::now() + report_every, report_every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report(&client);
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    client.stop().await?;
    event_logger.abort();
    Ok(())
}

fn report_interval() -> anyhow::Result<Duration> {
    let secs = match std::env::var("STREAM_REPORT_INTERVAL_SECS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("STREAM_REPORT_INTERVAL_SECS: {}", e))?,
        Err(_) => DEFAULT_REPORT_INTERVAL_SECS,
    };
    anyhow::ensure!(secs > 0, "STREAM_REPORT_INTERVAL_SECS must be positive");
    Ok(Duration::from_secs(secs))
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<StreamEvent>) {
    loop {
        match events.recv().await {
            Ok(StreamEvent::StateChanged { from, to }) => info!("Stream {} -> {}", from, to),
            Ok(StreamEvent::TransportError { message }) => warn!("Transport error: {}", message),
            Ok(StreamEvent::ReconnectScheduled { attempt, delay }) => {
                info!("Reconnect attempt {} in {:?}", attempt, delay)
            }
            Ok(StreamEvent::ReconnectExhausted { attempts }) => {
                warn!("Gave up after {} reconnect attempts", attempts)
            }
            Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn report(client: &StreamClient) {
    let prices = client.prices();
    let positions = client.positions();
    info!(
        "State: {} | {} prices | {} positions",
        client.state(),
        prices.len(),
        positions.len()
    );

    for symbol in prices.symbols() {
        if let Some(quote) = prices.get(&symbol) {
            info!(
                "  {} bid={} ask={} mid={} spread={} @ {}",
                quote.symbol, quote.bid, quote.ask, quote.mid, quote.spread, quote.timestamp
            );
        }
    }

    let snapshot = positions.snapshot();
    let total_profit: Decimal = snapshot
        .iter()
        .filter_map(|position| position.decimal_field("profit"))
        .sum();
    for position in &snapshot {
        match position.decimal_field("profit") {
            Some(profit) => info!("  {} profit={}", position.symbol, profit),
            None => info!("  {}", position.symbol),
        }
    }
    if !snapshot.is_empty() {
        info!("  Total profit: {}", total_profit);
    }
}
