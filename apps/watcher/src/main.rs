//! Watchlist quote watcher.
//!
//! Connects to a quote server, subscribes to the requested symbols and
//! prints each live update.

use clap::Parser;
use std::collections::HashSet;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tickfeed_core::{AuthToken, ChangeSign, Symbol};
use tickfeed_feeds::{FeedConfig, FeedEvent, QuoteFeed, WsTransport};

/// Quote watcher CLI
#[derive(Parser, Debug)]
#[command(name = "tickfeed-watcher")]
#[command(about = "Watch live stock quotes from a quote server", long_about = None)]
struct Args {
    /// Quote server WebSocket URL
    #[arg(short, long, default_value = "wss://localhost:8443/quotes")]
    url: String,

    /// Bearer token for the quote server
    #[arg(short, long, env = "TICKFEED_TOKEN", hide_env_values = true)]
    token: String,

    /// Symbols to watch (exchange codes, e.g. 005930)
    #[arg(required = true)]
    symbols: Vec<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn parse_watchlist(codes: &[String]) -> Result<HashSet<Symbol>, String> {
    codes
        .iter()
        .map(|code| Symbol::new(code).map_err(|e| format!("invalid symbol {code:?}: {e}")))
        .collect()
}

fn sign_marker(sign: ChangeSign) -> char {
    match sign {
        ChangeSign::Up => '▲',
        ChangeSign::Down => '▼',
        ChangeSign::Flat => '-',
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let watchlist = match parse_watchlist(&args.symbols) {
        Ok(watchlist) => watchlist,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let (transport, transport_events) = WsTransport::new(FeedConfig::new(&args.url));
    let (feed, mut events) = QuoteFeed::new(transport, transport_events);

    if let Err(e) = feed.connect(&AuthToken::new(args.token)).await {
        error!("connect failed: {e}");
        std::process::exit(1);
    }
    info!(url = %args.url, symbols = watchlist.len(), "watching");

    if let Err(e) = feed.reconcile(&watchlist).await {
        error!("subscription failed: {e}");
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(FeedEvent::Quote { symbol, quote }) => {
                    println!(
                        "{symbol}  {}  {} {}",
                        quote.price,
                        sign_marker(quote.change_sign),
                        quote.change_amount,
                    );
                }
                Some(FeedEvent::Connected) => info!("connected"),
                Some(FeedEvent::Reconnected) => info!("reconnected"),
                Some(FeedEvent::Disconnected) => warn!("disconnected"),
                None => {
                    warn!("feed closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                if let Err(e) = feed.disconnect().await {
                    warn!("disconnect failed: {e}");
                }
                break;
            }
        }
    }
}
