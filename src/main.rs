//! Command-line consumer of the cached odds client.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oddswatch::cache::{snapshot_stream, QueryCache};
use oddswatch::config::Config;
use oddswatch::feed::{Event, OddsClient};
use oddswatch::queries;
use oddswatch::utils::shutdown_signal;
use oddswatch::{metrics, OddsError};

/// Cached command-line client for The Odds API.
#[derive(Parser, Debug)]
#[command(name = "oddswatch")]
#[command(about = "Sports odds, live events, and scores from The Odds API")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this API key for the current invocation (stored like set-key).
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an API key and mark the client as configured.
    SetKey {
        /// The provider API key.
        key: String,
    },

    /// Probe the provider with a key without storing it.
    TestKey {
        /// The key to probe with.
        key: String,
    },

    /// List sports known to the provider.
    Sports,

    /// Show head-to-head odds for a sport.
    Odds {
        /// Sport key (e.g. soccer_epl).
        sport: String,

        /// Region set override (comma-separated, e.g. "eu,uk").
        #[arg(long)]
        regions: Option<String>,
    },

    /// Show in-play events for a sport.
    Live {
        /// Sport key.
        sport: String,
    },

    /// Show recent scores for a sport.
    Scores {
        /// Sport key.
        sport: String,

        /// Look-back window in days.
        #[arg(long)]
        days_from: Option<u32>,
    },

    /// Poll live events for a sport until interrupted.
    Watch {
        /// Sport key.
        sport: String,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    // Initialize logging
    let filter = if args.verbose || config.verbose {
        EnvFilter::new("oddswatch=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Command::SetKey { key } => cmd_set_key(&config, &key),
        Command::TestKey { key } => cmd_test_key(&config, &key).await,
        Command::Sports => cmd_sports(&config, args.api_key.as_deref()).await,
        Command::Odds { sport, regions } => {
            cmd_odds(&config, args.api_key.as_deref(), &sport, regions.as_deref()).await
        }
        Command::Live { sport } => cmd_live(&config, args.api_key.as_deref(), &sport).await,
        Command::Scores { sport, days_from } => {
            cmd_scores(&config, args.api_key.as_deref(), &sport, days_from).await
        }
        Command::Watch { sport } => cmd_watch(&config, args.api_key.as_deref(), &sport).await,
        Command::CheckConfig => cmd_check_config(&config),
    }
}

/// Build a client and activate a key for this session, preferring an
/// explicit `--api-key` over whatever the store or environment seeded.
fn activated_client(config: &Config, api_key: Option<&str>) -> anyhow::Result<Arc<OddsClient>> {
    config.validate().map_err(anyhow::Error::msg)?;

    let client = Arc::new(OddsClient::new(config)?);
    let key = match api_key {
        Some(key) => key.to_string(),
        None => client.api_key(),
    };

    // A restored key only counts as configured once re-set in this session.
    if !key.is_empty() {
        client.set_api_key(&key)?;
    }

    Ok(client)
}

fn cmd_set_key(config: &Config, key: &str) -> anyhow::Result<()> {
    let client = Arc::new(OddsClient::new(config)?);
    client.set_api_key(key)?;
    println!("API key {} stored in {}", mask(key), config.key_store_path);
    println!("Run `oddswatch test-key <key>` to probe it against the provider.");
    Ok(())
}

async fn cmd_test_key(config: &Config, key: &str) -> anyhow::Result<()> {
    let client = Arc::new(OddsClient::new(config)?);
    match client.test_connection(key).await {
        Ok(_) => {
            println!("Key {} accepted by the provider.", mask(key));
            if let Some(quota) = client.quota() {
                if let Some(remaining) = quota.remaining {
                    println!("Requests remaining this period: {}", remaining);
                }
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", queries::user_message(&e)),
    }
}

async fn cmd_sports(config: &Config, api_key: Option<&str>) -> anyhow::Result<()> {
    let client = activated_client(config, api_key)?;
    let cache = QueryCache::new();

    let query = queries::sports_query(&cache, &client);
    let snap = query.fetch().await;
    let sports = unwrap_snapshot(snap.data, snap.error)?;

    println!("{} sports", sports.len());
    for sport in sports.iter() {
        let flag = if sport.active { "active" } else { "inactive" };
        println!("{:<32} {:<16} {} ({})", sport.key, sport.group, sport.title, flag);
    }
    Ok(())
}

async fn cmd_odds(
    config: &Config,
    api_key: Option<&str>,
    sport: &str,
    regions: Option<&str>,
) -> anyhow::Result<()> {
    let client = activated_client(config, api_key)?;

    // An explicit region override bypasses the cached query, which always
    // uses the configured default region set.
    let events = match regions {
        Some(regions) => client
            .get_odds(sport, Some(regions))
            .await
            .map_err(|e| anyhow::Error::msg(queries::user_message(&e)))?,
        None => {
            let cache = QueryCache::new();
            let query = queries::odds_query(&cache, &client, sport);
            let snap = query.fetch().await;
            let events = unwrap_snapshot(snap.data, snap.error)?;
            events.as_ref().clone()
        }
    };

    print_events(&events);
    Ok(())
}

async fn cmd_live(config: &Config, api_key: Option<&str>, sport: &str) -> anyhow::Result<()> {
    let client = activated_client(config, api_key)?;
    let cache = QueryCache::new();

    let query = queries::live_events_query(&cache, &client, sport);
    let snap = query.fetch().await;
    let events = unwrap_snapshot(snap.data, snap.error)?;

    print_events(&events);
    Ok(())
}

async fn cmd_scores(
    config: &Config,
    api_key: Option<&str>,
    sport: &str,
    days_from: Option<u32>,
) -> anyhow::Result<()> {
    let client = activated_client(config, api_key)?;

    let events = match days_from {
        Some(days) => client
            .get_scores(sport, Some(days))
            .await
            .map_err(|e| anyhow::Error::msg(queries::user_message(&e)))?,
        None => {
            let cache = QueryCache::new();
            let query = queries::scores_query(&cache, &client, sport);
            let snap = query.fetch().await;
            let events = unwrap_snapshot(snap.data, snap.error)?;
            events.as_ref().clone()
        }
    };

    println!("{} events", events.len());
    for event in &events {
        println!("{} vs {} ({})", event.home_team, event.away_team, event.commence_time);
    }
    Ok(())
}

async fn cmd_watch(config: &Config, api_key: Option<&str>, sport: &str) -> anyhow::Result<()> {
    let client = activated_client(config, api_key)?;
    let cache = QueryCache::new();

    if config.metrics_enabled {
        let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(port = config.metrics_port, "Prometheus exporter listening");
    }

    let query = queries::live_events_query(&cache, &client, sport);
    let updates = snapshot_stream(&query);
    futures::pin_mut!(updates);

    info!(sport, "Watching live events, ctrl-c to stop");
    query.fetch().await;

    let shutdown = shutdown_signal();
    futures::pin_mut!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            maybe = updates.next() => match maybe {
                Some(snap) => {
                    if let Some(e) = &snap.error {
                        warn!("{}", queries::user_message(e));
                    }
                    if let Some(events) = &snap.data {
                        print_events(events);
                    }
                }
                None => break,
            },
        }
    }

    info!("Watch stopped");
    Ok(())
}

fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("ODDSWATCH - CONFIGURATION CHECK");
    println!("======================================================================");
    println!("Base URL:        {}", config.odds_base_url);
    println!("Key store:       {}", config.key_store_path);
    println!("Default regions: {}", config.default_regions);
    println!("Scores window:   {} day(s)", config.scores_days_from);
    println!("HTTP timeout:    {} ms", config.http_timeout_ms);
    println!(
        "Metrics:         {}",
        if config.metrics_enabled {
            format!("enabled on port {}", config.metrics_port)
        } else {
            "disabled".to_string()
        }
    );

    let client = OddsClient::new(config)?;
    let key = client.api_key();
    if key.is_empty() {
        println!("API key:         not set (run `oddswatch set-key <key>`)");
    } else {
        println!("API key:         {}", mask(&key));
    }

    match config.validate() {
        Ok(()) => {
            println!("Configuration OK");
            Ok(())
        }
        Err(e) => anyhow::bail!("Configuration invalid: {}", e),
    }
}

/// Resolve a query snapshot into data or a user-facing error.
fn unwrap_snapshot<T>(
    data: Option<Arc<T>>,
    error: Option<Arc<OddsError>>,
) -> anyhow::Result<Arc<T>> {
    match (data, error) {
        (Some(data), _) => Ok(data),
        (None, Some(e)) => anyhow::bail!("{}", queries::user_message(&e)),
        (None, None) => anyhow::bail!(
            "No API key configured. Run `oddswatch set-key <key>` or pass --api-key."
        ),
    }
}

fn print_events(events: &[Event]) {
    println!("{} events", events.len());
    for event in events {
        println!(
            "{} vs {} ({})",
            event.home_team,
            event.away_team,
            event.commence_str()
        );
        for bookmaker in &event.bookmakers {
            for market in &bookmaker.markets {
                let quotes: Vec<String> = market
                    .outcomes
                    .iter()
                    .map(|o| format!("{} @ {}", o.name, o.price))
                    .collect();
                println!("  {:<16} {}", bookmaker.title, quotes.join("  "));
            }
        }
    }
}

fn mask(key: &str) -> String {
    if key.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &key[..4])
    }
}
