//! ReplayLab CLI: headless replay, indicator dump, catalog and data commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use replaylab_core::catalog::{IndicatorCatalog, IndicatorConfig, JsonFileStore, Placement};
use replaylab_core::config::SessionConfig;
use replaylab_core::data::{
    load_candles, write_candles, CandleRequest, CircuitBreaker, DataSource, LoadedCandles,
    LocalCandleFile, PolygonProvider, RemoteCandleSource, Timespan,
};
use replaylab_core::domain::{PositionSide, Timeframe, Trade};
use replaylab_core::session::{Session, SessionCommand, SessionHandle, SessionSnapshot};
use tracing::{info, warn};

const DEFAULT_CATALOG_PATH: &str = "replaylab-catalog.json";

#[derive(Parser)]
#[command(name = "replaylab", about = "Market replay and paper-trading simulator")]
struct Cli {
    /// Path to a session TOML file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Step through history headlessly and report the account afterwards.
    Replay {
        /// Local CSV file, overrides data.csv_path.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Skip the remote provider even when configured.
        #[arg(long)]
        offline: bool,

        /// Display timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w).
        #[arg(long)]
        timeframe: Option<Timeframe>,

        /// Candles to reveal before stopping.
        #[arg(long, default_value_t = 100)]
        steps: usize,

        /// Open a position after the first candle: long or short.
        #[arg(long)]
        open: Option<String>,

        /// Position size in units.
        #[arg(long, default_value_t = 1000.0)]
        size: f64,

        #[arg(long)]
        stop_loss: Option<f64>,

        #[arg(long)]
        take_profit: Option<f64>,

        /// Run on the session thread with the play timer for this many
        /// seconds instead of stepping.
        #[arg(long)]
        realtime_secs: Option<u64>,

        /// Print the final snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compute the enabled indicators over the full history and print the
    /// latest values.
    Indicators {
        #[arg(long)]
        csv: Option<PathBuf>,

        #[arg(long)]
        offline: bool,

        #[arg(long)]
        timeframe: Option<Timeframe>,

        #[arg(long)]
        json: bool,
    },

    /// Manage the persisted indicator catalog.
    Catalog {
        /// Catalog file, overrides catalog_path.
        #[arg(long)]
        path: Option<PathBuf>,

        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Download candles from the remote provider into a CSV file.
    Fetch {
        /// Pair like EUR/USD or BTC-USD, overrides the configured pair.
        #[arg(long)]
        pair: Option<String>,

        #[arg(long, default_value_t = 1)]
        multiplier: u32,

        /// minute, hour, day or week.
        #[arg(long, default_value = "hour")]
        timespan: String,

        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Environment variable holding the API key.
        #[arg(long, default_value = "POLYGON_API_KEY")]
        api_key_env: String,

        /// Output CSV file. Only a summary is printed when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List every entry with its parameters.
    List,

    /// Add an indicator. Params are key=value pairs.
    Add {
        id: String,
        /// Indicator name, e.g. RSI, EMA, "Bollinger Bands".
        name: String,
        /// Draw on the price chart instead of a separate panel.
        #[arg(long)]
        overlay: bool,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,
        #[arg(long)]
        disabled: bool,
    },

    Remove {
        id: String,
    },

    Toggle {
        id: String,
    },

    /// Merge one parameter into an entry.
    SetParam {
        id: String,
        key: String,
        value: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Replay {
            csv,
            offline,
            timeframe,
            steps,
            open,
            size,
            stop_loss,
            take_profit,
            realtime_secs,
            json,
        } => {
            let order = match open.as_deref() {
                Some(side) => Some(OrderArgs {
                    side: parse_side(side)?,
                    size,
                    stop_loss,
                    take_profit,
                }),
                None => None,
            };
            run_replay(
                &config,
                csv.as_deref(),
                offline,
                timeframe,
                steps,
                order,
                realtime_secs,
                json,
            )
        }
        Commands::Indicators {
            csv,
            offline,
            timeframe,
            json,
        } => run_indicators(&config, csv.as_deref(), offline, timeframe, json),
        Commands::Catalog { path, action } => {
            let path = path
                .or_else(|| config.catalog_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH));
            run_catalog(&path, action)
        }
        Commands::Fetch {
            pair,
            multiplier,
            timespan,
            days,
            api_key_env,
            out,
        } => {
            let pair = pair.unwrap_or_else(|| config.pair.clone());
            run_fetch(
                &pair,
                multiplier,
                parse_timespan(&timespan)?,
                days,
                &api_key_env,
                out.as_deref(),
            )
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|e| anyhow::anyhow!("invalid log filter: {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

struct OrderArgs {
    side: PositionSide,
    size: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

#[allow(clippy::too_many_arguments)]
fn run_replay(
    config: &SessionConfig,
    csv: Option<&Path>,
    offline: bool,
    timeframe: Option<Timeframe>,
    steps: usize,
    order: Option<OrderArgs>,
    realtime_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    let (config, loaded) = load_history(config, csv, offline)?;
    let mut session = build_session(&config, loaded)?;
    if let Some(tf) = timeframe {
        session.set_timeframe(tf)?;
    }

    let snapshot = match realtime_secs {
        Some(secs) => replay_realtime(session, order, Duration::from_secs(secs))?,
        None => replay_stepped(&mut session, order, steps)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot);
    }
    Ok(())
}

fn replay_stepped(
    session: &mut Session,
    order: Option<OrderArgs>,
    steps: usize,
) -> Result<SessionSnapshot> {
    if steps == 0 {
        return Ok(session.snapshot());
    }

    let mut settled = session.step_forward(1);
    if let Some(order) = order {
        let id = session.open_position(order.side, order.size, order.stop_loss, order.take_profit)?;
        info!(position = %id, side = %order.side, size = order.size, "opened position");
    }
    for _ in 1..steps {
        settled.extend(session.step_forward(1));
    }
    for trade in &settled {
        print_trade(trade);
    }
    Ok(session.snapshot())
}

fn replay_realtime(
    session: Session,
    order: Option<OrderArgs>,
    duration: Duration,
) -> Result<SessionSnapshot> {
    let handle = SessionHandle::spawn(session)?;
    handle.send(SessionCommand::StepForward(1))?;
    if let Some(order) = order {
        let id =
            handle.open_position(order.side, order.size, order.stop_loss, order.take_profit)?;
        info!(position = %id, "opened position");
    }
    handle.send(SessionCommand::Play)?;
    thread::sleep(duration);
    handle.send(SessionCommand::Pause)?;
    let snapshot = handle.snapshot()?;
    handle.shutdown()?;
    for trade in &snapshot.trading.trades {
        print_trade(trade);
    }
    Ok(snapshot)
}

fn run_indicators(
    config: &SessionConfig,
    csv: Option<&Path>,
    offline: bool,
    timeframe: Option<Timeframe>,
    json: bool,
) -> Result<()> {
    let (config, loaded) = load_history(config, csv, offline)?;
    let mut session = build_session(&config, loaded)?;
    if let Some(tf) = timeframe {
        session.set_timeframe(tf)?;
    }
    let indicators = session.indicators();

    if json {
        println!("{}", serde_json::to_string_pretty(indicators)?);
        return Ok(());
    }

    println!(
        "{} {} ({} candles)",
        config.pair,
        session.replay().timeframe(),
        session.replay().visible_len()
    );
    for line in &indicators.lines {
        let latest = line
            .points
            .last()
            .map_or_else(|| "-".to_string(), |p| format!("{:.5}", p.value));
        println!(
            "  {:<12} {:<10} {:<9} {}",
            line.indicator_id,
            line.line,
            format!("{:?}", line.placement).to_lowercase(),
            latest
        );
    }
    Ok(())
}

fn run_catalog(path: &Path, action: CatalogAction) -> Result<()> {
    let store = JsonFileStore::new(path);
    let mut catalog = IndicatorCatalog::load(&store)
        .with_context(|| format!("loading catalog {}", path.display()))?;

    match action {
        CatalogAction::List => {
            for entry in catalog.list() {
                let params: Vec<String> = entry
                    .params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                println!(
                    "[{}] {:<12} {:<16} {:<8} {}",
                    if entry.enabled { "x" } else { " " },
                    entry.id,
                    entry.name,
                    format!("{:?}", entry.kind).to_lowercase(),
                    params.join(" ")
                );
            }
            return Ok(());
        }
        CatalogAction::Add {
            id,
            name,
            overlay,
            params,
            disabled,
        } => {
            let kind = if overlay {
                Placement::Overlay
            } else {
                Placement::Separate
            };
            let mut entry = IndicatorConfig::new(&id, name, kind);
            for (key, value) in params {
                entry = entry.with_param(key, value);
            }
            if disabled {
                entry = entry.disabled();
            }
            catalog.add(entry)?;
            println!("added {id}");
        }
        CatalogAction::Remove { id } => {
            catalog.remove(&id)?;
            println!("removed {id}");
        }
        CatalogAction::Toggle { id } => {
            let enabled = catalog.toggle(&id)?;
            println!("{id} {}", if enabled { "enabled" } else { "disabled" });
        }
        CatalogAction::SetParam { id, key, value } => {
            catalog.update_params(&id, [(key.clone(), value)].into_iter().collect())?;
            println!("{id}.{key} = {value}");
        }
    }

    catalog
        .save(&store)
        .with_context(|| format!("saving catalog {}", path.display()))?;
    Ok(())
}

fn run_fetch(
    pair: &str,
    multiplier: u32,
    timespan: Timespan,
    days: i64,
    api_key_env: &str,
    out: Option<&Path>,
) -> Result<()> {
    let Some(request) = CandleRequest::from_pair(pair, multiplier, timespan, days) else {
        bail!("invalid pair '{pair}', expected BASE/QUOTE");
    };
    let api_key = std::env::var(api_key_env)
        .with_context(|| format!("environment variable {api_key_env} is not set"))?;
    let provider = PolygonProvider::new(api_key, Arc::new(CircuitBreaker::default_provider()))?;

    info!(ticker = %request.ticker(), from = %request.from, to = %request.to, "fetching");
    let response = provider.fetch(&request);
    if let Some(error) = &response.error {
        bail!("{} fetch failed: {error}", provider.name());
    }
    if response.stale {
        warn!(ticker = %request.ticker(), "latest candle is stale");
    }

    println!(
        "{}: {} candles ({} to {})",
        request.ticker(),
        response.candles.len(),
        request.from,
        request.to
    );
    if let (Some(first), Some(last)) = (response.candles.first(), response.candles.last()) {
        println!("  first {}  last {}", format_time(first.time), format_time(last.time));
    }

    if let Some(path) = out {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        write_candles(file, &response.candles)?;
        println!("  wrote {}", path.display());
    }
    Ok(())
}

/// Resolve the candle history for a run. Returns the config adjusted to the
/// timeframe the data actually came in at.
fn load_history(
    config: &SessionConfig,
    csv: Option<&Path>,
    offline: bool,
) -> Result<(SessionConfig, LoadedCandles)> {
    let mut config = config.clone();
    let local = csv
        .map(Path::to_path_buf)
        .or_else(|| config.data.csv_path.clone())
        .map(LocalCandleFile::new);

    let remote = if offline { None } else { remote_provider(&config)? };
    let request = match config.candle_request() {
        Some(request) => request,
        None => CandleRequest::from_pair(&config.pair, 1, Timespan::Hour, 30)
            .with_context(|| format!("invalid pair '{}'", config.pair))?,
    };

    let loaded = load_candles(
        remote.as_ref().map(|p| p as &dyn RemoteCandleSource),
        &request,
        local.as_ref(),
    );
    for note in &loaded.status {
        warn!("{note}");
    }
    if loaded.candles.is_empty() {
        bail!("no candle data: configure data.remote or pass --csv");
    }

    if loaded.source == DataSource::Remote {
        if let Some(tf) = request.timeframe() {
            config.base_timeframe = tf;
        }
    }
    if config.initial_timeframe.ratio_to(config.base_timeframe).is_none() {
        config.initial_timeframe = config.base_timeframe;
    }
    info!(
        source = ?loaded.source,
        candles = loaded.candles.len(),
        base = %config.base_timeframe,
        "history loaded"
    );
    Ok((config, loaded))
}

fn remote_provider(config: &SessionConfig) -> Result<Option<PolygonProvider>> {
    let Some(remote) = &config.data.remote else {
        return Ok(None);
    };
    let Ok(api_key) = std::env::var(&remote.api_key_env) else {
        warn!(env = %remote.api_key_env, "API key not set, skipping remote provider");
        return Ok(None);
    };
    let mut provider = PolygonProvider::new(api_key, Arc::new(CircuitBreaker::default_provider()))?
        .with_stale_after(remote.stale_after_periods);
    if let Some(url) = &remote.base_url {
        provider = provider.with_base_url(url);
    }
    Ok(Some(provider))
}

fn build_session(config: &SessionConfig, loaded: LoadedCandles) -> Result<Session> {
    let Some(path) = &config.catalog_path else {
        let catalog = IndicatorCatalog::default_catalog();
        return Ok(Session::from_config(config, loaded.candles, catalog)?);
    };
    let store = JsonFileStore::new(path);
    let catalog = IndicatorCatalog::load(&store)
        .with_context(|| format!("loading catalog {}", path.display()))?;
    Ok(Session::from_config(config, loaded.candles, catalog)?.with_store(Box::new(store)))
}

fn print_summary(snapshot: &SessionSnapshot) {
    let replay = &snapshot.replay;
    let trading = &snapshot.trading;
    let stats = &snapshot.stats;

    println!("=== Replay ===");
    println!(
        "  {:?} {} at {:.1}x, {} candles visible ({:.1}%)",
        replay.mode,
        replay.timeframe,
        replay.speed,
        replay.visible_len,
        replay.progress * 100.0
    );
    if replay.is_live {
        println!("  live: {} synthetic candles", replay.synthetic_cached);
    }
    if let Some(latest) = snapshot.latest() {
        println!("  last {}  close {:.5}", format_time(latest.time), latest.close);
    }

    println!("=== Account ===");
    println!("  balance  {:.2}", trading.balance);
    println!("  equity   {:.2}", trading.equity);
    println!("  open     {}", trading.positions.len());
    for position in &trading.positions {
        println!(
            "    {} {} {} @ {:.5}",
            position.id, position.side, position.size, position.entry_price
        );
    }

    println!("=== Trades ===");
    println!(
        "  {} trades, {} wins, {} losses, win rate {:.1}%",
        stats.count,
        stats.wins,
        stats.losses,
        stats.win_rate * 100.0
    );
    println!(
        "  total {:.2}, avg {:.2}, profit factor {}",
        stats.total_pnl, stats.avg_pnl, stats.profit_factor
    );
}

fn print_trade(trade: &Trade) {
    println!(
        "  {} {} {} {:.5} -> {:.5} pnl {:.2} ({}) at {}",
        trade.id,
        trade.position_id,
        trade.side,
        trade.entry_price,
        trade.exit_price,
        trade.pnl,
        trade.reason,
        format_time(trade.exit_time)
    );
}

fn format_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn parse_side(s: &str) -> Result<PositionSide> {
    match s.to_ascii_lowercase().as_str() {
        "long" | "buy" => Ok(PositionSide::Long),
        "short" | "sell" => Ok(PositionSide::Short),
        other => bail!("unknown side '{other}', expected long or short"),
    }
}

fn parse_timespan(s: &str) -> Result<Timespan> {
    match s.to_ascii_lowercase().as_str() {
        "minute" => Ok(Timespan::Minute),
        "hour" => Ok(Timespan::Hour),
        "day" => Ok(Timespan::Day),
        "week" => Ok(Timespan::Week),
        other => bail!("unknown timespan '{other}'"),
    }
}

fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value: f64 = value
        .parse()
        .map_err(|e| format!("invalid value for {key}: {e}"))?;
    Ok((key.to_string(), value))
}
