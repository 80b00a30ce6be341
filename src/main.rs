//! Trading simulator demo.
//!
//! Walks the ledger through its lifecycle: spot trades, leveraged positions
//! with take profit and stop loss, margin exhaustion, fixed-time bets, and a
//! restart from a saved snapshot. `--live` runs the background monitor and
//! settlement loops against a random-walk price feed instead.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tradesim_core::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated trading ledger and fixed-time settlement engine")]
struct Cli {
    /// Run the background loops against a random-walk feed instead of the scripted scenarios.
    #[arg(long)]
    live: bool,

    /// How long the live run lasts, in seconds.
    #[arg(long, default_value_t = 90)]
    seconds: u64,

    /// Configuration preset; `env` layers TRADESIM_* variables over the defaults.
    #[arg(long, value_enum, default_value_t = Preset::Env)]
    preset: Preset,

    /// Snapshot backend for the live run.
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    store: Backend,

    /// Directory for json snapshots, or the sqlite database file.
    #[arg(long, default_value = "tradesim-data")]
    path: PathBuf,

    /// Seed for the random-walk feed.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Env,
    Demo,
    Strict,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Json,
    Sqlite,
}

impl Preset {
    fn config(self) -> EngineConfig {
        match self {
            Preset::Env => EngineConfig::from_env(),
            Preset::Demo => Environment::Demo.config(),
            Preset::Strict => Environment::Strict.config(),
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradesim=info,tradesim_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.live {
        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        return runtime.block_on(run_live(cli));
    }

    println!("Trading Ledger Simulation");
    println!("Spot, Margin, Fixed-Time Bets\n");

    scenario_1_spot_round_trip()?;
    scenario_2_margin_position()?;
    scenario_3_take_profit_and_stop_loss()?;
    scenario_4_margin_exhaustion()?;
    scenario_5_fixed_time_bets()?;
    scenario_6_restart_and_resume()?;
    scenario_7_degraded_dependencies()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn scripted(config: EngineConfig) -> Result<(Engine, StaticOracle, ManualClock)> {
    let clock = ManualClock::new(Timestamp::from_secs(1_700_000_000));
    let oracle = StaticOracle::new(clock.clone());
    let engine = Engine::open(config, oracle.clone(), MemoryStore::new(), clock.clone())?;
    Ok((engine, oracle, clock))
}

fn price(value: rust_decimal::Decimal) -> Result<Price> {
    Price::new(value).context("price must be positive")
}

/// Buy then sell the whole holding.
fn scenario_1_spot_round_trip() -> Result<()> {
    println!("Scenario 1: Spot Round Trip\n");

    let (mut engine, _, _) = scripted(EngineConfig::default())?;
    println!("  Starting balance: ${}", engine.balance());

    let buy = engine.buy("BTC", dec!(50000), dec!(0.1))?;
    println!("  BUY 0.1 BTC @ ${}: total ${}, fee ${}", buy.price, buy.total, buy.fee);
    println!("  Balance: ${}", buy.balance);

    let holding = engine
        .account()
        .holding(&Symbol::new("BTC"))
        .context("holding missing after buy")?;
    println!("  Holding: {} BTC @ avg ${}", holding.amount, holding.avg_cost);

    let sell = engine.sell("BTC", dec!(55000), dec!(0.1))?;
    println!("  SELL 0.1 BTC @ ${}: total ${}, fee ${}", sell.price, sell.total, sell.fee);
    println!("  Balance: ${}", sell.balance);
    println!("  Holding removed: {}\n", engine.account().holding(&Symbol::new("BTC")).is_none());
    Ok(())
}

/// Leveraged long opened and closed by hand.
fn scenario_2_margin_position() -> Result<()> {
    println!("Scenario 2: Margin Position\n");

    let (mut engine, oracle, _) = scripted(EngineConfig::default())?;

    let position = engine.open_position(OpenPosition::long("ETH", dec!(3000), dec!(1), dec!(5)))?;
    println!(
        "  {} {:?} {} ETH @ ${} x{}: margin ${}",
        position.id, position.side, position.size, position.entry_price, position.leverage, position.margin_held
    );
    println!("  Balance after open: ${}", engine.balance());

    oracle.set_price("ETH", price(dec!(3150))?);
    let report = engine.run_monitor_cycle();
    println!("  ETH marks to $3150, unrealized ${}", report.unrealized_pnl);

    let closed = engine.close_position(position.id, None)?;
    println!(
        "  Closed @ ${}: realized ${}, fee ${}, credited ${}",
        closed.close_price, closed.realized_pnl, closed.fee, closed.credited
    );
    println!("  Balance: ${}\n", engine.balance());
    Ok(())
}

/// Monitor fires conditional closes at their trigger levels.
fn scenario_3_take_profit_and_stop_loss() -> Result<()> {
    println!("Scenario 3: Take Profit and Stop Loss\n");

    let (mut engine, oracle, _) = scripted(EngineConfig::default())?;

    let long = engine.open_position(
        OpenPosition::long("BTC", dec!(60000), dec!(0.05), dec!(10))
            .with_take_profit(dec!(62000))
            .with_stop_loss(dec!(59000)),
    )?;
    let short = engine.open_position(
        OpenPosition::short("SOL", dec!(150), dec!(10), dec!(3)).with_stop_loss(dec!(160)),
    )?;
    println!("  Long {} BTC, TP $62000 / SL $59000", long.size);
    println!("  Short {} SOL, SL $160", short.size);

    oracle.set_price("BTC", price(dec!(62500))?);
    oracle.set_price("SOL", price(dec!(161))?);
    let report = engine.run_monitor_cycle();

    for closed in &report.closed {
        println!(
            "  {} closed by {:?} @ ${}: realized ${}",
            closed.position_id, closed.reason, closed.close_price, closed.realized_pnl
        );
    }
    println!("  Balance: ${}\n", engine.balance());
    Ok(())
}

/// A loss that eats the whole margin closes the position with nothing back.
fn scenario_4_margin_exhaustion() -> Result<()> {
    println!("Scenario 4: Margin Exhaustion\n");

    let (mut engine, oracle, _) = scripted(EngineConfig::default())?;
    let position = engine.open_position(OpenPosition::long("ETH", dec!(3000), dec!(2), dec!(20)))?;
    println!("  Long 2 ETH @ $3000 x20, margin ${}", position.margin_held);

    for mark in [dec!(2998), dec!(2995), dec!(2990)] {
        oracle.set_price("ETH", price(mark)?);
        let report = engine.run_monitor_cycle();
        println!("  ETH ${}: unrealized ${}", mark, report.unrealized_pnl);
        for closed in &report.closed {
            println!("  {} {:?}, credited ${}", closed.position_id, closed.reason, closed.credited);
        }
    }

    println!("  Balance: ${}", engine.balance());
    println!("  Conservation gap: {}\n", engine.conservation_gap());
    Ok(())
}

/// Bets resolve only once their expiry has passed.
fn scenario_5_fixed_time_bets() -> Result<()> {
    println!("Scenario 5: Fixed-Time Bets\n");

    let (mut engine, oracle, clock) = scripted(EngineConfig::default())?;

    let up = engine.place_bet("BTC", Direction::Up, dec!(100), 60, dec!(60000))?;
    let down = engine.place_bet("BTC", Direction::Down, dec!(100), 60, dec!(60000))?;
    println!("  {} up and {} down, $100 each, 60s", up.id, down.id);
    println!("  Balance after stakes: ${}", engine.balance());

    oracle.set_price("BTC", price(dec!(60500))?);
    clock.advance_secs(30);
    let early = engine.sweep_bets();
    println!("  t=30s sweep settled {}", early.settled.len());

    clock.advance_secs(31);
    let report = engine.sweep_bets();
    for resolution in &report.settled {
        println!(
            "  t=61s {} {:?} @ ${}, payout ${}",
            resolution.bet_id, resolution.status, resolution.exit_price, resolution.payout
        );
    }

    let again = engine.sweep_bets();
    println!("  Repeat sweep settled {}", again.settled.len());
    println!("  Balance: ${}\n", engine.balance());
    Ok(())
}

/// State survives a restart through the snapshot store.
fn scenario_6_restart_and_resume() -> Result<()> {
    println!("Scenario 6: Restart and Resume\n");

    let clock = ManualClock::new(Timestamp::from_secs(1_700_000_000));
    let oracle = StaticOracle::new(clock.clone());
    let store = Arc::new(MemoryStore::new());

    let mut engine = Engine::open(EngineConfig::default(), oracle.clone(), store.clone(), clock.clone())?;
    engine.buy("ETH", dec!(3000), dec!(1))?;
    let bet = engine.place_bet("ETH", Direction::Up, dec!(200), 300, dec!(3000))?;
    println!("  Before restart: balance ${}, {} active bet", engine.balance(), engine.active_bets().len());
    drop(engine);

    let mut engine = Engine::open(EngineConfig::default(), oracle.clone(), store, clock.clone())?;
    println!("  After restart: balance ${}, {} active bet", engine.balance(), engine.active_bets().len());

    oracle.set_price("ETH", price(dec!(2990))?);
    clock.advance_secs(301);
    let report = engine.sweep_bets();
    println!("  Sweep settled {} ({:?})", report.settled.len(), engine.bet(bet.id).map(|b| b.status));

    let summary = engine.portfolio_summary();
    println!("  Equity ${}, holdings ${}\n", summary.total_equity, summary.holdings_value);
    Ok(())
}

/// Oracle and store outages are retried, not fatal.
fn scenario_7_degraded_dependencies() -> Result<()> {
    println!("Scenario 7: Degraded Dependencies\n");

    let clock = ManualClock::new(Timestamp::from_secs(1_700_000_000));
    let oracle = StaticOracle::new(clock.clone());
    let store = Arc::new(MemoryStore::new());
    let mut engine = Engine::open(EngineConfig::default(), oracle.clone(), store.clone(), clock.clone())?;

    engine.place_bet("SOL", Direction::Down, dec!(100), 30, dec!(150))?;
    oracle.fail("SOL");
    store.set_fail_saves(true);
    clock.advance_secs(31);

    let report = engine.sweep_bets();
    println!("  Oracle down: deferred {}, settled {}", report.deferred.len(), report.settled.len());
    println!("  Unsaved changes pending: {}", engine.is_dirty());

    oracle.recover(&Symbol::new("SOL"));
    oracle.set_price("SOL", price(dec!(140))?);
    let report = engine.sweep_bets();
    println!("  Oracle back: settled {}, persisted {}", report.settled.len(), report.persisted);

    store.set_fail_saves(false);
    let report = engine.tick();
    println!(
        "  Store back: persisted {}, dirty {}\n",
        report.monitor.persisted || report.sweep.persisted,
        engine.is_dirty()
    );
    Ok(())
}

async fn run_live(cli: Cli) -> Result<()> {
    let config = cli.preset.config();
    config.validate()?;

    let base = [
        (Symbol::new("BTC"), price(dec!(60000))?),
        (Symbol::new("ETH"), price(dec!(3000))?),
        (Symbol::new("SOL"), price(dec!(150))?),
    ];
    let oracle = RandomWalkOracle::new(base, 0.004, cli.seed, SystemClock);

    let engine = match cli.store {
        Backend::Memory => Engine::open(config.clone(), oracle, MemoryStore::new(), SystemClock)?,
        Backend::Json => {
            let store = JsonFileStore::new(&cli.path)
                .with_context(|| format!("cannot open snapshot dir {}", cli.path.display()))?;
            Engine::open(config.clone(), oracle, store, SystemClock)?
        }
        Backend::Sqlite => {
            let store = SqliteStore::new(&cli.path)
                .with_context(|| format!("cannot open database {}", cli.path.display()))?;
            Engine::open(config.clone(), oracle, store, SystemClock)?
        }
    };
    let engine = shared(engine);

    {
        let mut guard = engine.lock().await;
        info!(balance = %guard.balance(), "Live run starting");
        if let Err(e) = seed_live_activity(&mut guard, &config) {
            warn!(error = %e, "Could not seed demo activity");
        }
    }

    let scheduler = Scheduler::spawn(engine.clone(), &config);

    let mut status = tokio::time::interval(Duration::from_secs(10));
    let deadline = tokio::time::sleep(Duration::from_secs(cli.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = status.tick() => {
                let guard = engine.lock().await;
                let summary = guard.portfolio_summary();
                info!(
                    balance = %summary.balance,
                    equity = %summary.total_equity,
                    positions_pnl = %summary.positions_unrealized_pnl,
                    active_bets = guard.active_bets().len(),
                    "Status"
                );
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    scheduler.shutdown().await;

    let guard = engine.lock().await;
    let summary = guard.portfolio_summary();
    println!("Final balance: ${}", summary.balance);
    println!("Final equity: ${}", summary.total_equity);
    for entry in guard.account().recent_history(10) {
        println!("  {:?} {:?} {} fee {}", entry.kind, entry.symbol, entry.total, entry.fee);
    }
    Ok(())
}

fn seed_live_activity(engine: &mut Engine, config: &EngineConfig) -> Result<(), EngineError> {
    if engine.account().open_positions.is_empty() {
        engine.buy("BTC", dec!(60000), dec!(0.02))?;
        engine.open_position(
            OpenPosition::long("ETH", dec!(3000), dec!(1), dec!(5))
                .with_take_profit(dec!(3060))
                .with_stop_loss(dec!(2950)),
        )?;
    }
    let duration = config
        .settlement
        .allowed_durations
        .first()
        .copied()
        .unwrap_or(30);
    engine.place_bet("SOL", Direction::Up, dec!(100), duration, dec!(150))?;
    Ok(())
}
