//! Run command implementation
//!
//! Wires one strategy to a replayed feed: the distributor and the strategy
//! loop each get a blocking thread, Ctrl+C flips the shared cancel flag.

use anyhow::Result;
use intraday_strategies::context::EngineContext;
use intraday_strategies::data::{self, FeedDistributor};
use intraday_strategies::feed::FeedBus;
use intraday_strategies::instruments::{ContractsTable, InstrumentLookup};
use intraday_strategies::runner::StrategyRunner;
use intraday_strategies::{strategies, Config};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

pub async fn run(config_path: String, data_path: String) -> Result<()> {
    info!("Starting strategy run");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let lookup: Arc<dyn InstrumentLookup> =
        Arc::new(ContractsTable::from_csv(&config.instruments.contracts_csv)?);

    info!("Loading ticks from: {}", data_path);
    let ticks = data::load_ticks_csv(&data_path)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let watcher = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received - stopping strategy and feed");
                watcher.store(true, Ordering::SeqCst);
            }
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
    });

    let bus = Arc::new(FeedBus::new());

    // The Telegram client is blocking; build it off the async runtime.
    // Subscribe before the distributor starts publishing.
    let runner = {
        let config = config.clone();
        let bus = bus.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || -> Result<StrategyRunner> {
            let notifier = config.notifier.build()?;
            let ctx = EngineContext::from_config(&config, notifier);
            let strategy = strategies::create_from_config(&config, lookup, ctx)?;
            info!("Created strategy: {}", strategy.name());

            let subscriber = bus.subscribe(strategy.topics(), config.feed.channel_capacity);
            Ok(StrategyRunner::new(
                strategy,
                subscriber,
                config.feed.recv_timeout(),
                cancel,
            ))
        })
        .await??
    };

    let distributor = FeedDistributor::new(
        bus.clone(),
        ticks,
        config.feed.replay_speed(),
        config.feed.rolling,
    );
    let feed_task = {
        let cancel = cancel.clone();
        let bus = bus.clone();
        tokio::task::spawn_blocking(move || {
            let sent = distributor.run(&cancel);
            bus.close();
            sent
        })
    };

    let outcome = tokio::task::spawn_blocking(move || runner.run()).await?;

    // A finished strategy stops a rolling replay too
    cancel.store(true, Ordering::SeqCst);
    let sent = feed_task.await?;
    info!("Feed published {} ticks", sent);

    let summary = outcome?;

    println!("\n{}", "=".repeat(60));
    println!("DAILY REPORT: {}", summary.strategy);
    println!("{}", "=".repeat(60));
    println!("Date:               {}", summary.date);
    println!("Total Trades:       {}", summary.total_trades);
    println!("Wins / Losses:      {} / {}", summary.wins, summary.losses);
    println!("Total PnL:          {}", summary.total_pnl);
    println!("Daily Loss:         {}", summary.daily_loss);
    println!("Engine Realized:    {}", summary.engine_realized_pnl);
    println!("Open Positions:     {}", summary.open_positions);
    match summary.unrealized_pnl {
        Some(pnl) => println!("Unrealized PnL:     {}", pnl),
        None => println!("Unrealized PnL:     n/a"),
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
