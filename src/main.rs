//! Perpetual-futures position calculator
//!
//! Models an entry chain of position adjustments (initial entry, adds,
//! partial reduces) and derives risk, reward, liquidation price, and
//! live P&L from current market prices.

mod api;
mod db;
mod engine;
mod models;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{FeedStatus, PriceClient, PriceFeed, Quote};
use crate::db::Database;
use crate::engine::{aggregate, blend_average_price, evaluate_metrics, project, Adjustment};
use crate::models::{
    check_protection_sides, CalculatedMetrics, ChainState, Direction, EntryKind, EntryPatch,
    Position,
};

/// Leveraged position calculator CLI.
#[derive(Parser)]
#[command(name = "perpcalc")]
#[command(about = "Model leveraged position chains and their risk/reward", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./perpcalc.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new position with its initial entry
    Open {
        /// Asset symbol (e.g. BTC)
        symbol: String,

        /// Position side: long or short
        direction: String,

        /// Entry price
        #[arg(short, long)]
        price: f64,

        /// Margin size in USD (before leverage)
        #[arg(short, long)]
        size: f64,

        /// Leverage for the initial entry
        #[arg(short = 'x', long, default_value = "1")]
        leverage: f64,

        /// Stop-loss price
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Take-profit price
        #[arg(long)]
        take_profit: Option<f64>,
    },

    /// Add opening volume to a position
    Add {
        /// Position id
        id: i64,

        /// Price of the added slice
        #[arg(short, long)]
        price: f64,

        /// Margin size of the added slice in USD
        #[arg(short, long)]
        size: f64,

        /// Leverage for the added slice
        #[arg(short = 'x', long)]
        leverage: f64,

        /// Stop-loss override for the adjusted position
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Take-profit override for the adjusted position
        #[arg(long)]
        take_profit: Option<f64>,

        /// Show the projected metrics without committing
        #[arg(long)]
        preview: bool,
    },

    /// Close part of a position
    Reduce {
        /// Position id
        id: i64,

        /// Price at which the volume is closed
        #[arg(short, long)]
        price: f64,

        /// Margin size to close in USD
        #[arg(short, long)]
        size: f64,

        /// Show the projected metrics without committing
        #[arg(long)]
        preview: bool,
    },

    /// Edit numeric fields of an existing entry
    Edit {
        /// Position id
        id: i64,

        /// Entry index within the chain (0 = initial)
        entry: usize,

        #[arg(long)]
        price: Option<f64>,

        #[arg(long)]
        size: Option<f64>,

        #[arg(long)]
        leverage: Option<f64>,

        #[arg(long)]
        stop_loss: Option<f64>,

        #[arg(long)]
        take_profit: Option<f64>,

        /// Clear the entry-level stop-loss override
        #[arg(long)]
        clear_stop_loss: bool,

        /// Clear the entry-level take-profit override
        #[arg(long)]
        clear_take_profit: bool,
    },

    /// Remove a non-initial entry from the chain
    RemoveEntry {
        /// Position id
        id: i64,

        /// Entry index within the chain
        entry: usize,
    },

    /// Show a position's chain, aggregated state, and metrics
    Show {
        /// Position id
        id: i64,
    },

    /// List all stored positions
    List,

    /// Delete a position
    Delete {
        /// Position id
        id: i64,
    },

    /// One-shot calculation without storing anything
    Calc {
        /// Position side: long or short
        direction: String,

        /// Entry price
        #[arg(short, long)]
        price: f64,

        /// Margin size in USD
        #[arg(short, long)]
        size: f64,

        /// Leverage
        #[arg(short = 'x', long, default_value = "1")]
        leverage: f64,

        /// Stop-loss price
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Take-profit price
        #[arg(long)]
        take_profit: Option<f64>,

        /// Current market price (skips the live fetch)
        #[arg(long)]
        current: Option<f64>,

        /// Price of a single what-if adjustment
        #[arg(long)]
        adjust_price: Option<f64>,

        /// Margin size of the what-if adjustment
        #[arg(long)]
        adjust_size: Option<f64>,

        /// Leverage of the what-if adjustment (defaults to the entry's)
        #[arg(long)]
        adjust_leverage: Option<f64>,

        /// Treat the what-if adjustment as a reduce instead of an add
        #[arg(long)]
        reduce: bool,
    },

    /// Watch a position's live P&L until Ctrl+C
    Watch {
        /// Position id
        id: i64,

        /// Polling interval in seconds
        #[arg(short, long, default_value = "3")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Open {
            symbol,
            direction,
            price,
            size,
            leverage,
            stop_loss,
            take_profit,
        } => {
            let direction = parse_direction(&direction)?;
            let mut position = Position::new(
                symbol.to_uppercase(),
                direction,
                to_decimal(price)?,
                to_decimal(size)?,
                to_decimal(leverage)?,
            )?;
            position.set_protections(
                to_optional_decimal(stop_loss)?,
                to_optional_decimal(take_profit)?,
            )?;

            let id = db.save_position(&position).await?;
            info!(id = id, symbol = %position.symbol, "Position opened");

            position.id = Some(id);
            print_position(&position, fetch_quote(&position.symbol).await);
        }

        Commands::Add {
            id,
            price,
            size,
            leverage,
            stop_loss,
            take_profit,
            preview,
        } => {
            let mut position = db.get_position(id).await?;
            let adjustment = Adjustment {
                kind: EntryKind::Add,
                price: to_decimal(price)?,
                size: to_decimal(size)?,
                leverage: Some(to_decimal(leverage)?),
                stop_loss: to_optional_decimal(stop_loss)?,
                take_profit: to_optional_decimal(take_profit)?,
            };

            commit_adjustment(&db, &mut position, adjustment, preview).await?;
        }

        Commands::Reduce {
            id,
            price,
            size,
            preview,
        } => {
            let mut position = db.get_position(id).await?;
            let adjustment = Adjustment {
                kind: EntryKind::Subtract,
                price: to_decimal(price)?,
                size: to_decimal(size)?,
                leverage: None,
                stop_loss: None,
                take_profit: None,
            };

            commit_adjustment(&db, &mut position, adjustment, preview).await?;
        }

        Commands::Edit {
            id,
            entry,
            price,
            size,
            leverage,
            stop_loss,
            take_profit,
            clear_stop_loss,
            clear_take_profit,
        } => {
            let mut position = db.get_position(id).await?;

            let stop_loss = if clear_stop_loss {
                Some(None)
            } else {
                to_optional_decimal(stop_loss)?.map(Some)
            };
            let take_profit = if clear_take_profit {
                Some(None)
            } else {
                to_optional_decimal(take_profit)?.map(Some)
            };

            let patch = EntryPatch {
                price: to_optional_decimal(price)?,
                size: to_optional_decimal(size)?,
                leverage: to_optional_decimal(leverage)?,
                stop_loss,
                take_profit,
            };

            position.edit_entry(entry, patch)?;
            db.update_position(&position).await?;

            println!("Entry {} updated.", entry);
            print_position(&position, fetch_quote(&position.symbol).await);
        }

        Commands::RemoveEntry { id, entry } => {
            let mut position = db.get_position(id).await?;
            let removed = position.remove_entry(entry)?;
            db.update_position(&position).await?;

            println!(
                "Removed {} entry of {} @ {}.",
                removed.kind.as_str(),
                removed.size,
                removed.price
            );
            print_position(&position, fetch_quote(&position.symbol).await);
        }

        Commands::Show { id } => {
            let position = db.get_position(id).await?;
            print_position(&position, fetch_quote(&position.symbol).await);
        }

        Commands::List => {
            let positions = db.list_positions().await?;
            if positions.is_empty() {
                println!("No stored positions. Use 'perpcalc open' to create one.");
                return Ok(());
            }

            println!(
                "\n{:>4} {:<8} {:<6} {:>12} {:>14} {:>6} {:>8} {:>14}",
                "ID", "SYMBOL", "SIDE", "SIZE", "AVG ENTRY", "LEV", "ENTRIES", "REALIZED"
            );
            println!("{}", "-".repeat(80));

            for position in positions {
                let state = aggregate(&position.entries, position.direction);
                println!(
                    "{:>4} {:<8} {:<6} {:>12.2} {:>14.2} {:>5.1}x {:>8} {:>14.2}",
                    position.id.unwrap_or_default(),
                    position.symbol,
                    position.direction.as_str(),
                    state.remaining_size,
                    state.average_entry_price,
                    state.average_leverage,
                    position.entries.len(),
                    state.realized_pnl
                );
            }
        }

        Commands::Delete { id } => {
            db.delete_position(id).await?;
            println!("Deleted position {}.", id);
        }

        Commands::Calc {
            direction,
            price,
            size,
            leverage,
            stop_loss,
            take_profit,
            current,
            adjust_price,
            adjust_size,
            adjust_leverage,
            reduce,
        } => {
            let direction = parse_direction(&direction)?;
            run_calc(&CalcInputs {
                direction,
                price: to_decimal(price)?,
                size: to_decimal(size)?,
                leverage: to_decimal(leverage)?,
                stop_loss: to_optional_decimal(stop_loss)?,
                take_profit: to_optional_decimal(take_profit)?,
                current: to_optional_decimal(current)?,
                adjust_price: to_optional_decimal(adjust_price)?,
                adjust_size: to_optional_decimal(adjust_size)?,
                adjust_leverage: to_optional_decimal(adjust_leverage)?,
                reduce,
            })?;
        }

        Commands::Watch { id, interval } => {
            let position = db.get_position(id).await?;
            watch_position(position, interval).await?;
        }
    }

    Ok(())
}

struct CalcInputs {
    direction: Direction,
    price: Decimal,
    size: Decimal,
    leverage: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    current: Option<Decimal>,
    adjust_price: Option<Decimal>,
    adjust_size: Option<Decimal>,
    adjust_leverage: Option<Decimal>,
    reduce: bool,
}

/// One-shot calculator: a single slice plus an optional what-if
/// adjustment, blended with the simplified two-slice average.
fn run_calc(inputs: &CalcInputs) -> Result<()> {
    check_protection_sides(
        inputs.direction,
        inputs.price,
        inputs.stop_loss,
        inputs.take_profit,
    )?;

    let (size, price, leverage) = match (inputs.adjust_price, inputs.adjust_size) {
        (Some(adjust_price), Some(adjust_size)) => {
            let kind = if inputs.reduce {
                EntryKind::Subtract
            } else {
                EntryKind::Add
            };
            let price = blend_average_price(
                inputs.size,
                inputs.price,
                adjust_size,
                adjust_price,
                kind,
            );

            if inputs.reduce {
                let size = (inputs.size - adjust_size).max(Decimal::ZERO);
                (size, price, inputs.leverage)
            } else {
                let size = inputs.size + adjust_size;
                let adjust_leverage = inputs.adjust_leverage.unwrap_or(inputs.leverage);
                let leverage = if size.is_zero() {
                    inputs.leverage
                } else {
                    (inputs.size * inputs.leverage + adjust_size * adjust_leverage) / size
                };
                (size, price, leverage)
            }
        }
        (None, None) => (inputs.size, inputs.price, inputs.leverage),
        _ => anyhow::bail!("--adjust-price and --adjust-size go together"),
    };

    let state = ChainState {
        open_size: size,
        closed_size: Decimal::ZERO,
        remaining_size: size,
        average_entry_price: price,
        average_leverage: leverage,
        realized_pnl: Decimal::ZERO,
    };

    // One-shot mode stays offline; a market price only enters via --current.
    let metrics = evaluate_metrics(
        &state,
        inputs.direction,
        inputs.stop_loss,
        inputs.take_profit,
        inputs.current,
    );

    println!("\n=== One-Shot Calculation ===");
    println!("Side:          {}", inputs.direction.as_str());
    println!("Entry price:   {:.2}", price);
    println!("Margin size:   ${:.2}", size);
    println!("Leverage:      {:.1}x", leverage);
    println!("Notional:      ${:.2}", size * leverage);
    print_metrics(&metrics, inputs.current);

    Ok(())
}

/// Project an adjustment, print it, and commit unless previewing.
async fn commit_adjustment(
    db: &Database,
    position: &mut Position,
    adjustment: Adjustment,
    preview: bool,
) -> Result<()> {
    let quote = fetch_quote(&position.symbol).await;
    let current_price = quote.as_ref().map(|q| q.price);

    let projection = project(position, &adjustment, current_price)?;

    println!(
        "\n=== Projected {} ===",
        match adjustment.kind {
            EntryKind::Subtract => "Reduce",
            _ => "Add",
        }
    );
    print_state(&projection.state);
    print_metrics(&projection.metrics, current_price);

    if preview {
        println!("\nPreview only; nothing was committed.");
        return Ok(());
    }

    position.append(projection.entry)?;
    db.update_position(position).await?;
    println!(
        "\nCommitted. Position {} now has {} entries.",
        position.id.unwrap_or_default(),
        position.entries.len()
    );

    Ok(())
}

/// Live P&L loop over the price feed.
async fn watch_position(position: Position, interval_secs: u64) -> Result<()> {
    let client = PriceClient::new()?;
    let feed = PriceFeed::new(client, vec![position.symbol.clone()])
        .with_interval(Duration::from_secs(interval_secs.max(1)));
    let handle = feed.spawn();

    // Prime the feed so the first line doesn't wait a full tick.
    if let FeedStatus::Disconnected { last_error } = feed.refresh().await {
        warn!(error = %last_error, "Price feed not yet connected");
    }

    let state = aggregate(&position.entries, position.direction);
    println!(
        "Watching {} {} ({:.2} open @ {:.2}, {:.1}x). Press Ctrl+C to stop.\n",
        position.symbol,
        position.direction.as_str(),
        state.remaining_size,
        state.average_entry_price,
        state.average_leverage
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping watch.");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval_secs.max(1))) => {
                match feed.latest(&position.symbol).await {
                    Some(quote) => {
                        let metrics = evaluate_metrics(
                            &state,
                            position.direction,
                            position.effective_stop_loss(),
                            position.effective_take_profit(),
                            Some(quote.price),
                        );
                        let pnl = metrics.pnl.unwrap_or_default();
                        let pnl_pct = metrics.pnl_percent.unwrap_or_default();
                        println!(
                            "[{}] {} {:.2} ({:+.2}% 24h) | P&L: ${:+.2} ({:+.2}%)",
                            quote.fetched_at.format("%H:%M:%S"),
                            quote.symbol,
                            quote.price,
                            quote.change_24h,
                            pnl,
                            pnl_pct
                        );
                    }
                    None => {
                        if let FeedStatus::Disconnected { last_error } = feed.status().await {
                            println!("[--:--:--] disconnected: {}", last_error);
                        }
                    }
                }
            }
        }
    }

    feed.stop();
    handle.abort();
    Ok(())
}

/// Best-effort live quote; a missing price only suppresses P&L output.
async fn fetch_quote(symbol: &str) -> Option<Quote> {
    match PriceClient::new() {
        Ok(client) => match client.get_ticker(symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Could not fetch market price");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Could not create price client");
            None
        }
    }
}

fn print_position(position: &Position, quote: Option<Quote>) {
    let state = aggregate(&position.entries, position.direction);
    let metrics = evaluate_metrics(
        &state,
        position.direction,
        position.effective_stop_loss(),
        position.effective_take_profit(),
        quote.as_ref().map(|q| q.price),
    );

    println!(
        "\n=== Position {} | {} {} ===",
        position.id.unwrap_or_default(),
        position.symbol,
        position.direction.as_str()
    );

    println!(
        "\n{:>3} {:<9} {:>14} {:>12} {:>6} {:>14}",
        "#", "KIND", "PRICE", "SIZE", "LEV", "NOTIONAL"
    );
    for (i, entry) in position.entries.iter().enumerate() {
        println!(
            "{:>3} {:<9} {:>14.2} {:>12.2} {:>5.1}x {:>14.2}",
            i,
            entry.kind.as_str(),
            entry.price,
            entry.size,
            entry.leverage,
            entry.notional()
        );
    }

    print_state(&state);
    print_metrics(&metrics, quote.as_ref().map(|q| q.price));

    if let Some(quote) = quote {
        println!(
            "\nMarket: {:.2} ({:+.2}% 24h) as of {}",
            quote.price,
            quote.change_24h,
            quote.fetched_at.format("%H:%M:%S UTC")
        );
    }
}

fn print_state(state: &ChainState) {
    println!("\n--- Aggregated Chain ---");
    println!("Open size:     ${:.2}", state.open_size);
    println!("Closed size:   ${:.2}", state.closed_size);
    println!("Remaining:     ${:.2}", state.remaining_size);
    println!("Avg entry:     {:.2}", state.average_entry_price);
    println!("Avg leverage:  {:.1}x", state.average_leverage);
    println!("Realized P&L:  ${:.2}", state.realized_pnl);
}

fn print_metrics(metrics: &CalculatedMetrics, current_price: Option<Decimal>) {
    println!("\n--- Metrics ---");
    println!("Risk:          ${:.2}", metrics.risk_amount);
    println!("Reward:        ${:.2}", metrics.reward_amount);
    println!("R/R ratio:     {:.2}", metrics.risk_reward_ratio);

    match metrics.liquidation_price {
        Some(liq) if !liq.is_zero() => println!("Liquidation:   {:.2}", liq),
        Some(_) => println!("Liquidation:   none at 1x"),
        None => {}
    }

    match (metrics.pnl, metrics.pnl_percent) {
        (Some(pnl), Some(pct)) => {
            println!("Unrealized:    ${:+.2} ({:+.2}%)", pnl, pct);
        }
        _ => {
            if current_price.is_none() {
                println!("Unrealized:    n/a (no market price)");
            }
        }
    }
}

fn parse_direction(s: &str) -> Result<Direction> {
    Direction::from_str(s).ok_or_else(|| anyhow!("Unknown direction '{}' (use long or short)", s))
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::try_from(value).with_context(|| format!("Not a representable number: {}", value))
}

fn to_optional_decimal(value: Option<f64>) -> Result<Option<Decimal>> {
    value.map(to_decimal).transpose()
}
