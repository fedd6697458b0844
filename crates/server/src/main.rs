//! Magic Web: Magic Formula ranking API and portfolio companion
//!
//! Usage:
//!   magic-web serve --port 3000         : Launch the ranking API
//!   magic-web db-check                  : Verify the database is reachable
//!   magic-web portfolio show            : Holdings, ranks and suggestions
//!   magic-web portfolio plan 1000       : Equal-weight buy plan

mod api;
mod config;
mod error;

use clap::{Parser, Subcommand};
use persistence::repository::TickerRepository;
use persistence::{ColumnCache, Database};
use portfolio::{
    build_equal_weight_plan, cart_breakdown, suggest, CartItem, HoldingStore, JsonFileStore,
    Portfolio, RankingClient, HOLD_RANK_THRESHOLD,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::config::Config;

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "magic-web")]
#[command(about = "Magic Formula ranking API and portfolio companion", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Holdings file (defaults to PORTFOLIO_PATH or data/portfolio_items.json)
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the ranking API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Ping the database and read one snapshot ticker
    DbCheck,
    /// Manage the local portfolio
    Portfolio {
        #[command(subcommand)]
        action: PortfolioAction,
    },
}

#[derive(Subcommand)]
enum PortfolioAction {
    /// List holdings with allocation, rank and suggestions
    Show {
        /// Ranking API base URL (defaults to MAGIC_WEB_API)
        #[arg(long)]
        api: Option<String>,
    },
    /// Record a purchase (merges into an existing holding)
    Add {
        ticker: String,
        quantity: Decimal,
        price: Decimal,
    },
    /// Drop a holding
    Remove { ticker: String },
    /// Split an amount equally over the top-ranked tickers
    Plan {
        amount: Decimal,
        /// Ranking API base URL (defaults to MAGIC_WEB_API)
        #[arg(long)]
        api: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,magic_web=debug,persistence=debug,portfolio=debug")
    } else {
        EnvFilter::new("info,magic_web=info,persistence=info,portfolio=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let mut config = Config::from_env();
    if let Some(store) = cli.store {
        config.portfolio_path = store;
    }

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&config, &host, port).await?;
        }
        Commands::DbCheck => {
            cmd_db_check(&config).await?;
        }
        Commands::Portfolio { action } => {
            cmd_portfolio(&config, action).await?;
        }
    }

    Ok(())
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    let url = config.database_url()?;
    Database::connect(url).await.map_err(|e| {
        error!("Failed to open database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })
}

// ============================================================================
// Serve command: Axum web server
// ============================================================================

async fn cmd_serve(config: &Config, host: &str, port: u16) -> anyhow::Result<()> {
    info!("Magic Web v{} starting...", APP_VERSION);

    let db = open_database(config).await?;
    info!(schema = %config.schema, page_size = config.page_size, "Database ready");

    let state = AppState {
        db: Arc::new(db),
        columns: Arc::new(ColumnCache::new()),
        schema: Arc::from(config.schema.as_str()),
        page_size: config.page_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Static UI next to the executable, else ./dist
    let exe_path = std::env::current_exe().unwrap_or_default();
    let exe_dir = exe_path.parent().unwrap_or(std::path::Path::new("."));
    let dist_dir = exe_dir.join("dist");
    let static_dir = if dist_dir.exists() {
        dist_dir
    } else {
        std::path::PathBuf::from("dist")
    };

    let app = axum::Router::new()
        .nest("/api", api::router(state))
        .fallback_service(ServeDir::new(&static_dir))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Magic Web v{} ===", APP_VERSION);
    println!("Magic Formula ranking API");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET   /api/health      - Health check");
    println!("  GET   /api/checklist   - Ranked checklist (filters, sort, paging)");
    println!("  GET   /api/stocks      - Snapshot listing (filters, sort, paging)");
    println!("  GET   /api/ranks       - Final rank for ?tickers=A,B,C");
    println!("  GET   /api/buy         - Top ranked tickers with price");
    println!("  GET   /api/ticker      - Ticker detail ?ticker=X");
    println!("  PATCH /api/ticker      - Checklist membership and notes");
    println!("  GET   /api/db-test     - Sample snapshot rows");
    println!("\n  Schema: {}", config.schema);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// DB check command
// ============================================================================

async fn cmd_db_check(config: &Config) -> anyhow::Result<()> {
    let db = open_database(config).await?;
    let columns = ColumnCache::new();
    let repo = TickerRepository::new(db.pool(), &columns, &config.schema);

    repo.ping()
        .await
        .map_err(|e| anyhow::anyhow!("Database ping failed: {}", e))?;
    let sample = repo
        .any_snapshot_ticker()
        .await
        .map_err(|e| anyhow::anyhow!("Snapshot read failed: {}", e))?;

    match sample {
        Some(ticker) => println!("Connection OK. Sample ticker: {}", ticker),
        None => println!("Connection OK. Snapshot table is empty"),
    }
    Ok(())
}

// ============================================================================
// Portfolio commands: local store + ranking API
// ============================================================================

async fn cmd_portfolio(config: &Config, action: PortfolioAction) -> anyhow::Result<()> {
    let store = JsonFileStore::new(&config.portfolio_path);

    match action {
        PortfolioAction::Show { api } => {
            let portfolio = store.load().await;
            println!("Store: {}", store.path().display());
            let client = RankingClient::new(api.as_deref().unwrap_or(&config.api_url))?;
            show_portfolio(&portfolio, &client).await;
        }
        PortfolioAction::Add {
            ticker,
            quantity,
            price,
        } => {
            let mut portfolio = store.load().await;
            if !portfolio.merge_holding(&ticker, quantity, price) {
                anyhow::bail!(
                    "Ticker, quantity and price must be non-empty and positive, and the position value must fit"
                );
            }
            store.save(&portfolio).await?;
            if let Some(h) = portfolio.get(&ticker) {
                println!(
                    "{}: {} shares @ {} (avg)",
                    h.ticker,
                    h.quantity.normalize(),
                    h.price.round_dp(2)
                );
            }
        }
        PortfolioAction::Remove { ticker } => {
            let mut portfolio = store.load().await;
            if portfolio.remove_holding(&ticker) {
                store.save(&portfolio).await?;
                println!("Removed {}", ticker.trim().to_uppercase());
            } else {
                println!("{} is not in the portfolio", ticker.trim().to_uppercase());
            }
        }
        PortfolioAction::Plan { amount, api } => {
            let portfolio = store.load().await;
            let client = RankingClient::new(api.as_deref().unwrap_or(&config.api_url))?;
            plan_purchase(&portfolio, &client, amount).await?;
        }
    }

    Ok(())
}

async fn show_portfolio(portfolio: &Portfolio, client: &RankingClient) {
    if portfolio.is_empty() {
        println!("Portfolio is empty");
    }

    let tickers: Vec<String> = portfolio.holdings().iter().map(|h| h.ticker.clone()).collect();
    let ranks: HashMap<String, Option<i64>> = match client.ranks(&tickers).await {
        Ok(ranks) => ranks,
        Err(e) => {
            warn!(api = client.base_url(), "Ranks unavailable: {}", e);
            HashMap::new()
        }
    };
    let top = match client.buy_candidates().await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(api = client.base_url(), "Buy candidates unavailable: {}", e);
            Vec::new()
        }
    };

    if !portfolio.is_empty() {
        let pct = portfolio.percentages();
        println!(
            "\n  {:<8} {:>10} {:>10} {:>14} {:>8} {:>6}",
            "Ticker", "Qty", "Avg", "Value", "%", "Rank"
        );
        println!("  {}", "-".repeat(61));
        for h in portfolio.holdings() {
            let rank = ranks
                .get(&h.ticker)
                .copied()
                .flatten()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<8} {:>10} {:>10} {:>14} {:>7}% {:>6}",
                h.ticker,
                h.quantity.normalize(),
                h.price.round_dp(2),
                h.value().round_dp(2),
                pct.get(&h.ticker).copied().unwrap_or_default().round_dp(2),
                rank
            );
        }
        println!("  {}", "-".repeat(61));
        println!("  Total: {}", portfolio.total_value().round_dp(2));
    }

    let suggestions = suggest(portfolio, &ranks, &top, HOLD_RANK_THRESHOLD);
    if !suggestions.is_empty() {
        println!("\nSuggestions (hold below rank {}):", HOLD_RANK_THRESHOLD);
        for s in &suggestions {
            let rank = s.final_rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
            println!("  {:<5} {:<8} rank {}", s.action, s.ticker, rank);
        }
    }
    println!();
}

async fn plan_purchase(
    portfolio: &Portfolio,
    client: &RankingClient,
    amount: Decimal,
) -> anyhow::Result<()> {
    if amount <= Decimal::ZERO {
        anyhow::bail!("Amount must be positive");
    }

    let top = client.buy_candidates().await?;
    let plan = build_equal_weight_plan(amount, &top);
    if plan.items.is_empty() {
        println!("No ranked tickers available");
        return Ok(());
    }

    let cart: Vec<CartItem> = plan.items.iter().map(CartItem::from).collect();
    let summary = cart_breakdown(portfolio, &cart);

    println!("\n=== Equal-weight plan for {} ===", amount.round_dp(2));
    println!(
        "  {:<8} {:>10} {:>6} {:>12} {:>8} {:>10}",
        "Ticker", "Price", "Qty", "Cost", "% cart", "% wallet"
    );
    println!("  {}", "-".repeat(59));
    for (item, line) in plan.items.iter().zip(&summary.lines) {
        println!(
            "  {:<8} {:>10} {:>6} {:>12} {:>7}% {:>9}%",
            item.ticker,
            item.price.round_dp(2),
            item.quantity.normalize(),
            item.cost.round_dp(2),
            line.cart_pct.round_dp(2),
            line.portfolio_pct.round_dp(2)
        );
    }
    println!("  {}", "-".repeat(59));
    println!(
        "  Cart: {} | Leftover: {} | Portfolio after: {}\n",
        summary.cart_total.round_dp(2),
        plan.leftover.round_dp(2),
        summary.combined_total.round_dp(2)
    );

    Ok(())
}
