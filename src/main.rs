use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use civ_ledger::api::{build_router, handle_event, AppState};
use civ_ledger::config::AppConfig;
use civ_ledger::fetch::HttpGameSource;
use civ_ledger::models::{PersonStat, ProfileId, ProfileReport, RankedStats};
use civ_ledger::storage::Storage;

const TOP_N: usize = 10;

#[derive(Parser)]
#[command(name = "civ-ledger")]
#[command(about = "Cache aoe4world match history and compute win/loss statistics")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Cache directory or s3://bucket/prefix (overrides config and GAME_STORAGE_PATH)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a profile's games and print its statistics
    Analyze {
        /// aoe4world profile ID
        profile_id: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the serverless handler on a JSON event file ("-" reads stdin)
    Event { path: String },
}

fn build_state(config: &AppConfig) -> Result<AppState> {
    let source = HttpGameSource::new(config.fetcher_config())?;
    Ok(AppState {
        source: Arc::new(source),
        store: Arc::new(Storage::new(config.s3_options())),
        storage: Arc::new(config.storage_config()),
        max_pages: config.api.max_pages,
    })
}

fn print_people(title: &str, people: &RankedStats<PersonStat>) {
    println!("\n{}:", title);
    if people.is_empty() {
        println!("  (none)");
    }
    for (name, stat) in people.top(TOP_N) {
        println!(
            "  {}: {} games, {} wins, {} losses",
            name, stat.games, stat.wins, stat.losses
        );
    }
}

fn print_report(report: &ProfileReport) {
    let m = &report.analysis.match_stats;
    println!(
        "Profile {}: {} games analyzed ({} new)",
        report.profile_id, report.games_count, report.new_games
    );
    println!(
        "Matches: {} total, {} wins, {} losses",
        m.total, m.wins, m.losses
    );

    println!("\nCivilizations:");
    for (civ, stat) in report.analysis.civ_stats.top(TOP_N) {
        println!(
            "  {}: {} games, {} wins, {} losses ({:.1}%)",
            civ, stat.total, stat.wins, stat.losses, stat.win_rate
        );
    }

    print_people("Top 10 Enemies", &report.analysis.opponents);
    print_people("Top 10 Allies", &report.analysis.allies);

    let t = &report.trends;
    println!("\nTrends:");
    println!("  Average game length: {}", t.average_game_length);
    println!("  Current win streak:  {}", t.current_win_streak);
    println!(
        "  Win rate (last 10 / last 50): {}% / {}%",
        t.win_rate_last_10, t.win_rate_last_50
    );
}

fn read_event(path: &str) -> Result<serde_json::Value> {
    let text = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
    };
    serde_json::from_str(&text).context("Event is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(Path::new(&cli.config))
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    if let Some(root) = &cli.data_dir {
        config.storage.root = root.clone();
        config.validate()?;
    }

    // Initialize tracing
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with(
            (!cli.json_logs)
                .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    tracing::info!("Starting civ-ledger v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze { profile_id, json } => {
            let profile_id: ProfileId = profile_id.parse()?;
            let state = build_state(&config)?;
            let report = state.analyze(profile_id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Serve { host, port } => {
            let state = build_state(&config)?;
            let app = build_router(state, &config.server.cors_origin);
            let addr = format!(
                "{}:{}",
                host.unwrap_or(config.server.host),
                port.unwrap_or(config.server.port)
            );
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Event { path } => {
            let event = read_event(&path)?;
            let state = build_state(&config)?;
            let response = handle_event(&state, &event).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
