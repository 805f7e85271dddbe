use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use hikebot::config::HikeConfig;
use hikebot::seed::osm::OsmClient;
use hikebot::seed::{self, DEFAULT_POINT_DIST_M, DEFAULT_TABLE, PointArg, SeedArea};
use hikebot::server;

#[derive(Parser)]
#[command(name = "hikebot")]
#[command(version, about = "Hiking group chat server with trail matching and AI trip announcements")]
pub struct Cli {
    /// Path to hikebot.toml (defaults to ./hikebot.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path. Overrides config and HIKEBOT_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API, WebSocket and dashboard server
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Permissive CORS for local frontend development
        #[arg(long)]
        dev: bool,
    },
    /// Create or migrate the database tables, then exit
    InitDb,
    /// Load trails from OpenStreetMap into the database
    Seed {
        /// Place name to geocode. Repeatable. Defaults to the configured places.
        #[arg(long = "place")]
        places: Vec<String>,
        /// Seed around a point instead, given as LAT,LON
        #[arg(long)]
        point: Option<String>,
        /// Radius around --point in meters
        #[arg(long, default_value_t = DEFAULT_POINT_DIST_M)]
        dist: f64,
        /// Target table (replaced)
        #[arg(long, default_value = DEFAULT_TABLE)]
        table: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => fmt().with_env_filter(filter).init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = HikeConfig::resolve(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.server.db_path = db.clone();
    }
    for problem in config.validate() {
        warn!("Config: {}", problem);
    }

    match cli.command {
        Commands::Serve { port, host, dev } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if dev {
                config.server.cors_permissive = true;
            }
            server::start_server(config).await?;
        }
        Commands::InitDb => {
            server::open_database(&config)?;
            info!(path = %config.server.db_path.display(), "Database ready");
        }
        Commands::Seed {
            places,
            point,
            dist,
            table,
        } => {
            let areas = match point {
                Some(raw) => {
                    let PointArg(center) = raw.parse::<PointArg>()?;
                    if dist <= 0.0 {
                        bail!("--dist must be positive");
                    }
                    vec![SeedArea::Point { center, dist_m: dist }]
                }
                None if !places.is_empty() => places.into_iter().map(SeedArea::Place).collect(),
                None => config
                    .seed
                    .default_places
                    .iter()
                    .cloned()
                    .map(SeedArea::Place)
                    .collect(),
            };
            if areas.is_empty() {
                bail!("No areas to seed: pass --place or --point, or set seed.default_places");
            }

            let db = server::open_database(&config)?;
            let source = OsmClient::new(&config.seed).context("Failed to build OSM client")?;
            let report = seed::run_seed(&db, &source, &areas, &table).await?;
            info!(
                table = %table,
                seeded = report.areas_seeded,
                failed = report.areas_failed,
                rows = report.rows_written,
                "Seeding complete"
            );
        }
    }

    Ok(())
}
