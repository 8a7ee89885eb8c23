use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matcharr::{
    config::Config,
    database::Database,
    dispatcharr::DispatcharrClient,
    matching::patterns::DetectionKeywordService,
    providers::ProviderRegistry,
    scheduler::SchedulerService,
    services::{
        league_mappings::LeagueMappingService, progress::ProgressBus, team_cache::TeamCacheService,
    },
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "matcharr")]
#[command(version = "0.1.0")]
#[command(about = "Sports EPG engine: matches IPTV streams to live events")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("matcharr={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting matcharr v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    // Initialization order matters: mappings -> providers -> matcher state.
    let league_mappings = LeagueMappingService::load(database.pool()).await?;
    info!(
        "League mapping service initialized ({} mappings)",
        league_mappings.len()
    );

    let providers = ProviderRegistry::new(&config.providers, league_mappings.clone());
    info!("Provider registry initialized: {:?}", providers.names());

    let settings = matcharr::database::settings::get_settings(database.pool()).await?;
    let dispatcharr = DispatcharrClient::from_settings(
        &settings.dispatcharr,
        config.providers.dispatcharr_timeout_secs,
    )?;

    let team_cache = TeamCacheService::new(database.clone(), providers.clone());
    let progress = ProgressBus::new();

    // One pattern service shared by the scheduler's classifier and the
    // detection-keyword endpoints, so edits invalidate the live set
    let keyword_overrides =
        matcharr::database::keywords::list_detection_keywords(database.pool()).await?;
    let patterns = DetectionKeywordService::new(&keyword_overrides);

    let scheduler = SchedulerService::new(
        database.clone(),
        providers.clone(),
        league_mappings.clone(),
        dispatcharr.clone(),
        progress.clone(),
        patterns.clone(),
    );
    let scheduler_handle = scheduler.handle();

    tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Scheduler service failed: {}", e);
        }
    });
    info!("Lifecycle scheduler started");

    let web_server = WebServer::new(
        config,
        database,
        providers,
        league_mappings,
        team_cache,
        dispatcharr,
        progress,
        patterns,
        scheduler_handle,
    )
    .await?;

    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}
