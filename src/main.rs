use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use matchday::adapters::{
    FeedRegistry, PostgresStore, RateLimiter, SoccerFeed, UsSportsFeed,
};
use matchday::cli::{parse_cursor, parse_job, parse_leagues, Cli, Commands};
use matchday::config::{AppConfig, LoggingConfig};
use matchday::domain::{RunType, TriggerRequest};
use matchday::error::{MatchdayError, Result};
use matchday::leagues::{league_spec, FeedDialect};
use matchday::pipeline::Orchestrator;
use matchday::services::ApiServer;
use matchday::settlement::LoggingSettlementWorker;
use matchday::store::LifecycleStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            job,
            leagues,
            cursor,
        } => {
            init_logging(&config.logging);
            let job = parse_job(&job)?;
            let cursor = parse_cursor(cursor.as_deref())?;
            let leagues = parse_leagues(leagues.as_deref());

            let orchestrator = Arc::new(build_orchestrator(&config).await?);
            wire_cancel_on_ctrl_c(&orchestrator);

            let report = orchestrator
                .trigger(TriggerRequest {
                    job,
                    leagues,
                    cursor,
                    run_type: RunType::Manual,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { port } => {
            init_logging(&config.logging);
            let orchestrator = Arc::new(build_orchestrator(&config).await?);
            let server = ApiServer::new(
                orchestrator.clone(),
                config.server.host.clone(),
                port.unwrap_or(config.server.port),
            );

            tokio::select! {
                result = server.run() => result?,
                _ = signal::ctrl_c() => {
                    info!("shutdown signal received, cancelling in-flight runs");
                    orchestrator.cancel_flag().cancel();
                }
            }
        }
        Commands::Status => {
            init_logging_simple();
            let store = connect_store(&config).await?;
            let overview = store.status_overview().await?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        Commands::Migrate => {
            init_logging_simple();
            let store = connect_store(&config).await?;
            store.migrate().await?;
            info!("migrations applied");
        }
    }

    Ok(())
}

fn load_config(config_dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    config
        .validate()
        .map_err(|errors| MatchdayError::ConfigValidation(errors.join("; ")))?;
    Ok(config)
}

async fn connect_store(config: &AppConfig) -> Result<PostgresStore> {
    PostgresStore::new(&config.database.url, config.database.max_connections).await
}

async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let store = connect_store(config).await?;

    let limiter = Arc::new(RateLimiter::per_minute(
        config.provider.requests_per_minute,
        config.provider.burst,
    ));
    let us_feed = Arc::new(UsSportsFeed::new(
        config.provider.api_key.clone(),
        limiter.clone(),
    )?);
    let soccer_feed = Arc::new(SoccerFeed::new(config.provider.api_key.clone(), limiter)?);

    let mut feeds = FeedRegistry::new();
    let enabled = config
        .enabled_leagues()
        .map_err(MatchdayError::ConfigValidation)?;
    for league in enabled {
        match league_spec(league).dialect {
            FeedDialect::UsSports => feeds.register(league, us_feed.clone()),
            FeedDialect::Soccer => feeds.register(league, soccer_feed.clone()),
        }
    }

    Ok(Orchestrator::new(
        Arc::new(store),
        feeds,
        Arc::new(LoggingSettlementWorker),
        config.pipeline.clone(),
    ))
}

fn wire_cancel_on_ctrl_c(orchestrator: &Arc<Orchestrator>) {
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current unit then stopping");
            cancel.cancel();
        }
    });
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},matchday=debug,sqlx=warn", logging.level))
    });

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so writability is checked up front.
    let file_layer = if logging.dir.is_empty() {
        None
    } else if std::fs::create_dir_all(&logging.dir).is_ok() {
        let test_path = std::path::Path::new(&logging.dir).join(".matchday_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&logging.dir, "matchday.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process.
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    logging.dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            logging.dir
        );
        None
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/matchday.log", logging.dir);
    }
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
