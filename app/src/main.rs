use clap::{Parser, Subcommand};
use jb_board::Board;
use jb_board_redis::{RedisBoard, RedisBoardConfig};
use jb_board_sqlite::{SqliteBoard, SqliteBoardConfig};
use jb_config::{BoardBackend, ConductorMode, Config};
use jb_conductor::{Conductor, ConductorOptions, DispatchMode};
use jb_core::{Priority, Result};
use jb_engine::{Flow, FlowFactory, NoopEngineLoader};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Distributed workflow jobboard conductor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a conductor against the configured board until signalled to stop
    Serve,
    /// Post an ad-hoc job by name
    Post {
        name: String,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Trash every job currently on the board
    Killall,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    jb_core::telemetry::init_tracing(
        config.logging.json,
        &config.logging.level,
        "jobboard-conductor",
    );
    tracing::debug!(?config, "configuration loaded");

    let (board, persistence) = match build_board(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "failed to construct board backend");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config, board, persistence).await,
        Commands::Post { name, priority } => post(board, &name, &priority).await,
        Commands::Killall => killall(board).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        process::exit(1);
    }
}

async fn build_board(
    config: &Config,
) -> Result<(Arc<dyn Board>, Arc<dyn jb_engine::Persistence>)> {
    let (board, persistence): (Arc<dyn Board>, Arc<dyn jb_engine::Persistence>) =
        match config.board.backend {
            BoardBackend::Sqlite => {
                let sqlite_config = SqliteBoardConfig {
                    session_ttl_seconds: config.board.sqlite.session_ttl_seconds as i64,
                    ..SqliteBoardConfig::default()
                };
                let board = Arc::new(SqliteBoard::open(&config.board.sqlite.path, sqlite_config).await?);
                let persistence = board.persistence();
                (board, persistence)
            }
            BoardBackend::Redis => {
                let pool_config = deadpool_redis::Config::from_url(config.board.redis.url.clone());
                let pool = pool_config
                    .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                    .map_err(|e| jb_core::Error::Config(format!("redis pool: {e}")))?;
                let redis_config = RedisBoardConfig {
                    lease_seconds: config.board.redis.lease_seconds as i64,
                    root: config.board.root.clone(),
                };
                let board = Arc::new(RedisBoard::new(pool, redis_config));
                let persistence = board.persistence();
                (board, persistence)
            }
        };
    board.connect().await?;
    Ok((board, persistence))
}

/// Builds a conductor running [`NoopEngineLoader`]. The real task-graph
/// runner this conductor would drive is out of scope here; operators
/// supply their own [`jb_engine::engines::EngineLoader`] by swapping this
/// construction site for one backed by their engine.
async fn serve(
    config: Config,
    board: Arc<dyn Board>,
    persistence: Arc<dyn jb_engine::Persistence>,
) -> Result<()> {
    let options = ConductorOptions {
        wait_timeout: Duration::from_secs_f64(config.conductor.wait_timeout_seconds),
        job_compiler_error_limit: config.conductor.job_compiler_error_limit,
        worker_pool_size: config.conductor.worker_pool_size,
        dispatch_mode: match config.conductor.mode {
            ConductorMode::Blocking => DispatchMode::Blocking,
            ConductorMode::Nonblocking => DispatchMode::NonBlocking,
        },
        ..ConductorOptions::default()
    };

    let conductor = Arc::new(Conductor::new(
        &config.conductor.name,
        board.clone(),
        persistence,
        Arc::new(NoopEngineLoader),
        options,
    )?);
    conductor.connect().await?;
    tracing::info!(owner = %conductor.owner_id(), "conductor started");

    let runner = conductor.clone();
    let run_handle = tokio::spawn(async move { runner.run(config.conductor.max_dispatches).await });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| jb_core::Error::Config(format!("signal handler: {e}")))?;
    tracing::info!("shutdown signal received");

    conductor.stop();
    conductor.wait(Duration::from_secs(30)).await;
    conductor.close().await?;

    match run_handle.await {
        Ok(result) => result,
        Err(e) => Err(jb_core::Error::Config(format!("conductor task panicked: {e}"))),
    }
}

async fn post(board: Arc<dyn Board>, name: &str, priority: &str) -> Result<()> {
    let priority = match priority.to_ascii_lowercase().as_str() {
        "high" => Priority::High,
        "normal" => Priority::Normal,
        "low" => Priority::Low,
        other => {
            return Err(jb_core::Error::JobFailure(format!(
                "unknown priority: {other}"
            )))
        }
    };

    let job_name = name.to_string();
    let factory = FlowFactory::from_fn(move |store| Ok(Flow::new(job_name.clone(), store.clone())));
    let job = board
        .post(name, factory, Default::default(), priority)
        .await?;
    println!("posted job {} ({})", job.uuid, job.name);
    board.close().await
}

async fn killall(board: Arc<dyn Board>) -> Result<()> {
    let trashed = board.killall().await?;
    println!("trashed {} job(s)", trashed.len());
    board.close().await
}
