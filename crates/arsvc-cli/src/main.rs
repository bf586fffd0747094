//! Operator CLI for the ansible-runner service. Thin wrapper over the
//! same library crates the daemon and worker binaries use — no logic
//! lives here beyond argument parsing and process wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use arsvc_cache::EphemeralStore;
use arsvc_config::AppConfig;
use arsvc_queue::WorkQueue;
use arsvc_runner::AnsibleCliRunner;
use arsvc_store::JobStore;
use clap::{Parser, Subcommand};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "arsvc")]
#[command(about = "Ansible runner service operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Start the HTTP request-intake daemon (same process arsvc-daemon runs).
    Serve {
        /// Override ARSVC_DAEMON_ADDR
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Start a worker pool that dequeues and executes jobs.
    Worker {
        /// Max concurrently running jobs
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = arsvc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = arsvc_db::status(&pool).await?;
                    println!("db_ok={} has_jobs_table={}", s.ok, s.has_jobs_table);
                }
                DbCmd::Migrate => {
                    arsvc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Serve { addr } => {
            let config = Arc::new(AppConfig::from_env().context("failed to load configuration")?);

            let pool = arsvc_db::connect(&config.database_url).await?;
            arsvc_db::migrate(&pool).await?;
            let cache = EphemeralStore::connect(&config.redis_url).await?;
            let queue = WorkQueue::connect(&config.redis_url).await?;

            match arsvc_daemon::recovery::recover_stale_jobs(
                &pool,
                &cache,
                config.stale_running_threshold,
            )
            .await
            {
                Ok(n) if n > 0 => info!(recovered = n, "startup recovery marked abandoned jobs as failed"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "startup recovery failed, continuing anyway"),
            }

            let store = JobStore::new(pool, cache, config.job_ttl);
            let state = arsvc_daemon::state::AppState::new(store, queue, Arc::clone(&config));

            let app = arsvc_daemon::routes::build_router(state)
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive());

            let bind_addr = addr
                .or_else(bind_addr_from_env)
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
            info!("arsvc serve listening on http://{}", bind_addr);

            axum::serve(tokio::net::TcpListener::bind(bind_addr).await?, app)
                .await
                .context("server crashed")?;
        }

        Commands::Worker { concurrency } => {
            let config = Arc::new(AppConfig::from_env().context("failed to load configuration")?);

            let pool = arsvc_db::connect(&config.database_url).await?;
            let cache = EphemeralStore::connect(&config.redis_url).await?;
            let queue = WorkQueue::connect(&config.redis_url).await?;
            let store = JobStore::new(pool, cache, config.job_ttl);

            info!(concurrency, "arsvc worker starting");
            arsvc_worker::WorkerPool::new(
                queue,
                store,
                Arc::clone(&config),
                Arc::new(AnsibleCliRunner),
                concurrency,
            )
            .run()
            .await;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(arsvc_config::ENV_DAEMON_ADDR).ok()?.parse().ok()
}
