use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vigil::api::{self, ApiState};
use vigil::config::ConfigManager;
use vigil::fleet::FleetCoordinator;
use vigil::scheduler::Scheduler;
use vigil::storage::{MetricStore, SqliteStore};

#[derive(Debug, Clone, Parser)]
#[command(name = "master", about = "Synthetic-monitoring master")]
struct Args {
    /// Config file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/config.yml")]
    config: String,

    /// SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "vigil.db")]
    db: String,

    /// API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

fn init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vigil=info,master=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    // Bootstrap failures are the only fatal ones: an unreadable config
    // or an unopenable database aborts startup. Everything after this
    // point degrades and logs instead of exiting.
    let config = ConfigManager::load(&args.config)?;
    config.watch()?;

    let store: Arc<dyn MetricStore> = Arc::new(SqliteStore::new(&args.db).await?);

    let scheduler = Scheduler::new(Arc::clone(&config), Arc::clone(&store));
    scheduler.start().await;
    info!("scheduler started");

    let fleet = FleetCoordinator::new(Arc::clone(&config), Arc::clone(&store));
    fleet.start();
    info!("fleet coordinator started");

    let state = ApiState::new(Arc::clone(&config), Arc::clone(&store), Arc::clone(&fleet));
    api::serve(args.listen, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    info!("shutting down");
    scheduler.stop().await;
    fleet.stop().await;
    config.close().await;
    store.close().await;
    info!("master exited");
    Ok(())
}
