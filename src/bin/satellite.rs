use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vigil::agent::SatelliteAgent;

#[derive(Debug, Clone, Parser)]
#[command(name = "satellite", about = "Remote probe node")]
struct Args {
    /// Base URL of the master, e.g. http://master:8080
    #[arg(long, env = "MASTER_URL")]
    master_url: String,

    /// This satellite's id; must match a satellite entry in the
    /// master's config
    #[arg(long, env = "SATELLITE_ID")]
    id: String,
}

fn init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vigil=info,satellite=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();

    let agent = SatelliteAgent::new(&args.id, &args.master_url);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(async move { agent.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutting down satellite");
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
    info!("satellite exited");
    Ok(())
}
