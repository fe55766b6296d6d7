use clap::Parser;
use log::info;
use server::config::{split_host_port, TrackerConfig};
use server::network::Server;
use server::store::{MemoryStore, Store};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the UDP listener to
    #[arg(short = 'H', long, default_value = "127.0.0.1:30110")]
    bind: String,

    /// Backing store address (host:port, [host]:port for IPv6)
    #[arg(long, default_value = "127.0.0.1:6379")]
    store_addr: String,

    /// Logical database index within the store
    #[arg(long, default_value = "0")]
    store_db: u32,

    /// Minimum milliseconds between client update evaluations
    #[arg(short = 'i', long, default_value = "1000")]
    update_interval: u64,

    /// Minimum movement distance (units) before a position update is sent
    #[arg(short = 'm', long, default_value = "1")]
    movement_threshold: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (store_host, store_port) = split_host_port(&args.store_addr)?;
    info!(
        "Store endpoint {}:{} (db {})",
        store_host, store_port, args.store_db
    );

    // This build ships the in-process store behind the same trait a
    // network-attached backend would implement.
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    // No cross-restart persistence: start from a clean slate.
    store.flush();
    info!("Store flushed");

    let config = TrackerConfig::new(args.update_interval, args.movement_threshold);
    info!(
        "Tracking policy: interval {}ms, movement threshold {} (squared)",
        config.update_interval, config.movement_threshold
    );

    let mut server = Server::new(&args.bind, store, config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
