use clap::Parser;
use client::network::{Client, ClientCommand};
use client::runtime::{EntityKind, EntityRuntime, SimulatedRuntime};
use log::info;
use rand::Rng;
use shared::Vec2;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:30110")]
    server: String,

    /// Player display name
    #[arg(short = 'n', long, default_value = "Bob")]
    name: String,

    /// Number of simulated entities to spawn and track
    #[arg(short = 'e', long, default_value = "3")]
    entities: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client as {:?}", args.name);
    info!("Connecting to: {}", args.server);

    let runtime = Arc::new(SimulatedRuntime::new());
    let mut handles = Vec::new();
    for i in 0..args.entities {
        let kind = if i % 2 == 0 {
            EntityKind::Vehicle
        } else {
            EntityKind::Ped
        };
        let pos = Vec2::new(100.0 + 10.0 * i as f32, 50.0);
        handles.push(runtime.spawn(kind, pos));
    }

    let (mut client, commands) = Client::new(&args.server, &args.name, Arc::clone(&runtime) as Arc<dyn EntityRuntime>).await?;

    tokio::spawn(drive_simulation(runtime, commands, handles));

    client.run().await
}

/// Demo driver: requests tracking for every simulated entity, then keeps
/// the world moving and publishes a sample `Speed` field alongside the
/// gate's own position updates.
async fn drive_simulation(
    runtime: Arc<SimulatedRuntime>,
    commands: mpsc::UnboundedSender<ClientCommand>,
    handles: Vec<u32>,
) {
    // Give the handshake a moment before issuing requests.
    sleep(Duration::from_millis(500)).await;

    for &handle in &handles {
        if commands
            .send(ClientCommand::RequestTrack { handle })
            .is_err()
        {
            return;
        }
    }

    let mut tick = interval(Duration::from_secs(1));

    loop {
        tick.tick().await;
        runtime.step(1.0);

        for &handle in &handles {
            let speed = match runtime.speed(handle) {
                Some(speed) => speed,
                None => continue,
            };

            let value = format!("{} mph", (speed * 2.2369).round());
            if commands
                .send(ClientCommand::SetField {
                    handle,
                    key: "Speed".to_string(),
                    value,
                })
                .is_err()
            {
                return;
            }
        }

        // Rarely kill an entity so the dead-entity untrack path gets
        // exercised end to end.
        if rand::thread_rng().gen_range(0..30) == 0 {
            if let Some(&handle) = handles.iter().find(|&&h| runtime.is_alive(h)) {
                info!("Demo: killing entity {}", handle);
                runtime.kill(handle);
            }
        }
    }
}
