//! Elsinore Daemon (elsinored)
//!
//! Brewery temperature control on a single-board computer: 1-Wire probes
//! feed named PID controllers that drive heating and cooling GPIO pairs,
//! configured over a small JSON API.
//!
//! Startup order: store → settings → GPIO → registry hydration → scheduler
//! tasks → API server. Shutdown reverses it: stop the probe reader, drain
//! every controller loop (each drives its pins off on exit), turn every
//! switch off, then let the HTTP server finish in-flight requests.

mod scheduler;
mod server;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use els_core::constants::defaults;
use els_core::data::store::Database;
use els_core::devices::controller::ControllerMode;
use els_core::hw::gpio::{GpioDriver, MemoryGpio, RppalGpio};
use els_core::hw::probe::ProbeReading;
use els_core::runtime::Runtime;
use els_core::temperature::Temperature;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "elsinored", version, about = "Elsinore brewery controller")]
struct Cli {
    /// The port to listen on
    #[arg(long, default_value = defaults::PORT)]
    port: String,

    /// Enable the web console on /
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    graphiql: bool,

    /// The path/name of the local database, without extension
    #[arg(long = "db_name", default_value = defaults::DB_NAME)]
    db_name: String,

    /// Create a test device
    #[arg(long = "test_device", action = clap::ArgAction::Set, default_value_t = false)]
    test_device: bool,

    /// Restore controllers to their previous mode on startup
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    autostart: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_env("ELSINORE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("STARTUP: elsinored {} starting", VERSION);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> els_error::Result<()> {
    // Store first: everything else hangs off it
    let db = Arc::new(Database::open(format!("{}.db", cli.db_name))?);
    db.migrate()?;

    // GPIO: fall back to the in-memory driver off-target so the daemon
    // stays usable for development
    let gpio: Arc<dyn GpioDriver> = match RppalGpio::new() {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            warn!("No GPIO hardware available ({}), outputs are simulated", e);
            Arc::new(MemoryGpio::new())
        }
    };

    let runtime = Runtime::new(db, gpio)?;
    info!(
        "STARTUP: Starting {}",
        runtime.settings.read().await.brewery_name
    );

    runtime.registry.load_persisted().await?;
    if !cli.autostart {
        for controller in runtime.registry.controllers().await {
            controller.lock().await.mode = ControllerMode::Off;
        }
    }

    if cli.test_device {
        runtime.probes.insert(ProbeReading {
            phys_addr: defaults::TEST_PROBE_ADDRESS.to_string(),
            address: defaults::TEST_PROBE_ID,
            reading: Temperature::default(),
            updated: chrono::Utc::now(),
        });
        info!("STARTUP: Injected test probe {}", defaults::TEST_PROBE_ADDRESS);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe_reader = tokio::spawn(scheduler::probe_read_loop(
        runtime.clone(),
        shutdown_rx.clone(),
    ));
    let supervisor = tokio::spawn(scheduler::controller_supervisor(
        runtime.clone(),
        shutdown_rx.clone(),
    ));
    let api = tokio::spawn({
        let runtime = runtime.clone();
        let port = cli.port.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { server::serve(runtime, &port, cli.graphiql, shutdown_rx).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("SHUTDOWN: signal received");
    let _ = shutdown_tx.send(true);

    // Safe-shutdown ordering: probe reader, then every controller loop
    // (each resets its outputs), then the switches, then the server
    let _ = probe_reader.await;
    let _ = supervisor.await;
    runtime.registry.shutdown_all_switches().await;
    match api.await {
        Ok(result) => result?,
        Err(e) => warn!("API task ended abnormally: {}", e),
    }

    info!("SHUTDOWN: done");
    Ok(())
}
