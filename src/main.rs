//! netcored daemon entry point.
//!
//! Loads the configuration, wires the collaborating services together and
//! runs the activation core until SIGINT or SIGTERM. SIGHUP reloads the
//! configuration.

use std::{error::Error, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use netcored::{
    config::ConfigPaths,
    config_store::ConfigStore,
    manager::{Manager, ManagerContext},
    services::{
        SessionMonitor,
        auth::policy_backend,
        bus::{BusManager, ZbusConnector},
        connectivity::HttpCheck,
        platform::SysfsPlatform,
        settings::MemorySettings,
        vpn::NoVpnService,
    },
    tracing_config,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{Level, error, info, span, warn};

/// Connection activation daemon.
#[derive(Parser, Debug)]
#[command(name = "netcored", version, about)]
struct Args {
    /// Main configuration file; defaults to `NETCORED_CONFIG` or
    /// `/etc/netcored/netcored.toml`.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Do not listen on the private peer-to-peer socket.
    #[arg(long)]
    no_private_socket: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(ConfigPaths::main_config);
    let config_store = if path.exists() {
        ConfigStore::load(&path)?
    } else {
        ConfigStore::with_defaults()
    };

    if args.print_config {
        print!("{}", toml::to_string_pretty(config_store.get_current().config())?);
        return Ok(());
    }

    let _guard = tracing_config::init(&config_store.get_current().config().logging)?;
    if !path.exists() {
        warn!(path = %path.display(), "Configuration file not found, using defaults");
    }

    let _span = span!(Level::INFO, "netcored").entered();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args, config_store))
}

async fn run(args: Args, config_store: ConfigStore) -> Result<(), Box<dyn Error>> {
    info!("Starting netcored");

    let config = config_store.get_current();
    let main = &config.config().main;
    let bus_config = &config.config().bus;

    let settings = Arc::new(MemorySettings::new(config.config().connections.clone()));
    let sessions = SessionMonitor::from_config(main.session_tracking).await;
    let policy = policy_backend(main.auth_polkit, sessions.clone()).await;

    let mut bus = BusManager::new(
        Arc::new(ZbusConnector),
        Duration::from_millis(bus_config.reconnect_interval_ms),
    );
    bus.start().await;
    if !args.no_private_socket {
        if let Some(socket) = &bus_config.private_socket {
            if let Err(err) = bus.private_server_setup("private", socket).await {
                warn!(error = %err, "Private socket unavailable");
            }
        }
    }

    let manager = Manager::spawn(ManagerContext {
        config: config_store,
        settings,
        platform: Arc::new(SysfsPlatform::default()),
        policy,
        sessions,
        vpn: Arc::new(NoVpnService),
        bus,
        connectivity: Arc::new(HttpCheck::new()?),
    })
    .await?;

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => match manager.reload_config().await {
                Ok(flags) => info!(?flags, "Configuration reloaded"),
                Err(err) => error!(error = %err, "Configuration reload failed"),
            },
            _ = terminate.recv() => break,
            _ = interrupt.recv() => break,
        }
    }

    info!("Shutting down");
    manager.shutdown().await?;
    Ok(())
}
