//! XBridge packet sender
//!
//! Sends one bridge app transaction on the active network and follows the
//! resulting vIBC packet until it is acknowledged.
//!
//! # Commands
//!
//! - `xbridge bridge`     - `XBridge.bridge` over `sendPacket`
//! - `xbridge withdraw`   - `XBridge.withdraw` over `sendPacket`
//! - `xbridge uc-bridge`  - `XBridgeUC.bridge` over `sendUniversalPacket`
//! - `xbridge uc-deposit` - `XBridgeUC.deposit` over `sendUniversalPacket`
//!
//! The network comes from `NETWORK` (or `HARDHAT_NETWORK`), the packet config
//! from `CONFIG_PATH`. Any failure is logged and the process exits with 1.

use clap::{Parser, Subcommand};
use tracing::{error, info};

use xbridge::commands::{self, Command, RunOptions};
use xbridge::config::Config;

#[derive(Parser)]
#[command(name = "xbridge")]
#[command(about = "Send XBridge packets over Polymer vIBC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Network to send on (overrides NETWORK)
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// Packet config file (overrides CONFIG_PATH)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Native amount in ether (overrides the command's default)
    #[arg(long, global = true)]
    amount: Option<String>,

    /// Do not follow the packet after sending
    #[arg(long, global = true)]
    no_listen: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge native value to the counterpart chain
    Bridge,
    /// Request a withdrawal from the counterpart chain
    Withdraw,
    /// Bridge native value through the universal channel
    UcBridge,
    /// Deposit native value through the universal channel
    UcDeposit,
}

impl From<&Commands> for Command {
    fn from(value: &Commands) -> Self {
        match value {
            Commands::Bridge => Command::Bridge,
            Commands::Withdraw => Command::Withdraw,
            Commands::UcBridge => Command::UniversalBridge,
            Commands::UcDeposit => Command::UniversalDeposit,
        }
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli));

    if let Err(e) = result {
        error!(error = ?e, "Error sending packet");
        std::process::exit(1);
    }

    Ok(())
}

async fn async_main(cli: Cli) -> eyre::Result<()> {
    let mut config = Config::load(cli.network.as_deref())?;
    if let Some(path) = cli.config {
        config.config_path = path;
    }

    let command = Command::from(&cli.command);
    info!(
        command = command.name(),
        network = %config.network,
        config_path = %config.config_path.display(),
        "Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let options = RunOptions {
        amount: cli.amount,
        no_listen: cli.no_listen,
    };

    commands::execute(&config, command, &options, shutdown_rx).await
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,xbridge=debug"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
