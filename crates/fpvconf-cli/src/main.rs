//! fpvconf - Command-line tool for OpenIPC FPV devices
//!
//! Reads and edits device config files, copies files, runs maintenance
//! commands and drives firmware upgrades over SSH.

mod commands;
mod config;
mod dry_run;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use fpvconf_core::{DeviceKind, RemoteFile, Service};
use fpvconf_remote::{FirmwareImages, RemoteTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, DeviceArgs};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "fpvconf")]
#[command(author, version, about = "OpenIPC FPV device configurator")]
#[command(propagate_version = true)]
struct Cli {
    /// Device address
    #[arg(short = 'H', long, env = "FPVCONF_HOST")]
    host: Option<String>,

    /// SSH port
    #[arg(short, long, env = "FPVCONF_PORT")]
    port: Option<u16>,

    /// Login user
    #[arg(short, long, env = "FPVCONF_USER")]
    user: Option<String>,

    /// Login password
    #[arg(long, env = "FPVCONF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Device kind: camera or ground_station
    #[arg(short, long, env = "FPVCONF_KIND")]
    kind: Option<DeviceKind>,

    /// Configuration file path
    #[arg(short, long, env = "FPVCONF_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Talk to an in-memory demo device instead of the network
    #[arg(long)]
    mock: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the keys of a config file (wfb, majestic, telemetry, wifibroadcast, driver)
    Get {
        /// Config file name or remote path
        file: RemoteFile,
    },

    /// Change keys of a config file
    Set {
        /// Config file name or remote path
        file: RemoteFile,

        /// Assignments such as channel=36 or video0.fps=90
        #[arg(required = true, value_name = "KEY=VALUE")]
        assignments: Vec<String>,

        /// Restart the service that reads the file
        #[arg(long)]
        restart: bool,
    },

    /// Run a shell command on the device
    Exec {
        /// Command line, passed to the remote shell as is
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Copy a file or directory to the device
    Upload {
        local: PathBuf,
        remote: String,

        /// Copy a whole directory tree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Copy a file or directory from the device
    Download {
        remote: String,
        local: PathBuf,

        /// Copy a whole directory tree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Flash kernel and rootfs images with sysupgrade
    Upgrade {
        /// Kernel image (uImage)
        #[arg(long)]
        kernel: PathBuf,

        /// Root filesystem image (rootfs.squashfs)
        #[arg(long)]
        rootfs: PathBuf,

        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,
    },

    /// Find devices with SSH open on a /24 network
    Scan {
        /// First three octets, e.g. 192.168.1
        prefix: String,
    },

    /// Reboot the device
    Reboot,

    /// Show hostname and firmware version
    Hostname,

    /// Free UART0 for telemetry or give it back to the serial console
    Uart {
        #[arg(value_enum)]
        action: UartAction,
    },

    /// Generate a new WFB key pair on the device
    Keygen,

    /// Restart a service: wfb, majestic, telemetry, gs
    Restart { service: Service },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UartAction {
    Enable,
    Disable,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let args = DeviceArgs {
        host: cli.host.clone(),
        port: cli.port,
        username: cli.user.clone(),
        password: cli.password.clone(),
        kind: cli.kind,
    };
    let merged = config.merge_with_args(&args, cli.no_color);
    debug!(host = ?merged.host, port = merged.port, kind = %merged.kind, "Resolved device settings");
    let format = match (&config.output, cli.output) {
        (Some(name), OutputFormat::Table) => {
            <OutputFormat as ValueEnum>::from_str(name, true).unwrap_or(OutputFormat::Table)
        }
        (_, format) => format,
    };
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let transport = if cli.mock {
        ctx.info("Using in-memory demo device");
        RemoteTransport::with_timeouts(
            Arc::new(dry_run::demo_device()),
            merged.remote.timeouts.clone(),
        )
    } else {
        RemoteTransport::ssh(&merged.remote)
    };

    // Scan is the only command without a target
    if let Commands::Scan { prefix } = &cli.command {
        return commands::scan(prefix, &merged.remote.scan, &ctx).await;
    }

    let target = if cli.mock && merged.host.is_none() {
        fpvconf_core::DeviceTarget::new(
            "192.168.1.10",
            merged.port,
            &merged.username,
            &merged.password,
            merged.kind,
        )
    } else {
        merged.target()?
    };

    let result = match &cli.command {
        Commands::Get { file } => commands::get(&transport, &target, *file, &ctx).await,

        Commands::Set {
            file,
            assignments,
            restart,
        } => commands::set(&transport, &target, *file, assignments, *restart, &ctx).await,

        Commands::Exec { command } => {
            commands::exec(&transport, &target, &command.join(" "), &ctx).await
        }

        Commands::Upload {
            local,
            remote,
            recursive,
        } => commands::upload(&transport, &target, local, remote, *recursive, &ctx).await,

        Commands::Download {
            remote,
            local,
            recursive,
        } => commands::download(&transport, &target, remote, local, *recursive, &ctx).await,

        Commands::Upgrade {
            kernel,
            rootfs,
            deadline,
        } => {
            let images = FirmwareImages {
                kernel: kernel.clone(),
                rootfs: rootfs.clone(),
            };
            commands::upgrade(
                &transport,
                &target,
                &images,
                &merged.remote.upgrade,
                deadline.map(Duration::from_secs),
                &ctx,
            )
            .await
        }

        Commands::Reboot => commands::reboot(&transport, &target, &ctx).await,

        Commands::Hostname => commands::hostname(&transport, &target, &ctx).await,

        Commands::Uart { action } => {
            let enable = matches!(action, UartAction::Enable);
            commands::uart(&transport, &target, enable, &ctx).await
        }

        Commands::Keygen => commands::keygen(&transport, &target, &ctx).await,

        Commands::Restart { service } => {
            commands::restart(&transport, &target, *service, &ctx).await
        }

        Commands::Scan { .. } => Ok(()),
    };

    if let Err(e) = &result {
        ctx.error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
