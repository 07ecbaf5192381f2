//! Callcheck - call-readiness diagnostics
//!
//! Entry point for the command-line application.

use anyhow::Result;
use callcheck::render;
use callcheck::{AppConfig, Diagnostics, ExportFormat};
use callcheck_core::probe::transport::HttpTransport;
use callcheck_server::AppState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "callcheck",
    version,
    about = "Check whether this machine is ready for video calls"
)]
struct Cli {
    /// Config file (default: <data_dir>/callcheck/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for daily log files, overriding the config
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Time HEAD requests to a host
    Ping {
        #[arg(long)]
        host: Option<String>,
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
    /// Simulated route trace with growing per-hop deadlines
    Trace {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        max_hops: Option<u32>,
    },
    /// Download, upload, latency and loss with a call-readiness verdict
    Speed {
        /// Payload size in bytes
        #[arg(long)]
        download_bytes: Option<u64>,
    },
    /// DNS, HTTP, HTTPS and CDN timings with network type and VPN guesses
    Advanced,
    /// Host, address and location details
    System,
    /// Speed and system tests with one overall verdict
    Quick {
        /// Write the JSON report here
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write the CSV report here
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Sample microphone activity
    #[cfg(feature = "device-capture")]
    Mic {
        /// Capture device name (default: system default input)
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// List capture devices
    #[cfg(feature = "device-capture")]
    Devices,
    /// Serve the HTTP and WebSocket API
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the config path and effective settings
    Config {
        /// Write the effective settings back to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path);
    if let Some(dir) = cli.log_dir.clone() {
        config.log_dir = Some(dir);
    }
    let _log_guard = callcheck::logging::init(
        callcheck::logging::DEFAULT_FILTER,
        config.log_dir.as_deref(),
    )?;

    tracing::info!(version = callcheck::VERSION, "Starting callcheck");

    match cli.command {
        Command::Config { save } => {
            println!("{}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save(&config_path)?;
            }
        }
        Command::Serve { bind, port } => {
            let mut server_config = config.server_config();
            if let Some(bind) = bind {
                server_config.bind_addr = bind;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            let state = AppState::with_new_session(HttpTransport::new()?, server_config);
            callcheck_server::start_server(state).await?;
        }
        #[cfg(feature = "device-capture")]
        Command::Devices => {
            let devices = callcheck_core::media::device::list_devices()?;
            if devices.inputs.is_empty() {
                println!("No input devices found.");
            }
            for name in &devices.inputs {
                let marker = if devices.microphone.as_ref() == Some(name) {
                    " [DEFAULT]"
                } else {
                    ""
                };
                println!("  {}{}", name, marker);
            }
        }
        command => run_probe_command(command, config).await?,
    }

    Ok(())
}

async fn run_probe_command(command: Command, mut config: AppConfig) -> Result<()> {
    if let Command::Speed {
        download_bytes: Some(bytes),
    } = &command
    {
        config.download_bytes = *bytes;
    }
    let diag = Diagnostics::new(HttpTransport::new()?, config);

    match command {
        Command::Ping { host, count } => {
            let summary = diag.ping(host, count).await?;
            print!("{}", render::ping(&summary));
        }
        Command::Trace { host, max_hops } => {
            let summary = diag.traceroute(host, max_hops).await?;
            print!("{}", render::traceroute(&summary));
        }
        Command::Speed { .. } => {
            let measurement = diag.speed().await?;
            print!("{}", render::speed(&measurement));
        }
        Command::Advanced => {
            let summary = diag.advanced().await?;
            print!("{}", render::advanced(&summary));
        }
        Command::System => {
            let info = diag.system().await?;
            print!("{}", render::system(&info));
        }
        Command::Quick { json, csv } => {
            println!("Running quick test...");
            let summary = diag.quick().await?;
            print!("{}", render::quick(&summary));

            if let Some(path) = json {
                diag.export(ExportFormat::Json, &path)?;
                println!("JSON report written to {}", path.display());
            }
            if let Some(path) = csv {
                diag.export(ExportFormat::Csv, &path)?;
                println!("CSV report written to {}", path.display());
            }
        }
        #[cfg(feature = "device-capture")]
        Command::Mic { device, seconds } => {
            use callcheck_core::media::device::CpalSource;
            use callcheck_core::media::FilePermissionStore;

            let mut source = CpalSource::new(device.or_else(|| diag.config().mic_device.clone()));
            let store = FilePermissionStore::new(FilePermissionStore::default_path());
            println!("Listening for {} s...", seconds);
            match diag
                .media(&mut source, std::time::Duration::from_secs(seconds), &store)
                .await?
            {
                Ok(summary) => print!("{}", render::media(&summary)),
                Err(reason) => println!("Microphone test failed: {}", reason),
            }
        }
        _ => {}
    }

    Ok(())
}
