//! Switchboard host entry point.
//!
//! Starts the command host that serves connected clients over WebSocket
//! and answers `GET /api` with the domain registry snapshot.

use clap::Parser;
use switchboard_host::{DEFAULT_PORT_START, DEFAULT_PORT_WINDOW, Host, HostConfig, MaintenanceRequest};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Switchboard host - extensible command server
#[derive(Parser, Debug)]
#[command(name = "switchboard-host")]
#[command(version, about, long_about = None)]
struct Args {
    /// First port to try when scanning for a free one
    #[arg(long, default_value_t = DEFAULT_PORT_START)]
    port_start: u16,

    /// Number of ports to scan before giving up
    #[arg(long, default_value_t = DEFAULT_PORT_WINDOW)]
    port_window: u16,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("switchboard-host-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("switchboard-host.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    info!("Starting switchboard host...");

    loop {
        let mut host = Host::start(HostConfig {
            port_start: args.port_start,
            port_window: args.port_window,
            ..HostConfig::default()
        })
        .await?;

        println!("{}", host.port());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                host.shutdown();
                break;
            }
            request = host.wait_maintenance() => match request {
                Some(MaintenanceRequest::Restart) => {
                    info!("restart requested, recycling listener");
                    host.shutdown();
                }
                None => {
                    host.shutdown();
                    break;
                }
            }
        }
    }

    info!("Switchboard host stopped");
    Ok(())
}
