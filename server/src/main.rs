use clap::Parser;
use log::{error, info};
use server::{spawn_server, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Side length of the square board
    #[clap(short, long, default_value_t = shared::GRID_SIZE)]
    grid_size: u32,
    /// Upper bound on one poll call in milliseconds
    #[clap(long, default_value = "100")]
    poll_timeout_ms: u64,
    /// Broadcast a heartbeat every N seconds
    #[clap(long)]
    heartbeat_secs: Option<u64>,
    /// Close connections silent for N seconds
    #[clap(long)]
    idle_timeout_secs: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new(self.host, self.port),
            grid_size: self.grid_size,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            heartbeat_interval: self.heartbeat_secs.map(Duration::from_secs),
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
            ..ServerConfig::default()
        }
    }
}

/// Runs the reactor on its own thread until it fails or Ctrl+C arrives.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let server = spawn_server(args.into_config())?;
    info!("Accepting players on {}", server.addr());

    let control = server.handle().clone();
    let mut reactor = tokio::task::spawn_blocking(move || server.wait());

    tokio::select! {
        result = &mut reactor => {
            if let Err(e) = result? {
                error!("Reactor stopped: {}", e);
                return Err(e.into());
            }
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down gracefully...");
            control.shutdown()?;
        }
    }

    reactor.await??;
    Ok(())
}
