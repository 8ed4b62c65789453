use color_eyre::eyre::{Result, WrapErr, eyre};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use udprelay::{Observer, QueueCapacity, Relay, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging, RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("udprelay=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let port = match args.get(1) {
        Some(p) => p
            .parse::<u16>()
            .wrap_err_with(|| format!("Invalid port: {p}"))?,
        None => 9000,
    };
    let mode = args.get(2).map(|s| s.to_lowercase()).unwrap_or_else(|| "log".to_string());

    let config = RelayConfig::new(1500, QueueCapacity::Records(64));
    let relay = Relay::load(config).wrap_err("Failed to load relay")?;

    let observer: Arc<dyn Observer> = match mode.as_str() {
        "log" => Arc::new(|payload: &[u8], ip: u32, port: u16| {
            info!(
                source = %SocketAddrV4::new(Ipv4Addr::from(ip), port),
                size = payload.len(),
                preview = %String::from_utf8_lossy(payload),
                "Datagram"
            );
        }),
        "echo" => {
            let replies = relay.transmitter();
            Arc::new(move |payload: &[u8], ip: u32, port: u16| {
                replies.transmit(payload, ip, port);
            })
        }
        _ => {
            eprintln!("Usage: {} [port] [log|echo]", args[0]);
            eprintln!("  port: Local UDP port to relay from (default: 9000)");
            eprintln!("  log:  Log every relayed datagram (default)");
            eprintln!("  echo: Send every relayed datagram back to its source");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  {} 9000          # Log datagrams arriving on port 9000", args[0]);
            eprintln!("  {} 9000 echo     # Echo datagrams arriving on port 9000", args[0]);
            return Err(eyre!("Unknown mode: {mode}"));
        }
    };

    relay
        .register_observer(observer)
        .wrap_err("Failed to register observer")?;
    relay
        .bind(port)
        .wrap_err_with(|| format!("Failed to bind port {port}"))?;

    info!(port, mode = %mode, "Relay running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for shutdown signal")?;

    let metrics = relay.metrics();
    info!(
        received = metrics.received,
        dispatched = metrics.dispatched,
        overflow_drops = metrics.overflow_drops,
        transmitted = metrics.transmitted,
        "Relay stopped"
    );
    Ok(())
}
