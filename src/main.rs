//! WiFi Manager - Main Entry Point

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifi_manager::{
    AuthKind, CryptoKind, LinkCallbacks, LinkStatus, MacAddress, Mode, ScanReport, ScanResult,
    WifiManager,
    backend::{MockWifiBackend, WifiBackend, WpaSupplicantBackend},
    config::{Action, CliArgs, Settings, cli::BackendKind},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wifi_manager=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(backend = ?args.backend, "Starting WiFi manager");

    let settings = Settings::load(args).inspect_err(|e| error!("Invalid configuration: {}", e))?;

    match settings.backend {
        BackendKind::Mock => {
            let backend = Arc::new(MockWifiBackend::new());
            backend.set_scan_results(demo_access_points()).await;
            run(backend, settings).await
        }
        BackendKind::WpaSupplicant => {
            let backend = Arc::new(WpaSupplicantBackend::new(settings.interface.clone()));
            info!("Using wpa_supplicant on interface: {}", settings.interface);
            run(backend, settings).await
        }
    }
}

async fn run<B: WifiBackend>(
    backend: Arc<B>,
    settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = WifiManager::new(backend);
    manager.init().await?;
    manager
        .register_callbacks(
            LinkCallbacks::new()
                .on_link_up(|| info!("Link up"))
                .on_link_down(|| info!("Link down")),
        )
        .await?;

    let outcome = execute(&manager, &settings).await;

    info!("Shutting down...");
    if let Err(e) = manager.deinit().await {
        warn!("Deinit reported an error: {}", e);
    }
    outcome
}

async fn execute<B: WifiBackend>(
    manager: &WifiManager<B>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    match &settings.action {
        Action::Scan { capacity } => {
            let report = manager.scan_access_points(*capacity).await?;
            print_scan(&report, settings.json)?;
        }
        Action::Connect(credential) => {
            manager.connect(credential).await?;
            print_status(&manager.get_info().await?, settings.json)?;
            hold(settings).await;
            if manager.mode().await == Mode::Connected {
                manager.disconnect().await?;
            } else {
                info!("Link already down, nothing to disconnect");
            }
        }
        Action::SoftAp(config) => {
            let config = config
                .clone()
                .with_station_joined(|| info!("A station joined the soft-AP"));
            manager.start_soft_ap(&config).await?;
            print_status(&manager.get_info().await?, settings.json)?;
            hold(settings).await;
            if manager.mode().await == Mode::SoftAp {
                manager.stop_soft_ap().await?;
            } else {
                info!("Soft-AP already down, nothing to stop");
            }
        }
        Action::Info => {
            print_status(&manager.get_info().await?, settings.json)?;
        }
    }
    Ok(())
}

/// Keep the link up until the hold time elapses or a signal arrives
async fn hold(settings: &Settings) {
    if settings.hold.is_zero() {
        return;
    }

    info!("Holding link for {:?}", settings.hold);
    tokio::select! {
        _ = tokio::time::sleep(settings.hold) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
    }
}

fn print_scan(report: &ScanReport, json: bool) -> serde_json::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{} access point(s) found, showing {}",
        report.found,
        report.results.len()
    );
    for ap in &report.results {
        println!(
            "{}  ch {:>3}  {:>4} dBm  {:?}/{:?}  {}",
            ap.bssid,
            ap.channel,
            ap.rssi,
            ap.auth,
            ap.crypto,
            ap.ssid_lossy()
        );
    }
    Ok(())
}

fn print_status(status: &LinkStatus, json: bool) -> serde_json::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        println!("mode: {:?}", status.mode);
        println!("ip:   {}", status.ip4_address);
        println!("mac:  {}", status.mac_address);
        println!("rssi: {} dBm", status.rssi);
    }
    Ok(())
}

fn demo_access_points() -> Vec<ScanResult> {
    let ap = |ssid: &str, last: u8, channel, rssi, auth, crypto| ScanResult {
        channel,
        ssid: ssid.as_bytes().to_vec(),
        bssid: MacAddress([0x02, 0x11, 0x22, 0x33, 0x44, last]),
        max_rate: 144_400,
        rssi,
        auth,
        crypto,
    };

    vec![
        ap("HomeNet", 0x01, 6, -42, AuthKind::Wpa2Psk, CryptoKind::Aes),
        ap("CoffeeShop", 0x02, 1, -67, AuthKind::Open, CryptoKind::None),
        ap("Legacy", 0x03, 11, -80, AuthKind::WpaPsk, CryptoKind::Tkip),
    ]
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
