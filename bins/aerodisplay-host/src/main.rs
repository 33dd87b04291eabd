mod presenter;
mod radio;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aerodisplay_core::{ConfigStore, FileConfigStorage};
use aerodisplay_node::{
    dispatch_intent, HttpRegistrar, LinkHandle, NetworkHandle, NodeRuntime, OperatorIntent,
};

use crate::presenter::LogPresenter;
use crate::radio::HostRadio;
use crate::settings::NodeSettings;

/// Delay between attempts to reach the serial bridge.
const LINK_RETRY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,aerodisplay_node=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = NodeSettings::resolve(std::env::args_os().nth(1).map(PathBuf::from))?;
    let profile = settings.device.profile();
    tracing::info!("{} starting...", profile.display_name);

    // The only fatal startup fault: storage that cannot be mounted or formatted.
    let store = ConfigStore::open(FileConfigStorage::new(&settings.storage_dir), profile)
        .with_context(|| {
            format!(
                "Configuration storage at {} is unusable",
                settings.storage_dir.display()
            )
        })?;

    let config = store.snapshot();
    tracing::info!("Device name: {}", config.device_name);
    tracing::info!("Theme: {}", config.theme_color.name());
    if !config.network_configured {
        tracing::info!("No WiFi credentials stored; use `wifi <ssid> [password]`");
    }

    let runtime = NodeRuntime::new(profile, store);

    let (network, network_handle) = runtime.spawn_network(
        HostRadio::new(),
        HttpRegistrar::new(settings.registration_url.clone())
            .context("Failed to build registration client")?,
        settings.firmware(),
    );
    let presentation_handle = runtime.spawn_presentation(LogPresenter::default());

    let (link_tx, link_rx) = watch::channel(None);
    let link_handle = tokio::spawn(run_link(runtime.clone(), settings.link_addr.clone(), link_tx));
    tokio::spawn(run_console(link_rx, network, runtime.store().clone()));

    tracing::info!("Node ready. Controller bridge: {}", settings.link_addr);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = network_handle => {
            tracing::warn!("Network worker stopped");
        }
        _ = presentation_handle => {
            tracing::warn!("Presentation worker stopped");
        }
        _ = link_handle => {
            tracing::warn!("Link worker stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Keep a link to the serial bridge up, reconnecting whenever it drops.
///
/// The current link handle is published on `links` for the console.
async fn run_link(runtime: NodeRuntime, addr: String, links: watch::Sender<Option<LinkHandle>>) {
    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Serial bridge {} unavailable: {}", addr, e);
                tokio::time::sleep(LINK_RETRY).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        tracing::info!("Connected to serial bridge {}", addr);

        let (link, link_task) = runtime.spawn_link(stream);
        links.send_replace(Some(link));
        if let Err(e) = link_task.await {
            tracing::error!("Link worker failed: {}", e);
        }
        links.send_replace(None);

        tracing::warn!("Serial bridge {} disconnected, reconnecting...", addr);
        tokio::time::sleep(LINK_RETRY).await;
    }
}

/// Read operator input from stdin, one command per line.
async fn run_console(
    links: watch::Receiver<Option<LinkHandle>>,
    network: NetworkHandle,
    store: Arc<ConfigStore>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let link = links.borrow().clone();
                let result =
                    handle_console_line(line.trim(), link.as_ref(), &network, &store).await;
                if let Err(e) = result {
                    tracing::warn!("{}", e);
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Console read error: {}", e);
                return;
            }
        }
    }
}

async fn handle_console_line(
    line: &str,
    link: Option<&LinkHandle>,
    network: &NetworkHandle,
    store: &ConfigStore,
) -> anyhow::Result<()> {
    let mut words = line.split_whitespace();
    match words.next() {
        None => {}
        Some("wifi") => {
            let ssid = words.next().unwrap_or_default();
            let password = words.next().unwrap_or_default();
            store.set_credentials(ssid, password)?;
            tracing::info!("WiFi credentials saved");
        }
        Some("register") => {
            let token = words.next().context("usage: register <token> [device name]")?;
            let rest: Vec<&str> = words.collect();
            let name = if rest.is_empty() {
                store.snapshot().device_name
            } else {
                rest.join(" ")
            };
            store.set_registration_data(&name, token)?;
            tracing::info!("Registration data saved for '{}'", name);
        }
        Some("scan") => {
            let networks = network.scan().await?;
            tracing::info!("Found {} networks", networks.len());
            for (i, net) in networks.iter().enumerate() {
                tracing::info!("  {}: {} ({} dBm)", i, net.ssid, net.rssi);
            }
        }
        Some("format") => {
            store.format()?;
            tracing::info!("Configuration reset to defaults");
        }
        Some(_) => {
            let intent: OperatorIntent = line.parse()?;
            dispatch_intent(&intent, link, store)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerodisplay_core::{DeviceKind, MemoryConfigStorage};
    use tokio::net::TcpListener;

    async fn wait_connected(links: &mut watch::Receiver<Option<LinkHandle>>, connected: bool) {
        let wait = links.wait_for(|link| link.is_some() == connected);
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_link_reconnects_after_bridge_drops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let profile = DeviceKind::Environment.profile();
        let store = ConfigStore::open(MemoryConfigStorage::new(), profile).unwrap();
        let (tx, mut links) = watch::channel(None);
        let task = tokio::spawn(run_link(NodeRuntime::new(profile, store), addr, tx));

        let (bridge, _) = listener.accept().await.unwrap();
        wait_connected(&mut links, true).await;

        drop(bridge);
        wait_connected(&mut links, false).await;

        let accept = tokio::time::timeout(Duration::from_secs(10), listener.accept());
        let (_bridge, _) = accept.await.unwrap().unwrap();
        wait_connected(&mut links, true).await;

        task.abort();
    }
}
