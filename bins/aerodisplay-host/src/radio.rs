//! Radio stand-in for hosts where the OS owns the network interface.
//!
//! "Connecting" records the requested SSID and checks whether the host has a
//! routable address. Nothing is sent on the network.

use std::net::{IpAddr, UdpSocket};

use aerodisplay_node::{ScannedNetwork, WifiRadio};
use tracing::debug;

/// Any public address works; the socket is never written to.
const ROUTE_PROBE: &str = "192.0.2.1:9";

#[derive(Debug, Default)]
pub struct HostRadio {
    ssid: Option<String>,
    ip: Option<IpAddr>,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn probe_route() -> Option<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(ROUTE_PROBE).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
    }
}

impl WifiRadio for HostRadio {
    fn begin_connect(&mut self, ssid: &str, _password: &str) {
        self.ssid = Some(ssid.to_string());
        self.ip = Self::probe_route();
        debug!("Host route for '{}': {:?}", ssid, self.ip);
    }

    fn is_connected(&self) -> bool {
        self.ssid.is_some() && self.ip.is_some()
    }

    fn disconnect(&mut self) {
        self.ssid = None;
        self.ip = None;
    }

    fn scan(&mut self) -> Vec<ScannedNetwork> {
        match (&self.ssid, self.ip) {
            (Some(ssid), Some(_)) => vec![ScannedNetwork {
                ssid: ssid.clone(),
                rssi: 0,
            }],
            _ => Vec::new(),
        }
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.ip
    }
}
