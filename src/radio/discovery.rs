//! Radio discovery via UDP broadcast.
//!
//! Radios announce themselves about once a second on UDP port 4992. Each
//! packet carries a fixed VITA-49 header followed by a space-separated list
//! of `key=value` pairs such as `model=FLEX-6600 serial=1234 ip=10.0.0.5`.

use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use super::RADIO_PORT;

/// UDP port discovery broadcasts arrive on.
pub const DISCOVERY_PORT: u16 = 4992;

/// Length of the VITA-49 header preceding the discovery payload.
const VITA_HEADER_LEN: usize = 28;

/// A radio seen on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRadio {
    fields: BTreeMap<String, String>,
}

impl DiscoveredRadio {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The `ip:port` of the radio's command API.
    pub fn address(&self) -> String {
        let ip = self.get("ip").unwrap_or_default();
        let port = self
            .get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(RADIO_PORT);
        format!("{}:{}", ip, port)
    }

    /// Whether every filter pair is present with an equal value.
    pub fn matches(&self, filters: &[(String, String)]) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.get(key) == Some(value.as_str()))
    }
}

impl fmt::Display for DiscoveredRadio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" (serial {}) at {}",
            self.get("model").unwrap_or("radio"),
            self.get("nickname").unwrap_or(""),
            self.get("serial").unwrap_or("?"),
            self.address()
        )
    }
}

/// Parse a filter like `serial=1234,nickname=Shack` into pairs.
///
/// Pairs may be separated by commas or whitespace. An empty filter matches
/// any radio.
pub fn parse_filter(filter: &str) -> Result<Vec<(String, String)>> {
    filter
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("Discovery filter '{}' is not key=value", part))
        })
        .collect()
}

/// Parse a discovery packet. Returns `None` for packets that are too short
/// or do not name an IP address.
pub fn parse_packet(packet: &[u8]) -> Option<DiscoveredRadio> {
    let payload = packet.get(VITA_HEADER_LEN..)?;
    let text = String::from_utf8_lossy(payload);

    let fields: BTreeMap<String, String> = text
        .trim_end_matches('\0')
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if fields.contains_key("ip") {
        Some(DiscoveredRadio { fields })
    } else {
        None
    }
}

/// Wait for a radio matching `filter` to announce itself.
pub async fn discover(filter: &str, wait: Duration) -> Result<DiscoveredRadio> {
    let filters = parse_filter(filter)?;
    let socket = UdpSocket::bind(("0.0.0.0", DISCOVERY_PORT))
        .await
        .context("Failed to bind discovery port")?;
    let mut buf = vec![0u8; 2048];

    let search = async {
        loop {
            let (n, from) = socket.recv_from(&mut buf).await?;
            match parse_packet(&buf[..n]) {
                Some(radio) if radio.matches(&filters) => return Ok::<_, std::io::Error>(radio),
                Some(radio) => debug!("Skipping {} from {}", radio, from),
                None => debug!("Ignoring {} byte packet from {}", n, from),
            }
        }
    };

    timeout(wait, search)
        .await
        .context("No matching radio discovered")?
        .context("Discovery receive failed")
}
