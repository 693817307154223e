use std::net::Ipv4Addr;
use serde::{Serialize, Deserialize};
use crate::protocol::PROTOCOL_VERSION;

/// A resolved HTTP server as reported to the browser extension.
/// Equality covers every field and is what duplicate detection relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Instance name with escapes decoded, e.g. "My Printer"
    pub name: String,

    /// TXT record strings in advertisement order
    pub txt: Vec<String>,

    /// Hostname without trailing dots, e.g. "nas.local"
    pub target: String,

    /// Service port, never 0
    pub port: u16,

    /// Resolved IPv4 address
    pub a: Ipv4Addr,

    /// "http://{a}:{port}/"
    pub url: String,
}

/// Top-level message written back over the native-messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub version: u32,

    /// Which backend produced the data, e.g. "Rust (Avahi)"
    pub source: String,

    pub result: Vec<Server>,
}

impl ResultEnvelope {
    pub fn new(source: impl Into<String>, result: Vec<Server>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            source: source.into(),
            result,
        }
    }
}

/// Structured form of an incoming command, `{"cmd": "Lookup"}`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandMessage {
    pub cmd: String,
}
