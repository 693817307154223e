use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::correlator::{advertisement_line, text_line};
use crate::resolver::address_line;
use crate::tokenizer;
use super::Backend;

type SharedLines = Arc<Mutex<Vec<String>>>;
type SharedAddresses = Arc<Mutex<HashMap<String, Ipv4Addr>>>;

/// In-process mDNS querier built on `mdns-sd`, used when no discovery tool
/// is installed.
///
/// A listener task turns resolved services into SRV/TXT lines while
/// `browse` sleeps out the window; the listener is then cancelled and the
/// lines handed over. Addresses seen on the way answer `resolve`.
pub struct MdnsSdBackend {
    daemon: ServiceDaemon,
    query: String,
    addresses: SharedAddresses,
}

impl MdnsSdBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
        Ok(Self {
            daemon,
            query: format!("{}.{}.", config.service_type, config.domain),
            addresses: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

#[async_trait]
impl Backend for MdnsSdBackend {
    fn source(&self) -> &'static str {
        "Rust (Query)"
    }

    async fn browse(&self, timeout: Duration) -> Vec<String> {
        let receiver = match self.daemon.browse(&self.query) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::error!("Failed to browse {}: {}", self.query, e);
                return Vec::new();
            }
        };

        let lines: SharedLines = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            receiver,
            Arc::clone(&lines),
            Arc::clone(&self.addresses),
            cancel.clone(),
        ));

        tokio::time::sleep(timeout).await;
        cancel.cancel();
        if let Err(e) = listener.await {
            tracing::error!("mDNS listener task failed: {}", e);
        }
        if let Err(e) = self.daemon.stop_browse(&self.query) {
            tracing::warn!("Failed to stop browsing {}: {}", self.query, e);
        }

        let mut lines = lines.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *lines)
    }

    async fn resolve(&self, target: &str, _timeout: Duration) -> Option<String> {
        let addresses = self.addresses.lock().unwrap_or_else(PoisonError::into_inner);
        let address = addresses.get(target.trim_end_matches('.'))?;
        Some(address_line(target, *address))
    }
}

impl Drop for MdnsSdBackend {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("Failed to shut down mDNS daemon: {}", e);
        }
    }
}

async fn listen(
    receiver: flume::Receiver<ServiceEvent>,
    lines: SharedLines,
    addresses: SharedAddresses,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        let Some((address, new_lines)) = lines_from_info(&info) else {
                            tracing::debug!("Skipping {} - no IPv4 address", info.get_fullname());
                            continue;
                        };
                        tracing::debug!("Resolved service: {}", info.get_fullname());
                        addresses
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(info.get_hostname().trim_end_matches('.').to_string(), address);
                        lines
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend(new_lines);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("mDNS receiver disconnected: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Convert a resolved service into SRV/TXT lines plus its IPv4 address.
fn lines_from_info(info: &ServiceInfo) -> Option<(Ipv4Addr, Vec<String>)> {
    let address = info
        .get_addresses()
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            _ => None,
        })
        .min()?;

    let instance = tokenizer::escape_field(info.get_fullname());
    let mut lines = vec![advertisement_line(&instance, info.get_port(), info.get_hostname())];

    let attributes: Vec<String> = info
        .get_properties()
        .iter()
        .map(|prop| match prop.val() {
            Some(_) => format!("{}={}", prop.key(), prop.val_str()),
            None => prop.key().to_string(),
        })
        .collect();
    if !attributes.is_empty() {
        lines.push(text_line(&instance, &attributes));
    }

    Some((address, lines))
}
