use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use async_trait::async_trait;
use crate::config::Config;
use crate::correlator::{advertisement_line, parse_port, TEXT_MARKER};
use crate::resolver::address_line;
use crate::{process, tokenizer};
use super::Backend;

pub const PROGRAM: &str = "avahi-browse";

/// Avahi's `avahi-browse` in parseable, resolving, terminating mode.
///
/// Avahi resolves addresses while browsing, so the addresses from the
/// browse rows are kept and `resolve` answers from them.
pub struct AvahiBackend {
    program: PathBuf,
    service_type: String,
    addresses: Mutex<HashMap<String, Ipv4Addr>>,
}

/// One complete `=` row of `avahi-browse -p -r` output:
/// `=;iface;protocol;name;type;domain;host;address;port;txt`
#[derive(Debug, PartialEq, Eq)]
struct ResolvedRow<'a> {
    name: &'a str,
    domain: &'a str,
    host: &'a str,
    address: Ipv4Addr,
    port: u16,
    txt: String,
}

fn parse_row(line: &str) -> Option<ResolvedRow<'_>> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() < 9 || fields[0] != "=" {
        return None;
    }
    if !fields[2].eq_ignore_ascii_case("ipv4") || fields[7].contains(':') {
        return None;
    }

    Some(ResolvedRow {
        name: fields[3],
        domain: fields[5],
        host: fields[6],
        address: fields[7].parse().ok()?,
        port: parse_port(fields[8])?,
        txt: fields.get(9..).map(|rest| rest.join(";")).unwrap_or_default(),
    })
}

impl AvahiBackend {
    pub fn new(program: PathBuf, config: &Config) -> Self {
        Self {
            program,
            service_type: config.service_type.clone(),
            addresses: Mutex::new(HashMap::new()),
        }
    }

    /// Rewrite avahi rows as SRV/TXT lines and remember their addresses.
    fn translate(&self, output: &[String]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut seen = HashSet::new();
        let mut addresses = self.addresses.lock().unwrap_or_else(PoisonError::into_inner);

        for row in output.iter().filter_map(|line| parse_row(line)) {
            let instance = format!(
                "{}.{}.{}.",
                tokenizer::escape_spaces(row.name),
                self.service_type,
                row.domain
            );
            // One row per interface; keep the first
            if !seen.insert((instance.clone(), row.host, row.port)) {
                continue;
            }

            addresses
                .entry(row.host.trim_end_matches('.').to_string())
                .or_insert(row.address);

            lines.push(advertisement_line(&instance, row.port, row.host));
            if !row.txt.trim().is_empty() {
                lines.push(format!("{} {} {}", instance, TEXT_MARKER, row.txt));
            }
        }

        lines
    }
}

#[async_trait]
impl Backend for AvahiBackend {
    fn source(&self) -> &'static str {
        "Rust (Avahi)"
    }

    async fn browse(&self, timeout: Duration) -> Vec<String> {
        let output = process::collect_lines(
            &self.program,
            &["-t", "-r", "-p", &self.service_type],
            timeout,
        )
        .await;
        self.translate(&output)
    }

    async fn resolve(&self, target: &str, _timeout: Duration) -> Option<String> {
        let addresses = self.addresses.lock().unwrap_or_else(PoisonError::into_inner);
        let address = addresses.get(target.trim_end_matches('.'))?;
        Some(address_line(target, *address))
    }
}
