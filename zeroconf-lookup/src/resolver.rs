//! Second pass: turn each provisional record's target host into an IPv4
//! address, one backend `resolve` call per record.

use std::net::Ipv4Addr;
use crate::aggregator::Candidate;
use crate::backend::Backend;
use crate::config::RESOLVE_TIMEOUT;
use crate::correlator::ServiceRecord;
use crate::tokenizer;

/// Rows look like `dns-sd -G v4` output:
/// `Timestamp A/R Flags if Hostname Address TTL`
pub const MIN_ADDRESS_FIELDS: usize = 6;
const ADDRESS_FIELD: usize = 5;

/// Extract the IPv4 address from a resolve row.
pub fn parse_address(line: &str) -> Option<Ipv4Addr> {
    let fields = tokenizer::tokenize(line)?;
    if fields.len() < MIN_ADDRESS_FIELDS {
        return None;
    }
    fields[ADDRESS_FIELD].parse().ok()
}

/// Canonical resolve row for backends that learn addresses some other way.
pub fn address_line(host: &str, address: Ipv4Addr) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!("{}  Add  2  0  {}  {}  120", timestamp, host, address)
}

/// Resolve one record. A miss is logged and yields `None`; there is no retry.
pub async fn resolve(backend: &dyn Backend, record: ServiceRecord) -> Option<Candidate> {
    let Some(line) = backend.resolve(&record.target_host, RESOLVE_TIMEOUT).await else {
        tracing::warn!("No address line for {}", record.target_host);
        return None;
    };

    let Some(address) = parse_address(&line) else {
        tracing::warn!("Invalid address line for {}: {:?}", record.target_host, line);
        return None;
    };

    tracing::debug!("{} -> {}", record.target_host, address);
    Some(Candidate {
        name: record.display_name,
        target: record.target_host,
        port: record.port,
        address,
        txt: record.text_attributes,
    })
}
