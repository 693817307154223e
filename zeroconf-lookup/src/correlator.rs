//! Builds provisional service records from the lines of one browse pass.
//!
//! Two line shapes matter, both in `dns-sd -Z` zone-file layout:
//!
//! ```text
//! <instance> SRV <priority> <weight> <port> <target>
//! <instance> TXT "<string>" "<string>" ...
//! ```
//!
//! A TXT line annotates the record whose instance key matches, so the
//! records are keyed by instance rather than paired by position. Anything
//! else (PTR rows, comments, headers) is ignored.

use crate::tokenizer::{self, decode_display, split_quoted};

pub const ADVERTISEMENT_MARKER: &str = "SRV";
pub const TEXT_MARKER: &str = "TXT";

const MIN_ADVERTISEMENT_FIELDS: usize = 6;
const MIN_TEXT_FIELDS: usize = 3;
const PORT_FIELD: usize = 4;
const TARGET_FIELD: usize = 5;

/// A service seen during browsing, not yet resolved to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Instance field exactly as tokenized; only used for matching
    pub instance_key: String,
    pub display_name: String,
    pub target_host: String,
    pub port: u16,
    pub text_attributes: Vec<String>,
}

pub struct Correlator {
    service_type: String,
    records: Vec<ServiceRecord>,
}

impl Correlator {
    pub fn new(service_type: &str) -> Self {
        Self {
            service_type: service_type.to_string(),
            records: Vec::new(),
        }
    }

    /// Process one raw line from the backend.
    pub fn feed(&mut self, line: &str) {
        let Some(fields) = tokenizer::tokenize(line) else {
            return;
        };

        match fields.get(1).map(String::as_str) {
            Some(ADVERTISEMENT_MARKER) if fields.len() >= MIN_ADVERTISEMENT_FIELDS => {
                self.add_advertisement(&fields)
            }
            Some(TEXT_MARKER) if fields.len() >= MIN_TEXT_FIELDS => self.add_text(&fields),
            _ => {}
        }
    }

    pub fn finish(self) -> Vec<ServiceRecord> {
        self.records
    }

    fn add_advertisement(&mut self, fields: &[String]) {
        let Some(port) = parse_port(&fields[PORT_FIELD]) else {
            tracing::debug!("Skipping advertisement with bad port: {:?}", fields);
            return;
        };

        let instance = &fields[0];
        let target = &fields[TARGET_FIELD];

        if self
            .records
            .iter()
            .any(|r| &r.instance_key == instance && r.port == port && &r.target_host == target)
        {
            tracing::debug!("Repeated advertisement for {}", instance);
            return;
        }
        if self.records.iter().any(|r| &r.instance_key == instance) {
            tracing::warn!("Instance {} advertised again with a different target or port", instance);
        }

        let record = ServiceRecord {
            instance_key: instance.clone(),
            display_name: display_name(instance, &self.service_type),
            target_host: target.clone(),
            port,
            text_attributes: Vec::new(),
        };
        tracing::debug!(
            "Advertisement '{}' -> {}:{}",
            record.display_name,
            record.target_host,
            record.port
        );
        self.records.push(record);
    }

    fn add_text(&mut self, fields: &[String]) {
        let instance = &fields[0];
        let mut matches = self.records.iter_mut().filter(|r| &r.instance_key == instance);

        let Some(record) = matches.next() else {
            tracing::debug!("TXT for unknown instance {}", instance);
            return;
        };

        let extra = matches.count();
        if extra > 0 {
            tracing::warn!(
                "TXT for {} matches {} records, annotating the first only",
                instance,
                extra + 1
            );
        }

        for attribute in split_quoted(&fields[2..]) {
            tracing::debug!("    TXT: '{}'", attribute);
            record.text_attributes.push(attribute);
        }
    }
}

/// Run a whole browse pass through a fresh [`Correlator`].
pub fn correlate<S: AsRef<str>>(service_type: &str, lines: &[S]) -> Vec<ServiceRecord> {
    let mut correlator = Correlator::new(service_type);
    for line in lines {
        correlator.feed(line.as_ref());
    }
    correlator.finish()
}

/// A port is valid if it is numeric and within 1..=65535.
pub fn parse_port(field: &str) -> Option<u16> {
    match field.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => u16::try_from(port).ok(),
        _ => None,
    }
}

/// Instance label in front of the service type, decoded for display.
fn display_name(instance: &str, service_type: &str) -> String {
    let suffix = format!(".{}", service_type);
    let label = match instance.find(&suffix) {
        Some(idx) => &instance[..idx],
        None => instance.trim_end_matches('.'),
    };
    decode_display(label)
}

/// Canonical advertisement line, as consumed by [`Correlator::feed`].
/// `instance` must already be escaped.
pub fn advertisement_line(instance: &str, port: u16, target: &str) -> String {
    format!("{} {} 0 0 {} {}", instance, ADVERTISEMENT_MARKER, port, target)
}

/// Canonical text-record line. Attributes are raw text and get escaped.
pub fn text_line(instance: &str, attributes: &[String]) -> String {
    let quoted: Vec<String> = attributes
        .iter()
        .map(|a| format!("\"{}\"", tokenizer::escape_field(a)))
        .collect();
    format!("{} {} {}", instance, TEXT_MARKER, quoted.join(" "))
}
