use std::net::Ipv4Addr;
use shared::protocol::{DAAP_PORT, DAAP_TAG};
use shared::types::Server;
use crate::tokenizer::PLACEHOLDER;

/// A resolved record on its way into the result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub target: String,
    pub port: u16,
    pub address: Ipv4Addr,
    pub txt: Vec<String>,
}

/// Ordered, duplicate-free list of servers for one collection pass.
///
/// The linear duplicate scan is fine for the handful of services found on
/// a local network.
#[derive(Debug, Default)]
pub struct Aggregator {
    servers: Vec<Server>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `candidate` and append it unless an identical server is
    /// already present. Returns true if the list grew.
    pub fn add_server(&mut self, candidate: Candidate) -> bool {
        let target = candidate.target.trim_matches('.').to_string();
        if candidate.port == 0 || target.is_empty() {
            tracing::warn!("Rejecting server '{}' without port or target", candidate.name);
            return false;
        }

        // Names arrive decoded; only a stray placeholder is left to map
        let name = candidate.name.replace(PLACEHOLDER, " ");

        let mut txt = candidate.txt;
        if candidate.port == DAAP_PORT {
            txt.insert(0, DAAP_TAG.to_string());
        }

        let server = Server {
            url: format!("http://{}:{}/", candidate.address, candidate.port),
            name,
            txt,
            target,
            port: candidate.port,
            a: candidate.address,
        };

        if self.servers.contains(&server) {
            tracing::debug!("duplicate server {}", server.name);
            return false;
        }

        tracing::info!("found {} for '{}' ({:?})", server.url, server.name, server.txt);
        self.servers.push(server);
        true
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn into_servers(self) -> Vec<Server> {
        self.servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(port: u16, txt: &[&str]) -> Candidate {
        Candidate {
            name: "MyServer".to_string(),
            target: "host.local.".to_string(),
            port,
            address: Ipv4Addr::new(192, 168, 1, 5),
            txt: txt.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_server_fills_derived_fields() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.add_server(candidate(80, &["path=/"])));

        let server = &aggregator.servers()[0];
        assert_eq!(server.target, "host.local");
        assert_eq!(server.url, "http://192.168.1.5:80/");
        assert_eq!(server.txt, vec!["path=/"]);
    }

    #[test]
    fn test_duplicate_is_discarded() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.add_server(candidate(80, &["path=/"])));
        assert!(!aggregator.add_server(candidate(80, &["path=/"])));
        assert_eq!(aggregator.servers().len(), 1);

        // Any differing field makes it a distinct server
        assert!(aggregator.add_server(candidate(80, &["path=/admin"])));
        assert_eq!(aggregator.into_servers().len(), 2);
    }

    #[test]
    fn test_daap_port_is_tagged() {
        let mut aggregator = Aggregator::new();
        aggregator.add_server(candidate(3689, &[]));
        let mut other = candidate(3689, &["txtvers=1", "Machine Name=Den"]);
        other.name = "Den".to_string();
        aggregator.add_server(other);

        let servers = aggregator.servers();
        assert_eq!(servers[0].txt, vec![DAAP_TAG]);
        assert_eq!(servers[1].txt, vec![DAAP_TAG, "txtvers=1", "Machine Name=Den"]);
    }

    #[test]
    fn test_name_is_not_decoded_twice() {
        let mut aggregator = Aggregator::new();
        let mut c = candidate(80, &[]);
        c.name = r"Share\032X".to_string();
        aggregator.add_server(c);

        let mut c = candidate(81, &[]);
        c.name = format!("Web{}Admin", PLACEHOLDER);
        aggregator.add_server(c);

        let names: Vec<_> = aggregator.servers().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![r"Share\032X", "Web Admin"]);
    }

    #[test]
    fn test_invalid_candidates_are_rejected() {
        let mut aggregator = Aggregator::new();
        assert!(!aggregator.add_server(candidate(0, &[])));

        let mut c = candidate(80, &[]);
        c.target = ".".to_string();
        assert!(!aggregator.add_server(c));
        assert!(aggregator.servers().is_empty());
    }
}
