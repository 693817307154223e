use std::path::PathBuf;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::Config;
use crate::process;
use super::Backend;

pub const PROGRAM: &str = "dns-sd";

/// mDNSResponder's `dns-sd` tool. Its `-Z` and `-G` output already has the
/// line shapes the pipeline expects, so lines pass through untouched.
pub struct DnsSdBackend {
    program: PathBuf,
    service_type: String,
    domain: String,
}

impl DnsSdBackend {
    pub fn new(program: PathBuf, config: &Config) -> Self {
        Self {
            program,
            service_type: config.service_type.clone(),
            domain: config.domain.clone(),
        }
    }
}

#[async_trait]
impl Backend for DnsSdBackend {
    fn source(&self) -> &'static str {
        "Rust (mDNSResponder)"
    }

    async fn browse(&self, timeout: Duration) -> Vec<String> {
        // -Z never exits on its own; the deadline ends it
        process::collect_lines(&self.program, &["-Z", &self.service_type, &self.domain], timeout).await
    }

    async fn resolve(&self, target: &str, timeout: Duration) -> Option<String> {
        let needle = target.trim_end_matches('.');
        process::first_line_containing(&self.program, &["-G", "v4", target], needle, timeout).await
    }
}
