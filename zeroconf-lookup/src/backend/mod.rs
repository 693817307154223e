pub mod avahi;
pub mod dns_sd;
pub mod query;

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use crate::config::Config;

pub use self::avahi::AvahiBackend;
pub use self::dns_sd::DnsSdBackend;
pub use self::query::MdnsSdBackend;

/// A discovery backend, reduced to the two operations the pipeline needs.
///
/// Both produce lines in `dns-sd` layout: `browse` yields SRV/TXT rows for
/// the configured service type, `resolve` yields one `-G v4` row for the
/// target. Neither fails; a backend that times out or breaks returns what
/// it has, possibly nothing.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Label reported as the envelope's `source`
    fn source(&self) -> &'static str;

    async fn browse(&self, timeout: Duration) -> Vec<String>;

    async fn resolve(&self, target: &str, timeout: Duration) -> Option<String>;
}

/// Pick the first available backend: avahi-browse, then dns-sd, then the
/// in-process mDNS querier. The choice is final for this run.
pub fn select(config: &Config) -> Result<Box<dyn Backend>> {
    if let Some(path) = find_executable(avahi::PROGRAM) {
        tracing::info!("Using avahi-browse at {}", path.display());
        return Ok(Box::new(AvahiBackend::new(path, config)));
    }

    if let Some(path) = find_executable(dns_sd::PROGRAM) {
        tracing::info!("Using dns-sd at {}", path.display());
        return Ok(Box::new(DnsSdBackend::new(path, config)));
    }

    tracing::info!("No discovery tool found, using the built-in mDNS querier");
    let backend = MdnsSdBackend::new(config).context("Failed to start the built-in mDNS querier")?;
    Ok(Box::new(backend))
}

/// Search `PATH` for an executable called `name`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| executable_in(&dir, name))
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidates = if cfg!(windows) {
        vec![dir.join(format!("{}.exe", name)), dir.join(name)]
    } else {
        vec![dir.join(name)]
    };
    candidates.into_iter().find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
