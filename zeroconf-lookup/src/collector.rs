use shared::types::Server;
use crate::aggregator::Aggregator;
use crate::backend::Backend;
use crate::config::Config;
use crate::{correlator, resolver};

/// One collection pass: browse, correlate, resolve each record in
/// discovery order, aggregate.
///
/// Worst case this takes the browse timeout plus one resolve timeout per
/// record. Nothing here fails; problems only shrink the result.
pub async fn collect(backend: &dyn Backend, config: &Config) -> Vec<Server> {
    tracing::info!("start collecting");

    let lines = backend.browse(config.browse_timeout()).await;
    tracing::debug!("Browse returned {} lines", lines.len());

    let records = correlator::correlate(&config.service_type, &lines);
    tracing::debug!("Correlated {} service records", records.len());

    let mut aggregator = Aggregator::new();
    for record in records {
        if let Some(candidate) = resolver::resolve(backend, record).await {
            aggregator.add_server(candidate);
        }
    }

    tracing::info!("time is up, {} servers", aggregator.servers().len());
    aggregator.into_servers()
}
