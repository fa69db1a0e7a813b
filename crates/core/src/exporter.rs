//! One scrape: refresh the environment, harvest every source, render.

use crate::{
    command::{CommandRunner, SystemRunner},
    config::Config,
    environment::EnvironmentCache,
    harvest::Harvester,
    metrics::SourceRegistry,
    model::Harvested,
    render::Renderer,
    ups::{NutConnector, UpsConnection},
};
use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};
use tracing::{debug, warn};

pub struct Exporter {
    cache: Mutex<EnvironmentCache>,
    registry: SourceRegistry,
    harvester: Harvester,
    ups: Option<Arc<UpsConnection>>,
}

impl Exporter {
    /// Exporter over the standard host sources.
    pub fn new(config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let ups = Arc::new(UpsConnection::new(Box::new(NutConnector::new(
            config.ups_address.clone(),
            config.ups_timeout(),
        ))));

        let cache = EnvironmentCache::new(config.discovery_settings(), Arc::clone(&runner), Instant::now());
        let registry = SourceRegistry::standard(config, runner, Arc::clone(&ups));

        Self::from_parts(cache, registry, config.harvester(), Some(ups))
    }

    pub fn from_parts(
        cache: EnvironmentCache,
        registry: SourceRegistry,
        harvester: Harvester,
        ups: Option<Arc<UpsConnection>>,
    ) -> Self {
        Self {
            cache: Mutex::new(cache),
            registry,
            harvester,
            ups,
        }
    }

    /// Write one scrape to `w`. Source failures become comment lines; nothing
    /// is returned to the caller.
    pub fn write_metrics<W: Write + ?Sized>(&self, w: &mut W) {
        let started = Instant::now();

        // Refresh completes before any source sees the snapshot
        let env = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.ensure_fresh(started);
            cache.snapshot()
        };

        let renderer = Renderer::new(&env.hostname);
        let mut failures = 0;
        for item in self.harvester.collect_all(&self.registry, Arc::clone(&env)) {
            if let Harvested::Failed(error) = &item {
                failures += 1;
                warn!(error = %error, "Source failed");
            }
            if let Err(e) = renderer.render(w, &item) {
                warn!(error = %e, "Failed to write metrics");
                return;
            }
        }

        debug!(
            sources = self.registry.len(),
            failures,
            elapsed = ?started.elapsed(),
            "Scrape complete"
        );
    }

    /// Release the UPS connection.
    pub fn close(&self) {
        if let Some(ups) = &self.ups {
            ups.shutdown();
        }
    }
}
