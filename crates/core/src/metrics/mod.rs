pub mod cpu;
pub mod disk;
pub mod flashcache;
pub mod memory;
pub mod network;
pub mod ping;
pub mod system;
pub mod temperature;
pub mod ups;
pub mod volume;

pub use cpu::CpuRatioCollector;
pub use disk::DiskStatsCollector;
pub use flashcache::FlashCacheCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use ping::PingCollector;
pub use system::{LoadAvgCollector, UptimeCollector};
pub use temperature::{DiskTempCollector, FanCollector, SysTempCollector};
pub use ups::UpsCollector;
pub use volume::VolumeCollector;

use crate::{
    command::CommandRunner, config::Config, environment::Environment, error::Result,
    model::MetricBatch, ups::UpsConnection,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// An independently invocable producer of metrics.
///
/// Sources read the shared [`Environment`] but never modify it, apart from
/// lowering its sensor ceilings.
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    fn collect(&self, env: &Environment) -> Result<MetricBatch>;
}

/// A registered source and whether an invocation of it is still running
#[derive(Clone)]
pub struct RegisteredSource {
    source: Arc<dyn Source>,
    running: Arc<AtomicBool>,
}

impl RegisteredSource {
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    /// Mark the source as running, or `None` if an earlier invocation has
    /// not returned yet. The mark is cleared when the guard is dropped.
    pub fn claim(&self) -> Option<InFlight> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(&self.running)))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Running mark held by one invocation of a source
pub struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ordered list of sources; position + 1 identifies a source in error reports
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set of host sources, in reporting order.
    pub fn standard(config: &Config, runner: Arc<dyn CommandRunner>, ups: Arc<UpsConnection>) -> Self {
        let mut registry = Self::new();
        registry
            .push(UptimeCollector)
            .push(LoadAvgCollector)
            .push(CpuRatioCollector)
            .push(MemoryCollector)
            .push(UpsCollector::new(ups))
            .push(SysTempCollector::new(Arc::clone(&runner)))
            .push(FanCollector::new(Arc::clone(&runner)))
            .push(DiskTempCollector::new(Arc::clone(&runner)))
            .push(VolumeCollector)
            .push(DiskStatsCollector::new(Arc::clone(&runner)))
            .push(FlashCacheCollector::new(config.flashcache_stats_path.clone()))
            .push(NetworkCollector::new(config.net_dir.clone()))
            .push(PingCollector::new(runner, config.ping_target.clone()));
        registry
    }

    pub fn push<S: Source + 'static>(&mut self, source: S) -> &mut Self {
        self.sources.push(RegisteredSource {
            source: Arc::new(source),
            running: Arc::new(AtomicBool::new(false)),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.sources.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }
}
