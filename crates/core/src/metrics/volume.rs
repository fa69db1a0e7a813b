use super::Source;
use crate::{
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
};

/// Volume capacity, served from the cached volume list
pub struct VolumeCollector;

impl Source for VolumeCollector {
    fn name(&self) -> &'static str {
        "sysinfo_volume"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let mut metrics = Vec::with_capacity(env.volumes.len() * 2);
        for volume in &env.volumes {
            let labels = [("volume", volume.description.as_str())];
            metrics.push(
                Metric::new("node_volume_size_bytes", volume.total_bytes)
                    .with_labels(&labels)
                    .with_help("Volume capacity in bytes")
                    .gauge(),
            );
            metrics.push(
                Metric::new("node_volume_free_bytes", volume.free_bytes)
                    .with_labels(&labels)
                    .with_help("Free space on the volume in bytes")
                    .gauge(),
            );
        }
        Ok(metrics)
    }
}
