use super::Source;
use crate::{
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
};
use sysinfo::System;

pub struct MemoryCollector;

impl Source for MemoryCollector {
    fn name(&self) -> &'static str {
        "meminfo"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        let mut sys = System::new();
        sys.refresh_memory();

        let gauge = |name: &str, help: &str, bytes: u64| Metric::new(name, bytes as f64).with_help(help).gauge();

        Ok(vec![
            gauge("node_memory_MemTotal_bytes", "Total usable memory", sys.total_memory()),
            gauge("node_memory_MemFree_bytes", "Unused memory", sys.free_memory()),
            gauge(
                "node_memory_MemAvailable_bytes",
                "Memory available for new workloads",
                sys.available_memory(),
            ),
            gauge("node_memory_SwapTotal_bytes", "Total swap space", sys.total_swap()),
            gauge("node_memory_SwapFree_bytes", "Unused swap space", sys.free_swap()),
        ])
    }
}
