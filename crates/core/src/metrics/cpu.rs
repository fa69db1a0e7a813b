use super::Source;
use crate::{
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
};
use std::thread;
use sysinfo::System;

/// Overall CPU busy ratio, sampled over the minimum update interval
pub struct CpuRatioCollector;

impl Source for CpuRatioCollector {
    fn name(&self) -> &'static str {
        "cpu_ratio"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        let mut sys = System::new();
        sys.refresh_cpu();
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu();

        let usage = f64::from(sys.global_cpu_info().cpu_usage()) / 100.0;

        Ok(vec![Metric::new("node_cpu_ratio", usage.clamp(0.0, 1.0))
            .with_help("Ratio of CPU time spent busy")
            .gauge()])
    }
}
