use super::Source;
use crate::{
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
};
use sysinfo::System;

pub struct UptimeCollector;

impl Source for UptimeCollector {
    fn name(&self) -> &'static str {
        "uptime"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        Ok(vec![Metric::new("node_time_seconds", System::uptime() as f64)
            .with_help("System uptime measured in seconds")
            .counter()])
    }
}

pub struct LoadAvgCollector;

impl Source for LoadAvgCollector {
    fn name(&self) -> &'static str {
        "loadavg"
    }

    #[cfg(unix)]
    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        let load = System::load_average();
        Ok(vec![
            Metric::new("node_load1", load.one),
            Metric::new("node_load5", load.five),
            Metric::new("node_load15", load.fifteen),
        ])
    }

    #[cfg(not(unix))]
    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        Err(crate::error::CoreError::parse("load average is not available on this platform"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_uptime_is_a_counter() {
        let batch = UptimeCollector.collect(&Environment::empty(Instant::now())).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "node_time_seconds");
        assert_eq!(batch[0].metric_type, Some(crate::model::MetricType::Counter));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_average_order() {
        let batch = LoadAvgCollector.collect(&Environment::empty(Instant::now())).unwrap();
        let names: Vec<_> = batch.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["node_load1", "node_load5", "node_load15"]);
    }
}
