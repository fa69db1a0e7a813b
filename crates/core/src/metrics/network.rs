use super::Source;
use crate::{
    environment::Environment,
    error::{CoreError, Result},
    model::{Metric, MetricBatch},
};
use std::{fs, path::PathBuf};

/// Byte counters for every discovered ethernet interface
pub struct NetworkCollector {
    net_dir: PathBuf,
}

impl NetworkCollector {
    pub fn new(net_dir: PathBuf) -> Self {
        Self { net_dir }
    }

    fn stat_metric(&self, name: &str, help: &str, iface: &str, direction: &str) -> Result<Metric> {
        let path = self
            .net_dir
            .join(iface)
            .join("statistics")
            .join(format!("{}_bytes", direction));
        let raw = fs::read_to_string(&path)?;
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| CoreError::parse(format!("{}: bad counter {:?}", path.display(), raw.trim())))?;

        Ok(Metric::new(name, value)
            .with_labels(&[("device", iface)])
            .with_help(help)
            .counter())
    }
}

impl Source for NetworkCollector {
    fn name(&self) -> &'static str {
        "network"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let mut metrics = Vec::with_capacity(env.interfaces.len() * 2);
        for iface in &env.interfaces {
            metrics.push(self.stat_metric(
                "node_network_receive_bytes_total",
                "Total number of bytes received",
                iface,
                "rx",
            )?);
            metrics.push(self.stat_metric(
                "node_network_transmit_bytes_total",
                "Total number of bytes transmitted",
                iface,
                "tx",
            )?);
        }
        Ok(metrics)
    }
}
