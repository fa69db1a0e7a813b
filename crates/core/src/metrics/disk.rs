use super::Source;
use crate::{
    command::CommandRunner,
    environment::Environment,
    error::{CoreError, Result},
    model::{Metric, MetricBatch},
};
use std::sync::Arc;

// Columns of `iostat -k -d`: Device tps kB_read/s kB_wrtn/s kB_dscd/s kB_read kB_wrtn ...
const READ_FIELD: usize = 5;
const WRITTEN_FIELD: usize = 6;

/// Cumulative disk throughput as reported by `iostat`
pub struct DiskStatsCollector {
    runner: Arc<dyn CommandRunner>,
}

impl DiskStatsCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Source for DiskStatsCollector {
    fn name(&self) -> &'static str {
        "diskstats"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let Some(iostat) = &env.iostat else {
            return Ok(Vec::new());
        };

        let mut args = vec!["-k", "-d"];
        args.extend(env.devices.iter().map(String::as_str));
        let lines = self.runner.run_lines(iostat, &args)?;

        parse_iostat(&lines)
    }
}

/// Turn `iostat -k -d` output into read/written counters per device.
pub fn parse_iostat(lines: &[String]) -> Result<MetricBatch> {
    let header = lines
        .iter()
        .position(|line| line.starts_with("Device"))
        .ok_or_else(|| {
            CoreError::parse(format!(
                "iostat output missing device header - found {} lines",
                lines.len()
            ))
        })?;

    let mut metrics = Vec::new();
    for line in lines[header + 1..].iter().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        metrics.push(disk_stat_metric(
            "node_disk_read_kbytes_total",
            "Total number of kilobytes read",
            &fields,
            READ_FIELD,
        )?);
        metrics.push(disk_stat_metric(
            "node_disk_written_kbytes_total",
            "Total number of kilobytes written",
            &fields,
            WRITTEN_FIELD,
        )?);
    }

    Ok(metrics)
}

fn disk_stat_metric(name: &str, help: &str, fields: &[&str], field: usize) -> Result<Metric> {
    let raw = fields.get(field).ok_or_else(|| {
        CoreError::parse(format!(
            "disk stat metric {:?}: field {} missing in {} total fields",
            name,
            field,
            fields.len()
        ))
    })?;
    let value: f64 = raw
        .parse()
        .map_err(|_| CoreError::parse(format!("disk stat metric {:?}: bad value {:?}", name, raw)))?;

    Ok(Metric::new(name, value)
        .with_labels(&[("device", fields[0])])
        .with_help(help)
        .counter())
}
