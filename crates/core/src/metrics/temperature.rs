//! Sensors read through the vendor `getsysinfo` tool.

use super::Source;
use crate::{
    command::{parse_leading_f64, CommandRunner},
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
};
use std::sync::Arc;

/// Reading reported for a probe with no hardware behind it
const NOT_PRESENT: &str = "--";

/// CPU and system board temperatures
pub struct SysTempCollector {
    runner: Arc<dyn CommandRunner>,
}

impl SysTempCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Source for SysTempCollector {
    fn name(&self) -> &'static str {
        "sysinfo_temp"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let Some(tool) = &env.getsysinfo else {
            return Ok(Vec::new());
        };

        let mut metrics = Vec::with_capacity(2);
        for sensor in ["cputmp", "systmp"] {
            let output = self.runner.run(tool, &[sensor])?;
            // Unparsable readings are skipped rather than failing the batch
            if let Ok(value) = parse_leading_f64(&output) {
                metrics.push(Metric::new(format!("node_{}_C", sensor), value));
            }
        }

        Ok(metrics)
    }
}

/// Fan speeds, one per fan probe
pub struct FanCollector {
    runner: Arc<dyn CommandRunner>,
}

impl FanCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Source for FanCollector {
    fn name(&self) -> &'static str {
        "sysinfo_fan"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let (Some(tool), Some(ceiling)) = (&env.getsysinfo, env.fan_probes.get()) else {
            return Ok(Vec::new());
        };

        let mut metrics = Vec::with_capacity(ceiling as usize);
        let mut highest_available = 0;

        for fan in 1..=ceiling {
            let fan_id = fan.to_string();
            let output = self.runner.run(tool, &["sysfan", fan_id.as_str()])?;
            if output == NOT_PRESENT {
                continue;
            }

            let value = parse_leading_f64(&output)?;
            metrics.push(Metric::new("node_sysfan_RPM", value).with_labels(&[("fan", fan_id.as_str())]));
            highest_available = fan;
        }

        env.fan_probes.lower_to(highest_available);
        Ok(metrics)
    }
}

/// Disk temperatures with SMART status, one per disk probe
pub struct DiskTempCollector {
    runner: Arc<dyn CommandRunner>,
}

impl DiskTempCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Source for DiskTempCollector {
    fn name(&self) -> &'static str {
        "sysinfo_hd"
    }

    fn collect(&self, env: &Environment) -> Result<MetricBatch> {
        let (Some(tool), Some(ceiling)) = (&env.getsysinfo, env.disk_probes.get()) else {
            return Ok(Vec::new());
        };

        let mut metrics = Vec::with_capacity(ceiling as usize);
        let mut highest_available = 0;

        for hd in 1..=ceiling {
            let hd_id = hd.to_string();
            let temp = self.runner.run(tool, &["hdtmp", hd_id.as_str()])?;
            if temp == NOT_PRESENT {
                continue;
            }

            let smart = self.runner.run(tool, &["hdsmart", hd_id.as_str()])?;
            let value = parse_leading_f64(&temp)?;

            metrics.push(
                Metric::new("node_hdtmp_C", value)
                    .with_labels(&[("hd", hd_id.as_str()), ("smart", smart.as_str())]),
            );
            highest_available = hd;
        }

        // Stop asking for disks that do not report
        env.disk_probes.lower_to(highest_available);
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::environment::SensorCeiling;
    use std::path::PathBuf;
    use std::time::Instant;

    fn qnap_env(disks: u32, fans: u32) -> Environment {
        let mut env = Environment::empty(Instant::now());
        env.getsysinfo = Some(PathBuf::from("/sbin/getsysinfo"));
        env.disk_probes = SensorCeiling::new(disks);
        env.fan_probes = SensorCeiling::new(fans);
        env
    }

    #[test]
    fn test_without_tool_nothing_is_probed() {
        let runner = Arc::new(ScriptedRunner::new());
        let env = Environment::empty(Instant::now());

        assert!(SysTempCollector::new(runner.clone()).collect(&env).unwrap().is_empty());
        assert!(FanCollector::new(runner.clone()).collect(&env).unwrap().is_empty());
        assert!(DiskTempCollector::new(runner.clone()).collect(&env).unwrap().is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_system_temperatures_skip_unparsable_readings() {
        let runner = ScriptedRunner::new()
            .ok("getsysinfo cputmp", "52 C/125 F")
            .ok("getsysinfo systmp", "--");
        let batch = SysTempCollector::new(Arc::new(runner)).collect(&qnap_env(0, 0)).unwrap();

        assert_eq!(batch, vec![Metric::new("node_cputmp_C", 52.0)]);
    }

    #[test]
    fn test_disk_ceiling_drops_to_highest_reporting_disk() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("getsysinfo hdtmp 1", "38 C/100 F")
                .ok("getsysinfo hdsmart 1", "GOOD")
                .ok("getsysinfo hdtmp 2", "41 C/105 F")
                .ok("getsysinfo hdsmart 2", "GOOD")
                .ok("getsysinfo hdtmp 3", "--")
                .ok("getsysinfo hdtmp 4", "--"),
        );
        let env = qnap_env(4, 0);
        let collector = DiskTempCollector::new(runner.clone());

        let batch = collector.collect(&env).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].attr.as_deref(), Some(r#"hd="2",smart="GOOD""#));
        assert_eq!(batch[1].value, 41.0);
        assert_eq!(env.disk_probes.get(), Some(2));

        collector.collect(&env).unwrap();
        assert!(!runner.calls()[6..].iter().any(|c| c.starts_with("getsysinfo hdtmp 3")));
    }

    #[test]
    fn test_disk_ceiling_never_rises() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("getsysinfo hdtmp 1", "--")
                .ok("getsysinfo hdtmp 2", "40 C/104 F")
                .ok("getsysinfo hdsmart 2", "GOOD")
                .ok("getsysinfo hdtmp 3", "45 C/113 F"),
        );
        let env = qnap_env(3, 0);
        env.disk_probes.lower_to(2);

        let batch = DiskTempCollector::new(runner.clone()).collect(&env).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(env.disk_probes.get(), Some(2));
        assert!(!runner.calls().iter().any(|c| c == "getsysinfo hdtmp 3"));
    }

    #[test]
    fn test_disk_exec_failure_fails_the_source() {
        let runner = ScriptedRunner::new().fail("getsysinfo hdtmp 1", "", "boom");
        let env = qnap_env(1, 0);

        assert!(DiskTempCollector::new(Arc::new(runner)).collect(&env).is_err());
        assert_eq!(env.disk_probes.get(), Some(1));
    }

    #[test]
    fn test_fans() {
        let runner = ScriptedRunner::new()
            .ok("getsysinfo sysfan 1", "1200 RPM")
            .ok("getsysinfo sysfan 2", "--");
        let env = qnap_env(0, 2);

        let batch = FanCollector::new(Arc::new(runner)).collect(&env).unwrap();
        assert_eq!(
            batch,
            vec![Metric::new("node_sysfan_RPM", 1200.0).with_labels(&[("fan", "1")])]
        );
        assert_eq!(env.fan_probes.get(), Some(1));
    }
}
