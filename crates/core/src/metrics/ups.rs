use super::Source;
use crate::{
    environment::Environment,
    error::Result,
    model::{Metric, MetricBatch},
    ups::UpsConnection,
};
use std::sync::Arc;

/// NUT variables exported as gauges: (variable, metric, help)
const GAUGES: &[(&str, &str, &str)] = &[
    ("battery.charge", "node_ups_battery_charge_percent", "Battery charge"),
    ("battery.runtime", "node_ups_battery_runtime_seconds", "Estimated battery runtime"),
    ("battery.voltage", "node_ups_battery_voltage_volts", "Battery voltage"),
    ("input.voltage", "node_ups_input_voltage_volts", "Input voltage"),
    ("output.voltage", "node_ups_output_voltage_volts", "Output voltage"),
    ("ups.load", "node_ups_load_percent", "Load on the UPS"),
    ("ups.realpower.nominal", "node_ups_realpower_nominal_watts", "Nominal real power"),
];

/// Status and battery readings for every unit known to the UPS daemon
pub struct UpsCollector {
    connection: Arc<UpsConnection>,
}

impl UpsCollector {
    pub fn new(connection: Arc<UpsConnection>) -> Self {
        Self { connection }
    }
}

impl Source for UpsCollector {
    fn name(&self) -> &'static str {
        "ups"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        self.connection.read(|session, units| {
            let mut metrics = Vec::new();
            for unit in units {
                let vars = session.list_vars(unit)?;
                metrics.extend(unit_metrics(unit, &vars));
            }
            Ok(metrics)
        })
    }
}

fn lookup<'a>(vars: &'a [(String, String)], name: &str) -> Option<&'a str> {
    vars.iter()
        .find(|(var, _)| var == name)
        .map(|(_, value)| value.as_str())
}

fn unit_metrics(unit: &str, vars: &[(String, String)]) -> MetricBatch {
    let labels = [("ups", unit)];

    let mut metrics = Vec::new();
    for (var, name, help) in GAUGES {
        if let Some(value) = lookup(vars, var).and_then(|v| v.parse::<f64>().ok()) {
            metrics.push(Metric::new(*name, value).with_labels(&labels).with_help(*help).gauge());
        }
    }

    // ups.status is a space separated flag list such as "OL CHRG"
    if let Some(status) = lookup(vars, "ups.status") {
        let flags: Vec<&str> = status.split_whitespace().collect();
        let flag = |f: &str| if flags.iter().any(|set| *set == f) { 1.0 } else { 0.0 };
        metrics.push(
            Metric::new("node_ups_online", flag("OL"))
                .with_labels(&labels)
                .with_help("Whether the UPS is on line power")
                .gauge(),
        );
        metrics.push(
            Metric::new("node_ups_on_battery", flag("OB"))
                .with_labels(&labels)
                .with_help("Whether the UPS is running on battery")
                .gauge(),
        );
    }

    metrics
}
