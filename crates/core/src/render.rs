//! Text exposition format.

use crate::{
    error::SourceError,
    model::{escape_label_value, Harvested, Metric},
};
use std::io::{self, Write};

/// Writes harvest outcomes for one node
pub struct Renderer {
    node: String,
}

impl Renderer {
    pub fn new(hostname: &str) -> Self {
        Self {
            node: escape_label_value(hostname),
        }
    }

    pub fn render<W: Write + ?Sized>(&self, w: &mut W, item: &Harvested) -> io::Result<()> {
        match item {
            Harvested::Batch(batch) => batch.iter().try_for_each(|metric| self.render_metric(w, metric)),
            Harvested::Failed(error) => render_error(w, error),
        }
    }

    /// HELP and TYPE lines are repeated for every metric that carries them.
    pub fn render_metric<W: Write + ?Sized>(&self, w: &mut W, metric: &Metric) -> io::Result<()> {
        if let Some(help) = metric.help.as_deref().filter(|help| !help.is_empty()) {
            writeln!(w, "# HELP {} {}", metric.name, help)?;
        }
        if let Some(metric_type) = metric.metric_type {
            writeln!(w, "# TYPE {} {}", metric.name, metric_type)?;
        }

        match metric.attr.as_deref().filter(|attr| !attr.is_empty()) {
            Some(attr) => writeln!(
                w,
                "{}{{node=\"{}\",{}}} {}",
                metric.name,
                self.node,
                attr,
                format_value(metric.value)
            ),
            None => writeln!(w, "{}{{node=\"{}\"}} {}", metric.name, self.node, format_value(metric.value)),
        }
    }
}

pub fn render_error<W: Write + ?Sized>(w: &mut W, error: &SourceError) -> io::Result<()> {
    let message = error.to_string().replace(['\r', '\n'], " ");
    writeln!(w, "## {}", message)
}

/// Shortest decimal form that parses back to the same value. Magnitudes of
/// 1e21 and above or below 1e-6 switch to exponent notation (`1e+21`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    } else if value == f64::INFINITY {
        return "+Inf".to_string();
    } else if value == f64::NEG_INFINITY {
        return "-Inf".to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{:e}", value);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }

    value.to_string()
}
