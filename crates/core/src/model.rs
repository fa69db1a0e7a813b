use crate::error::SourceError;
use std::fmt;

/// Exposition type of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sample produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Stable identifier, `<namespace>_<unit>`
    pub name: String,
    /// Sample value; NaN means unknown
    pub value: f64,
    /// Pre-formatted label fragment appended after the node label
    pub attr: Option<String>,
    pub help: Option<String>,
    pub metric_type: Option<MetricType>,
}

impl Metric {
    pub fn new<S: Into<String>>(name: S, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            attr: None,
            help: None,
            metric_type: None,
        }
    }

    /// Attach labels, quoting and escaping each value.
    pub fn with_labels(mut self, labels: &[(&str, &str)]) -> Self {
        let fragment = labels
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape_label_value(value)))
            .collect::<Vec<_>>()
            .join(",");
        self.attr = if fragment.is_empty() { None } else { Some(fragment) };
        self
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = Some(metric_type);
        self
    }

    pub fn counter(self) -> Self {
        self.with_type(MetricType::Counter)
    }

    pub fn gauge(self) -> Self {
        self.with_type(MetricType::Gauge)
    }
}

/// Ordered metrics produced atomically by one source
pub type MetricBatch = Vec<Metric>;

/// One outcome delivered by the harvester
#[derive(Debug)]
pub enum Harvested {
    Batch(MetricBatch),
    Failed(SourceError),
}

/// Capacity information for one storage volume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInfo {
    pub description: String,
    pub total_bytes: f64,
    pub free_bytes: f64,
}

/// Escape a label value for the exposition format.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}
