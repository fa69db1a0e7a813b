use super::Source;
use crate::{
    environment::Environment,
    error::{CoreError, Result},
    model::{Metric, MetricBatch},
};
use std::{fs, path::PathBuf};

/// SSD cache counters from the flashcache stats file
pub struct FlashCacheCollector {
    stats_path: PathBuf,
}

impl FlashCacheCollector {
    pub fn new(stats_path: PathBuf) -> Self {
        Self { stats_path }
    }
}

impl Source for FlashCacheCollector {
    fn name(&self) -> &'static str {
        "flashcache"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        let contents = fs::read_to_string(&self.stats_path)?;
        parse_stats(&contents)
    }
}

/// One `key: value` pair per line
fn parse_stats(contents: &str) -> Result<MetricBatch> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<Metric> {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| CoreError::parse(format!("flashcache line without ':': {:?}", line)))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| CoreError::parse(format!("flashcache {}: bad value {:?}", key, value.trim())))?;
            Ok(Metric::new(format!("node_flashcache_{}", key.trim()), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_counters_in_file_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "reads: 120\nwrites: 30\n\nread_hit_percent: 87").unwrap();

        let batch = FlashCacheCollector::new(file.path().to_path_buf())
            .collect(&Environment::empty(Instant::now()))
            .unwrap();

        assert_eq!(
            batch,
            vec![
                Metric::new("node_flashcache_reads", 120.0),
                Metric::new("node_flashcache_writes", 30.0),
                Metric::new("node_flashcache_read_hit_percent", 87.0),
            ]
        );
    }

    #[test]
    fn test_missing_file_fails() {
        let collector = FlashCacheCollector::new(PathBuf::from("/nonexistent/flashcache_stats"));
        assert!(collector.collect(&Environment::empty(Instant::now())).is_err());
    }

    #[test]
    fn test_malformed_lines_fail() {
        assert!(parse_stats("reads 120").is_err());
        assert!(parse_stats("reads: many").is_err());
    }
}
