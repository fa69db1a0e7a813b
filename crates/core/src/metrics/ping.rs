use super::Source;
use crate::{
    command::CommandRunner,
    environment::Environment,
    error::{CoreError, Result},
    model::{Metric, MetricBatch},
};
use std::{path::Path, sync::Arc};

const PING: &str = "ping";
const TIMEOUT_SECS: &str = "2";

/// Round-trip time to an external host; NaN when the probe was lost
pub struct PingCollector {
    runner: Arc<dyn CommandRunner>,
    target: String,
}

impl PingCollector {
    pub fn new(runner: Arc<dyn CommandRunner>, target: String) -> Self {
        Self { runner, target }
    }
}

impl Source for PingCollector {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn collect(&self, _env: &Environment) -> Result<MetricBatch> {
        let output = self
            .runner
            .output(Path::new(PING), &["-c", "1", "-W", TIMEOUT_SECS, self.target.as_str()])?;

        // ping exits non-zero on packet loss, which is still a measurement
        let Some(header) = output.stdout.lines().find(|line| line.starts_with("PING ")) else {
            return Err(CoreError::CommandFailed {
                program: PING.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        };

        let address = resolved_address(header).unwrap_or(&self.target);
        let value = output.stdout.lines().find_map(round_trip_ms).unwrap_or(f64::NAN);

        Ok(vec![Metric::new("node_network_external_roundtrip_time_ms", value)
            .with_labels(&[("target", address)])])
    }
}

/// `PING host (1.2.3.4) ...` -> `1.2.3.4`
fn resolved_address(header: &str) -> Option<&str> {
    let start = header.find('(')? + 1;
    let end = start + header[start..].find(')')?;
    Some(&header[start..end])
}

/// `64 bytes from ...: icmp_seq=1 ttl=57 time=12.3 ms` -> `12.3`
fn round_trip_ms(line: &str) -> Option<f64> {
    let rest = &line[line.find("time=")? + "time=".len()..];
    let token = rest.split_whitespace().next()?;
    token.trim_end_matches("ms").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use std::time::Instant;

    const REPLY: &str = "PING one.one.one.one (1.1.1.1) 56(84) bytes of data.
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms

--- one.one.one.one ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
";

    const LOST: &str = "PING one.one.one.one (1.1.1.1) 56(84) bytes of data.

--- one.one.one.one ping statistics ---
1 packets transmitted, 0 received, 100% packet loss, time 0ms
";

    fn collect(runner: ScriptedRunner) -> Result<MetricBatch> {
        PingCollector::new(Arc::new(runner), "one.one.one.one".to_string())
            .collect(&Environment::empty(Instant::now()))
    }

    #[test]
    fn test_round_trip_is_reported_in_ms() {
        let batch = collect(ScriptedRunner::new().ok("ping -c 1 -W 2 one.one.one.one", REPLY)).unwrap();
        assert_eq!(batch[0].value, 12.3);
        assert_eq!(batch[0].attr.as_deref(), Some(r#"target="1.1.1.1""#));
    }

    #[test]
    fn test_packet_loss_is_nan() {
        let batch = collect(ScriptedRunner::new().fail("ping -c 1 -W 2 one.one.one.one", LOST, "")).unwrap();
        assert!(batch[0].value.is_nan());
    }

    #[test]
    fn test_unresolvable_target_fails() {
        let runner = ScriptedRunner::new().fail(
            "ping -c 1 -W 2 one.one.one.one",
            "",
            "ping: one.one.one.one: Name or service not known",
        );
        let err = collect(runner).unwrap_err();
        assert!(err.to_string().contains("Name or service not known"));
    }

    #[test]
    fn test_busybox_reply() {
        assert_eq!(round_trip_ms("64 bytes from 1.1.1.1: seq=0 ttl=57 time=9.871 ms"), Some(9.871));
        assert_eq!(resolved_address("PING 1.1.1.1 (1.1.1.1): 56 data bytes"), Some("1.1.1.1"));
    }
}
