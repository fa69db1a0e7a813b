use crate::error::{CoreError, Result};
use std::path::Path;
use std::process::Command;

/// Captured result of running an external program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs on behalf of discovery and sources
pub trait CommandRunner: Send + Sync {
    /// Run `program` and capture its output. Errors only when it cannot be started.
    fn output(&self, program: &Path, args: &[&str]) -> Result<CommandOutput>;

    /// Run `program`, requiring success, and return trimmed stdout.
    fn run(&self, program: &Path, args: &[&str]) -> Result<String> {
        let output = self.output(program, args)?;
        if !output.success {
            return Err(CoreError::CommandFailed {
                program: program.display().to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Like [`CommandRunner::run`], split into lines.
    fn run_lines(&self, program: &Path, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .run(program, args)?
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Runner backed by `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, program: &Path, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| CoreError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Parse the leading number of outputs such as `45 C/113 F` or `1200 RPM`.
pub fn parse_leading_f64(output: &str) -> Result<f64> {
    let token = output.split_whitespace().next().unwrap_or("");
    token
        .parse()
        .map_err(|_| CoreError::parse(format!("expected a number, got {:?}", output)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Runner that answers from a script keyed by `program arg1 arg2 ...`,
    /// where `program` is the file name only. Unscripted invocations fail to spawn.
    #[derive(Default)]
    pub struct ScriptedRunner {
        script: HashMap<String, CommandOutput>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(mut self, command: &str, stdout: &str) -> Self {
            self.script.insert(
                command.to_string(),
                CommandOutput {
                    success: true,
                    status: "exit status: 0".to_string(),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            );
            self
        }

        pub fn fail(mut self, command: &str, stdout: &str, stderr: &str) -> Self {
            self.script.insert(
                command.to_string(),
                CommandOutput {
                    success: false,
                    status: "exit status: 1".to_string(),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, program: &Path, args: &[&str]) -> Result<CommandOutput> {
            let mut key = program
                .file_name()
                .unwrap_or(program.as_os_str())
                .to_string_lossy()
                .into_owned();
            for arg in args {
                key.push(' ');
                key.push_str(arg);
            }
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(key.clone());
            }
            self.script.get(&key).cloned().ok_or_else(|| CoreError::Spawn {
                program: key,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not scripted"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_run_trims_stdout() {
        let runner = ScriptedRunner::new().ok("hostname", "nas01\n");
        assert_eq!(runner.run(Path::new("hostname"), &[]).unwrap(), "nas01");
    }

    #[test]
    fn test_run_rejects_failed_status() {
        let runner = ScriptedRunner::new().fail("getsysinfo hdnum", "", "boom");
        let err = runner.run(Path::new("getsysinfo"), &["hdnum"]).unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { ref stderr, .. } if stderr == "boom"));
    }

    #[test]
    fn test_parse_leading_f64() {
        assert_eq!(parse_leading_f64("45 C/113 F").unwrap(), 45.0);
        assert_eq!(parse_leading_f64("1200 RPM").unwrap(), 1200.0);
        assert!(parse_leading_f64("--").is_err());
        assert!(parse_leading_f64("").is_err());
    }
}
