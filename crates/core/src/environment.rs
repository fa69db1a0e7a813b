//! Host discovery cached behind a time-to-live.
//!
//! The snapshot is published as an `Arc<Environment>`. Refreshing replaces or
//! copies it, so a scrape that already holds a snapshot never observes a
//! partial update.

use crate::{
    command::CommandRunner,
    error::{CoreError, Result},
    model::VolumeInfo,
};
use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

pub const IOSTAT: &str = "iostat";
pub const GETSYSINFO: &str = "getsysinfo";

/// Environment variable that overrides hostname discovery
pub const HOSTNAME_ENV: &str = "HOSTNAME";

const HOSTNAME_COMMAND: &str = "hostname";
const DISABLED: i64 = -1;

/// Upper bound on the probe index worth querying for a class of sensors.
///
/// Only ever lowered between rediscoveries. Clones share the same bound.
#[derive(Debug, Clone)]
pub struct SensorCeiling(Arc<AtomicI64>);

impl SensorCeiling {
    pub fn new(count: u32) -> Self {
        Self(Arc::new(AtomicI64::new(i64::from(count))))
    }

    pub fn disabled() -> Self {
        Self(Arc::new(AtomicI64::new(DISABLED)))
    }

    /// Number of probes to query, or `None` when probing is disabled.
    pub fn get(&self) -> Option<u32> {
        u32::try_from(self.0.load(Ordering::Relaxed)).ok()
    }

    /// Lower the ceiling to `highest`; never raises it.
    pub fn lower_to(&self, highest: u32) {
        self.0.fetch_min(i64::from(highest), Ordering::Relaxed);
    }
}

impl Default for SensorCeiling {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Host facts shared read-only with every source during a scrape
#[derive(Debug, Clone)]
pub struct Environment {
    pub hostname: String,
    pub iostat: Option<PathBuf>,
    pub getsysinfo: Option<PathBuf>,
    pub disk_probes: SensorCeiling,
    pub fan_probes: SensorCeiling,
    pub interfaces: Vec<String>,
    pub devices: Vec<String>,
    pub volumes: Vec<VolumeInfo>,
    pub expires_at: Instant,
    pub volumes_expire_at: Instant,
}

impl Environment {
    /// An undiscovered environment that is already due for refresh at `now`.
    pub fn empty(now: Instant) -> Self {
        Self {
            hostname: String::new(),
            iostat: None,
            getsysinfo: None,
            disk_probes: SensorCeiling::disabled(),
            fan_probes: SensorCeiling::disabled(),
            interfaces: Vec::new(),
            devices: Vec::new(),
            volumes: Vec::new(),
            expires_at: now,
            volumes_expire_at: now,
        }
    }
}

/// Where and how often to look
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Variable read on every rediscovery; a non-empty value wins over everything else
    pub hostname_env: Option<String>,
    pub hostname_override: Option<String>,
    /// Replaces `PATH` for tool lookup when set
    pub search_path: Option<OsString>,
    pub net_dir: PathBuf,
    pub dev_dir: PathBuf,
    pub validity: Duration,
    pub volume_validity: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            hostname_env: None,
            hostname_override: None,
            search_path: None,
            net_dir: PathBuf::from("/sys/class/net"),
            dev_dir: PathBuf::from("/dev"),
            validity: Duration::from_secs(5 * 60),
            volume_validity: Duration::from_secs(60),
        }
    }
}

pub struct EnvironmentCache {
    settings: DiscoverySettings,
    runner: Arc<dyn CommandRunner>,
    current: Arc<Environment>,
}

impl EnvironmentCache {
    pub fn new(settings: DiscoverySettings, runner: Arc<dyn CommandRunner>, now: Instant) -> Self {
        Self {
            settings,
            runner,
            current: Arc::new(Environment::empty(now)),
        }
    }

    /// Current snapshot; cheap to clone into worker threads.
    pub fn snapshot(&self) -> Arc<Environment> {
        Arc::clone(&self.current)
    }

    /// Rediscover the host if the snapshot has expired at `now`, otherwise
    /// refresh just the volume list if that has expired.
    pub fn ensure_fresh(&mut self, now: Instant) {
        if now >= self.current.expires_at {
            self.rediscover(now);
        } else if now >= self.current.volumes_expire_at {
            let volumes = match &self.current.getsysinfo {
                Some(tool) => self.read_volumes(tool),
                None => Vec::new(),
            };
            let env = Arc::make_mut(&mut self.current);
            env.volumes = volumes;
            env.volumes_expire_at = now + self.settings.volume_validity;
        }
    }

    fn rediscover(&mut self, now: Instant) {
        info!("Reading environment...");

        let hostname = self.discover_hostname();
        info!(hostname = %hostname, "Resolved hostname");

        let iostat = self.lookup_tool(IOSTAT);
        let getsysinfo = self.lookup_tool(GETSYSINFO);

        let (disk_probes, fan_probes, volumes) = match &getsysinfo {
            Some(tool) => (
                self.probe_count(tool, "hdnum"),
                self.probe_count(tool, "sysfannum"),
                self.read_volumes(tool),
            ),
            None => (SensorCeiling::disabled(), SensorCeiling::disabled(), Vec::new()),
        };

        let interfaces = list_dir(&self.settings.net_dir, false)
            .into_iter()
            .filter(|name| is_ethernet_interface(name))
            .collect::<Vec<_>>();
        let devices = list_dir(&self.settings.dev_dir, true)
            .into_iter()
            .filter(|name| is_whole_disk(name))
            .collect::<Vec<_>>();
        info!(interfaces = ?interfaces, devices = ?devices, "Found devices");

        self.current = Arc::new(Environment {
            hostname,
            iostat,
            getsysinfo,
            disk_probes,
            fan_probes,
            interfaces,
            devices,
            volumes,
            expires_at: next_expiry(self.current.expires_at, now, self.settings.validity),
            volumes_expire_at: now + self.settings.volume_validity,
        });
    }

    fn discover_hostname(&self) -> String {
        let from_env = self
            .settings
            .hostname_env
            .as_deref()
            .and_then(|key| env::var(key).ok())
            .filter(|name| !name.is_empty());
        if let Some(name) = from_env {
            return name;
        }

        if let Some(name) = self
            .settings
            .hostname_override
            .as_deref()
            .filter(|name| !name.is_empty())
        {
            return name.to_string();
        }

        match self.runner.run(Path::new(HOSTNAME_COMMAND), &[]) {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => system_hostname(),
            Err(e) => {
                warn!(error = %e, "Failed to run hostname");
                system_hostname()
            }
        }
    }

    fn lookup_tool(&self, name: &str) -> Option<PathBuf> {
        let found = match &self.settings.search_path {
            Some(paths) => which::which_in(name, Some(paths), "/"),
            None => which::which(name),
        };

        match found {
            Ok(path) => {
                debug!(tool = name, path = %path.display(), "Found tool");
                Some(path)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Failed to find tool");
                None
            }
        }
    }

    fn probe_count(&self, tool: &Path, subcommand: &str) -> SensorCeiling {
        match self
            .runner
            .run(tool, &[subcommand])
            .and_then(|output| parse_count(&output))
        {
            Ok(count) => SensorCeiling::new(count),
            Err(e) => {
                warn!(subcommand, error = %e, "Disabling sensor probing");
                SensorCeiling::disabled()
            }
        }
    }

    fn read_volumes(&self, tool: &Path) -> Vec<VolumeInfo> {
        let count = match self
            .runner
            .run(tool, &["sysvolnum"])
            .and_then(|output| parse_count(&output))
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to read volume count");
                return Vec::new();
            }
        };

        (1..=count)
            .filter_map(|volume| match self.read_volume(tool, volume) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(volume, error = %e, "Failed to read volume");
                    None
                }
            })
            .collect()
    }

    fn read_volume(&self, tool: &Path, volume: u32) -> Result<VolumeInfo> {
        let id = volume.to_string();
        let description = self.runner.run(tool, &["vol_desc", id.as_str()])?;
        let total_bytes = parse_size(&self.runner.run(tool, &["vol_totalsize", id.as_str()])?)?;
        let free_bytes = parse_size(&self.runner.run(tool, &["vol_freesize", id.as_str()])?)?;

        Ok(VolumeInfo {
            description,
            total_bytes,
            free_bytes,
        })
    }
}

/// Next expiry, anchored to the previous one so refreshes keep their cadence.
///
/// Re-anchors to `now` when the anchored value has already passed, so a long
/// gap between scrapes costs one refresh instead of one per missed window.
pub fn next_expiry(previous: Instant, now: Instant, window: Duration) -> Instant {
    let anchored = previous + window;
    if anchored <= now {
        now + window
    } else {
        anchored
    }
}

pub fn is_ethernet_interface(name: &str) -> bool {
    name.starts_with("eth")
}

/// Whole disks only: `sdX` and `nvmeXnY`, never their partitions.
pub fn is_whole_disk(name: &str) -> bool {
    (name.starts_with("nvme") && name.len() == 7) || (name.starts_with("sd") && name.len() == 3)
}

fn list_dir(dir: &Path, skip_dirs: bool) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to list directory");
            return Vec::new();
        }
    };

    let mut names = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| !skip_dirs || !entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect::<Vec<_>>();
    names.sort();
    names
}

fn parse_count(output: &str) -> Result<u32> {
    output
        .trim()
        .parse()
        .map_err(|_| CoreError::parse(format!("expected a count, got {:?}", output)))
}

/// Parse sizes such as `1.80 TB` or `512 MB` into bytes (binary multiples).
pub fn parse_size(output: &str) -> Result<f64> {
    let mut tokens = output.split_whitespace();
    let value: f64 = tokens
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| CoreError::parse(format!("expected a size, got {:?}", output)))?;

    let exponent = match tokens.next().map(|unit| unit.to_ascii_uppercase()).as_deref() {
        None | Some("B") => 0,
        Some("KB") => 1,
        Some("MB") => 2,
        Some("GB") => 3,
        Some("TB") => 4,
        Some("PB") => 5,
        Some(unit) => return Err(CoreError::parse(format!("unknown size unit {:?}", unit))),
    };

    Ok(value * 1024f64.powi(exponent))
}

fn system_hostname() -> String {
    #[cfg(unix)]
    {
        if let Ok(name) = nix::unistd::gethostname() {
            if let Ok(name) = name.into_string() {
                return name;
            }
        }
    }
    "unknown".to_string()
}
