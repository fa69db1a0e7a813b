//! Shared, lazily connected handle to a UPS daemon.

pub mod nut;

pub use nut::{NutClient, NutConnector};

use crate::error::{CoreError, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// An open session with a UPS daemon
pub trait UpsSession: Send {
    /// Protocol version reported by the daemon; empty if never negotiated.
    fn protocol_version(&self) -> &str;

    fn list_units(&mut self) -> Result<Vec<String>>;

    /// Variables of one unit as `(name, value)` pairs.
    fn list_vars(&mut self, unit: &str) -> Result<Vec<(String, String)>>;

    fn disconnect(&mut self) -> Result<()>;
}

/// Opens sessions with a UPS daemon
pub trait UpsConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn UpsSession>>;
}

#[derive(Default)]
struct UpsState {
    session: Option<Box<dyn UpsSession>>,
    last_error: Option<String>,
    attempts: u32,
    units: Vec<String>,
}

/// Owns the UPS session. The read path and shutdown share one lock, held only
/// for the duration of a single connect/read or disconnect.
pub struct UpsConnection {
    connector: Box<dyn UpsConnector>,
    state: Mutex<UpsState>,
}

impl UpsConnection {
    pub fn new(connector: Box<dyn UpsConnector>) -> Self {
        Self {
            connector,
            state: Mutex::new(UpsState::default()),
        }
    }

    /// Run `read` against the session, connecting first if needed.
    ///
    /// A failed connect or read is kept as the last error and drops the
    /// session, so the next call starts from a fresh connection.
    pub fn read<T, F>(&self, read: F) -> Result<T>
    where
        F: FnOnce(&mut dyn UpsSession, &[String]) -> Result<T>,
    {
        let mut state = self.lock();

        if state.session.is_none() {
            state.attempts += 1;
            match self.connect() {
                Ok((session, units)) => {
                    info!(
                        version = session.protocol_version(),
                        units = ?units,
                        attempt = state.attempts,
                        "Connected to UPS daemon"
                    );
                    state.session = Some(session);
                    state.units = units;
                    state.last_error = None;
                }
                Err(e) => {
                    let message = format!("connect to UPS daemon (attempt {}): {}", state.attempts, e);
                    state.last_error = Some(message.clone());
                    return Err(CoreError::ups(message));
                }
            }
        }

        let UpsState { session, units, .. } = &mut *state;
        let result = match session.as_mut() {
            Some(session) => read(&mut **session, units.as_slice()),
            None => return Err(CoreError::ups("no UPS session")),
        };

        if let Err(e) = &result {
            warn!(error = %e, "UPS read failed, dropping session");
            state.last_error = Some(e.to_string());
            state.session = None;
            state.units.clear();
        }
        result
    }

    fn connect(&self) -> Result<(Box<dyn UpsSession>, Vec<String>)> {
        let mut session = self.connector.connect()?;
        let units = session.list_units()?;
        Ok((session, units))
    }

    /// Disconnect if a session was ever negotiated. Errors are ignored.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(mut session) = state.session.take() {
            if !session.protocol_version().is_empty() {
                if let Err(e) = session.disconnect() {
                    debug!(error = %e, "Ignoring UPS disconnect error");
                }
            }
        }
        state.units.clear();
    }

    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, UpsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeConnector, FakeDaemon};
    use super::*;
    use std::sync::{atomic::Ordering, Arc};

    fn connection(daemon: &Arc<FakeDaemon>) -> UpsConnection {
        UpsConnection::new(Box::new(FakeConnector(Arc::clone(daemon))))
    }

    #[test]
    fn test_connects_lazily_and_reuses_session() {
        let daemon = Arc::new(FakeDaemon::default());
        let ups = connection(&daemon);
        assert!(!ups.is_connected());
        assert_eq!(daemon.connects.load(Ordering::SeqCst), 0);

        let units = ups.read(|_, units| Ok(units.to_vec())).unwrap();
        assert_eq!(units, vec!["qnapups"]);
        ups.read(|_, _| Ok(())).unwrap();

        assert_eq!(daemon.connects.load(Ordering::SeqCst), 1);
        assert_eq!(ups.attempts(), 1);
    }

    #[test]
    fn test_connect_failure_is_retained() {
        let daemon = Arc::new(FakeDaemon::default());
        daemon.refuse.store(true, Ordering::SeqCst);
        let ups = connection(&daemon);

        assert!(ups.read(|_, _| Ok(())).is_err());
        assert!(ups.read(|_, _| Ok(())).is_err());
        assert_eq!(ups.attempts(), 2);
        assert!(ups.last_error().unwrap().contains("attempt 2"));

        daemon.refuse.store(false, Ordering::SeqCst);
        ups.read(|_, _| Ok(())).unwrap();
        assert_eq!(ups.attempts(), 3);
        assert!(ups.last_error().is_none());
    }

    #[test]
    fn test_failed_read_drops_session() {
        let daemon = Arc::new(FakeDaemon::default());
        daemon.fail_reads.store(true, Ordering::SeqCst);
        let ups = connection(&daemon);

        let err = ups.read(|session, units| session.list_vars(&units[0])).unwrap_err();
        assert!(err.to_string().contains("read timed out"));
        assert!(!ups.is_connected());
        assert_eq!(ups.last_error().as_deref(), Some("UPS error: read timed out"));
    }

    #[test]
    fn test_shutdown_only_disconnects_established_session() {
        let daemon = Arc::new(FakeDaemon::default());
        let ups = connection(&daemon);

        ups.shutdown();
        assert_eq!(daemon.disconnects.load(Ordering::SeqCst), 0);

        ups.read(|_, _| Ok(())).unwrap();
        ups.shutdown();
        assert_eq!(daemon.disconnects.load(Ordering::SeqCst), 1);
        assert!(!ups.is_connected());
    }
}
