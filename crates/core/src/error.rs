use std::time::Duration;
use thiserror::Error;

/// Core errors for the exporter
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("UPS error: {0}")]
    Ups(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("source panicked: {0}")]
    Panicked(String),

    #[error("source did not report within {0:?}")]
    TimedOut(Duration),

    #[error("source exited without reporting")]
    Abandoned,

    #[error("source is still running from a previous scrape")]
    StillRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn ups<S: Into<String>>(msg: S) -> Self {
        Self::Ups(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

/// Total failure of one source for one scrape.
///
/// `index` is the 1-based position of the source in the registry.
#[derive(Error, Debug)]
#[error("retrieve metric #{index}: {source}")]
pub struct SourceError {
    pub index: usize,
    #[source]
    pub source: CoreError,
}

impl SourceError {
    pub fn new(index: usize, source: CoreError) -> Self {
        Self { index, source }
    }
}
