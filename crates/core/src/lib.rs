pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod exporter;
pub mod harvest;
pub mod metrics;
pub mod model;
pub mod render;
pub mod ups;

pub use command::{CommandRunner, SystemRunner};
pub use config::{CliConfig, Config};
pub use environment::{DiscoverySettings, Environment, EnvironmentCache};
pub use error::{CoreError, Result, SourceError};
pub use exporter::Exporter;
pub use harvest::Harvester;
pub use metrics::{Source, SourceRegistry};
pub use model::*;
pub use render::Renderer;
pub use ups::UpsConnection;
