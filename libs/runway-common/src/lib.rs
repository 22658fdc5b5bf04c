pub mod config;
pub mod error;
pub mod language;
pub mod messages;
pub mod pool;
pub mod queue;
pub mod reconnect;
pub mod redis;
pub mod remote;
pub mod runner;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{ErrorKind, RunwayError};
pub use language::Language;
