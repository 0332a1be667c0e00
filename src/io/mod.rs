// src/io/mod.rs
//
// Data sources for the thermal viewer.
// A source produces raw text lines (one frame per line) and hands them to a
// DataSink. The simulator and the serial transport share one lifecycle trait so
// the consumer can switch between them without caring which one is live.

mod error;
pub mod serial;
pub mod simulator;
mod types;

pub use error::IoError;
pub use simulator::{SimulatorConfig, SimulatorSource, ThermalSimulator};
pub use types::{ChannelSink, DataSink, SourceMessage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Connection state of a data source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Whether data may currently be flowing
    pub fn is_live(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Result of a `start` call that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// No device was selected; nothing changed
    Cancelled,
}

/// Trait for all thermal data sources (simulator, serial camera)
#[async_trait]
pub trait ThermalSource: Send + Sync {
    /// Start producing lines
    async fn start(&mut self) -> Result<ConnectOutcome, IoError>;

    /// Stop producing lines. No further `on_data` calls once this returns.
    async fn stop(&mut self) -> Result<(), IoError>;

    /// Get current state
    fn state(&self) -> ConnectionState;

    /// Watch state changes, including ones the source makes on its own
    /// (device unplugged, stream ended)
    fn subscribe(&self) -> watch::Receiver<ConnectionState>;

    /// Get device type identifier ("simulator", "serial")
    fn device_type(&self) -> &'static str {
        "unknown"
    }
}
