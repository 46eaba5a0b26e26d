//! rawork core data models.
//!
//! Identifiers, work states, the error taxonomy, probe events and the
//! configuration model shared by the monitoring layer and the work
//! manager.

#![warn(missing_docs)]

// Core identities
mod id;

// Work lifecycle
mod state;
mod error;
mod event;

// Configuration
pub mod config;

// Re-exports
pub use id::WorkId;
pub use state::{WaitMode, WorkState};
pub use error::{ConnectorError, ErrorCode, WorkError};
pub use event::ProbeEvent;
pub use config::{
    AdmissionPolicy, MonitoringConfig, PoolSettings, ThreadPoolConfig, WorkManagerConfig,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
