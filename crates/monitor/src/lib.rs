//! Work management monitoring.
//!
//! The instrumentation layer observing the work manager: the probe
//! contract, per-adapter statistics and the registry routing probe calls
//! to them.

#![warn(missing_docs)]

pub mod probe;
pub mod stats;

pub use probe::{ProbeProvider, WorkProbe};
pub use stats::{GaugeSnapshot, RangedGauge, WorkStatsProvider, WorkStatsSnapshot};
