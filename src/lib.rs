//! Continuous HTTP connection probing.
//!
//! ```text
//! Scheduler (one loop per target)
//!     → tick → spawn attempt
//!         → Prober: GetConn → DNS → TCP → TLS → GotConn → write → first byte
//!             (each phase recorded into the attempt's TraceRecorder)
//!         → classify(outcome, last recorded phase)
//!         → MetricsSink.inc(target, reached state)
//! /metrics ← MetricsSink.render()
//! ```
//!
//! A rising counter at one reached state shows where in the
//! DNS → TCP → TLS → HTTP pipeline requests to a target fail or stall.

pub mod config;
pub mod http_probe;
pub mod metrics;
pub mod scheduler;
pub mod server;

pub use config::{AppConfig, ConfigError, Target};
pub use http_probe::prelude::*;
pub use metrics::MetricsSink;
pub use scheduler::{Scheduler, SchedulerHandle};
