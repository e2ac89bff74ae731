//! VitalTrend: temporal reasoning over a patient's medical-report history.
//!
//! The pipeline has three layers. The live memory index ([`memory`]) keeps
//! an append-only per-patient document store and answers temporal queries
//! over it. The reasoning engine ([`reasoning`]) frames a new report against
//! that history and detects significant changes, risk progressions, and
//! trends. The live adaptive agent ([`agent`]) orchestrates both, plus
//! optional entity extraction and LLM narrative generation, into one
//! analysis result per report.

pub mod agent;
pub mod config;
pub mod memory;
pub mod models;
pub mod reasoning;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
