//! Observability for the gateway.
//!
//! Provides metric definitions and the Prometheus recorder.

pub mod metrics;
