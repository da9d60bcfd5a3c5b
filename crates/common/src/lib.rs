//! Shared building blocks for the IAM gateway crates.

#![warn(clippy::pedantic)]

/// Secret wrappers that keep passwords and tokens out of logs
pub mod secret;

/// Structural JWT helpers (size limits, skew bounds, unverified header parsing)
pub mod jwt;

/// Privileged admin credential acquisition with lazy refresh
pub mod token_manager;
