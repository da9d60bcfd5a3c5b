//! # Gateway Test Utilities
//!
//! Shared test utilities for the IAM gateway.
//!
//! This crate provides:
//! - Fixed RSA signing keys and their JWKs
//! - A fluent builder for realm access tokens
//! - A wiremock-backed identity provider (certs and token endpoints)
//! - A harness that runs the real router in-process or on a local port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gw_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let authority = MockAuthority::start().await;
//!     authority.mount_jwks(&[TEST_KEY_1]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .with_roles(&["realm-admin"])
//!         .sign(&TEST_KEY_1);
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_authority;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_authority::*;
pub use server_harness::*;
pub use token_builders::*;
