//! Secret types for values that must never reach a log line.
//!
//! Re-exports the [`secrecy`] types used across the gateway. Anything that
//! carries a password, client secret, refresh token, or admin access token is
//! held as a [`SecretString`] so that a derived `Debug` prints a redaction
//! marker instead of the value.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct PasswordReset {
//!     user_id: String,
//!     password: SecretString,
//! }
//!
//! let reset = PasswordReset {
//!     user_id: "0b6a2c1e".to_string(),
//!     password: SecretString::from("p1"),
//! };
//!
//! assert!(!format!("{reset:?}").contains("p1"));
//! assert_eq!(reset.password.expose_secret(), "p1");
//! ```
//!
//! With the `serde` feature of `secrecy`, request bodies can deserialize
//! straight into `SecretString` fields. Serialization is deliberately not
//! available; exposing a value must go through `expose_secret()`.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
