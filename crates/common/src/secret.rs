//! Secret types for session credentials.
//!
//! Re-exports [`secrecy`] so every crate in the workspace holds room tokens the
//! same way. A `SecretString` field keeps a derived `Debug` safe: the value
//! prints as `[REDACTED]`, so credentials can flow through `tracing` fields and
//! `{:?}` formatting without leaking. The inner value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credential {
//!     room_id: String,
//!     token: SecretString,
//! }
//!
//! let credential = Credential {
//!     room_id: "consult-42".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{credential:?}").contains("eyJhbGciOi"));
//! assert_eq!(credential.token.expose_secret(), "eyJhbGciOi...");
//! ```
//!
//! Only the media-room provider adapter should call `expose_secret()` on a
//! session token, at the moment it hands the token to the provider SDK.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
