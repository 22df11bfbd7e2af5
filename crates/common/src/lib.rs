//! Common utilities and types shared across the consultation client crates.

#![warn(clippy::pedantic)]

/// Module for shared value types (roles, track kinds, track handles)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
