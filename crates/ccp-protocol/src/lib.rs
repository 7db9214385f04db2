//! CCP Protocol - Core types and message definitions
//!
//! Implements the Capability Control Protocol message catalogue: JSON
//! objects with a mandatory `type`, a type-specific `payload`, and the
//! optional top-level `software_id` / `correlation_id` fields.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
