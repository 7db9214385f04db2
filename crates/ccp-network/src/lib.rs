//! CCP Network - client transport to the relay
//!
//! One long-lived WebSocket per process at `/ws/{role}/{client_id}`.
//! A writer task drains an unbounded outbound queue so sending never
//! blocks; a reader task decodes frames into [`Inbound`] events.

pub mod error;
pub mod transport;

pub use error::NetworkError;
pub use transport::*;
