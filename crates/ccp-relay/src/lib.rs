//! CCP Relay - routes control messages between controllers and applications
//!
//! The relay keeps a registry of live connections for both roles, a
//! directory of identified applications, and a correlation route table.
//! It knows message types and addresses, never task semantics.

pub mod config;
pub mod directory;
pub mod error;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

pub use config::RelayConfig;
pub use directory::ApplicationDirectory;
pub use error::{RegistryError, RelayError};
pub use registry::{BroadcastReport, ConnectionRegistry, ConnectionToken, Outbound};
pub use server::RelayServer;
pub use state::{HealthSnapshot, Peer, RelayState, RouteTable, RouteTraceEvent};
