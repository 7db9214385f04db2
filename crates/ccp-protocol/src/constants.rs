/// Default port the relay listens on.
pub const DEFAULT_RELAY_PORT: u16 = 8000;

/// Default bind address of the relay.
pub const DEFAULT_RELAY_BIND: &str = "127.0.0.1:8000";

/// Default WebSocket base URL clients dial.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8000";

/// Close code sent when a client connects with an unknown role.
pub const CLOSE_CODE_UNKNOWN_ROLE: u16 = 4001;

/// How long a controller waits for a correlated response.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 10;

/// How long a controller waits for the planner.
pub const DEFAULT_PLANNER_TIMEOUT_SECS: u64 = 60;

/// Status value carried by a successful registration acknowledgement.
pub const REGISTRATION_STATUS_SUCCESS: &str = "success";
