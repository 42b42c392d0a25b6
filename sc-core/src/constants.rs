//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "storechat";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// REST API version prefix.
pub const API_VERSION: &str = "v1";

/// Default server API timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Default socket handshake timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Default socket mount path on the server.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io";

/// Engine.IO protocol revision spoken by the transports.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Number of automatic reconnection attempts after a transport drop.
pub const SOCKET_RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between automatic reconnection attempts, in milliseconds.
pub const SOCKET_RECONNECT_DELAY_MS: u64 = 1_000;

/// Transport names in preferred negotiation order.
pub mod transports {
    pub const WEBSOCKET: &str = "websocket";
    pub const POLLING: &str = "polling";

    /// Default negotiation order: persistent stream first, polling fallback.
    pub const DEFAULT_ORDER: &[&str] = &[WEBSOCKET, POLLING];
}
