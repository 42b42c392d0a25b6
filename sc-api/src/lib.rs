//! StoreChat API - HTTP client for the chat history REST API.
//!
//! The real-time socket carries live traffic; this crate covers the rest:
//! fetching a room's prior messages and marking a room read over HTTP.
//! It handles bearer authentication, custom headers, self-signed
//! certificates, and automatic retry with exponential backoff.

pub mod client;
pub mod endpoints;
pub mod response;

// Re-export key types
pub use client::{ApiClient, RetryConfig};
pub use endpoints::rooms::{ChatRoom, RoomHistory};
pub use response::ServerResponse;
