//! CLI command implementations.

pub mod config;
pub mod history;
pub mod listen;
pub mod read;
pub mod send;

use std::sync::Arc;

use console::style;

use sc_api::ApiClient;
use sc_core::config::ConfigHandle;
use sc_core::error::{ScError, ScResult};
use sc_socket::{ChatClient, InboundMessage, SenderRole, StaticCredential};

/// Helper to create a chat client from config.
pub async fn create_chat_client(config: &ConfigHandle) -> ScResult<ChatClient> {
    let cfg = config.read().await;
    if !cfg.is_server_configured() {
        return Err(ScError::MissingConfig(
            "server.address (set it with `storechat config set server.address <url>`)".into(),
        ));
    }
    let credentials = Arc::new(StaticCredential::from_config(&cfg.server.token));
    ChatClient::from_config(&cfg, credentials)
}

/// Helper to create an API client from config.
pub async fn create_api_client(config: &ConfigHandle) -> ScResult<ApiClient> {
    let cfg = config.read().await;
    ApiClient::new(&cfg.server, cfg.server.token.clone())
}

/// One line per message: time, sender, body.
pub fn format_message(message: &InboundMessage) -> String {
    let role = match message.sender_role {
        SenderRole::Admin => style("admin").magenta(),
        SenderRole::Customer => style("customer").cyan(),
    };
    format!(
        "{} {} {}: {}",
        style(message.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        role,
        message.sender_id,
        message.message
    )
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
