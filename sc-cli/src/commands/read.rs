//! Read command - mark a room as read.

use console::style;

use sc_core::config::ConfigHandle;
use sc_core::error::{ScError, ScResult};

use crate::OutputFormat;

/// Run the read command.
pub async fn run(
    config: ConfigHandle,
    room: String,
    rest: bool,
    format: OutputFormat,
) -> ScResult<()> {
    let via = if rest {
        let api = super::create_api_client(&config).await?;
        api.mark_room_read(&room).await?;
        "rest"
    } else {
        let client = super::create_chat_client(&config).await?;
        // mark_read only uses a live connection, so connect first
        if client.connect().await.is_none() || !client.mark_read(&room).await {
            return Err(ScError::SocketDisconnected);
        }
        client.disconnect().await;
        "socket"
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({"room": room, "read": true, "via": via})),
        OutputFormat::Text => println!("  {} Marked room {room} as read", style("OK").green().bold()),
    }
    Ok(())
}
