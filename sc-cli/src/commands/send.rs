//! Send command - send one message and wait for the server relay.

use std::time::Duration;

use console::style;
use tokio::sync::mpsc;

use sc_core::config::ConfigHandle;
use sc_core::error::{ScError, ScResult};

use crate::OutputFormat;

/// Run the send command.
pub async fn run(
    config: ConfigHandle,
    room: String,
    text: String,
    wait_secs: u64,
    format: OutputFormat,
) -> ScResult<()> {
    let client = super::create_chat_client(&config).await?;

    // The server relays our own message back as new-message
    let (tx, mut rx) = mpsc::unbounded_channel();
    let expected_room = room.clone();
    let expected_text = text.clone();
    client
        .on_message(move |m| {
            if m.chat_room_id == expected_room && m.message == expected_text {
                let _ = tx.send(m.clone());
            }
        })
        .await;

    if !client.join_room(&room).await {
        return Err(ScError::Socket(format!("could not join room {room}")));
    }
    if !client.send_message(&room, &text).await {
        return Err(ScError::SocketDisconnected);
    }

    let echoed = tokio::time::timeout(Duration::from_secs(wait_secs), rx.recv())
        .await
        .ok()
        .flatten();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "room": room,
                    "sent": true,
                    "confirmed": echoed.is_some(),
                    "message": echoed,
                })
            );
        }
        OutputFormat::Text => match &echoed {
            Some(m) => println!("  {} {}", style("Sent").green().bold(), super::format_message(m)),
            None => println!(
                "  {} Sent, but the server did not relay it back within {wait_secs}s",
                style("WARN").yellow()
            ),
        },
    }

    client.leave_room(&room).await;
    client.disconnect().await;
    Ok(())
}
