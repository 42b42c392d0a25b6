//! Listen command - join rooms and stream messages until interrupted.

use console::style;
use tokio::sync::mpsc;

use sc_core::config::ConfigHandle;
use sc_core::error::{ScError, ScResult};
use sc_socket::{ChatClient, EventName, InboundEvent, Observer};

use crate::OutputFormat;

/// Run the listen command.
pub async fn run(config: ConfigHandle, rooms: Vec<String>, format: OutputFormat) -> ScResult<()> {
    let client = super::create_chat_client(&config).await?;

    // Observers run on the socket task; hand events to this one for printing
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundEvent>();
    for name in [
        EventName::NewMessage,
        EventName::Connect,
        EventName::Disconnect,
        EventName::ConnectError,
    ] {
        let tx = tx.clone();
        client
            .subscribe(
                name,
                Observer::new(move |event| {
                    let _ = tx.send(event.clone());
                }),
            )
            .await;
    }
    drop(tx);

    for room in &rooms {
        if !client.join_room(room).await {
            return Err(ScError::Socket(format!("could not join room {room}")));
        }
    }
    if format == OutputFormat::Text {
        println!(
            "  {} Joined {}. Listening for messages... (Ctrl+C to stop)",
            style("OK").green().bold(),
            rooms.join(", ")
        );
        println!();
    }

    // The connect from the joins above is already queued
    let mut connected_before = false;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                handle_event(&client, &event, format, &mut connected_before).await;
            }
            _ = tokio::signal::ctrl_c() => {
                if format == OutputFormat::Text {
                    println!("\n  Leaving rooms and disconnecting...");
                }
                for room in &rooms {
                    client.leave_room(room).await;
                }
                client.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}

/// Print one event. A connect after the first one means the socket came
/// back on its own, so the rooms are joined again.
async fn handle_event(
    client: &ChatClient,
    event: &InboundEvent,
    format: OutputFormat,
    connected_before: &mut bool,
) {
    print_event(event, format);
    if matches!(event, InboundEvent::Connect) {
        if *connected_before {
            let rejoined = client.rejoin_rooms().await;
            tracing::info!("rejoined {rejoined} room(s) after reconnect");
        }
        *connected_before = true;
    }
}

fn print_event(event: &InboundEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = match event {
                InboundEvent::NewMessage(m) => serde_json::json!({"event": "new-message", "data": m}),
                InboundEvent::Disconnect { reason } => {
                    serde_json::json!({"event": "disconnect", "reason": reason})
                }
                InboundEvent::ConnectError { message } => {
                    serde_json::json!({"event": "connect_error", "message": message})
                }
                other => serde_json::json!({"event": other.name().as_str()}),
            };
            println!("{line}");
        }
        OutputFormat::Text => match event {
            InboundEvent::NewMessage(m) => {
                println!("  {} {}", style(format!("[{}]", m.chat_room_id)).cyan(), super::format_message(m));
            }
            InboundEvent::Connect => println!("  {} connected", style("[socket]").dim()),
            InboundEvent::Disconnect { reason } => {
                println!("  {} disconnected: {reason}", style("[socket]").yellow())
            }
            InboundEvent::ConnectError { message } => {
                println!("  {} connection failed: {message}", style("[socket]").red())
            }
            InboundEvent::Custom { name, data } => println!("  {} {data}", style(format!("[{name}]")).dim()),
        },
    }
}
