//! History command - print prior messages for a room.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use sc_core::config::ConfigHandle;
use sc_core::error::ScResult;

use crate::OutputFormat;

/// Run the history command.
pub async fn run(
    config: ConfigHandle,
    room: String,
    limit: usize,
    format: OutputFormat,
) -> ScResult<()> {
    let api = super::create_api_client(&config).await?;
    let history = api.get_room(&room).await?;
    let messages = history.latest(limit);

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "room": history.room,
                "messages": messages,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!(
                "Room {} (customer {}, {}, {} unread)",
                style(&history.room.id).bold(),
                history.room.customer_id,
                if history.room.is_active { "active" } else { "closed" },
                history.unread().count()
            );
            if messages.is_empty() {
                println!("  No messages.");
                return Ok(());
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Time", "From", "Role", "Message", "Read"]);
            for m in messages {
                table.add_row(vec![
                    m.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    m.sender_id.clone(),
                    format!("{:?}", m.sender_role).to_lowercase(),
                    super::truncate(&m.message, 80),
                    if m.is_read { "yes".into() } else { "no".into() },
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
