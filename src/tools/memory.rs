//! Conversation memory tools

use super::{count_arg, str_arg, text_arg, ToolContext};
use crate::agent::{Role, Tool, ToolFailure, ToolOutput, ToolSchema};
use serde_json::json;

pub(super) fn tools(ctx: &ToolContext) -> Vec<Tool> {
    vec![store_conversation(ctx.clone()), get_conversation_history(ctx.clone())]
}

fn store_conversation(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("store_conversation", "Store a conversation message")
        .with_string_param("conversation_id", "Conversation identifier", true)
        .with_string_param("message", "Message text", true)
        .with_enum_param("role", "Speaker", &["user", "assistant", "system"], false)
        .with_default("role", json!("user"));

    Tool::new(schema, move |args| {
        let memory = ctx.memory.clone();
        async move {
            let conversation_id = text_arg(&args, "conversation_id")?;
            let message = text_arg(&args, "message")?;
            let role = Role::parse(str_arg(&args, "role")?);

            memory.add_message(conversation_id, role, message);
            Ok(ToolOutput::content_only(json!({
                "conversation_id": conversation_id,
                "message_stored": true,
            })))
        }
    })
}

fn get_conversation_history(ctx: ToolContext) -> Tool {
    let schema = ToolSchema::new("get_conversation_history", "Get conversation history for a session")
        .with_string_param("conversation_id", "Conversation identifier", true)
        .with_int_param("limit", "Most recent messages to return", false)
        .with_default("limit", json!(10));

    Tool::new(schema, move |args| {
        let memory = ctx.memory.clone();
        async move {
            let conversation_id = text_arg(&args, "conversation_id")?;
            let limit = count_arg(&args, "limit")?;

            let history = memory.get_history(conversation_id, limit);
            if history.is_empty() {
                return Err(ToolFailure::EmptyResult);
            }

            let transcript = history
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            let content = json!({
                "session_id": conversation_id,
                "message_count": history.len(),
                "history": history,
            });
            Ok(ToolOutput::derived("get_conversation_history", &args, transcript, content))
        }
    })
}
