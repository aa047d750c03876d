//! Text extraction for indexed documents.

use loom_core::{Message, Role};

/// Indexing text for a message, prefixed with who said it.
pub fn message_index_text(message: &Message) -> String {
    match message.role {
        Role::User => format!("User: {}", message.content),
        Role::Assistant => format!("Assistant: {}", message.content),
        Role::System => format!("System: {}", message.content),
        Role::Tool => format!(
            "Tool ({}): {}",
            message.tool_name.as_deref().unwrap_or_default(),
            message.content
        ),
        Role::Error => format!("Error: {}", message.content),
        Role::ToolProgress => message.content.clone(),
    }
}

/// Indexing text for a tool output document.
pub fn tool_output_text(tool_name: &str, content: &str) -> String {
    format!("Tool: {tool_name}\nOutput: {content}")
}

/// Coarse outcome of a tool run, judged from its output.
pub fn classify_tool_result(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        "error"
    } else if lower.contains("success") || lower.contains("completed") {
        "success"
    } else {
        "info"
    }
}
