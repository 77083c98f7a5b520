//! Plain-text rendering for the terminal surface

use relay_core::{ConversationEntry, EntryKind, Role};

use crate::client::Update;

/// Prompt prefix for an entry's author
#[must_use]
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
    }
}

/// Render a whole entry, e.g. when replaying the log
#[must_use]
pub fn render_entry(entry: &ConversationEntry) -> String {
    let label = role_label(entry.role);
    match (entry.kind, entry.image_url.as_deref()) {
        (EntryKind::Image, Some(url)) => format!("{label}> {}\n  {url}", entry.content),
        _ => format!("{label}> {}", entry.content),
    }
}

/// Text to print for an incremental update
///
/// Appended fragments print bare so a streamed reply reads as one line.
#[must_use]
pub fn render_update(update: &Update) -> String {
    match update {
        Update::Appended { text, .. } => text.clone(),
        Update::Finished { .. } => "\n".to_string(),
        Update::ImageReady { url, .. } => format!("\n  {url}\n"),
        Update::Failed { message, .. } => format!("\n[Error: {message}]\n"),
        Update::Cancelled { .. } => "\n[Cancelled]\n".to_string(),
    }
}
