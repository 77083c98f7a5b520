//! Conversation Log
//!
//! The client-side record of one chat: an ordered list of entries, at most
//! one of which is "in flight" (receiving streamed content) at a time.
//!
//! # Design Philosophy
//!
//! The log is a plain owned value. The client that runs a turn holds it and
//! mutates entries by identity as frames arrive, so there is never more than
//! one writer and content is appended in exactly the order it was received.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder shown in an image entry while generation runs
pub const IMAGE_PLACEHOLDER: &str = "Generating...";

/// Unique entry identity
///
/// Combines the creation time with a process-wide sequence number, so two
/// entries created in the same millisecond still compare distinct and sort in
/// creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId {
    created_ms: i64,
    seq: u64,
}

impl EntryId {
    /// Generate a new unique entry ID
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            created_ms: chrono::Utc::now().timestamp_millis(),
            seq: COUNTER.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Creation time (Unix timestamp ms)
    #[must_use]
    pub fn created_ms(&self) -> i64 {
        self.created_ms
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.created_ms, self.seq)
    }
}

/// Who authored an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard
    User,
    /// The generation service
    Assistant,
}

/// What an entry displays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Plain text
    Text,
    /// A generated image with a caption
    Image,
}

/// One message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Unique entry ID
    pub id: EntryId,
    /// Who sent this entry
    pub role: Role,
    /// Text or image
    pub kind: EntryKind,
    /// Text content, or the caption of an image entry
    pub content: String,
    /// Image location, set once on successful generation
    pub image_url: Option<String>,
    /// Whether content is still arriving
    pub streaming: bool,
}

impl ConversationEntry {
    fn new(role: Role, kind: EntryKind, content: String, streaming: bool) -> Self {
        Self {
            id: EntryId::new(),
            role,
            kind,
            content,
            image_url: None,
            streaming,
        }
    }
}

/// Errors from mutating the log
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    /// No entry with this ID exists
    #[error("Unknown entry {0}")]
    UnknownEntry(EntryId),

    /// Another assistant entry is still receiving content
    #[error("Entry {0} is still in flight")]
    TurnInProgress(EntryId),

    /// The entry has already been closed out
    #[error("Entry {0} is not in flight")]
    NotInFlight(EntryId),

    /// Image reference requested on a text entry
    #[error("Entry {0} is not an image entry")]
    NotAnImage(EntryId),
}

/// Ordered conversation log with a single in-flight slot
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
    in_flight: Option<EntryId>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed user entry
    pub fn push_user(&mut self, content: impl Into<String>) -> EntryId {
        let entry = ConversationEntry::new(Role::User, EntryKind::Text, content.into(), false);
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    /// Open an empty assistant text entry for streamed content
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` if another entry is in flight.
    pub fn start_assistant_text(&mut self) -> Result<EntryId, ConversationError> {
        self.start_assistant(EntryKind::Text, String::new())
    }

    /// Open an assistant image entry showing the placeholder caption
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` if another entry is in flight.
    pub fn start_assistant_image(&mut self) -> Result<EntryId, ConversationError> {
        self.start_assistant(EntryKind::Image, IMAGE_PLACEHOLDER.to_string())
    }

    fn start_assistant(
        &mut self,
        kind: EntryKind,
        content: String,
    ) -> Result<EntryId, ConversationError> {
        if let Some(id) = self.in_flight {
            return Err(ConversationError::TurnInProgress(id));
        }
        let entry = ConversationEntry::new(Role::Assistant, kind, content, true);
        let id = entry.id;
        self.entries.push(entry);
        self.in_flight = Some(id);
        Ok(id)
    }

    /// Append streamed text to the in-flight entry
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or no longer in flight.
    pub fn append_content(
        &mut self,
        id: &EntryId,
        text: &str,
    ) -> Result<&ConversationEntry, ConversationError> {
        let entry = self.in_flight_entry_mut(id)?;
        entry.content.push_str(text);
        Ok(entry)
    }

    /// Mark the in-flight entry complete
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or no longer in flight.
    pub fn finish_entry(&mut self, id: &EntryId) -> Result<&ConversationEntry, ConversationError> {
        self.in_flight_entry_mut(id)?;
        self.in_flight = None;
        let entry = self.entry_mut(id)?;
        entry.streaming = false;
        Ok(entry)
    }

    /// Close the in-flight entry with a bracketed error caption
    ///
    /// Text entries keep whatever content already arrived and get the caption
    /// appended; image entries have their placeholder replaced.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or no longer in flight.
    pub fn fail_entry(
        &mut self,
        id: &EntryId,
        message: &str,
    ) -> Result<&ConversationEntry, ConversationError> {
        self.close_with_caption(id, &format!("[Error: {message}]"))
    }

    /// Close the in-flight entry after a user cancellation
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or no longer in flight.
    pub fn cancel_entry(&mut self, id: &EntryId) -> Result<&ConversationEntry, ConversationError> {
        self.close_with_caption(id, "[Cancelled]")
    }

    fn close_with_caption(
        &mut self,
        id: &EntryId,
        caption: &str,
    ) -> Result<&ConversationEntry, ConversationError> {
        let entry = self.in_flight_entry_mut(id)?;
        match entry.kind {
            EntryKind::Image => caption.clone_into(&mut entry.content),
            EntryKind::Text if entry.content.is_empty() => caption.clone_into(&mut entry.content),
            EntryKind::Text => {
                entry.content.push_str("\n\n");
                entry.content.push_str(caption);
            }
        }
        self.finish_entry(id)
    }

    /// Attach the generated image and caption, completing the entry
    ///
    /// The in-flight check guarantees the reference is set at most once.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown, no longer in flight, or not an image entry.
    pub fn complete_image(
        &mut self,
        id: &EntryId,
        image_url: impl Into<String>,
        caption: impl Into<String>,
    ) -> Result<&ConversationEntry, ConversationError> {
        let entry = self.in_flight_entry_mut(id)?;
        if entry.kind != EntryKind::Image {
            return Err(ConversationError::NotAnImage(*id));
        }
        entry.image_url = Some(image_url.into());
        entry.content = caption.into();
        self.finish_entry(id)
    }

    fn entry_mut(&mut self, id: &EntryId) -> Result<&mut ConversationEntry, ConversationError> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| &e.id == id)
            .ok_or(ConversationError::UnknownEntry(*id))
    }

    fn in_flight_entry_mut(
        &mut self,
        id: &EntryId,
    ) -> Result<&mut ConversationEntry, ConversationError> {
        if self.in_flight.as_ref() != Some(id) {
            // Distinguish a stale ID from an unknown one
            self.entry_mut(id)?;
            return Err(ConversationError::NotInFlight(*id));
        }
        self.entry_mut(id)
    }

    /// Get entry by ID
    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<&ConversationEntry> {
        self.entries.iter().rev().find(|e| &e.id == id)
    }

    /// All entries in creation order
    #[must_use]
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// The entry currently receiving content, if any
    #[must_use]
    pub fn in_flight(&self) -> Option<&EntryId> {
        self.in_flight.as_ref()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start over with an empty log ("New Chat")
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight = None;
    }
}
