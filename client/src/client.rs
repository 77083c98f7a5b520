//! Chat Client
//!
//! Owns the conversation log and runs at most one turn at a time.
//!
//! # Turn lifecycle
//!
//! ```text
//! send_text("Hi")
//!   ├─ busy = true
//!   ├─ push user entry "Hi"
//!   ├─ push empty assistant entry ◄──────────────┐
//!   └─ spawn turn task                           │ append_content
//!        open stream ─► consume_stream ─► TurnEvent::Content ...
//!                                      └► TurnEvent::Ended ─► finish / fail
//!                                                              busy = false
//! ```
//!
//! The turn task never touches the conversation. It sends [`TurnEvent`]s
//! over a channel and the client applies them, in order, when the caller
//! drives it with [`ChatClient::poll`], [`ChatClient::next_update`] or
//! [`ChatClient::wait_idle`]. This keeps a single writer for every entry.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{Conversation, EntryId, ImageChatReply};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::consumer::{consume_stream, TurnEnd, TurnEvent};
use crate::error::ClientError;
use crate::transport::ChatTransport;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a send was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A turn is already in flight
    Busy,
    /// Input was empty or whitespace-only
    EmptyInput,
}

/// Result of [`ChatClient::send_text`] and [`ChatClient::send_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Turn started; the assistant entry has this ID
    Started(EntryId),
    /// Nothing was sent and the log is unchanged
    Ignored(IgnoreReason),
}

/// A visible change to the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Text appended to an in-flight entry
    Appended {
        /// Entry that grew
        id: EntryId,
        /// The fragment that was appended
        text: String,
    },
    /// Turn completed successfully
    Finished {
        /// Entry that completed
        id: EntryId,
    },
    /// Image attached to its placeholder entry
    ImageReady {
        /// Entry that completed
        id: EntryId,
        /// Image location
        url: String,
    },
    /// Turn ended in an error caption
    Failed {
        /// Entry that failed
        id: EntryId,
        /// Failure message
        message: String,
    },
    /// Turn cancelled by the user
    Cancelled {
        /// Entry that was cancelled
        id: EntryId,
    },
}

struct ActiveTurn {
    entry: EntryId,
    events: mpsc::Receiver<TurnEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    // Cancels the turn if the client is dropped mid-turn
    _guard: DropGuard,
}

/// Conversation log plus the single in-flight turn
pub struct ChatClient<T> {
    transport: Arc<T>,
    conversation: Conversation,
    active: Option<ActiveTurn>,
    turn_timeout: Option<Duration>,
}

impl<T> std::fmt::Debug for ChatClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("entries", &self.conversation.len())
            .field("busy", &self.active.is_some())
            .field("turn_timeout", &self.turn_timeout)
            .finish_non_exhaustive()
    }
}

/// Caption shown under a generated image
#[must_use]
pub fn image_caption(prompt: &str) -> String {
    format!("Here's your image: {prompt}")
}

async fn run_text_turn<T: ChatTransport>(
    transport: Arc<T>,
    message: String,
    cancel: CancellationToken,
    events: mpsc::Sender<TurnEvent>,
) -> TurnEnd {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return TurnEnd::Cancelled,
        opened = transport.open_text_stream(&message) => opened,
    };
    match opened {
        Ok(body) => consume_stream(body, &cancel, &events).await,
        Err(e) => TurnEnd::Failed(e.to_string()),
    }
}

async fn run_image_turn<T: ChatTransport>(
    transport: Arc<T>,
    prompt: String,
    cancel: CancellationToken,
) -> TurnEnd {
    let reply = tokio::select! {
        biased;
        () = cancel.cancelled() => return TurnEnd::Cancelled,
        reply = transport.request_image(&prompt) => reply,
    };
    match reply {
        Ok(ImageChatReply::Success(response)) => TurnEnd::Image {
            url: response.image_url,
            prompt,
        },
        Ok(ImageChatReply::Failure(body)) => TurnEnd::Failed(body.error),
        Err(e) => TurnEnd::Failed(e.to_string()),
    }
}

impl<T: ChatTransport + 'static> ChatClient<T> {
    /// Create a client with an empty conversation
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            conversation: Conversation::new(),
            active: None,
            turn_timeout: None,
        }
    }

    /// Fail any turn that runs longer than `timeout`
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// The conversation log
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Whether a turn is in flight
    ///
    /// Busy clears when the turn's final event is applied, either by one of
    /// the driving methods or by the next send.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    fn check_can_send(&mut self, input: &str) -> Result<(), IgnoreReason> {
        // A turn that already ended should not block the next one
        let applied = self.poll();
        if !applied.is_empty() {
            debug!(count = applied.len(), "Applied pending updates before send");
        }
        if self.is_busy() || self.conversation.in_flight().is_some() {
            return Err(IgnoreReason::Busy);
        }
        if input.trim().is_empty() {
            return Err(IgnoreReason::EmptyInput);
        }
        Ok(())
    }

    /// Start a streamed text turn
    ///
    /// Ignored while busy or for blank input.
    pub fn send_text(&mut self, message: &str) -> SendOutcome {
        if let Err(reason) = self.check_can_send(message) {
            debug!(?reason, "Text send ignored");
            return SendOutcome::Ignored(reason);
        }

        self.conversation.push_user(message);
        let entry = match self.conversation.start_assistant_text() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not open assistant entry");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
        };

        let transport = Arc::clone(&self.transport);
        let message = message.to_string();
        self.spawn_turn(entry, move |cancel, events| {
            run_text_turn(transport, message, cancel, events)
        });
        SendOutcome::Started(entry)
    }

    /// Start an image turn
    ///
    /// The assistant entry shows a placeholder until the image arrives.
    pub fn send_image(&mut self, prompt: &str) -> SendOutcome {
        if let Err(reason) = self.check_can_send(prompt) {
            debug!(?reason, "Image send ignored");
            return SendOutcome::Ignored(reason);
        }

        self.conversation.push_user(prompt);
        let entry = match self.conversation.start_assistant_image() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not open assistant entry");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
        };

        let transport = Arc::clone(&self.transport);
        let prompt = prompt.to_string();
        self.spawn_turn(entry, move |cancel, _events| {
            run_image_turn(transport, prompt, cancel)
        });
        SendOutcome::Started(entry)
    }

    fn spawn_turn<F, Fut>(&mut self, entry: EntryId, turn: F)
    where
        F: FnOnce(CancellationToken, mpsc::Sender<TurnEvent>) -> Fut,
        Fut: std::future::Future<Output = TurnEnd> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let run = turn(cancel.clone(), tx.clone());
        let timeout = self.turn_timeout;

        let task = tokio::spawn(async move {
            let end = match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(end) => end,
                    Err(_) => TurnEnd::Failed(ClientError::Timeout(limit).to_string()),
                },
                None => run.await,
            };
            let _ = tx.send(TurnEvent::Ended(end)).await;
        });

        self.active = Some(ActiveTurn {
            entry,
            events: rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        });
    }

    fn apply(&mut self, entry: EntryId, event: TurnEvent) -> Option<Update> {
        match event {
            TurnEvent::Content(text) => match self.conversation.append_content(&entry, &text) {
                Ok(_) => Some(Update::Appended { id: entry, text }),
                Err(e) => {
                    warn!(error = %e, "Dropping fragment for closed entry");
                    None
                }
            },
            TurnEvent::Ended(end) => {
                self.active = None;
                Some(self.close_entry(entry, end))
            }
        }
    }

    fn close_entry(&mut self, entry: EntryId, end: TurnEnd) -> Update {
        let (result, update) = match end {
            TurnEnd::Sentinel | TurnEnd::EndOfStream => (
                self.conversation.finish_entry(&entry).map(|_| ()),
                Update::Finished { id: entry },
            ),
            TurnEnd::Image { url, prompt } => (
                self.conversation
                    .complete_image(&entry, url.clone(), image_caption(&prompt))
                    .map(|_| ()),
                Update::ImageReady { id: entry, url },
            ),
            TurnEnd::Failed(message) => (
                self.conversation.fail_entry(&entry, &message).map(|_| ()),
                Update::Failed { id: entry, message },
            ),
            TurnEnd::Cancelled => (
                self.conversation.cancel_entry(&entry).map(|_| ()),
                Update::Cancelled { id: entry },
            ),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to close entry");
        }
        update
    }

    fn lost_turn(&mut self, entry: EntryId) -> Update {
        self.active = None;
        self.close_entry(entry, TurnEnd::Failed("Turn ended unexpectedly".to_string()))
    }

    /// Apply every event already received, without waiting
    pub fn poll(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while let Some(active) = self.active.as_mut() {
            let entry = active.entry;
            match active.events.try_recv() {
                Ok(event) => updates.extend(self.apply(entry, event)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => updates.push(self.lost_turn(entry)),
            }
        }
        updates
    }

    /// Wait for the next change, or `None` when idle
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            let active = self.active.as_mut()?;
            let entry = active.entry;
            match active.events.recv().await {
                Some(event) => {
                    if let Some(update) = self.apply(entry, event) {
                        return Some(update);
                    }
                }
                None => return Some(self.lost_turn(entry)),
            }
        }
    }

    /// Drive the current turn to completion
    pub async fn wait_idle(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }

    /// Cancel the in-flight turn
    ///
    /// Fragments already received are kept, the entry is closed with a
    /// cancellation caption, and busy is cleared before this returns.
    pub fn cancel(&mut self) -> Vec<Update> {
        let Some(mut active) = self.active.take() else {
            return Vec::new();
        };
        active.cancel.cancel();
        active.task.abort();

        let mut updates = Vec::new();
        while let Ok(event) = active.events.try_recv() {
            if let TurnEvent::Content(text) = event {
                if self.conversation.append_content(&active.entry, &text).is_ok() {
                    updates.push(Update::Appended {
                        id: active.entry,
                        text,
                    });
                }
            }
        }
        updates.push(self.close_entry(active.entry, TurnEnd::Cancelled));
        updates
    }

    /// Start a new chat, clearing the log
    ///
    /// Refused (returns `false`) while a turn is in flight.
    pub fn new_chat(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.conversation.clear();
        true
    }
}
