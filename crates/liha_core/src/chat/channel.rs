//! Session-scoped chat message log.
//!
//! # Responsibility
//! - Keep the ordered, append-only transcript of one chat session.
//! - Carry optional navigational references from messages to objects.
//!
//! # Invariants
//! - `send` is the only mutation; messages are never edited or removed.
//! - Message ids strictly increase in append order.
//! - A reference never owns or keeps alive the object it points to.

use crate::chat::preview::text_preview;
use crate::model::object::{ContentKind, ObjectId, ObjectInstance};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Display timestamp given to freshly composed messages.
pub const JUST_NOW: &str = "Just now";

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Ai,
    Reference,
}

impl Role {
    /// Speaker label shown above a message.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Ai => "AI",
            Self::Reference => "Reference",
        }
    }
}

/// Navigational link from a message to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    pub id: ObjectId,
    pub title: String,
}

impl MessageReference {
    /// Builds a reference titled after the object's first text block.
    ///
    /// Falls back to the object id when no text block has readable content.
    pub fn to_object(object: &ObjectInstance) -> Self {
        let title = object
            .ordered_items()
            .into_iter()
            .filter(|item| item.kind == ContentKind::Text)
            .find_map(|item| text_preview(&item.content))
            .unwrap_or_else(|| object.id.clone());
        Self {
            id: object.id.clone(),
            title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<MessageReference>,
}

impl Message {
    pub fn with_reference(mut self, reference: MessageReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Opens the referenced object through `navigator`.
    ///
    /// Returns `false` when the message carries no reference.
    pub fn navigate(&self, navigator: &mut dyn ViewNavigator) -> bool {
        match &self.reference {
            Some(reference) => {
                navigator.open_object(&reference.id);
                true
            }
            None => false,
        }
    }
}

/// View manager that can open an object in a new view.
pub trait ViewNavigator {
    fn open_object(&mut self, object_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    NonMonotonicId { last: MessageId, got: MessageId },
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonMonotonicId { last, got } => {
                write!(f, "message id {got} does not follow last id {last}")
            }
        }
    }
}

impl Error for ChannelError {}

/// Append-only transcript.
#[derive(Debug, Clone, Default)]
pub struct MessageChannel {
    messages: Vec<Message>,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|message| message.id)
    }

    /// Builds the next message without appending it.
    pub fn compose(&self, role: Role, content: impl Into<String>) -> Message {
        Message {
            id: self.last_id().map_or(1, |last| last + 1),
            role,
            content: content.into(),
            timestamp: JUST_NOW.to_string(),
            reference: None,
        }
    }

    /// Appends `message`.
    ///
    /// # Errors
    /// - `NonMonotonicId` when `message.id` is not greater than the last id.
    pub fn send(&mut self, message: Message) -> Result<(), ChannelError> {
        if let Some(last) = self.last_id() {
            if message.id <= last {
                return Err(ChannelError::NonMonotonicId {
                    last,
                    got: message.id,
                });
            }
        }
        log::debug!(
            "event=chat_send module=chat status=ok message_id={} role={:?} has_reference={}",
            message.id,
            message.role,
            message.reference.is_some()
        );
        self.messages.push(message);
        Ok(())
    }
}
