use serde::{Deserialize, Serialize};

/// Opaque participant identifier. Unique per user by convention only.
pub type ParticipantId = String;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ParticipantId,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: ParticipantId,
    pub text: String,
}

impl Message {
    pub fn new(sender: impl Into<ParticipantId>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub recipients: Vec<ParticipantId>,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(recipients: Vec<ParticipantId>) -> Self {
        Self {
            recipients,
            messages: Vec::new(),
        }
    }

    /// True when `recipients` names the same recipient set as this conversation.
    pub fn is_addressed_to(&self, recipients: &[ParticipantId]) -> bool {
        same_recipients(&self.recipients, recipients)
    }
}

/// Sort-and-compare recipient matching.
///
/// Lengths must agree, then both sides are sorted and compared position by
/// position. Duplicates count toward length and are not collapsed, so
/// `["a", "a", "b"]` does not match `["a", "b", "b"]` but also never matches
/// `["a", "b"]`. This is a set rule only for duplicate-free inputs.
pub fn same_recipients(a: &[ParticipantId], b: &[ParticipantId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = b.iter().map(String::as_str).collect();
    a.sort();
    b.sort();
    a == b
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DisplayRecipient {
    pub id: ParticipantId,
    pub name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub sender: ParticipantId,
    pub text: String,
    pub sender_name: String,
    pub from_me: bool,
}

/// Read-only view of a conversation, rebuilt on every projection.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DisplayConversation {
    pub recipients: Vec<DisplayRecipient>,
    pub messages: Vec<DisplayMessage>,
    pub selected: bool,
}

impl DisplayConversation {
    /// Raw ids of the recipients, used to address a reply.
    pub fn recipient_ids(&self) -> Vec<ParticipantId> {
        self.recipients.iter().map(|r| r.id.clone()).collect()
    }
}
