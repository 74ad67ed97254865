//! Display projection of conversations.
//!
//! Everything here is a pure function of its inputs: calling it again with
//! the same conversations, contacts, identity and selection yields an equal
//! result, and no input is modified.

use crate::models::{Contact, Conversation, DisplayConversation, DisplayMessage, DisplayRecipient};
use std::borrow::Borrow;

/// Name of the first contact with this id, or the id itself.
pub fn display_name(contacts: &[Contact], id: &str) -> String {
    contacts
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| id.to_string())
}

pub fn project<C: Borrow<Conversation>>(
    conversations: &[C],
    contacts: &[Contact],
    local_id: &str,
    selected_index: usize,
) -> Vec<DisplayConversation> {
    conversations
        .iter()
        .enumerate()
        .map(|(index, conversation)| {
            project_one(conversation.borrow(), contacts, local_id, index == selected_index)
        })
        .collect()
}

fn project_one(
    conversation: &Conversation,
    contacts: &[Contact],
    local_id: &str,
    selected: bool,
) -> DisplayConversation {
    let recipients = conversation
        .recipients
        .iter()
        .map(|id| DisplayRecipient {
            id: id.clone(),
            name: display_name(contacts, id),
        })
        .collect();
    let messages = conversation
        .messages
        .iter()
        .map(|message| DisplayMessage {
            sender: message.sender.clone(),
            text: message.text.clone(),
            sender_name: display_name(contacts, &message.sender),
            from_me: message.sender == local_id,
        })
        .collect();
    DisplayConversation {
        recipients,
        messages,
        selected,
    }
}

/// Projected list together with the index that was selected when it was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub conversations: Vec<DisplayConversation>,
    pub selected_index: usize,
}

impl Projection {
    pub fn build<C: Borrow<Conversation>>(
        conversations: &[C],
        contacts: &[Contact],
        local_id: &str,
        selected_index: usize,
    ) -> Self {
        Self {
            conversations: project(conversations, contacts, local_id, selected_index),
            selected_index,
        }
    }

    /// `None` means nothing is open, including when the index is out of range.
    pub fn selected_conversation(&self) -> Option<&DisplayConversation> {
        self.conversations.get(self.selected_index)
    }
}
