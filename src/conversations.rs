use crate::models::{Conversation, Message, ParticipantId};
use crate::storage::{self, KeyValueStore, CONVERSATIONS_KEY};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Consecutive failed writes before persistence is reported as degraded.
const DEGRADED_AFTER: u32 = 3;

/// Immutable view of the conversation list. Untouched conversations keep
/// their `Arc` across mutations, so pointer equality tracks change.
pub type ConversationList = Arc<Vec<Arc<Conversation>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceHealth {
    Healthy,
    Degraded {
        consecutive_failures: u32,
        last_error: String,
    },
}

struct State {
    conversations: ConversationList,
    selected: usize,
    generation: u64,
}

#[derive(Default)]
struct PersistState {
    written: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

struct Inner {
    local_id: ParticipantId,
    state: Mutex<State>,
    persist: Mutex<PersistState>,
    store: Arc<dyn KeyValueStore>,
}

/// Owns the conversation list and selection for one local identity.
///
/// Every mutation runs its search and update under a single lock, so
/// concurrent appends for a new recipient set create exactly one
/// conversation. Persistence happens after the in-memory update and never
/// rolls it back.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Inner>,
}

impl ConversationStore {
    pub fn load(local_id: impl Into<ParticipantId>, store: Arc<dyn KeyValueStore>) -> Self {
        let conversations: Vec<Conversation> =
            storage::load_json(store.as_ref(), CONVERSATIONS_KEY, Vec::new);
        log::debug!("loaded {} conversations", conversations.len());
        Self {
            inner: Arc::new(Inner {
                local_id: local_id.into(),
                state: Mutex::new(State {
                    conversations: Arc::new(conversations.into_iter().map(Arc::new).collect()),
                    selected: 0,
                    generation: 0,
                }),
                persist: Mutex::new(PersistState::default()),
                store,
            }),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// Appends an empty conversation. Existing recipient sets are not checked.
    pub fn create_conversation(&self, recipients: Vec<ParticipantId>) {
        log::debug!("creating conversation with {} recipients", recipients.len());
        self.mutate(|list| list.push(Arc::new(Conversation::new(recipients))));
    }

    /// Appends `message` to the conversation addressed to `recipients`,
    /// creating it at the end of the list when none matches.
    pub fn append_message(&self, recipients: Vec<ParticipantId>, message: Message) {
        self.mutate(|list| {
            match list.iter().position(|c| c.is_addressed_to(&recipients)) {
                Some(idx) => {
                    let updated = {
                        let existing = &list[idx];
                        let mut messages = Vec::with_capacity(existing.messages.len() + 1);
                        messages.extend(existing.messages.iter().cloned());
                        messages.push(message);
                        Conversation {
                            recipients: existing.recipients.clone(),
                            messages,
                        }
                    };
                    list[idx] = Arc::new(updated);
                    log::debug!("appended message to conversation {idx}");
                }
                None => {
                    log::debug!("no conversation for recipients, creating one");
                    list.push(Arc::new(Conversation {
                        recipients,
                        messages: vec![message],
                    }));
                }
            }
        });
    }

    /// Sets the selection without bounds checking; an out-of-range index
    /// simply selects nothing.
    pub fn select_conversation(&self, index: usize) {
        self.state().selected = index;
    }

    pub fn selected_index(&self) -> usize {
        self.state().selected
    }

    pub fn all(&self) -> ConversationList {
        self.state().conversations.clone()
    }

    pub fn selected(&self) -> Option<Arc<Conversation>> {
        let state = self.state();
        state.conversations.get(state.selected).cloned()
    }

    pub fn persistence_health(&self) -> PersistenceHealth {
        let persist = self.persist_state();
        match &persist.last_error {
            Some(err) if persist.consecutive_failures >= DEGRADED_AFTER => {
                PersistenceHealth::Degraded {
                    consecutive_failures: persist.consecutive_failures,
                    last_error: err.clone(),
                }
            }
            _ => PersistenceHealth::Healthy,
        }
    }

    fn mutate<F>(&self, update: F)
    where
        F: FnOnce(&mut Vec<Arc<Conversation>>),
    {
        {
            let mut state = self.state();
            let mut next: Vec<Arc<Conversation>> = state.conversations.as_ref().clone();
            update(&mut next);
            state.conversations = Arc::new(next);
            state.generation += 1;
        }
        self.persist();
    }

    /// Writes the newest list, whichever mutation it came from. Lock order is
    /// persist, then state.
    fn persist(&self) {
        let mut persist = self.persist_state();
        let (snapshot, generation) = {
            let state = self.state();
            (state.conversations.clone(), state.generation)
        };
        if generation <= persist.written {
            return;
        }
        let list: Vec<&Conversation> = snapshot.iter().map(Arc::as_ref).collect();
        match storage::save_json(self.inner.store.as_ref(), CONVERSATIONS_KEY, &list) {
            Ok(()) => {
                persist.written = generation;
                persist.consecutive_failures = 0;
                persist.last_error = None;
            }
            Err(e) => {
                persist.consecutive_failures += 1;
                if persist.consecutive_failures >= DEGRADED_AFTER {
                    log::error!(
                        "conversations not persisted after {} attempts: {e}",
                        persist.consecutive_failures
                    );
                } else {
                    log::warn!("failed to persist conversations: {e}");
                }
                persist.last_error = Some(e.to_string());
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_state(&self) -> MutexGuard<'_, PersistState> {
        self.inner.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
