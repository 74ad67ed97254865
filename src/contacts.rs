use crate::models::{Contact, ParticipantId};
use crate::storage::{self, KeyValueStore, CONTACTS_KEY};
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered contact list, persisted write-through. Duplicate ids are kept;
/// lookups resolve to the first entry.
pub struct ContactDirectory {
    contacts: Mutex<Vec<Contact>>,
    store: Arc<dyn KeyValueStore>,
}

impl ContactDirectory {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let contacts: Vec<Contact> = storage::load_json(store.as_ref(), CONTACTS_KEY, Vec::new);
        log::debug!("loaded {} contacts", contacts.len());
        Self {
            contacts: Mutex::new(contacts),
            store,
        }
    }

    pub fn lookup(&self, id: &str) -> Option<String> {
        self.lock().iter().find(|c| c.id == id).map(|c| c.name.clone())
    }

    pub fn add(&self, id: impl Into<ParticipantId>, name: impl Into<String>) {
        let mut contacts = self.lock();
        contacts.push(Contact {
            id: id.into(),
            name: name.into(),
        });
        if let Err(e) = storage::save_json(self.store.as_ref(), CONTACTS_KEY, contacts.as_slice()) {
            log::warn!("failed to persist contacts: {e}");
        }
    }

    pub fn all(&self) -> Vec<Contact> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Contact>> {
        self.contacts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
