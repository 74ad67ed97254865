//! Client-side conversation state for a real-time messaging app.
//!
//! Conversations are identified by their recipient set. Local sends and
//! inbound transport events are reconciled into the same store, which
//! persists write-through and projects a display model on demand.

pub mod app;
pub mod config;
pub mod contacts;
pub mod conversations;
pub mod error;
pub mod models;
pub mod projector;
pub mod router;
pub mod session;
pub mod storage;
pub mod transport;

pub use app::App;
pub use config::Settings;
pub use contacts::ContactDirectory;
pub use conversations::{ConversationList, ConversationStore, PersistenceHealth};
pub use error::{ConfigError, Error, Result, StorageError, TransportError};
pub use models::{
    Contact, Conversation, DisplayConversation, DisplayMessage, DisplayRecipient, Message,
    ParticipantId,
};
pub use projector::{project, Projection};
pub use router::MessageRouter;
pub use session::Session;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use transport::{ConnectionState, Connector, TransportChannel};
