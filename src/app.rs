use crate::config::Settings;
use crate::error::Result;
use crate::models::ParticipantId;
use crate::session::Session;
use crate::storage::{self, KeyValueStore, SqliteStore, IDENTITY_KEY};
use crate::transport::{ConnectionState, Connector, WsConnector};
use std::sync::Arc;
use uuid::Uuid;

/// Top-level handle: persisted store, transport connector and at most one
/// live session. Switching identity closes the previous session before the
/// next channel is opened. A transport that cannot be reached never blocks
/// login; the session starts offline.
pub struct App {
    store: Arc<dyn KeyValueStore>,
    connector: Arc<dyn Connector>,
    session: Option<Session>,
}

impl App {
    pub fn new(store: Arc<dyn KeyValueStore>, connector: Arc<dyn Connector>) -> Self {
        Self {
            store,
            connector,
            session: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = match &settings.database_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_default()?,
        };
        log::info!("using store at {}", store.path().display());
        Ok(Self::new(
            Arc::new(store),
            Arc::new(WsConnector::new(settings.server_url.clone())),
        ))
    }

    /// Identity from the last login, if any.
    pub fn saved_identity(&self) -> Option<ParticipantId> {
        storage::load_json(self.store.as_ref(), IDENTITY_KEY, || None)
    }

    /// Resumes the last identity. `None` means a login is needed.
    pub fn restore(&mut self) -> Option<&Session> {
        let identity = self.saved_identity()?;
        Some(self.login(identity))
    }

    /// Logging in again as the current identity keeps the session, and
    /// reopens its channel if it has dropped to `Disconnected`.
    pub fn login(&mut self, identity: impl Into<ParticipantId>) -> &Session {
        let identity = identity.into();
        let session = match self.session.take() {
            Some(mut current) if current.identity() == identity => {
                if current.connection_state() == ConnectionState::Disconnected {
                    log::info!("reconnecting {identity}");
                    current.reconnect(self.connector.as_ref());
                }
                current
            }
            previous => {
                if let Some(previous) = previous {
                    log::info!("switching identity from {} to {identity}", previous.identity());
                    previous.close();
                }
                let session = Session::start(identity, self.store.clone(), self.connector.as_ref());
                let identity = session.identity();
                if let Err(e) = storage::save_json(self.store.as_ref(), IDENTITY_KEY, identity) {
                    log::warn!("failed to persist identity: {e}");
                }
                session
            }
        };
        self.session.insert(session)
    }

    /// Logs in as a freshly generated random identity.
    pub fn login_with_new_identity(&mut self) -> &Session {
        self.login(Uuid::new_v4().to_string())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Ends the current session; the saved identity is kept for `restore`.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::models::Message;
    use crate::storage::MemoryStore;
    use crate::transport::events::{IncomingMessage, OutgoingMessage};
    use crate::transport::{MemoryHub, TransportChannel};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Hub-backed connector that can be switched to fail every connect.
    struct UnreliableConnector {
        hub: MemoryHub,
        down: AtomicBool,
    }

    impl Connector for UnreliableConnector {
        fn connect(&self, identity: &str) -> Result<Arc<dyn TransportChannel>, TransportError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(TransportError::NoRuntime);
            }
            self.hub.connect(identity)
        }
    }

    fn app_with(hub: &MemoryHub, store: Arc<dyn KeyValueStore>) -> App {
        App::new(store, Arc::new(hub.clone()))
    }

    #[test]
    fn restore_without_identity_needs_login() {
        let mut app = app_with(&MemoryHub::new(), Arc::new(MemoryStore::new()));
        assert!(app.restore().is_none());
        assert!(app.session().is_none());
    }

    #[test]
    fn identity_is_persisted_and_restored() {
        let hub = MemoryHub::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        app_with(&hub, store.clone()).login("alice");

        let mut again = app_with(&hub, store);
        let session = again.restore().unwrap();
        assert_eq!(session.identity(), "alice");
    }

    #[test]
    fn generated_identity_is_a_uuid() {
        let mut app = app_with(&MemoryHub::new(), Arc::new(MemoryStore::new()));
        let id = app.login_with_new_identity().identity().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(app.saved_identity(), Some(id));
    }

    #[test]
    fn same_identity_keeps_the_session() {
        let hub = MemoryHub::new();
        let mut app = app_with(&hub, Arc::new(MemoryStore::new()));
        app.login("alice");
        let first = hub.channel("alice").unwrap();
        app.login("alice");
        assert_eq!(first.state(), ConnectionState::Connected);
        assert!(Arc::ptr_eq(&first, &hub.channel("alice").unwrap()));
    }

    #[test]
    fn switching_identity_closes_previous_channel() {
        let hub = MemoryHub::new();
        let mut app = app_with(&hub, Arc::new(MemoryStore::new()));
        app.login("alice");
        let alice_channel = hub.channel("alice").unwrap();

        app.login("bob");
        assert_eq!(alice_channel.state(), ConnectionState::Disconnected);
        assert_eq!(app.session().map(|s| s.identity()), Some("bob"));
        assert_eq!(app.saved_identity().as_deref(), Some("bob"));
    }

    #[test]
    fn unreachable_transport_still_switches_identity() {
        let hub = MemoryHub::new();
        let connector = Arc::new(UnreliableConnector {
            hub: hub.clone(),
            down: AtomicBool::new(false),
        });
        let mut app = App::new(Arc::new(MemoryStore::new()), connector.clone());
        app.login("alice");
        let alice_channel = hub.channel("alice").unwrap();

        connector.down.store(true, Ordering::SeqCst);
        let session = app.login("bob");
        assert_eq!(session.identity(), "bob");
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        session.send_message(vec!["carol".into()], "queued locally");
        assert_eq!(
            session.conversations()[0].messages,
            vec![Message::new("bob", "queued locally")]
        );
        assert_eq!(alice_channel.state(), ConnectionState::Disconnected);
        assert_eq!(app.saved_identity().as_deref(), Some("bob"));

        connector.down.store(false, Ordering::SeqCst);
        assert_eq!(app.login("bob").connection_state(), ConnectionState::Connected);
        assert_eq!(app.session().unwrap().conversations()[0].messages.len(), 1);
    }

    #[test]
    fn same_identity_login_reopens_a_dead_channel() {
        let hub = MemoryHub::new();
        let mut app = app_with(&hub, Arc::new(MemoryStore::new()));
        app.login("alice").send_message(vec!["bob".into()], "before");
        let dead = hub.channel("alice").unwrap();
        dead.set_state(ConnectionState::Disconnected);

        assert_eq!(app.login("alice").connection_state(), ConnectionState::Connected);
        let fresh = hub.channel("alice").unwrap();
        assert!(!Arc::ptr_eq(&dead, &fresh));

        // The replaced channel's handler is gone even if it comes back up.
        dead.set_state(ConnectionState::Connected);
        assert!(!dead.deliver(IncomingMessage {
            recipients: vec!["bob".into()],
            text: "stale".into(),
            sender: "bob".into(),
        }));

        hub.open("bob")
            .emit(&OutgoingMessage {
                recipients: vec!["alice".into()],
                text: "after".into(),
            })
            .unwrap();
        let conversations = app.session().unwrap().conversations();
        assert_eq!(
            conversations[0].messages,
            vec![Message::new("alice", "before"), Message::new("bob", "after")]
        );
    }
}
