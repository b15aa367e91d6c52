use crate::error::SessionError;
use crate::event::{Event, GameBatch};
use crate::frame::{self, Command, Frame};
use crate::receipts::ReceiptTable;
use crate::subscriptions::SubscriptionRegistry;
use crate::summary::{self, GameEventStore};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const LOGOUT_DESCRIPTION: &str = "Logged out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    LoggingOut,
    Terminated,
}

/// Outcome of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// False once the read loop must stop and the transport be closed.
    pub keep_listening: bool,
    pub notices: Vec<String>,
}

impl Dispatch {
    fn listen() -> Self {
        Self {
            keep_listening: true,
            notices: Vec::new(),
        }
    }

    fn stop() -> Self {
        Self {
            keep_listening: false,
            notices: Vec::new(),
        }
    }

    fn notice(mut self, line: impl Into<String>) -> Self {
        self.notices.push(line.into());
        self
    }
}

/// Protocol state for one login.
#[derive(Debug)]
pub struct Session {
    username: String,
    state: SessionState,
    subscriptions: SubscriptionRegistry,
    receipts: ReceiptTable,
    store: GameEventStore,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: SessionState::Disconnected,
            subscriptions: SubscriptionRegistry::new(),
            receipts: ReceiptTable::new(),
            store: GameEventStore::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::LoggingOut
        )
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn receipts(&self) -> &ReceiptTable {
        &self.receipts
    }

    pub fn store(&self) -> &GameEventStore {
        &self.store
    }

    /// Marks the session finished; used by teardown after transport loss.
    pub fn terminate(&mut self) {
        if self.state != SessionState::Terminated {
            info!(event = "session_terminated", user = %self.username, from = ?self.state);
        }
        self.state = SessionState::Terminated;
    }

    pub fn begin_connect(&mut self, host: &str, passcode: &str) -> Result<String, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::AlreadyLoggedIn);
        }
        self.state = SessionState::Connecting;
        debug!(event = "session_connecting", user = %self.username, host = host);
        Ok(frame::connect(host, &self.username, passcode).encode())
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::LoggingOut => Err(SessionError::LogoutInProgress),
            _ => Err(SessionError::NotLoggedIn),
        }
    }

    pub fn join(&mut self, channel: &str) -> Result<String, SessionError> {
        self.require_connected()?;
        let subscription_id = self.subscriptions.subscribe(channel)?;
        let receipt_id = self.receipts.allocate(format!("Joined channel {channel}"));
        debug!(
            event = "join",
            channel = channel,
            subscription_id = subscription_id,
            receipt_id = receipt_id
        );
        Ok(frame::subscribe(channel, subscription_id, receipt_id).encode())
    }

    pub fn exit(&mut self, channel: &str) -> Result<String, SessionError> {
        self.require_connected()?;
        let subscription_id = self.subscriptions.unsubscribe(channel)?;
        let receipt_id = self.receipts.allocate(format!("Exited channel {channel}"));
        debug!(
            event = "exit",
            channel = channel,
            subscription_id = subscription_id,
            receipt_id = receipt_id
        );
        Ok(frame::unsubscribe(subscription_id, receipt_id).encode())
    }

    /// Allocates the logout receipt and returns DISCONNECT. The transport
    /// stays open until that receipt arrives.
    pub fn logout(&mut self) -> Result<String, SessionError> {
        if self.receipts.pending_logout().is_some() {
            return Err(SessionError::LogoutInProgress);
        }
        self.require_connected()?;
        let receipt_id = self.receipts.allocate_logout(LOGOUT_DESCRIPTION)?;
        self.state = SessionState::LoggingOut;
        debug!(event = "logout_requested", receipt_id = receipt_id);
        Ok(frame::disconnect(receipt_id).encode())
    }

    /// One SEND per event, in batch order. Nothing is recorded until the
    /// caller reports what was written through [`Session::record_sent`].
    pub fn report(&mut self, batch: &GameBatch) -> Result<Vec<String>, SessionError> {
        self.require_connected()?;
        let game = batch.game_name();
        if !self.subscriptions.is_subscribed(&game) {
            return Err(SessionError::NotSubscribed { channel: game });
        }
        let frames: Vec<String> = batch
            .events
            .iter()
            .map(|event| frame::send(&game, event.to_message_body(&self.username)).encode())
            .collect();
        debug!(event = "report", game = %game, count = frames.len());
        Ok(frames)
    }

    /// Records the first `sent` events of `batch` under this user, so
    /// summaries cover the sender's own reports.
    pub fn record_sent(&mut self, batch: &GameBatch, sent: usize) {
        let game = batch.game_name();
        for event in batch.events.iter().take(sent) {
            self.store.record(&game, &self.username, event.clone());
        }
    }

    /// Summary text for one (game, user) pair, compiled from local state.
    pub fn summary(&self, game: &str, user: &str) -> Result<String, SessionError> {
        summary::compile_summary(self.store.events(game, user)).ok_or_else(|| {
            SessionError::NoEvents {
                game: game.to_string(),
                user: user.to_string(),
            }
        })
    }

    pub fn handle_frame(&mut self, frame: &Frame) -> Dispatch {
        if self.is_terminated() {
            return Dispatch::stop();
        }
        match frame.command() {
            Command::Connected => {
                self.state = SessionState::Connected;
                info!(event = "connected", user = %self.username);
                Dispatch::listen().notice("Login successful")
            }
            Command::Receipt => self.handle_receipt(frame),
            Command::Error => {
                let message = frame.header("message").unwrap_or_default();
                warn!(event = "server_error", message = message);
                self.state = SessionState::Terminated;
                let mut dispatch = Dispatch::stop().notice(format!("Server error: {message}"));
                let body = frame.body().trim_end();
                if !body.is_empty() {
                    dispatch = dispatch.notice(body);
                }
                dispatch
            }
            Command::Message => self.handle_message(frame),
            Command::Connect
            | Command::Subscribe
            | Command::Unsubscribe
            | Command::Send
            | Command::Disconnect
            | Command::Unknown(_) => {
                debug!(event = "frame_ignored", command = %frame.command());
                Dispatch::listen()
            }
        }
    }

    fn handle_receipt(&mut self, frame: &Frame) -> Dispatch {
        let Some(id) = frame
            .header("receipt-id")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        else {
            debug!(event = "receipt_without_id");
            return Dispatch::listen();
        };
        let Some(resolved) = self.receipts.resolve(id) else {
            debug!(event = "receipt_unknown", receipt_id = id);
            return Dispatch::listen();
        };
        if resolved.is_logout {
            self.state = SessionState::Terminated;
            info!(event = "logout_acknowledged", receipt_id = id);
            return Dispatch::stop().notice(resolved.description);
        }
        Dispatch::listen().notice(resolved.description)
    }

    fn handle_message(&mut self, frame: &Frame) -> Dispatch {
        let channel = frame.header("destination").unwrap_or_default();
        let body = frame.body();
        let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
        let (user, rest) = match first.trim().strip_prefix("user:") {
            Some(user) => (user.trim(), rest),
            None => ("", body),
        };
        let event = Event::from_message_body(channel, rest);
        let echo = format!(
            "[{channel}] {} reported '{}' at {}",
            if user.is_empty() { "<unknown>" } else { user },
            event.name,
            event.time
        );
        // The broker relays our own SENDs back; those were recorded when sent.
        if user != self.username {
            self.store.record(channel, user, event);
        }
        Dispatch::listen().notice(echo)
    }
}

/// The one lock shared by the command path and the listener task.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// A panic while holding the lock leaves plain data behind, so a
    /// poisoned guard is still usable.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
