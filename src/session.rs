use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::seq::SliceRandom;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::TransportError;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bohdan", "Carla", "Daniel", "Emma", "Frank", "Grace", "Henry", "Iryna", "James",
    "Kateryna", "Liam", "Maria", "Nathan", "Olena", "Peter", "Rosa", "Samuel", "Taras", "Vera",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Bondarenko", "Clark", "Davis", "Evans", "Fisher", "Garcia", "Hughes",
    "Kovalenko", "Lewis", "Miller", "Nelson", "Shevchenko", "Taylor", "Walker", "Young",
];

/// Process-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages a session may have queued but not yet written before it is
/// considered too slow and disconnected.
pub const OUTBOUND_CAPACITY: usize = 256;

/// One registered client.
///
/// The connection itself stays with its handler task; a `Session` only holds
/// the sending half of the queue that task's writer drains. Every message
/// pushed here reaches the socket in push order.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    name: String,
    peer: SocketAddr,
    outbound: mpsc::Sender<String>,
    overflow: Arc<Notify>,
}

impl Session {
    /// Creates a session and the receiving end of its outbound queue.
    ///
    /// # Arguments
    /// - `name`: The display name shown in front of the client's messages.
    /// - `peer`: The remote address, used for logging.
    ///
    /// # Returns
    /// The `Session` to register and the `Outbox` its writer drains.
    pub fn new(name: impl Into<String>, peer: SocketAddr) -> (Self, Outbox) {
        Self::with_capacity(name, peer, OUTBOUND_CAPACITY)
    }

    /// Like [`Session::new`], holding at most `capacity` undelivered messages.
    pub fn with_capacity(name: impl Into<String>, peer: SocketAddr, capacity: usize) -> (Self, Outbox) {
        let (outbound, rx) = mpsc::channel(capacity);
        let overflow = Arc::new(Notify::new());
        let session = Session {
            id: SessionId::next(),
            name: name.into(),
            peer,
            outbound,
            overflow: overflow.clone(),
        };
        (session, Outbox { rx, overflow })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues `message` for delivery to this session without waiting.
    ///
    /// # Arguments
    /// - `message`: The text frame to deliver.
    ///
    /// # Returns
    /// `Ok(())` once queued. `TransportError::Closed` if the connection is
    /// gone, `TransportError::Lagged` if the queue is full; a lagging session's
    /// `Outbox` stops yielding so its handler disconnects it.
    pub fn send(&self, message: impl Into<String>) -> Result<(), TransportError> {
        match self.outbound.try_send(message.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed(self.id)),
            Err(TrySendError::Full(_)) => {
                self.overflow.notify_one();
                Err(TransportError::Lagged(self.id))
            }
        }
    }
}

/// Receiving end of a session's outbound queue.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<String>,
    overflow: Arc<Notify>,
}

impl Outbox {
    /// Waits for the next queued message.
    ///
    /// # Returns
    /// `None` once every `Session` handle is gone or the queue overflowed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.overflow.notified() => None,
            message = self.rx.recv() => message,
        }
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.rx.try_recv()
    }

    /// Refuses further messages; later sends fail with `Closed`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Picks a random "First Last" display name. Names may repeat.
pub fn random_display_name() -> String {
    let mut rng = rand::thread_rng();
    let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Anonymous");
    let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("User");
    format!("{first} {last}")
}
