//! Event bus implementation using tokio broadcast channels
//!
//! Every event goes to the firehose channel. Events tagged with a session id
//! additionally go to that session's channel, so a subscriber interested in
//! one plan only sees that plan's transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::EventEnvelope;

/// Capacity for each broadcast channel
const DEFAULT_CAPACITY: usize = 1000;

struct SessionChannel {
    sender: broadcast::Sender<EventEnvelope>,
    /// Opened by the publisher. Channels created by an early or late
    /// subscriber stay unopened and are pruned once their receivers drop.
    open: bool,
}

impl SessionChannel {
    fn new(capacity: usize, open: bool) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
            open,
        }
    }

    fn is_stale(&self) -> bool {
        !self.open && self.sender.receiver_count() == 0
    }
}

/// Event bus for publishing and subscribing to events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionChannel>>>,
    capacity: usize,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with specified per-channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to the firehose and its session channel
    ///
    /// Returns the number of subscribers that received the event across both
    /// channels. Events with no subscribers are dropped.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let session_sender = envelope
            .session_id()
            .and_then(|id| {
                let sessions = self.sessions.read().unwrap();
                sessions.get(&id).map(|c| c.sender.clone())
            });

        let mut delivered = 0;
        if let Some(session_sender) = session_sender {
            delivered += session_sender.send(envelope.clone()).unwrap_or(0);
        }
        delivered += self.sender.send(envelope).unwrap_or(0);
        if delivered == 0 {
            tracing::trace!("Event published with no subscribers");
        }
        delivered
    }

    /// Subscribe to every event on the bus
    ///
    /// Note: Events published before subscribing will not be received.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of a single session
    ///
    /// Subscribing ahead of `open_session` is allowed so no early event is
    /// missed. Unopened channels without receivers are pruned here.
    pub fn subscribe_session(&self, session_id: Uuid) -> broadcast::Receiver<EventEnvelope> {
        {
            let sessions = self.sessions.read().unwrap();
            if let Some(channel) = sessions.get(&session_id) {
                return channel.sender.subscribe();
            }
        }

        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|_, channel| !channel.is_stale());
        sessions
            .entry(session_id)
            .or_insert_with(|| SessionChannel::new(self.capacity, false))
            .sender
            .subscribe()
    }

    /// Open a session channel before its first event is published
    pub fn open_session(&self, session_id: Uuid) {
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(session_id)
            .or_insert_with(|| SessionChannel::new(self.capacity, true))
            .open = true;
    }

    /// Drop a session channel. Its receivers drain the buffered events and
    /// then observe `RecvError::Closed`.
    pub fn close_session(&self, session_id: Uuid) -> bool {
        self.sessions.write().unwrap().remove(&session_id).is_some()
    }

    /// Whether the session was opened and not yet closed
    pub fn has_session(&self, session_id: Uuid) -> bool {
        self.sessions
            .read()
            .unwrap()
            .get(&session_id)
            .is_some_and(|channel| channel.open)
    }

    /// Number of live session channels, after pruning stale ones
    pub fn session_count(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|_, channel| !channel.is_stale());
        sessions.len()
    }

    /// Get the number of current firehose subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the number of subscribers of one session
    pub fn session_subscriber_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .read()
            .unwrap()
            .get(&session_id)
            .map(|channel| channel.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
