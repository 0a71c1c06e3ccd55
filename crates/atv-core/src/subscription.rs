//! Typed event subscriptions on an open session.
//!
//! A [`Subscription`] is a lazy, blocking iterator over the events of one
//! class. It ends when the session's connection ends, and dropping it
//! cancels delivery. A fresh session needs a fresh subscription.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::protocol::{NowPlayingInfo, ProtocolMessage};

/// Message kind a now playing update carries in raw form.
pub const NOW_PLAYING_MESSAGE_KIND: &str = "now_playing";

/// Event classes a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Playback state updates only.
    NowPlaying,
    /// Every message the device pushes, now playing updates included.
    Message,
}

/// An event pushed by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    NowPlaying(NowPlayingInfo),
    Message(ProtocolMessage),
}

impl DeviceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::NowPlaying(_) => EventKind::NowPlaying,
            DeviceEvent::Message(_) => EventKind::Message,
        }
    }

    /// Whether a subscriber of `kind` receives this event.
    pub fn matches(&self, kind: EventKind) -> bool {
        kind == EventKind::Message || self.kind() == kind
    }

    /// The event in raw message form.
    pub fn to_message(&self) -> ProtocolMessage {
        match self {
            DeviceEvent::NowPlaying(info) => ProtocolMessage {
                kind: NOW_PLAYING_MESSAGE_KIND.to_string(),
                body: serde_json::to_value(info).unwrap_or_default(),
            },
            DeviceEvent::Message(message) => message.clone(),
        }
    }
}

/// Receiving end handed to the caller.
pub struct Subscription {
    kind: EventKind,
    receiver: Receiver<DeviceEvent>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Iterator for Subscription {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Events held for a kind nobody has subscribed to yet.
const MAX_PENDING_EVENTS: usize = 256;

#[derive(Default)]
struct HubState {
    subscribers: Vec<(EventKind, Sender<DeviceEvent>)>,
    /// Kinds that have had at least one subscriber.
    claimed: Vec<EventKind>,
    pending: VecDeque<DeviceEvent>,
    closed: bool,
}

impl HubState {
    fn wanted_by_unclaimed(&self, event: &DeviceEvent) -> bool {
        [EventKind::NowPlaying, EventKind::Message]
            .into_iter()
            .any(|kind| event.matches(kind) && !self.claimed.contains(&kind))
    }
}

/// Fan-out point owned by a session.
///
/// Each published event reaches each live subscriber of a matching kind
/// exactly once, in publish order. Events published before the first
/// subscriber of a kind attaches are held and replayed to that subscriber.
#[derive(Clone, Default)]
pub struct EventHub {
    state: Arc<Mutex<HubState>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut state) = self.state.lock() {
            if !state.claimed.contains(&kind) {
                state.claimed.push(kind);
                for event in state.pending.iter().filter(|e| e.matches(kind)) {
                    let _ = sender.send(event.clone());
                }
                let held = std::mem::take(&mut state.pending);
                let still_wanted: VecDeque<DeviceEvent> = held
                    .into_iter()
                    .filter(|e| state.wanted_by_unclaimed(e))
                    .collect();
                state.pending = still_wanted;
            }
            // A closed hub still replays what it held, then ends.
            if !state.closed {
                state.subscribers.push((kind, sender));
            }
        }
        Subscription { kind, receiver }
    }

    /// Deliver an event; returns how many subscribers received it.
    pub fn publish(&self, event: DeviceEvent) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        if state.closed {
            return 0;
        }
        if state.wanted_by_unclaimed(&event) {
            if state.pending.len() == MAX_PENDING_EVENTS {
                state.pending.pop_front();
            }
            state.pending.push_back(event.clone());
        }

        let mut delivered = 0;
        // Drop subscribers whose receiving end is gone.
        state.subscribers.retain(|(kind, sender)| {
            if !event.matches(*kind) {
                return true;
            }
            match sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// End every subscription.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            state.subscribers.clear();
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.state.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }
}
