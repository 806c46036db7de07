use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::scene::SceneId;
use crate::spawn::{SpawnAssignment, SpawnContext};
use crate::state::MatchState;

/// Identifier of one match, regenerated on every restart.
pub type MatchId = uuid::Uuid;

/// Notifications emitted by the match core to UI, audio, camera and other
/// presentation collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchEvent {
    MatchStarted {
        match_id: MatchId,
        participants: Vec<ParticipantId>,
    },
    StateChanged {
        previous: MatchState,
        next: MatchState,
    },
    ParticipantRegistered {
        participant: ParticipantId,
        device_index: u32,
        display_name: String,
    },
    ParticipantRemoved {
        participant: ParticipantId,
    },
    /// Registered participants versus the desired player count.
    PlayerCountChanged {
        current: usize,
        required: usize,
    },
    RequiredCountChanged {
        required: usize,
    },
    /// Occupants of the validation zone versus its requirement.
    ZoneCountChanged {
        current: usize,
        required: usize,
    },
    ValidationStarted {
        duration: f32,
    },
    ValidationCancelled,
    ValidationComplete,
    ReadyCountdownStarted {
        duration: f32,
    },
    ReadyCountdownReset,
    ParticipantDamaged {
        participant: ParticipantId,
        lives_remaining: u32,
    },
    ParticipantHealed {
        participant: ParticipantId,
        lives_remaining: u32,
    },
    /// `place` is the final placement (last place is eliminated first).
    ParticipantEliminated {
        participant: ParticipantId,
        place: usize,
    },
    /// `standings` is winner first.
    LeaderboardFinalized {
        winner: ParticipantId,
        standings: Vec<ParticipantId>,
    },
    ParticipantsSpawned {
        context: SpawnContext,
        assignments: Vec<SpawnAssignment>,
    },
    SceneLoadScheduled {
        scene: SceneId,
        delay: f32,
    },
    SceneLoadStarted {
        scene: SceneId,
    },
    SceneLoadSkipped {
        scene: SceneId,
    },
    SceneActivated {
        scene: SceneId,
    },
    SceneLoadCompleted {
        scene: SceneId,
    },
    Paused,
    Resumed,
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&MatchEvent) + Send>;

/// Events kept for [`EventBus::drain`] before the oldest are evicted.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Typed observer list. Every emitted event is delivered to the current
/// subscribers in subscription order and kept in a bounded outbox until
/// drained.
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
    outbox: VecDeque<MatchEvent>,
    outbox_capacity: usize,
    evicted: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    /// An outbox capacity of zero disables buffering, for owners that only
    /// use subscribers.
    pub fn with_capacity(outbox_capacity: usize) -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 1,
            outbox: VecDeque::new(),
            outbox_capacity,
            evicted: 0,
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        before != self.listeners.len()
    }

    pub fn emit(&mut self, event: MatchEvent) {
        tracing::trace!(?event, "match event");
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        if self.outbox_capacity == 0 {
            return;
        }
        self.outbox.push_back(event);
        while self.outbox.len() > self.outbox_capacity {
            self.outbox.pop_front();
            self.evicted += 1;
            if self.evicted.is_power_of_two() {
                tracing::warn!(evicted = self.evicted, "Event outbox full, dropping oldest events");
            }
        }
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = MatchEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Take every event emitted since the last drain.
    pub fn drain(&mut self) -> Vec<MatchEvent> {
        self.outbox.drain(..).collect()
    }

    /// Change the outbox bound, evicting the oldest events if it shrinks.
    pub fn set_outbox_capacity(&mut self, capacity: usize) {
        self.outbox_capacity = capacity;
        while self.outbox.len() > capacity {
            self.outbox.pop_front();
            self.evicted += 1;
        }
    }

    /// Events dropped from a full outbox over the bus lifetime.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear_subscribers(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn subscribers_receive_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        bus.emit(MatchEvent::Paused);
        bus.emit(MatchEvent::Resumed);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![MatchEvent::Paused, MatchEvent::Resumed]);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let count = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_| *counter.lock().unwrap() += 1);

        bus.emit(MatchEvent::ValidationCancelled);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(MatchEvent::ValidationCancelled);

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn drain_empties_outbox() {
        let mut bus = EventBus::new();
        bus.emit_all([MatchEvent::Paused, MatchEvent::ValidationComplete]);
        assert_eq!(bus.drain().len(), 2);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn full_outbox_drops_oldest() {
        let mut bus = EventBus::with_capacity(2);
        bus.emit_all([
            MatchEvent::Paused,
            MatchEvent::Resumed,
            MatchEvent::ValidationComplete,
        ]);
        assert_eq!(bus.evicted(), 1);
        assert_eq!(
            bus.drain(),
            vec![MatchEvent::Resumed, MatchEvent::ValidationComplete]
        );
    }

    #[test]
    fn zero_capacity_only_notifies_subscribers() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let mut bus = EventBus::with_capacity(0);
        bus.subscribe(move |_| *counter.lock().unwrap() += 1);
        for _ in 0..10 {
            bus.emit(MatchEvent::Paused);
        }
        assert_eq!(*count.lock().unwrap(), 10);
        assert!(bus.drain().is_empty());
        assert_eq!(bus.evicted(), 0);
    }
}
