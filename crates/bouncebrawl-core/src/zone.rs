use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ZoneConfig;
use crate::events::MatchEvent;
use crate::participant::ParticipantId;
use crate::timer::Countdown;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZonePhase {
    #[default]
    Idle,
    Validating,
    /// Terminal for this zone. Reset it to validate again.
    Ready,
}

/// How many occupants the zone needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneRequirement {
    /// Every registered participant.
    AllRegistered,
    Minimum(usize),
}

impl ZoneRequirement {
    pub fn from_config(config: &ZoneConfig) -> Self {
        if config.require_all_players {
            Self::AllRegistered
        } else {
            Self::Minimum(config.minimum_players_required)
        }
    }
}

/// Readiness gate: the required number of participants must stay inside
/// for `duration` seconds.
///
/// Every method takes the current registered count, which the requirement
/// depends on in [`ZoneRequirement::AllRegistered`] mode.
#[derive(Debug, Clone)]
pub struct ValidationZone {
    requirement: ZoneRequirement,
    duration: f32,
    occupants: HashSet<ParticipantId>,
    phase: ZonePhase,
    countdown: Option<Countdown>,
}

impl ValidationZone {
    pub fn new(requirement: ZoneRequirement, duration: f32) -> Self {
        Self {
            requirement,
            duration,
            occupants: HashSet::new(),
            phase: ZonePhase::Idle,
            countdown: None,
        }
    }

    pub fn from_config(config: &ZoneConfig) -> Self {
        Self::new(
            ZoneRequirement::from_config(config),
            config.validation_duration,
        )
    }

    /// Never below one, so an empty zone can not validate.
    pub fn required_players(&self, registered: usize) -> usize {
        match self.requirement {
            ZoneRequirement::AllRegistered => registered,
            ZoneRequirement::Minimum(n) => n,
        }
        .max(1)
    }

    pub fn enter(&mut self, occupant: ParticipantId, registered: usize) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if !self.occupants.insert(occupant) {
            return events;
        }
        tracing::debug!(participant = occupant, occupants = self.occupants.len(), "Zone entered");
        events.push(self.count_event(registered));
        if self.phase == ZonePhase::Idle && self.is_satisfied(registered) {
            events.push(self.start());
        }
        events
    }

    pub fn exit(&mut self, occupant: ParticipantId, registered: usize) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if !self.occupants.remove(&occupant) {
            return events;
        }
        tracing::debug!(participant = occupant, occupants = self.occupants.len(), "Zone left");
        events.push(self.count_event(registered));
        if self.phase == ZonePhase::Validating && !self.is_satisfied(registered) {
            events.push(self.cancel());
        }
        events
    }

    /// Re-check occupancy, then advance the validation countdown.
    pub fn tick(&mut self, dt: f32, registered: usize) -> Vec<MatchEvent> {
        if self.phase != ZonePhase::Validating {
            return Vec::new();
        }
        if !self.is_satisfied(registered) {
            return vec![self.cancel()];
        }
        let finished = self.countdown.as_mut().is_none_or(|c| c.tick(dt));
        if finished {
            return vec![self.complete()];
        }
        Vec::new()
    }

    /// Start validating without waiting for another occupant to enter.
    pub fn force_start_validation(&mut self, registered: usize) -> Vec<MatchEvent> {
        if self.phase == ZonePhase::Idle && self.is_satisfied(registered) {
            return vec![self.start()];
        }
        Vec::new()
    }

    /// Skip the remaining countdown. Only has an effect while validating.
    pub fn force_complete_validation(&mut self) -> Vec<MatchEvent> {
        if self.phase == ZonePhase::Validating {
            return vec![self.complete()];
        }
        Vec::new()
    }

    /// Cancel any validation and forget every occupant.
    pub fn reset(&mut self, registered: usize) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if self.phase == ZonePhase::Validating {
            events.push(self.cancel());
        }
        self.phase = ZonePhase::Idle;
        self.countdown = None;
        self.occupants.clear();
        events.push(self.count_event(registered));
        events
    }

    pub fn phase(&self) -> ZonePhase {
        self.phase
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn contains(&self, occupant: ParticipantId) -> bool {
        self.occupants.contains(&occupant)
    }

    pub fn requirement(&self) -> ZoneRequirement {
        self.requirement
    }

    pub fn progress(&self) -> f32 {
        match self.phase {
            ZonePhase::Idle => 0.0,
            ZonePhase::Validating => self.countdown.as_ref().map_or(0.0, Countdown::progress),
            ZonePhase::Ready => 1.0,
        }
    }

    fn is_satisfied(&self, registered: usize) -> bool {
        self.occupants.len() >= self.required_players(registered)
    }

    fn count_event(&self, registered: usize) -> MatchEvent {
        MatchEvent::ZoneCountChanged {
            current: self.occupants.len(),
            required: self.required_players(registered),
        }
    }

    fn start(&mut self) -> MatchEvent {
        tracing::info!(duration = self.duration, "Zone validation started");
        self.phase = ZonePhase::Validating;
        self.countdown = Some(Countdown::new(self.duration));
        MatchEvent::ValidationStarted {
            duration: self.duration,
        }
    }

    fn cancel(&mut self) -> MatchEvent {
        tracing::info!("Zone validation cancelled");
        self.phase = ZonePhase::Idle;
        self.countdown = None;
        MatchEvent::ValidationCancelled
    }

    fn complete(&mut self) -> MatchEvent {
        tracing::info!("Zone validation complete");
        self.phase = ZonePhase::Ready;
        self.countdown = None;
        MatchEvent::ValidationComplete
    }
}
