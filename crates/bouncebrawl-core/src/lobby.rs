use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::events::MatchEvent;
use crate::participant::ParticipantId;
use crate::timer::Countdown;
use crate::zone::{ValidationZone, ZonePhase};

/// What one lobby update produced.
#[derive(Debug, Default, PartialEq)]
pub struct LobbyTick {
    pub events: Vec<MatchEvent>,
    /// The lobby is done: the session should move on to the match.
    pub start_requested: bool,
}

impl LobbyTick {
    fn absorb(&mut self, events: Vec<MatchEvent>) {
        if events.contains(&MatchEvent::ValidationComplete) {
            self.start_requested = true;
        }
        self.events.extend(events);
    }
}

/// Lobby-scoped collaborator. Lives only while the session is in the lobby
/// and owns the validation zone and the ready countdown.
#[derive(Debug, Clone)]
pub struct LobbyContext {
    zone: Option<ValidationZone>,
    auto_start_when_ready: bool,
    countdown_duration: f32,
    ready_countdown: Option<Countdown>,
}

impl LobbyContext {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            zone: config
                .zone
                .enabled
                .then(|| ValidationZone::from_config(&config.zone)),
            auto_start_when_ready: config.lobby.auto_start_when_ready,
            countdown_duration: config.lobby.countdown_duration,
            ready_countdown: None,
        }
    }

    pub fn zone(&self) -> Option<&ValidationZone> {
        self.zone.as_ref()
    }

    pub fn zone_enter(
        &mut self,
        occupant: ParticipantId,
        registered: usize,
    ) -> Result<LobbyTick, MatchError> {
        let zone = self
            .zone
            .as_mut()
            .ok_or(MatchError::MissingCollaborator("validation zone"))?;
        let mut tick = LobbyTick::default();
        tick.absorb(zone.enter(occupant, registered));
        Ok(tick)
    }

    pub fn zone_exit(
        &mut self,
        occupant: ParticipantId,
        registered: usize,
    ) -> Result<LobbyTick, MatchError> {
        let zone = self
            .zone
            .as_mut()
            .ok_or(MatchError::MissingCollaborator("validation zone"))?;
        let mut tick = LobbyTick::default();
        tick.absorb(zone.exit(occupant, registered));
        Ok(tick)
    }

    /// React to a join or a required-count change.
    pub fn on_player_count_changed(&mut self, all_registered: bool) -> Vec<MatchEvent> {
        if !all_registered {
            if self.ready_countdown.take().is_some() {
                tracing::info!("Ready countdown reset");
                return vec![MatchEvent::ReadyCountdownReset];
            }
            return Vec::new();
        }
        if self.auto_start_when_ready && self.ready_countdown.is_none() {
            tracing::info!(duration = self.countdown_duration, "Ready countdown started");
            self.ready_countdown = Some(Countdown::new(self.countdown_duration));
            return vec![MatchEvent::ReadyCountdownStarted {
                duration: self.countdown_duration,
            }];
        }
        Vec::new()
    }

    pub fn tick(&mut self, dt: f32, registered: usize, all_registered: bool) -> LobbyTick {
        let mut tick = LobbyTick::default();
        if let Some(zone) = self.zone.as_mut() {
            tick.absorb(zone.tick(dt, registered));
        }

        if !all_registered {
            tick.events.extend(self.on_player_count_changed(false));
        } else if let Some(countdown) = self.ready_countdown.as_mut()
            && countdown.tick(dt)
        {
            tracing::info!("Ready countdown finished");
            tick.start_requested = true;
        }
        tick
    }

    /// Skip the readiness checks: completes a running zone validation, or
    /// asks for the match to start right away.
    pub fn force_start(&mut self) -> LobbyTick {
        let mut tick = LobbyTick::default();
        if let Some(zone) = self.zone.as_mut()
            && zone.phase() == ZonePhase::Validating
        {
            tick.absorb(zone.force_complete_validation());
            return tick;
        }
        tick.start_requested = true;
        tick
    }

    /// Seconds left on the ready countdown, if one is running.
    pub fn ready_countdown_remaining(&self) -> Option<f32> {
        self.ready_countdown
            .as_ref()
            .filter(|c| !c.is_finished())
            .map(Countdown::remaining)
    }
}
