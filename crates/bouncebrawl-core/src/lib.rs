pub mod config;
pub mod elimination;
pub mod error;
pub mod events;
pub mod lobby;
pub mod participant;
pub mod registry;
pub mod scene;
pub mod session;
pub mod spawn;
pub mod state;
pub mod timer;
pub mod zone;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::config::{MatchConfig, TransitionConfig};
    use crate::events::MatchEvent;
    use crate::participant::{DeviceHandle, ParticipantId};
    use crate::session::MatchSession;
    use crate::state::MatchState;

    /// Default config with instant scene loads and no death delay, so a
    /// single tick settles every transition.
    pub fn instant_config() -> MatchConfig {
        let mut config = MatchConfig::default();
        config.transition = TransitionConfig::instant();
        config.flow.default_transition_delay = 0.0;
        config.life.death_delay = 0.0;
        config
    }

    /// A session that has already moved from the main menu into the lobby.
    pub fn lobby_session(config: MatchConfig) -> MatchSession {
        let mut session = MatchSession::new(config);
        session
            .request_state_change(MatchState::Lobby)
            .expect("Start -> Lobby is always allowed");
        session.tick(0.0);
        session
    }

    /// Join `n` players on gamepads `0..n`, returning their ids in join order.
    pub fn join_players(session: &mut MatchSession, n: u32) -> Vec<ParticipantId> {
        (0..n)
            .map(|i| {
                session
                    .player_joined(DeviceHandle::new(format!("gamepad:{i}")), i)
                    .expect("player should join")
            })
            .collect()
    }

    /// A session with `n` participants whose match has just started.
    pub fn playing_session(config: MatchConfig, n: u32) -> MatchSession {
        let mut session = lobby_session(config);
        join_players(&mut session, n);
        session.force_start().expect("force start");
        session.tick(0.0);
        assert_eq!(session.state(), MatchState::Playing);
        session
    }

    /// Tick in 100 ms steps for roughly `seconds`.
    pub fn run_for(session: &mut MatchSession, seconds: f32) {
        let steps = (seconds / 0.1).round() as usize;
        for _ in 0..steps {
            session.tick(0.1);
        }
    }

    pub fn count_events(events: &[MatchEvent], pred: impl Fn(&MatchEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }
}
