use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a match session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    #[default]
    Start,
    Lobby,
    Menu,
    Playing,
    ScoreBoard,
    Paused,
    GameOver,
}

impl MatchState {
    pub const ALL: [MatchState; 7] = [
        MatchState::Start,
        MatchState::Lobby,
        MatchState::Menu,
        MatchState::Playing,
        MatchState::ScoreBoard,
        MatchState::Paused,
        MatchState::GameOver,
    ];

    /// Whether `next` is reachable from `self` through a regular transition.
    ///
    /// Restarting a match does not go through this table; it is allowed from
    /// every state. `Playing -> ScoreBoard` is further gated by the session
    /// on the game-over state being skipped.
    pub fn can_transition_to(self, next: MatchState) -> bool {
        matches!(
            (self, next),
            (MatchState::Start, MatchState::Lobby)
                | (MatchState::Start, MatchState::Menu)
                | (MatchState::Menu, MatchState::Start)
                | (MatchState::Menu, MatchState::Lobby)
                | (MatchState::Lobby, MatchState::Start)
                | (MatchState::Lobby, MatchState::Playing)
                | (MatchState::Playing, MatchState::GameOver)
                | (MatchState::Playing, MatchState::ScoreBoard)
                | (MatchState::Playing, MatchState::Paused)
                | (MatchState::Paused, MatchState::Playing)
                | (MatchState::GameOver, MatchState::ScoreBoard)
                | (MatchState::ScoreBoard, MatchState::Start)
                | (MatchState::ScoreBoard, MatchState::Lobby)
        )
    }

    /// Players can only join while the lobby is open.
    pub fn accepts_players(self) -> bool {
        self == MatchState::Lobby
    }

    /// States in which the arena simulation exists (running or frozen).
    pub fn is_in_match(self) -> bool {
        matches!(self, MatchState::Playing | MatchState::Paused)
    }

    /// Parse a state name case-insensitively (`"scoreboard"`, `"GameOver"`).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| s.to_string().to_ascii_lowercase() == lower)
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "Start",
            Self::Lobby => "Lobby",
            Self::Menu => "Menu",
            Self::Playing => "Playing",
            Self::ScoreBoard => "ScoreBoard",
            Self::Paused => "Paused",
            Self::GameOver => "GameOver",
        };
        f.write_str(name)
    }
}
