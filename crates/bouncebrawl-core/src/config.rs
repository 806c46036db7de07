use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scene::SceneId;
use crate::spawn::{Pose, default_arena_points};
use crate::state::MatchState;

/// Data-driven configuration for one match session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub players: PlayersConfig,
    pub life: LifeConfig,
    pub zone: ZoneConfig,
    pub lobby: LobbyConfig,
    pub flow: FlowConfig,
    pub transition: TransitionConfig,
    pub spawn: SpawnConfig,
    pub scenes: Vec<SceneMapping>,
}

/// Player count bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayersConfig {
    pub min_players: u8,
    pub max_players: u8,
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            min_players: 1,
            max_players: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeConfig {
    pub starting_lives: u32,
    /// Seconds between the fatal hit and the elimination being recorded
    /// (death animation).
    pub death_delay: f32,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            starting_lives: 3,
            death_delay: 0.5,
        }
    }
}

/// Readiness gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub enabled: bool,
    pub validation_duration: f32,
    /// Require every registered participant inside the zone.
    pub require_all_players: bool,
    /// Used when `require_all_players` is false.
    pub minimum_players_required: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            validation_duration: 3.0,
            require_all_players: true,
            minimum_players_required: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Start a countdown as soon as the registry is complete.
    pub auto_start_when_ready: bool,
    pub countdown_duration: f32,
    pub enable_force_start: bool,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            auto_start_when_ready: false,
            countdown_duration: 3.0,
            enable_force_start: true,
        }
    }
}

/// State flow options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Load the mapped scene on every state change.
    pub auto_transition_scenes: bool,
    pub default_transition_delay: f32,
    /// Wait `game_over_delay` before leaving Playing once a winner is known.
    pub auto_restart_on_game_over: bool,
    pub game_over_delay: f32,
    /// Go straight from Playing to ScoreBoard.
    pub skip_game_over_state: bool,
    /// Restart into the lobby (keeping nobody) instead of the main menu.
    pub restart_to_lobby: bool,
    pub log_state_transitions: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            auto_transition_scenes: true,
            default_transition_delay: 0.5,
            auto_restart_on_game_over: false,
            game_over_delay: 3.0,
            skip_game_over_state: false,
            restart_to_lobby: false,
            log_state_transitions: true,
        }
    }
}

/// Scene loading timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub fade_out_duration: f32,
    pub minimum_loading_time: f32,
    pub fade_in_duration: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fade_out_duration: 0.5,
            minimum_loading_time: 1.0,
            fade_in_duration: 0.5,
        }
    }
}

impl TransitionConfig {
    /// A timeline where every load completes on the next tick.
    pub fn instant() -> Self {
        Self {
            fade_out_duration: 0.0,
            minimum_loading_time: 0.0,
            fade_in_duration: 0.0,
        }
    }

    pub fn total(&self) -> f32 {
        self.fade_out_duration + self.minimum_loading_time + self.fade_in_duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub randomize: bool,
    /// Where newly joined participants appear in the lobby.
    pub lobby_position: Pose,
    /// Arena and scoreboard spawn points. Empty means no spawn collaborator.
    pub points: Vec<Pose>,
    pub disable_movement_on_scoreboard: bool,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            randomize: false,
            lobby_position: Pose::default(),
            points: default_arena_points(),
            disable_movement_on_scoreboard: true,
        }
    }
}

/// Maps a state to the scene that presents it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMapping {
    pub state: MatchState,
    pub scene: String,
    /// Zero or negative falls back to `flow.default_transition_delay`.
    #[serde(default)]
    pub transition_delay: f32,
}

impl SceneMapping {
    fn new(state: MatchState, scene: &str) -> Self {
        Self {
            state,
            scene: scene.to_string(),
            transition_delay: 0.0,
        }
    }
}

/// Built-in scene names used when the config declares no mapping.
pub fn default_scene_mappings() -> Vec<SceneMapping> {
    vec![
        SceneMapping::new(MatchState::Start, "MainMenu"),
        SceneMapping::new(MatchState::Lobby, "LobbyScene"),
        SceneMapping::new(MatchState::Playing, "InGame"),
        SceneMapping::new(MatchState::ScoreBoard, "EndingScene"),
    ]
}

impl MatchConfig {
    fn mappings(&self) -> std::borrow::Cow<'_, [SceneMapping]> {
        if self.scenes.is_empty() {
            std::borrow::Cow::Owned(default_scene_mappings())
        } else {
            std::borrow::Cow::Borrowed(&self.scenes)
        }
    }

    /// Scene that presents `state`, if any.
    pub fn scene_for(&self, state: MatchState) -> Option<SceneId> {
        self.mappings()
            .iter()
            .find(|m| m.state == state && !m.scene.is_empty())
            .map(|m| SceneId::new(m.scene.clone()))
    }

    /// Reverse lookup used when a session is attached to an already loaded
    /// scene. Unknown scenes map to `Start`.
    pub fn state_for_scene(&self, scene: &SceneId) -> MatchState {
        self.mappings()
            .iter()
            .find(|m| m.scene == scene.as_str())
            .map(|m| m.state)
            .unwrap_or_default()
    }

    pub fn transition_delay(&self, state: MatchState) -> f32 {
        self.mappings()
            .iter()
            .find(|m| m.state == state)
            .map(|m| m.transition_delay)
            .filter(|d| *d > 0.0)
            .unwrap_or(self.flow.default_transition_delay)
    }

    /// Configured successor of `state` in the regular match flow.
    pub fn next_state(&self, state: MatchState) -> MatchState {
        match state {
            MatchState::Start => MatchState::Lobby,
            MatchState::Lobby => MatchState::Playing,
            MatchState::Playing if self.flow.skip_game_over_state => MatchState::ScoreBoard,
            MatchState::Playing => MatchState::GameOver,
            MatchState::GameOver => MatchState::ScoreBoard,
            MatchState::ScoreBoard if self.flow.auto_restart_on_game_over => MatchState::Start,
            MatchState::ScoreBoard => MatchState::Lobby,
            other => other,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from `BOUNCEBRAWL_MATCH_CONFIG` or `config/match.toml`,
    /// falling back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("BOUNCEBRAWL_MATCH_CONFIG")
            && !path.is_empty()
        {
            return Self::load_from(&path);
        }
        Self::load_from("config/match.toml")
    }

    pub fn load_from(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(cfg) => {
                    tracing::info!(path, "Loaded match configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path, error = %e, "Bad match configuration, using defaults");
                    Self::default()
                },
            },
            Err(_) => {
                tracing::info!(path, "No match configuration found, using defaults");
                Self::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.players.min_players == 0 {
            return Err(ConfigError::Invalid("players.min_players must be > 0".into()));
        }
        if self.players.min_players > self.players.max_players {
            return Err(ConfigError::Invalid(format!(
                "players.min_players ({}) exceeds players.max_players ({})",
                self.players.min_players, self.players.max_players
            )));
        }
        if self.life.starting_lives == 0 {
            return Err(ConfigError::Invalid("life.starting_lives must be > 0".into()));
        }
        if self.zone.validation_duration <= 0.0 {
            return Err(ConfigError::Invalid(
                "zone.validation_duration must be > 0".into(),
            ));
        }
        let durations = [
            ("life.death_delay", self.life.death_delay),
            ("lobby.countdown_duration", self.lobby.countdown_duration),
            ("flow.default_transition_delay", self.flow.default_transition_delay),
            ("flow.game_over_delay", self.flow.game_over_delay),
            ("transition.fade_out_duration", self.transition.fade_out_duration),
            ("transition.minimum_loading_time", self.transition.minimum_loading_time),
            ("transition.fade_in_duration", self.transition.fade_in_duration),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, v)| *v < 0.0 || !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be a finite value >= 0")));
        }
        if let Some(m) = self.scenes.iter().find(|m| m.scene.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "empty scene name for state {}",
                m.state
            )));
        }
        Ok(())
    }
}
