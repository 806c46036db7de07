use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::participant::{DeviceHandle, Participant, ParticipantId, PlayerColor};
use crate::spawn::Pose;

/// Result of adjusting the desired player count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountChange {
    Changed { required: u8 },
    /// The adjustment would have left `[min, max]`; nothing changed.
    Clamped { requested: i32, min: u8, max: u8 },
}

/// Joined participants in join order plus the desired player count.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    registered: Vec<Participant>,
    required_count: u8,
    min_players: u8,
    max_players: u8,
    starting_lives: u32,
    lobby_position: Pose,
    /// Ids are never reused within a session, even across `clear()`.
    next_id: ParticipantId,
    /// Join counter, used for colour assignment. Reset by `clear()`.
    joined: usize,
}

impl PlayerRegistry {
    pub fn new(min_players: u8, max_players: u8) -> Self {
        let max_players = max_players.max(min_players);
        Self {
            registered: Vec::new(),
            required_count: min_players,
            min_players,
            max_players,
            starting_lives: 3,
            lobby_position: Pose::default(),
            next_id: 1,
            joined: 0,
        }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        let mut registry = Self::new(config.players.min_players, config.players.max_players);
        registry.starting_lives = config.life.starting_lives;
        registry.lobby_position = config.spawn.lobby_position;
        registry
    }

    /// Append a participant bound to `device`. `index_hint` is the device
    /// index reported by the input layer.
    pub fn register_player(
        &mut self,
        device: DeviceHandle,
        index_hint: u32,
    ) -> Result<ParticipantId, MatchError> {
        if !device.is_valid() {
            return Err(MatchError::InvalidParticipant(
                "empty device handle".to_string(),
            ));
        }
        if self
            .registered
            .iter()
            .any(|p| p.device == device || p.device_index == index_hint)
        {
            return Err(MatchError::InvalidParticipant(format!(
                "device {} (index {index_hint}) is already registered",
                device.as_str()
            )));
        }

        let id = self.next_id;
        self.next_id += 1;
        let participant = Participant {
            id,
            device,
            device_index: index_hint,
            display_name: format!("Player {index_hint}"),
            color: PlayerColor::for_slot(self.joined),
            alive: true,
            lives: self.starting_lives,
            position: self.lobby_position,
        };
        self.joined += 1;
        tracing::info!(
            participant = id,
            device = %participant.device.as_str(),
            index = index_hint,
            "Participant registered"
        );
        self.registered.push(participant);
        Ok(id)
    }

    pub fn is_all_players_registered(&self) -> bool {
        self.registered.len() == usize::from(self.required_count)
    }

    pub fn add_player_count(&mut self) -> CountChange {
        self.adjust(1)
    }

    pub fn remove_player_count(&mut self) -> CountChange {
        self.adjust(-1)
    }

    fn adjust(&mut self, delta: i32) -> CountChange {
        let requested = i32::from(self.required_count) + delta;
        if requested < i32::from(self.min_players) || requested > i32::from(self.max_players) {
            tracing::debug!(
                requested,
                min = self.min_players,
                max = self.max_players,
                "Player count adjustment clamped"
            );
            return CountChange::Clamped {
                requested,
                min: self.min_players,
                max: self.max_players,
            };
        }
        // In range of u8 because it lies within [min, max]
        self.required_count = requested as u8;
        CountChange::Changed {
            required: self.required_count,
        }
    }

    /// Drop every participant, returning their ids in join order. The
    /// required count is preserved.
    pub fn clear(&mut self) -> Vec<ParticipantId> {
        self.joined = 0;
        self.registered.drain(..).map(|p| p.id).collect()
    }

    /// Restore every participant for a new match.
    pub fn revive_all(&mut self) {
        for p in &mut self.registered {
            p.revive(self.starting_lives);
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.registered.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.registered.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.registered.iter()
    }

    /// Participant ids in join order.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.registered.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.registered.iter().filter(|p| p.alive).count()
    }

    pub fn required_count(&self) -> u8 {
        self.required_count
    }

    pub fn min_players(&self) -> u8 {
        self.min_players
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    pub fn starting_lives(&self) -> u32 {
        self.starting_lives
    }
}
