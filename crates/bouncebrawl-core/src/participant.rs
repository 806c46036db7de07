use serde::{Deserialize, Serialize};

use crate::spawn::Pose;

/// Unique identifier for a participant within a session.
pub type ParticipantId = u64;

/// Input device binding supplied by the input layer when a player joins
/// (for example `"gamepad:0"` or `"keyboard"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub String);

impl DeviceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One joined local player bound to the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub device: DeviceHandle,
    pub device_index: u32,
    pub display_name: String,
    pub color: PlayerColor,
    pub alive: bool,
    pub lives: u32,
    pub position: Pose,
}

impl Participant {
    /// Remove `amount` lives. Returns true when this hit took the last life.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if !self.alive {
            return false;
        }
        self.lives = self.lives.saturating_sub(amount);
        if self.lives == 0 {
            self.alive = false;
            return true;
        }
        false
    }

    /// Grant extra lives. A dead participant stays dead; returns false then.
    pub fn add_lives(&mut self, amount: u32) -> bool {
        if !self.alive {
            return false;
        }
        self.lives = self.lives.saturating_add(amount);
        true
    }

    /// Bring the participant back for a new match.
    pub fn revive(&mut self, lives: u32) {
        self.alive = true;
        self.lives = lives;
    }
}

/// Skin colour assigned by join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for PlayerColor {
    fn default() -> Self {
        Self::PALETTE[0]
    }
}

impl PlayerColor {
    pub const PALETTE: &[PlayerColor] = &[
        PlayerColor {
            r: 235,
            g: 64,
            b: 52,
        }, // Red
        PlayerColor {
            r: 52,
            g: 120,
            b: 235,
        }, // Blue
        PlayerColor {
            r: 245,
            g: 197,
            b: 24,
        }, // Yellow
        PlayerColor {
            r: 64,
            g: 199,
            b: 96,
        }, // Green
        PlayerColor {
            r: 168,
            g: 85,
            b: 247,
        }, // Purple
        PlayerColor {
            r: 255,
            g: 140,
            b: 50,
        }, // Orange
    ];

    /// Palette colour for the n-th joined participant, wrapping around.
    pub fn for_slot(slot: usize) -> Self {
        Self::PALETTE[slot % Self::PALETTE.len()]
    }
}
