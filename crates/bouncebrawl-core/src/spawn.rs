use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

/// World-space placement handed to the spawn collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub position: [f32; 3],
    /// Rotation around the vertical axis, in degrees.
    pub yaw: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, z: f32, yaw: f32) -> Self {
        Self {
            position: [x, y, z],
            yaw,
        }
    }
}

/// Source of arena spawn points (the scene's spawn markers).
pub trait SpawnPoints {
    fn spawn_points(&self) -> Vec<Pose>;
}

/// Spawn points taken from a fixed list, usually the config file.
#[derive(Debug, Clone, Default)]
pub struct FixedSpawnPoints(pub Vec<Pose>);

impl SpawnPoints for FixedSpawnPoints {
    fn spawn_points(&self) -> Vec<Pose> {
        self.0.clone()
    }
}

/// Where a set of spawn assignments is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnContext {
    Arena,
    ScoreBoard,
}

/// One participant placed on one spawn point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnAssignment {
    pub participant: ParticipantId,
    pub slot: usize,
    pub pose: Pose,
    /// Scoreboard only: the participant shown on the winner's podium.
    pub winner: bool,
    pub movement_enabled: bool,
}

/// Pair participants with poses by index. Participants beyond the number of
/// poses are left unplaced.
pub fn assign_spawns(participants: &[ParticipantId], poses: &[Pose]) -> Vec<SpawnAssignment> {
    participants
        .iter()
        .zip(poses)
        .enumerate()
        .map(|(slot, (&participant, &pose))| SpawnAssignment {
            participant,
            slot,
            pose,
            winner: false,
            movement_enabled: true,
        })
        .collect()
}

/// Scoreboard placement: `standings` is winner first, index 0 gets the
/// winner pose.
pub fn assign_scoreboard(
    standings: &[ParticipantId],
    poses: &[Pose],
    disable_movement: bool,
) -> Vec<SpawnAssignment> {
    let mut assignments = assign_spawns(standings, poses);
    for a in &mut assignments {
        a.winner = a.slot == 0;
        a.movement_enabled = !disable_movement;
    }
    assignments
}

/// Shuffle spawn points in place.
pub fn shuffle_poses<R: Rng + ?Sized>(poses: &mut [Pose], rng: &mut R) {
    poses.shuffle(rng);
}

/// Default arena layout: four corners of a 20x20 arena, facing the centre.
pub fn default_arena_points() -> Vec<Pose> {
    vec![
        Pose::new(-8.0, 0.0, -8.0, 45.0),
        Pose::new(8.0, 0.0, 8.0, 225.0),
        Pose::new(8.0, 0.0, -8.0, 315.0),
        Pose::new(-8.0, 0.0, 8.0, 135.0),
    ]
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn assignment_truncates_to_available_poses() {
        let poses = default_arena_points();
        let ids: Vec<ParticipantId> = (1..=6).collect();
        let assignments = assign_spawns(&ids, &poses);
        assert_eq!(assignments.len(), poses.len());
        assert_eq!(assignments[2].participant, 3);
        assert_eq!(assignments[2].pose, poses[2]);
    }

    #[test]
    fn assignment_keeps_join_order() {
        let poses = default_arena_points();
        let assignments = assign_spawns(&[7, 3], &poses);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].participant, 7);
        assert_eq!(assignments[0].slot, 0);
        assert_eq!(assignments[1].participant, 3);
    }

    #[test]
    fn scoreboard_marks_first_as_winner() {
        let poses = default_arena_points();
        let assignments = assign_scoreboard(&[3, 1, 4, 2], &poses, true);
        assert!(assignments[0].winner);
        assert_eq!(assignments[0].participant, 3);
        assert!(assignments.iter().skip(1).all(|a| !a.winner));
        assert!(assignments.iter().all(|a| !a.movement_enabled));
    }

    #[test]
    fn shuffle_keeps_every_pose() {
        let original = default_arena_points();
        let mut poses = original.clone();
        let mut rng = StdRng::seed_from_u64(7);
        shuffle_poses(&mut poses, &mut rng);
        assert_eq!(poses.len(), original.len());
        for p in &original {
            assert!(poses.contains(p));
        }
    }

    #[test]
    fn fixed_points_returns_copy() {
        let fixed = FixedSpawnPoints(default_arena_points());
        assert_eq!(fixed.spawn_points().len(), 4);
    }
}
