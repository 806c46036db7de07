use crate::participant::ParticipantId;
use crate::state::MatchState;

/// Errors surfaced by match operations. None of them is fatal: a failed
/// operation leaves the session in its prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// A collaborator the operation needs is not attached.
    MissingCollaborator(&'static str),
    /// The requested state is not reachable from the current one.
    InvalidTransition { from: MatchState, to: MatchState },
    /// The operation is not allowed in the current state.
    WrongState {
        operation: &'static str,
        state: MatchState,
    },
    InvalidParticipant(String),
    UnknownParticipant(ParticipantId),
    AlreadyEliminated(ParticipantId),
    /// The leaderboard already has a winner for this match.
    LeaderboardClosed,
    ForceStartDisabled,
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCollaborator(what) => write!(f, "missing collaborator: {what}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid state transition: {from} -> {to}")
            },
            Self::WrongState { operation, state } => {
                write!(f, "{operation} is not allowed in state {state}")
            },
            Self::InvalidParticipant(reason) => write!(f, "invalid participant: {reason}"),
            Self::UnknownParticipant(id) => write!(f, "unknown participant: {id}"),
            Self::AlreadyEliminated(id) => write!(f, "participant {id} is already eliminated"),
            Self::LeaderboardClosed => write!(f, "leaderboard is already finalized"),
            Self::ForceStartDisabled => write!(f, "force start is disabled"),
        }
    }
}

impl std::error::Error for MatchError {}

/// Errors from loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Invalid(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_both_states() {
        let err = MatchError::InvalidTransition {
            from: MatchState::Start,
            to: MatchState::Playing,
        };
        assert_eq!(err.to_string(), "invalid state transition: Start -> Playing");
    }

    #[test]
    fn wrong_state_mentions_operation() {
        let err = MatchError::WrongState {
            operation: "player_joined",
            state: MatchState::Playing,
        };
        assert!(err.to_string().contains("player_joined"));
        assert!(err.to_string().contains("Playing"));
    }
}
