//! Line commands read by the host binary.

use bouncebrawl_core::participant::ParticipantId;
use bouncebrawl_core::state::MatchState;

use crate::session_loop::MatchCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    Empty,
    UnknownCommand(String),
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    InvalidArgument {
        argument: &'static str,
        value: String,
    },
}

impl std::fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::UnknownCommand(c) => write!(f, "unknown command: {c}"),
            Self::MissingArgument { command, argument } => {
                write!(f, "{command}: missing <{argument}>")
            },
            Self::InvalidArgument { argument, value } => {
                write!(f, "invalid {argument}: {value}")
            },
        }
    }
}

impl std::error::Error for CommandParseError {}

pub const HELP: &str = "\
commands:
  join <index> [device]     register a player (device defaults to gamepad:<index>)
  players +|-               change the required player count
  enter <id> | exit <id>    move a participant in or out of the ready zone
  start                     force start the match
  damage <id> [amount]      remove lives from a participant
  heal <id> [amount]        give a living participant extra lives
  dead <id>                 eliminate a participant
  state <name>              request a state change
  force-state <name>        set the state, bypassing the transition table
  next                      request the next state in the match flow
  pause | resume | restart
  status                    print a snapshot
  quit";

fn arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandParseError> {
    parts
        .next()
        .ok_or(CommandParseError::MissingArgument { command, argument })
}

fn number<T: std::str::FromStr>(value: &str, argument: &'static str) -> Result<T, CommandParseError> {
    value.parse().map_err(|_| CommandParseError::InvalidArgument {
        argument,
        value: value.to_string(),
    })
}

fn participant<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
) -> Result<ParticipantId, CommandParseError> {
    number(arg(parts, command, "id")?, "participant id")
}

fn state<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
) -> Result<MatchState, CommandParseError> {
    let name = arg(parts, command, "state")?;
    MatchState::from_name(name).ok_or_else(|| CommandParseError::InvalidArgument {
        argument: "state",
        value: name.to_string(),
    })
}

pub fn parse_command(line: &str) -> Result<MatchCommand, CommandParseError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(CommandParseError::Empty);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "join" => {
            let index: u32 = number(arg(&mut parts, "join", "index")?, "device index")?;
            let device = parts
                .next()
                .map_or_else(|| format!("gamepad:{index}"), str::to_string);
            MatchCommand::Join { device, index }
        },
        "players" => match arg(&mut parts, "players", "+|-")? {
            "+" => MatchCommand::AddPlayerCount,
            "-" => MatchCommand::RemovePlayerCount,
            other => {
                return Err(CommandParseError::InvalidArgument {
                    argument: "count change",
                    value: other.to_string(),
                });
            },
        },
        "enter" => MatchCommand::ZoneEnter {
            participant: participant(&mut parts, "enter")?,
        },
        "exit" => MatchCommand::ZoneExit {
            participant: participant(&mut parts, "exit")?,
        },
        "start" | "force-start" => MatchCommand::ForceStart,
        "damage" => {
            let id = participant(&mut parts, "damage")?;
            let amount = match parts.next() {
                Some(v) => number(v, "damage amount")?,
                None => 1,
            };
            MatchCommand::Damage {
                participant: id,
                amount,
            }
        },
        "heal" => {
            let id = participant(&mut parts, "heal")?;
            let amount = match parts.next() {
                Some(v) => number(v, "heal amount")?,
                None => 1,
            };
            MatchCommand::Heal {
                participant: id,
                amount,
            }
        },
        "dead" => MatchCommand::Dead {
            participant: participant(&mut parts, "dead")?,
        },
        "state" => MatchCommand::RequestState(state(&mut parts, "state")?),
        "force-state" => MatchCommand::ForceState(state(&mut parts, "force-state")?),
        "next" => MatchCommand::Next,
        "pause" => MatchCommand::Pause,
        "resume" => MatchCommand::Resume,
        "restart" => MatchCommand::Restart,
        "status" => MatchCommand::Snapshot,
        "quit" | "stop" => MatchCommand::Stop,
        other => return Err(CommandParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}
