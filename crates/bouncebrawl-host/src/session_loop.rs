use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bouncebrawl_core::error::MatchError;
use bouncebrawl_core::participant::{DeviceHandle, ParticipantId};
use bouncebrawl_core::registry::CountChange;
use bouncebrawl_core::session::MatchSession;
use bouncebrawl_core::state::MatchState;

use crate::protocol::{MatchFrame, RejectedMsg, encode_frame};

/// Commands sent to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchCommand {
    Join { device: String, index: u32 },
    AddPlayerCount,
    RemovePlayerCount,
    ZoneEnter { participant: ParticipantId },
    ZoneExit { participant: ParticipantId },
    ForceStart,
    Damage { participant: ParticipantId, amount: u32 },
    Heal { participant: ParticipantId, amount: u32 },
    Dead { participant: ParticipantId },
    RequestState(MatchState),
    ForceState(MatchState),
    Next,
    Pause,
    Resume,
    Restart,
    /// Broadcast a snapshot frame right away.
    Snapshot,
    Stop,
}

/// Output of the session loop.
#[derive(Debug, Clone)]
pub enum MatchBroadcast {
    /// An encoded [`MatchFrame`].
    EncodedFrame(Bytes),
    /// The loop has exited.
    SessionEnded,
}

#[derive(Debug, Clone)]
pub struct MatchSessionConfig {
    pub tick_rate_hz: u32,
    pub broadcast_buffer: usize,
    pub snapshot_interval_ticks: u32,
}

impl Default for MatchSessionConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            broadcast_buffer: 256,
            snapshot_interval_ticks: 0,
        }
    }
}

/// Spawn the session tick loop as a tokio task.
/// Returns the command sender, the frame receiver and the task handle.
pub fn spawn_match_session(
    session: MatchSession,
    config: MatchSessionConfig,
) -> (
    mpsc::UnboundedSender<MatchCommand>,
    mpsc::Receiver<MatchBroadcast>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_buffer.max(1));

    let handle = tokio::spawn(async move {
        run_session_loop(session, config, cmd_rx, broadcast_tx).await;
    });

    (cmd_tx, broadcast_rx, handle)
}

/// Encode and queue one frame. Returns false once the receiver is gone.
fn send_frame(tx: &mpsc::Sender<MatchBroadcast>, frame: &MatchFrame) -> bool {
    let data = match encode_frame(frame) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            return true;
        },
    };
    match tx.try_send(MatchBroadcast::EncodedFrame(Bytes::from(data))) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("Broadcast buffer full, dropping frame");
            true
        },
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

fn flush_events(session: &mut MatchSession, tx: &mpsc::Sender<MatchBroadcast>) -> bool {
    for event in session.drain_events() {
        if !send_frame(tx, &MatchFrame::Event(event)) {
            return false;
        }
    }
    true
}

fn send_snapshot(session: &MatchSession, tx: &mpsc::Sender<MatchBroadcast>) -> bool {
    send_frame(tx, &MatchFrame::Snapshot(Box::new(session.snapshot())))
}

/// Apply one command. `Stop` and `Snapshot` are handled by the loop.
pub fn apply_command(session: &mut MatchSession, command: &MatchCommand) -> Result<(), MatchError> {
    match command {
        MatchCommand::Join { device, index } => {
            session.player_joined(DeviceHandle::new(device.clone()), *index)?;
        },
        MatchCommand::AddPlayerCount => log_count_change(session.add_player_count()),
        MatchCommand::RemovePlayerCount => log_count_change(session.remove_player_count()),
        MatchCommand::ZoneEnter { participant } => session.zone_enter(*participant)?,
        MatchCommand::ZoneExit { participant } => session.zone_exit(*participant)?,
        MatchCommand::ForceStart => session.force_start()?,
        MatchCommand::Damage {
            participant,
            amount,
        } => {
            session.apply_damage(*participant, *amount)?;
        },
        MatchCommand::Heal {
            participant,
            amount,
        } => {
            if session.add_lives(*participant, *amount)?.is_none() {
                tracing::debug!(participant, "Heal ignored, participant is dead");
            }
        },
        MatchCommand::Dead { participant } => session.player_dead(*participant)?,
        MatchCommand::RequestState(state) => {
            session.request_state_change(*state)?;
        },
        MatchCommand::ForceState(state) => session.force_state_change(*state),
        MatchCommand::Next => {
            session.advance()?;
        },
        MatchCommand::Pause => {
            session.pause_game()?;
        },
        MatchCommand::Resume => {
            session.resume_game()?;
        },
        MatchCommand::Restart => {
            session.restart_game();
        },
        MatchCommand::Snapshot | MatchCommand::Stop => {},
    }
    Ok(())
}

fn log_count_change(change: CountChange) {
    if let CountChange::Clamped { requested, min, max } = change {
        tracing::info!(requested, min, max, "Player count already at its limit");
    }
}

async fn run_session_loop(
    mut session: MatchSession,
    config: MatchSessionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<MatchCommand>,
    broadcast_tx: mpsc::Sender<MatchBroadcast>,
) {
    let tick_rate = config.tick_rate_hz.max(1) as f32;
    let dt = 1.0 / tick_rate;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(match_id = %session.match_id(), tick_rate, "Session loop started");
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                session.tick(dt);
                if !flush_events(&mut session, &broadcast_tx) {
                    break;
                }
                if config.snapshot_interval_ticks > 0
                    && tick % u64::from(config.snapshot_interval_ticks) == 0
                    && !send_snapshot(&session, &broadcast_tx)
                {
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    MatchCommand::Stop => break,
                    MatchCommand::Snapshot => {
                        if !send_snapshot(&session, &broadcast_tx) {
                            break;
                        }
                    },
                    other => {
                        if let Err(e) = apply_command(&mut session, &other) {
                            tracing::warn!(command = ?other, error = %e, "Command rejected");
                            let rejected = MatchFrame::Rejected(RejectedMsg {
                                command: format!("{other:?}"),
                                reason: e.to_string(),
                            });
                            if !send_frame(&broadcast_tx, &rejected) {
                                break;
                            }
                        }
                        if !flush_events(&mut session, &broadcast_tx) {
                            break;
                        }
                    },
                }
            }
        }
    }

    session.dispose();
    tracing::info!(match_id = %session.match_id(), ticks = tick, "Session loop stopped");
    let _ = broadcast_tx.send(MatchBroadcast::SessionEnded).await;
}
