use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::elimination::{EliminationOutcome, EliminationRecord};
use crate::error::MatchError;
use crate::events::{EventBus, MatchEvent, MatchId, SubscriptionId};
use crate::lobby::{LobbyContext, LobbyTick};
use crate::participant::{DeviceHandle, Participant, ParticipantId};
use crate::registry::{CountChange, PlayerRegistry};
use crate::scene::{LoadRequest, SceneId, SceneTransitionGate};
use crate::spawn::{
    FixedSpawnPoints, SpawnContext, SpawnPoints, assign_scoreboard, assign_spawns, shuffle_poses,
};
use crate::state::MatchState;
use crate::timer::{Countdown, TaskHandle, TaskQueue};
use crate::zone::ZonePhase;

/// Result of a state change request that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Already in the requested state. Only the transition time was updated.
    Unchanged,
    /// `next` is the state the session settled in, which differs from the
    /// requested one when the requested state is a pass-through.
    Changed {
        previous: MatchState,
        next: MatchState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// The participant was already dead.
    Ignored,
    Damaged { lives_remaining: u32 },
    /// Last life taken. The elimination is recorded after the death delay.
    Killed,
}

/// Work deferred on the simulation clock.
#[derive(Debug, Clone, PartialEq)]
enum SessionTask {
    PlayerDead(ParticipantId),
    GameOver,
}

#[derive(Debug, Clone)]
struct PendingSceneLoad {
    scene: SceneId,
    countdown: Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SceneLoad {
    Request,
    Skip,
}

/// Serializable view of a session for status displays and the host wire
/// protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub match_id: MatchId,
    pub state: MatchState,
    pub participants: Vec<Participant>,
    pub required_count: u8,
    pub all_registered: bool,
    pub elimination_order: Vec<ParticipantId>,
    pub winner: Option<ParticipantId>,
    pub zone: Option<ZoneSnapshot>,
    pub ready_countdown: Option<f32>,
    pub active_scene: Option<SceneId>,
    pub transitioning: bool,
    pub time_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub phase: ZonePhase,
    pub occupants: usize,
    pub required: usize,
    pub progress: f32,
}

/// Owns one match from the main menu to the scoreboard and back.
///
/// Everything is driven by [`MatchSession::tick`] and the input methods; no
/// method blocks or spawns work of its own. Follow-up transitions triggered
/// by a component are applied after that component returns.
pub struct MatchSession {
    config: MatchConfig,
    state: MatchState,
    match_id: MatchId,
    registry: PlayerRegistry,
    elimination: EliminationRecord,
    lobby: Option<LobbyContext>,
    scene_gate: Option<SceneTransitionGate>,
    spawn_points: Option<Box<dyn SpawnPoints + Send>>,
    rng: StdRng,
    tasks: TaskQueue<SessionTask>,
    death_tasks: HashMap<ParticipantId, TaskHandle>,
    pending_scene: Option<PendingSceneLoad>,
    events: EventBus,
    time_scale: f32,
    clock: f64,
    last_transition_at: f64,
}

impl std::fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSession")
            .field("match_id", &self.match_id)
            .field("state", &self.state)
            .field("participants", &self.registry.len())
            .field("eliminated", &self.elimination.len())
            .field("lobby", &self.lobby.is_some())
            .field("scene_gate", &self.scene_gate.is_some())
            .field("spawn_points", &self.spawn_points.is_some())
            .field("pending_tasks", &self.tasks.len())
            .field("time_scale", &self.time_scale)
            .finish()
    }
}

impl MatchSession {
    /// A session sitting in the main menu, with a scene gate whose active
    /// scene is the one mapped to `Start`.
    pub fn new(config: MatchConfig) -> Self {
        let initial = config.scene_for(MatchState::Start);
        Self::build(config, MatchState::Start, initial)
    }

    /// Attach a session to an already loaded scene. The state is derived from
    /// the scene without running a transition.
    pub fn from_scene(config: MatchConfig, scene: SceneId) -> Self {
        let state = config.state_for_scene(&scene);
        let mut session = Self::build(config, state, Some(scene));
        if state == MatchState::Lobby {
            session.lobby = Some(LobbyContext::new(&session.config));
        }
        tracing::info!(state = %state, "Session attached to running scene");
        session
    }

    fn build(config: MatchConfig, state: MatchState, scene: Option<SceneId>) -> Self {
        let spawn_points: Option<Box<dyn SpawnPoints + Send>> = if config.spawn.points.is_empty() {
            None
        } else {
            Some(Box::new(FixedSpawnPoints(config.spawn.points.clone())))
        };
        Self {
            registry: PlayerRegistry::from_config(&config),
            scene_gate: Some(SceneTransitionGate::new(config.transition.clone(), scene)),
            spawn_points,
            config,
            state,
            match_id: MatchId::new_v4(),
            elimination: EliminationRecord::new(),
            lobby: None,
            rng: StdRng::from_os_rng(),
            tasks: TaskQueue::new(),
            death_tasks: HashMap::new(),
            pending_scene: None,
            events: EventBus::new(),
            time_scale: 1.0,
            clock: 0.0,
            last_transition_at: 0.0,
        }
    }

    pub fn with_scene_gate(mut self, gate: SceneTransitionGate) -> Self {
        self.scene_gate = Some(gate);
        self
    }

    pub fn without_scene_gate(mut self) -> Self {
        self.scene_gate = None;
        self
    }

    pub fn with_spawn_points(mut self, points: Box<dyn SpawnPoints + Send>) -> Self {
        self.spawn_points = Some(points);
        self
    }

    pub fn without_spawn_points(mut self) -> Self {
        self.spawn_points = None;
        self
    }

    /// Bound the number of events kept for [`MatchSession::drain_events`].
    /// Zero keeps none, for owners that only subscribe.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events.set_outbox_capacity(capacity);
        self
    }

    /// Deterministic spawn shuffling.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ---------------------------------------------------------------
    // State machine
    // ---------------------------------------------------------------

    /// Move to `next` if the transition table allows it.
    ///
    /// Requesting the current state is accepted and only refreshes the
    /// transition time. `GameOver` is a pass-through and settles in
    /// `ScoreBoard`. Playing goes straight to `ScoreBoard` only when the
    /// game-over state is skipped.
    pub fn request_state_change(
        &mut self,
        next: MatchState,
    ) -> Result<TransitionOutcome, MatchError> {
        if next == self.state {
            self.last_transition_at = self.clock;
            tracing::debug!(state = %next, "Already in requested state");
            return Ok(TransitionOutcome::Unchanged);
        }
        if !self.transition_allowed(next) {
            tracing::warn!(from = %self.state, to = %next, "Rejected invalid state transition");
            return Err(MatchError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let previous = self.state;
        self.apply_transition(next, SceneLoad::Request);
        if self.state == MatchState::GameOver {
            self.apply_transition(MatchState::ScoreBoard, SceneLoad::Request);
        }
        Ok(TransitionOutcome::Changed {
            previous,
            next: self.state,
        })
    }

    fn transition_allowed(&self, next: MatchState) -> bool {
        if (self.state, next) == (MatchState::Playing, MatchState::ScoreBoard) {
            return self.config.flow.skip_game_over_state;
        }
        self.state.can_transition_to(next)
    }

    /// Debug bypass: set the state without consulting the transition table
    /// and without loading a scene.
    pub fn force_state_change(&mut self, next: MatchState) {
        tracing::warn!(from = %self.state, to = %next, "Forcing state change");
        if next == self.state {
            self.last_transition_at = self.clock;
            return;
        }
        self.apply_transition(next, SceneLoad::Skip);
    }

    /// Configured successor of the current state.
    pub fn next_state(&self) -> MatchState {
        self.config.next_state(self.state)
    }

    /// Request the configured successor of the current state.
    pub fn advance(&mut self) -> Result<TransitionOutcome, MatchError> {
        self.request_state_change(self.next_state())
    }

    fn apply_transition(&mut self, next: MatchState, scene: SceneLoad) {
        let previous = self.state;
        self.leave_state(previous, next);
        self.state = next;
        self.last_transition_at = self.clock;
        if self.config.flow.log_state_transitions {
            tracing::info!(match_id = %self.match_id, from = %previous, to = %next, "State changed");
        } else {
            tracing::debug!(match_id = %self.match_id, from = %previous, to = %next, "State changed");
        }
        self.events.emit(MatchEvent::StateChanged { previous, next });
        self.enter_state(previous, next);
        let resuming = previous == MatchState::Paused && next == MatchState::Playing;
        if scene == SceneLoad::Request && !resuming {
            self.schedule_scene_for(next);
        }
    }

    fn leave_state(&mut self, previous: MatchState, next: MatchState) {
        // Delayed deaths and game over belong to the match being left
        if previous.is_in_match() && !next.is_in_match() {
            self.cancel_match_tasks();
        }
        if previous == MatchState::Lobby && next != MatchState::Lobby && self.lobby.take().is_some()
        {
            tracing::debug!("Lobby context destroyed");
        }
    }

    fn enter_state(&mut self, previous: MatchState, next: MatchState) {
        match next {
            MatchState::Lobby => self.open_lobby(),
            MatchState::Playing if previous == MatchState::Paused => {
                self.time_scale = 1.0;
                self.events.emit(MatchEvent::Resumed);
            },
            MatchState::Playing => self.begin_match(),
            MatchState::Paused => {
                self.time_scale = 0.0;
                self.events.emit(MatchEvent::Paused);
            },
            MatchState::ScoreBoard => {
                self.time_scale = 1.0;
                self.spawn(SpawnContext::ScoreBoard);
            },
            MatchState::Start | MatchState::Menu | MatchState::GameOver => {
                self.time_scale = 1.0;
            },
        }
    }

    fn open_lobby(&mut self) {
        let mut lobby = LobbyContext::new(&self.config);
        let all = self.registry.is_all_players_registered();
        let events = lobby.on_player_count_changed(all);
        self.lobby = Some(lobby);
        self.emit_player_count();
        self.events.emit_all(events);
    }

    fn cancel_match_tasks(&mut self) {
        if !self.tasks.is_empty() {
            tracing::debug!(pending = self.tasks.len(), "Cancelling delayed match tasks");
        }
        self.tasks.clear();
        self.death_tasks.clear();
    }

    fn begin_match(&mut self) {
        self.cancel_match_tasks();
        self.time_scale = 1.0;
        self.elimination.clear();
        self.registry.revive_all();
        self.match_id = MatchId::new_v4();
        let participants = self.registry.ids();
        tracing::info!(match_id = %self.match_id, players = participants.len(), "Match started");
        self.events.emit(MatchEvent::MatchStarted {
            match_id: self.match_id,
            participants,
        });
        self.spawn(SpawnContext::Arena);
    }

    fn spawn(&mut self, context: SpawnContext) {
        let Some(points) = self.spawn_points.as_ref() else {
            tracing::warn!(?context, "No spawn points attached, skipping spawn");
            return;
        };
        let mut poses = points.spawn_points();
        let assignments = match context {
            SpawnContext::Arena => {
                if self.config.spawn.randomize {
                    shuffle_poses(&mut poses, &mut self.rng);
                }
                let ids = self.registry.ids();
                if ids.len() > poses.len() {
                    tracing::warn!(
                        participants = ids.len(),
                        spawn_points = poses.len(),
                        "Not enough spawn points, some participants are not placed"
                    );
                }
                assign_spawns(&ids, &poses)
            },
            SpawnContext::ScoreBoard => assign_scoreboard(
                &self.elimination.standings(),
                &poses,
                self.config.spawn.disable_movement_on_scoreboard,
            ),
        };
        if assignments.is_empty() {
            return;
        }
        for a in &assignments {
            if let Some(p) = self.registry.get_mut(a.participant) {
                p.position = a.pose;
            }
        }
        self.events.emit(MatchEvent::ParticipantsSpawned {
            context,
            assignments,
        });
    }

    fn schedule_scene_for(&mut self, state: MatchState) {
        if !self.config.flow.auto_transition_scenes {
            return;
        }
        let Some(scene) = self.config.scene_for(state) else {
            return;
        };
        // A newer transition replaces a load that has not started yet
        if let Some(stale) = self.pending_scene.take() {
            tracing::debug!(scene = %stale.scene, "Pending scene load cancelled");
        }
        if self.scene_gate.is_none() {
            tracing::warn!(%scene, "No scene gate attached, skipping scene load");
            return;
        }

        let delay = self.config.transition_delay(state);
        if delay > 0.0 {
            self.events.emit(MatchEvent::SceneLoadScheduled {
                scene: scene.clone(),
                delay,
            });
            self.pending_scene = Some(PendingSceneLoad {
                scene,
                countdown: Countdown::new(delay),
            });
        } else {
            self.load_scene(scene);
        }
    }

    fn load_scene(&mut self, scene: SceneId) {
        let Some(gate) = self.scene_gate.as_mut() else {
            tracing::warn!(%scene, "No scene gate attached, skipping scene load");
            return;
        };
        match gate.request_load(scene.clone()) {
            LoadRequest::Started => self.events.emit(MatchEvent::SceneLoadStarted { scene }),
            LoadRequest::AlreadyInScene => {
                tracing::debug!(%scene, "Already in scene, no reload");
                self.events.emit(MatchEvent::SceneLoadSkipped { scene });
            },
            LoadRequest::Queued | LoadRequest::InFlight => {},
        }
    }

    // ---------------------------------------------------------------
    // Players
    // ---------------------------------------------------------------

    /// Register a participant. Only the lobby accepts new players.
    pub fn player_joined(
        &mut self,
        device: DeviceHandle,
        index_hint: u32,
    ) -> Result<ParticipantId, MatchError> {
        if !self.state.accepts_players() {
            return Err(MatchError::WrongState {
                operation: "player_joined",
                state: self.state,
            });
        }
        let id = self.registry.register_player(device, index_hint)?;
        if let Some(p) = self.registry.get(id) {
            self.events.emit(MatchEvent::ParticipantRegistered {
                participant: id,
                device_index: p.device_index,
                display_name: p.display_name.clone(),
            });
        }
        self.emit_player_count();
        self.notify_lobby_count();
        Ok(id)
    }

    pub fn add_player_count(&mut self) -> CountChange {
        let change = self.registry.add_player_count();
        self.after_count_change(change);
        change
    }

    pub fn remove_player_count(&mut self) -> CountChange {
        let change = self.registry.remove_player_count();
        self.after_count_change(change);
        change
    }

    fn after_count_change(&mut self, change: CountChange) {
        if let CountChange::Changed { required } = change {
            self.events.emit(MatchEvent::RequiredCountChanged {
                required: usize::from(required),
            });
            self.emit_player_count();
            self.notify_lobby_count();
        }
    }

    fn emit_player_count(&mut self) {
        self.events.emit(MatchEvent::PlayerCountChanged {
            current: self.registry.len(),
            required: usize::from(self.registry.required_count()),
        });
    }

    fn notify_lobby_count(&mut self) {
        let all = self.registry.is_all_players_registered();
        if let Some(lobby) = self.lobby.as_mut() {
            let events = lobby.on_player_count_changed(all);
            self.events.emit_all(events);
        }
    }

    /// Record an elimination. When only one participant is left the
    /// leaderboard is finalized and the match ends.
    pub fn player_dead(&mut self, id: ParticipantId) -> Result<(), MatchError> {
        if !self.state.is_in_match() {
            return Err(MatchError::WrongState {
                operation: "player_dead",
                state: self.state,
            });
        }
        let roster = self.registry.ids();
        let outcome = self.elimination.record(id, &roster)?;
        if let Some(handle) = self.death_tasks.remove(&id)
            && self.tasks.cancel(handle)
        {
            tracing::debug!(participant = id, "Pending delayed elimination superseded");
        }
        if let Some(p) = self.registry.get_mut(id) {
            p.alive = false;
            p.lives = 0;
        }

        match outcome {
            EliminationOutcome::Recorded { place } => {
                self.events.emit(MatchEvent::ParticipantEliminated {
                    participant: id,
                    place,
                });
            },
            EliminationOutcome::Finalized {
                place,
                winner,
                standings,
            } => {
                self.events.emit(MatchEvent::ParticipantEliminated {
                    participant: id,
                    place,
                });
                self.events
                    .emit(MatchEvent::LeaderboardFinalized { winner, standings });
                if self.config.flow.auto_restart_on_game_over {
                    self.tasks
                        .schedule(self.config.flow.game_over_delay, SessionTask::GameOver);
                } else {
                    self.end_match();
                }
            },
        }
        Ok(())
    }

    /// Remove lives from a participant. Losing the last one schedules its
    /// elimination after the death delay.
    pub fn apply_damage(
        &mut self,
        id: ParticipantId,
        amount: u32,
    ) -> Result<DamageOutcome, MatchError> {
        if self.state != MatchState::Playing {
            return Err(MatchError::WrongState {
                operation: "apply_damage",
                state: self.state,
            });
        }
        let participant = self
            .registry
            .get_mut(id)
            .ok_or(MatchError::UnknownParticipant(id))?;
        if !participant.alive {
            return Ok(DamageOutcome::Ignored);
        }
        let killed = participant.take_damage(amount);
        let lives_remaining = participant.lives;
        tracing::debug!(participant = id, lives_remaining, "Participant damaged");
        self.events.emit(MatchEvent::ParticipantDamaged {
            participant: id,
            lives_remaining,
        });

        if killed {
            let handle = self
                .tasks
                .schedule(self.config.life.death_delay, SessionTask::PlayerDead(id));
            self.death_tasks.insert(id, handle);
            return Ok(DamageOutcome::Killed);
        }
        Ok(DamageOutcome::Damaged { lives_remaining })
    }

    /// Grant extra lives to a living participant. Returns the new life count,
    /// or `None` when the participant is already dead.
    pub fn add_lives(
        &mut self,
        id: ParticipantId,
        amount: u32,
    ) -> Result<Option<u32>, MatchError> {
        if self.state != MatchState::Playing {
            return Err(MatchError::WrongState {
                operation: "add_lives",
                state: self.state,
            });
        }
        let participant = self
            .registry
            .get_mut(id)
            .ok_or(MatchError::UnknownParticipant(id))?;
        if !participant.add_lives(amount) {
            return Ok(None);
        }
        let lives_remaining = participant.lives;
        tracing::debug!(participant = id, lives_remaining, "Participant healed");
        self.events.emit(MatchEvent::ParticipantHealed {
            participant: id,
            lives_remaining,
        });
        Ok(Some(lives_remaining))
    }

    fn end_match(&mut self) {
        if self.state == MatchState::Paused {
            self.apply_transition(MatchState::Playing, SceneLoad::Request);
        }
        let target = self.config.next_state(MatchState::Playing);
        if let Err(e) = self.request_state_change(target) {
            tracing::warn!(error = %e, "Could not end match");
        }
    }

    // ---------------------------------------------------------------
    // Lobby
    // ---------------------------------------------------------------

    /// Skip the readiness checks and start the match.
    pub fn force_start(&mut self) -> Result<(), MatchError> {
        if !self.config.lobby.enable_force_start {
            return Err(MatchError::ForceStartDisabled);
        }
        if self.state != MatchState::Lobby {
            return Err(MatchError::WrongState {
                operation: "force_start",
                state: self.state,
            });
        }
        let lobby = self
            .lobby
            .as_mut()
            .ok_or(MatchError::MissingCollaborator("lobby"))?;
        tracing::info!("Force start");
        let tick = lobby.force_start();
        self.apply_lobby_tick(tick);
        Ok(())
    }

    pub fn zone_enter(&mut self, id: ParticipantId) -> Result<(), MatchError> {
        let registered = self.registry.len();
        let known = self.registry.contains(id);
        let lobby = self
            .lobby
            .as_mut()
            .ok_or(MatchError::MissingCollaborator("lobby"))?;
        if !known {
            return Err(MatchError::UnknownParticipant(id));
        }
        let tick = lobby.zone_enter(id, registered)?;
        self.apply_lobby_tick(tick);
        Ok(())
    }

    pub fn zone_exit(&mut self, id: ParticipantId) -> Result<(), MatchError> {
        let registered = self.registry.len();
        let known = self.registry.contains(id);
        let lobby = self
            .lobby
            .as_mut()
            .ok_or(MatchError::MissingCollaborator("lobby"))?;
        if !known {
            return Err(MatchError::UnknownParticipant(id));
        }
        let tick = lobby.zone_exit(id, registered)?;
        self.apply_lobby_tick(tick);
        Ok(())
    }

    fn apply_lobby_tick(&mut self, tick: LobbyTick) {
        self.events.emit_all(tick.events);
        if tick.start_requested && self.state == MatchState::Lobby {
            let next = self.config.next_state(MatchState::Lobby);
            if self.registry.is_empty() {
                tracing::warn!("Starting a match with no participants");
            }
            if let Err(e) = self.request_state_change(next) {
                tracing::warn!(error = %e, "Lobby could not start the match");
            }
        }
    }

    // ---------------------------------------------------------------
    // Flow control
    // ---------------------------------------------------------------

    pub fn pause_game(&mut self) -> Result<TransitionOutcome, MatchError> {
        if !self.state.is_in_match() {
            return Err(MatchError::WrongState {
                operation: "pause_game",
                state: self.state,
            });
        }
        self.request_state_change(MatchState::Paused)
    }

    pub fn resume_game(&mut self) -> Result<TransitionOutcome, MatchError> {
        if !self.state.is_in_match() {
            return Err(MatchError::WrongState {
                operation: "resume_game",
                state: self.state,
            });
        }
        self.request_state_change(MatchState::Playing)
    }

    /// Throw the match away and go back to the main menu, or to an empty
    /// lobby when configured. Safe from every state.
    pub fn restart_game(&mut self) -> TransitionOutcome {
        self.cancel_match_tasks();
        self.pending_scene = None;
        for participant in self.registry.clear() {
            self.events.emit(MatchEvent::ParticipantRemoved { participant });
        }
        self.elimination.clear();
        if self.lobby.take().is_some() {
            tracing::debug!("Lobby context destroyed");
        }
        self.time_scale = 1.0;
        self.match_id = MatchId::new_v4();

        let target = if self.config.flow.restart_to_lobby {
            MatchState::Lobby
        } else {
            MatchState::Start
        };
        tracing::info!(match_id = %self.match_id, from = %self.state, to = %target, "Restarting");

        let previous = self.state;
        if previous == target {
            self.last_transition_at = self.clock;
            if target == MatchState::Lobby {
                self.open_lobby();
            }
            self.schedule_scene_for(target);
            return TransitionOutcome::Unchanged;
        }
        self.apply_transition(target, SceneLoad::Request);
        TransitionOutcome::Changed {
            previous,
            next: target,
        }
    }

    /// Advance the session by `dt` seconds of real time.
    ///
    /// Order: scene gate and pending scene load (real time), delayed tasks,
    /// then the lobby (simulation time, frozen while paused).
    pub fn tick(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.clock += f64::from(dt);

        if let Some(gate) = self.scene_gate.as_mut() {
            let events = gate.tick(dt);
            self.events.emit_all(events);
        }

        let due = self
            .pending_scene
            .as_mut()
            .is_some_and(|p| p.countdown.tick(dt));
        if due && let Some(pending) = self.pending_scene.take() {
            self.load_scene(pending.scene);
        }

        let scaled = dt * self.time_scale;
        for task in self.tasks.tick(scaled) {
            self.run_task(task);
        }

        let registered = self.registry.len();
        let all = self.registry.is_all_players_registered();
        if let Some(lobby) = self.lobby.as_mut() {
            let tick = lobby.tick(scaled, registered, all);
            self.apply_lobby_tick(tick);
        }
    }

    fn run_task(&mut self, task: SessionTask) {
        match task {
            SessionTask::PlayerDead(id) => {
                self.death_tasks.remove(&id);
                if let Err(e) = self.player_dead(id) {
                    tracing::warn!(participant = id, error = %e, "Delayed elimination dropped");
                }
            },
            SessionTask::GameOver => {
                if self.state.is_in_match() {
                    self.end_match();
                }
            },
        }
    }

    /// Tear down: cancel delayed work, drop the lobby and every subscriber.
    pub fn dispose(&mut self) {
        self.cancel_match_tasks();
        self.pending_scene = None;
        self.lobby = None;
        if let Some(gate) = self.scene_gate.as_mut() {
            gate.cancel_all();
        }
        self.events.clear_subscribers();
        tracing::debug!(match_id = %self.match_id, "Session disposed");
    }

    // ---------------------------------------------------------------
    // Observers and accessors
    // ---------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        self.events.drain()
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn elimination(&self) -> &EliminationRecord {
        &self.elimination
    }

    pub fn lobby(&self) -> Option<&LobbyContext> {
        self.lobby.as_ref()
    }

    pub fn scene_gate(&self) -> Option<&SceneTransitionGate> {
        self.scene_gate.as_ref()
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Real seconds since the session was created.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn last_transition_at(&self) -> f64 {
        self.last_transition_at
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.len() + usize::from(self.pending_scene.is_some())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let registered = self.registry.len();
        let zone = self.lobby.as_ref().and_then(LobbyContext::zone).map(|z| ZoneSnapshot {
            phase: z.phase(),
            occupants: z.occupant_count(),
            required: z.required_players(registered),
            progress: z.progress(),
        });
        SessionSnapshot {
            match_id: self.match_id,
            state: self.state,
            participants: self.registry.iter().cloned().collect(),
            required_count: self.registry.required_count(),
            all_registered: self.registry.is_all_players_registered(),
            elimination_order: self.elimination.order().to_vec(),
            winner: self.elimination.winner(),
            zone,
            ready_countdown: self
                .lobby
                .as_ref()
                .and_then(LobbyContext::ready_countdown_remaining),
            active_scene: self
                .scene_gate
                .as_ref()
                .and_then(|g| g.active_scene().cloned()),
            transitioning: self
                .scene_gate
                .as_ref()
                .is_some_and(SceneTransitionGate::is_transitioning),
            time_scale: self.time_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_helpers::{
        count_events, instant_config, join_players, lobby_session, playing_session, run_for,
    };

    fn state_changes(events: &[MatchEvent]) -> Vec<(MatchState, MatchState)> {
        events
            .iter()
            .filter_map(|e| match e {
                MatchEvent::StateChanged { previous, next } => Some((*previous, *next)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn two_joined_players_fill_required_two() {
        let mut session = lobby_session(instant_config());
        session.add_player_count();
        join_players(&mut session, 2);
        assert!(session.registry().is_all_players_registered());
        let events = session.drain_events();
        assert!(events.contains(&MatchEvent::PlayerCountChanged {
            current: 2,
            required: 2
        }));
    }

    #[test]
    fn zone_validation_starts_the_match() {
        let mut session = lobby_session(instant_config());
        let ids = join_players(&mut session, 4);
        for id in &ids {
            session.zone_enter(*id).unwrap();
        }
        run_for(&mut session, 4.0);
        let events = session.drain_events();
        assert_eq!(count_events(&events, |e| *e == MatchEvent::ValidationComplete), 1);
        assert_eq!(session.state(), MatchState::Playing);
    }

    #[test]
    fn elimination_order_and_single_game_over() {
        let mut session = playing_session(instant_config(), 4);
        let ids = session.registry().ids();
        session.drain_events();

        for &i in &[1usize, 3, 0] {
            session.player_dead(ids[i]).unwrap();
        }
        assert_eq!(
            session.elimination().order(),
            &[ids[1], ids[3], ids[0], ids[2]]
        );

        let events = session.drain_events();
        assert_eq!(
            count_events(&events, |e| matches!(e, MatchEvent::LeaderboardFinalized { .. })),
            1
        );
        assert_eq!(
            state_changes(&events),
            vec![
                (MatchState::Playing, MatchState::GameOver),
                (MatchState::GameOver, MatchState::ScoreBoard),
            ]
        );
        assert_eq!(session.state(), MatchState::ScoreBoard);
        assert_eq!(
            session.player_dead(ids[2]),
            Err(MatchError::WrongState {
                operation: "player_dead",
                state: MatchState::ScoreBoard
            })
        );
    }

    #[test]
    fn restart_mid_match_clears_everything() {
        let mut session = playing_session(instant_config(), 3);
        let ids = session.registry().ids();
        session.player_dead(ids[0]).unwrap();

        assert_eq!(
            session.restart_game(),
            TransitionOutcome::Changed {
                previous: MatchState::Playing,
                next: MatchState::Start
            }
        );
        assert!(session.registry().is_empty());
        assert!(session.elimination().is_empty());
        assert!(session.lobby().is_none());
        assert_eq!(session.state(), MatchState::Start);
        let removed = count_events(&session.drain_events(), |e| {
            matches!(e, MatchEvent::ParticipantRemoved { .. })
        });
        assert_eq!(removed, 3);
    }

    #[test]
    fn restart_is_safe_from_every_state() {
        for state in MatchState::ALL {
            let mut session = MatchSession::new(instant_config())
                .without_scene_gate()
                .without_spawn_points();
            session.force_state_change(state);
            session.restart_game();
            assert_eq!(session.state(), MatchState::Start);
            assert!(session.lobby().is_none());
        }
    }

    #[test]
    fn restart_to_lobby_opens_fresh_lobby() {
        let mut cfg = instant_config();
        cfg.flow.restart_to_lobby = true;
        let mut session = lobby_session(cfg);
        join_players(&mut session, 2);
        assert_eq!(session.restart_game(), TransitionOutcome::Unchanged);
        assert_eq!(session.state(), MatchState::Lobby);
        assert!(session.lobby().is_some());
        assert!(session.registry().is_empty());
    }

    #[test]
    fn invalid_transition_keeps_state() {
        let mut session = MatchSession::new(instant_config());
        let err = session.request_state_change(MatchState::Playing).unwrap_err();
        assert_eq!(
            err,
            MatchError::InvalidTransition {
                from: MatchState::Start,
                to: MatchState::Playing
            }
        );
        assert_eq!(session.state(), MatchState::Start);
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn same_state_request_only_touches_transition_time() {
        let mut session = MatchSession::new(instant_config());
        session.tick(1.0);
        assert_eq!(
            session.request_state_change(MatchState::Start),
            Ok(TransitionOutcome::Unchanged)
        );
        assert!((session.last_transition_at() - 1.0).abs() < 1e-6);
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn entering_lobby_loads_lobby_scene() {
        let mut session = MatchSession::new(instant_config());
        session.request_state_change(MatchState::Lobby).unwrap();
        session.tick(0.0);
        let events = session.drain_events();
        assert!(events.contains(&MatchEvent::SceneLoadStarted {
            scene: SceneId::new("LobbyScene")
        }));
        assert!(events.contains(&MatchEvent::SceneLoadCompleted {
            scene: SceneId::new("LobbyScene")
        }));
        assert!(session.lobby().is_some());
    }

    #[test]
    fn delayed_scene_load_is_replaced_by_newer_transition() {
        let mut cfg = instant_config();
        cfg.flow.default_transition_delay = 0.5;
        let mut session = MatchSession::new(cfg);
        session.request_state_change(MatchState::Lobby).unwrap();
        session.tick(0.2);
        session.request_state_change(MatchState::Start).unwrap();
        run_for(&mut session, 1.0);

        let events = session.drain_events();
        assert_eq!(
            count_events(&events, |e| matches!(e, MatchEvent::SceneLoadStarted { .. })),
            0,
            "MainMenu is already active and the lobby load was cancelled"
        );
        assert!(events.contains(&MatchEvent::SceneLoadSkipped {
            scene: SceneId::new("MainMenu")
        }));
    }

    #[test]
    fn from_scene_derives_state() {
        let cfg = instant_config();
        let session = MatchSession::from_scene(cfg.clone(), SceneId::new("LobbyScene"));
        assert_eq!(session.state(), MatchState::Lobby);
        assert!(session.lobby().is_some());
        let session = MatchSession::from_scene(cfg, SceneId::new("Credits"));
        assert_eq!(session.state(), MatchState::Start);
    }

    #[test]
    fn joins_rejected_outside_lobby() {
        let mut session = MatchSession::new(instant_config());
        let err = session
            .player_joined(DeviceHandle::new("gamepad:0"), 0)
            .unwrap_err();
        assert!(matches!(err, MatchError::WrongState { .. }));
    }

    #[test]
    fn zone_calls_need_a_lobby() {
        let mut session = MatchSession::new(instant_config());
        assert_eq!(
            session.zone_enter(1),
            Err(MatchError::MissingCollaborator("lobby"))
        );
        let mut session = lobby_session(instant_config());
        assert_eq!(session.zone_enter(42), Err(MatchError::UnknownParticipant(42)));
    }

    #[test]
    fn force_start_can_be_disabled() {
        let mut cfg = instant_config();
        cfg.lobby.enable_force_start = false;
        let mut session = lobby_session(cfg);
        join_players(&mut session, 2);
        assert_eq!(session.force_start(), Err(MatchError::ForceStartDisabled));
        assert_eq!(session.state(), MatchState::Lobby);
    }

    #[test]
    fn auto_start_countdown() {
        let mut cfg = instant_config();
        cfg.lobby.auto_start_when_ready = true;
        cfg.zone.enabled = false;
        let mut session = lobby_session(cfg);
        session.add_player_count();
        join_players(&mut session, 2);
        run_for(&mut session, 2.0);
        assert_eq!(session.state(), MatchState::Lobby);
        run_for(&mut session, 1.5);
        assert_eq!(session.state(), MatchState::Playing);
    }

    #[test]
    fn damage_kills_after_death_delay() {
        let mut cfg = instant_config();
        cfg.life.death_delay = 0.5;
        let mut session = playing_session(cfg, 3);
        let ids = session.registry().ids();

        assert_eq!(
            session.apply_damage(ids[0], 2),
            Ok(DamageOutcome::Damaged { lives_remaining: 1 })
        );
        assert_eq!(session.apply_damage(ids[0], 1), Ok(DamageOutcome::Killed));
        assert_eq!(session.apply_damage(ids[0], 1), Ok(DamageOutcome::Ignored));
        assert!(session.elimination().is_empty());

        run_for(&mut session, 0.6);
        assert_eq!(session.elimination().order(), &[ids[0]]);
        assert_eq!(session.registry().alive_count(), 2);
    }

    #[test]
    fn pause_freezes_death_delay() {
        let mut cfg = instant_config();
        cfg.life.death_delay = 0.5;
        let mut session = playing_session(cfg, 3);
        let ids = session.registry().ids();
        session.apply_damage(ids[0], 3).unwrap();

        session.pause_game().unwrap();
        assert_eq!(session.time_scale(), 0.0);
        run_for(&mut session, 5.0);
        assert!(session.elimination().is_empty());

        session.resume_game().unwrap();
        run_for(&mut session, 0.6);
        assert_eq!(session.elimination().len(), 1);

        let events = session.drain_events();
        assert!(events.contains(&MatchEvent::Paused));
        assert!(events.contains(&MatchEvent::Resumed));
    }

    #[test]
    fn delayed_game_over() {
        let mut cfg = instant_config();
        cfg.flow.auto_restart_on_game_over = true;
        cfg.flow.game_over_delay = 2.0;
        let mut session = playing_session(cfg, 2);
        let ids = session.registry().ids();
        session.player_dead(ids[0]).unwrap();
        assert_eq!(session.state(), MatchState::Playing);

        run_for(&mut session, 1.0);
        assert_eq!(session.state(), MatchState::Playing);
        run_for(&mut session, 1.1);
        assert_eq!(session.state(), MatchState::ScoreBoard);
        assert_eq!(session.next_state(), MatchState::Start);
    }

    #[test]
    fn skip_game_over_goes_straight_to_scoreboard() {
        let mut cfg = instant_config();
        cfg.flow.skip_game_over_state = true;
        let mut session = playing_session(cfg, 2);
        let ids = session.registry().ids();
        session.drain_events();
        session.player_dead(ids[1]).unwrap();
        assert_eq!(
            state_changes(&session.drain_events()),
            vec![(MatchState::Playing, MatchState::ScoreBoard)]
        );
    }

    #[test]
    fn scoreboard_spawns_winner_first() {
        let mut session = playing_session(instant_config(), 3);
        let ids = session.registry().ids();
        session.drain_events();
        session.player_dead(ids[0]).unwrap();
        session.player_dead(ids[2]).unwrap();

        let events = session.drain_events();
        let spawned = events.iter().find_map(|e| match e {
            MatchEvent::ParticipantsSpawned {
                context: SpawnContext::ScoreBoard,
                assignments,
            } => Some(assignments.clone()),
            _ => None,
        });
        let spawned = spawned.expect("scoreboard spawn");
        assert_eq!(spawned[0].participant, ids[1]);
        assert!(spawned[0].winner);
        assert!(spawned.iter().all(|a| !a.movement_enabled));
    }

    #[test]
    fn arena_spawn_follows_join_order() {
        let mut session = lobby_session(instant_config());
        let ids = join_players(&mut session, 2);
        session.force_start().unwrap();
        let events = session.drain_events();
        let assignments = events
            .iter()
            .find_map(|e| match e {
                MatchEvent::ParticipantsSpawned {
                    context: SpawnContext::Arena,
                    assignments,
                } => Some(assignments.clone()),
                _ => None,
            })
            .expect("arena spawn");
        let placed: Vec<_> = assignments.iter().map(|a| a.participant).collect();
        assert_eq!(placed, ids);
        assert!(events.iter().any(|e| matches!(e, MatchEvent::MatchStarted { .. })));
    }

    #[test]
    fn missing_spawn_points_skip_spawning() {
        let mut session = lobby_session(instant_config()).without_spawn_points();
        join_players(&mut session, 2);
        session.force_start().unwrap();
        assert_eq!(session.state(), MatchState::Playing);
        let events = session.drain_events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, MatchEvent::ParticipantsSpawned { .. })));
    }

    #[test]
    fn subscribers_see_state_changes_until_disposed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut session = MatchSession::new(instant_config());
        session.subscribe(move |e| {
            if let MatchEvent::StateChanged { next, .. } = e {
                sink.lock().unwrap().push(*next);
            }
        });
        session.request_state_change(MatchState::Lobby).unwrap();
        session.dispose();
        session.request_state_change(MatchState::Start).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![MatchState::Lobby]);
        assert!(session.lobby().is_none());
    }

    #[test]
    fn snapshot_reports_zone_progress() {
        let mut session = lobby_session(instant_config());
        let ids = join_players(&mut session, 2);
        session.zone_enter(ids[0]).unwrap();
        session.zone_enter(ids[1]).unwrap();
        run_for(&mut session, 1.5);

        let snap = session.snapshot();
        assert_eq!(snap.state, MatchState::Lobby);
        assert_eq!(snap.participants.len(), 2);
        let zone = snap.zone.expect("zone snapshot");
        assert_eq!(zone.phase, ZonePhase::Validating);
        assert_eq!(zone.occupants, 2);
        assert!(zone.progress > 0.4 && zone.progress < 0.6);
    }

    #[test]
    fn count_change_resets_ready_countdown() {
        let mut cfg = instant_config();
        cfg.lobby.auto_start_when_ready = true;
        cfg.zone.enabled = false;
        let mut session = lobby_session(cfg);
        join_players(&mut session, 1);
        run_for(&mut session, 1.0);
        session.drain_events();

        assert_eq!(session.add_player_count(), CountChange::Changed { required: 2 });
        let events = session.drain_events();
        assert!(events.contains(&MatchEvent::ReadyCountdownReset));
        run_for(&mut session, 5.0);
        assert_eq!(session.state(), MatchState::Lobby);
    }

    fn rematch(session: &mut MatchSession) {
        session.request_state_change(MatchState::Lobby).unwrap();
        session.force_start().unwrap();
        assert_eq!(session.state(), MatchState::Playing);
        session.drain_events();
    }

    #[test]
    fn pending_death_does_not_carry_into_rematch() {
        let mut cfg = instant_config();
        cfg.life.death_delay = 0.5;
        let mut session = playing_session(cfg, 3);
        let ids = session.registry().ids();

        assert_eq!(session.apply_damage(ids[0], 3), Ok(DamageOutcome::Killed));
        session.player_dead(ids[1]).unwrap();
        session.player_dead(ids[2]).unwrap();
        assert_eq!(session.state(), MatchState::ScoreBoard);
        assert_eq!(session.elimination().winner(), Some(ids[0]));
        assert_eq!(session.pending_task_count(), 0);

        rematch(&mut session);
        run_for(&mut session, 1.0);
        assert!(session.elimination().is_empty());
        assert_eq!(session.registry().alive_count(), 3);
        assert_eq!(session.state(), MatchState::Playing);
    }

    #[test]
    fn pending_game_over_does_not_end_rematch() {
        let mut cfg = instant_config();
        cfg.flow.auto_restart_on_game_over = true;
        cfg.flow.game_over_delay = 2.0;
        let mut session = playing_session(cfg, 2);
        let ids = session.registry().ids();
        session.player_dead(ids[0]).unwrap();
        assert_eq!(session.state(), MatchState::Playing);

        session.force_state_change(MatchState::ScoreBoard);
        rematch(&mut session);
        run_for(&mut session, 3.0);
        assert_eq!(session.state(), MatchState::Playing);
        assert!(session.elimination().is_empty());
    }

    #[test]
    fn direct_elimination_supersedes_pending_death() {
        let mut cfg = instant_config();
        cfg.life.death_delay = 0.5;
        let mut session = playing_session(cfg, 3);
        let ids = session.registry().ids();

        session.apply_damage(ids[0], 3).unwrap();
        session.player_dead(ids[0]).unwrap();
        assert_eq!(session.pending_task_count(), 0);
        run_for(&mut session, 1.0);
        assert_eq!(session.elimination().order(), &[ids[0]]);
    }

    #[test]
    fn scoreboard_mid_match_needs_skipped_game_over() {
        let mut session = playing_session(instant_config(), 2);
        assert_eq!(
            session.request_state_change(MatchState::ScoreBoard),
            Err(MatchError::InvalidTransition {
                from: MatchState::Playing,
                to: MatchState::ScoreBoard
            })
        );
        assert_eq!(session.state(), MatchState::Playing);

        let mut cfg = instant_config();
        cfg.flow.skip_game_over_state = true;
        let mut session = playing_session(cfg, 2);
        assert!(session.request_state_change(MatchState::ScoreBoard).is_ok());
        assert_eq!(session.state(), MatchState::ScoreBoard);
    }

    #[test]
    fn resume_does_not_reload_arena_scene() {
        let mut cfg = instant_config();
        cfg.flow.default_transition_delay = 0.5;
        let mut session = playing_session(cfg, 2);
        run_for(&mut session, 1.0);
        assert_eq!(
            session.scene_gate().and_then(|g| g.active_scene()),
            Some(&SceneId::new("InGame"))
        );
        session.drain_events();

        session.pause_game().unwrap();
        session.resume_game().unwrap();
        run_for(&mut session, 1.0);
        let events = session.drain_events();
        assert!(events.contains(&MatchEvent::Resumed));
        assert_eq!(
            count_events(&events, |e| matches!(
                e,
                MatchEvent::SceneLoadScheduled { .. } | MatchEvent::SceneLoadSkipped { .. }
            )),
            0
        );
    }

    #[test]
    fn add_lives_only_for_living_participants() {
        let mut session = playing_session(instant_config(), 3);
        let ids = session.registry().ids();
        assert_eq!(session.add_lives(ids[0], 2), Ok(Some(5)));
        assert!(session.drain_events().contains(&MatchEvent::ParticipantHealed {
            participant: ids[0],
            lives_remaining: 5
        }));

        session.player_dead(ids[1]).unwrap();
        assert_eq!(session.add_lives(ids[1], 1), Ok(None));
        assert_eq!(session.add_lives(99, 1), Err(MatchError::UnknownParticipant(99)));

        session.pause_game().unwrap();
        assert!(matches!(
            session.add_lives(ids[0], 1),
            Err(MatchError::WrongState { .. })
        ));
    }

    #[test]
    fn subscriber_only_session_buffers_nothing() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let mut session = MatchSession::new(instant_config()).with_event_capacity(0);
        session.subscribe(move |_| *sink.lock().unwrap() += 1);
        session.request_state_change(MatchState::Lobby).unwrap();
        session.tick(0.0);
        assert!(*seen.lock().unwrap() > 0);
        assert!(session.drain_events().is_empty());
    }
}
