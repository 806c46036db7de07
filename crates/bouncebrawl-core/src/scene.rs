use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TransitionConfig;
use crate::events::MatchEvent;

/// Name of a loadable scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the gate did with a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
    /// The gate was idle and began fading out.
    Started,
    /// Another load is in flight; this one runs after it. A later request
    /// replaces an earlier queued one.
    Queued,
    /// The requested scene is the one currently being loaded.
    InFlight,
    /// Already in the requested scene. Nothing is loaded.
    AlreadyInScene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPhase {
    Idle,
    FadingOut,
    Loading,
    FadingIn,
}

#[derive(Debug, Clone)]
struct ActiveLoad {
    scene: SceneId,
    phase: TransitionPhase,
    elapsed: f32,
}

fn phase_duration(timing: &TransitionConfig, phase: TransitionPhase) -> f32 {
    match phase {
        TransitionPhase::Idle => 0.0,
        TransitionPhase::FadingOut => timing.fade_out_duration,
        TransitionPhase::Loading => timing.minimum_loading_time,
        TransitionPhase::FadingIn => timing.fade_in_duration,
    }
}

/// Serializes scene loads: one fade-out, load, fade-in timeline at a time.
///
/// Driven with unscaled time so fades keep running while the match is
/// paused.
#[derive(Debug, Clone)]
pub struct SceneTransitionGate {
    timing: TransitionConfig,
    active: Option<SceneId>,
    current: Option<ActiveLoad>,
    queued: Option<SceneId>,
}

impl SceneTransitionGate {
    pub fn new(timing: TransitionConfig, initial: Option<SceneId>) -> Self {
        Self {
            timing,
            active: initial,
            current: None,
            queued: None,
        }
    }

    pub fn request_load(&mut self, scene: SceneId) -> LoadRequest {
        if let Some(load) = &self.current {
            if load.scene == scene {
                // Latest request wins, and the latest is what is loading now
                self.queued = None;
                return LoadRequest::InFlight;
            }
            tracing::debug!(%scene, loading = %load.scene, "Scene load queued");
            self.queued = Some(scene);
            return LoadRequest::Queued;
        }

        if self.active.as_ref() == Some(&scene) {
            return LoadRequest::AlreadyInScene;
        }

        tracing::info!(%scene, "Scene load started");
        self.begin(scene);
        LoadRequest::Started
    }

    fn begin(&mut self, scene: SceneId) {
        self.current = Some(ActiveLoad {
            scene,
            phase: TransitionPhase::FadingOut,
            elapsed: 0.0,
        });
    }

    /// Advance the timeline. Leftover time carries into the next phase, so a
    /// zero-length timeline finishes within a single tick.
    pub fn tick(&mut self, dt: f32) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        let mut budget = dt.max(0.0);

        loop {
            if self.current.is_none() {
                let Some(next) = self.queued.take() else {
                    break;
                };
                if self.active.as_ref() == Some(&next) {
                    events.push(MatchEvent::SceneLoadSkipped { scene: next });
                } else {
                    tracing::info!(scene = %next, "Queued scene load started");
                    events.push(MatchEvent::SceneLoadStarted { scene: next.clone() });
                    self.begin(next);
                }
                continue;
            }

            let Some(load) = self.current.as_mut() else {
                break;
            };
            let needed = (phase_duration(&self.timing, load.phase) - load.elapsed).max(0.0);
            if budget < needed {
                load.elapsed += budget;
                break;
            }
            budget -= needed;
            load.elapsed = 0.0;

            match load.phase {
                TransitionPhase::FadingOut => load.phase = TransitionPhase::Loading,
                TransitionPhase::Loading => {
                    self.active = Some(load.scene.clone());
                    load.phase = TransitionPhase::FadingIn;
                    events.push(MatchEvent::SceneActivated {
                        scene: load.scene.clone(),
                    });
                },
                TransitionPhase::FadingIn | TransitionPhase::Idle => {
                    let scene = load.scene.clone();
                    self.current = None;
                    tracing::info!(%scene, "Scene load completed");
                    events.push(MatchEvent::SceneLoadCompleted { scene });
                },
            }
        }

        events
    }

    pub fn is_transitioning(&self) -> bool {
        self.current.is_some()
    }

    pub fn active_scene(&self) -> Option<&SceneId> {
        self.active.as_ref()
    }

    /// Scene currently being loaded.
    pub fn loading_scene(&self) -> Option<&SceneId> {
        self.current.as_ref().map(|l| &l.scene)
    }

    pub fn queued(&self) -> Option<&SceneId> {
        self.queued.as_ref()
    }

    pub fn phase(&self) -> TransitionPhase {
        self.current
            .as_ref()
            .map_or(TransitionPhase::Idle, |l| l.phase)
    }

    /// Fraction of the in-flight timeline already played, `None` when idle.
    pub fn progress(&self) -> Option<f32> {
        let load = self.current.as_ref()?;
        let total = self.timing.total();
        if total <= 0.0 {
            return Some(1.0);
        }
        let done = match load.phase {
            TransitionPhase::Idle | TransitionPhase::FadingOut => 0.0,
            TransitionPhase::Loading => self.timing.fade_out_duration,
            TransitionPhase::FadingIn => {
                self.timing.fade_out_duration + self.timing.minimum_loading_time
            },
        };
        Some(((done + load.elapsed) / total).clamp(0.0, 1.0))
    }

    /// Drop the in-flight and queued loads. The active scene is kept.
    pub fn cancel_all(&mut self) {
        self.current = None;
        self.queued = None;
    }
}
