//! Cross-fade between the outgoing and incoming panorama.
//!
//! At most two panoramas are live: `old`, fully opaque and drawn first, and
//! `new`, fading in on top of it. Once `new` is opaque it replaces `old`.

use crate::scene::{ObjectId, Scene, SceneObject};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeProgress {
    /// Nothing is fading.
    Idle,
    /// Opacity of the incoming panorama, in `[0, 1)`.
    Fading(f32),
    /// The incoming panorama became the current one on this tick.
    Promoted(ObjectId),
}

#[derive(Debug)]
pub struct FadeState {
    new: Option<ObjectId>,
    old: Option<ObjectId>,
    started_at: Instant,
    /// Request token of the most recently installed panorama.
    installed_token: u64,
}

impl Default for FadeState {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl FadeState {
    pub fn new(now: Instant) -> Self {
        Self {
            new: None,
            old: None,
            started_at: now,
            installed_token: 0,
        }
    }

    pub fn incoming(&self) -> Option<ObjectId> {
        self.new
    }

    pub fn current(&self) -> Option<ObjectId> {
        self.old
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn installed_token(&self) -> u64 {
        self.installed_token
    }

    /// Whether a result carrying `token` would still be installed.
    pub fn is_fresh(&self, token: u64) -> bool {
        token > self.installed_token
    }

    /// Adds `object` as the incoming panorama and restarts the fade clock.
    ///
    /// Returns `None` and drops the object if a newer request already
    /// installed its panorama. A previous incoming panorama that hadn't
    /// finished fading is removed right away, so the scene never holds more
    /// than `old` and `new` even when nothing ticks.
    pub fn install(
        &mut self,
        scene: &mut Scene,
        token: u64,
        object: SceneObject,
        now: Instant,
    ) -> Option<ObjectId> {
        if !self.is_fresh(token) {
            return None;
        }
        self.installed_token = token;
        if let Some(superseded) = self.new.take() {
            scene.remove(superseded);
        }
        self.new = Some(scene.add(object));
        self.started_at = now;
        self.new
    }

    fn prune(&self, scene: &mut Scene) {
        let (new, old) = (self.new, self.old);
        scene.retain(|o| !o.is_panorama() || Some(o.id) == new || Some(o.id) == old);
    }

    fn promote(&mut self, scene: &mut Scene, id: ObjectId) {
        if let Some(old) = self.old.take() {
            scene.remove(old);
        }
        if let Some(o) = scene.get_mut(id) {
            o.set_opacity(1.0);
            o.set_render_order(0);
        }
        self.old = Some(id);
        self.new = None;
    }

    /// Drops any fade in progress: the newest panorama becomes current at
    /// full opacity and everything else is removed.
    pub fn finish(&mut self, scene: &mut Scene) {
        if let Some(id) = self.new {
            self.promote(scene, id);
        }
        self.prune(scene);
    }
}

/// Advances the fade to `now`. Call once per display frame.
pub fn tick(
    scene: &mut Scene,
    fade: &mut FadeState,
    now: Instant,
    duration: Duration,
) -> FadeProgress {
    fade.prune(scene);

    let Some(id) = fade.new else {
        return FadeProgress::Idle;
    };

    let t = if duration.is_zero() {
        1.0
    } else {
        let elapsed = now.saturating_duration_since(fade.started_at);
        (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0)
    };

    match scene.get_mut(id) {
        Some(o) => o.set_opacity(t),
        None => {
            // Removed behind our back; nothing left to fade.
            fade.new = None;
            return FadeProgress::Idle;
        }
    }

    if t >= 1.0 {
        fade.promote(scene, id);
        tracing::debug!(object = %id, "Panorama fade complete");
        FadeProgress::Promoted(id)
    } else {
        FadeProgress::Fading(t)
    }
}
