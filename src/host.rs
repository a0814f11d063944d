//! Render loop host: the single authority over frame timing, surface
//! provisioning and scene lifecycle.
//!
//! The host does not own the platform frame callback. A driver (the browser
//! loop in `web`, or a test) calls [`RenderHost::frame`] with a timestamp and
//! asks [`RenderHost::wants_frames`] whether to keep scheduling.
//!
//! Phases per scene slot:
//! `Uninitialized → Ready → Running ⇄ Paused → Disposing → Uninitialized`.

use crate::config::{validate_rules, ConfigError, HostConfig, MappingConfig};
use crate::mapping::{resolve_into, EventCursor, MappingRule, ResolvedParams};
use crate::scene::{Scene, SceneMeta};
use crate::state::SharedState;
use crate::surface::{Surface, SurfaceProvider};
use fnv::FnvHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPhase {
    /// Instance exists but `init` has not run (surface not sized yet).
    Uninitialized,
    /// `init` complete, no frame delivered yet.
    Ready,
    Running,
    /// Page hidden; no frames are requested.
    Paused,
    /// Outgoing scene is playing its release animation.
    Disposing,
}

pub type SceneFactory = Box<dyn Fn(&str) -> Option<Box<dyn Scene>>>;

struct SceneSlot {
    meta: SceneMeta,
    scene: Box<dyn Scene>,
    surface: Option<Surface>,
    cursor: EventCursor,
    initialized: bool,
}

#[derive(Clone, Debug)]
struct SwitchInFlight {
    target: &'static str,
    started_ms: f64,
}

pub struct RenderHost {
    config: HostConfig,
    state: SharedState,
    provider: Box<dyn SurfaceProvider>,
    catalog: Vec<SceneMeta>,
    factory: SceneFactory,
    mappings: FnvHashMap<&'static str, Vec<MappingRule>>,
    slot: Option<SceneSlot>,
    phase: HostPhase,
    size: (u32, u32),
    visible: bool,
    last_frame_ms: Option<f64>,
    switch: Option<SwitchInFlight>,
    queued: Option<&'static str>,
    params: ResolvedParams,
    frames: u64,
    torn_down: bool,
}

impl RenderHost {
    /// An invalid `config` is replaced by the defaults.
    pub fn new(
        config: HostConfig,
        state: SharedState,
        provider: Box<dyn SurfaceProvider>,
        catalog: Vec<SceneMeta>,
        factory: SceneFactory,
    ) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("host config rejected ({e}); using defaults");
                HostConfig::default()
            }
        };
        let mappings = catalog
            .iter()
            .map(|m| (m.id, m.default_mappings.to_vec()))
            .collect();
        Self {
            config,
            state,
            provider,
            catalog,
            factory,
            mappings,
            slot: None,
            phase: HostPhase::Uninitialized,
            size: (0, 0),
            visible: true,
            last_frame_ms: None,
            switch: None,
            queued: None,
            params: ResolvedParams::default(),
            frames: 0,
            torn_down: false,
        }
    }

    /// Host over the built-in scene registry.
    pub fn with_registry(
        config: HostConfig,
        state: SharedState,
        provider: Box<dyn SurfaceProvider>,
    ) -> Self {
        Self::new(
            config,
            state,
            provider,
            crate::scene::REGISTRY.to_vec(),
            Box::new(crate::scene::create_scene),
        )
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn scenes(&self) -> &[SceneMeta] {
        &self.catalog
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Whether the provider can ever back the scene's renderer.
    pub fn can_render(&self, scene_id: &str) -> bool {
        self.meta(scene_id)
            .is_some_and(|m| self.provider.supports(m.renderer))
    }

    pub fn current_scene_id(&self) -> Option<&'static str> {
        self.slot.as_ref().map(|s| s.meta.id)
    }

    /// Target of the in-flight or queued switch, if any.
    pub fn pending_scene_id(&self) -> Option<&'static str> {
        self.queued.or(self.switch.as_ref().map(|s| s.target))
    }

    pub fn is_switching(&self) -> bool {
        self.switch.is_some()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn mappings(&self, scene_id: &str) -> Option<&[MappingRule]> {
        self.mappings.get(scene_id).map(|r| r.as_slice())
    }

    /// Replace the rule list for a scene. Takes effect on the next frame.
    pub fn set_mappings(
        &mut self,
        scene_id: &str,
        rules: Vec<MappingRule>,
    ) -> Result<(), ConfigError> {
        validate_rules(&rules)?;
        let Some(meta) = self.meta(scene_id) else {
            log::warn!("set_mappings: unknown scene '{scene_id}'");
            return Ok(());
        };
        for r in rules.iter().filter(|r| !meta.supports(r.target)) {
            log::warn!(
                "scene '{}' ignores target '{}'",
                meta.id,
                r.target.name()
            );
        }
        self.mappings.insert(meta.id, rules);
        Ok(())
    }

    /// Snapshot of every scene's current rules, for persistence.
    pub fn export_mappings(&self) -> MappingConfig {
        MappingConfig {
            scenes: self
                .mappings
                .iter()
                .map(|(id, rules)| ((*id).to_owned(), rules.clone()))
                .collect(),
        }
    }

    /// Apply a saved configuration. Scenes it does not mention keep their
    /// rules; the whole import is rejected if any list is invalid.
    pub fn import_mappings(&mut self, config: MappingConfig) -> Result<(), ConfigError> {
        for rules in config.scenes.values() {
            validate_rules(rules)?;
        }
        for (id, rules) in config.scenes {
            self.set_mappings(&id, rules)?;
        }
        Ok(())
    }

    /// Last resolved parameters (for debug readouts).
    pub fn resolved(&self) -> &ResolvedParams {
        &self.params
    }

    /// True while the driver should keep requesting frames.
    pub fn wants_frames(&self) -> bool {
        !self.torn_down
            && self.visible
            && matches!(
                self.phase,
                HostPhase::Ready | HostPhase::Running | HostPhase::Disposing
            )
    }

    fn meta(&self, id: &str) -> Option<SceneMeta> {
        self.catalog.iter().find(|m| m.id == id).copied()
    }

    /// Construct (but do not init) the instance for `meta`.
    fn instantiate(&mut self, meta: SceneMeta) -> bool {
        let Some(scene) = (self.factory)(meta.id) else {
            log::error!("scene factory has no implementation for '{}'", meta.id);
            return false;
        };
        let cursor = self
            .state
            .try_borrow()
            .map(|st| EventCursor::caught_up(&st))
            .unwrap_or_default();
        self.slot = Some(SceneSlot {
            meta,
            scene,
            surface: None,
            cursor,
            initialized: false,
        });
        self.phase = HostPhase::Uninitialized;
        self.last_frame_ms = None;
        true
    }

    /// Provision the surface and run `init` if the surface has a size.
    fn try_init(&mut self) {
        let (w, h) = self.size;
        if w == 0 || h == 0 {
            return;
        }
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        if slot.initialized {
            return;
        }
        let Some(surface) = self.provider.acquire(slot.meta.renderer, w, h) else {
            log::warn!(
                "no {:?} surface available for '{}', staying uninitialized",
                slot.meta.renderer,
                slot.meta.id
            );
            return;
        };
        if surface.kind() != slot.meta.renderer {
            log::error!(
                "provider returned a {:?} surface for {:?} scene '{}'",
                surface.kind(),
                slot.meta.renderer,
                slot.meta.id
            );
            self.provider.release(surface);
            return;
        }
        slot.scene.init(&surface, w, h);
        slot.surface = Some(surface);
        slot.initialized = true;
        self.phase = if self.visible {
            HostPhase::Ready
        } else {
            HostPhase::Paused
        };
        self.last_frame_ms = None;
        log::info!("scene '{}' ready at {w}x{h}", slot.meta.id);
    }

    /// Dispose the active instance and give its surface back.
    fn dispose_slot(&mut self) {
        let Some(mut slot) = self.slot.take() else {
            return;
        };
        self.phase = HostPhase::Disposing;
        if slot.initialized {
            slot.scene.dispose();
        }
        if let Some(surface) = slot.surface.take() {
            self.provider.release(surface);
        }
        log::info!("scene '{}' disposed", slot.meta.id);
        self.phase = HostPhase::Uninitialized;
    }

    /// Activate the initial scene (or replace a never-initialized one).
    pub fn start(&mut self, scene_id: &str) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(meta) = self.meta(scene_id) else {
            log::warn!("start: unknown scene '{scene_id}'");
            return false;
        };
        self.switch = None;
        self.queued = None;
        self.dispose_slot();
        if !self.instantiate(meta) {
            return false;
        }
        self.try_init();
        true
    }

    /// Observed size change of the host surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.torn_down || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        if !slot.initialized {
            // First nonzero size: the deferred init replaces a resize.
            self.try_init();
            return;
        }
        if let Some(surface) = &slot.surface {
            surface.set_size(width, height);
        }
        slot.scene.resize(width, height);
        log::debug!("scene '{}' resized to {width}x{height}", slot.meta.id);
    }

    /// Page visibility change. Returns true when the driver should
    /// (re)start requesting frames.
    pub fn set_visible(&mut self, visible: bool, now_ms: f64) -> bool {
        if self.torn_down || visible == self.visible {
            return self.wants_frames();
        }
        self.visible = visible;
        if visible {
            if self.phase == HostPhase::Paused {
                self.phase = if self.frames > 0 {
                    HostPhase::Running
                } else {
                    HostPhase::Ready
                };
            }
            // The hidden span must not show up as one giant dt.
            self.last_frame_ms = Some(now_ms);
            log::info!("render loop resumed");
        } else {
            if self.phase == HostPhase::Disposing {
                // Cancel the release animation rather than stall the switch.
                self.complete_switch(now_ms);
            }
            if matches!(self.phase, HostPhase::Ready | HostPhase::Running) {
                self.phase = HostPhase::Paused;
            }
            log::info!("render loop paused");
        }
        self.wants_frames()
    }

    /// Request a scene change. At most one switch is in flight; requests made
    /// meanwhile collapse into a single queued target (latest wins).
    pub fn request_scene(&mut self, scene_id: &str, now_ms: f64) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(meta) = self.meta(scene_id) else {
            log::warn!("request_scene: unknown scene '{scene_id}'");
            return false;
        };
        if !self.provider.supports(meta.renderer) {
            // Keep the current scene on screen rather than switch to a blank one.
            log::warn!(
                "request_scene: no {:?} surfaces on this platform, '{}' unavailable",
                meta.renderer,
                meta.id
            );
            return false;
        }
        if let Some(sw) = &self.switch {
            if sw.target == meta.id && self.queued.is_none() {
                return true;
            }
            log::debug!("switch to '{}' queued behind '{}'", meta.id, sw.target);
            self.queued = Some(meta.id);
            return true;
        }
        let Some(slot) = self.slot.as_mut() else {
            return self.start(meta.id);
        };
        if slot.meta.id == meta.id {
            return true;
        }
        if !slot.initialized {
            // Nothing on screen yet, swap without a release phase.
            return self.start(meta.id);
        }
        log::info!("switching scene '{}' -> '{}'", slot.meta.id, meta.id);
        slot.scene.release();
        self.switch = Some(SwitchInFlight {
            target: meta.id,
            started_ms: now_ms,
        });
        self.phase = HostPhase::Disposing;
        if self.config.switch_settle_ms <= 0.0 || !self.visible {
            self.complete_switch(now_ms);
        }
        true
    }

    /// Finish the in-flight switch: dispose, then activate the newest target.
    fn complete_switch(&mut self, now_ms: f64) {
        let Some(sw) = self.switch.take() else {
            return;
        };
        let target = self.queued.take().unwrap_or(sw.target);
        self.dispose_slot();
        if let Some(meta) = self.meta(target) {
            if self.instantiate(meta) {
                self.try_init();
            }
        }
        if !self.visible && self.phase == HostPhase::Ready {
            self.phase = HostPhase::Paused;
        }
        self.last_frame_ms = Some(now_ms);
    }

    /// One animation frame. Returns whether the driver should schedule
    /// another.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        if self.torn_down || !self.visible {
            return false;
        }
        if let Some(sw) = &self.switch {
            if now_ms - sw.started_ms >= self.config.switch_settle_ms {
                self.complete_switch(now_ms);
            }
        }
        match self.phase {
            HostPhase::Ready => self.phase = HostPhase::Running,
            HostPhase::Running | HostPhase::Disposing => {}
            HostPhase::Uninitialized | HostPhase::Paused => return self.wants_frames(),
        }

        let dt_ms = match self.last_frame_ms {
            Some(prev) => (now_ms - prev).clamp(0.0, self.config.max_frame_dt_ms),
            None => 0.0,
        };
        self.last_frame_ms = Some(now_ms);

        let Some(slot) = self.slot.as_mut() else {
            return self.wants_frames();
        };
        let Ok(state) = self.state.try_borrow() else {
            // Writer mid-update; try again next frame.
            return self.wants_frames();
        };
        let rules = self
            .mappings
            .get(slot.meta.id)
            .map(|r| r.as_slice())
            .unwrap_or(&[]);
        resolve_into(&state, rules, &slot.cursor, &mut self.params);
        slot.scene
            .update(&self.params, &state, (dt_ms / 1000.0) as f32, &slot.cursor);
        slot.cursor.advance(&state);
        drop(state);
        self.frames += 1;
        self.wants_frames()
    }

    /// Dispose everything. The host is inert afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.switch = None;
        self.queued = None;
        self.dispose_slot();
        self.torn_down = true;
        log::info!("render host torn down after {} frames", self.frames);
    }
}

impl Drop for RenderHost {
    fn drop(&mut self) {
        self.teardown();
    }
}
