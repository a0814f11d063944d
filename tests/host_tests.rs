// Host-side tests for the render loop host: deferred init, switch queuing,
// frame timing, visibility and teardown. Scenes and surfaces are mocks that
// record every lifecycle call.

use midi_viz::accumulator::Accumulator;
use midi_viz::config::{AccumulatorConfig, HostConfig, MappingConfig};
use midi_viz::host::{HostPhase, RenderHost};
use midi_viz::mapping::{Curve, EventCursor, MappingRule, ResolvedParams, Source, Target};
use midi_viz::midi::MidiEvent;
use midi_viz::scene::{Scene, SceneMeta};
use midi_viz::state::{PerformanceState, SharedState};
use midi_viz::surface::{
    Canvas2d, RasterSurface, RendererKind, Surface, SurfaceProvider,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

const RULES: &[MappingRule] = &[MappingRule::new(
    Source::NoteOn,
    Target::Intensity,
    0.0,
    1.0,
    Curve::Linear,
)];
const TARGETS: &[Target] = &[Target::Intensity, Target::Hue];

fn meta(id: &'static str) -> SceneMeta {
    SceneMeta {
        id,
        name: id,
        renderer: RendererKind::Raster,
        default_mappings: RULES,
        targets: TARGETS,
    }
}

fn vector_meta(id: &'static str) -> SceneMeta {
    SceneMeta {
        renderer: RendererKind::Vector,
        ..meta(id)
    }
}

struct MockScene {
    id: &'static str,
    log: Log,
    dts: Rc<RefCell<Vec<f32>>>,
    intensities: Rc<RefCell<Vec<f32>>>,
}

impl Scene for MockScene {
    fn init(&mut self, _surface: &Surface, width: u32, height: u32) {
        self.log
            .borrow_mut()
            .push(format!("{}:init {width}x{height}", self.id));
    }

    fn update(
        &mut self,
        params: &ResolvedParams,
        _state: &PerformanceState,
        dt_sec: f32,
        _cursor: &EventCursor,
    ) {
        self.log.borrow_mut().push(format!("{}:update", self.id));
        self.dts.borrow_mut().push(dt_sec);
        self.intensities
            .borrow_mut()
            .push(params.get_or(Target::Intensity, -1.0));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log
            .borrow_mut()
            .push(format!("{}:resize {width}x{height}", self.id));
    }

    fn release(&mut self) {
        self.log.borrow_mut().push(format!("{}:release", self.id));
    }

    fn dispose(&mut self) {
        self.log.borrow_mut().push(format!("{}:dispose", self.id));
    }
}

struct MockRaster {
    size: (u32, u32),
}

impl RasterSurface for MockRaster {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn context(&mut self) -> Option<&mut dyn Canvas2d> {
        None
    }
}

#[derive(Default)]
struct ProviderStats {
    acquired: usize,
    live: usize,
    max_live: usize,
}

/// Hands out raster surfaces only; `vector` controls whether it claims
/// vector support anyway.
struct MockProvider {
    stats: Rc<RefCell<ProviderStats>>,
    vector: bool,
}

impl SurfaceProvider for MockProvider {
    fn supports(&self, kind: RendererKind) -> bool {
        kind == RendererKind::Raster || self.vector
    }

    fn acquire(&mut self, _kind: RendererKind, width: u32, height: u32) -> Option<Surface> {
        let mut s = self.stats.borrow_mut();
        s.acquired += 1;
        s.live += 1;
        s.max_live = s.max_live.max(s.live);
        Some(Surface::Raster(Rc::new(RefCell::new(MockRaster {
            size: (width, height),
        }))))
    }

    fn release(&mut self, _surface: Surface) {
        self.stats.borrow_mut().live -= 1;
    }
}

struct Rig {
    host: RenderHost,
    log: Log,
    created: Rc<RefCell<Vec<String>>>,
    dts: Rc<RefCell<Vec<f32>>>,
    intensities: Rc<RefCell<Vec<f32>>>,
    stats: Rc<RefCell<ProviderStats>>,
}

fn rig_with(config: HostConfig, state: SharedState) -> Rig {
    rig_on(config, state, false)
}

fn rig_on(config: HostConfig, state: SharedState, vector: bool) -> Rig {
    let log: Log = Rc::default();
    let created: Rc<RefCell<Vec<String>>> = Rc::default();
    let dts: Rc<RefCell<Vec<f32>>> = Rc::default();
    let intensities: Rc<RefCell<Vec<f32>>> = Rc::default();
    let stats: Rc<RefCell<ProviderStats>> = Rc::default();
    let factory = {
        let (log, created, dts, intensities) =
            (log.clone(), created.clone(), dts.clone(), intensities.clone());
        move |id: &str| -> Option<Box<dyn Scene>> {
            let id: &'static str = match id {
                "a" => "a",
                "b" => "b",
                "c" => "c",
                "v" => "v",
                _ => return None,
            };
            created.borrow_mut().push(id.to_string());
            Some(Box::new(MockScene {
                id,
                log: log.clone(),
                dts: dts.clone(),
                intensities: intensities.clone(),
            }))
        }
    };
    let host = RenderHost::new(
        config,
        state,
        Box::new(MockProvider {
            stats: stats.clone(),
            vector,
        }),
        vec![meta("a"), meta("b"), meta("c"), vector_meta("v")],
        Box::new(factory),
    );
    Rig {
        host,
        log,
        created,
        dts,
        intensities,
        stats,
    }
}

fn rig() -> Rig {
    rig_with(
        HostConfig::default(),
        Rc::new(RefCell::new(PerformanceState::new(16))),
    )
}

fn count(log: &Log, entry: &str) -> usize {
    log.borrow().iter().filter(|e| e.as_str() == entry).count()
}

#[test]
fn resize_before_init_runs_init_exactly_once() {
    let mut r = rig();
    assert!(r.host.start("a"));
    assert_eq!(r.host.phase(), HostPhase::Uninitialized);
    assert!(!r.host.wants_frames());
    assert!(r.log.borrow().is_empty());

    r.host.resize(800, 600);
    assert_eq!(*r.log.borrow(), vec!["a:init 800x600".to_string()]);
    assert_eq!(r.host.phase(), HostPhase::Ready);

    r.host.resize(800, 600);
    assert_eq!(r.log.borrow().len(), 1);
    r.host.resize(1024, 768);
    assert_eq!(r.log.borrow().last().unwrap(), "a:resize 1024x768");
    assert_eq!(count(&r.log, "a:init 800x600"), 1);
}

#[test]
fn frames_before_init_do_nothing() {
    let mut r = rig();
    r.host.start("a");
    assert!(!r.host.frame(0.0));
    assert!(r.dts.borrow().is_empty());
    r.host.resize(0, 300);
    assert!(r.log.borrow().is_empty());
}

#[test]
fn rapid_switches_collapse_to_the_latest_request() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(640, 480);
    r.host.frame(0.0);

    assert!(r.host.request_scene("b", 10.0));
    assert!(r.host.request_scene("c", 20.0));
    assert!(r.host.is_switching());
    assert_eq!(r.host.pending_scene_id(), Some("c"));
    assert_eq!(r.host.phase(), HostPhase::Disposing);

    // The outgoing scene keeps animating during the settle delay.
    r.host.frame(100.0);
    assert_eq!(r.host.current_scene_id(), Some("a"));
    assert_eq!(r.log.borrow().last().unwrap(), "a:update");

    r.host.frame(300.0);
    assert_eq!(r.host.current_scene_id(), Some("c"));
    assert!(!r.host.is_switching());
    assert_eq!(r.host.phase(), HostPhase::Running);
    assert_eq!(*r.created.borrow(), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(count(&r.log, "a:release"), 1);
    assert_eq!(count(&r.log, "a:dispose"), 1);
    assert_eq!(count(&r.log, "c:init 640x480"), 1);
    assert!(r.log.borrow().iter().all(|e| !e.starts_with("b:")));
}

#[test]
fn at_most_one_surface_is_live() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(320, 200);
    let mut t = 0.0;
    for id in ["b", "c", "a", "b"] {
        r.host.request_scene(id, t);
        t += 300.0;
        r.host.frame(t);
        t += 16.0;
        r.host.frame(t);
    }
    assert_eq!(r.host.current_scene_id(), Some("b"));
    {
        let s = r.stats.borrow();
        assert_eq!(s.max_live, 1);
        assert_eq!(s.live, 1);
        assert_eq!(s.acquired, 5);
    }
    r.host.teardown();
    assert_eq!(r.stats.borrow().live, 0);
}

#[test]
fn frame_dt_is_clamped() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(1000.0);
    r.host.frame(1016.0);
    r.host.frame(3016.0);
    let dts = r.dts.borrow();
    assert_eq!(dts[0], 0.0);
    assert!((dts[1] - 0.016).abs() < 1e-6);
    assert!((dts[2] - 0.1).abs() < 1e-6);
}

#[test]
fn hidden_page_pauses_and_resume_resets_the_clock() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(0.0);
    assert_eq!(r.host.phase(), HostPhase::Running);

    assert!(!r.host.set_visible(false, 10.0));
    assert_eq!(r.host.phase(), HostPhase::Paused);
    assert!(!r.host.frame(500.0));
    assert_eq!(r.dts.borrow().len(), 1);

    assert!(r.host.set_visible(true, 60_000.0));
    assert_eq!(r.host.phase(), HostPhase::Running);
    r.host.frame(60_016.0);
    let last = *r.dts.borrow().last().unwrap();
    assert!((last - 0.016).abs() < 1e-6);
}

#[test]
fn hiding_mid_switch_finishes_it_immediately() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(0.0);
    r.host.request_scene("b", 5.0);
    r.host.set_visible(false, 6.0);
    assert!(!r.host.is_switching());
    assert_eq!(r.host.current_scene_id(), Some("b"));
    assert_eq!(r.host.phase(), HostPhase::Paused);
    assert_eq!(count(&r.log, "b:init 100x100"), 1);
}

#[test]
fn zero_settle_switches_synchronously() {
    let config = HostConfig {
        switch_settle_ms: 0.0,
        ..HostConfig::default()
    };
    let mut r = rig_with(config, Rc::new(RefCell::new(PerformanceState::new(16))));
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.request_scene("b", 0.0);
    assert_eq!(r.host.current_scene_id(), Some("b"));
    assert_eq!(r.host.phase(), HostPhase::Ready);
}

#[test]
fn unknown_scene_is_rejected() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    assert!(!r.host.request_scene("nope", 0.0));
    assert!(!r.host.start("nope"));
    assert_eq!(r.host.current_scene_id(), Some("a"));
    assert!(!r.host.is_switching());
}

#[test]
fn requesting_the_active_scene_is_a_no_op() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    assert!(r.host.request_scene("a", 0.0));
    assert!(!r.host.is_switching());
    assert_eq!(r.created.borrow().len(), 1);
}

#[test]
fn note_on_reaches_each_scene_once() {
    let mut acc = Accumulator::new(AccumulatorConfig::default());
    let mut r = rig_with(HostConfig::default(), acc.snapshot());
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(0.0);
    acc.on_event(
        MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 90,
        },
        5.0,
    );
    r.host.frame(16.0);
    r.host.frame(32.0);
    r.host.frame(48.0);
    assert_eq!(*r.intensities.borrow(), vec![0.0, 1.0, 0.0, 0.0]);

    // A freshly activated scene does not replay the old note-on.
    r.host.request_scene("b", 50.0);
    r.host.frame(400.0);
    assert_eq!(r.host.current_scene_id(), Some("b"));
    assert_eq!(*r.intensities.borrow().last().unwrap(), 0.0);
}

#[test]
fn mapping_edits_apply_next_frame() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    let rules = vec![MappingRule::new(
        Source::Centroid,
        Target::Intensity,
        0.0,
        127.0,
        Curve::Linear,
    )];
    r.host.set_mappings("a", rules.clone()).unwrap();
    assert_eq!(r.host.mappings("a"), Some(rules.as_slice()));
    r.host.frame(0.0);
    let v = *r.intensities.borrow().last().unwrap();
    assert!((v - 60.0).abs() < 1e-3);

    let bad = vec![MappingRule::new(
        Source::Pitch,
        Target::Hue,
        f32::NAN,
        1.0,
        Curve::Linear,
    )];
    assert!(r.host.set_mappings("a", bad).is_err());
    assert_eq!(r.host.mappings("a"), Some(rules.as_slice()));
}

#[test]
fn mappings_export_and_import_as_a_whole() {
    let mut r = rig();
    let exported = r.host.export_mappings();
    assert_eq!(exported.scenes.len(), 4);
    assert_eq!(exported.rules("b"), Some(RULES));

    let mut edited = exported.clone();
    let hue = vec![MappingRule::new(
        Source::Pitch,
        Target::Hue,
        1.0,
        0.0,
        Curve::Linear,
    )];
    edited.scenes.insert("c".to_owned(), hue.clone());
    edited.scenes.remove("a");
    r.host.import_mappings(edited).unwrap();
    assert_eq!(r.host.mappings("c"), Some(hue.as_slice()));
    assert_eq!(r.host.mappings("a"), Some(RULES));

    // One bad list rejects the whole import.
    let mut broken = MappingConfig::default();
    broken.scenes.insert("a".to_owned(), Vec::new());
    broken.scenes.insert(
        "b".to_owned(),
        vec![MappingRule {
            cc_number: None,
            ..MappingRule::cc(1, Target::Hue, 0.0, 1.0, Curve::Linear)
        }],
    );
    assert!(r.host.import_mappings(broken).is_err());
    assert_eq!(r.host.mappings("a"), Some(RULES));
}

#[test]
fn teardown_disposes_and_goes_inert() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(0.0);
    r.host.teardown();
    assert_eq!(count(&r.log, "a:dispose"), 1);
    assert!(!r.host.wants_frames());
    assert!(!r.host.frame(16.0));
    assert!(!r.host.request_scene("b", 20.0));
    r.host.teardown();
    drop(r.host);
    assert_eq!(count(&r.log, "a:dispose"), 1);
}

#[test]
fn unsupported_renderer_keeps_the_current_scene() {
    let mut r = rig();
    r.host.start("a");
    r.host.resize(640, 480);
    r.host.frame(0.0);
    assert!(!r.host.can_render("v"));
    assert!(r.host.can_render("b"));

    assert!(!r.host.request_scene("v", 10.0));
    assert!(!r.host.is_switching());
    assert_eq!(r.host.current_scene_id(), Some("a"));
    assert_eq!(count(&r.log, "a:release"), 0);
    assert_eq!(r.stats.borrow().live, 1);

    r.host.frame(16.0);
    assert_eq!(r.host.phase(), HostPhase::Running);
    assert_eq!(r.log.borrow().last().unwrap(), "a:update");
}

#[test]
fn mismatched_surface_is_returned_and_init_skipped() {
    let mut r = rig_on(
        HostConfig::default(),
        Rc::new(RefCell::new(PerformanceState::new(16))),
        true,
    );
    assert!(r.host.start("v"));
    r.host.resize(640, 480);
    assert_eq!(r.host.phase(), HostPhase::Uninitialized);
    assert!(r.log.borrow().is_empty());
    assert_eq!(r.stats.borrow().acquired, 1);
    assert_eq!(r.stats.borrow().live, 0);
}

#[test]
fn invalid_host_config_falls_back_to_defaults() {
    let config = HostConfig {
        max_frame_dt_ms: f64::NAN,
        ..HostConfig::default()
    };
    let mut r = rig_with(config, Rc::new(RefCell::new(PerformanceState::new(16))));
    assert_eq!(r.host.config(), &HostConfig::default());
    r.host.start("a");
    r.host.resize(100, 100);
    r.host.frame(1000.0);
    r.host.frame(4000.0);
    let dts = r.dts.borrow();
    assert!((dts[1] - 0.1).abs() < 1e-6);
}
