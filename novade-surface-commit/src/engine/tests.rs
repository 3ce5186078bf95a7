use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use novade_buffer_handoff::{
    AcquirePoint, BufferAllocator, BufferFormat, BufferId, ClientBuffer, CommittedBuffer,
    HandoffError, LifetimeTracker, QueueExecutor, ReleasePoint, RenderBuffer, SyncTimeline,
    TimelinePoint, Tracked,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::{EngineCollaborators, EngineConfig, SurfaceEngine};
use crate::error::{EngineError, ProtocolError};
use crate::explicit_sync::{FenceMonitor, FenceWatchId};
use crate::frame_scheduler::{HeartbeatTimer, DEFAULT_FRAME_QUANTUM};
use crate::geometry::{Point, Rectangle, RectangleF, Size};
use crate::pending::{FrameCallback, TrackedBuffer};
use crate::region::Region;
use crate::role::{RoleKind, SceneSurfaceRef, ShellRole, SurfaceSnapshot};
use crate::stream::{BufferStream, BufferStreamFactory};
use crate::surface::{CommitPhase, DestroyReason, StreamSpec, SurfaceData, SurfaceId};

#[derive(Debug)]
struct FakeClientBuffer {
    name: &'static str,
    size: (i32, i32),
    explicit_sync: bool,
    releases: Arc<AtomicUsize>,
}

impl ClientBuffer for FakeClientBuffer {
    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_explicit_sync(&self) -> bool {
        self.explicit_sync
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct FakeRenderBuffer {
    id: BufferId,
    size: (i32, i32),
}

impl RenderBuffer for FakeRenderBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn dimensions(&self) -> (i32, i32) {
        self.size
    }

    fn format(&self) -> BufferFormat {
        BufferFormat::Argb8888
    }
}

type Names = Rc<RefCell<HashMap<BufferId, &'static str>>>;

struct FakeAllocator {
    names: Names,
}

impl BufferAllocator for FakeAllocator {
    fn buffer_from_resource(
        &self,
        buffer: &Arc<dyn ClientBuffer>,
    ) -> novade_buffer_handoff::Result<Arc<dyn RenderBuffer>> {
        let fake = buffer
            .as_any()
            .downcast_ref::<FakeClientBuffer>()
            .ok_or(HandoffError::UnsupportedBuffer)?;
        let id = BufferId::new_unique();
        self.names.borrow_mut().insert(id, fake.name);
        Ok(Arc::new(FakeRenderBuffer { id, size: fake.size }))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Submission {
    surface: SurfaceId,
    buffer: BufferId,
    logical: Size,
    source: RectangleF,
}

#[derive(Default)]
struct StreamLog {
    submissions: Vec<Submission>,
    unmaps: Vec<SurfaceId>,
    latest: HashMap<SurfaceId, Weak<CommittedBuffer>>,
}

/// Holds only the latest buffer, like a real stream.
struct RecordingStream {
    surface: SurfaceId,
    log: Rc<RefCell<StreamLog>>,
    held: Option<Arc<CommittedBuffer>>,
}

impl BufferStream for RecordingStream {
    fn submit_buffer(&mut self, buffer: Arc<CommittedBuffer>, logical_size: Size, source: RectangleF) {
        let mut log = self.log.borrow_mut();
        log.submissions.push(Submission {
            surface: self.surface,
            buffer: buffer.buffer().id(),
            logical: logical_size,
            source,
        });
        log.latest.insert(self.surface, Arc::downgrade(&buffer));
        drop(log);
        self.held = Some(buffer);
    }

    fn unmap(&mut self) {
        self.log.borrow_mut().unmaps.push(self.surface);
        self.held = None;
    }
}

struct RecordingStreams(Rc<RefCell<StreamLog>>);

impl BufferStreamFactory for RecordingStreams {
    fn create_stream(&mut self, surface: SurfaceId) -> Box<dyn BufferStream> {
        Box::new(RecordingStream {
            surface,
            log: self.0.clone(),
            held: None,
        })
    }
}

#[derive(Default)]
struct FenceLog {
    watches: Vec<(SurfaceId, FenceWatchId, u64)>,
    cancelled: Vec<FenceWatchId>,
    completed: Vec<FenceWatchId>,
    fail_next: bool,
}

struct FakeFenceMonitor(Rc<RefCell<FenceLog>>);

impl FenceMonitor for FakeFenceMonitor {
    fn watch(
        &mut self,
        surface: SurfaceId,
        watch: FenceWatchId,
        acquire: &AcquirePoint,
    ) -> Result<(), HandoffError> {
        let mut log = self.0.borrow_mut();
        if std::mem::take(&mut log.fail_next) {
            return Err(HandoffError::FenceReadiness {
                point: acquire.0.point,
                source: io::Error::from(io::ErrorKind::Other),
            });
        }
        log.watches.push((surface, watch, acquire.0.point));
        Ok(())
    }

    fn cancel(&mut self, watch: FenceWatchId) {
        self.0.borrow_mut().cancelled.push(watch);
    }

    fn completed(&mut self, watch: FenceWatchId) {
        self.0.borrow_mut().completed.push(watch);
    }
}

struct RecordingTimer(Rc<RefCell<Vec<Duration>>>);

impl HeartbeatTimer for RecordingTimer {
    fn arm(&mut self, after: Duration) -> std::io::Result<()> {
        self.0.borrow_mut().push(after);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingTimeline {
    signalled: Mutex<Vec<u64>>,
}

impl RecordingTimeline {
    fn signalled(&self) -> Vec<u64> {
        self.signalled.lock().unwrap().clone()
    }
}

impl SyncTimeline for RecordingTimeline {
    fn readiness_fd(&self, _point: u64) -> io::Result<OwnedFd> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn signal(&self, point: u64) -> io::Result<()> {
        self.signalled.lock().unwrap().push(point);
        Ok(())
    }
}

#[derive(Debug)]
struct CountingCallback(Arc<AtomicUsize>);

impl FrameCallback for CountingCallback {
    fn done(self: Box<Self>, _timestamp_ms: u32) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct RoleLog {
    commits: Vec<SurfaceSnapshot>,
    refreshes: Vec<SurfaceData>,
    destroyed: bool,
}

#[derive(Debug)]
struct FakeShellRole {
    scene: Option<SceneSurfaceRef>,
    log: Rc<RefCell<RoleLog>>,
}

impl ShellRole for FakeShellRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Shell("xdg_toplevel")
    }

    fn committed(&mut self, snapshot: &SurfaceSnapshot) {
        self.log.borrow_mut().commits.push(snapshot.clone());
    }

    fn scene_surface(&self) -> Option<SceneSurfaceRef> {
        self.scene.clone()
    }

    fn refresh_surface_data(&mut self, data: &SurfaceData) {
        self.log.borrow_mut().refreshes.push(data.clone());
    }

    fn surface_destroyed(&mut self) {
        self.log.borrow_mut().destroyed = true;
    }
}

struct Harness {
    engine: SurfaceEngine,
    executor: Arc<QueueExecutor>,
    names: Names,
    streams: Rc<RefCell<StreamLog>>,
    fences: Rc<RefCell<FenceLog>>,
    arms: Rc<RefCell<Vec<Duration>>>,
    trackers: Vec<LifetimeTracker>,
}

impl Harness {
    fn new() -> Self {
        let executor = Arc::new(QueueExecutor::new());
        let names: Names = Rc::default();
        let streams = Rc::new(RefCell::new(StreamLog::default()));
        let fences = Rc::new(RefCell::new(FenceLog::default()));
        let arms = Rc::new(RefCell::new(Vec::new()));
        let engine = SurfaceEngine::new(
            EngineCollaborators {
                allocator: Arc::new(FakeAllocator { names: names.clone() }),
                executor: executor.clone(),
                streams: Box::new(RecordingStreams(streams.clone())),
                fence_monitor: Box::new(FakeFenceMonitor(fences.clone())),
                heartbeat: Box::new(RecordingTimer(arms.clone())),
            },
            EngineConfig::default(),
        );
        Self {
            engine,
            executor,
            names,
            streams,
            fences,
            arms,
            trackers: Vec::new(),
        }
    }

    fn make_buffer(
        &mut self,
        name: &'static str,
        width: i32,
        height: i32,
        explicit_sync: bool,
    ) -> (TrackedBuffer, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let tracker = LifetimeTracker::new();
        let client: Arc<dyn ClientBuffer> = Arc::new(FakeClientBuffer {
            name,
            size: (width, height),
            explicit_sync,
            releases: releases.clone(),
        });
        let tracked = Tracked::new(client, tracker.handle());
        self.trackers.push(tracker);
        (tracked, releases)
    }

    fn buffer(&mut self, name: &'static str, width: i32, height: i32) -> (TrackedBuffer, Arc<AtomicUsize>) {
        self.make_buffer(name, width, height, false)
    }

    /// Attaches a fresh buffer and commits it.
    fn map(&mut self, surface: SurfaceId, name: &'static str, width: i32, height: i32) -> Arc<AtomicUsize> {
        let (buffer, releases) = self.buffer(name, width, height);
        self.engine.attach(surface, Some(buffer)).unwrap();
        self.engine.commit(surface).unwrap();
        releases
    }

    fn flush(&self) -> usize {
        self.executor.run_pending()
    }

    fn submitted(&self, surface: SurfaceId) -> Vec<&'static str> {
        let names = self.names.borrow();
        self.streams
            .borrow()
            .submissions
            .iter()
            .filter(|s| s.surface == surface)
            .map(|s| names[&s.buffer])
            .collect()
    }

    fn last_submission(&self, surface: SurfaceId) -> Option<Submission> {
        self.streams
            .borrow()
            .submissions
            .iter()
            .rev()
            .find(|s| s.surface == surface)
            .cloned()
    }

    /// Plays the renderer finishing with the surface's latest buffer.
    fn consume(&self, surface: SurfaceId) {
        let latest = self.streams.borrow().latest.get(&surface).and_then(Weak::upgrade);
        if let Some(buffer) = latest {
            buffer.mark_consumed();
        }
    }

    fn buffer_size(&self, surface: SurfaceId) -> Option<Size> {
        self.engine.surface(surface).unwrap().buffer_size()
    }

    fn shell_role(&mut self, surface: SurfaceId) -> Rc<RefCell<RoleLog>> {
        let log = Rc::new(RefCell::new(RoleLog::default()));
        let scene = SceneSurfaceRef(Arc::new(surface));
        self.engine
            .assign_role(
                surface,
                Box::new(FakeShellRole {
                    scene: Some(scene),
                    log: log.clone(),
                }),
            )
            .unwrap();
        log
    }
}

fn callback(counter: &Arc<AtomicUsize>) -> Box<dyn FrameCallback> {
    Box::new(CountingCallback(counter.clone()))
}

fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

fn protocol_error<T: std::fmt::Debug>(result: Result<T, EngineError>) -> ProtocolError {
    match result {
        Err(EngineError::Protocol(err)) => err,
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

fn timeline_points(
    timeline: &Arc<RecordingTimeline>,
    acquire: u64,
    release: u64,
) -> (AcquirePoint, ReleasePoint) {
    let timeline: Arc<dyn SyncTimeline> = timeline.clone();
    (
        AcquirePoint(TimelinePoint::new(timeline.clone(), acquire)),
        ReleasePoint(TimelinePoint::new(timeline, release)),
    )
}

#[test]
fn test_commit_maps_surface_at_buffer_scale() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.set_buffer_scale(s, 2).unwrap();
    h.map(s, "a", 200, 100);

    assert_eq!(h.buffer_size(s), Some(Size::new(100, 50)));
    assert_eq!(
        h.last_submission(s).map(|sub| (sub.logical, sub.source)),
        Some((Size::new(100, 50), RectangleF::new(0.0, 0.0, 200.0, 100.0)))
    );
    assert_eq!(h.engine.surface(s).unwrap().phase(), CommitPhase::Idle);
}

#[test]
fn test_empty_commit_changes_nothing() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let releases = h.map(s, "a", 64, 32);
    h.engine.set_offset(s, Point::new(3, 4)).unwrap();
    h.engine.commit(s).unwrap();

    let surface = h.engine.surface(s).unwrap();
    let before = (surface.buffer_size(), surface.offset(), surface.scale(), surface.transform());
    let submissions = h.streams.borrow().submissions.len();

    h.engine.commit(s).unwrap();

    let surface = h.engine.surface(s).unwrap();
    assert_eq!(
        (surface.buffer_size(), surface.offset(), surface.scale(), surface.transform()),
        before
    );
    assert_eq!(h.streams.borrow().submissions.len(), submissions);
    assert_eq!(h.flush(), 0);
    assert_eq!(count(&releases), 0);
}

#[test]
fn test_redundant_offset_and_input_shape_do_not_refresh() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let log = h.shell_role(s);
    h.map(s, "a", 10, 10);
    let refreshes = log.borrow().refreshes.len();

    h.engine.set_offset(s, Point::ORIGIN).unwrap();
    h.engine.set_input_region(s, None).unwrap();
    h.engine.commit(s).unwrap();

    assert_eq!(log.borrow().refreshes.len(), refreshes);
}

#[test]
fn test_replaced_buffer_is_released_exactly_once() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let a = h.map(s, "a", 64, 64);
    let b = h.map(s, "b", 64, 64);

    assert_eq!(h.submitted(s), vec!["a", "b"]);
    assert_eq!(count(&a), 0, "release is delivered through the executor");
    assert_eq!(h.flush(), 1);
    assert_eq!(count(&a), 1);
    assert_eq!(count(&b), 0);
    assert_eq!(h.flush(), 0);
    assert_eq!(count(&a), 1);
}

#[test]
fn test_released_buffer_of_destroyed_resource_is_ignored() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let a = h.map(s, "a", 8, 8);
    h.trackers[0].mark_destroyed();
    h.map(s, "b", 8, 8);

    assert_eq!(h.flush(), 1);
    assert_eq!(count(&a), 0);
}

#[test]
fn test_buffer_frame_callbacks_wait_for_consumption() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let done = Arc::new(AtomicUsize::new(0));
    let (buffer, _) = h.buffer("a", 16, 16);
    h.engine.attach(s, Some(buffer)).unwrap();
    h.engine.frame(s, callback(&done)).unwrap();
    h.engine.commit(s).unwrap();

    assert_eq!(h.flush(), 0);
    assert_eq!(count(&done), 0);
    assert!(h.arms.borrow().is_empty());

    h.consume(s);
    h.consume(s);
    assert_eq!(h.flush(), 1);
    assert_eq!(count(&done), 1);
}

#[test]
fn test_frame_without_buffer_rides_the_heartbeat() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.map(s, "a", 16, 16);
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        h.engine.frame(s, callback(&done)).unwrap();
        h.engine.commit(s).unwrap();
    }

    assert_eq!(*h.arms.borrow(), vec![DEFAULT_FRAME_QUANTUM]);
    assert_eq!(count(&done), 0);
    assert_eq!(h.engine.dispatch_frame_batch(), 2);
    assert_eq!(count(&done), 2);
    assert_eq!(h.engine.dispatch_frame_batch(), 0);
}

#[test]
fn test_detach_unmaps_and_answers_callbacks_inline() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let a = h.map(s, "a", 16, 16);
    let done = Arc::new(AtomicUsize::new(0));

    h.engine.frame(s, callback(&done)).unwrap();
    h.engine.attach(s, None).unwrap();
    h.engine.commit(s).unwrap();

    assert_eq!(count(&done), 1);
    assert_eq!(h.buffer_size(s), None);
    assert_eq!(h.streams.borrow().unmaps, vec![s]);
    assert_eq!(h.flush(), 1);
    assert_eq!(count(&a), 1);
}

#[test]
fn test_buffer_destroyed_before_commit_unmaps() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.map(s, "a", 16, 16);
    let (buffer, releases) = h.buffer("b", 16, 16);
    h.engine.attach(s, Some(buffer)).unwrap();
    h.trackers.pop();
    h.engine.commit(s).unwrap();

    assert_eq!(h.buffer_size(s), None);
    assert_eq!(h.submitted(s), vec!["a"]);
    assert_eq!(count(&releases), 0);
}

#[test]
fn test_transform_swaps_logical_size() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.set_buffer_transform(s, 1).unwrap();
    h.map(s, "a", 100, 50);
    assert_eq!(h.buffer_size(s), Some(Size::new(50, 100)));
}

#[rstest]
#[case(0)]
#[case(-2)]
fn test_non_positive_scale_is_rejected(#[case] scale: i32) {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    assert_eq!(
        protocol_error(h.engine.set_buffer_scale(s, scale)),
        ProtocolError::InvalidScale { surface: s, scale }
    );
}

#[test]
fn test_unknown_transform_is_rejected() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    assert_eq!(
        protocol_error(h.engine.set_buffer_transform(s, 8)),
        ProtocolError::InvalidTransform { surface: s, transform: 8 }
    );
}

#[test_log::test]
fn test_synchronized_subsurface_waits_for_parent() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    h.map(parent, "p", 100, 100);
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();

    h.map(child, "c", 20, 20);
    assert_eq!(h.buffer_size(child), None);
    assert!(h.submitted(child).is_empty());
    let role = h.engine.surface(child).unwrap().role().as_subsurface().unwrap();
    assert!(role.has_cached_state());

    h.engine.commit(parent).unwrap();
    assert_eq!(h.submitted(child), vec!["c"]);
    assert_eq!(h.buffer_size(child), Some(Size::new(20, 20)));
}

#[test]
fn test_synchronized_commits_merge_in_order() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();

    h.map(child, "a", 10, 10);
    h.engine.set_buffer_scale(child, 2).unwrap();
    let b = h.map(child, "b", 10, 10);
    h.engine.commit(parent).unwrap();

    assert_eq!(h.submitted(child), vec!["b"]);
    assert_eq!(h.buffer_size(child), Some(Size::new(5, 5)));
    assert_eq!(count(&b), 0);
}

#[test]
fn test_desynchronized_child_of_synchronized_parent_is_synchronized() {
    let mut h = Harness::new();
    let root = h.engine.create_surface();
    let middle = h.engine.create_surface();
    let leaf = h.engine.create_surface();
    h.engine.get_subsurface(middle, root).unwrap();
    h.engine.get_subsurface(leaf, middle).unwrap();
    h.engine.set_desync(leaf);

    assert!(h.engine.is_synchronized(leaf));
    h.map(leaf, "l", 4, 4);
    assert!(h.submitted(leaf).is_empty());

    h.engine.set_desync(middle);
    assert!(!h.engine.is_synchronized(leaf));
    h.engine.commit(leaf).unwrap();
    assert_eq!(h.submitted(leaf), vec!["l"]);
}

#[test]
fn test_subsurface_of_destroyed_parent_is_desynchronized() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();
    h.engine.set_desync(child);
    h.engine
        .destroy_surface(parent, DestroyReason::ClientRequest)
        .unwrap();

    assert!(!h.engine.is_synchronized(child));
    h.map(child, "c", 4, 4);
    assert_eq!(h.submitted(child), vec!["c"]);
}

#[test]
fn test_synchronized_subsurface_commits_alone_once_parent_is_gone() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();
    h.engine
        .destroy_surface(parent, DestroyReason::ClientRequest)
        .unwrap();
    assert!(!h.engine.is_synchronized(child));

    let done = Arc::new(AtomicUsize::new(0));
    let (buffer, _) = h.buffer("c", 8, 8);
    h.engine.attach(child, Some(buffer)).unwrap();
    h.engine.frame(child, callback(&done)).unwrap();
    h.engine.commit(child).unwrap();

    assert_eq!(h.submitted(child), vec!["c"]);
    let role = h.engine.surface(child).unwrap().role().as_subsurface().unwrap();
    assert!(!role.has_cached_state());
    h.consume(child);
    h.consume(child);
    h.flush();
    assert_eq!(count(&done), 1);
}

#[test]
fn test_subsurface_position_applies_on_parent_commit() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    h.engine.set_offset(parent, Point::new(5, 5)).unwrap();
    h.map(parent, "p", 100, 100);
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();

    h.engine.set_subsurface_position(child, Point::new(10, 20));
    assert_eq!(h.engine.total_offset(child).unwrap(), Point::new(5, 5));

    h.engine.commit(parent).unwrap();
    assert_eq!(h.engine.total_offset(child).unwrap(), Point::new(15, 25));
}

#[test]
fn test_stacking_reorder_applies_on_parent_commit() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    h.map(parent, "p", 100, 100);
    let first = h.engine.create_surface();
    let second = h.engine.create_surface();
    h.engine.get_subsurface(first, parent).unwrap();
    h.engine.get_subsurface(second, parent).unwrap();

    h.engine.place_below(second, parent).unwrap();
    let order = |h: &Harness| -> Vec<SurfaceId> {
        h.engine
            .surface_data(parent)
            .unwrap()
            .streams
            .iter()
            .map(|stream| stream.surface)
            .collect()
    };
    assert_eq!(order(&h), vec![parent, first, second]);

    h.engine.commit(parent).unwrap();
    assert_eq!(order(&h), vec![second, parent, first]);
}

#[test]
fn test_place_relative_to_a_stranger_is_rejected() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    let stranger = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();

    assert_eq!(
        protocol_error(h.engine.place_above(child, stranger)),
        ProtocolError::BadSibling { surface: child, sibling: stranger }
    );
}

#[test]
fn test_subsurface_parent_cycles_are_rejected() {
    let mut h = Harness::new();
    let a = h.engine.create_surface();
    let b = h.engine.create_surface();
    let c = h.engine.create_surface();
    h.engine.get_subsurface(b, a).unwrap();
    h.engine.get_subsurface(c, b).unwrap();

    assert_eq!(
        protocol_error(h.engine.get_subsurface(a, a)),
        ProtocolError::BadParent { surface: a, parent: a }
    );
    assert_eq!(
        protocol_error(h.engine.get_subsurface(a, c)),
        ProtocolError::BadParent { surface: a, parent: c }
    );
}

#[test]
fn test_role_is_assigned_once() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let toplevel = h.engine.create_surface();
    h.shell_role(toplevel);
    assert_eq!(
        protocol_error(h.engine.get_subsurface(toplevel, parent)),
        ProtocolError::BadSubsurface { surface: toplevel }
    );

    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();
    let shell = Box::new(FakeShellRole {
        scene: None,
        log: Rc::default(),
    });
    assert_eq!(
        protocol_error(h.engine.assign_role(child, shell)),
        ProtocolError::RoleAlreadyAssigned {
            surface: child,
            existing: RoleKind::Subsurface,
        }
    );

    // Losing the role object keeps the role kind.
    h.engine.destroy_subsurface(child);
    let shell = Box::new(FakeShellRole {
        scene: None,
        log: Rc::default(),
    });
    assert!(h.engine.assign_role(child, shell).is_err());
    h.engine.get_subsurface(child, parent).unwrap();
}

#[test]
fn test_destroying_surface_before_subsurface_role_is_defunct() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();

    assert_eq!(
        protocol_error(h.engine.destroy_surface(child, DestroyReason::ClientRequest)),
        ProtocolError::DefunctRoleObject { surface: child }
    );
    assert!(h.engine.contains(child));

    h.engine
        .destroy_surface(child, DestroyReason::ClientDisconnected)
        .unwrap();
    assert!(!h.engine.contains(child));
    assert!(!h.engine.surface(parent).unwrap().stacking().contains(child));
}

#[test]
fn test_destroying_subsurface_role_discards_cached_state() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    let (buffer, releases) = h.buffer("c", 4, 4);
    h.engine.attach(child, Some(buffer)).unwrap();
    h.engine.frame(child, callback(&done)).unwrap();
    h.engine.commit(child).unwrap();

    h.engine.destroy_subsurface(child);

    assert_eq!(count(&done), 1);
    assert_eq!(count(&releases), 1);
    h.engine.commit(parent).unwrap();
    assert!(h.submitted(child).is_empty());
}

#[test]
fn test_destroy_surface_returns_its_buffer() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let a = h.map(s, "a", 8, 8);
    h.engine.destroy_surface(s, DestroyReason::ClientRequest).unwrap();

    assert_eq!(h.streams.borrow().unmaps, vec![s]);
    assert_eq!(h.flush(), 1);
    assert_eq!(count(&a), 1);
    assert!(matches!(
        h.engine.commit(s),
        Err(EngineError::UnknownSurface(id)) if id == s
    ));
}

#[test]
fn test_viewport_crops_and_scales() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let viewport = h.engine.create_viewport(s).unwrap();
    h.engine
        .set_viewport_source(viewport, 10.0, 10.0, 50.0, 40.0)
        .unwrap();
    h.map(s, "a", 100, 100);

    let submission = h.last_submission(s).unwrap();
    assert_eq!(submission.source, RectangleF::new(10.0, 10.0, 50.0, 40.0));
    assert_eq!(submission.logical, Size::new(50, 40));

    h.engine.set_viewport_destination(viewport, 200, 160).unwrap();
    h.engine.commit(s).unwrap();
    assert_eq!(h.submitted(s), vec!["a", "a"]);
    assert_eq!(h.buffer_size(s), Some(Size::new(200, 160)));

    h.engine.destroy_viewport(viewport);
    h.engine.commit(s).unwrap();
    assert_eq!(h.buffer_size(s), Some(Size::new(100, 100)));
    assert_eq!(h.engine.surface(s).unwrap().viewport(), None);
}

#[test]
fn test_viewport_source_outside_buffer_is_rejected() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.map(s, "a", 100, 100);
    let viewport = h.engine.create_viewport(s).unwrap();
    h.engine
        .set_viewport_source(viewport, 60.0, 60.0, 50.0, 50.0)
        .unwrap();

    assert_eq!(
        protocol_error(h.engine.commit(s)),
        ProtocolError::ViewportOutOfBuffer { viewport }
    );
    assert_eq!(h.buffer_size(s), Some(Size::new(100, 100)));
}

#[test]
fn test_viewport_fractional_size_is_rejected() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.set_buffer_scale(s, 2).unwrap();
    let viewport = h.engine.create_viewport(s).unwrap();
    h.engine
        .set_viewport_source(viewport, 0.0, 0.0, 25.5, 25.0)
        .unwrap();
    let (buffer, _) = h.buffer("a", 100, 100);
    h.engine.attach(s, Some(buffer)).unwrap();

    assert_eq!(
        protocol_error(h.engine.commit(s)),
        ProtocolError::ViewportBadSize { viewport }
    );
}

#[test]
fn test_viewport_lifecycle_errors() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let viewport = h.engine.create_viewport(s).unwrap();
    assert_eq!(
        protocol_error(h.engine.create_viewport(s)),
        ProtocolError::ViewportExists { surface: s }
    );
    assert_eq!(
        protocol_error(h.engine.set_viewport_destination(viewport, 0, 10)),
        ProtocolError::ViewportBadValue { viewport, what: "destination" }
    );

    h.engine.destroy_viewport(viewport);
    let replacement = h.engine.create_viewport(s).unwrap();
    h.engine.destroy_surface(s, DestroyReason::ClientRequest).unwrap();
    assert_eq!(
        protocol_error(h.engine.set_viewport_source(replacement, 0.0, 0.0, 1.0, 1.0)),
        ProtocolError::ViewportNoSurface { viewport: replacement }
    );
}

#[test]
fn test_viewport_only_change_resubmits_current_buffer() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let log = h.shell_role(s);
    h.map(s, "a", 40, 40);
    let viewport = h.engine.create_viewport(s).unwrap();
    h.engine.set_viewport_destination(viewport, 40, 40).unwrap();
    let refreshes = log.borrow().refreshes.len();
    h.engine.commit(s).unwrap();

    assert_eq!(h.submitted(s), vec!["a", "a"]);
    assert_eq!(log.borrow().refreshes.len(), refreshes, "logical size is unchanged");
}

#[test_log::test]
fn test_acquire_point_defers_commit_and_later_commit_supersedes_it() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.create_sync_surface(s).unwrap();
    let timeline = Arc::new(RecordingTimeline::default());

    let (a, a_releases) = h.make_buffer("a", 32, 32, true);
    let (acquire, release) = timeline_points(&timeline, 1, 2);
    h.engine.attach(s, Some(a)).unwrap();
    h.engine.set_acquire_point(s, acquire).unwrap();
    h.engine.set_release_point(s, release).unwrap();
    h.engine.commit(s).unwrap();

    assert_eq!(h.engine.surface(s).unwrap().phase(), CommitPhase::WaitingOnFence);
    assert!(h.submitted(s).is_empty());
    let first = h.fences.borrow().watches[0].1;

    let (b, _) = h.make_buffer("b", 32, 32, true);
    let (acquire, release) = timeline_points(&timeline, 3, 4);
    h.engine.attach(s, Some(b)).unwrap();
    h.engine.set_acquire_point(s, acquire).unwrap();
    h.engine.set_release_point(s, release).unwrap();
    h.engine.commit(s).unwrap();

    assert_eq!(h.fences.borrow().cancelled, vec![first]);
    assert_eq!(timeline.signalled(), vec![2]);
    assert_eq!(count(&a_releases), 0, "the release point replaces wl_buffer.release");

    h.engine.acquire_fence_signalled(s, first).unwrap();
    assert!(h.submitted(s).is_empty());

    let second = h.fences.borrow().watches[1].1;
    h.engine.acquire_fence_signalled(s, second).unwrap();
    assert_eq!(h.submitted(s), vec!["b"]);
    assert_eq!(h.engine.surface(s).unwrap().phase(), CommitPhase::Idle);
    assert_eq!(h.fences.borrow().completed, vec![second]);

    h.engine.destroy_surface(s, DestroyReason::ClientRequest).unwrap();
    h.flush();
    assert_eq!(timeline.signalled(), vec![2, 4]);
}

#[test]
fn test_sync_surface_requires_points_and_capable_buffers() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.create_sync_surface(s).unwrap();
    assert_eq!(
        protocol_error(h.engine.create_sync_surface(s)),
        ProtocolError::SyncSurfaceExists { surface: s }
    );

    let (buffer, _) = h.make_buffer("a", 8, 8, true);
    h.engine.attach(s, Some(buffer)).unwrap();
    assert_eq!(
        protocol_error(h.engine.commit(s)),
        ProtocolError::SyncNoAcquirePoint { surface: s }
    );

    let timeline = Arc::new(RecordingTimeline::default());
    let (shm, _) = h.buffer("shm", 8, 8);
    let (acquire, release) = timeline_points(&timeline, 1, 2);
    h.engine.attach(s, Some(shm)).unwrap();
    h.engine.set_acquire_point(s, acquire).unwrap();
    h.engine.set_release_point(s, release).unwrap();
    assert_eq!(
        protocol_error(h.engine.commit(s)),
        ProtocolError::SyncUnsupportedBuffer { surface: s }
    );
}

#[test]
fn test_points_on_destroyed_surface_are_rejected() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.create_sync_surface(s).unwrap();
    h.engine.destroy_surface(s, DestroyReason::ClientRequest).unwrap();
    let timeline = Arc::new(RecordingTimeline::default());
    let (acquire, _) = timeline_points(&timeline, 1, 2);

    assert_eq!(
        protocol_error(h.engine.set_acquire_point(s, acquire)),
        ProtocolError::SyncNoSurface { surface: s }
    );
}

#[test]
fn test_failed_fence_wait_fails_only_that_commit() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.engine.create_sync_surface(s).unwrap();
    let timeline = Arc::new(RecordingTimeline::default());
    h.fences.borrow_mut().fail_next = true;

    let (a, _) = h.make_buffer("a", 8, 8, true);
    let (acquire, release) = timeline_points(&timeline, 1, 2);
    h.engine.attach(s, Some(a)).unwrap();
    h.engine.set_acquire_point(s, acquire).unwrap();
    h.engine.set_release_point(s, release).unwrap();
    assert!(matches!(h.engine.commit(s), Err(EngineError::Resource(_))));
    assert_eq!(timeline.signalled(), vec![2]);
    assert_eq!(h.engine.surface(s).unwrap().phase(), CommitPhase::Idle);

    let (b, _) = h.make_buffer("b", 8, 8, true);
    let (acquire, release) = timeline_points(&timeline, 3, 4);
    h.engine.attach(s, Some(b)).unwrap();
    h.engine.set_acquire_point(s, acquire).unwrap();
    h.engine.set_release_point(s, release).unwrap();
    h.engine.commit(s).unwrap();
    assert_eq!(h.engine.surface(s).unwrap().phase(), CommitPhase::WaitingOnFence);
}

#[test]
fn test_surface_data_input_shapes() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    h.map(s, "a", 100, 100);

    let data = h.engine.surface_data(s).unwrap();
    assert_eq!(data.streams, vec![StreamSpec { surface: s, offset: Point::ORIGIN }]);
    assert_eq!(data.input_shape, vec![Rectangle::new(0, 0, 100, 100)]);

    h.engine.set_input_region(s, Some(&Region::new())).unwrap();
    h.engine.commit(s).unwrap();
    assert_eq!(
        h.engine.surface_data(s).unwrap().input_shape,
        vec![Rectangle::default()]
    );

    let mut region = Region::new();
    region.add(Rectangle::new(10, 10, 200, 5));
    h.engine.set_input_region(s, Some(&region)).unwrap();
    h.engine.commit(s).unwrap();
    assert_eq!(
        h.engine.surface_data(s).unwrap().input_shape,
        vec![Rectangle::new(10, 10, 90, 5)]
    );
}

#[test]
fn test_surface_at_prefers_topmost_child() {
    let mut h = Harness::new();
    let parent = h.engine.create_surface();
    h.map(parent, "p", 100, 100);
    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, parent).unwrap();
    h.engine.set_subsurface_position(child, Point::new(10, 10));
    h.map(child, "c", 20, 20);
    h.engine.commit(parent).unwrap();

    assert_eq!(h.engine.surface_at(parent, Point::new(15, 15)), Some(child));
    assert_eq!(h.engine.surface_at(parent, Point::new(50, 50)), Some(parent));
    assert_eq!(h.engine.surface_at(parent, Point::new(150, 50)), None);

    h.engine.set_input_region(child, Some(&Region::new())).unwrap();
    h.engine.commit(child).unwrap();
    h.engine.commit(parent).unwrap();
    assert_eq!(h.engine.surface_at(parent, Point::new(15, 15)), Some(parent));
}

#[test]
fn test_scene_surface_listeners_fire_once() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    h.engine
        .on_scene_surface_created(s, move |_| counter.set(counter.get() + 1))
        .unwrap();
    assert_eq!(fired.get(), 0);

    h.shell_role(s);
    h.map(s, "a", 4, 4);
    assert_eq!(fired.get(), 1);

    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, s).unwrap();
    let parent_scene = h.engine.scene_surface(s).unwrap();
    let seen = Rc::new(RefCell::new(None));
    let slot = seen.clone();
    h.engine
        .on_scene_surface_created(child, move |scene| *slot.borrow_mut() = Some(scene.clone()))
        .unwrap();
    assert!(seen.borrow().as_ref().unwrap().ptr_eq(&parent_scene));
}

#[test]
fn test_shell_role_follows_commits_and_tree_changes() {
    let mut h = Harness::new();
    let s = h.engine.create_surface();
    let log = h.shell_role(s);
    h.map(s, "a", 30, 20);

    assert_eq!(
        log.borrow().commits.last().map(|c| c.buffer_size),
        Some(Some(Size::new(30, 20)))
    );
    assert_eq!(log.borrow().refreshes.len(), 1);

    let child = h.engine.create_surface();
    h.engine.get_subsurface(child, s).unwrap();
    h.engine.set_subsurface_position(child, Point::new(5, 5));
    h.engine.commit(s).unwrap();

    let refreshes = log.borrow();
    let latest = refreshes.refreshes.last().unwrap();
    assert_eq!(
        latest.streams,
        vec![
            StreamSpec { surface: s, offset: Point::ORIGIN },
            StreamSpec { surface: child, offset: Point::new(5, 5) },
        ]
    );
    drop(refreshes);

    h.engine.destroy_surface(s, DestroyReason::ClientRequest).unwrap();
    assert!(log.borrow().destroyed);
}
