//! Owner-thread scheduler for deferred invalidations, idle actions, clone
//! updates and background operation rebuilds.
//!
//! One scheduler serves one scene. It is installed on the scene root and
//! nodes find it by walking their ancestors. All node mutation happens on
//! the owner thread inside [`Scheduler::tick`]; background threads only see
//! [`CsgJob`] snapshots and send progress and meshes back over a channel.

mod executor;

pub use executor::Executor;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::csg::{BooleanKernel, CancellationToken, CsgJob, CsgSettings};
use crate::error::CsgError;
use crate::geometry::Mesh;
use crate::node::{InvalidateArgs, InvalidateType, Node, RebuildLock, WeakNode};
use crate::settings::EngineSettings;

struct DeferredInvalidation {
    node: WeakNode,
    invalidate_type: InvalidateType,
    due: Instant,
}

struct ActiveBuild {
    id: u64,
    node: Node,
    token: CancellationToken,
    progress: f64,
    // Held until the result is applied or the build is cancelled.
    _lock: RebuildLock,
}

enum BuildEvent {
    Progress { id: u64, ratio: f64, label: Option<String> },
    Finished { id: u64, result: Result<Mesh, CsgError> },
}

/// Called on the owner thread with the building node, its completed ratio
/// in `0.0..=1.0` and an optional stage label.
pub type ProgressObserver = dyn Fn(&Node, f64, Option<&str>);

pub struct Scheduler {
    csg_settings: CsgSettings,
    idle_interval: Duration,
    kernel: Arc<dyn BooleanKernel>,
    executor: Executor,
    deferred: RefCell<Vec<DeferredInvalidation>>,
    idle_actions: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    clone_updates: RefCell<Vec<WeakNode>>,
    builds: RefCell<Vec<ActiveBuild>>,
    events_tx: Sender<BuildEvent>,
    events_rx: Receiver<BuildEvent>,
    ready: RefCell<Vec<BuildEvent>>,
    progress_observers: RefCell<Vec<Rc<ProgressObserver>>>,
    next_build: Cell<u64>,
}

impl Scheduler {
    pub fn new(settings: &EngineSettings, kernel: Arc<dyn BooleanKernel>) -> Self {
        Self::with_executor(settings, kernel, Executor::new())
    }

    pub fn with_executor(settings: &EngineSettings, kernel: Arc<dyn BooleanKernel>, executor: Executor) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            csg_settings: CsgSettings::from(settings),
            idle_interval: settings.idle_interval(),
            kernel,
            executor,
            deferred: RefCell::new(Vec::new()),
            idle_actions: RefCell::new(VecDeque::new()),
            clone_updates: RefCell::new(Vec::new()),
            builds: RefCell::new(Vec::new()),
            events_tx,
            events_rx,
            ready: RefCell::new(Vec::new()),
            progress_observers: RefCell::new(Vec::new()),
            next_build: Cell::new(1),
        }
    }

    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    pub fn kernel(&self) -> Arc<dyn BooleanKernel> {
        self.kernel.clone()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    // ── Deferred invalidation ─────────────────────────────────

    /// Queue an invalidation of `node` to replay once it is unlocked.
    ///
    /// One entry per node: a repeat merges the flags and restarts the
    /// debounce interval.
    pub fn defer_invalidate(&self, node: &Node, invalidate_type: InvalidateType) {
        let due = Instant::now() + self.idle_interval;
        let weak = node.downgrade();
        let mut deferred = self.deferred.borrow_mut();
        if let Some(entry) = deferred.iter_mut().find(|e| e.node == weak) {
            entry.invalidate_type |= invalidate_type;
            entry.due = due;
        } else {
            tracing::debug!("deferring {:?} for {}", invalidate_type, node.id());
            deferred.push(DeferredInvalidation {
                node: weak,
                invalidate_type,
                due,
            });
        }
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.borrow().len()
    }

    // ── Idle actions ──────────────────────────────────────────

    /// Run `action` on the owner thread during the next tick.
    pub fn run_on_idle(&self, action: impl FnOnce() + 'static) {
        self.idle_actions.borrow_mut().push_back(Box::new(action));
    }

    // ── Clone updates ─────────────────────────────────────────

    /// Record that a clone-group member's mesh changed.
    pub fn clones_need_update(&self, node: &Node) {
        let weak = node.downgrade();
        let mut updates = self.clone_updates.borrow_mut();
        if !updates.contains(&weak) {
            updates.push(weak);
        }
    }

    pub fn has_clone_updates(&self) -> bool {
        !self.clone_updates.borrow().is_empty()
    }

    /// Drain the pending clone updates whose nodes are still alive.
    pub fn take_clone_updates(&self) -> Vec<Node> {
        std::mem::take(&mut *self.clone_updates.borrow_mut())
            .into_iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    // ── Background builds ─────────────────────────────────────

    /// Start rebuilding an operation node in the background.
    ///
    /// A build already running for the node is cancelled. The node stays
    /// rebuild-locked until the result is applied in [`Scheduler::tick`].
    pub fn request_rebuild(&self, node: &Node) {
        self.cancel_build(node);
        let Some(job) = CsgJob::from_node(node) else {
            return;
        };
        self.spawn_build(node, job);
    }

    /// Run `job` on the executor on behalf of `node`, holding a rebuild lock
    /// on the node until the result is applied.
    pub fn spawn_build(&self, node: &Node, job: CsgJob) {
        let id = self.next_build.get();
        self.next_build.set(id + 1);
        let token = CancellationToken::new();
        tracing::debug!(
            "build {} for {} with {} participants",
            id,
            node.id(),
            job.participant_count()
        );
        self.builds.borrow_mut().push(ActiveBuild {
            id,
            node: node.clone(),
            token: token.clone(),
            progress: 0.0,
            _lock: node.rebuild_lock(),
        });

        let kernel = self.kernel.clone();
        let settings = self.csg_settings;
        let tx = self.events_tx.clone();
        self.executor.spawn_blocking(move || {
            let progress_tx = tx.clone();
            let mut report = move |ratio: f64, label: Option<String>| {
                let _ = progress_tx.send(BuildEvent::Progress { id, ratio, label });
            };
            let result = job.run(kernel.as_ref(), settings, &mut report, &token);
            // the scheduler may be gone
            let _ = tx.send(BuildEvent::Finished { id, result });
        });
    }

    /// Register `observer` for progress of every background build.
    pub fn on_build_progress(&self, observer: impl Fn(&Node, f64, Option<&str>) + 'static) {
        self.progress_observers.borrow_mut().push(Rc::new(observer));
    }

    /// Last progress reported by the node's running build.
    pub fn build_progress(&self, node: &Node) -> Option<f64> {
        self.builds
            .borrow()
            .iter()
            .find(|b| b.node == *node)
            .map(|b| b.progress)
    }

    pub fn is_building(&self, node: &Node) -> bool {
        self.builds.borrow().iter().any(|b| b.node == *node)
    }

    pub fn active_build_count(&self) -> usize {
        self.builds.borrow().len()
    }

    /// Cancel the node's build, if any, and release its lock.
    pub fn cancel_build(&self, node: &Node) -> bool {
        let cancelled: Vec<ActiveBuild> = {
            let mut builds = self.builds.borrow_mut();
            let (cancelled, kept) = std::mem::take(&mut *builds)
                .into_iter()
                .partition(|b| b.node == *node);
            *builds = kept;
            cancelled
        };
        for build in &cancelled {
            tracing::debug!("cancelling build {} for {}", build.id, node.id());
            build.token.cancel();
        }
        !cancelled.is_empty()
    }

    /// Cancel every running build.
    pub fn cancel_all(&self) {
        let cancelled = std::mem::take(&mut *self.builds.borrow_mut());
        for build in &cancelled {
            build.token.cancel();
        }
    }

    // ── Tick ──────────────────────────────────────────────────

    pub fn has_pending_work(&self) -> bool {
        !self.builds.borrow().is_empty()
            || !self.deferred.borrow().is_empty()
            || !self.idle_actions.borrow().is_empty()
            || !self.ready.borrow().is_empty()
    }

    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// One scheduling pass at time `now`: run queued idle actions, replay
    /// due deferred invalidations, then apply build progress and results.
    pub fn tick_at(&self, now: Instant) {
        self.run_idle_actions();
        self.replay_deferred(now);
        self.apply_events();
    }

    fn run_idle_actions(&self) {
        let actions = std::mem::take(&mut *self.idle_actions.borrow_mut());
        for action in actions {
            action();
        }
    }

    fn replay_deferred(&self, now: Instant) {
        let due: Vec<DeferredInvalidation> = {
            let mut deferred = self.deferred.borrow_mut();
            let (due, waiting) = std::mem::take(&mut *deferred)
                .into_iter()
                .partition(|e| e.due <= now);
            *deferred = waiting;
            due
        };

        for entry in due {
            let Some(node) = entry.node.upgrade() else {
                continue;
            };
            if node.is_rebuild_locked() {
                let building: Vec<Node> = node
                    .ancestors_and_self()
                    .into_iter()
                    .filter(|n| self.is_building(n))
                    .collect();
                for n in &building {
                    self.cancel_build(n);
                }
                self.requeue(entry, now);
            } else {
                node.on_invalidate(&InvalidateArgs::new(&node, entry.invalidate_type));
            }
        }
    }

    fn requeue(&self, entry: DeferredInvalidation, now: Instant) {
        let mut deferred = self.deferred.borrow_mut();
        // a fresh request for the node may have arrived meanwhile
        if let Some(existing) = deferred.iter_mut().find(|e| e.node == entry.node) {
            existing.invalidate_type |= entry.invalidate_type;
        } else {
            deferred.push(DeferredInvalidation {
                due: now + self.idle_interval,
                ..entry
            });
        }
    }

    fn apply_events(&self) {
        let mut events = std::mem::take(&mut *self.ready.borrow_mut());
        events.extend(self.events_rx.try_iter());

        for event in events {
            match event {
                BuildEvent::Progress { id, ratio, label } => self.apply_progress(id, ratio, label),
                BuildEvent::Finished { id, result } => self.apply_result(id, result),
            }
        }
    }

    fn apply_progress(&self, id: u64, ratio: f64, label: Option<String>) {
        let update = {
            let mut builds = self.builds.borrow_mut();
            builds.iter_mut().find(|b| b.id == id).and_then(|build| {
                // never report going backwards
                let ratio = ratio.clamp(build.progress, 1.0);
                if ratio > build.progress || label.is_some() {
                    build.progress = ratio;
                    Some((build.node.clone(), ratio))
                } else {
                    None
                }
            })
        };
        let Some((node, ratio)) = update else {
            return;
        };
        tracing::trace!("build {} for {} at {:.0}%", id, node.id(), ratio * 100.0);
        let observers = self.progress_observers.borrow().clone();
        for observer in observers {
            observer(&node, ratio, label.as_deref());
        }
    }

    fn apply_result(&self, id: u64, result: Result<Mesh, CsgError>) {
        let build = {
            let mut builds = self.builds.borrow_mut();
            builds.iter().position(|b| b.id == id).map(|i| builds.remove(i))
        };
        let Some(build) = build else {
            tracing::debug!("discarding result of superseded build {}", id);
            return;
        };
        let node = build.node.clone();
        // unlock before the new mesh raises its invalidation
        drop(build);
        match result {
            Ok(mesh) => {
                tracing::debug!("build {} for {} produced {} triangles", id, node.id(), mesh.triangle_count());
                node.set_mesh(Some(Arc::new(mesh)));
            }
            Err(CsgError::Cancelled) => tracing::debug!("build {} for {} cancelled", id, node.id()),
            Err(e) => tracing::warn!("rebuild of {} failed: {}", node.id(), e),
        }
    }

    /// Block for at most `timeout` waiting for build progress or a result.
    pub fn wait(&self, timeout: Duration) {
        if self.builds.borrow().is_empty() {
            std::thread::sleep(timeout);
            return;
        }
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => self.ready.borrow_mut().push(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("build result channel disconnected");
            }
        }
    }

    /// Tick until nothing is pending or `timeout` elapses; `true` when idle.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            if !self.has_pending_work() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait((deadline - now).min(self.idle_interval.max(Duration::from_millis(1))));
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for build in self.builds.get_mut().iter() {
            build.token.cancel();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("executor", &self.executor)
            .field("deferred", &self.deferred.borrow().len())
            .field("idle_actions", &self.idle_actions.borrow().len())
            .field("builds", &self.builds.borrow().len())
            .finish()
    }
}
