//! Editable scene: a root node with selection, undo history, background
//! rebuilds, asset storage and picking.

mod operations;
mod selection;

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::assets::AssetCache;
use crate::bvh::get_bvh_with;
use crate::clone::synchronize_clones;
use crate::csg::{merge_for_export, BooleanKernel, CancellationToken, CsgOption, CsgSettings, ManifoldKernel};
use crate::error::{CsgError, PersistenceError};
use crate::geometry::{Mesh, Ray};
use crate::history::UndoBuffer;
use crate::node::Node;
use crate::persistence::{self, CacheContext};
use crate::schedule::Scheduler;
use crate::settings::EngineSettings;

pub struct Scene {
    root: Node,
    selected: Option<Node>,
    selected_root: Option<Node>,
    undo: UndoBuffer,
    scheduler: Rc<Scheduler>,
    assets: AssetCache,
    kernel: Arc<dyn BooleanKernel>,
    settings: EngineSettings,
    save_point: u64,
}

impl Scene {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_kernel(settings, Arc::new(ManifoldKernel))
    }

    pub fn with_kernel(settings: EngineSettings, kernel: Arc<dyn BooleanKernel>) -> Self {
        let scheduler = Rc::new(Scheduler::new(&settings, kernel.clone()));
        let assets = AssetCache::from_settings(&settings, scheduler.executor().clone());
        let root = Node::new();
        root.set_name("Scene");
        root.install_scheduler(scheduler.clone());
        let undo = UndoBuffer::new(settings.undo_limit);
        let save_point = undo.long_hash();
        Self {
            root,
            selected: None,
            selected_root: None,
            undo,
            scheduler,
            assets,
            kernel,
            settings,
            save_point,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    pub fn undo_buffer(&self) -> &UndoBuffer {
        &self.undo
    }

    /// Replace the whole tree. Selection and history are reset and running
    /// builds of the old tree are cancelled.
    pub fn set_root(&mut self, root: Node) {
        self.selected = None;
        self.selected_root = None;
        self.scheduler.cancel_all();
        root.install_scheduler(self.scheduler.clone());
        self.root = root;
        self.undo.clear();
        self.mark_save_point();
    }

    // ── Save point ────────────────────────────────────────────

    pub fn mark_save_point(&mut self) {
        self.save_point = self.undo.long_hash();
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.undo.long_hash() != self.save_point
    }

    // ── Idle processing ───────────────────────────────────────

    /// One scheduler tick followed by clone synchronization.
    pub fn process_idle(&mut self) {
        self.scheduler.tick();
        let updated = self.scheduler.take_clone_updates();
        if updated.is_empty() {
            return;
        }
        match synchronize_clones(&self.root, &updated) {
            Ok(replaced) => tracing::debug!("synchronized {} clones", replaced),
            Err(e) => tracing::error!("clone synchronization failed: {}", e),
        }
    }

    pub fn has_pending_work(&self) -> bool {
        self.scheduler.has_pending_work() || self.scheduler.has_clone_updates()
    }

    /// Process idle work until nothing is pending; `false` on timeout.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_idle();
            if !self.has_pending_work() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("scene still busy after {:?}", timeout);
                return false;
            }
            let step = self.scheduler.idle_interval().max(Duration::from_millis(1));
            self.scheduler.wait((deadline - now).min(step));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Nearest visible top-level item hit by `ray`, with the hit distance.
    pub fn pick(&self, ray: &Ray) -> Option<(Node, f32)> {
        let local = ray.to_local(&self.root.world_matrix(None, true));
        self.root
            .children()
            .into_iter()
            .filter(|c| c.visible())
            .filter_map(|c| {
                let t = get_bvh_with(&c, self.settings.bvh_leaf_size).trace(&local)?;
                Some((c, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// The scene flattened into one printable mesh.
    pub fn export_mesh(&self, option: CsgOption) -> Result<Option<Mesh>, CsgError> {
        merge_for_export(
            &self.root,
            option,
            self.kernel.as_ref(),
            CsgSettings::from(&self.settings),
            &mut |ratio: f64, label: Option<String>| tracing::trace!("export {:.0}% {}", ratio * 100.0, label.unwrap_or_default()),
            &CancellationToken::new(),
        )
    }

    // ── Files ─────────────────────────────────────────────────

    /// Run `f` with the selection group dissolved, then reselect.
    fn with_selection_collapsed<R>(&mut self, f: impl FnOnce(&Scene) -> R) -> R {
        let selected = self.selected_items();
        self.clear_selection();
        let result = f(self);
        if !selected.is_empty() {
            if let Err(e) = self.set_selection(&selected) {
                tracing::warn!("could not restore selection: {}", e);
            }
        }
        result
    }

    /// Save to a `.mcx` document. The selection is collapsed while saving
    /// and restored afterwards.
    pub fn save(&mut self, path: &Path) -> Result<(), PersistenceError> {
        self.with_selection_collapsed(|scene| persistence::save_scene(&scene.root, path, &scene.assets))?;
        self.mark_save_point();
        Ok(())
    }

    /// Serialize the scene, storing meshes in the asset cache. The selection
    /// is collapsed while serializing and restored afterwards.
    pub fn to_json(&mut self) -> Result<String, PersistenceError> {
        self.with_selection_collapsed(|scene| persistence::document_to_string(&scene.root, Some(&scene.assets)))
    }

    /// Replace the scene with a serialized document whose meshes live in the
    /// asset cache.
    pub fn load_json(&mut self, text: &str) -> Result<(), PersistenceError> {
        let max_depth = self.settings.max_document_depth;
        let document = persistence::parse_document(text, max_depth)?;
        let root = persistence::from_document(&document.root, max_depth)?;
        let placeholders = persistence::load_mesh_links(&root, &mut CacheContext::new(), &self.assets, &mut |_, _| {});
        if placeholders > 0 {
            tracing::warn!("{} meshes could not be loaded", placeholders);
        }
        self.set_root(root);
        Ok(())
    }

    /// Replace the scene with the contents of `path`.
    pub fn load(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let mut context = CacheContext::new();
        let root = persistence::try_load(path, &mut context, &self.settings)?;
        let placeholders = persistence::load_mesh_links(&root, &mut context, &self.assets, &mut |_, _| {});
        if placeholders > 0 {
            tracing::warn!("{} meshes of {} could not be loaded", placeholders, path.display());
        }
        // a bare mesh file becomes the only item of a fresh scene
        let root = if root.has_mesh() {
            let scene_root = Node::new();
            scene_root.set_name("Scene");
            scene_root.add_child(root);
            scene_root
        } else {
            root
        };
        self.set_root(root);
        tracing::info!("loaded {}", path.display());
        Ok(())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("root", &self.root)
            .field("selected", &self.selected)
            .field("undo", &self.undo.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
