//! Scene graph node.
//!
//! A [`Node`] is a cheap, clonable handle to shared node state. Children are
//! owned by their parent; the parent link is a [`WeakNode`] back-reference
//! maintained by the child-collection operations below.

pub mod invalidate;
pub mod kind;
pub mod rebuild_lock;
pub mod traverse;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use glam::Mat4;
use shared::{AssetRef, CloneGroupId, Color, NodeId, OutputType};

pub use invalidate::{InvalidateArgs, InvalidateType, ListenerId, PropertyFlags};
pub use kind::{HasNodeReferences, NodeKind, SubtractOperation};
pub use rebuild_lock::{RebuildLock, RebuildLocks};

use crate::bvh::Traceable;
use crate::geometry::{sanitize_matrix, Aabb, Mesh, SharedMesh};
use crate::schedule::Scheduler;

type Listener = Rc<dyn Fn(&Node, &InvalidateArgs)>;

pub(crate) struct NodeData {
    id: NodeId,
    owner_id: Option<NodeId>,
    clone_id: Option<CloneGroupId>,
    clone_update_count: u64,
    name: String,
    matrix: Mat4,
    mesh: Option<SharedMesh>,
    mesh_path: Option<AssetRef>,
    color: Color,
    output_type: OutputType,
    visible: bool,
    persistable: bool,
    kind: NodeKind,
    parent: WeakNode,
    children: Vec<Node>,
    /// Shared with outstanding [`RebuildLock`] guards
    rebuild_lock_count: Rc<Cell<i32>>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
    /// (content hash, traceable) of the last BVH build
    trace_cache: Option<(u64, Arc<Traceable>)>,
    /// Installed on scene roots only
    scheduler: Option<Rc<Scheduler>>,
}

impl NodeData {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            owner_id: None,
            clone_id: None,
            clone_update_count: 0,
            name: String::new(),
            matrix: Mat4::IDENTITY,
            mesh: None,
            mesh_path: None,
            color: Color::TRANSPARENT,
            output_type: OutputType::Default,
            visible: true,
            persistable: true,
            kind: NodeKind::Object,
            parent: WeakNode::default(),
            children: Vec::new(),
            rebuild_lock_count: Rc::new(Cell::new(0)),
            listeners: Vec::new(),
            next_listener_id: 0,
            trace_cache: None,
            scheduler: None,
        }
    }
}

/// Handle to a node in the scene tree. Equality is identity.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

/// Non-owning back-reference to a node.
#[derive(Clone, Default)]
pub struct WeakNode(Weak<RefCell<NodeData>>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl PartialEq for WeakNode {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Node")
            .field("id", &data.id)
            .field("name", &data.name)
            .field("kind", &data.kind)
            .field("children", &data.children.len())
            .finish()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh random node id.
pub fn new_id() -> NodeId {
    uuid::Uuid::new_v4().to_string()
}

impl Node {
    /// Empty node with a fresh id.
    pub fn new() -> Self {
        Self::with_id(new_id())
    }

    pub fn with_id(id: impl Into<NodeId>) -> Self {
        Node(Rc::new(RefCell::new(NodeData::new(id.into()))))
    }

    pub fn with_mesh(mesh: Mesh) -> Self {
        let node = Self::new();
        node.set_mesh_direct(Some(Arc::new(mesh)));
        node
    }

    pub fn with_kind(kind: NodeKind) -> Self {
        let node = Self::new();
        node.0.borrow_mut().kind = kind;
        node
    }

    /// Detached node with this node's own fields and id. Mesh, children,
    /// listeners, locks and caches are not copied.
    pub(crate) fn copy_fields(&self) -> Node {
        let data = self.0.borrow();
        let mut copy = NodeData::new(data.id.clone());
        copy.owner_id = data.owner_id.clone();
        copy.clone_id = data.clone_id.clone();
        copy.clone_update_count = data.clone_update_count;
        copy.name = data.name.clone();
        copy.matrix = data.matrix;
        copy.mesh_path = data.mesh_path.clone();
        copy.color = data.color;
        copy.output_type = data.output_type;
        copy.visible = data.visible;
        copy.persistable = data.persistable;
        copy.kind = data.kind.clone();
        Node(Rc::new(RefCell::new(copy)))
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ── Identity ──────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.0.borrow().id.clone()
    }

    pub(crate) fn set_id(&self, id: NodeId) {
        self.0.borrow_mut().id = id;
    }

    pub fn owner_id(&self) -> Option<NodeId> {
        self.0.borrow().owner_id.clone()
    }

    pub fn set_owner_id(&self, owner_id: Option<NodeId>) {
        self.0.borrow_mut().owner_id = owner_id;
    }

    pub fn clone_id(&self) -> Option<CloneGroupId> {
        self.0.borrow().clone_id.clone()
    }

    pub fn set_clone_id(&self, clone_id: Option<CloneGroupId>) {
        self.0.borrow_mut().clone_id = clone_id;
    }

    pub fn clone_update_count(&self) -> u64 {
        self.0.borrow().clone_update_count
    }

    pub fn set_clone_update_count(&self, count: u64) {
        self.0.borrow_mut().clone_update_count = count;
    }

    // ── Properties ────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        {
            let mut data = self.0.borrow_mut();
            if data.name == name {
                return;
            }
            data.name = name;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::NAME));
    }

    pub fn matrix(&self) -> Mat4 {
        self.0.borrow().matrix
    }

    /// Assign the local transform. Non-finite or singular matrices become the
    /// identity.
    pub fn set_matrix(&self, matrix: Mat4) {
        let matrix = sanitize_matrix(matrix);
        {
            let mut data = self.0.borrow_mut();
            if data.matrix == matrix {
                return;
            }
            data.matrix = matrix;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::MATRIX));
    }

    pub(crate) fn set_matrix_direct(&self, matrix: Mat4) {
        self.0.borrow_mut().matrix = sanitize_matrix(matrix);
    }

    pub fn mesh(&self) -> Option<SharedMesh> {
        self.0.borrow().mesh.clone()
    }

    pub fn has_mesh(&self) -> bool {
        self.0.borrow().mesh.is_some()
    }

    /// Replace the mesh.
    ///
    /// Clears the trace cache and the lazy `mesh_path`. A node in a clone
    /// group bumps its update count and is queued for clone synchronization.
    pub fn set_mesh(&self, mesh: Option<SharedMesh>) {
        let needs_clone_update = {
            let mut data = self.0.borrow_mut();
            let same = match (&data.mesh, &mesh) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return;
            }
            data.mesh = mesh;
            data.trace_cache = None;
            data.mesh_path = None;
            if data.clone_id.is_some() {
                data.clone_update_count += 1;
                true
            } else {
                false
            }
        };
        if needs_clone_update {
            match self.scheduler() {
                Some(scheduler) => scheduler.clones_need_update(self),
                None => tracing::debug!("clone {} changed outside a scene", self.id()),
            }
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::MESH));
    }

    /// Assign the mesh without invalidation or clone bookkeeping.
    pub fn set_mesh_direct(&self, mesh: Option<SharedMesh>) {
        let mut data = self.0.borrow_mut();
        data.mesh = mesh;
        data.trace_cache = None;
    }

    pub fn mesh_path(&self) -> Option<AssetRef> {
        self.0.borrow().mesh_path.clone()
    }

    pub fn set_mesh_path(&self, path: Option<AssetRef>) {
        self.0.borrow_mut().mesh_path = path;
    }

    pub fn color(&self) -> Color {
        self.0.borrow().color
    }

    pub fn set_color(&self, color: Color) {
        {
            let mut data = self.0.borrow_mut();
            if data.color == color {
                return;
            }
            data.color = color;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::COLOR));
    }

    pub fn output_type(&self) -> OutputType {
        self.0.borrow().output_type
    }

    pub fn set_output_type(&self, output_type: OutputType) {
        {
            let mut data = self.0.borrow_mut();
            if data.output_type == output_type {
                return;
            }
            data.output_type = output_type;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::OUTPUT_TYPE));
    }

    pub fn visible(&self) -> bool {
        self.0.borrow().visible
    }

    pub fn set_visible(&self, visible: bool) {
        {
            let mut data = self.0.borrow_mut();
            if data.visible == visible {
                return;
            }
            data.visible = visible;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::VISIBILITY));
    }

    pub fn persistable(&self) -> bool {
        self.0.borrow().persistable
    }

    pub fn set_persistable(&self, persistable: bool) {
        self.0.borrow_mut().persistable = persistable;
    }

    pub fn kind(&self) -> NodeKind {
        self.0.borrow().kind.clone()
    }

    pub fn set_kind(&self, kind: NodeKind) {
        self.0.borrow_mut().kind = kind;
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::PROPERTIES));
    }

    /// Mutate the kind in place without invalidation.
    pub fn with_kind_mut<R>(&self, f: impl FnOnce(&mut NodeKind) -> R) -> R {
        f(&mut self.0.borrow_mut().kind)
    }

    pub fn is_operation(&self) -> bool {
        self.0.borrow().kind.is_operation()
    }

    pub fn is_selection_group(&self) -> bool {
        self.0.borrow().kind.is_selection_group()
    }

    /// Copy the flagged properties from `from`, firing the usual invalidation.
    pub fn copy_properties(&self, from: &Node, flags: PropertyFlags) {
        if flags.contains(PropertyFlags::MATRIX) {
            self.set_matrix(from.matrix());
        }
        if flags.contains(PropertyFlags::COLOR) {
            self.set_color(from.color());
        }
        if flags.contains(PropertyFlags::OUTPUT_TYPE) {
            self.set_output_type(from.output_type());
        }
        if flags.contains(PropertyFlags::NAME) {
            self.set_name(from.name());
        }
        if flags.contains(PropertyFlags::VISIBLE) {
            self.set_visible(from.visible());
        }
    }

    // ── Children ──────────────────────────────────────────────

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade()
    }

    pub(crate) fn set_parent(&self, parent: Option<&Node>) {
        self.0.borrow_mut().parent = parent.map(Node::downgrade).unwrap_or_default();
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.borrow().children.get(index).cloned()
    }

    pub fn child_index(&self, child: &Node) -> Option<usize> {
        self.0.borrow().children.iter().position(|c| c == child)
    }

    pub fn add_child(&self, child: Node) {
        let index = self.child_count();
        self.insert_child(index, child);
    }

    /// Insert `child` at `index` (clamped), detaching it from any previous parent.
    pub fn insert_child(&self, index: usize, child: Node) {
        if let Some(old_parent) = child.parent() {
            old_parent.detach_child(&child);
        }
        child.set_parent(Some(self));
        {
            let mut data = self.0.borrow_mut();
            let index = index.min(data.children.len());
            data.children.insert(index, child.clone());
        }
        self.invalidate(&InvalidateArgs::new(&child, InvalidateType::CHILDREN));
    }

    /// Remove `child`; returns false when it is not a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        if !self.detach_child(child) {
            return false;
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::CHILDREN));
        true
    }

    /// Swap `old` for `new` at the same position.
    pub fn replace_child(&self, old: &Node, new: Node) -> bool {
        let Some(index) = self.child_index(old) else {
            return false;
        };
        if let Some(new_parent) = new.parent() {
            new_parent.detach_child(&new);
        }
        {
            let mut data = self.0.borrow_mut();
            // detaching `new` from this same node can shift the index
            let index = data.children.iter().position(|c| c == old).unwrap_or(index);
            data.children[index] = new.clone();
        }
        if old.parent().as_ref() == Some(self) {
            old.set_parent(None);
        }
        new.set_parent(Some(self));
        self.invalidate(&InvalidateArgs::new(&new, InvalidateType::CHILDREN));
        true
    }

    /// Replace the whole child list without invalidation.
    pub(crate) fn set_children_direct(&self, children: Vec<Node>) {
        for old in self.children() {
            if old.parent().as_ref() == Some(self) {
                old.set_parent(None);
            }
        }
        for child in &children {
            child.set_parent(Some(self));
        }
        self.0.borrow_mut().children = children;
    }

    fn detach_child(&self, child: &Node) -> bool {
        let removed = {
            let mut data = self.0.borrow_mut();
            match data.children.iter().position(|c| c == child) {
                Some(index) => {
                    data.children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed && child.parent().as_ref() == Some(self) {
            child.set_parent(None);
        }
        removed
    }

    pub fn remove_all_children(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in &children {
            child.set_parent(None);
        }
        self.invalidate(&InvalidateArgs::new(self, InvalidateType::CHILDREN));
    }

    // ── World queries ─────────────────────────────────────────

    /// Accumulated transform from this node up to the root, or up to
    /// `root_override` (included only when `including_root`).
    pub fn world_matrix(&self, root_override: Option<&Node>, including_root: bool) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        for item in self.ancestors_and_self() {
            let is_root = root_override.is_some_and(|r| *r == item);
            if is_root && !including_root {
                break;
            }
            matrix = item.matrix() * matrix;
            if is_root {
                break;
            }
        }
        matrix
    }

    /// Color of the nearest node (self first) that is not transparent; white otherwise.
    pub fn world_color(&self, root_override: Option<&Node>) -> Color {
        for item in self.ancestors_and_self() {
            let color = item.color();
            if !color.is_transparent() {
                return color;
            }
            if root_override.is_some_and(|r| *r == item) {
                break;
            }
        }
        Color::WHITE
    }

    /// Output type of the nearest node (self first) that overrides `Default`.
    pub fn world_output_type(&self, root_override: Option<&Node>) -> OutputType {
        for item in self.ancestors_and_self() {
            let output_type = item.output_type();
            if output_type != OutputType::Default {
                return output_type;
            }
            if root_override.is_some_and(|r| *r == item) {
                break;
            }
        }
        OutputType::Default
    }

    pub fn world_visible(&self, root_override: Option<&Node>) -> bool {
        for item in self.ancestors_and_self() {
            if !item.visible() {
                return false;
            }
            if root_override.is_some_and(|r| *r == item) {
                break;
            }
        }
        true
    }

    pub fn world_persistable(&self, root_override: Option<&Node>) -> bool {
        for item in self.ancestors_and_self() {
            if !item.persistable() {
                return false;
            }
            if root_override.is_some_and(|r| *r == item) {
                break;
            }
        }
        true
    }

    /// Nodes that contribute geometry: visible mesh owners, without descending
    /// below a node that has a mesh or into hidden subtrees.
    pub fn visible_meshes(&self) -> Vec<Node> {
        let mut found = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(item) = stack.pop() {
            if !item.visible() {
                continue;
            }
            if item.has_mesh() {
                found.push(item);
                continue;
            }
            for child in item.children().into_iter().rev() {
                stack.push(child);
            }
        }
        found
    }

    /// Bounds of this subtree with `matrix` applied on top of the local transform.
    pub fn aabb(&self, matrix: &Mat4) -> Aabb {
        let total = *matrix * self.matrix();
        let own = match self.mesh() {
            Some(mesh) => mesh.aabb(&total),
            None => Aabb::empty(),
        };
        if self.has_mesh() {
            return own;
        }
        self.children()
            .iter()
            .fold(own, |acc, child| acc.union(&child.aabb(&total)))
    }

    /// Bounds in world space.
    pub fn world_aabb(&self) -> Aabb {
        let parent_matrix = self
            .parent()
            .map(|p| p.world_matrix(None, true))
            .unwrap_or(Mat4::IDENTITY);
        self.aabb(&parent_matrix)
    }

    // ── Scheduler / caches ────────────────────────────────────

    /// Install the scheduler that services this subtree.
    pub fn install_scheduler(&self, scheduler: Rc<Scheduler>) {
        self.0.borrow_mut().scheduler = Some(scheduler);
    }

    /// Nearest installed scheduler, searching self then ancestors.
    pub fn scheduler(&self) -> Option<Rc<Scheduler>> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(s) = node.0.borrow().scheduler.clone() {
                return Some(s);
            }
            current = node.parent();
        }
        None
    }

    pub(crate) fn trace_cache(&self) -> Option<(u64, Arc<Traceable>)> {
        self.0.borrow().trace_cache.clone()
    }

    pub(crate) fn set_trace_cache(&self, hash: u64, traceable: Arc<Traceable>) {
        self.0.borrow_mut().trace_cache = Some((hash, traceable));
    }

    /// Ids mapped to nodes for the whole subtree.
    pub fn index_by_id(&self) -> HashMap<NodeId, Node> {
        self.descendants_and_self()
            .into_iter()
            .map(|n| (n.id(), n))
            .collect()
    }
}
