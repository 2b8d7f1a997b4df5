//! Undo/redo command log.
//!
//! Structural commands mutate the tree while the affected parent is
//! rebuild-locked, then raise a single `CHILDREN` invalidation once the
//! lock is released.

use glam::Mat4;
use shared::OutputType;

use crate::error::SceneError;
use crate::geometry::{hash_u64, FNV_SEED};
use crate::node::{InvalidateArgs, InvalidateType, Node};

/// A reversible edit.
pub trait UndoRedoCommand {
    fn execute(&mut self);
    fn undo(&mut self);
    fn name(&self) -> &str;
}

fn invalidate_children(parent: &Node, source: Option<&Node>) {
    let source = source.unwrap_or(parent);
    parent.invalidate(&InvalidateArgs::new(source, InvalidateType::CHILDREN));
}

// ── Replace ───────────────────────────────────────────────────

/// Swap a set of siblings for a new set at the same position.
pub struct ReplaceCommand {
    parent: Node,
    /// Original positions, ascending.
    old: Vec<(usize, Node)>,
    new: Vec<Node>,
    insert_at: usize,
}

impl ReplaceCommand {
    /// Replace `old` (siblings under one parent) with `new`, inserted where
    /// the first of `old` was.
    pub fn new(old: Vec<Node>, new: Vec<Node>) -> Result<Self, SceneError> {
        let first = old.first().ok_or(SceneError::NothingSelected)?;
        let parent = first.parent().ok_or_else(|| SceneError::Detached(first.id()))?;
        let mut positions = Vec::with_capacity(old.len());
        for item in old {
            if item.parent().as_ref() != Some(&parent) {
                return Err(SceneError::NoSharedParent);
            }
            let index = parent.child_index(&item).ok_or_else(|| SceneError::Detached(item.id()))?;
            positions.push((index, item));
        }
        positions.sort_by_key(|(i, _)| *i);
        let insert_at = positions[0].0;
        Ok(Self {
            parent,
            old: positions,
            new,
            insert_at,
        })
    }

    /// Add `items` under `parent` starting at `index`.
    pub fn insert(parent: &Node, index: usize, items: Vec<Node>) -> Self {
        Self {
            parent: parent.clone(),
            old: Vec::new(),
            new: items,
            insert_at: index,
        }
    }

    /// Take `items` out of their shared parent.
    pub fn remove(items: Vec<Node>) -> Result<Self, SceneError> {
        Self::new(items, Vec::new())
    }

    pub fn parent(&self) -> &Node {
        &self.parent
    }

    fn first_item(&self) -> Option<Node> {
        self.new.first().or_else(|| self.old.first().map(|(_, n)| n)).cloned()
    }
}

impl UndoRedoCommand for ReplaceCommand {
    fn execute(&mut self) {
        {
            let _lock = self.parent.rebuild_lock();
            for (_, item) in self.old.iter().rev() {
                self.parent.remove_child(item);
            }
            for (offset, item) in self.new.iter().enumerate() {
                self.parent.insert_child(self.insert_at + offset, item.clone());
            }
        }
        invalidate_children(&self.parent, self.first_item().as_ref());
    }

    fn undo(&mut self) {
        {
            let _lock = self.parent.rebuild_lock();
            for item in &self.new {
                self.parent.remove_child(item);
            }
            for (index, item) in &self.old {
                self.parent.insert_child(*index, item.clone());
            }
        }
        invalidate_children(&self.parent, self.first_item().as_ref());
    }

    fn name(&self) -> &str {
        match (self.old.is_empty(), self.new.is_empty()) {
            (true, _) => "Add",
            (_, true) => "Delete",
            _ => "Replace",
        }
    }
}

// ── Group / ungroup ───────────────────────────────────────────

/// Move siblings into a container node placed where the first of them was.
///
/// Operation containers are asked to rebuild after the move.
pub struct GroupCommand {
    parent: Node,
    group: Node,
    items: Vec<(usize, Node)>,
}

impl GroupCommand {
    pub fn new(items: Vec<Node>, group: Node) -> Result<Self, SceneError> {
        let replace = ReplaceCommand::new(items, Vec::new())?;
        Ok(Self {
            parent: replace.parent,
            group,
            items: replace.old,
        })
    }

    pub fn group(&self) -> &Node {
        &self.group
    }
}

impl UndoRedoCommand for GroupCommand {
    fn execute(&mut self) {
        let insert_at = self.items.first().map(|(i, _)| *i).unwrap_or(0);
        {
            let _lock = self.parent.rebuild_lock();
            let _group_lock = self.group.rebuild_lock();
            for (_, item) in &self.items {
                self.parent.remove_child(item);
                self.group.add_child(item.clone());
            }
            self.parent.insert_child(insert_at, self.group.clone());
        }
        invalidate_children(&self.parent, Some(&self.group));
        if self.group.is_operation() {
            self.group
                .invalidate(&InvalidateArgs::new(&self.group, InvalidateType::PROPERTIES));
        }
    }

    fn undo(&mut self) {
        if let Some(scheduler) = self.group.scheduler() {
            scheduler.cancel_build(&self.group);
        }
        {
            let _lock = self.parent.rebuild_lock();
            let _group_lock = self.group.rebuild_lock();
            self.parent.remove_child(&self.group);
            for (index, item) in &self.items {
                self.group.remove_child(item);
                self.parent.insert_child(*index, item.clone());
            }
        }
        invalidate_children(&self.parent, self.items.first().map(|(_, n)| n));
    }

    fn name(&self) -> &str {
        if self.group.is_operation() {
            "Wrap"
        } else {
            "Group"
        }
    }
}

/// Dissolve a container, baking its transform into each child.
pub struct UngroupCommand {
    parent: Node,
    group: Node,
    index: usize,
    /// Children with their matrices inside the group.
    children: Vec<(Node, Mat4)>,
}

impl UngroupCommand {
    pub fn new(group: Node) -> Result<Self, SceneError> {
        let parent = group.parent().ok_or_else(|| SceneError::Detached(group.id()))?;
        let index = parent.child_index(&group).ok_or_else(|| SceneError::Detached(group.id()))?;
        let children = group.children().into_iter().map(|c| {
            let matrix = c.matrix();
            (c, matrix)
        });
        Ok(Self {
            parent,
            index,
            children: children.collect(),
            group,
        })
    }

    pub fn children(&self) -> Vec<Node> {
        self.children.iter().map(|(c, _)| c.clone()).collect()
    }
}

impl UndoRedoCommand for UngroupCommand {
    fn execute(&mut self) {
        if let Some(scheduler) = self.group.scheduler() {
            scheduler.cancel_build(&self.group);
        }
        let group_matrix = self.group.matrix();
        {
            let _lock = self.parent.rebuild_lock();
            let _group_lock = self.group.rebuild_lock();
            self.parent.remove_child(&self.group);
            for (offset, (child, matrix)) in self.children.iter().enumerate() {
                self.group.remove_child(child);
                child.set_matrix(group_matrix * *matrix);
                self.parent.insert_child(self.index + offset, child.clone());
            }
        }
        invalidate_children(&self.parent, self.children.first().map(|(c, _)| c));
    }

    fn undo(&mut self) {
        {
            let _lock = self.parent.rebuild_lock();
            let _group_lock = self.group.rebuild_lock();
            for (child, matrix) in &self.children {
                self.parent.remove_child(child);
                child.set_matrix(*matrix);
                self.group.add_child(child.clone());
            }
            self.parent.insert_child(self.index, self.group.clone());
        }
        invalidate_children(&self.parent, Some(&self.group));
    }

    fn name(&self) -> &str {
        "Ungroup"
    }
}

// ── Property commands ─────────────────────────────────────────

pub struct MatrixCommand {
    node: Node,
    before: Mat4,
    after: Mat4,
}

impl MatrixCommand {
    pub fn new(node: &Node, before: Mat4, after: Mat4) -> Self {
        Self {
            node: node.clone(),
            before,
            after,
        }
    }
}

impl UndoRedoCommand for MatrixCommand {
    fn execute(&mut self) {
        self.node.set_matrix(self.after);
    }

    fn undo(&mut self) {
        self.node.set_matrix(self.before);
    }

    fn name(&self) -> &str {
        "Transform"
    }
}

pub struct SetOutputTypeCommand {
    items: Vec<(Node, OutputType)>,
    output_type: OutputType,
}

impl SetOutputTypeCommand {
    pub fn new(items: &[Node], output_type: OutputType) -> Self {
        Self {
            items: items.iter().map(|n| (n.clone(), n.output_type())).collect(),
            output_type,
        }
    }
}

impl UndoRedoCommand for SetOutputTypeCommand {
    fn execute(&mut self) {
        for (node, _) in &self.items {
            node.set_output_type(self.output_type);
        }
    }

    fn undo(&mut self) {
        for (node, before) in &self.items {
            node.set_output_type(*before);
        }
    }

    fn name(&self) -> &str {
        "Set Output Type"
    }
}

// ── Buffer ────────────────────────────────────────────────────

struct Entry {
    seq: u64,
    command: Box<dyn UndoRedoCommand>,
}

/// Linear undo log with a cursor; commands after the cursor are redoable
/// until a new command is added.
pub struct UndoBuffer {
    entries: Vec<Entry>,
    cursor: usize,
    limit: usize,
    next_seq: u64,
}

impl UndoBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            limit: limit.max(1),
            next_seq: 1,
        }
    }

    /// Record an already executed command.
    pub fn add(&mut self, command: Box<dyn UndoRedoCommand>) {
        self.entries.truncate(self.cursor);
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!("undo log: {} (#{})", command.name(), seq);
        self.entries.push(Entry { seq, command });
        if self.entries.len() > self.limit {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len();
    }

    pub fn add_and_execute(&mut self, mut command: Box<dyn UndoRedoCommand>) {
        command.execute();
        self.add(command);
    }

    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.entries[self.cursor].command.undo();
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.cursor >= self.entries.len() {
            return false;
        }
        self.entries[self.cursor].command.execute();
        self.cursor += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.cursor.checked_sub(1).map(|i| self.entries[i].command.name())
    }

    /// Hash of the applied prefix of the log.
    pub fn long_hash(&self) -> u64 {
        self.entries[..self.cursor]
            .iter()
            .fold(FNV_SEED, |hash, e| hash_u64(hash, e.seq))
    }
}

impl Default for UndoBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}
