//! Undoable editing verbs.

use glam::{Mat4, Vec3};
use shared::{NodeId, OutputType, SelectedChildren};

use crate::clone::{deep_copy, duplicate_linked};
use crate::error::SceneError;
use crate::history::{
    GroupCommand, MatrixCommand, ReplaceCommand, SetOutputTypeCommand, UndoBuffer, UndoRedoCommand, UngroupCommand,
};
use crate::node::{Node, NodeKind, SubtractOperation};

use super::Scene;

impl Scene {
    fn record(&mut self, command: Box<dyn UndoRedoCommand>) {
        tracing::debug!("execute {}", command.name());
        self.undo.add_and_execute(command);
    }

    // ── History ───────────────────────────────────────────────

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        self.with_selection_kept(|undo| undo.undo())
    }

    pub fn redo(&mut self) -> bool {
        self.with_selection_kept(|undo| undo.redo())
    }

    /// Run a history step with the selection collapsed, then reselect the
    /// items that survived it.
    fn with_selection_kept(&mut self, step: impl FnOnce(&mut UndoBuffer) -> bool) -> bool {
        let selected = self.take_selection();
        let applied = step(&mut self.undo);
        let survivors: Vec<Node> = selected
            .into_iter()
            .filter(|n| n.parent().as_ref() == Some(&self.root))
            .collect();
        if let Err(e) = self.set_selection(&survivors) {
            tracing::warn!("could not restore selection: {}", e);
        }
        applied
    }

    // ── Structure ─────────────────────────────────────────────

    /// Append `item` to the root and select it.
    pub fn add_item(&mut self, item: Node) -> Result<(), SceneError> {
        self.clear_selection();
        let index = self.root.child_count();
        self.record(Box::new(ReplaceCommand::insert(&self.root, index, vec![item.clone()])));
        self.set_selected_item(Some(&item))
    }

    /// Remove the selected items from the scene.
    pub fn delete_selection(&mut self) -> Result<Vec<Node>, SceneError> {
        let items = self.take_selection();
        if items.is_empty() {
            return Err(SceneError::NothingSelected);
        }
        self.record(Box::new(ReplaceCommand::remove(items.clone())?));
        Ok(items)
    }

    /// Wrap the selected items in a plain group and select it.
    pub fn group_selection(&mut self) -> Result<Node, SceneError> {
        let group = Node::new();
        group.set_name("Group");
        self.wrap_items(group)
    }

    /// Dissolve the selected group, selecting its former children.
    pub fn ungroup_selection(&mut self) -> Result<Vec<Node>, SceneError> {
        let group = match self.selected_items().as_slice() {
            [single] if single.child_count() > 0 => single.clone(),
            [] => return Err(SceneError::NothingSelected),
            _ => return Ok(Vec::new()),
        };
        self.clear_selection();
        let command = UngroupCommand::new(group)?;
        let children = command.children();
        self.record(Box::new(command));
        self.set_selection(&children)?;
        Ok(children)
    }

    /// Wrap the selected items in an operation node and select it. The
    /// operation starts rebuilding immediately.
    pub fn wrap_selection(&mut self, kind: NodeKind) -> Result<Node, SceneError> {
        let name = match &kind {
            NodeKind::Combine => "Combine",
            NodeKind::Subtract(_) => "Subtract",
            _ => "Group",
        };
        let op = Node::with_kind(kind);
        op.set_name(name);
        self.wrap_items(op)
    }

    /// Subtract `holes` (ids among the selected items) from the rest of the
    /// selection. Without ids the last selected item is the hole.
    pub fn subtract_selection(&mut self, holes: Vec<NodeId>) -> Result<Node, SceneError> {
        self.wrap_selection(NodeKind::Subtract(SubtractOperation {
            selected_children: SelectedChildren(holes),
        }))
    }

    fn wrap_items(&mut self, container: Node) -> Result<Node, SceneError> {
        let items = self.take_selection();
        if items.is_empty() {
            return Err(SceneError::NothingSelected);
        }
        let command = GroupCommand::new(items, container.clone())?;
        self.record(Box::new(command));
        self.set_selected_item(Some(&container))?;
        Ok(container)
    }

    /// Copy the selected items next to the originals and select the copies.
    /// Linked copies join the source's clone group.
    pub fn duplicate_selection(&mut self, linked: bool) -> Result<Vec<Node>, SceneError> {
        let items = self.take_selection();
        if items.is_empty() {
            return Err(SceneError::NothingSelected);
        }
        let copies = items
            .iter()
            .map(|item| if linked { duplicate_linked(item) } else { deep_copy(item) })
            .collect::<Result<Vec<_>, _>>()?;
        let index = self.root.child_count();
        self.record(Box::new(ReplaceCommand::insert(&self.root, index, copies.clone())));
        self.set_selection(&copies)?;
        Ok(copies)
    }

    // ── Properties ────────────────────────────────────────────

    /// Move `item` by `offset` in its parent's frame.
    pub fn translate_item(&mut self, item: &Node, offset: Vec3) -> Result<(), SceneError> {
        if !self.root.contains(item) {
            return Err(SceneError::ItemNotInScene(item.id()));
        }
        let before = item.matrix();
        let after = Mat4::from_translation(offset) * before;
        self.record(Box::new(MatrixCommand::new(item, before, after)));
        Ok(())
    }

    pub fn set_selection_output_type(&mut self, output_type: OutputType) -> Result<(), SceneError> {
        let items = self.selected_items();
        if items.is_empty() {
            return Err(SceneError::NothingSelected);
        }
        self.record(Box::new(SetOutputTypeCommand::new(&items, output_type)));
        Ok(())
    }
}
