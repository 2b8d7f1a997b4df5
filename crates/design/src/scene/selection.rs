//! Selection state.
//!
//! A single selection points at any node of the tree. Several items are
//! held by a transient selection group that replaces them among the root's
//! children until the selection changes.

use crate::error::SceneError;
use crate::node::{InvalidateArgs, InvalidateType, Node, NodeKind};

use super::Scene;

impl Scene {
    pub fn selected_item(&self) -> Option<&Node> {
        self.selected.as_ref()
    }

    /// The root-level ancestor of the selection (or the selection itself).
    pub fn selected_item_root(&self) -> Option<&Node> {
        self.selected_root.as_ref()
    }

    pub fn has_selection(&self) -> bool {
        self.selected.is_some()
    }

    /// Items covered by the selection: the group's members or the single item.
    pub fn selected_items(&self) -> Vec<Node> {
        match &self.selected {
            Some(item) if item.is_selection_group() => item.children(),
            Some(item) => vec![item.clone()],
            None => Vec::new(),
        }
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.root.contains(node)
    }

    /// Select `item`, collapsing any previous selection group back into the
    /// root.
    pub fn set_selected_item(&mut self, item: Option<&Node>) -> Result<(), SceneError> {
        if self.selected.as_ref() == item {
            return Ok(());
        }
        if let Some(item) = item {
            if !self.root.contains(item) || *item == self.root {
                return Err(SceneError::ItemNotInScene(item.id()));
            }
        }
        if let Some(group) = self.selected.take().filter(|s| s.is_selection_group()) {
            self.collapse_selection_group(&group);
        }
        self.selected = item.cloned();
        self.selected_root = item.and_then(|i| self.top_level(i));
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        if let Err(e) = self.set_selected_item(None) {
            tracing::warn!("clearing selection failed: {}", e);
        }
    }

    /// Replace the selection with `items`. More than one item forms a
    /// selection group out of their root-level ancestors.
    pub fn set_selection(&mut self, items: &[Node]) -> Result<(), SceneError> {
        if let Some(missing) = items.iter().find(|i| !self.root.contains(i) || **i == self.root) {
            return Err(SceneError::ItemNotInScene(missing.id()));
        }
        self.clear_selection();
        match items {
            [] => Ok(()),
            [single] => self.set_selected_item(Some(single)),
            _ => {
                let mut top: Vec<Node> = Vec::new();
                for item in items {
                    if let Some(t) = self.top_level(item) {
                        if !top.contains(&t) {
                            top.push(t);
                        }
                    }
                }
                if top.len() == 1 {
                    return self.set_selected_item(top.first());
                }
                let group = self.form_selection_group(top);
                self.selected_root = Some(group.clone());
                self.selected = Some(group);
                Ok(())
            }
        }
    }

    /// Extend the selection with `item`.
    pub fn add_to_selection(&mut self, item: &Node) -> Result<(), SceneError> {
        if !self.root.contains(item) || *item == self.root {
            return Err(SceneError::ItemNotInScene(item.id()));
        }
        let Some(selected) = self.selected.clone() else {
            return self.set_selected_item(Some(item));
        };
        if selected == *item || (selected.is_selection_group() && selected.contains(item)) {
            return Ok(());
        }
        let Some(top) = self.top_level(item) else {
            return Err(SceneError::ItemNotInScene(item.id()));
        };
        if selected.is_selection_group() {
            {
                let _lock = self.root.rebuild_lock();
                let _group_lock = selected.rebuild_lock();
                self.root.remove_child(&top);
                selected.add_child(top.clone());
            }
            self.root
                .invalidate(&InvalidateArgs::new(&selected, InvalidateType::CHILDREN));
            return Ok(());
        }
        let current = self.selected_root.clone().unwrap_or(selected);
        if current == top {
            return self.set_selected_item(Some(&top));
        }
        self.selected = None;
        self.selected_root = None;
        let group = self.form_selection_group(vec![current, top]);
        self.selected_root = Some(group.clone());
        self.selected = Some(group);
        Ok(())
    }

    pub fn select_first_child(&mut self) -> Result<(), SceneError> {
        match self.root.child(0) {
            Some(first) => self.set_selected_item(Some(&first)),
            None => Ok(()),
        }
    }

    pub fn select_last_child(&mut self) -> Result<(), SceneError> {
        let count = self.root.child_count();
        match count.checked_sub(1).and_then(|i| self.root.child(i)) {
            Some(last) => self.set_selected_item(Some(&last)),
            None => Ok(()),
        }
    }

    /// Collapse the selection group, if any, and return the selected items,
    /// which are then children of the root.
    pub(crate) fn take_selection(&mut self) -> Vec<Node> {
        let items = self.selected_items();
        self.clear_selection();
        items
    }

    fn top_level(&self, item: &Node) -> Option<Node> {
        item.ancestors_and_self()
            .into_iter()
            .find(|a| a.parent().as_ref() == Some(&self.root))
    }

    /// Move root-level `items` into a new selection group placed where the
    /// first of them was.
    fn form_selection_group(&mut self, items: Vec<Node>) -> Node {
        let group = Node::with_kind(NodeKind::SelectionGroup);
        group.set_name("Selection");
        let index = items
            .iter()
            .filter_map(|i| self.root.child_index(i))
            .min()
            .unwrap_or(0);
        {
            let _lock = self.root.rebuild_lock();
            let _group_lock = group.rebuild_lock();
            for item in items {
                self.root.remove_child(&item);
                group.add_child(item);
            }
            self.root.insert_child(index, group.clone());
        }
        self.root
            .invalidate(&InvalidateArgs::new(&group, InvalidateType::CHILDREN));
        group
    }

    /// Return the members of `group` to the root at the group's position,
    /// baking the group's transform and overrides into each of them.
    fn collapse_selection_group(&mut self, group: &Node) {
        let index = self.root.child_index(group).unwrap_or(self.root.child_count());
        let matrix = group.matrix();
        let color = group.color();
        let output_type = group.output_type();
        let members = group.children();
        {
            let _lock = self.root.rebuild_lock();
            let _group_lock = group.rebuild_lock();
            self.root.remove_child(group);
            for (offset, member) in members.iter().enumerate() {
                group.remove_child(member);
                if !color.is_transparent() {
                    member.set_color(color);
                }
                if output_type != shared::OutputType::Default {
                    member.set_output_type(output_type);
                }
                member.set_matrix(matrix * member.matrix());
                self.root.insert_child(index + offset, member.clone());
            }
        }
        let source = members.first().unwrap_or(&self.root);
        self.root
            .invalidate(&InvalidateArgs::new(source, InvalidateType::CHILDREN));
    }
}
