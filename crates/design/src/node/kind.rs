//! Node variants and the explicit id-reference protocol used by clone remapping.

use std::collections::HashMap;

use shared::{NodeId, NodeKindDocument, SelectedChildren};

use super::Node;

/// Types that refer to other nodes by id.
///
/// Deep copy assigns new ids to every node of the copied subtree and then
/// rewrites every reference through this trait. Ids missing from the remap
/// table are kept as they are.
pub trait HasNodeReferences {
    fn referenced_ids(&self) -> Vec<NodeId>;
    fn remap_references(&mut self, remap: &HashMap<NodeId, NodeId>);
}

impl HasNodeReferences for SelectedChildren {
    fn referenced_ids(&self) -> Vec<NodeId> {
        self.0.clone()
    }

    fn remap_references(&mut self, remap: &HashMap<NodeId, NodeId>) {
        for id in self.0.iter_mut() {
            if let Some(new_id) = remap.get(id) {
                *id = new_id.clone();
            }
        }
    }
}

/// Subtracts the selected children from the remaining ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubtractOperation {
    /// Children used as subtractive operands. Empty means "the last child".
    pub selected_children: SelectedChildren,
}

impl SubtractOperation {
    /// Split `children` into (keep, remove) operand lists.
    pub fn partition(&self, children: &[Node]) -> (Vec<Node>, Vec<Node>) {
        if self.selected_children.is_empty() {
            let mut keep = children.to_vec();
            let remove = keep.pop().into_iter().collect();
            return (keep, remove);
        }
        children
            .iter()
            .cloned()
            .partition(|c| !self.selected_children.contains(&c.id()))
    }
}

impl HasNodeReferences for SubtractOperation {
    fn referenced_ids(&self) -> Vec<NodeId> {
        self.selected_children.referenced_ids()
    }

    fn remap_references(&mut self, remap: &HashMap<NodeId, NodeId>) {
        self.selected_children.remap_references(remap);
    }
}

/// What a node is, beyond its shared properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeKind {
    #[default]
    Object,
    /// Transient holder of a multi-item selection
    SelectionGroup,
    /// Union of all children, stored as the node's own mesh
    Combine,
    Subtract(SubtractOperation),
}

impl NodeKind {
    /// Operation nodes rebuild their mesh from their children.
    pub fn is_operation(&self) -> bool {
        matches!(self, NodeKind::Combine | NodeKind::Subtract(_))
    }

    pub fn is_selection_group(&self) -> bool {
        matches!(self, NodeKind::SelectionGroup)
    }

    pub fn to_document(&self) -> NodeKindDocument {
        match self {
            NodeKind::Object => NodeKindDocument::Object,
            NodeKind::SelectionGroup => NodeKindDocument::SelectionGroup,
            NodeKind::Combine => NodeKindDocument::Combine,
            NodeKind::Subtract(op) => NodeKindDocument::Subtract {
                selected_children: op.selected_children.clone(),
            },
        }
    }

    pub fn from_document(doc: &NodeKindDocument) -> Self {
        match doc {
            NodeKindDocument::Object => NodeKind::Object,
            NodeKindDocument::SelectionGroup => NodeKind::SelectionGroup,
            NodeKindDocument::Combine => NodeKind::Combine,
            NodeKindDocument::Subtract { selected_children } => {
                NodeKind::Subtract(SubtractOperation {
                    selected_children: selected_children.clone(),
                })
            }
        }
    }
}

impl HasNodeReferences for NodeKind {
    fn referenced_ids(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Subtract(op) => op.referenced_ids(),
            _ => Vec::new(),
        }
    }

    fn remap_references(&mut self, remap: &HashMap<NodeId, NodeId>) {
        if let NodeKind::Subtract(op) = self {
            op.remap_references(remap);
        }
    }
}
