//! Deep copy with identity remapping, and clone-group synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use shared::NodeId;

use crate::error::DuplicateIdentityError;
use crate::geometry::{Mesh, SharedMesh};
use crate::node::{new_id, HasNodeReferences, InvalidateArgs, InvalidateType, Node};

/// Structurally identical copy of `source` where every node has a new id.
///
/// Owner ids and operation operand lists that point inside the subtree are
/// rewritten to the new ids; references to nodes outside it are kept. The
/// copy has no parent. Fails when two nodes of `source` share an id.
pub fn deep_copy(source: &Node) -> Result<Node, DuplicateIdentityError> {
    let _locks = source.rebuild_lock_all();

    if let Some(id) = source.first_duplicate_id() {
        return Err(DuplicateIdentityError { id });
    }
    let meshes: HashMap<NodeId, Option<SharedMesh>> = source
        .descendants_and_self()
        .into_iter()
        .map(|n| (n.id(), n.mesh()))
        .collect();

    let copy = copy_structure(source);

    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
    for node in copy.descendants_and_self() {
        let old_id = node.id();
        match meshes.get(&old_id) {
            Some(mesh) => node.set_mesh_direct(mesh.clone()),
            None => {
                tracing::warn!("no mesh recorded for {} while copying; using placeholder", old_id);
                node.set_mesh_direct(Some(Arc::new(Mesh::placeholder())));
            }
        }
        let new = new_id();
        remap.entry(old_id).or_insert_with(|| new.clone());
        node.set_id(new);
    }

    for node in copy.descendants_and_self() {
        if let Some(new_owner) = node.owner_id().and_then(|owner| remap.get(&owner).cloned()) {
            node.set_owner_id(Some(new_owner));
        }
        node.with_kind_mut(|kind| kind.remap_references(&remap));
    }

    Ok(copy)
}

fn copy_structure(node: &Node) -> Node {
    let copy = node.copy_fields();
    let children = node.children().iter().map(copy_structure).collect();
    copy.set_children_direct(children);
    copy
}

/// Deep copy that joins `source`'s clone group, creating the group if
/// `source` is not in one yet.
pub fn duplicate_linked(source: &Node) -> Result<Node, DuplicateIdentityError> {
    if source.clone_id().is_none() {
        source.set_clone_id(Some(uuid::Uuid::new_v4().to_string()));
    }
    deep_copy(source)
}

/// Push each updated clone's content to the rest of its group.
///
/// Every other member of the group found under `root` is swapped, in its
/// own parent, for a fresh deep copy of the updated node. A group with no other member is dissolved. Update counts of
/// the whole group are reset. Returns how many members were replaced.
pub fn synchronize_clones(root: &Node, updated: &[Node]) -> Result<usize, DuplicateIdentityError> {
    let mut replaced = 0;
    for source in updated {
        let Some(clone_id) = source.clone_id() else {
            continue;
        };
        let siblings: Vec<Node> = root
            .descendants_and_self()
            .into_iter()
            .filter(|n| n != source && n.clone_id().as_ref() == Some(&clone_id))
            .collect();

        if siblings.is_empty() {
            tracing::debug!("clone group {} has a single member; dissolving", clone_id);
            source.set_clone_id(None);
            source.set_clone_update_count(0);
            continue;
        }

        for existing in siblings {
            let Some(parent) = existing.parent() else {
                continue;
            };
            let copy = deep_copy(source)?;
            copy.set_clone_update_count(0);
            {
                let _lock = parent.rebuild_lock();
                parent.replace_child(&existing, copy.clone());
            }
            parent.invalidate(&InvalidateArgs::new(&copy, InvalidateType::CHILDREN));
            replaced += 1;
        }
        source.set_clone_update_count(0);
    }

    root.invalidate(&InvalidateArgs::new(root, InvalidateType::DISPLAY_VALUES));
    Ok(replaced)
}
