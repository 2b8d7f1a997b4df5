//! Scoped re-entrancy guards that suppress invalidation while a subtree is mid-mutation.

use std::cell::Cell;
use std::rc::Rc;

use super::Node;

/// Holds one lock count on a node until dropped.
#[must_use = "the node unlocks as soon as the guard is dropped"]
pub struct RebuildLock {
    node: Node,
    count: Rc<Cell<i32>>,
}

impl RebuildLock {
    pub(crate) fn new(node: &Node) -> Self {
        let count = node.0.borrow().rebuild_lock_count.clone();
        count.set(count.get() + 1);
        Self {
            node: node.clone(),
            count,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        let remaining = self.count.get() - 1;
        debug_assert!(remaining >= 0, "rebuild lock count underflow");
        if remaining < 0 {
            tracing::error!("rebuild lock count underflow; clamped");
        }
        self.count.set(remaining.max(0));
    }
}

/// One [`RebuildLock`] per node of a subtree.
#[must_use = "the subtree unlocks as soon as the guard is dropped"]
pub struct RebuildLocks {
    locks: Vec<RebuildLock>,
}

impl RebuildLocks {
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Node {
    /// Lock this node against immediate invalidation.
    pub fn rebuild_lock(&self) -> RebuildLock {
        RebuildLock::new(self)
    }

    /// Lock every node of the subtree.
    pub fn rebuild_lock_all(&self) -> RebuildLocks {
        RebuildLocks {
            locks: self
                .descendants_and_self()
                .iter()
                .map(RebuildLock::new)
                .collect(),
        }
    }

    pub fn rebuild_lock_count(&self) -> i32 {
        self.0.borrow().rebuild_lock_count.get()
    }

    /// True when this node or any descendant holds a lock.
    pub fn is_rebuild_locked(&self) -> bool {
        self.descendants_and_self()
            .iter()
            .any(|n| n.0.borrow().rebuild_lock_count.get() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_reentrant() {
        let node = Node::new();
        let a = node.rebuild_lock();
        let b = node.rebuild_lock();
        assert_eq!(node.rebuild_lock_count(), 2);
        drop(a);
        assert!(node.is_rebuild_locked());
        drop(b);
        assert!(!node.is_rebuild_locked());
    }

    #[test]
    fn test_lock_all_covers_subtree() {
        let root = Node::new();
        let child = Node::new();
        let grandchild = Node::new();
        root.add_child(child.clone());
        child.add_child(grandchild.clone());
        let locks = root.rebuild_lock_all();
        assert_eq!(locks.len(), 3);
        assert_eq!(grandchild.rebuild_lock_count(), 1);
        drop(locks);
        assert_eq!(grandchild.rebuild_lock_count(), 0);
        assert!(!root.is_rebuild_locked());
    }

    #[test]
    fn test_release_while_node_borrowed() {
        let node = Node::new();
        let lock = node.rebuild_lock();
        {
            let _data = node.0.borrow_mut();
            drop(lock);
        }
        assert_eq!(node.rebuild_lock_count(), 0);
        assert!(!node.is_rebuild_locked());
    }

    #[test]
    fn test_copy_does_not_share_lock_count() {
        let node = Node::new();
        let _lock = node.rebuild_lock();
        let copy = node.copy_fields();
        assert_eq!(copy.rebuild_lock_count(), 0);
    }

    #[test]
    fn test_descendant_lock_locks_ancestor() {
        let root = Node::new();
        let child = Node::new();
        root.add_child(child.clone());
        let _lock = child.rebuild_lock();
        assert!(root.is_rebuild_locked());
        assert_eq!(root.rebuild_lock_count(), 0);
    }
}
