//! Change propagation from a node to its ancestors.

use std::rc::Rc;

use bitflags::bitflags;

use super::Node;

bitflags! {
    /// What changed on the node that raised an invalidation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvalidateType: u32 {
        const CHILDREN = 1 << 0;
        const COLOR = 1 << 1;
        const MATRIX = 1 << 2;
        const MESH = 1 << 3;
        const NAME = 1 << 4;
        const OUTPUT_TYPE = 1 << 5;
        /// Operation parameters changed; the node must rebuild
        const PROPERTIES = 1 << 6;
        const VISIBILITY = 1 << 7;
        /// Derived display values (counts, labels) need a refresh
        const DISPLAY_VALUES = 1 << 8;
    }
}

bitflags! {
    /// Properties copied by [`Node::copy_properties`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        const MATRIX = 1 << 0;
        const COLOR = 1 << 1;
        const OUTPUT_TYPE = 1 << 2;
        const NAME = 1 << 3;
        const VISIBLE = 1 << 4;
        const ALL = Self::MATRIX.bits()
            | Self::COLOR.bits()
            | Self::OUTPUT_TYPE.bits()
            | Self::NAME.bits()
            | Self::VISIBLE.bits();
    }
}

/// Invalidation event: what changed and which node raised it.
#[derive(Debug, Clone)]
pub struct InvalidateArgs {
    pub source: Option<Node>,
    pub invalidate_type: InvalidateType,
}

impl InvalidateArgs {
    pub fn new(source: &Node, invalidate_type: InvalidateType) -> Self {
        Self {
            source: Some(source.clone()),
            invalidate_type,
        }
    }

    pub fn is_source(&self, node: &Node) -> bool {
        self.source.as_ref() == Some(node)
    }

    pub fn has(&self, flags: InvalidateType) -> bool {
        self.invalidate_type.intersects(flags)
    }
}

/// Handle returned by [`Node::on_invalidated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl Node {
    /// Raise an invalidation on this node.
    ///
    /// Unlocked: run this node's handler, then bubble to the parent.
    /// Locked: a `PROPERTIES` change raised by this node itself is queued on
    /// the scheduler and replayed once the node unlocks. An operation whose
    /// inputs change while it is building queues a `PROPERTIES` change for
    /// itself, so the stale build is cancelled and redone. Anything else is
    /// dropped and the unlocking code re-invalidates explicitly.
    pub fn invalidate(&self, args: &InvalidateArgs) {
        if !self.is_rebuild_locked() {
            self.on_invalidate(args);
            return;
        }

        let own_properties = args.invalidate_type.contains(InvalidateType::PROPERTIES) && args.is_source(self);
        let Some(scheduler) = self.scheduler() else {
            if own_properties {
                tracing::debug!("dropping deferred invalidation for {}: no scheduler", self.id());
            }
            return;
        };
        if own_properties {
            scheduler.defer_invalidate(self, args.invalidate_type);
        } else if self.is_operation() && scheduler.is_building(self) && self.wants_rebuild(args) {
            scheduler.defer_invalidate(self, InvalidateType::PROPERTIES);
        }
    }

    /// Handler run for an unsuppressed invalidation.
    ///
    /// Operation nodes start a rebuild when a descendant's geometry, transform
    /// or child list changed, or when their own parameters changed; their
    /// rebuild raises a fresh invalidation when it completes. Every other
    /// event bubbles to the parent.
    pub(crate) fn on_invalidate(&self, args: &InvalidateArgs) {
        let listeners: Vec<_> = self
            .0
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(self, args);
        }

        if self.is_operation() && self.wants_rebuild(args) {
            match self.scheduler() {
                Some(scheduler) => {
                    scheduler.request_rebuild(self);
                    return;
                }
                None => tracing::debug!("operation {} has no scheduler; not rebuilt", self.id()),
            }
        }

        if let Some(parent) = self.parent() {
            parent.invalidate(args);
        }
    }

    fn wants_rebuild(&self, args: &InvalidateArgs) -> bool {
        let from_self = args.is_source(self);
        let geometry = InvalidateType::CHILDREN | InvalidateType::MATRIX | InvalidateType::MESH;
        (args.has(geometry) && !from_self)
            || (args.invalidate_type.contains(InvalidateType::PROPERTIES) && from_self)
    }

    /// Subscribe to unsuppressed invalidations of this node.
    pub fn on_invalidated(&self, listener: impl Fn(&Node, &InvalidateArgs) + 'static) -> ListenerId {
        let mut data = self.0.borrow_mut();
        let id = ListenerId(data.next_listener_id);
        data.next_listener_id += 1;
        data.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut data = self.0.borrow_mut();
        let before = data.listeners.len();
        data.listeners.retain(|(l, _)| *l != id);
        data.listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(node: &Node) -> Rc<RefCell<Vec<InvalidateType>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        node.on_invalidated(move |_, args| sink.borrow_mut().push(args.invalidate_type));
        seen
    }

    #[test]
    fn test_bubbles_to_root() {
        let root = Node::new();
        let child = Node::new();
        root.add_child(child.clone());
        let seen = recorder(&root);
        child.set_name("renamed");
        assert_eq!(seen.borrow().as_slice(), &[InvalidateType::NAME]);
    }

    #[test]
    fn test_locked_node_suppresses() {
        let root = Node::new();
        let child = Node::new();
        root.add_child(child.clone());
        let seen = recorder(&root);
        {
            let _lock = child.rebuild_lock();
            child.set_name("quiet");
            child.set_color(shared::Color::rgb(1, 1, 1));
        }
        assert!(seen.borrow().is_empty());
        child.set_name("loud");
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_locked_descendant_suppresses_ancestor() {
        let root = Node::new();
        let child = Node::new();
        root.add_child(child.clone());
        let seen = recorder(&root);
        let _lock = child.rebuild_lock();
        root.set_name("while child locked");
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_remove_listener() {
        let node = Node::new();
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let id = node.on_invalidated(move |_, _| *sink.borrow_mut() += 1);
        node.set_name("a");
        assert!(node.remove_listener(id));
        node.set_name("b");
        assert_eq!(*seen.borrow(), 1);
        assert!(!node.remove_listener(id));
    }

    #[test]
    fn test_property_flags_all() {
        assert!(PropertyFlags::ALL.contains(PropertyFlags::VISIBLE));
        let without = PropertyFlags::ALL - PropertyFlags::MATRIX - PropertyFlags::VISIBLE;
        assert!(!without.contains(PropertyFlags::MATRIX));
        assert!(without.contains(PropertyFlags::COLOR));
    }
}
