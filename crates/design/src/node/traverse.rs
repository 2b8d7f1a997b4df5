use shared::NodeId;

use super::Node;

impl Node {
    /// Self followed by every descendant. Children are visited from a stack,
    /// so later siblings come out before earlier ones.
    pub fn descendants_and_self(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(item) = stack.pop() {
            stack.extend(item.children());
            out.push(item);
        }
        out
    }

    pub fn descendants(&self) -> Vec<Node> {
        let mut all = self.descendants_and_self();
        all.remove(0);
        all
    }

    /// Self, parent, grandparent, ... up to the root.
    pub fn ancestors_and_self(&self) -> Vec<Node> {
        let mut out = vec![self.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            out.push(node);
        }
        out
    }

    /// Every ancestor, nearest first.
    pub fn parents(&self) -> Vec<Node> {
        let mut all = self.ancestors_and_self();
        all.remove(0);
        all
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.parents().len()
    }

    /// Topmost ancestor (or self).
    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn find_by_id(&self, id: &str) -> Option<Node> {
        self.descendants_and_self().into_iter().find(|n| n.0.borrow().id == id)
    }

    /// True when `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        other.ancestors_and_self().iter().any(|n| n == self)
    }

    /// First id that appears twice in the subtree.
    pub fn first_duplicate_id(&self) -> Option<NodeId> {
        let mut seen = std::collections::HashSet::new();
        self.descendants_and_self()
            .into_iter()
            .map(|n| n.id())
            .find(|id| !seen.insert(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Node, Node, Node, Node) {
        let root = Node::with_id("root");
        let a = Node::with_id("a");
        let b = Node::with_id("b");
        let a1 = Node::with_id("a1");
        root.add_child(a.clone());
        root.add_child(b.clone());
        a.add_child(a1.clone());
        (root, a, b, a1)
    }

    #[test]
    fn test_descendants_stack_order() {
        let (root, ..) = tree();
        let ids: Vec<_> = root.descendants_and_self().iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["root", "b", "a", "a1"]);
    }

    #[test]
    fn test_ancestors_and_depth() {
        let (root, a, _, a1) = tree();
        assert_eq!(a1.ancestors_and_self(), vec![a1.clone(), a.clone(), root.clone()]);
        assert_eq!(a1.depth(), 2);
        assert_eq!(a1.root(), root);
        assert!(root.contains(&a1));
        assert!(!a.contains(&root));
    }

    #[test]
    fn test_find_by_id() {
        let (root, _, b, _) = tree();
        assert_eq!(root.find_by_id("b"), Some(b));
        assert!(root.find_by_id("nope").is_none());
    }

    #[test]
    fn test_duplicate_detection() {
        let (root, a, ..) = tree();
        assert!(root.first_duplicate_id().is_none());
        a.add_child(Node::with_id("b"));
        assert_eq!(root.first_duplicate_id(), Some("b".to_string()));
    }
}
