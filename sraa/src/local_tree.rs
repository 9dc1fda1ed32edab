use std::collections::{BTreeMap, HashMap};

use crate::depgraph::{DepGraph, NodeId};
use crate::domains::Range;

/// Depth of an ancestor on a node's path and the offset of the node relative
/// to that ancestor.
pub type PathEntry = (usize, Range);

/// For every node, the chain of single-predecessor ancestors up to its local
/// root.
#[derive(Clone, Debug, Default)]
pub struct LocalTree {
    roots: HashMap<NodeId, NodeId>,
    paths: HashMap<NodeId, BTreeMap<NodeId, PathEntry>>,
}

impl LocalTree {
    pub fn build(graph: &DepGraph) -> Self {
        let mut tree = LocalTree::default();
        for node in graph.live_nodes() {
            let (root, path) = walk(graph, node);
            tree.roots.insert(node, root);
            tree.paths.insert(node, path);
        }
        tree
    }

    pub fn root(&self, node: NodeId) -> Option<NodeId> {
        self.roots.get(&node).copied()
    }

    pub fn path(&self, node: NodeId) -> Option<&BTreeMap<NodeId, PathEntry>> {
        self.paths.get(&node)
    }

    /// The two nodes hang off a common ancestor at offsets that never meet.
    /// The ancestor closest to both nodes is used, ties go to the smaller
    /// handle so the answer does not depend on argument order.
    pub fn diverge(&self, a: NodeId, b: NodeId) -> bool {
        if self.root(a).is_none() || self.root(a) != self.root(b) {
            return false;
        }
        let (Some(path_a), Some(path_b)) = (self.path(a), self.path(b)) else {
            return false;
        };
        let common = path_a
            .iter()
            .filter_map(|(node, (depth_a, offset_a))| {
                path_b
                    .get(node)
                    .map(|(depth_b, offset_b)| (depth_a + depth_b, *node, *offset_a, *offset_b))
            })
            .min_by_key(|(distance, node, _, _)| (*distance, *node));
        match common {
            Some((_, _, offset_a, offset_b)) => offset_a.is_disjoint(&offset_b),
            None => false,
        }
    }
}

/// Follow single in-edges from `start` until a node with zero or several
/// in-edges. On a cycle the member with the highest handle becomes the root.
fn walk(graph: &DepGraph, start: NodeId) -> (NodeId, BTreeMap<NodeId, PathEntry>) {
    let mut path = BTreeMap::new();
    let mut order = vec![start];
    path.insert(start, (0, Range::zero()));
    let (mut current, mut depth, mut offset) = (start, 0, Range::zero());
    loop {
        let in_edges = &graph.node(current).in_edges;
        if in_edges.len() != 1 {
            return (current, path);
        }
        let edge = graph.edge(in_edges[0]);
        let next = edge.base;
        depth += 1;
        offset = offset + edge.offset;
        if path.contains_key(&next) {
            let cycle_start = order.iter().position(|n| *n == next).unwrap_or(0);
            let root = order[cycle_start..]
                .iter()
                .copied()
                .max()
                .unwrap_or(next);
            return (root, path);
        }
        path.insert(next, (depth, offset));
        order.push(next);
        current = next;
    }
}
