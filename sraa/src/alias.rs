use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Display;

use itertools::Itertools;
use log::debug;

use crate::Config;
use crate::constraints::{Constraint, RelationStore};
use crate::depgraph::{DepGraph, EdgeKind};
use crate::domains::Range;
use crate::facts::{FactCollector, IndexAccess};
use crate::layout::Primitives;
use crate::local_tree::LocalTree;
use crate::program::{Module, RangeOracle, ValueId};
use crate::solvers::WorkList;

/// Answer to an alias query.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AliasResult {
    /// The two pointers always refer to the same address.
    MustAlias,
    /// The two pointers never refer to overlapping memory.
    NoAlias,
    /// Nothing could be proven.
    MayAlias,
}

impl Display for AliasResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AliasResult::MustAlias => "MustAlias",
            AliasResult::NoAlias => "NoAlias",
            AliasResult::MayAlias => "MayAlias",
        };
        write!(f, "{s}")
    }
}

pub trait AliasAnalysis {
    fn alias(&self, a: ValueId, b: ValueId) -> AliasResult;
}

/// The analysis that knows nothing.
pub struct NoAliasInfo;

impl AliasAnalysis for NoAliasInfo {
    fn alias(&self, _: ValueId, _: ValueId) -> AliasResult {
        AliasResult::MayAlias
    }
}

/// Whole-program alias analysis based on a strict order between pointer
/// values and on a provenance graph. All the work happens in
/// [`StrictRelations::run`], queries only read the final state.
pub struct StrictRelations<'m> {
    module: &'m Module,
    oracle: &'m dyn RangeOracle,
    config: Config,
    store: RelationStore,
    worklist: WorkList,
    accesses: HashMap<ValueId, IndexAccess>,
    graph: DepGraph,
    tree: LocalTree,
}

impl<'m> StrictRelations<'m> {
    pub fn run(module: &'m Module, oracle: &'m dyn RangeOracle, config: Config) -> Self {
        let mut store = RelationStore::default();
        let mut worklist = WorkList::default();
        let mut primitives = Primitives::default();

        debug!("collecting constraints");
        let accesses =
            FactCollector::new(module, oracle, &mut store, &mut worklist, &mut primitives)
                .collect();
        debug!("first solve over {} constraints", worklist.constraints().len());
        let resolves = worklist.solve(&mut store);
        debug!("first solve done after {resolves} resolves");

        debug!("building the dependency graph");
        let graph = DepGraph::build(module, &accesses);
        let tree = LocalTree::build(&graph);

        let mut analysis = Self {
            module,
            oracle,
            config,
            store,
            worklist,
            accesses,
            graph,
            tree,
        };
        if config.apart_allocations {
            analysis.seed_apart_allocations();
        }
        if config.graph_constraints {
            analysis.seed_graph_constraints();
        }
        if !analysis.worklist.is_empty() {
            debug!("second solve");
            let resolves = analysis.worklist.solve(&mut analysis.store);
            debug!("second solve done after {resolves} resolves");
        }
        analysis
    }

    fn seed_apart_allocations(&mut self) {
        let sites = self.graph.alloc_sites().to_vec();
        let mut changed = false;
        for (a, b) in sites.iter().tuple_combinations() {
            changed |= self.store.mark_apart(*a, *b);
        }
        if changed {
            self.worklist.enqueue_all();
        }
    }

    /// Sibling index edges with disjoint offsets order their accesses.
    fn seed_graph_constraints(&mut self) {
        let mut facts = Vec::new();
        for node in self.graph.live_nodes() {
            let index_edges: Vec<_> = self
                .graph
                .node(node)
                .out_edges
                .iter()
                .map(|e| self.graph.edge(*e))
                .filter(|e| e.kind == EdgeKind::Index)
                .collect();
            for (j, k) in index_edges.iter().tuple_combinations() {
                let (Some(ja), Some(ka)) = (j.access, k.access) else {
                    continue;
                };
                let order = self.compare_accesses(ja, ka);
                if j.offset.upper < k.offset.lower || order == Some(Ordering::Less) {
                    facts.push((ja, ka));
                } else if j.offset.lower > k.offset.upper || order == Some(Ordering::Greater) {
                    facts.push((ka, ja));
                }
            }
        }
        debug!("{} ordering facts from the dependency graph", facts.len());
        for (lo, hi) in facts {
            let (x, y) = (self.store.variable(lo), self.store.variable(hi));
            self.worklist.add(Constraint::LessThan(x, y), &mut self.store);
        }
    }

    /// Order two index values, falling back to the range oracle.
    fn compare_indices(&self, a: Option<ValueId>, b: Option<ValueId>) -> Option<Ordering> {
        if a.is_some() && a == b {
            return Some(Ordering::Equal);
        }
        if let (Some(a), Some(b)) = (a, b) {
            if let (Some(x), Some(y)) = (self.store.lookup(a), self.store.lookup(b)) {
                if self.store.is_less(x, y) {
                    return Some(Ordering::Less);
                }
                if self.store.is_less(y, x) {
                    return Some(Ordering::Greater);
                }
            }
        }
        let range = |v: Option<ValueId>| match v {
            None => Range::zero(),
            Some(v) => match self.module.constant(v) {
                Some(c) => Range::from(c),
                None => self.oracle.range(v),
            },
        };
        // Equal ranges only mean equal indices when they are the same
        // singleton. Two values in [0, 3] can still differ.
        range(a).strict_cmp(&range(b))
    }

    /// Compare two accesses off the same base index by index. Missing
    /// trailing indices count as zero.
    pub fn compare_accesses(&self, a: ValueId, b: ValueId) -> Option<Ordering> {
        let (Some(ja), Some(jb)) = (self.accesses.get(&a), self.accesses.get(&b)) else {
            return None;
        };
        let mut verdict = Ordering::Equal;
        for pair in ja.indices.iter().zip_longest(jb.indices.iter()) {
            let (x, y) = (pair.clone().left().copied(), pair.right().copied());
            match self.compare_indices(x, y)? {
                Ordering::Equal => {}
                ord if verdict == Ordering::Equal || verdict == ord => verdict = ord,
                _ => return None,
            }
        }
        Some(verdict)
    }

    /// Test 2: the values are ordered, directly or through their indices.
    fn strictly_ordered(&self, a: ValueId, b: ValueId) -> bool {
        if let (Some(x), Some(y)) = (self.store.lookup(a), self.store.lookup(b)) {
            if self.store.is_less(x, y) || self.store.is_less(y, x) {
                return true;
            }
        }
        let (Some(ja), Some(jb)) = (self.accesses.get(&a), self.accesses.get(&b)) else {
            return false;
        };
        let same_base = ja.base == jb.base
            || self
                .graph
                .node_of(ja.base)
                .is_some_and(|n| self.graph.node_of(jb.base) == Some(n));
        if !same_base || ja.pointee != jb.pointee {
            return false;
        }
        matches!(
            self.compare_accesses(a, b),
            Some(Ordering::Less | Ordering::Greater)
        )
    }

    /// Like [`AliasAnalysis::alias`], deferring to `base` when no test
    /// proves anything.
    pub fn alias_with(&self, a: ValueId, b: ValueId, base: &dyn AliasAnalysis) -> AliasResult {
        if a == b {
            return AliasResult::MustAlias;
        }
        let nodes = (self.graph.node_of(a), self.graph.node_of(b));
        if let (Some(na), Some(nb)) = nodes {
            if na == nb {
                return AliasResult::MustAlias;
            }
            if self.config.local_tree && self.tree.diverge(na, nb) {
                return AliasResult::NoAlias;
            }
        }
        if self.config.strict_order && self.strictly_ordered(a, b) {
            return AliasResult::NoAlias;
        }
        if let (Some(na), Some(nb)) = nodes {
            if self.config.provenance && self.graph.disjoint_origins(na, nb) {
                return AliasResult::NoAlias;
            }
        }
        base.alias(a, b)
    }

    pub fn relations(&self) -> &RelationStore {
        &self.store
    }

    pub fn print_constraints(&self) -> String {
        self.worklist.print_constraints(&self.store, self.module)
    }

    pub fn print_relations(&self) -> String {
        self.store.print(self.module)
    }

    pub fn print_graph(&self) -> String {
        self.graph.print(self.module)
    }
}

impl AliasAnalysis for StrictRelations<'_> {
    fn alias(&self, a: ValueId, b: ValueId) -> AliasResult {
        self.alias_with(a, b, &NoAliasInfo)
    }
}
