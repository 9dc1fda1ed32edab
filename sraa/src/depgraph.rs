use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write;

use itertools::Itertools;
use log::debug;

use crate::domains::Range;
use crate::facts::IndexAccess;
use crate::program::{CallTarget, Instruction, Module, ValueId};

/// Stable handle of a node. Handles stay valid after the node is absorbed
/// by coalescing, the node just stops being live.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EdgeId(pub usize);

/// The construct that made a pointer depend on another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
    /// Formal parameter bound to an actual argument at a call site.
    Parameter,
    /// Reallocation of an existing block.
    Realloc,
    /// Call result bound to a value returned by the callee.
    CallResult,
    /// Address computation off a base pointer.
    Index,
    /// One incoming value of a merge.
    Merge,
}

/// `child` points to `base` displaced by `offset` units.
#[derive(Clone, Debug)]
pub struct DepEdge {
    pub child: NodeId,
    pub base: NodeId,
    pub offset: Range,
    /// Result of the index computation that created the edge, if any.
    pub access: Option<ValueId>,
    pub kind: EdgeKind,
}

/// Where the pointers of a node may come from.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Provenance {
    pub is_arg: bool,
    pub is_global: bool,
    pub is_alloc: bool,
    pub is_call: bool,
    pub is_unknown: bool,
}

impl Provenance {
    fn merge(&mut self, other: Provenance) {
        self.is_arg |= other.is_arg;
        self.is_global |= other.is_global;
        self.is_alloc |= other.is_alloc;
        self.is_call |= other.is_call;
        self.is_unknown |= other.is_unknown;
    }

    fn labels(&self) -> Vec<&'static str> {
        [
            (self.is_arg, "arg"),
            (self.is_global, "global"),
            (self.is_alloc, "alloc"),
            (self.is_call, "call"),
            (self.is_unknown, "unknown"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

/// A must-alias class of pointer values.
#[derive(Clone, Debug, Default)]
pub struct DepNode {
    pub members: Vec<ValueId>,
    pub flags: Provenance,
    /// Allocation sites, named by their result value, that may reach this
    /// node.
    pub locs: BTreeSet<ValueId>,
    pub in_edges: Vec<EdgeId>,
    pub out_edges: Vec<EdgeId>,
}

/// Provenance graph over the pointer values of a module. Nodes and edges
/// live in arenas and refer to each other by handle.
#[derive(Clone, Debug, Default)]
pub struct DepGraph {
    nodes: Vec<DepNode>,
    edges: Vec<DepEdge>,
    live: BTreeSet<NodeId>,
    owner: HashMap<ValueId, NodeId>,
    alloc_sites: Vec<ValueId>,
}

/// A root of the graph that is not an origin of its own.
fn untracked(node: &DepNode) -> bool {
    node.in_edges.is_empty() && !(node.flags.is_arg || node.flags.is_alloc || node.flags.is_global)
}

impl DepGraph {
    /// Build the graph of `module` and propagate provenance through it.
    pub fn build(module: &Module, accesses: &HashMap<ValueId, IndexAccess>) -> Self {
        let mut graph = DepGraph::default();
        graph.collect_candidates(module);
        let unknown_params = graph.connect(module, accesses);
        for param in unknown_params {
            graph.detach(param);
        }
        graph.propagate();
        debug!(
            "dependency graph: {} live nodes, {} edges",
            graph.live.len(),
            graph.live_edges().count()
        );
        graph
    }

    fn collect_candidates(&mut self, module: &Module) {
        for &global in module.globals() {
            self.add_node(global).flags.is_global = true;
        }
        for func in module.functions() {
            for &param in &func.params {
                if module.is_pointer(param) {
                    self.add_node(param).flags.is_arg = true;
                }
            }
        }
        for func in module.functions().iter().filter(|f| f.has_body) {
            for inst in &func.instructions {
                for value in inst.result().into_iter().chain(inst.operands()) {
                    if module.is_pointer(value) {
                        self.add_node(value);
                    }
                }
                if let Instruction::Call {
                    result: Some(result),
                    target,
                    ..
                } = inst
                {
                    if module.is_pointer(*result) {
                        let flags = &mut self.add_node(*result).flags;
                        match target {
                            CallTarget::Alloc => flags.is_alloc = true,
                            _ => flags.is_call = true,
                        }
                        if *target == CallTarget::Alloc {
                            self.alloc_sites.push(*result);
                        }
                    }
                }
            }
        }
    }

    fn add_node(&mut self, value: ValueId) -> &mut DepNode {
        let id = match self.owner.get(&value) {
            Some(id) => *id,
            None => {
                let id = NodeId(self.nodes.len());
                self.nodes.push(DepNode {
                    members: vec![value],
                    ..Default::default()
                });
                self.live.insert(id);
                self.owner.insert(value, id);
                id
            }
        };
        &mut self.nodes[id.0]
    }

    /// Add the edges of every modeled construct. Returns the parameters that
    /// some call site does not provide.
    fn connect(
        &mut self,
        module: &Module,
        accesses: &HashMap<ValueId, IndexAccess>,
    ) -> Vec<NodeId> {
        let mut unknown_params = Vec::new();
        for func in module.functions().iter().filter(|f| f.has_body) {
            for inst in &func.instructions {
                match inst {
                    Instruction::Call {
                        result,
                        target,
                        args,
                    } => match target {
                        CallTarget::Function(callee) => {
                            let callee = module.function(*callee);
                            for (pos, &param) in callee.params.iter().enumerate() {
                                let Some(param_node) = self.node_of(param) else {
                                    continue;
                                };
                                match args.get(pos) {
                                    Some(&arg) => self.add_edge(
                                        param,
                                        arg,
                                        Range::zero(),
                                        None,
                                        EdgeKind::Parameter,
                                    ),
                                    None => {
                                        debug!(
                                            "call to {} misses argument {}",
                                            callee.name,
                                            module.value_name(param)
                                        );
                                        unknown_params.push(param_node);
                                    }
                                }
                            }
                            if let Some(result) = result.filter(|r| module.is_pointer(*r)) {
                                for returned in callee.returned_values() {
                                    self.add_edge(
                                        result,
                                        returned,
                                        Range::zero(),
                                        None,
                                        EdgeKind::CallResult,
                                    );
                                }
                            }
                        }
                        CallTarget::Realloc => {
                            if let (Some(result), Some(&old)) = (result, args.first()) {
                                self.add_edge(
                                    *result,
                                    old,
                                    Range::unknown(),
                                    None,
                                    EdgeKind::Realloc,
                                );
                            }
                        }
                        CallTarget::Alloc | CallTarget::Unknown => {}
                    },
                    Instruction::Index { result, base, .. } => {
                        let offset = accesses
                            .get(result)
                            .map(|access| access.offset)
                            .unwrap_or_else(Range::unknown);
                        if offset.is_zero() {
                            self.coalesce(*result, *base);
                        } else {
                            self.add_edge(*result, *base, offset, Some(*result), EdgeKind::Index);
                        }
                    }
                    Instruction::Cast { result, source }
                    | Instruction::CaseSplit {
                        result,
                        operand: source,
                        ..
                    } => self.coalesce(*result, *source),
                    Instruction::Merge { result, incoming } => {
                        for &value in incoming {
                            self.add_edge(*result, value, Range::zero(), None, EdgeKind::Merge);
                        }
                    }
                    _ => {}
                }
            }
        }
        unknown_params
    }

    /// The live node holding `value`, if the value is a pointer candidate.
    pub fn node_of(&self, value: ValueId) -> Option<NodeId> {
        self.owner.get(&value).copied()
    }

    pub fn node(&self, id: NodeId) -> &DepNode {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &DepEdge {
        &self.edges[id.0]
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.live.iter().copied()
    }

    pub fn live_edges(&self) -> impl Iterator<Item = &DepEdge> + '_ {
        self.live
            .iter()
            .flat_map(|n| self.nodes[n.0].in_edges.iter())
            .map(|e| &self.edges[e.0])
    }

    pub fn alloc_sites(&self) -> &[ValueId] {
        &self.alloc_sites
    }

    fn add_edge(
        &mut self,
        child: ValueId,
        base: ValueId,
        offset: Range,
        access: Option<ValueId>,
        kind: EdgeKind,
    ) {
        let (Some(child), Some(base)) = (self.node_of(child), self.node_of(base)) else {
            return;
        };
        if child == base {
            return;
        }
        let duplicate = self.nodes[child.0].in_edges.iter().any(|e| {
            let edge = &self.edges[e.0];
            edge.base == base && edge.kind == kind && edge.offset == offset && edge.access == access
        });
        if duplicate {
            return;
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(DepEdge {
            child,
            base,
            offset,
            access,
            kind,
        });
        self.nodes[child.0].in_edges.push(id);
        self.nodes[base.0].out_edges.push(id);
    }

    fn remove_edge(&mut self, id: EdgeId) {
        let DepEdge { child, base, .. } = self.edges[id.0];
        self.nodes[child.0].in_edges.retain(|e| *e != id);
        self.nodes[base.0].out_edges.retain(|e| *e != id);
    }

    /// Merge the classes of `a` and `b`. The class of `b` survives, every
    /// edge of the absorbed node is redirected to it before the absorbed
    /// node leaves the live set.
    pub fn coalesce(&mut self, a: ValueId, b: ValueId) {
        let (Some(absorbed), Some(survivor)) = (self.node_of(a), self.node_of(b)) else {
            return;
        };
        if absorbed == survivor {
            return;
        }
        let node = std::mem::take(&mut self.nodes[absorbed.0]);
        for &member in &node.members {
            self.owner.insert(member, survivor);
        }
        for id in node.in_edges {
            self.edges[id.0].child = survivor;
            if self.edges[id.0].base == survivor {
                self.nodes[survivor.0].out_edges.retain(|e| *e != id);
            } else {
                self.nodes[survivor.0].in_edges.push(id);
            }
        }
        for id in node.out_edges {
            self.edges[id.0].base = survivor;
            if self.edges[id.0].child == survivor {
                self.nodes[survivor.0].in_edges.retain(|e| *e != id);
            } else {
                self.nodes[survivor.0].out_edges.push(id);
            }
        }
        let target = &mut self.nodes[survivor.0];
        target.members.extend(node.members);
        target.flags.merge(node.flags);
        target.locs.extend(node.locs);
        self.live.remove(&absorbed);
    }

    /// Forget where a node comes from.
    fn detach(&mut self, id: NodeId) {
        self.nodes[id.0].flags.is_unknown = true;
        for edge in self.nodes[id.0].in_edges.clone() {
            self.remove_edge(edge);
        }
    }

    /// Visit every node reachable from `seeds` along out-edges accepted by
    /// `follow`, seeds included.
    fn reach(&self, seeds: &[NodeId], follow: impl Fn(&DepEdge) -> bool) -> HashSet<NodeId> {
        let mut visited: HashSet<NodeId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<NodeId> = seeds.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            for edge in &self.nodes[current.0].out_edges {
                let edge = &self.edges[edge.0];
                if follow(edge) && visited.insert(edge.child) {
                    queue.push_back(edge.child);
                }
            }
        }
        visited
    }

    fn seeds(&self, pred: impl Fn(&Provenance) -> bool) -> Vec<NodeId> {
        self.live
            .iter()
            .copied()
            .filter(|n| pred(&self.nodes[n.0].flags))
            .collect()
    }

    fn propagate(&mut self) {
        // Loads, unknown calls and callees without pointer returns give
        // pointers nothing tracks. Everything derived from them is unknown.
        for n in self.seeds(|_| true) {
            if untracked(&self.nodes[n.0]) {
                self.nodes[n.0].flags.is_unknown = true;
            }
        }
        // A call result is not an argument of the caller.
        let args = self.reach(&self.seeds(|f| f.is_arg), |e| e.kind != EdgeKind::CallResult);
        let globals = self.reach(&self.seeds(|f| f.is_global), |_| true);
        let unknown = self.reach(&self.seeds(|f| f.is_unknown), |_| true);
        for n in args {
            self.nodes[n.0].flags.is_arg = true;
        }
        for n in globals {
            self.nodes[n.0].flags.is_global = true;
        }
        for n in unknown {
            self.nodes[n.0].flags.is_unknown = true;
        }

        for site in self.alloc_sites.clone() {
            let Some(origin) = self.node_of(site) else {
                continue;
            };
            for n in self.reach(&[origin], |_| true) {
                self.nodes[n.0].locs.insert(site);
            }
        }
    }

    /// Provenance alone shows that the two classes never overlap.
    pub fn disjoint_origins(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a.0], &self.nodes[b.0]);
        if na.flags.is_unknown || nb.flags.is_unknown {
            return false;
        }
        let local = |n: &DepNode| !n.flags.is_arg && !n.flags.is_global;
        if (na.flags.is_arg && local(nb)) || (nb.flags.is_arg && local(na)) {
            return true;
        }
        if na.locs.is_empty() || nb.locs.is_empty() {
            return false;
        }
        na.locs.is_disjoint(&nb.locs)
    }

    /// Graphviz rendering of the live classes and their edges.
    pub fn print(&self, module: &Module) -> String {
        let mut output = "digraph DepGraph {\n".to_owned();
        for &id in &self.live {
            let node = &self.nodes[id.0];
            let names = node.members.iter().map(|m| module.value_name(*m)).join(", ");
            let mut label = names;
            let flags = node.flags.labels();
            if !flags.is_empty() {
                write!(label, "\\n[{}]", flags.join(", ")).expect("writing to a string");
            }
            if !node.locs.is_empty() {
                let locs = node.locs.iter().map(|l| module.value_name(*l)).join(", ");
                write!(label, "\\nlocs: {locs}").expect("writing to a string");
            }
            writeln!(output, "  Node_{}[label=\"{}\"]", id.0, label).expect("writing to a string");
        }
        output.push('\n');
        for edge in self.live_edges() {
            writeln!(
                output,
                "  Node_{} -> Node_{}[label=\"{}\"]",
                edge.base.0, edge.child.0, edge.offset
            )
            .expect("writing to a string");
        }
        output.push_str("}\n");
        output
    }
}
