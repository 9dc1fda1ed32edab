use std::collections::HashMap;

use super::constraints::RelationStore;
use super::depgraph::*;
use super::domains::Range;
use super::facts::{FactCollector, IndexAccess};
use super::layout::Primitives;
use super::local_tree::LocalTree;
use super::program::*;
use super::solvers::WorkList;
use super::test_utils::Builder;

fn accesses_of(module: &Module) -> HashMap<ValueId, IndexAccess> {
    let oracle = MapOracle::new(module);
    let mut store = RelationStore::default();
    let mut worklist = WorkList::default();
    let mut primitives = Primitives::default();
    FactCollector::new(module, &oracle, &mut store, &mut worklist, &mut primitives).collect()
}

fn build(module: &Module) -> DepGraph {
    DepGraph::build(module, &accesses_of(module))
}

#[test]
fn zero_offsets_and_casts_coalesce() {
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let ptr = b.ptr(record);
    let p = b.value("p", ptr);
    let f = b.function("f", vec![p]);
    let q = b.value("q", ptr);
    b.push(f, Instruction::Cast { result: q, source: p });
    let r = b.index(f, "r", q, &[0]);
    let s = b.index(f, "s", r, &[2]);

    let graph = build(&b.module);
    let base = graph.node_of(p).expect("p is a pointer");
    assert_eq!(graph.node_of(q), Some(base));
    assert_eq!(graph.node_of(r), Some(base));
    assert_eq!(graph.node(base).members, vec![p, q, r]);

    let child = graph.node_of(s).expect("s is a pointer");
    assert_ne!(child, base);
    let in_edges = &graph.node(child).in_edges;
    assert_eq!(in_edges.len(), 1);
    let edge = graph.edge(in_edges[0]);
    assert_eq!(edge.base, base);
    assert_eq!(edge.offset, Range::from(8));
    assert_eq!(edge.kind, EdgeKind::Index);
    assert_eq!(edge.access, Some(s));
    assert_eq!(graph.live_nodes().count(), 2);
}

#[test]
fn coalescing_redirects_edges() {
    // m = phi(a, b) is built before a and b turn out to be the same class.
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let p = b.value("p", ptr);
    let f = b.function("f", vec![p]);
    let x = b.value("x", ptr);
    let m = b.value("m", ptr);
    b.push(
        f,
        Instruction::Merge {
            result: m,
            incoming: vec![p, x],
        },
    );
    b.push(f, Instruction::Cast { result: x, source: m });

    let graph = build(&b.module);
    // x joined m, the edge m -> x became a self loop and is gone.
    let node = graph.node_of(m).expect("m is a pointer");
    assert_eq!(graph.node_of(x), Some(node));
    let in_edges = &graph.node(node).in_edges;
    assert_eq!(in_edges.len(), 1);
    assert_eq!(graph.edge(in_edges[0]).base, graph.node_of(p).expect("p"));
    assert!(graph.node(node).out_edges.is_empty());
}

#[test]
fn provenance_flows_along_edges() {
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let g = b.module.add_global("g", int);

    // callee(p) { q = p[1]; ret g; }
    let p = b.value("p", ptr);
    let callee = b.function("callee", vec![p]);
    let q = b.index(callee, "q", p, &[1]);
    b.push(callee, Instruction::Return(Some(g)));

    // main() { a = alloc; r = callee(a); }
    let main = b.function("main", vec![]);
    let a = b.alloc(main, "a", ptr);
    let r = b.value("r", ptr);
    b.push(
        main,
        Instruction::Call {
            result: Some(r),
            target: CallTarget::Function(callee),
            args: vec![a],
        },
    );

    let graph = build(&b.module);
    let node = |v| graph.node(graph.node_of(v).expect("pointer"));
    assert!(node(p).flags.is_arg);
    assert!(node(q).flags.is_arg);
    assert!(!node(a).flags.is_arg);
    assert!(node(a).flags.is_alloc);
    assert!(node(r).flags.is_global);
    assert!(node(r).flags.is_call);
    assert!(!node(r).flags.is_arg);

    assert!(node(a).locs.contains(&a));
    assert!(node(p).locs.contains(&a));
    assert!(node(q).locs.contains(&a));
    assert!(node(r).locs.is_empty());
    assert_eq!(graph.alloc_sites(), &[a]);
}

#[test]
fn missing_arguments_make_parameters_unknown() {
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let p = b.value("p", ptr);
    let callee = b.function("callee", vec![p]);
    let q = b.index(callee, "q", p, &[1]);

    let main = b.function("main", vec![]);
    let a = b.alloc(main, "a", ptr);
    b.push(
        main,
        Instruction::Call {
            result: None,
            target: CallTarget::Function(callee),
            args: vec![a],
        },
    );
    b.push(
        main,
        Instruction::Call {
            result: None,
            target: CallTarget::Function(callee),
            args: vec![],
        },
    );

    let graph = build(&b.module);
    let pn = graph.node_of(p).expect("p is a pointer");
    assert!(graph.node(pn).flags.is_unknown);
    assert!(graph.node(pn).in_edges.is_empty());
    assert!(graph.node(pn).locs.is_empty());
    let qn = graph.node_of(q).expect("q is a pointer");
    assert!(graph.node(qn).flags.is_unknown);
    let an = graph.node_of(a).expect("a is a pointer");
    assert!(graph.node(an).out_edges.is_empty());
    assert!(!graph.disjoint_origins(pn, an));
}

#[test]
fn reallocation_keeps_the_origin() {
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let main = b.function("main", vec![]);
    let a = b.alloc(main, "a", ptr);
    let c = b.alloc(main, "c", ptr);
    let n = b.constant(8);
    let r = b.value("r", ptr);
    b.push(
        main,
        Instruction::Call {
            result: Some(r),
            target: CallTarget::Realloc,
            args: vec![a, n],
        },
    );

    let graph = build(&b.module);
    let rn = graph.node_of(r).expect("r is a pointer");
    let edge = graph.edge(graph.node(rn).in_edges[0]);
    assert_eq!(edge.kind, EdgeKind::Realloc);
    assert_eq!(edge.offset, Range::unknown());
    assert!(graph.node(rn).locs.contains(&a));
    let (an, cn) = (graph.node_of(a).expect("a"), graph.node_of(c).expect("c"));
    assert!(graph.disjoint_origins(rn, cn));
    assert!(!graph.disjoint_origins(rn, an));
}

#[test]
fn local_tree_paths() {
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let ptr = b.ptr(record);
    let p = b.value("p", ptr);
    let f = b.function("f", vec![p]);
    let x = b.index(f, "x", p, &[2]);
    let y = b.index(f, "y", p, &[5]);
    let z = b.index(f, "z", x, &[3]);

    let graph = build(&b.module);
    let tree = LocalTree::build(&graph);
    let id = |v| graph.node_of(v).expect("pointer");
    let (pn, xn, yn, zn) = (id(p), id(x), id(y), id(z));

    assert_eq!(tree.root(zn), Some(pn));
    let path = tree.path(zn).expect("every live node has a path");
    assert_eq!(path[&zn], (0, Range::zero()));
    assert_eq!(path[&xn], (1, Range::from(12)));
    assert_eq!(path[&pn], (2, Range::from(20)));

    // x is at 8, y at 20, z at 20 relative to p.
    assert!(tree.diverge(xn, yn));
    assert!(tree.diverge(yn, xn));
    assert!(tree.diverge(xn, zn));
    assert!(!tree.diverge(yn, zn));
}

#[test]
fn local_tree_cycles_pick_the_highest_handle() {
    // a = phi(c), c = a[1]: a single-edge cycle.
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let f = b.function("f", vec![]);
    let a = b.value("a", ptr);
    let c = b.value("c", ptr);
    b.push(
        f,
        Instruction::Merge {
            result: a,
            incoming: vec![c],
        },
    );
    let one = b.constant(1);
    b.push(
        f,
        Instruction::Index {
            result: c,
            base: a,
            indices: vec![one],
        },
    );

    let graph = build(&b.module);
    let tree = LocalTree::build(&graph);
    let (an, cn) = (graph.node_of(a).expect("a"), graph.node_of(c).expect("c"));
    let highest = an.max(cn);
    assert_eq!(tree.root(an), Some(highest));
    assert_eq!(tree.root(cn), Some(highest));
}

#[test]
fn print_graph() {
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let p = b.value("p", ptr);
    let f = b.function("f", vec![p]);
    let q = b.value("q", ptr);
    b.push(f, Instruction::Cast { result: q, source: p });
    b.index(f, "r", p, &[3]);

    let graph = build(&b.module);
    let expected = r#"digraph DepGraph {
  Node_0[label="p, q\n[arg]"]
  Node_2[label="r\n[arg]"]

  Node_0 -> Node_2[label="[192, 192]"]
}
"#;
    assert_eq!(graph.print(&b.module), expected);
}
