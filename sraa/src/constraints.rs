use std::collections::BTreeSet;

use itertools::Itertools;

use crate::domains::{BitSet, DenseIndex};
use crate::program::{Module, ValueId};

/// Position of a variable inside its [`RelationStore`]. Relation sets are
/// bit sets over these positions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VarId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ConstraintId(pub usize);

/// A program value taking part in the strict order.
#[derive(Clone, Debug)]
pub struct Variable {
    pub value: ValueId,
    /// Variables known to be strictly smaller.
    pub lt: BitSet,
    /// Variables known to be strictly greater.
    pub gt: BitSet,
    /// Variables that must never be ordered against this one.
    pub sa: BitSet,
    /// Constraints mentioning this variable.
    pub constraints: Vec<ConstraintId>,
}

/// Owns every [`Variable`] of an analysis session together with the dense
/// index their relation sets are built over.
///
/// Invariants kept by all insertions:
/// * `x ∈ LT(y)` if and only if `y ∈ GT(x)`
/// * no variable is ordered against itself
/// * variables in each other's SA set are never ordered
#[derive(Clone, Debug, Default)]
pub struct RelationStore {
    index: DenseIndex<ValueId>,
    vars: Vec<Variable>,
}

impl RelationStore {
    /// The variable of `value`, created on first use.
    pub fn variable(&mut self, value: ValueId) -> VarId {
        let pos = self.index.position_or_insert(value);
        if pos == self.vars.len() {
            self.vars.push(Variable {
                value,
                lt: BitSet::new(&self.index),
                gt: BitSet::new(&self.index),
                sa: BitSet::new(&self.index),
                constraints: Vec::new(),
            });
        }
        VarId(pos)
    }

    pub fn lookup(&self, value: ValueId) -> Option<VarId> {
        self.index.position(value).map(VarId)
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId)
    }

    pub(crate) fn attach(&mut self, var: VarId, constraint: ConstraintId) {
        self.vars[var.0].constraints.push(constraint);
    }

    /// `x < y` holds.
    pub fn is_less(&self, x: VarId, y: VarId) -> bool {
        self.vars[y.0].lt.contains(x.0)
    }

    pub fn is_apart(&self, x: VarId, y: VarId) -> bool {
        self.vars[x.0].sa.contains(y.0)
    }

    /// Record `x < y` in both directions. Returns false when nothing changed,
    /// either because the fact is known, the pair is the same variable, or
    /// the pair is strictly apart.
    pub fn insert_lt(&mut self, x: VarId, y: VarId) -> bool {
        if x == y || self.is_less(x, y) || self.is_apart(x, y) {
            return false;
        }
        self.vars[y.0].lt.insert(x.0);
        self.vars[x.0].gt.insert(y.0);
        true
    }

    /// Record that `x` and `y` are never ordered. Pairs that are already
    /// ordered keep their order.
    pub fn insert_sa(&mut self, x: VarId, y: VarId) -> bool {
        if x == y || self.is_apart(x, y) || self.is_less(x, y) || self.is_less(y, x) {
            return false;
        }
        self.vars[x.0].sa.insert(y.0);
        self.vars[y.0].sa.insert(x.0);
        true
    }

    /// Mark two program values strictly apart, creating their variables when
    /// needed.
    pub fn mark_apart(&mut self, a: ValueId, b: ValueId) -> bool {
        let x = self.variable(a);
        let y = self.variable(b);
        self.insert_sa(x, y)
    }

    fn insert_lt_tracked(&mut self, x: VarId, y: VarId, changed: &mut BTreeSet<VarId>) {
        if self.insert_lt(x, y) {
            changed.insert(x);
            changed.insert(y);
        }
    }

    fn insert_sa_tracked(&mut self, x: VarId, y: VarId, changed: &mut BTreeSet<VarId>) {
        if self.insert_sa(x, y) {
            changed.insert(x);
            changed.insert(y);
        }
    }

    fn members(set: &BitSet) -> Vec<VarId> {
        set.iter().map(VarId).collect()
    }

    /// `name` of the variable in dumps.
    pub fn name<'m>(&self, module: &'m Module, var: VarId) -> &'m str {
        module.value_name(self.vars[var.0].value)
    }

    /// Render the relation sets of every variable in creation order.
    pub fn print(&self, module: &Module) -> String {
        let render = |set: &BitSet| {
            if set.is_empty() {
                "{E}".to_owned()
            } else {
                let names: String = set
                    .iter()
                    .map(|v| format!("{}; ", self.name(module, VarId(v))))
                    .collect();
                format!("{{{names}}}")
            }
        };
        let mut output = String::new();
        for var in &self.vars {
            output.push_str(&format!(
                "Variable: {}\nLT: {}\nGT: {}\nSA: {}\n",
                module.value_name(var.value),
                render(&var.lt),
                render(&var.gt),
                render(&var.sa)
            ));
        }
        output
    }
}

/// A fact relating variables. Resolving a constraint adds the relations it
/// implies given what is already known.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Constraint {
    /// `x < y`.
    LessThan(VarId, VarId),
    /// `x <= y`. Only the transitive consequences are recorded.
    LessOrEqual(VarId, VarId),
    /// `x` and `y` name the same address, relations flow both ways.
    RenameEqual(VarId, VarId),
    /// `x` takes the value of `y` on one branch, relations flow into `x`.
    ValueEqual(VarId, VarId),
    /// `x` is one of the operands, depending on the incoming edge.
    Merge(VarId, Vec<VarId>),
}

impl Constraint {
    pub fn variables(&self) -> Vec<VarId> {
        match self {
            Constraint::LessThan(x, y)
            | Constraint::LessOrEqual(x, y)
            | Constraint::RenameEqual(x, y)
            | Constraint::ValueEqual(x, y) => vec![*x, *y],
            Constraint::Merge(x, operands) => std::iter::once(*x)
                .chain(operands.iter().copied())
                .unique()
                .collect(),
        }
    }

    /// Apply the constraint to `store`. Returns the variables whose relation
    /// sets grew.
    pub fn resolve(&self, store: &mut RelationStore) -> BTreeSet<VarId> {
        let mut changed = BTreeSet::new();
        match self {
            Constraint::LessThan(x, y) => {
                let (x, y) = (*x, *y);
                // LT(y) |= LT(x) + {x}
                store.insert_lt_tracked(x, y, &mut changed);
                for z in RelationStore::members(&store.var(x).lt) {
                    store.insert_lt_tracked(z, y, &mut changed);
                }
                // GT(x) |= GT(y) + {y}
                for z in RelationStore::members(&store.var(y).gt) {
                    store.insert_lt_tracked(x, z, &mut changed);
                }
            }
            Constraint::LessOrEqual(x, y) => {
                let (x, y) = (*x, *y);
                for z in RelationStore::members(&store.var(x).lt) {
                    store.insert_lt_tracked(z, y, &mut changed);
                }
                for z in RelationStore::members(&store.var(y).gt) {
                    store.insert_lt_tracked(x, z, &mut changed);
                }
            }
            Constraint::RenameEqual(x, y) => {
                copy_relations(store, *x, *y, &mut changed);
                copy_relations(store, *y, *x, &mut changed);
            }
            Constraint::ValueEqual(x, y) => {
                copy_relations(store, *x, *y, &mut changed);
            }
            Constraint::Merge(x, operands) => {
                resolve_merge(store, *x, operands, &mut changed);
            }
        }
        changed
    }

    pub fn print(&self, store: &RelationStore, module: &Module) -> String {
        let name = |v: &VarId| store.name(module, *v);
        match self {
            Constraint::LessThan(x, y) => format!("{} < {}", name(x), name(y)),
            Constraint::LessOrEqual(x, y) => format!("{} <= {}", name(x), name(y)),
            Constraint::RenameEqual(x, y) => format!("{} == {}", name(x), name(y)),
            Constraint::ValueEqual(x, y) => format!("{} = {}", name(x), name(y)),
            Constraint::Merge(x, operands) => {
                let ops = operands.iter().map(|o| format!("{};", name(o))).join(" ");
                format!("{} = o| {}", name(x), ops)
            }
        }
    }
}

/// Relations of `from` become relations of `into`.
fn copy_relations(
    store: &mut RelationStore,
    into: VarId,
    from: VarId,
    changed: &mut BTreeSet<VarId>,
) {
    for z in RelationStore::members(&store.var(from).lt) {
        store.insert_lt_tracked(z, into, changed);
    }
    for z in RelationStore::members(&store.var(from).gt) {
        store.insert_lt_tracked(into, z, changed);
    }
    for z in RelationStore::members(&store.var(from).sa) {
        store.insert_sa_tracked(into, z, changed);
    }
}

fn intersection<'a>(mut sets: impl Iterator<Item = &'a BitSet>) -> BitSet {
    let Some(first) = sets.next() else {
        return BitSet::default();
    };
    let mut result = first.clone();
    for set in sets {
        result.intersect_with(set);
    }
    result
}

/// Bound set of a merge result in one direction. `dominates` tells whether
/// an operand already sits on the far side of the result.
fn merge_bound(sets: &[&BitSet], dominates: &[bool], monotone: bool) -> BitSet {
    if !monotone {
        return intersection(sets.iter().copied());
    }
    let mut result = intersection(
        sets.iter()
            .zip(dominates)
            .filter(|(_, dom)| !**dom)
            .map(|(set, _)| *set),
    );
    for (set, _) in sets.iter().zip(dominates).filter(|(_, dom)| **dom) {
        result.union_with(set);
    }
    result
}

fn resolve_merge(
    store: &mut RelationStore,
    x: VarId,
    operands: &[VarId],
    changed: &mut BTreeSet<VarId>,
) {
    if operands.is_empty() {
        return;
    }
    let (mut lt_bound, mut gt_bound, mut sa_bound) = {
        let vars: Vec<&Variable> = operands.iter().map(|o| store.var(*o)).collect();
        // Operands above x mean x grows upward through the merge, operands
        // below it mean it grows downward.
        let above: Vec<bool> = vars.iter().map(|v| v.lt.contains(x.0)).collect();
        let below: Vec<bool> = vars.iter().map(|v| v.gt.contains(x.0)).collect();
        let grows_up = above.iter().any(|b| *b);
        let grows_down = below.iter().any(|b| *b);

        let lts: Vec<&BitSet> = vars.iter().map(|v| &v.lt).collect();
        let gts: Vec<&BitSet> = vars.iter().map(|v| &v.gt).collect();
        let sas: Vec<&BitSet> = vars.iter().map(|v| &v.sa).collect();
        (
            merge_bound(&lts, &above, grows_up && !grows_down),
            merge_bound(&gts, &below, grows_down && !grows_up),
            intersection(sas.into_iter()),
        )
    };

    let mut excluded = store.var(x).sa.clone();
    excluded.insert(x.0);
    lt_bound.difference_with(&excluded);
    gt_bound.difference_with(&excluded);
    sa_bound.difference_with(&excluded);
    for z in RelationStore::members(&lt_bound) {
        store.insert_lt_tracked(z, x, changed);
    }
    for z in RelationStore::members(&gt_bound) {
        store.insert_lt_tracked(x, z, changed);
    }
    for z in RelationStore::members(&sa_bound) {
        store.insert_sa_tracked(x, z, changed);
    }
}
