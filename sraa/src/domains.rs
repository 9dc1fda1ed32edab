use core::cmp::Ordering;
use core::fmt::{Debug, Display};
use core::hash::Hash;
use core::ops::{Add, Mul, Neg, Sub};
use std::collections::HashMap;

use fixedbitset::FixedBitSet;

/////////////////////////
// Traits for domains. //
/////////////////////////

/// A join semi-lattice is a partially ordered set where the least upper
/// bound exists for every subset. The ordering relation is read as "safe
/// approximation": the range \[4, 7\] is a safe approximation of \[5, 6\].
/// Top represents the biggest element (largest approximation), Bottom
/// represents the smallest one.
pub trait JoinSemiLattice: Eq + PartialOrd + Clone + Debug {
    /// A type to hold some information about the lattice on the side.
    /// When no such information is needed, set this to unit.
    type LatticeContext;

    /// The unit element of the join operation. Bottom values in an analysis
    /// result usually stand for values that were never computed.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// The least upper bound of two elements.
    ///
    /// Requirements:
    /// * Reflexive: a.join(a, ctx) == a
    /// * Commutative: a.join(b, ctx) == b.join(a, ctx)
    /// * Bottom is unit: bottom.join(b, ctx) == b
    /// * Upper bound: a.join(b, ctx) >= a and a.join(b, ctx) >= b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;

    /// Over-approximating join used to force convergence on lattices with
    /// long ascending chains. The state from the previous iteration tells
    /// which bounds did not stabilize.
    ///
    /// Requirements:
    /// * Reflexive: a.widen(a, ctx, i) == a
    /// * b.widen(a, ctx, i) == b if a <= b
    fn widen(&self, _previous: &Self, _ctx: &Self::LatticeContext, _iteration: usize) -> Self {
        self.clone()
    }
}

pub trait JoinSemiLatticeNoContext: JoinSemiLattice {
    /// See [JoinSemiLattice::bottom] for details. This version does not
    /// require a context.
    fn bottom_() -> Self;

    /// See [JoinSemiLattice::join] for details. This version does not
    /// require a context.
    fn join_(&self, other: &Self) -> Self;

    /// See [JoinSemiLattice::widen] for details. This version does not
    /// require a context.
    fn widen_(&self, previous: &Self, iteration: usize) -> Self;
}

impl<L: JoinSemiLattice<LatticeContext = ()>> JoinSemiLatticeNoContext for L {
    fn bottom_() -> Self {
        <L as JoinSemiLattice>::bottom(&())
    }

    fn join_(&self, other: &Self) -> Self {
        self.join(other, &())
    }

    fn widen_(&self, previous: &Self, iteration: usize) -> Self {
        self.widen(previous, &(), iteration)
    }
}

/// A lattice is a join semi-lattice that is also a meet semi-lattice, i.e.,
/// the greatest lower bound (meet) also exists for all subsets.
pub trait Lattice: JoinSemiLattice {
    /// The largest element of the lattice.
    fn top(ctx: &Self::LatticeContext) -> Self;

    /// The greatest lower bound of two elements. Used to refine a value
    /// with the facts learned from a condition.
    ///
    /// * Reflexive: a.meet(a, ctx) == a
    /// * Commutative: a.meet(b, ctx) == b.meet(a, ctx)
    /// * Top is unit: top.meet(b, ctx) == b
    /// * Bottom is the smallest: bottom.meet(b, ctx) == bottom
    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;
}

pub trait LatticeNoContext: Lattice {
    /// See [Lattice::top] for details. This version does not
    /// require a context.
    fn top_() -> Self;

    /// See [Lattice::meet] for details. This version does not
    /// require a context.
    fn meet_(&self, other: &Self) -> Self;
}

impl<L: Lattice<LatticeContext = ()>> LatticeNoContext for L {
    fn top_() -> Self {
        <L as Lattice>::top(&())
    }

    fn meet_(&self, other: &Self) -> Self {
        self.meet(other, &())
    }
}

////////////
// Ranges //
////////////

/// Sentinel for "unbounded above".
pub const INF: i64 = i64::MAX;
/// Sentinel for "unbounded below".
pub const NEG_INF: i64 = i64::MIN;

/// A closed integer interval `[lower, upper]` over the 64 bit width shared by
/// the whole analysis session. [`INF`] and [`NEG_INF`] are not numbers but
/// sentinels, arithmetic keeps them sticky. The canonical bottom is the empty
/// interval `[INF, NEG_INF]`.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct Range {
    pub lower: i64,
    pub upper: i64,
}

impl From<i64> for Range {
    fn from(val: i64) -> Self {
        Self {
            lower: val,
            upper: val,
        }
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_bottom() {
            return write!(f, "[]");
        }
        let to_str = |x: i64| match x {
            INF => "inf".to_owned(),
            NEG_INF => "-inf".to_owned(),
            _ => x.to_string(),
        };
        write!(f, "[{}, {}]", to_str(self.lower), to_str(self.upper))
    }
}

/// Clamp a wide intermediate result back into the session width. Anything
/// that does not fit becomes the matching sentinel.
fn clamp(val: i128) -> i64 {
    if val >= i128::from(INF) {
        INF
    } else if val <= i128::from(NEG_INF) {
        NEG_INF
    } else {
        val as i64
    }
}

fn is_sentinel(val: i64) -> bool {
    val == INF || val == NEG_INF
}

fn add_bound(a: i64, b: i64, sentinel: i64) -> i64 {
    if a == sentinel || b == sentinel {
        return sentinel;
    }
    clamp(i128::from(a) + i128::from(b))
}

fn mul_bound(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    if is_sentinel(a) || is_sentinel(b) {
        return if a.signum() == b.signum() { INF } else { NEG_INF };
    }
    clamp(i128::from(a) * i128::from(b))
}

impl Range {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// The range that carries no information.
    pub fn unknown() -> Self {
        Self::new(NEG_INF, INF)
    }

    pub fn zero() -> Self {
        Self::from(0)
    }

    pub fn is_bottom(&self) -> bool {
        self.lower > self.upper
    }

    pub fn is_zero(&self) -> bool {
        self.lower == 0 && self.upper == 0
    }

    pub fn is_singleton(&self) -> bool {
        self.lower == self.upper && !is_sentinel(self.lower)
    }

    /// Every value of `self` is strictly smaller than every value of `other`.
    pub fn precedes(&self, other: &Range) -> bool {
        !self.is_bottom() && !other.is_bottom() && self.upper < other.lower
    }

    /// The two ranges have no value in common.
    pub fn is_disjoint(&self, other: &Range) -> bool {
        self.precedes(other) || other.precedes(self)
    }

    /// Multiply both bounds by a non-negative factor, e.g., the number of
    /// address units of an element. Sentinels stay sentinels.
    pub fn scale(self, factor: i64) -> Range {
        debug_assert!(factor >= 0);
        if self.is_bottom() {
            return self;
        }
        let scale_bound = |bound: i64| {
            if is_sentinel(bound) {
                bound
            } else {
                clamp(i128::from(bound) * i128::from(factor))
            }
        };
        Range::new(scale_bound(self.lower), scale_bound(self.upper))
    }

    /// Ordering that only holds when it holds for every pair of values.
    pub fn strict_cmp(&self, other: &Range) -> Option<Ordering> {
        if self.precedes(other) {
            return Some(Ordering::Less);
        }
        if other.precedes(self) {
            return Some(Ordering::Greater);
        }
        if self.is_singleton() && self == other {
            return Some(Ordering::Equal);
        }
        None
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.is_bottom() {
            return Some(Ordering::Less);
        }
        if other.is_bottom() {
            return Some(Ordering::Greater);
        }
        if self.lower <= other.lower && self.upper >= other.upper {
            return Some(Ordering::Greater);
        }
        if self.lower >= other.lower && self.upper <= other.upper {
            return Some(Ordering::Less);
        }
        None
    }
}

impl JoinSemiLattice for Range {
    type LatticeContext = ();

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self {
            lower: INF,
            upper: NEG_INF,
        }
    }

    fn join(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        if self.is_bottom() {
            return *other;
        }
        if other.is_bottom() {
            return *self;
        }
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    fn widen(&self, prev: &Self, _: &Self::LatticeContext, _: usize) -> Self {
        if prev.is_bottom() {
            return *self;
        }
        Self {
            lower: if prev.lower > self.lower {
                NEG_INF
            } else {
                self.lower
            },
            upper: if prev.upper < self.upper {
                INF
            } else {
                self.upper
            },
        }
    }
}

impl Lattice for Range {
    fn top(_: &Self::LatticeContext) -> Self {
        Self::unknown()
    }

    fn meet(&self, other: &Self, _: &Self::LatticeContext) -> Self {
        let result = Range {
            lower: self.lower.max(other.lower),
            upper: self.upper.min(other.upper),
        };

        // We only want one canonical representation for bottom.
        if result.is_bottom() {
            Self::bottom(&())
        } else {
            result
        }
    }
}

impl Add for Range {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        // Arithmetic on bottom stays bottom.
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom(&());
        }
        Self {
            lower: add_bound(self.lower, rhs.lower, NEG_INF),
            upper: add_bound(self.upper, rhs.upper, INF),
        }
    }
}

impl Neg for Range {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_bottom() {
            return self;
        }
        Self {
            lower: if self.upper == INF {
                NEG_INF
            } else {
                clamp(-i128::from(self.upper))
            },
            upper: if self.lower == NEG_INF {
                INF
            } else {
                clamp(-i128::from(self.lower))
            },
        }
    }
}

impl Sub for Range {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for Range {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        if self.is_bottom() || rhs.is_bottom() {
            return Self::bottom(&());
        }
        let products = [
            mul_bound(self.lower, rhs.lower),
            mul_bound(self.lower, rhs.upper),
            mul_bound(self.upper, rhs.lower),
            mul_bound(self.upper, rhs.upper),
        ];
        Self {
            lower: *products.iter().min().unwrap_or(&NEG_INF),
            upper: *products.iter().max().unwrap_or(&INF),
        }
    }
}

///////////////////////////
// Dense index allocation //
///////////////////////////

/// Session-owned allocator that hands out consecutive positions for keys.
/// Bit sets store these positions, so every set built from the same
/// allocator agrees on what a bit means.
#[derive(Clone, Debug)]
pub struct DenseIndex<K: Eq + Hash + Copy> {
    positions: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K: Eq + Hash + Copy> Default for DenseIndex<K> {
    fn default() -> Self {
        Self {
            positions: HashMap::new(),
            keys: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Copy> DenseIndex<K> {
    /// Return the position of `key`, allocating the next free one on first
    /// use.
    pub fn position_or_insert(&mut self, key: K) -> usize {
        if let Some(&pos) = self.positions.get(&key) {
            return pos;
        }
        self.keys.push(key);
        self.positions.insert(key, self.keys.len() - 1);
        self.keys.len() - 1
    }

    pub fn position(&self, key: K) -> Option<usize> {
        self.positions.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A growable set of dense positions. Relation sets are sized by the
/// allocator they index into and grow when the allocator does.
#[derive(Clone, Default)]
pub struct BitSet(FixedBitSet);

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.ones().eq(other.0.ones())
    }
}

impl Eq for BitSet {}

impl BitSet {
    pub fn new<K: Eq + Hash + Copy>(index: &DenseIndex<K>) -> Self {
        Self(FixedBitSet::with_capacity(index.len()))
    }

    pub fn from<K: Eq + Hash + Copy>(index: &DenseIndex<K>, values: &[usize]) -> Self {
        let mut result = Self::new(index);
        for &v in values {
            result.insert(v);
        }
        result
    }

    /// Returns true when the position was not in the set before.
    pub fn insert(&mut self, pos: usize) -> bool {
        if pos >= self.0.len() {
            self.0.grow(pos + 1);
        }
        !self.0.put(pos)
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.0.contains(pos)
    }

    pub fn remove(&mut self, pos: usize) {
        if pos < self.0.len() {
            self.0.set(pos, false);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_clear()
    }

    pub fn len(&self) -> usize {
        self.0.count_ones(..)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        self.0.union_with(&other.0);
    }

    pub fn intersect_with(&mut self, other: &BitSet) {
        self.0.intersect_with(&other.0);
    }

    pub fn difference_with(&mut self, other: &BitSet) {
        self.0.difference_with(&other.0);
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }
}

impl PartialOrd for BitSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.0.is_superset(&other.0), other.0.is_superset(&self.0)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (_, _) => None,
        }
    }
}

impl Debug for BitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let elements: Vec<String> = self.iter().map(|x| x.to_string()).collect();
        write!(f, "{{{}}}", elements.join(", "))
    }
}
