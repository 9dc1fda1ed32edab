//! Strict relations alias analysis: a whole-program pointer alias analysis
//! that disproves aliasing by ordering pointers.
//!
//! The analysis derives a strict partial order between program values from
//! additions, subtractions, address computations and the comparisons that
//! guard branches. Two pointers that are ordered (one is definitely smaller
//! than the other) cannot point to the same address. The order is combined
//! with a provenance graph over pointer values that tracks where pointers
//! come from (arguments, globals, allocation sites) and by which constant
//! offsets they are displaced from each other.
//!
//! The analysis runs in phases:
//! 1. [`facts::FactCollector`] turns the program into [`constraints::Constraint`]s.
//! 2. The [`solvers::WorkList`] solves them to a fixed point.
//! 3. [`depgraph::DepGraph`] and [`local_tree::LocalTree`] are built.
//! 4. Ordering facts read off the graph are added and the solver runs again.
//!
//! Queries go through [`AliasAnalysis::alias`] afterwards and only read the
//! final state. Every test only ever proves the absence of aliasing, the
//! default answer is [`AliasResult::MayAlias`].
//!
//! The approach is described in:
//! * Pointer Disambiguation via Strict Inequalities, Maalej, Paisante, Ramos,
//!   Gonnord and Pereira, CGO 2017

/// Alias queries on top of the solved state.
pub mod alias;

/// Traits for control flow graphs of front-ends, and a few algorithms on them.
pub mod cfg;

/// Strict order variables and the constraints relating them.
pub mod constraints;

/// Provenance graph over pointer values.
pub mod depgraph;

/// Integer ranges, lattice traits, and the dense sets relations are stored in.
pub mod domains;

/// Turning program instructions into constraints.
pub mod facts;

/// Unit counts of types, used to compute offsets of address computations.
pub mod layout;

/// Divergence of pointers hanging off a common ancestor.
pub mod local_tree;

/// The program representation the analysis consumes.
pub mod program;

/// The fixed-point driver for constraints.
pub mod solvers;

pub use alias::{AliasAnalysis, AliasResult, NoAliasInfo, StrictRelations};
pub use program::{MapOracle, RangeOracle};

/// Switches for the individual parts of the analysis.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// Use divergence in the local tree to prove no alias.
    pub local_tree: bool,
    /// Use the strict order to prove no alias.
    pub strict_order: bool,
    /// Use disjoint provenance to prove no alias.
    pub provenance: bool,
    /// Feed ordering facts from the dependency graph back into the solver.
    pub graph_constraints: bool,
    /// Mark results of distinct allocation sites as never ordered.
    pub apart_allocations: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_tree: true,
            strict_order: true,
            provenance: true,
            graph_constraints: true,
            apart_allocations: true,
        }
    }
}

#[cfg(test)]
mod test_utils;



#[cfg(test)]
mod layout_tests;


#[cfg(test)]
mod depgraph_tests;

#[cfg(test)]
mod facts_tests;
