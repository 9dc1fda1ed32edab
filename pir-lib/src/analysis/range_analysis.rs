use std::collections::{HashMap, VecDeque};

use log::trace;
use sraa::{
    cfg::{CfgBlock, ControlFlowGraph, reverse_post_order},
    domains::{JoinSemiLatticeNoContext, LatticeNoContext, Range, INF, NEG_INF},
    program::{RangeOracle, ValueId},
};

use crate::{
    ir::{Cfg, Operation, Type, Unit},
    lexer::{Identifier, TokenValue},
    lower::{sigma_origin, Lowered, SigmaOrigin},
};

/// Number of times a merge may grow before its bounds are widened.
pub const DEFAULT_WIDENING_DELAY: usize = 2;

fn is_numeric(ty: &Type) -> bool {
    matches!(ty, Type::Int(_) | Type::Bool)
}

struct Definition<'u> {
    func: usize,
    result: ValueId,
    op: &'u Operation,
    /// The guarding comparison of a sigma.
    origin: Option<SigmaOrigin>,
}

/// Sparse interval analysis over the SSA values of a unit. Every numeric
/// definition is evaluated from its operands, and re-evaluated whenever
/// one of them changes. Definitions are first visited in reverse
/// post-order, values in unreachable blocks stay unknown.
#[derive(Debug, Default)]
pub struct RangeAnalysis {
    ranges: HashMap<ValueId, Range>,
}

impl RangeOracle for RangeAnalysis {
    fn range(&self, value: ValueId) -> Range {
        self.ranges
            .get(&value)
            .copied()
            .unwrap_or_else(Range::unknown)
    }
}

impl RangeAnalysis {
    pub fn run(unit: &Unit, lowered: &Lowered, widening_delay: usize) -> Self {
        let mut solver = Solver {
            lowered,
            defs: Vec::new(),
            users: HashMap::new(),
            state: HashMap::new(),
        };
        solver.collect(unit);
        solver.solve(widening_delay);
        Self {
            ranges: solver.state,
        }
    }

    pub fn get(&self, value: ValueId) -> Option<Range> {
        self.ranges.get(&value).copied()
    }

    /// Print the unit with the range of each numeric result next to its
    /// definition.
    pub fn annotate(&self, unit: &Unit, lowered: &Lowered) -> String {
        let index: HashMap<Identifier, usize> = unit
            .functions
            .iter()
            .enumerate()
            .map(|(idx, cfg)| (cfg.get_function(), idx))
            .collect();
        crate::ir::print_annotated(unit, &|cfg: &Cfg, op: &Operation| {
            let result = op.get_result()?;
            if !is_numeric(&result.ty) {
                return None;
            }
            let value = lowered.value(*index.get(&cfg.get_function())?, result.id)?;
            let range = self.get(value)?;
            Some(format!("{}: {range}", unit.name(result.id)))
        })
    }
}

struct Solver<'u> {
    lowered: &'u Lowered,
    defs: Vec<Definition<'u>>,
    users: HashMap<ValueId, Vec<usize>>,
    state: HashMap<ValueId, Range>,
}

impl<'u> Solver<'u> {
    fn collect(&mut self, unit: &'u Unit) {
        for (func, cfg) in unit.functions.iter().enumerate() {
            for formal in cfg.get_formals() {
                if let (true, Some(value)) =
                    (is_numeric(&formal.ty), self.lowered.value(func, formal.id))
                {
                    self.state.insert(value, Range::unknown());
                }
            }
            for block_id in reverse_post_order(cfg) {
                for op in cfg.blocks()[block_id].operations() {
                    let Some(var) = op.get_result() else {
                        continue;
                    };
                    if !is_numeric(&var.ty) {
                        continue;
                    }
                    let Some(result) = self.lowered.value(func, var.id) else {
                        continue;
                    };
                    let origin = match op {
                        Operation::Sigma { .. } => sigma_origin(cfg, block_id).ok(),
                        _ => None,
                    };
                    let mut deps = op.operands();
                    if let Some(origin) = &origin {
                        deps.extend([origin.lhs, origin.rhs]);
                    }
                    let idx = self.defs.len();
                    for dep in deps {
                        if let Some(dep) = self.lowered.value(func, dep) {
                            self.users.entry(dep).or_default().push(idx);
                        }
                    }
                    self.state.insert(result, Range::bottom_());
                    self.defs.push(Definition {
                        func,
                        result,
                        op,
                        origin,
                    });
                }
            }
        }
    }

    fn get(&self, func: usize, id: Identifier) -> Range {
        self.lowered
            .value(func, id)
            .and_then(|value| self.state.get(&value).copied())
            .unwrap_or_else(Range::unknown)
    }

    fn solve(&mut self, widening_delay: usize) {
        let mut queue: VecDeque<usize> = (0..self.defs.len()).collect();
        let mut queued = vec![true; self.defs.len()];
        let mut updates = vec![0usize; self.defs.len()];
        while let Some(idx) = queue.pop_front() {
            queued[idx] = false;
            let def = &self.defs[idx];
            let new = self.eval(def);
            let old = self.state[&def.result];
            let joined = old.join_(&new);
            if joined == old {
                continue;
            }
            updates[idx] += 1;
            // Every cycle of SSA definitions passes through a phi, so
            // widening there is enough to terminate.
            let next = if matches!(def.op, Operation::Phi { .. }) && updates[idx] > widening_delay
            {
                joined.widen_(&old, updates[idx])
            } else {
                joined
            };
            trace!("value {:?}: {old} -> {next}", def.result);
            let result = def.result;
            self.state.insert(result, next);
            for &user in self.users.get(&result).into_iter().flatten() {
                if !queued[user] {
                    queued[user] = true;
                    queue.push_back(user);
                }
            }
        }
    }

    fn eval(&self, def: &Definition) -> Range {
        let get = |id: &Identifier| self.get(def.func, *id);
        match def.op {
            Operation::Const { value, .. } => Range::from(*value),
            Operation::BinaryOp {
                token, lhs, rhs, ..
            } => {
                let (l, r) = (get(lhs), get(rhs));
                match token.value {
                    TokenValue::Add => l + r,
                    TokenValue::Sub => l - r,
                    TokenValue::Mul => l * r,
                    op => compare(op, &l, &r),
                }
            }
            Operation::Cast { operand, .. } => get(operand),
            Operation::Phi { incoming, .. } => incoming
                .iter()
                .fold(Range::bottom_(), |acc, id| acc.join_(&get(id))),
            Operation::Sigma { operand, .. } => {
                let value = get(operand);
                match &def.origin {
                    Some(origin) => value.meet_(&bound(origin, *operand, get)),
                    None => value,
                }
            }
            _ => Range::unknown(),
        }
    }
}

fn bool_range(always: bool, never: bool) -> Range {
    if always {
        Range::from(1)
    } else if never {
        Range::zero()
    } else {
        Range::new(0, 1)
    }
}

fn compare(op: TokenValue, l: &Range, r: &Range) -> Range {
    if l.is_bottom() || r.is_bottom() {
        return Range::bottom_();
    }
    let same = l.is_singleton() && l == r;
    match op {
        TokenValue::LessThan => bool_range(l.upper < r.lower, l.lower >= r.upper),
        TokenValue::LessThanOrEq => bool_range(l.upper <= r.lower, l.lower > r.upper),
        TokenValue::GreaterThan => bool_range(l.lower > r.upper, l.upper <= r.lower),
        TokenValue::GreaterThanOrEq => bool_range(l.lower >= r.upper, l.upper < r.lower),
        TokenValue::Equal => bool_range(same, l.is_disjoint(r)),
        TokenValue::NotEqual => bool_range(l.is_disjoint(r), same),
        _ => Range::unknown(),
    }
}

fn negate(op: TokenValue) -> TokenValue {
    match op {
        TokenValue::LessThan => TokenValue::GreaterThanOrEq,
        TokenValue::LessThanOrEq => TokenValue::GreaterThan,
        TokenValue::GreaterThan => TokenValue::LessThanOrEq,
        TokenValue::GreaterThanOrEq => TokenValue::LessThan,
        TokenValue::Equal => TokenValue::NotEqual,
        TokenValue::NotEqual => TokenValue::Equal,
        op => op,
    }
}

fn flip(op: TokenValue) -> TokenValue {
    match op {
        TokenValue::LessThan => TokenValue::GreaterThan,
        TokenValue::LessThanOrEq => TokenValue::GreaterThanOrEq,
        TokenValue::GreaterThan => TokenValue::LessThan,
        TokenValue::GreaterThanOrEq => TokenValue::LessThanOrEq,
        op => op,
    }
}

/// What the guarding comparison tells about `operand` on the sigma's edge.
fn bound(origin: &SigmaOrigin, operand: Identifier, get: impl Fn(&Identifier) -> Range) -> Range {
    let mut op = origin.op;
    if !origin.taken {
        op = negate(op);
    }
    let other = if operand == origin.lhs {
        origin.rhs
    } else if operand == origin.rhs {
        op = flip(op);
        origin.lhs
    } else {
        return Range::unknown();
    };
    let o = get(&other);
    if o.is_bottom() {
        return o;
    }
    match op {
        TokenValue::LessThan => Range::new(NEG_INF, o.upper) + Range::from(-1),
        TokenValue::LessThanOrEq => Range::new(NEG_INF, o.upper),
        TokenValue::GreaterThan => Range::new(o.lower, INF) + Range::from(1),
        TokenValue::GreaterThanOrEq => Range::new(o.lower, INF),
        TokenValue::Equal => o,
        _ => Range::unknown(),
    }
}
