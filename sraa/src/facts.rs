use std::collections::HashMap;

use log::{debug, warn};

use crate::constraints::{Constraint, RelationStore, VarId};
use crate::domains::Range;
use crate::layout::Primitives;
use crate::program::{Instruction, Module, Predicate, RangeOracle, SplitOrigin, TypeId, ValueId};
use crate::solvers::WorkList;

/// An address computation `result = base[indices...]` together with the
/// offset range it adds to `base`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IndexAccess {
    pub result: ValueId,
    pub base: ValueId,
    pub indices: Vec<ValueId>,
    pub offset: Range,
    pub pointee: Option<TypeId>,
}

/// What is known about the sign of a quantity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sign {
    Zero,
    Positive,
    NonNegative,
    Negative,
    NonPositive,
    Unknown,
}

impl From<Range> for Sign {
    fn from(range: Range) -> Self {
        if range.is_bottom() {
            Sign::Unknown
        } else if range.is_zero() {
            Sign::Zero
        } else if range.lower > 0 {
            Sign::Positive
        } else if range.lower >= 0 {
            Sign::NonNegative
        } else if range.upper < 0 {
            Sign::Negative
        } else if range.upper <= 0 {
            Sign::NonPositive
        } else {
            Sign::Unknown
        }
    }
}

impl Sign {
    fn negate(self) -> Sign {
        match self {
            Sign::Positive => Sign::Negative,
            Sign::NonNegative => Sign::NonPositive,
            Sign::Negative => Sign::Positive,
            Sign::NonPositive => Sign::NonNegative,
            other => other,
        }
    }
}

/// Position of one value relative to another.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Order {
    Same,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl Order {
    /// Where `v + d` lies relative to `v`, given the sign of `d`.
    fn of_offset(sign: Sign) -> Option<Order> {
        match sign {
            Sign::Zero => Some(Order::Same),
            Sign::Positive => Some(Order::Greater),
            Sign::NonNegative => Some(Order::GreaterEq),
            Sign::Negative => Some(Order::Less),
            Sign::NonPositive => Some(Order::LessEq),
            Sign::Unknown => None,
        }
    }

    /// Where `x - y` lies relative to `y`, given the signs of both operands.
    fn of_difference(x: Sign, y: Sign) -> Option<Order> {
        use Sign::*;
        match (x, y) {
            (Zero, y) => Order::of_offset(y.negate()),
            (Positive, Zero | Negative | NonPositive) => Some(Order::Greater),
            (NonNegative, Zero | NonPositive) => Some(Order::GreaterEq),
            (NonNegative, Negative) => Some(Order::Greater),
            (Negative, Zero | Positive | NonNegative) => Some(Order::Less),
            (NonPositive, Zero | NonNegative) => Some(Order::LessEq),
            (NonPositive, Positive) => Some(Order::Less),
            _ => None,
        }
    }
}

/// Case splits of one comparison, indexed by operand side and branch.
#[derive(Clone, Debug)]
struct SplitSlots {
    origin: SplitOrigin,
    left_true: Option<ValueId>,
    left_false: Option<ValueId>,
    right_true: Option<ValueId>,
    right_false: Option<ValueId>,
}

impl SplitSlots {
    fn new(origin: SplitOrigin) -> Self {
        Self {
            origin,
            left_true: None,
            left_false: None,
            right_true: None,
            right_false: None,
        }
    }

    fn file(&mut self, split: ValueId, operand: ValueId, taken: bool) -> bool {
        let slot = match (operand == self.origin.lhs, operand == self.origin.rhs, taken) {
            (true, _, true) => &mut self.left_true,
            (true, _, false) => &mut self.left_false,
            (false, true, true) => &mut self.right_true,
            (false, true, false) => &mut self.right_false,
            (false, false, _) => return false,
        };
        *slot = Some(split);
        true
    }

    /// A branch that only specializes one side still tells something about
    /// the other side: its plain operand.
    fn complete(&mut self) {
        let before = self.clone();
        let (lhs, rhs) = (self.origin.lhs, self.origin.rhs);
        if before.left_true.is_none() && before.right_true.is_some() {
            self.left_true = Some(lhs);
        }
        if before.left_false.is_none() && before.right_false.is_some() {
            self.left_false = Some(lhs);
        }
        if before.right_true.is_none() && before.left_true.is_some() {
            self.right_true = Some(rhs);
        }
        if before.right_false.is_none() && before.left_false.is_some() {
            self.right_false = Some(rhs);
        }
    }
}

/// Walks a module and turns the arithmetic and structural facts it finds
/// into constraints over the variables of `store`.
pub struct FactCollector<'a> {
    module: &'a Module,
    oracle: &'a dyn RangeOracle,
    store: &'a mut RelationStore,
    worklist: &'a mut WorkList,
    primitives: &'a mut Primitives,
    accesses: HashMap<ValueId, IndexAccess>,
    splits: HashMap<ValueId, SplitSlots>,
    split_order: Vec<ValueId>,
}

impl<'a> FactCollector<'a> {
    pub fn new(
        module: &'a Module,
        oracle: &'a dyn RangeOracle,
        store: &'a mut RelationStore,
        worklist: &'a mut WorkList,
        primitives: &'a mut Primitives,
    ) -> Self {
        Self {
            module,
            oracle,
            store,
            worklist,
            primitives,
            accesses: HashMap::new(),
            splits: HashMap::new(),
            split_order: Vec::new(),
        }
    }

    /// Collect the constraints of every function with a body. Returns the
    /// index accesses found along the way, keyed by their result.
    pub fn collect(mut self) -> HashMap<ValueId, IndexAccess> {
        let module = self.module;
        for func in module.functions().iter().filter(|f| f.has_body) {
            debug!("collecting constraints of {}", func.name);
            for inst in &func.instructions {
                self.instruction(inst);
            }
        }
        self.finish_splits();
        self.accesses
    }

    fn add(&mut self, constraint: Constraint) {
        self.worklist.add(constraint, self.store);
    }

    fn var(&mut self, value: ValueId) -> VarId {
        self.store.variable(value)
    }

    fn sign(&self, value: ValueId) -> Sign {
        match self.module.constant(value) {
            Some(c) => Sign::from(Range::from(c)),
            None => Sign::from(self.oracle.range(value)),
        }
    }

    /// Emit the constraint placing `a` at `order` relative to `b`.
    fn relate(&mut self, a: ValueId, b: ValueId, order: Option<Order>) {
        let Some(order) = order else {
            return;
        };
        let (x, y) = (self.var(a), self.var(b));
        let constraint = match order {
            Order::Same => Constraint::RenameEqual(x, y),
            Order::Less => Constraint::LessThan(x, y),
            Order::LessEq => Constraint::LessOrEqual(x, y),
            Order::Greater => Constraint::LessThan(y, x),
            Order::GreaterEq => Constraint::LessOrEqual(y, x),
        };
        self.add(constraint);
    }

    fn instruction(&mut self, inst: &Instruction) {
        if let Some(result) = inst.result() {
            self.var(result);
        }
        match inst {
            Instruction::Add { result, lhs, rhs } => {
                self.relate(*result, *lhs, Order::of_offset(self.sign(*rhs)));
                self.relate(*result, *rhs, Order::of_offset(self.sign(*lhs)));
            }
            Instruction::Sub { result, lhs, rhs } => {
                let (x, y) = (self.sign(*lhs), self.sign(*rhs));
                self.relate(*result, *lhs, Order::of_offset(y.negate()));
                self.relate(*result, *rhs, Order::of_difference(x, y));
            }
            Instruction::Index {
                result,
                base,
                indices,
            } => {
                let offset =
                    self.primitives
                        .index_offset(self.module, self.oracle, *base, indices);
                self.relate(*result, *base, Order::of_offset(Sign::from(offset)));
                self.accesses.insert(
                    *result,
                    IndexAccess {
                        result: *result,
                        base: *base,
                        indices: indices.clone(),
                        offset,
                        pointee: self.module.pointee(*base),
                    },
                );
            }
            Instruction::Cast { result, source } => {
                self.relate(*result, *source, Some(Order::Same));
            }
            Instruction::CaseSplit {
                result,
                operand,
                origin,
            } => match origin {
                Ok(origin) => {
                    let (x, y) = (self.var(*result), self.var(*operand));
                    self.add(Constraint::ValueEqual(x, y));
                    self.file_split(*result, *operand, *origin);
                }
                Err(err) => {
                    warn!(
                        "skipping case split {}: {err}",
                        self.module.value_name(*result)
                    );
                }
            },
            Instruction::Merge { result, incoming } => {
                let x = self.var(*result);
                let operands = incoming.iter().map(|v| self.var(*v)).collect();
                self.add(Constraint::Merge(x, operands));
            }
            Instruction::Call { .. } | Instruction::Return(_) | Instruction::Other { .. } => {}
        }
    }

    fn file_split(&mut self, split: ValueId, operand: ValueId, origin: SplitOrigin) {
        let slots = self.splits.entry(origin.comparison).or_insert_with(|| {
            self.split_order.push(origin.comparison);
            SplitSlots::new(origin)
        });
        if !slots.file(split, operand, origin.taken) {
            warn!(
                "case split {} is not an operand of its comparison",
                self.module.value_name(split)
            );
        }
    }

    fn finish_splits(&mut self) {
        for comparison in std::mem::take(&mut self.split_order) {
            let Some(mut slots) = self.splits.remove(&comparison) else {
                continue;
            };
            slots.complete();
            let (lt, lf, rt, rf) = (
                slots.left_true,
                slots.left_false,
                slots.right_true,
                slots.right_false,
            );
            match slots.origin.predicate {
                Predicate::Gt => {
                    self.order_pair(rt, lt, Order::Less);
                    self.order_pair(lf, rf, Order::LessEq);
                }
                Predicate::Ge => {
                    self.order_pair(rt, lt, Order::LessEq);
                    self.order_pair(lf, rf, Order::Less);
                }
                Predicate::Lt => {
                    self.order_pair(lt, rt, Order::Less);
                    self.order_pair(rf, lf, Order::LessEq);
                }
                Predicate::Le => {
                    self.order_pair(lt, rt, Order::LessEq);
                    self.order_pair(rf, lf, Order::Less);
                }
                Predicate::Eq => self.order_pair(lt, rt, Order::Same),
                Predicate::Ne => self.order_pair(lf, rf, Order::Same),
            }
        }
    }

    fn order_pair(&mut self, a: Option<ValueId>, b: Option<ValueId>, order: Order) {
        if let (Some(a), Some(b)) = (a, b) {
            self.relate(a, b, Some(order));
        }
    }
}
