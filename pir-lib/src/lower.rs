use std::collections::HashMap;

use log::{debug, warn};
use sraa::{
    cfg::{CfgBlock, ControlFlowGraph},
    program::{
        CallTarget, FunctionId, Instruction, MalformedSplit, Module, Predicate, SplitOrigin,
        TypeId, TypeKind, TypeTable, ValueId,
    },
};

use crate::{
    ir::{Cfg, Operation, Type, Unit},
    lexer::{Identifier, TokenValue},
    parser::is_comparison,
};

/// The comparison a sigma specializes its operand by, in PIR names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigmaOrigin {
    pub comparison: Identifier,
    pub op: TokenValue,
    pub lhs: Identifier,
    pub rhs: Identifier,
    /// The sigma's block is the target of the true edge.
    pub taken: bool,
}

/// Find the branch that guards `block`. The block must have a single
/// predecessor ending in a conditional branch on a comparison.
pub fn sigma_origin(cfg: &Cfg, block: usize) -> Result<SigmaOrigin, MalformedSplit> {
    let preds = cfg.blocks()[block].predecessors();
    if preds.len() != 1 {
        return Err(MalformedSplit::UnexpectedPredecessors(preds.len()));
    }
    let Some(Operation::Branch { cond, then, .. }) = cfg.blocks()[preds[0]].operations().last()
    else {
        return Err(MalformedSplit::UnconditionalBranch);
    };
    match cfg.definition(*cond) {
        Some(Operation::BinaryOp {
            token, lhs, rhs, ..
        }) if is_comparison(token.value) => Ok(SigmaOrigin {
            comparison: *cond,
            op: token.value,
            lhs: *lhs,
            rhs: *rhs,
            taken: cfg.block_of(*then) == Some(block),
        }),
        _ => Err(MalformedSplit::NotAComparison),
    }
}

pub fn predicate(op: TokenValue) -> Option<Predicate> {
    match op {
        TokenValue::Equal => Some(Predicate::Eq),
        TokenValue::NotEqual => Some(Predicate::Ne),
        TokenValue::LessThan => Some(Predicate::Lt),
        TokenValue::LessThanOrEq => Some(Predicate::Le),
        TokenValue::GreaterThan => Some(Predicate::Gt),
        TokenValue::GreaterThanOrEq => Some(Predicate::Ge),
        _ => None,
    }
}

fn lower_type(types: &mut TypeTable, ty: &Type) -> TypeId {
    let kind = match ty {
        Type::Bool => TypeKind::Scalar { bits: 1 },
        Type::Int(bits) => TypeKind::Scalar { bits: *bits },
        Type::Ptr(pointee) => TypeKind::Pointer(lower_type(types, pointee)),
        Type::Array(element, len) => TypeKind::Array {
            element: lower_type(types, element),
            len: *len,
        },
        Type::Vector(element, len) => TypeKind::Vector {
            element: lower_type(types, element),
            len: *len,
        },
        Type::Struct(fields) => {
            TypeKind::Struct(fields.iter().map(|f| lower_type(types, f)).collect())
        }
        Type::Void => TypeKind::Opaque,
    };
    types.intern(kind)
}

/// A unit lowered into the representation the alias analysis consumes,
/// together with the mapping from PIR names to values.
#[derive(Debug)]
pub struct Lowered {
    pub module: Module,
    locals: HashMap<(usize, Identifier), ValueId>,
    globals: HashMap<Identifier, ValueId>,
}

impl Lowered {
    /// The value a name denotes inside the `func`-th function.
    pub fn value(&self, func: usize, id: Identifier) -> Option<ValueId> {
        self.locals
            .get(&(func, id))
            .or_else(|| self.globals.get(&id))
            .copied()
    }

    /// Resolve a qualified name: `@g` for globals, `@f.x` for locals.
    pub fn find(&self, name: &str) -> Option<ValueId> {
        self.module.find_value(name)
    }
}

pub fn lower(unit: &Unit) -> Lowered {
    let mut lowered = Lowered {
        module: Module::default(),
        locals: HashMap::new(),
        globals: HashMap::new(),
    };

    for global in &unit.globals {
        let storage = lower_type(&mut lowered.module.types, &global.ty);
        let value = lowered
            .module
            .add_global(unit.name(global.id()), storage);
        lowered.globals.insert(global.id(), value);
    }

    // Values first, calls and phis may refer to anything in the unit.
    let mut functions = HashMap::new();
    for (idx, cfg) in unit.functions.iter().enumerate() {
        let fname = unit.name(cfg.get_function());
        let mut params = Vec::new();
        for var in cfg.variables() {
            let ty = lower_type(&mut lowered.module.types, &var.ty);
            let value = lowered
                .module
                .add_value(format!("{fname}.{}", unit.name(var.id)), ty);
            lowered.locals.insert((idx, var.id), value);
            if params.len() < cfg.get_formals().len() {
                params.push(value);
            }
        }
        let func = lowered.module.add_function(fname, params, true);
        functions.insert(cfg.get_function(), func);
    }

    for (idx, cfg) in unit.functions.iter().enumerate() {
        debug!("lowering {}", unit.name(cfg.get_function()));
        let func = functions[&cfg.get_function()];
        let lowering = FunctionLowering {
            unit,
            cfg,
            idx,
            lowered: &lowered,
            functions: &functions,
        };
        let mut instructions = Vec::new();
        for (block_id, block) in cfg.blocks().iter().enumerate() {
            for op in block.operations() {
                match lowering.operation(block_id, op) {
                    Some(inst) => instructions.push((inst, constant(op))),
                    None => warn!(
                        "skipping operation with unresolved names: {}",
                        crate::ir::print_operation(op, unit)
                    ),
                }
            }
        }
        for (inst, constant) in instructions {
            if let (Some(value), Some(result)) = (constant, inst.result()) {
                lowered.module.set_constant(result, value);
            }
            lowered.module.push(func, inst);
        }
    }
    lowered
}

fn constant(op: &Operation) -> Option<i64> {
    match op {
        Operation::Const { value, .. } => Some(*value),
        _ => None,
    }
}

struct FunctionLowering<'a> {
    unit: &'a Unit,
    cfg: &'a Cfg,
    idx: usize,
    lowered: &'a Lowered,
    functions: &'a HashMap<Identifier, FunctionId>,
}

impl FunctionLowering<'_> {
    fn value(&self, id: Identifier) -> Option<ValueId> {
        self.lowered.value(self.idx, id)
    }

    fn values(&self, ids: &[Identifier]) -> Option<Vec<ValueId>> {
        ids.iter().map(|id| self.value(*id)).collect()
    }

    fn split_origin(&self, block: usize) -> Result<SplitOrigin, MalformedSplit> {
        let origin = sigma_origin(self.cfg, block)?;
        let resolve = |id| self.value(id).ok_or(MalformedSplit::NotAComparison);
        Ok(SplitOrigin {
            comparison: resolve(origin.comparison)?,
            predicate: predicate(origin.op).ok_or(MalformedSplit::NotAComparison)?,
            lhs: resolve(origin.lhs)?,
            rhs: resolve(origin.rhs)?,
            taken: origin.taken,
        })
    }

    fn operation(&self, block: usize, op: &Operation) -> Option<Instruction> {
        let result = match op.get_result() {
            Some(var) => Some(self.value(var.id)?),
            None => None,
        };
        let operands = self.values(&op.operands())?;
        let inst = match op {
            Operation::BinaryOp { token, .. } => match token.value {
                TokenValue::Add => Instruction::Add {
                    result: result?,
                    lhs: operands[0],
                    rhs: operands[1],
                },
                TokenValue::Sub => Instruction::Sub {
                    result: result?,
                    lhs: operands[0],
                    rhs: operands[1],
                },
                _ => Instruction::Other { result, operands },
            },
            Operation::Gep { .. } => Instruction::Index {
                result: result?,
                base: operands[0],
                indices: operands[1..].to_vec(),
            },
            Operation::Cast { .. } => Instruction::Cast {
                result: result?,
                source: operands[0],
            },
            Operation::Sigma { .. } => Instruction::CaseSplit {
                result: result?,
                operand: operands[0],
                origin: self.split_origin(block),
            },
            Operation::Phi { .. } => Instruction::Merge {
                result: result?,
                incoming: operands,
            },
            Operation::Alloc { .. } => Instruction::Call {
                result,
                target: CallTarget::Alloc,
                args: operands,
            },
            Operation::Realloc { .. } => Instruction::Call {
                result,
                target: CallTarget::Realloc,
                args: operands,
            },
            Operation::Call { callee, .. } => {
                let target = match self.functions.get(callee) {
                    Some(func) => CallTarget::Function(*func),
                    None => {
                        debug_assert!(self.unit.extern_function(*callee).is_some());
                        CallTarget::Unknown
                    }
                };
                Instruction::Call {
                    result,
                    target,
                    args: operands,
                }
            }
            Operation::Ret(_, _) => Instruction::Return(operands.first().copied()),
            Operation::Const { .. }
            | Operation::Load { .. }
            | Operation::Store { .. }
            | Operation::Branch { .. }
            | Operation::Jump(..)
            | Operation::Nop(_) => Instruction::Other { result, operands },
        };
        Some(inst)
    }
}
