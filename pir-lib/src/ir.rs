use core::fmt::Display;
use std::collections::HashMap;

use crate::lexer::{Identifier, IdentifierTable, Token, TokenValue};
use itertools::Itertools;
use sraa::cfg::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int(u32),
    Ptr(Box<Type>),
    Array(Box<Type>, u64),
    Vector(Box<Type>, u64),
    Struct(Vec<Type>),
    Void,
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr(pointee) => write!(f, "ptr<{pointee}>"),
            Type::Array(element, len) => write!(f, "[{element}; {len}]"),
            Type::Vector(element, len) => write!(f, "<{element}; {len}>"),
            Type::Struct(fields) => write!(f, "{{{}}}", fields.iter().join(", ")),
            Type::Void => write!(f, "void"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub id: Identifier,
    pub ty: Type,
}

/// Operands are plain names, they are resolved against the function and the
/// globals once the whole unit is parsed.
#[derive(Clone, Debug)]
pub enum Operation {
    Const {
        token: Token,
        result: Variable,
        value: i64,
    },
    /// Arithmetic and comparisons, the token tells which.
    BinaryOp {
        token: Token,
        result: Variable,
        lhs: Identifier,
        rhs: Identifier,
    },
    Gep {
        token: Token,
        result: Variable,
        base: Identifier,
        indices: Vec<Identifier>,
    },
    Cast {
        token: Token,
        result: Variable,
        operand: Identifier,
    },
    Sigma {
        token: Token,
        result: Variable,
        operand: Identifier,
    },
    Phi {
        token: Token,
        result: Variable,
        incoming: Vec<Identifier>,
    },
    Alloc {
        token: Token,
        result: Variable,
        size: Identifier,
    },
    Realloc {
        token: Token,
        result: Variable,
        pointer: Identifier,
        size: Identifier,
    },
    Load {
        token: Token,
        result: Variable,
        pointer: Identifier,
    },
    Store {
        token: Token,
        pointer: Identifier,
        value: Identifier,
    },
    Call {
        token: Token,
        callee: Identifier,
        result: Option<Variable>,
        args: Vec<Identifier>,
    },
    Branch {
        token: Token,
        cond: Identifier,
        then: Identifier,
        els: Identifier,
    },
    Jump(Token, Identifier),
    Ret(Token, Option<Identifier>),
    Nop(Token),
}

impl Operation {
    pub fn get_result(&self) -> Option<&Variable> {
        match self {
            Operation::Const { result, .. }
            | Operation::BinaryOp { result, .. }
            | Operation::Gep { result, .. }
            | Operation::Cast { result, .. }
            | Operation::Sigma { result, .. }
            | Operation::Phi { result, .. }
            | Operation::Alloc { result, .. }
            | Operation::Realloc { result, .. }
            | Operation::Load { result, .. } => Some(result),
            Operation::Call { result, .. } => result.as_ref(),
            Operation::Store { .. }
            | Operation::Branch { .. }
            | Operation::Jump(..)
            | Operation::Ret(..)
            | Operation::Nop(_) => None,
        }
    }

    pub fn get_token(&self) -> Token {
        match self {
            Operation::Const { token, .. }
            | Operation::BinaryOp { token, .. }
            | Operation::Gep { token, .. }
            | Operation::Cast { token, .. }
            | Operation::Sigma { token, .. }
            | Operation::Phi { token, .. }
            | Operation::Alloc { token, .. }
            | Operation::Realloc { token, .. }
            | Operation::Load { token, .. }
            | Operation::Store { token, .. }
            | Operation::Call { token, .. }
            | Operation::Branch { token, .. }
            | Operation::Jump(token, _)
            | Operation::Ret(token, _)
            | Operation::Nop(token) => *token,
        }
    }

    /// Names read by the operation, labels and callees excluded.
    pub fn operands(&self) -> Vec<Identifier> {
        match self {
            Operation::Const { .. } | Operation::Jump(..) | Operation::Nop(_) => Vec::new(),
            Operation::BinaryOp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Operation::Gep { base, indices, .. } => {
                std::iter::once(*base).chain(indices.iter().copied()).collect()
            }
            Operation::Cast { operand, .. } | Operation::Sigma { operand, .. } => vec![*operand],
            Operation::Phi { incoming, .. } => incoming.clone(),
            Operation::Alloc { size, .. } => vec![*size],
            Operation::Realloc { pointer, size, .. } => vec![*pointer, *size],
            Operation::Load { pointer, .. } => vec![*pointer],
            Operation::Store { pointer, value, .. } => vec![*pointer, *value],
            Operation::Call { args, .. } => args.clone(),
            Operation::Branch { cond, .. } => vec![*cond],
            Operation::Ret(_, value) => value.iter().copied().collect(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Operation::Branch { .. } | Operation::Jump(..) | Operation::Ret(..)
        )
    }
}

/// The last operation is a terminator:
/// * Branch
/// * Jump
/// * Ret
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    label: Option<Identifier>,
    operations: Vec<Operation>,
    succs: Vec<usize>,
    preds: Vec<usize>,
}

impl BasicBlock {
    pub fn label(&self) -> Option<Identifier> {
        self.label
    }
}

impl CfgBlock for BasicBlock {
    type Operation = Operation;

    fn operations(&self) -> &[Self::Operation] {
        &self.operations
    }

    fn predecessors(&self) -> &[usize] {
        &self.preds
    }

    fn successors(&self) -> &[usize] {
        &self.succs
    }
}

#[derive(Clone, Debug)]
pub struct Cfg {
    basic_blocks: Vec<BasicBlock>,
    function: Token,
    ret_ty: Type,
    formals: Vec<Variable>,
    labels: HashMap<Identifier, usize>,
}

impl ControlFlowGraph for Cfg {
    type Block = BasicBlock;

    fn blocks(&self) -> &[Self::Block] {
        &self.basic_blocks
    }
}

impl Cfg {
    pub fn new(function: Token, ret_ty: Type, formals: Vec<Variable>) -> Self {
        Self {
            basic_blocks: Vec::default(),
            function,
            ret_ty,
            formals,
            labels: HashMap::new(),
        }
    }

    pub fn new_block(&mut self) -> usize {
        self.basic_blocks.push(BasicBlock::default());
        self.basic_blocks.len() - 1
    }

    pub fn push(&mut self, block: usize, op: Operation) {
        self.basic_blocks[block].operations.push(op);
    }

    /// Name `block`. Returns false if the label is already taken.
    pub fn set_label(&mut self, block: usize, label: Identifier) -> bool {
        if self.labels.contains_key(&label) {
            return false;
        }
        self.labels.insert(label, block);
        self.basic_blocks[block].label = Some(label);
        true
    }

    pub fn block_of(&self, label: Identifier) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.basic_blocks[from].succs.push(to);
        self.basic_blocks[to].preds.push(from);
        self
    }

    /// The name of the function as a global identifier.
    pub fn get_function(&self) -> Identifier {
        match self.function.value {
            TokenValue::Global(id) => id,
            _ => unreachable!("functions are named by global identifiers"),
        }
    }

    pub fn get_token(&self) -> Token {
        self.function
    }

    pub fn get_return_type(&self) -> &Type {
        &self.ret_ty
    }

    pub fn get_formals(&self) -> &[Variable] {
        &self.formals
    }

    /// Parameters and every defined local.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.formals.iter().chain(
            self.basic_blocks
                .iter()
                .flat_map(|b| b.operations.iter().filter_map(|op| op.get_result())),
        )
    }

    /// The operation defining `id`, if it is a local of this function.
    pub fn definition(&self, id: Identifier) -> Option<&Operation> {
        self.basic_blocks
            .iter()
            .flat_map(|b| b.operations.iter())
            .find(|op| op.get_result().is_some_and(|r| r.id == id))
    }
}

/// `global @g: T;` names a pointer to storage of type `T`.
#[derive(Clone, Debug)]
pub struct GlobalVar {
    pub token: Token,
    pub ty: Type,
}

/// A function without a body.
#[derive(Clone, Debug)]
pub struct ExternFunction {
    pub token: Token,
    pub formals: Vec<Variable>,
    pub ret_ty: Type,
}

#[derive(Clone, Debug, Default)]
pub struct Unit {
    pub globals: Vec<GlobalVar>,
    pub externs: Vec<ExternFunction>,
    pub functions: Vec<Cfg>,
    pub identifiers: IdentifierTable,
}

fn global_id(token: Token) -> Identifier {
    match token.value {
        TokenValue::Global(id) => id,
        _ => unreachable!("declarations are named by global identifiers"),
    }
}

impl GlobalVar {
    pub fn id(&self) -> Identifier {
        global_id(self.token)
    }
}

impl ExternFunction {
    pub fn id(&self) -> Identifier {
        global_id(self.token)
    }
}

impl Unit {
    pub fn name(&self, id: Identifier) -> &str {
        self.identifiers.get_name(id)
    }

    pub fn function(&self, id: Identifier) -> Option<&Cfg> {
        self.functions.iter().find(|cfg| cfg.get_function() == id)
    }

    pub fn extern_function(&self, id: Identifier) -> Option<&ExternFunction> {
        self.externs.iter().find(|ext| ext.id() == id)
    }

    pub fn global(&self, id: Identifier) -> Option<&GlobalVar> {
        self.globals.iter().find(|g| g.id() == id)
    }
}

pub fn print_operation(op: &Operation, unit: &Unit) -> String {
    let name = |id: &Identifier| unit.name(*id);
    let names = |ids: &[Identifier]| ids.iter().map(name).join(" ");
    let def = |result: &Variable| format!("{}: {} =", name(&result.id), result.ty);
    match op {
        Operation::Const { result, value, .. } => format!("{} const {value};", def(result)),
        Operation::BinaryOp {
            token,
            result,
            lhs,
            rhs,
        } => format!("{} {} {} {};", def(result), token.value, name(lhs), name(rhs)),
        Operation::Gep {
            result,
            base,
            indices,
            ..
        } => format!("{} gep {} {};", def(result), name(base), names(indices)),
        Operation::Cast {
            result, operand, ..
        } => format!("{} cast {};", def(result), name(operand)),
        Operation::Sigma {
            result, operand, ..
        } => format!("{} sigma {};", def(result), name(operand)),
        Operation::Phi {
            result, incoming, ..
        } => format!("{} phi {};", def(result), names(incoming)),
        Operation::Alloc { result, size, .. } => {
            format!("{} alloc {};", def(result), name(size))
        }
        Operation::Realloc {
            result,
            pointer,
            size,
            ..
        } => format!("{} realloc {} {};", def(result), name(pointer), name(size)),
        Operation::Load {
            result, pointer, ..
        } => format!("{} load {};", def(result), name(pointer)),
        Operation::Store { pointer, value, .. } => {
            format!("store {} {};", name(pointer), name(value))
        }
        Operation::Call {
            callee,
            result,
            args,
            ..
        } => {
            let call = if args.is_empty() {
                format!("call {};", name(callee))
            } else {
                format!("call {} {};", name(callee), names(args))
            };
            match result {
                Some(result) => format!("{} {call}", def(result)),
                None => call,
            }
        }
        Operation::Branch {
            cond, then, els, ..
        } => format!("br {} {} {};", name(cond), name(then), name(els)),
        Operation::Jump(_, target) => format!("jmp {};", name(target)),
        Operation::Ret(_, Some(value)) => format!("ret {};", name(value)),
        Operation::Ret(_, None) => "ret;".to_owned(),
        Operation::Nop(_) => "nop;".to_owned(),
    }
}

fn print_formals(formals: &[Variable], unit: &Unit) -> String {
    formals
        .iter()
        .map(|v| format!("{}: {}", unit.name(v.id), v.ty))
        .join(", ")
}

fn print_signature(name: &str, formals: &[Variable], ret_ty: &Type, unit: &Unit) -> String {
    let mut result = name.to_owned();
    if !formals.is_empty() || *ret_ty != Type::Void {
        result.push_str(&format!("({})", print_formals(formals, unit)));
    }
    if *ret_ty != Type::Void {
        result.push_str(&format!(": {ret_ty}"));
    }
    result
}

/// Print the function, `annotate` may attach a comment to each operation.
pub fn print_function(
    cfg: &Cfg,
    unit: &Unit,
    annotate: &dyn Fn(&Cfg, &Operation) -> Option<String>,
) -> String {
    let name = unit.name(cfg.get_function());
    let mut result = format!(
        "{} {{\n",
        print_signature(name, cfg.get_formals(), cfg.get_return_type(), unit)
    );
    for (id, block) in cfg.blocks().iter().enumerate() {
        if let Some(label) = block.label() {
            if id != 0 {
                result.push('\n');
            }
            result.push_str(&format!("{}:\n", unit.name(label)));
        }
        for op in block.operations() {
            result.push_str("  ");
            result.push_str(&print_operation(op, unit));
            if let Some(ann) = annotate(cfg, op) {
                result.push_str(&format!(" /* {ann} */"));
            }
            result.push('\n');
        }
    }
    result.push_str("}\n");
    result
}

pub fn print_annotated(
    unit: &Unit,
    annotate: &dyn Fn(&Cfg, &Operation) -> Option<String>,
) -> String {
    let mut decls = Vec::new();
    for global in &unit.globals {
        decls.push(format!("global {}: {};\n", unit.name(global.id()), global.ty));
    }
    for ext in &unit.externs {
        let signature = print_signature(unit.name(ext.id()), &ext.formals, &ext.ret_ty, unit);
        decls.push(format!("extern {signature};\n"));
    }
    let mut sections = Vec::new();
    if !decls.is_empty() {
        sections.push(decls.concat());
    }
    for cfg in &unit.functions {
        sections.push(print_function(cfg, unit, annotate));
    }
    sections.join("\n")
}

/// Print the unit back in its textual form.
pub fn print(unit: &Unit) -> String {
    print_annotated(unit, &|_, _| None)
}

pub fn print_dot(unit: &Unit) -> String {
    let mut result = String::new();
    for cfg in &unit.functions {
        let name = unit.name(cfg.get_function());
        result.push_str(&sraa::cfg::print(name, cfg, |op| print_operation(op, unit)));
        result.push('\n');
    }
    result.pop();
    result
}
