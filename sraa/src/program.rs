use std::collections::HashMap;
use std::fmt::Display;

use thiserror::Error;

use crate::domains::Range;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypeId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FunctionId(pub usize);

/// Structural shape of a type. Only the shape matters for the analysis,
/// scalars are distinguished by their width alone.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Scalar { bits: u32 },
    Pointer(TypeId),
    Array { element: TypeId, len: u64 },
    Vector { element: TypeId, len: u64 },
    Struct(Vec<TypeId>),
    Opaque,
}

/// Interns type shapes so structurally equal types share one [`TypeId`].
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
}

impl TypeTable {
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len());
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.kinds[ty.0]
    }

    pub fn scalar(&mut self, bits: u32) -> TypeId {
        self.intern(TypeKind::Scalar { bits })
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(pointee))
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Pointer(_))
    }

    pub fn pointee(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Pointer(pointee) => Some(*pointee),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Predicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Lt => "lt",
            Predicate::Le => "le",
            Predicate::Gt => "gt",
            Predicate::Ge => "ge",
        };
        write!(f, "{s}")
    }
}

/// Reasons a case split could not be traced back to a comparison.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum MalformedSplit {
    #[error("case split block has {0} predecessors, expected exactly one")]
    UnexpectedPredecessors(usize),
    #[error("predecessor of the case split ends in an unconditional branch")]
    UnconditionalBranch,
    #[error("branch condition is not defined by a comparison")]
    NotAComparison,
}

/// The comparison a case split specializes its operand by.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SplitOrigin {
    pub comparison: ValueId,
    pub predicate: Predicate,
    pub lhs: ValueId,
    pub rhs: ValueId,
    /// Whether the split lives on the edge where the comparison holds.
    pub taken: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallTarget {
    Function(FunctionId),
    Alloc,
    Realloc,
    Unknown,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    Add {
        result: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    Sub {
        result: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Address computation. The base is a pointer and the first index steps
    /// over whole pointees, later indices descend into the pointee.
    Index {
        result: ValueId,
        base: ValueId,
        indices: Vec<ValueId>,
    },
    Cast {
        result: ValueId,
        source: ValueId,
    },
    CaseSplit {
        result: ValueId,
        operand: ValueId,
        origin: Result<SplitOrigin, MalformedSplit>,
    },
    Merge {
        result: ValueId,
        incoming: Vec<ValueId>,
    },
    Call {
        result: Option<ValueId>,
        target: CallTarget,
        args: Vec<ValueId>,
    },
    Return(Option<ValueId>),
    /// Anything the analysis does not model.
    Other {
        result: Option<ValueId>,
        operands: Vec<ValueId>,
    },
}

impl Instruction {
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Instruction::Add { result, .. }
            | Instruction::Sub { result, .. }
            | Instruction::Index { result, .. }
            | Instruction::Cast { result, .. }
            | Instruction::CaseSplit { result, .. }
            | Instruction::Merge { result, .. } => Some(*result),
            Instruction::Call { result, .. } | Instruction::Other { result, .. } => *result,
            Instruction::Return(_) => None,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Instruction::Add { lhs, rhs, .. } | Instruction::Sub { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            Instruction::Index { base, indices, .. } => {
                std::iter::once(*base).chain(indices.iter().copied()).collect()
            }
            Instruction::Cast { source, .. } => vec![*source],
            Instruction::CaseSplit { operand, .. } => vec![*operand],
            Instruction::Merge { incoming, .. } => incoming.clone(),
            Instruction::Call { args, .. } => args.clone(),
            Instruction::Return(value) => value.iter().copied().collect(),
            Instruction::Other { operands, .. } => operands.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct ValueInfo {
    name: String,
    ty: TypeId,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<ValueId>,
    pub has_body: bool,
    pub instructions: Vec<Instruction>,
}

impl Function {
    /// Values handed back to callers by this function's returns.
    pub fn returned_values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.instructions.iter().filter_map(|inst| match inst {
            Instruction::Return(value) => *value,
            _ => None,
        })
    }
}

/// Whole program in the shape the alias analysis consumes it. Front-ends
/// lower their own representation into this.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub types: TypeTable,
    values: Vec<ValueInfo>,
    constants: HashMap<ValueId, i64>,
    globals: Vec<ValueId>,
    functions: Vec<Function>,
}

impl Module {
    pub fn add_value(&mut self, name: impl Into<String>, ty: TypeId) -> ValueId {
        self.values.push(ValueInfo {
            name: name.into(),
            ty,
        });
        ValueId(self.values.len() - 1)
    }

    /// A global is a pointer to storage of the given type.
    pub fn add_global(&mut self, name: impl Into<String>, storage: TypeId) -> ValueId {
        let ty = self.types.pointer(storage);
        let value = self.add_value(name, ty);
        self.globals.push(value);
        value
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<ValueId>,
        has_body: bool,
    ) -> FunctionId {
        self.functions.push(Function {
            name: name.into(),
            params,
            has_body,
            instructions: Vec::new(),
        });
        FunctionId(self.functions.len() - 1)
    }

    pub fn push(&mut self, func: FunctionId, inst: Instruction) {
        self.functions[func.0].instructions.push(inst);
    }

    pub fn set_constant(&mut self, value: ValueId, constant: i64) {
        self.constants.insert(value, constant);
    }

    pub fn constant(&self, value: ValueId) -> Option<i64> {
        self.constants.get(&value).copied()
    }

    pub fn value_name(&self, value: ValueId) -> &str {
        &self.values[value.0].name
    }

    pub fn value_type(&self, value: ValueId) -> TypeId {
        self.values[value.0].ty
    }

    pub fn is_pointer(&self, value: ValueId) -> bool {
        self.types.is_pointer(self.value_type(value))
    }

    pub fn pointee(&self, value: ValueId) -> Option<TypeId> {
        self.types.pointee(self.value_type(value))
    }

    pub fn find_value(&self, name: &str) -> Option<ValueId> {
        self.values
            .iter()
            .position(|info| info.name == name)
            .map(ValueId)
    }

    pub fn globals(&self) -> &[ValueId] {
        &self.globals
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, func: FunctionId) -> &Function {
        &self.functions[func.0]
    }
}

/// Conservative numeric bounds for program values. Values the oracle knows
/// nothing about map to [`Range::unknown`].
pub trait RangeOracle {
    fn range(&self, value: ValueId) -> Range;
}

/// An oracle backed by explicit ranges, falling back to the module's
/// constants.
pub struct MapOracle<'m> {
    module: &'m Module,
    ranges: HashMap<ValueId, Range>,
}

impl<'m> MapOracle<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            ranges: HashMap::new(),
        }
    }

    pub fn with_range(mut self, value: ValueId, range: Range) -> Self {
        self.ranges.insert(value, range);
        self
    }
}

impl RangeOracle for MapOracle<'_> {
    fn range(&self, value: ValueId) -> Range {
        if let Some(range) = self.ranges.get(&value) {
            return *range;
        }
        self.module
            .constant(value)
            .map(Range::from)
            .unwrap_or_else(Range::unknown)
    }
}
