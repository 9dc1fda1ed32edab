use super::program::*;

/// Small helpers to build modules by hand.
pub struct Builder {
    pub module: Module,
    pub int: TypeId,
}

impl Builder {
    pub fn new() -> Self {
        let mut module = Module::default();
        let int = module.types.scalar(64);
        Self { module, int }
    }

    pub fn ptr(&mut self, pointee: TypeId) -> TypeId {
        self.module.types.pointer(pointee)
    }

    pub fn array(&mut self, element: TypeId, len: u64) -> TypeId {
        self.module.types.intern(TypeKind::Array { element, len })
    }

    pub fn structure(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.module.types.intern(TypeKind::Struct(fields))
    }

    /// A struct of two fields occupying one and three units.
    pub fn four_unit_struct(&mut self) -> TypeId {
        let bit = self.module.types.scalar(1);
        let triple = self.array(bit, 3);
        self.structure(vec![bit, triple])
    }

    pub fn value(&mut self, name: &str, ty: TypeId) -> ValueId {
        self.module.add_value(name, ty)
    }

    pub fn int_value(&mut self, name: &str) -> ValueId {
        let ty = self.int;
        self.module.add_value(name, ty)
    }

    pub fn constant(&mut self, c: i64) -> ValueId {
        let ty = self.int;
        let value = self.module.add_value(c.to_string(), ty);
        self.module.set_constant(value, c);
        value
    }

    pub fn function(&mut self, name: &str, params: Vec<ValueId>) -> FunctionId {
        self.module.add_function(name, params, true)
    }

    pub fn push(&mut self, func: FunctionId, inst: Instruction) {
        self.module.push(func, inst);
    }

    pub fn index(&mut self, func: FunctionId, name: &str, base: ValueId, indices: &[i64]) -> ValueId {
        let ty = self.module.value_type(base);
        let result = self.value(name, ty);
        let indices = indices.iter().map(|c| self.constant(*c)).collect();
        self.push(
            func,
            Instruction::Index {
                result,
                base,
                indices,
            },
        );
        result
    }

    pub fn alloc(&mut self, func: FunctionId, name: &str, ty: TypeId) -> ValueId {
        let result = self.value(name, ty);
        let size = self.constant(1);
        self.push(
            func,
            Instruction::Call {
                result: Some(result),
                target: CallTarget::Alloc,
                args: vec![size],
            },
        );
        result
    }
}
