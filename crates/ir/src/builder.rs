//! IR function builder.

use super::{
    BlockId, Constant, Function, FunctionId, Instruction, Op, StorageClass, Terminator, Type,
    Value, ValueId,
};
use smallvec::SmallVec;

/// A builder for constructing IR functions.
pub struct FunctionBuilder<'a> {
    /// The function being built.
    func: &'a mut Function,
    /// The current block.
    current_block: BlockId,
}

impl<'a> FunctionBuilder<'a> {
    /// Creates a new builder positioned at the function's entry block.
    pub fn new(func: &'a mut Function) -> Self {
        let entry = func.entry_block;
        Self { func, current_block: entry }
    }

    /// Returns the current block.
    #[must_use]
    pub const fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Switches to a different block.
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Creates a new basic block.
    pub fn create_block(&mut self) -> BlockId {
        self.func.alloc_block()
    }

    /// Adds a parameter to the function.
    pub fn param(&mut self, ty: Type) -> ValueId {
        let index = self.func.params.len() as u32;
        self.func.params.push(ty.clone());
        self.func.alloc_value(Value::Param { index, ty })
    }

    /// Creates a 32-bit signed integer constant.
    pub fn iconst(&mut self, value: i32) -> ValueId {
        self.func.alloc_value(Value::Const(Constant::int32(value)))
    }

    /// Creates a 32-bit unsigned integer constant.
    pub fn uconst(&mut self, value: u32) -> ValueId {
        self.func.alloc_value(Value::Const(Constant::uint32(value)))
    }

    /// Creates a boolean constant.
    pub fn bconst(&mut self, value: bool) -> ValueId {
        self.func.alloc_value(Value::Const(Constant::Bool(value)))
    }

    /// Creates a 32-bit float constant.
    pub fn fconst(&mut self, value: f32) -> ValueId {
        self.func.alloc_value(Value::Const(Constant::float32(value)))
    }

    /// Creates an undefined value.
    pub fn undef(&mut self, ty: Type) -> ValueId {
        self.func.alloc_value(Value::Undef(ty))
    }

    fn emit(&mut self, op: Op, ty: Option<Type>) -> ValueId {
        let has_result = op.has_result();
        let inst_id = self.func.alloc_inst(Instruction::new(op, ty));
        self.func.blocks[self.current_block].instructions.push(inst_id);
        let value = self.func.alloc_value(Value::Inst(inst_id));
        if has_result {
            self.func.instructions[inst_id].result = Some(value);
        }
        value
    }

    /// Emits an integer addition.
    pub fn iadd(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::IAdd(a, b), Some(Type::int32()))
    }

    /// Emits an integer subtraction.
    pub fn isub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::ISub(a, b), Some(Type::int32()))
    }

    /// Emits an integer multiplication.
    pub fn imul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::IMul(a, b), Some(Type::int32()))
    }

    /// Emits a signed division.
    pub fn sdiv(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::SDiv(a, b), Some(Type::int32()))
    }

    /// Emits a signed negation.
    pub fn snegate(&mut self, a: ValueId) -> ValueId {
        self.emit(Op::SNegate(a), Some(Type::int32()))
    }

    /// Emits a signed less-than comparison.
    pub fn slt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::SLessThan(a, b), Some(Type::Bool))
    }

    /// Emits a signed greater-than comparison.
    pub fn sgt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::SGreaterThan(a, b), Some(Type::Bool))
    }

    /// Emits an unsigned less-than comparison.
    pub fn ult(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::ULessThan(a, b), Some(Type::Bool))
    }

    /// Emits an integer equality comparison.
    pub fn ieq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::IEqual(a, b), Some(Type::Bool))
    }

    /// Emits a float-to-signed-integer conversion.
    pub fn ftos(&mut self, a: ValueId) -> ValueId {
        self.emit(Op::ConvertFToS(a), Some(Type::int32()))
    }

    /// Emits a signed-integer-to-float conversion.
    pub fn stof(&mut self, a: ValueId) -> ValueId {
        self.emit(Op::ConvertSToF(a), Some(Type::float32()))
    }

    /// Emits a variable declaration; the result is a pointer to `pointee`.
    pub fn variable(&mut self, class: StorageClass, pointee: Type) -> ValueId {
        self.emit(Op::Variable(class), Some(Type::ptr(class, pointee)))
    }

    /// Emits a load of `ty` through `ptr`.
    pub fn load(&mut self, ty: Type, ptr: ValueId) -> ValueId {
        self.emit(Op::Load(ptr), Some(ty))
    }

    /// Emits a store of `value` through `ptr`.
    pub fn store(&mut self, ptr: ValueId, value: ValueId) {
        self.emit(Op::Store(ptr, value), None);
    }

    /// Emits an access chain producing a pointer of type `ty`.
    pub fn access_chain(
        &mut self,
        ty: Type,
        base: ValueId,
        indices: impl IntoIterator<Item = ValueId>,
    ) -> ValueId {
        let indices: SmallVec<[ValueId; 2]> = indices.into_iter().collect();
        self.emit(Op::AccessChain { base, indices }, Some(ty))
    }

    /// Emits a composite extract.
    pub fn composite_extract(
        &mut self,
        ty: Type,
        object: ValueId,
        indices: impl IntoIterator<Item = u32>,
    ) -> ValueId {
        let indices: SmallVec<[u32; 2]> = indices.into_iter().collect();
        self.emit(Op::CompositeExtract { object, indices }, Some(ty))
    }

    /// Emits a composite insert.
    pub fn composite_insert(
        &mut self,
        ty: Type,
        value: ValueId,
        object: ValueId,
        indices: impl IntoIterator<Item = u32>,
    ) -> ValueId {
        let indices: SmallVec<[u32; 2]> = indices.into_iter().collect();
        self.emit(Op::CompositeInsert { value, object, indices }, Some(ty))
    }

    /// Emits a phi instruction.
    pub fn phi(&mut self, ty: Type, incoming: Vec<(BlockId, ValueId)>) -> ValueId {
        self.emit(Op::Phi(incoming), Some(ty))
    }

    /// Emits a select.
    pub fn select(&mut self, ty: Type, cond: ValueId, a: ValueId, b: ValueId) -> ValueId {
        self.emit(Op::Select(cond, a, b), Some(ty))
    }

    /// Emits a function call.
    pub fn call(
        &mut self,
        ty: Type,
        callee: FunctionId,
        args: impl IntoIterator<Item = ValueId>,
    ) -> ValueId {
        let args: SmallVec<[ValueId; 4]> = args.into_iter().collect();
        self.emit(Op::Call { callee, args }, Some(ty))
    }

    /// Sets an unconditional branch terminator.
    pub fn branch(&mut self, target: BlockId) {
        let block = &mut self.func.blocks[self.current_block];
        block.terminator = Some(Terminator::Branch(target));
        block.successors.push(target);
        self.func.blocks[target].predecessors.push(self.current_block);
    }

    /// Sets a conditional branch terminator.
    pub fn cond_branch(&mut self, condition: ValueId, then_block: BlockId, else_block: BlockId) {
        let block = &mut self.func.blocks[self.current_block];
        block.terminator = Some(Terminator::CondBranch { condition, then_block, else_block });
        block.successors.push(then_block);
        block.successors.push(else_block);
        self.func.blocks[then_block].predecessors.push(self.current_block);
        self.func.blocks[else_block].predecessors.push(self.current_block);
    }

    /// Sets a return terminator.
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.func.blocks[self.current_block].terminator = Some(Terminator::Return(value));
    }

    /// Sets a kill terminator.
    pub fn kill(&mut self) {
        self.func.blocks[self.current_block].terminator = Some(Terminator::Kill);
    }

    /// Returns a reference to the function.
    #[must_use]
    pub fn func(&self) -> &Function {
        self.func
    }

    /// Returns a mutable reference to the function.
    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_counted_loop() {
        let mut func = Function::new("main");
        let mut b = FunctionBuilder::new(&mut func);

        let header = b.create_block();
        let body = b.create_block();
        let latch = b.create_block();
        let exit = b.create_block();

        let zero = b.iconst(0);
        let ten = b.iconst(10);
        b.branch(header);

        b.switch_to_block(header);
        let entry = b.func().entry_block;
        let i = b.phi(Type::int32(), vec![(entry, zero)]);
        let cond = b.slt(i, ten);
        b.cond_branch(cond, body, exit);

        b.switch_to_block(body);
        b.branch(latch);

        b.switch_to_block(latch);
        let one = b.iconst(1);
        let next = b.iadd(i, one);
        b.branch(header);

        b.switch_to_block(exit);
        b.ret(None);

        // Patch the phi with the back edge now that the increment exists.
        let phi_inst = func.values[i].as_inst().expect("phi is an instruction");
        if let Op::Phi(incoming) = &mut func.instructions[phi_inst].op {
            incoming.push((latch, next));
        }

        assert!(func.blocks[header].is_terminated());
        assert_eq!(func.blocks[header].predecessors.len(), 2);
        assert_eq!(func.inst(phi_inst).operands().len(), 2);
    }
}
