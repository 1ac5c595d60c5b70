//! IR functions.

use super::{BasicBlock, BlockId, Constant, InstId, Instruction, Type, Value, ValueId};
use index_vec::IndexVec;

/// A function in the module.
#[derive(Clone, Debug)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Parameter types.
    pub params: Vec<Type>,
    /// Return type.
    pub ret: Type,
    /// All values in this function.
    pub values: IndexVec<ValueId, Value>,
    /// All instructions in this function.
    pub instructions: IndexVec<InstId, Instruction>,
    /// All basic blocks in this function.
    pub blocks: IndexVec<BlockId, BasicBlock>,
    /// The entry block.
    pub entry_block: BlockId,
}

impl Function {
    /// Creates a new function with an empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = IndexVec::new();
        let entry_block = blocks.push(BasicBlock::new());
        Self {
            name: name.into(),
            params: Vec::new(),
            ret: Type::Void,
            values: IndexVec::new(),
            instructions: IndexVec::new(),
            blocks,
            entry_block,
        }
    }

    /// Returns the value for the given id.
    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    /// Returns the instruction for the given id.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.instructions[id]
    }

    /// Returns the basic block for the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Returns a mutable reference to the basic block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Returns the constant behind a value, if it is one.
    #[must_use]
    pub fn as_const(&self, id: ValueId) -> Option<&Constant> {
        self.values[id].as_const()
    }

    /// Returns the instruction defining a value, if any.
    #[must_use]
    pub fn defining_inst(&self, id: ValueId) -> Option<&Instruction> {
        match self.values[id] {
            Value::Inst(inst) => Some(&self.instructions[inst]),
            _ => None,
        }
    }

    /// Allocates a new value.
    pub fn alloc_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    /// Allocates a new instruction.
    pub fn alloc_inst(&mut self, inst: Instruction) -> InstId {
        self.instructions.push(inst)
    }

    /// Allocates a new basic block.
    pub fn alloc_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new())
    }
}
