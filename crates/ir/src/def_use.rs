//! Def-use queries.

use super::{BlockId, Function, InstId, Value, ValueId};
use rustc_hash::FxHashMap;

/// Def-use information for one function.
///
/// Built once from a function snapshot; answers which instruction defines a
/// value, which instructions use it, and which block an instruction lives in.
/// Any structural change to the function invalidates the map.
#[derive(Debug, Default)]
pub struct DefUse {
    defs: FxHashMap<ValueId, InstId>,
    uses: FxHashMap<ValueId, Vec<InstId>>,
    inst_block: FxHashMap<InstId, BlockId>,
}

impl DefUse {
    /// Builds def-use information for a function.
    #[must_use]
    pub fn build(func: &Function) -> Self {
        let mut this = Self::default();

        for (value_id, value) in func.values.iter_enumerated() {
            if let Value::Inst(inst_id) = value {
                this.defs.insert(value_id, *inst_id);
            }
        }

        for (block_id, block) in func.blocks.iter_enumerated() {
            for &inst_id in &block.instructions {
                this.inst_block.insert(inst_id, block_id);
                for operand in func.instructions[inst_id].operands() {
                    this.uses.entry(operand).or_default().push(inst_id);
                }
            }
        }

        this
    }

    /// Returns the instruction defining `value`, if any.
    #[must_use]
    pub fn def(&self, value: ValueId) -> Option<InstId> {
        self.defs.get(&value).copied()
    }

    /// Returns the instructions using `value` as an operand.
    #[must_use]
    pub fn uses(&self, value: ValueId) -> &[InstId] {
        self.uses.get(&value).map_or(&[], Vec::as_slice)
    }

    /// Returns the block containing `inst`, if it is attached to one.
    #[must_use]
    pub fn block_of(&self, inst: InstId) -> Option<BlockId> {
        self.inst_block.get(&inst).copied()
    }

    /// Returns the block in which `value` is defined, if it has a defining
    /// instruction attached to a block.
    #[must_use]
    pub fn def_block(&self, value: ValueId) -> Option<BlockId> {
        self.def(value).and_then(|inst| self.block_of(inst))
    }
}
