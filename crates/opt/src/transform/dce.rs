//! Dead code elimination.
//!
//! Removes instructions whose results are never used and which have no side
//! effects. Stores, calls and terminators are always kept.

use lumen_ir::{BlockId, Function, InstId, ValueId};
use rustc_hash::FxHashSet;
use tracing::debug;

/// Dead code elimination pass.
#[derive(Debug, Default)]
pub struct DeadCodeEliminator {
    /// Number of instructions eliminated in the last run.
    pub eliminated_count: usize,
}

impl DeadCodeEliminator {
    /// Creates a new dead code eliminator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one round of dead code elimination on a function.
    /// Returns the number of instructions eliminated.
    pub fn run(&mut self, func: &mut Function) -> usize {
        self.eliminated_count = 0;

        let used_values = Self::collect_used_values(func);
        let dead_instructions = Self::find_dead_instructions(func, &used_values);

        for (block_id, inst_id) in &dead_instructions {
            let block = func.block_mut(*block_id);
            block.instructions.retain(|&id| id != *inst_id);
            self.eliminated_count += 1;
        }

        debug!(function = %func.name, eliminated = self.eliminated_count, "dce");
        self.eliminated_count
    }

    /// Runs dead code elimination to a fixpoint: removing an instruction can
    /// strand the instructions that fed it.
    pub fn run_to_fixpoint(&mut self, func: &mut Function) -> usize {
        let mut total_eliminated = 0;
        loop {
            let eliminated = self.run(func);
            if eliminated == 0 {
                break;
            }
            total_eliminated += eliminated;
        }
        total_eliminated
    }

    fn collect_used_values(func: &Function) -> FxHashSet<ValueId> {
        let mut used = FxHashSet::default();

        for (_, block) in func.blocks.iter_enumerated() {
            if let Some(term) = &block.terminator {
                used.extend(term.operands());
            }
            for &inst_id in &block.instructions {
                used.extend(func.instructions[inst_id].operands());
            }
        }

        used
    }

    fn find_dead_instructions(
        func: &Function,
        used_values: &FxHashSet<ValueId>,
    ) -> Vec<(BlockId, InstId)> {
        let mut dead = Vec::new();

        for (block_id, block) in func.blocks.iter_enumerated() {
            for &inst_id in &block.instructions {
                let inst = &func.instructions[inst_id];
                if inst.op.has_side_effects() {
                    continue;
                }
                match inst.result {
                    Some(result) if !used_values.contains(&result) => {
                        dead.push((block_id, inst_id));
                    }
                    // No result and no side effects: nothing observes it.
                    None => dead.push((block_id, inst_id)),
                    _ => {}
                }
            }
        }

        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_ir::{FunctionBuilder, StorageClass, Type};

    #[test]
    fn removes_unused_arithmetic() {
        let mut func = Function::new("f");
        let mut b = FunctionBuilder::new(&mut func);
        let one = b.iconst(1);
        let two = b.iconst(2);
        let dead = b.iadd(one, two);
        let _dead_dep = b.imul(dead, two);
        let live = b.isub(two, one);
        b.ret(Some(live));

        let mut dce = DeadCodeEliminator::new();
        let eliminated = dce.run_to_fixpoint(&mut func);

        assert_eq!(eliminated, 2);
        assert_eq!(func.blocks[func.entry_block].instructions.len(), 1);
    }

    #[test]
    fn keeps_stores_and_their_inputs() {
        let mut func = Function::new("f");
        let mut b = FunctionBuilder::new(&mut func);
        let var = b.variable(StorageClass::Function, Type::int32());
        let ten = b.iconst(10);
        b.store(var, ten);
        b.ret(None);

        let mut dce = DeadCodeEliminator::new();
        let eliminated = dce.run_to_fixpoint(&mut func);

        assert_eq!(eliminated, 0);
        assert_eq!(func.blocks[func.entry_block].instructions.len(), 2);
    }
}
