//! Loop-invariant code motion.
//!
//! Hoists computations that do not change within a loop into the loop's
//! preheader. Invariance is decided by scalar evolution: an instruction is
//! hoistable when its analyzed expression contains no recurrence of the
//! loop and no value defined inside it. Opaque instructions fall back to a
//! direct check of their operands' definition sites.

use crate::analysis::{Loop, LoopAnalyzer, LoopInfo, ScalarEvolution, SeExpr};
use lumen_ir::{BlockId, DefUse, Function, InstId, Instruction, Op, Value};
use rustc_hash::FxHashSet;
use tracing::debug;

/// Loop-invariant code motion pass.
#[derive(Debug, Default)]
pub struct LoopInvariantCodeMotion {
    /// Number of instructions hoisted in the last run.
    pub hoisted_count: usize,
}

impl LoopInvariantCodeMotion {
    /// Creates a new pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the pass on a function. Returns the number of instructions
    /// hoisted to preheaders.
    pub fn run(&mut self, func: &mut Function) -> usize {
        self.hoisted_count = 0;

        // Hoisting moves instructions between existing blocks; the CFG and
        // therefore the loop structure stay valid across iterations. Def-use
        // and scalar evolution are rebuilt per loop.
        let loops = LoopAnalyzer::new().analyze(func);
        let order: Vec<BlockId> =
            loops.loops_innermost_first().iter().map(|lp| lp.header).collect();

        for header in order {
            let Some(lp) = loops.get(header) else { continue };
            let Some(preheader) = lp.preheader else { continue };

            let hoistable = Self::find_hoistable(func, &loops, lp);
            if hoistable.is_empty() {
                continue;
            }

            for inst_id in Self::topological_sort(func, &hoistable) {
                for &block_id in &lp.blocks {
                    let block = &mut func.blocks[block_id];
                    if let Some(pos) = block.instructions.iter().position(|&id| id == inst_id) {
                        block.instructions.remove(pos);
                        break;
                    }
                }
                func.blocks[preheader].instructions.push(inst_id);
                self.hoisted_count += 1;
            }
        }

        debug!(function = %func.name, hoisted = self.hoisted_count, "licm");
        self.hoisted_count
    }

    /// Grows the hoistable set to a fixpoint: an instruction qualifies when
    /// its value is invariant in the loop and every operand is already
    /// available outside it, either defined there or hoistable itself.
    fn find_hoistable(func: &Function, loops: &LoopInfo, lp: &Loop) -> Vec<InstId> {
        let def_use = DefUse::build(func);
        let mut se = ScalarEvolution::new(func, &def_use, loops);
        let mut out = Vec::new();
        let mut hoistable: FxHashSet<InstId> = FxHashSet::default();

        let mut changed = true;
        while changed {
            changed = false;
            for &block_id in &lp.blocks {
                for &inst_id in &func.blocks[block_id].instructions {
                    if hoistable.contains(&inst_id) {
                        continue;
                    }
                    let inst = &func.instructions[inst_id];
                    if inst.op.has_side_effects() {
                        continue;
                    }
                    // Loads may alias stores in the loop; variables and phis
                    // are anchored to their blocks.
                    if matches!(inst.op, Op::Phi(_) | Op::Load(_) | Op::Variable(_)) {
                        continue;
                    }
                    let Some(result) = inst.result else { continue };
                    if !Self::operands_available(func, &def_use, inst, lp, &hoistable) {
                        continue;
                    }

                    let node = se.analyze(result);
                    let node = se.simplify(node);
                    let invariant = match se.expr(node) {
                        SeExpr::Unknown(v) if *v == result => true,
                        _ => se.is_loop_invariant(node, lp),
                    };
                    if invariant {
                        hoistable.insert(inst_id);
                        out.push(inst_id);
                        changed = true;
                    }
                }
            }
        }

        out
    }

    /// True if every operand of `inst` is usable from the preheader: a
    /// constant, a parameter, a definition outside the loop, or a definition
    /// that is itself being hoisted.
    fn operands_available(
        func: &Function,
        def_use: &DefUse,
        inst: &Instruction,
        lp: &Loop,
        hoistable: &FxHashSet<InstId>,
    ) -> bool {
        inst.operands().iter().all(|&v| match func.value(v) {
            Value::Const(_) | Value::Param { .. } | Value::Undef(_) => true,
            Value::Inst(def) => {
                hoistable.contains(def)
                    || def_use.def_block(v).is_none_or(|block| !lp.contains(block))
            }
        })
    }

    /// Orders hoisted instructions so defs precede their uses in the
    /// preheader.
    fn topological_sort(func: &Function, insts: &[InstId]) -> Vec<InstId> {
        let inst_set: FxHashSet<InstId> = insts.iter().copied().collect();
        let mut result = Vec::new();
        let mut visited = FxHashSet::default();

        fn visit(
            func: &Function,
            inst_id: InstId,
            inst_set: &FxHashSet<InstId>,
            visited: &mut FxHashSet<InstId>,
            result: &mut Vec<InstId>,
        ) {
            if !visited.insert(inst_id) {
                return;
            }
            for operand in func.instructions[inst_id].operands() {
                if let Value::Inst(dep) = func.value(operand)
                    && inst_set.contains(dep)
                {
                    visit(func, *dep, inst_set, visited, result);
                }
            }
            result.push(inst_id);
        }

        for &inst_id in insts {
            visit(func, inst_id, &inst_set, &mut visited, &mut result);
        }

        result
    }
}
