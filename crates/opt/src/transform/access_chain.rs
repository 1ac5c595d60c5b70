//! Local access-chain lowering.
//!
//! Converts loads and stores through constant-index access chains on
//! function-local variables into whole-variable loads plus composite
//! extracts/inserts. This exposes the variable to SSA rewriting: after
//! conversion the variable is only ever loaded and stored as a whole.
//!
//! A variable qualifies when every use of its pointer is a load, a store
//! through it, or a constant-index access chain whose own uses qualify.

use lumen_ir::{
    BlockId, DefUse, Function, InstId, Instruction, Op, StorageClass, Type, Value, ValueId,
};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

/// Access-chain conversion pass for function-local variables.
#[derive(Debug, Default)]
pub struct LocalAccessChainConvert {
    /// Number of loads and stores converted in the last run.
    pub converted_count: usize,
}

enum SiteKind {
    Load,
    Store { stored: ValueId },
}

struct Site {
    block: BlockId,
    inst: InstId,
    var: ValueId,
    pointee: Type,
    indices: SmallVec<[u32; 2]>,
    kind: SiteKind,
}

impl LocalAccessChainConvert {
    /// Creates a new pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the pass on a function. Returns the number of converted loads
    /// and stores. Dead access chains are left for DCE to collect.
    pub fn run(&mut self, func: &mut Function) -> usize {
        self.converted_count = 0;

        let def_use = DefUse::build(func);
        let candidates = Self::find_candidates(func, &def_use);
        if candidates.is_empty() {
            return 0;
        }

        let sites = Self::collect_sites(func, &candidates);
        for site in sites {
            Self::apply(func, &site);
            self.converted_count += 1;
        }

        debug!(function = %func.name, converted = self.converted_count, "access_chain");
        self.converted_count
    }

    /// Function-storage variables whose pointers are used only in ways the
    /// conversion understands.
    fn find_candidates(func: &Function, def_use: &DefUse) -> FxHashSet<ValueId> {
        let mut candidates = FxHashSet::default();
        for inst in func.instructions.iter() {
            if !matches!(inst.op, Op::Variable(StorageClass::Function)) {
                continue;
            }
            let Some(ptr) = inst.result else { continue };
            if Self::has_only_supported_refs(func, def_use, ptr) {
                candidates.insert(ptr);
            }
        }
        candidates
    }

    fn has_only_supported_refs(func: &Function, def_use: &DefUse, ptr: ValueId) -> bool {
        let mut worklist = vec![ptr];
        let mut seen = FxHashSet::default();
        while let Some(p) = worklist.pop() {
            if !seen.insert(p) {
                continue;
            }
            for &user in def_use.uses(p) {
                match &func.instructions[user].op {
                    Op::Load(q) if *q == p => {}
                    Op::Store(q, stored) if *q == p && *stored != p => {}
                    Op::AccessChain { base, indices } if *base == p && !indices.contains(&p) => {
                        if let Some(result) = func.instructions[user].result {
                            worklist.push(result);
                        }
                    }
                    _ => return false,
                }
            }
        }
        true
    }

    fn collect_sites(func: &Function, candidates: &FxHashSet<ValueId>) -> Vec<Site> {
        let mut sites = Vec::new();
        for (block_id, block) in func.blocks.iter_enumerated() {
            for &inst_id in &block.instructions {
                let (ptr, kind) = match func.instructions[inst_id].op {
                    Op::Load(ptr) => (ptr, SiteKind::Load),
                    Op::Store(ptr, stored) => (ptr, SiteKind::Store { stored }),
                    _ => continue,
                };
                let Some((var, pointee, indices)) = Self::chain_info(func, ptr, candidates)
                else {
                    continue;
                };
                sites.push(Site { block: block_id, inst: inst_id, var, pointee, indices, kind });
            }
        }
        sites
    }

    /// Resolves a pointer to `(variable, pointee type, literal indices)` if
    /// it is a constant-index access chain rooted at a candidate variable.
    fn chain_info(
        func: &Function,
        ptr: ValueId,
        candidates: &FxHashSet<ValueId>,
    ) -> Option<(ValueId, Type, SmallVec<[u32; 2]>)> {
        let inst = func.defining_inst(ptr)?;
        let Op::AccessChain { base, indices } = &inst.op else { return None };
        if !candidates.contains(base) {
            return None;
        }

        let mut literals = SmallVec::new();
        for &index in indices {
            let value = func.as_const(index)?.as_int()?;
            literals.push(u32::try_from(value).ok()?);
        }

        let pointee = func.defining_inst(*base)?.ty.as_ref()?.pointee()?.clone();
        Some((*base, pointee, literals))
    }

    fn apply(func: &mut Function, site: &Site) {
        let whole = func.alloc_inst(Instruction::new(Op::Load(site.var), Some(site.pointee.clone())));
        let whole_value = func.alloc_value(Value::Inst(whole));
        func.instructions[whole].result = Some(whole_value);

        let block = &mut func.blocks[site.block];
        let Some(pos) = block.instructions.iter().position(|&id| id == site.inst) else {
            return;
        };
        block.instructions.insert(pos, whole);

        match site.kind {
            SiteKind::Load => {
                // The load becomes an extract from the whole-variable load;
                // its result value and type are unchanged.
                func.instructions[site.inst].op = Op::CompositeExtract {
                    object: whole_value,
                    indices: site.indices.clone(),
                };
            }
            SiteKind::Store { stored } => {
                let insert = func.alloc_inst(Instruction::new(
                    Op::CompositeInsert {
                        value: stored,
                        object: whole_value,
                        indices: site.indices.clone(),
                    },
                    Some(site.pointee.clone()),
                ));
                let insert_value = func.alloc_value(Value::Inst(insert));
                func.instructions[insert].result = Some(insert_value);
                let block = &mut func.blocks[site.block];
                let Some(pos) = block.instructions.iter().position(|&id| id == site.inst) else {
                    return;
                };
                block.instructions.insert(pos, insert);
                func.instructions[site.inst].op = Op::Store(site.var, insert_value);
            }
        }
    }
}
