//! Loop analysis.
//!
//! Detects natural loops using a dominance-based algorithm and records, for
//! each loop, its header, body blocks, back edges, exit blocks, preheader
//! and nesting parent. Other passes consume this through [`LoopInfo`].

use lumen_ir::{BlockId, Function};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// A natural loop in the control flow graph.
#[derive(Clone, Debug)]
pub struct Loop {
    /// The header block (entry point with a back edge).
    pub header: BlockId,
    /// All blocks in the loop body (including the header).
    pub blocks: FxHashSet<BlockId>,
    /// Back edges: blocks that jump back to the header.
    pub back_edges: SmallVec<[BlockId; 2]>,
    /// Exit blocks: blocks outside the loop that are successors of loop blocks.
    pub exit_blocks: SmallVec<[BlockId; 2]>,
    /// Preheader block, if one exists: the unique predecessor of the header
    /// outside the loop.
    pub preheader: Option<BlockId>,
    /// Header of the innermost enclosing loop, if this loop is nested.
    pub parent: Option<BlockId>,
}

impl Loop {
    /// Returns true if the block is part of this loop.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Returns the latch block when the loop has a single back edge.
    #[must_use]
    pub fn latch(&self) -> Option<BlockId> {
        match self.back_edges.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }
}

/// Result of loop analysis for a function.
#[derive(Clone, Debug, Default)]
pub struct LoopInfo {
    /// All loops in the function, keyed by header block.
    pub loops: FxHashMap<BlockId, Loop>,
    /// Mapping from block to the header of the innermost loop containing it.
    pub block_to_loop: FxHashMap<BlockId, BlockId>,
}

impl LoopInfo {
    /// Returns true if the block is in any loop.
    #[must_use]
    pub fn is_in_loop(&self, block: BlockId) -> bool {
        self.block_to_loop.contains_key(&block)
    }

    /// Returns the innermost loop containing the given block, if any.
    #[must_use]
    pub fn loop_of(&self, block: BlockId) -> Option<&Loop> {
        self.block_to_loop.get(&block).and_then(|header| self.loops.get(header))
    }

    /// Returns the loop with the given header block.
    #[must_use]
    pub fn get(&self, header: BlockId) -> Option<&Loop> {
        self.loops.get(&header)
    }

    /// Returns all loops in the function.
    pub fn all_loops(&self) -> impl Iterator<Item = &Loop> {
        self.loops.values()
    }

    /// Returns all loops, innermost first.
    #[must_use]
    pub fn loops_innermost_first(&self) -> Vec<&Loop> {
        let mut loops: Vec<&Loop> = self.loops.values().collect();
        loops.sort_by_key(|lp| (lp.blocks.len(), lp.header));
        loops
    }
}

/// Loop analyzer that detects and analyzes natural loops.
#[derive(Debug, Default)]
pub struct LoopAnalyzer {
    /// Dominators: for each block, the set of blocks that dominate it.
    dominators: FxHashMap<BlockId, FxHashSet<BlockId>>,
}

impl LoopAnalyzer {
    /// Creates a new loop analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes loops in a function.
    pub fn analyze(&mut self, func: &Function) -> LoopInfo {
        let mut info = LoopInfo::default();

        self.compute_dominators(func);
        let mut loops = self.find_natural_loops(func);

        for lp in &mut loops {
            self.find_exit_blocks(func, lp);
            self.find_preheader(func, lp);
        }

        // Record innermost loops last so the smallest containing loop wins.
        loops.sort_by_key(|lp| std::cmp::Reverse(lp.blocks.len()));
        for lp in &loops {
            for &block in &lp.blocks {
                info.block_to_loop.insert(block, lp.header);
            }
        }

        let parents: Vec<Option<BlockId>> = loops
            .iter()
            .map(|lp| {
                loops
                    .iter()
                    .filter(|m| {
                        m.header != lp.header
                            && m.blocks.len() > lp.blocks.len()
                            && m.contains(lp.header)
                    })
                    .min_by_key(|m| m.blocks.len())
                    .map(|m| m.header)
            })
            .collect();

        for (mut lp, parent) in loops.into_iter().zip(parents) {
            lp.parent = parent;
            info.loops.insert(lp.header, lp);
        }

        info
    }

    fn compute_dominators(&mut self, func: &Function) {
        self.dominators.clear();
        let all_blocks: FxHashSet<BlockId> = func.blocks.indices().collect();

        for (block_id, _) in func.blocks.iter_enumerated() {
            if block_id == func.entry_block {
                let mut doms = FxHashSet::default();
                doms.insert(block_id);
                self.dominators.insert(block_id, doms);
            } else {
                self.dominators.insert(block_id, all_blocks.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (block_id, block) in func.blocks.iter_enumerated() {
                if block_id == func.entry_block {
                    continue;
                }

                let mut new_doms: Option<FxHashSet<BlockId>> = None;
                for &pred in &block.predecessors {
                    if let Some(pred_doms) = self.dominators.get(&pred) {
                        match &mut new_doms {
                            Some(doms) => doms.retain(|b| pred_doms.contains(b)),
                            None => new_doms = Some(pred_doms.clone()),
                        }
                    }
                }

                let mut new_doms = new_doms.unwrap_or_default();
                new_doms.insert(block_id);

                if self.dominators.get(&block_id) != Some(&new_doms) {
                    self.dominators.insert(block_id, new_doms);
                    changed = true;
                }
            }
        }
    }

    fn find_natural_loops(&self, func: &Function) -> Vec<Loop> {
        let mut loops: FxHashMap<BlockId, Loop> = FxHashMap::default();

        for (block_id, block) in func.blocks.iter_enumerated() {
            let Some(term) = &block.terminator else { continue };
            for succ in term.successors() {
                let dominates = self.dominators.get(&block_id).is_some_and(|d| d.contains(&succ));
                if dominates {
                    let lp = loops.entry(succ).or_insert_with(|| Loop {
                        header: succ,
                        blocks: FxHashSet::default(),
                        back_edges: SmallVec::new(),
                        exit_blocks: SmallVec::new(),
                        preheader: None,
                        parent: None,
                    });
                    lp.back_edges.push(block_id);
                    Self::collect_loop_blocks(func, succ, block_id, &mut lp.blocks);
                }
            }
        }

        loops.into_values().collect()
    }

    fn collect_loop_blocks(
        func: &Function,
        header: BlockId,
        back_edge_src: BlockId,
        blocks: &mut FxHashSet<BlockId>,
    ) {
        blocks.insert(header);
        let mut worklist = vec![back_edge_src];
        while let Some(block) = worklist.pop() {
            if blocks.insert(block) {
                for &pred in &func.blocks[block].predecessors {
                    if !blocks.contains(&pred) {
                        worklist.push(pred);
                    }
                }
            }
        }
    }

    fn find_exit_blocks(&self, func: &Function, lp: &mut Loop) {
        for &block_id in &lp.blocks {
            let Some(term) = &func.blocks[block_id].terminator else { continue };
            for succ in term.successors() {
                if !lp.blocks.contains(&succ) && !lp.exit_blocks.contains(&succ) {
                    lp.exit_blocks.push(succ);
                }
            }
        }
    }

    fn find_preheader(&self, func: &Function, lp: &mut Loop) {
        let header_preds: Vec<BlockId> = func.blocks[lp.header]
            .predecessors
            .iter()
            .filter(|&&pred| !lp.blocks.contains(&pred))
            .copied()
            .collect();

        if let [preheader] = header_preds.as_slice() {
            lp.preheader = Some(*preheader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_ir::FunctionBuilder;

    #[test]
    fn simple_loop_detection() {
        let mut func = Function::new("f");
        let mut b = FunctionBuilder::new(&mut func);

        let entry = b.current_block();
        let header = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();

        b.branch(header);
        b.switch_to_block(header);
        let cond = b.bconst(true);
        b.cond_branch(cond, body, exit);
        b.switch_to_block(body);
        b.branch(header);
        b.switch_to_block(exit);
        b.ret(None);

        let info = LoopAnalyzer::new().analyze(&func);

        assert_eq!(info.loops.len(), 1);
        let lp = info.get(header).expect("loop keyed by header");
        assert!(lp.contains(header));
        assert!(lp.contains(body));
        assert!(!lp.contains(exit));
        assert_eq!(lp.preheader, Some(entry));
        assert_eq!(lp.latch(), Some(body));
        assert_eq!(lp.parent, None);
        assert!(info.is_in_loop(body));
        assert!(!info.is_in_loop(exit));
    }

    #[test]
    fn nested_loop_parents() {
        let mut func = Function::new("f");
        let mut b = FunctionBuilder::new(&mut func);

        let outer_header = b.create_block();
        let inner_header = b.create_block();
        let inner_body = b.create_block();
        let outer_latch = b.create_block();
        let exit = b.create_block();

        b.branch(outer_header);
        b.switch_to_block(outer_header);
        let c0 = b.bconst(true);
        b.cond_branch(c0, inner_header, exit);
        b.switch_to_block(inner_header);
        let c1 = b.bconst(true);
        b.cond_branch(c1, inner_body, outer_latch);
        b.switch_to_block(inner_body);
        b.branch(inner_header);
        b.switch_to_block(outer_latch);
        b.branch(outer_header);
        b.switch_to_block(exit);
        b.ret(None);

        let info = LoopAnalyzer::new().analyze(&func);

        assert_eq!(info.loops.len(), 2);
        let outer = info.get(outer_header).expect("outer loop");
        let inner = info.get(inner_header).expect("inner loop");
        assert_eq!(outer.parent, None);
        assert_eq!(inner.parent, Some(outer_header));

        // The innermost loop wins the per-block mapping.
        assert_eq!(info.loop_of(inner_body).map(|lp| lp.header), Some(inner_header));
        assert_eq!(info.loop_of(outer_latch).map(|lp| lp.header), Some(outer_header));

        let order = info.loops_innermost_first();
        assert_eq!(order[0].header, inner_header);
        assert_eq!(order[1].header, outer_header);
    }
}
