//! Basic blocks.

use super::{BlockId, InstId, ValueId};
use smallvec::SmallVec;
use std::fmt;

/// A basic block in a function.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    /// The instructions in this block, in order (excluding the terminator).
    pub instructions: Vec<InstId>,
    /// The terminator.
    pub terminator: Option<Terminator>,
    /// Predecessor blocks.
    pub predecessors: SmallVec<[BlockId; 4]>,
    /// Successor blocks.
    pub successors: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    /// Creates a new empty basic block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this block has a terminator.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// A block terminator.
#[derive(Clone, Debug)]
pub enum Terminator {
    /// Unconditional branch.
    Branch(BlockId),
    /// Conditional branch.
    CondBranch {
        /// The boolean condition.
        condition: ValueId,
        /// Taken when the condition is true.
        then_block: BlockId,
        /// Taken when the condition is false.
        else_block: BlockId,
    },
    /// Return from the function, optionally with a value.
    Return(Option<ValueId>),
    /// Discard the fragment and terminate the invocation.
    Kill,
    /// Unreachable code.
    Unreachable,
}

impl Terminator {
    /// Returns the successor blocks of this terminator.
    #[must_use]
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::Branch(target) => smallvec::smallvec![*target],
            Self::CondBranch { then_block, else_block, .. } => {
                smallvec::smallvec![*then_block, *else_block]
            }
            Self::Return(_) | Self::Kill | Self::Unreachable => SmallVec::new(),
        }
    }

    /// Returns the values this terminator reads.
    #[must_use]
    pub fn operands(&self) -> SmallVec<[ValueId; 1]> {
        match self {
            Self::CondBranch { condition, .. } => smallvec::smallvec![*condition],
            Self::Return(Some(v)) => smallvec::smallvec![*v],
            Self::Branch(_) | Self::Return(None) | Self::Kill | Self::Unreachable => {
                SmallVec::new()
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(target) => write!(f, "branch bb{}", target.index()),
            Self::CondBranch { condition, then_block, else_block } => write!(
                f,
                "branch_cond v{}, bb{}, bb{}",
                condition.index(),
                then_block.index(),
                else_block.index()
            ),
            Self::Return(Some(v)) => write!(f, "return v{}", v.index()),
            Self::Return(None) => write!(f, "return"),
            Self::Kill => write!(f, "kill"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}
