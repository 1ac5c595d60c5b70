//! IR instructions.

use super::{BlockId, FunctionId, StorageClass, Type, ValueId};
use smallvec::SmallVec;
use std::fmt;

/// An instruction in a function.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// The operation performed.
    pub op: Op,
    /// The result type, if the instruction produces a value.
    pub ty: Option<Type>,
    /// The value holding this instruction's result.
    pub result: Option<ValueId>,
}

impl Instruction {
    /// Creates a new instruction with no result value assigned yet.
    #[must_use]
    pub const fn new(op: Op, ty: Option<Type>) -> Self {
        Self { op, ty, result: None }
    }

    /// Returns the operand values of this instruction.
    #[must_use]
    pub fn operands(&self) -> SmallVec<[ValueId; 3]> {
        self.op.operands()
    }
}

/// The operation of an instruction.
#[derive(Clone, Debug)]
pub enum Op {
    // Integer arithmetic
    /// Integer addition: `a + b`.
    IAdd(ValueId, ValueId),
    /// Integer subtraction: `a - b`.
    ISub(ValueId, ValueId),
    /// Integer multiplication: `a * b`.
    IMul(ValueId, ValueId),
    /// Signed division: `a / b`.
    SDiv(ValueId, ValueId),
    /// Signed negation: `-a`.
    SNegate(ValueId),

    // Comparisons
    /// Signed less-than.
    SLessThan(ValueId, ValueId),
    /// Signed greater-than.
    SGreaterThan(ValueId, ValueId),
    /// Unsigned less-than.
    ULessThan(ValueId, ValueId),
    /// Integer equality.
    IEqual(ValueId, ValueId),

    // Conversions
    /// Float to signed integer conversion.
    ConvertFToS(ValueId),
    /// Signed integer to float conversion.
    ConvertSToF(ValueId),

    // Memory
    /// A local or interface variable; the result is a pointer.
    Variable(StorageClass),
    /// Load through a pointer.
    Load(ValueId),
    /// Store through a pointer.
    Store(ValueId, ValueId),
    /// Pointer into a composite: `base` indexed by `indices`.
    AccessChain {
        /// Base pointer.
        base: ValueId,
        /// One index per composite level.
        indices: SmallVec<[ValueId; 2]>,
    },

    // Composites
    /// Extract a member from a composite value by literal indices.
    CompositeExtract {
        /// The composite being read.
        object: ValueId,
        /// Literal member indices.
        indices: SmallVec<[u32; 2]>,
    },
    /// Replace a member of a composite value by literal indices.
    CompositeInsert {
        /// The member value to insert.
        value: ValueId,
        /// The composite being updated.
        object: ValueId,
        /// Literal member indices.
        indices: SmallVec<[u32; 2]>,
    },

    // SSA
    /// Merge of values from predecessor blocks.
    Phi(Vec<(BlockId, ValueId)>),
    /// Conditional select: `cond ? a : b`.
    Select(ValueId, ValueId, ValueId),

    /// Call to another function in the module.
    Call {
        /// The callee.
        callee: FunctionId,
        /// Argument values.
        args: SmallVec<[ValueId; 4]>,
    },
}

impl Op {
    /// Returns all operand values of this operation.
    #[must_use]
    pub fn operands(&self) -> SmallVec<[ValueId; 3]> {
        let mut out = SmallVec::new();
        match self {
            Self::IAdd(a, b)
            | Self::ISub(a, b)
            | Self::IMul(a, b)
            | Self::SDiv(a, b)
            | Self::SLessThan(a, b)
            | Self::SGreaterThan(a, b)
            | Self::ULessThan(a, b)
            | Self::IEqual(a, b)
            | Self::Store(a, b) => {
                out.push(*a);
                out.push(*b);
            }
            Self::SNegate(a) | Self::ConvertFToS(a) | Self::ConvertSToF(a) | Self::Load(a) => {
                out.push(*a);
            }
            Self::Variable(_) => {}
            Self::AccessChain { base, indices } => {
                out.push(*base);
                out.extend(indices.iter().copied());
            }
            Self::CompositeExtract { object, .. } => out.push(*object),
            Self::CompositeInsert { value, object, .. } => {
                out.push(*value);
                out.push(*object);
            }
            Self::Phi(incoming) => out.extend(incoming.iter().map(|&(_, v)| v)),
            Self::Select(c, a, b) => {
                out.push(*c);
                out.push(*a);
                out.push(*b);
            }
            Self::Call { args, .. } => out.extend(args.iter().copied()),
        }
        out
    }

    /// Returns true if removing this instruction can change observable behavior.
    #[must_use]
    pub const fn has_side_effects(&self) -> bool {
        matches!(self, Self::Store(..) | Self::Call { .. })
    }

    /// Returns true if this operation produces a result value.
    #[must_use]
    pub const fn has_result(&self) -> bool {
        !matches!(self, Self::Store(..))
    }

    /// Returns the mnemonic for this operation.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::IAdd(..) => "iadd",
            Self::ISub(..) => "isub",
            Self::IMul(..) => "imul",
            Self::SDiv(..) => "sdiv",
            Self::SNegate(..) => "snegate",
            Self::SLessThan(..) => "slt",
            Self::SGreaterThan(..) => "sgt",
            Self::ULessThan(..) => "ult",
            Self::IEqual(..) => "ieq",
            Self::ConvertFToS(..) => "ftos",
            Self::ConvertSToF(..) => "stof",
            Self::Variable(_) => "variable",
            Self::Load(_) => "load",
            Self::Store(..) => "store",
            Self::AccessChain { .. } => "access_chain",
            Self::CompositeExtract { .. } => "extract",
            Self::CompositeInsert { .. } => "insert",
            Self::Phi(_) => "phi",
            Self::Select(..) => "select",
            Self::Call { .. } => "call",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
