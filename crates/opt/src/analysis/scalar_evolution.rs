//! Scalar evolution analysis.
//!
//! Represents how an integer SSA value changes across loop iterations as a
//! symbolic expression DAG. Every node is hash-consed into a per-session
//! store, so two structurally equal simplified expressions are the *same*
//! node and can be compared by id. Passes use this to answer questions such
//! as "are these two memory indices always equal", "do they differ by a
//! known constant", or "is this value invariant in that loop".
//!
//! The analysis recognizes affine recurrences from loop-header phis: a phi
//! whose back-edge value is `phi + step` (or `phi - step`) with a step that
//! is invariant in the loop becomes a [`SeExpr::Recurrence`], the value
//! `offset + k * coefficient` at iteration `k`. The cyclic def-use edge
//! between a phi and its own increment is consumed entirely inside
//! [`ScalarEvolution::analyze`]; the node graph it produces is always
//! acyclic.
//!
//! A session borrows one function's IR, def-use map and loop info, and its
//! results are valid only while that IR is unchanged. Analyses of a mutated
//! function require a fresh session.

mod simplify;

use super::{Loop, LoopInfo};
use index_vec::IndexVec;
use lumen_ir::{BlockId, DefUse, Function, Op, Value, ValueId};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{SmallVec, smallvec};
use tracing::trace;

index_vec::define_index_type! {
    /// A handle to an interned scalar-evolution node.
    pub struct SeNodeId = u32;
    DEBUG_FORMAT = "se{}";
}

/// The kind of a scalar-evolution node.
///
/// The declaration order doubles as the canonical ordering of children in
/// commutative nodes: constants sort first, then opaque values, then
/// recurrences and compound expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeKind {
    /// A fixed integer.
    Constant,
    /// An opaque value analysis cannot decompose.
    Unknown,
    /// An affine recurrence over a loop.
    Recurrence,
    /// Additive inverse.
    Neg,
    /// N-ary sum.
    Add,
    /// N-ary product.
    Mul,
    /// The absorbing "no information" node.
    CantCompute,
}

/// A scalar-evolution expression node.
///
/// Immutable once interned. Children are node ids into the owning session's
/// store; the DAG shares sub-nodes freely and never contains cycles.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SeExpr {
    /// A fixed integer value. Folds use 32-bit wraparound signed semantics,
    /// matching the width of the source values.
    Constant(i64),
    /// An opaque leaf for a specific IR value that cannot be decomposed
    /// further. Two `Unknown` nodes are equal iff they name the same value.
    Unknown(ValueId),
    /// Sum of two or more children, kept in canonical order.
    Add(SmallVec<[SeNodeId; 2]>),
    /// Product of two or more children, kept in canonical order.
    Mul(SmallVec<[SeNodeId; 2]>),
    /// Additive inverse of the child.
    Neg(SeNodeId),
    /// An affine recurrence: at iteration `k` of the loop with the given
    /// header, the value is `offset + k * coefficient`.
    Recurrence {
        /// Header block of the loop this recurrence evolves in.
        loop_header: BlockId,
        /// Per-iteration step.
        coefficient: SeNodeId,
        /// Value on loop entry.
        offset: SeNodeId,
    },
    /// Structure could not be determined. Absorbing: any expression with a
    /// `CantCompute` operand simplifies to `CantCompute`.
    CantCompute,
}

impl SeExpr {
    /// Returns the kind of this expression.
    #[must_use]
    pub const fn kind(&self) -> SeKind {
        match self {
            Self::Constant(_) => SeKind::Constant,
            Self::Unknown(_) => SeKind::Unknown,
            Self::Add(_) => SeKind::Add,
            Self::Mul(_) => SeKind::Mul,
            Self::Neg(_) => SeKind::Neg,
            Self::Recurrence { .. } => SeKind::Recurrence,
            Self::CantCompute => SeKind::CantCompute,
        }
    }

    /// Returns the children of this expression, in order. For a recurrence
    /// the order is coefficient, then offset.
    #[must_use]
    pub fn children(&self) -> SmallVec<[SeNodeId; 2]> {
        match self {
            Self::Constant(_) | Self::Unknown(_) | Self::CantCompute => SmallVec::new(),
            Self::Add(children) | Self::Mul(children) => children.clone(),
            Self::Neg(child) => smallvec![*child],
            Self::Recurrence { coefficient, offset, .. } => smallvec![*coefficient, *offset],
        }
    }
}

/// 32-bit wraparound arithmetic used for all constant folding.
pub(crate) fn add32(a: i64, b: i64) -> i64 {
    (a as i32).wrapping_add(b as i32) as i64
}

pub(crate) fn mul32(a: i64, b: i64) -> i64 {
    (a as i32).wrapping_mul(b as i32) as i64
}

pub(crate) fn neg32(a: i64) -> i64 {
    (a as i32).wrapping_neg() as i64
}

pub(crate) fn wrap32(a: i64) -> i64 {
    a as i32 as i64
}

/// One scalar-evolution analysis session.
///
/// Owns every node it creates; nodes live as long as the session. The
/// session is single-threaded mutable state; analyzing independent
/// functions concurrently requires one session each.
pub struct ScalarEvolution<'a> {
    func: &'a Function,
    def_use: &'a DefUse,
    loops: &'a LoopInfo,
    /// Node store: the arena of all nodes created by this session.
    nodes: IndexVec<SeNodeId, SeExpr>,
    /// Structural interning table over `nodes`.
    interned: FxHashMap<SeExpr, SeNodeId>,
    /// Memoized value-to-node results of [`Self::analyze`] (unsimplified).
    analyzed: FxHashMap<ValueId, SeNodeId>,
    /// Memoized results of [`Self::simplify`].
    simplified: FxHashMap<SeNodeId, SeNodeId>,
}

enum Frame {
    /// Analyze a value if not already done.
    Visit(ValueId),
    /// Build the composite node for an arithmetic instruction whose
    /// operands have been analyzed.
    Finish(ValueId),
    /// Build the recurrence for a header phi whose entry and step values
    /// have been analyzed.
    FinishPhi {
        phi: ValueId,
        loop_header: BlockId,
        entry: ValueId,
        step: ValueId,
        negate_step: bool,
    },
}

impl<'a> ScalarEvolution<'a> {
    /// Creates a new session over one function snapshot.
    #[must_use]
    pub fn new(func: &'a Function, def_use: &'a DefUse, loops: &'a LoopInfo) -> Self {
        Self {
            func,
            def_use,
            loops,
            nodes: IndexVec::new(),
            interned: FxHashMap::default(),
            analyzed: FxHashMap::default(),
            simplified: FxHashMap::default(),
        }
    }

    /// Returns the expression for a node id.
    #[must_use]
    pub fn expr(&self, id: SeNodeId) -> &SeExpr {
        &self.nodes[id]
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: SeNodeId) -> SeKind {
        self.nodes[id].kind()
    }

    /// Returns the children of a node, in canonical order.
    #[must_use]
    pub fn children(&self, id: SeNodeId) -> SmallVec<[SeNodeId; 2]> {
        self.nodes[id].children()
    }

    /// Returns the integer value of a constant node.
    #[must_use]
    pub fn constant_value(&self, id: SeNodeId) -> Option<i64> {
        match self.nodes[id] {
            SeExpr::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the per-iteration step of a recurrence node.
    #[must_use]
    pub fn coefficient(&self, id: SeNodeId) -> Option<SeNodeId> {
        match self.nodes[id] {
            SeExpr::Recurrence { coefficient, .. } => Some(coefficient),
            _ => None,
        }
    }

    /// Returns the entry value of a recurrence node.
    #[must_use]
    pub fn offset(&self, id: SeNodeId) -> Option<SeNodeId> {
        match self.nodes[id] {
            SeExpr::Recurrence { offset, .. } => Some(offset),
            _ => None,
        }
    }

    /// Returns true if the node is the `CantCompute` sentinel.
    #[must_use]
    pub fn is_cant_compute(&self, id: SeNodeId) -> bool {
        matches!(self.nodes[id], SeExpr::CantCompute)
    }

    /// Returns true if the node's value does not change while `lp` runs:
    /// it computes nothing from a recurrence evolving in `lp` (or in a loop
    /// nested inside it), no opaque value defined inside `lp`, and nothing
    /// unknown to the analysis.
    #[must_use]
    pub fn is_loop_invariant(&self, id: SeNodeId, lp: &Loop) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !visited.insert(n) {
                continue;
            }
            match &self.nodes[n] {
                SeExpr::CantCompute => return false,
                SeExpr::Recurrence { loop_header, .. } if lp.contains(*loop_header) => {
                    return false;
                }
                SeExpr::Unknown(value) => {
                    if let Some(block) = self.def_use.def_block(*value)
                        && lp.contains(block)
                    {
                        return false;
                    }
                }
                _ => {}
            }
            stack.extend(self.nodes[n].children());
        }
        true
    }

    /// Interns an expression, canonicalizing commutative operand order, and
    /// returns the shared node for it. Structurally equal expressions always
    /// map to the same id.
    pub(crate) fn intern(&mut self, mut expr: SeExpr) -> SeNodeId {
        if let SeExpr::Add(children) | SeExpr::Mul(children) = &mut expr {
            children.sort_by(|&a, &b| self.cmp_nodes(a, b));
        }
        if let Some(&id) = self.interned.get(&expr) {
            return id;
        }
        let id = self.nodes.push(expr.clone());
        self.interned.insert(expr, id);
        id
    }

    /// Total order on nodes used to canonicalize commutative operand lists:
    /// by kind first, then by payload and recursively by children. Interned
    /// structural equality short-circuits to `Equal` immediately.
    fn cmp_nodes(&self, a: SeNodeId, b: SeNodeId) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        if a == b {
            return Ordering::Equal;
        }
        let (ea, eb) = (&self.nodes[a], &self.nodes[b]);
        ea.kind().cmp(&eb.kind()).then_with(|| match (ea, eb) {
            (SeExpr::Constant(x), SeExpr::Constant(y)) => x.cmp(y),
            (SeExpr::Unknown(x), SeExpr::Unknown(y)) => x.cmp(y),
            (SeExpr::Neg(x), SeExpr::Neg(y)) => self.cmp_nodes(*x, *y),
            (SeExpr::Add(xs), SeExpr::Add(ys)) | (SeExpr::Mul(xs), SeExpr::Mul(ys)) => {
                xs.len().cmp(&ys.len()).then_with(|| {
                    for (&x, &y) in xs.iter().zip(ys) {
                        let ord = self.cmp_nodes(x, y);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                })
            }
            (
                SeExpr::Recurrence { loop_header: la, coefficient: ca, offset: oa },
                SeExpr::Recurrence { loop_header: lb, coefficient: cb, offset: ob },
            ) => la
                .cmp(lb)
                .then_with(|| self.cmp_nodes(*ca, *cb))
                .then_with(|| self.cmp_nodes(*oa, *ob)),
            _ => Ordering::Equal,
        })
    }

    /// Creates a constant node.
    pub fn constant(&mut self, value: i64) -> SeNodeId {
        self.intern(SeExpr::Constant(value))
    }

    /// Creates the `CantCompute` sentinel node.
    pub fn cant_compute(&mut self) -> SeNodeId {
        self.intern(SeExpr::CantCompute)
    }

    fn unknown(&mut self, value: ValueId) -> SeNodeId {
        self.intern(SeExpr::Unknown(value))
    }

    /// Builds the raw (unsimplified) sum of two nodes.
    pub fn add(&mut self, a: SeNodeId, b: SeNodeId) -> SeNodeId {
        self.intern(SeExpr::Add(smallvec![a, b]))
    }

    /// Builds the raw difference `a - b`, represented as `a + (-b)`.
    pub fn subtract(&mut self, a: SeNodeId, b: SeNodeId) -> SeNodeId {
        let negated = self.negate(b);
        self.add(a, negated)
    }

    /// Builds the raw (unsimplified) product of two nodes.
    pub fn multiply(&mut self, a: SeNodeId, b: SeNodeId) -> SeNodeId {
        self.intern(SeExpr::Mul(smallvec![a, b]))
    }

    /// Builds the additive inverse of a node. Negating a constant folds
    /// immediately; everything else is wrapped in a `Neg` node.
    pub fn negate(&mut self, a: SeNodeId) -> SeNodeId {
        match self.nodes[a] {
            SeExpr::Constant(value) => self.constant(neg32(value)),
            _ => self.intern(SeExpr::Neg(a)),
        }
    }

    /// Analyzes the value and returns its (unsimplified) scalar-evolution
    /// node. Memoized per value; traversal is worklist-driven so arbitrarily
    /// long arithmetic chains do not recurse.
    pub fn analyze(&mut self, value: ValueId) -> SeNodeId {
        if let Some(&node) = self.analyzed.get(&value) {
            return node;
        }

        let mut stack = vec![Frame::Visit(value)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit(v) => {
                    if !self.analyzed.contains_key(&v) {
                        self.visit(v, &mut stack);
                    }
                }
                Frame::Finish(v) => {
                    let node = self.finish_arith(v);
                    self.analyzed.insert(v, node);
                }
                Frame::FinishPhi { phi, loop_header, entry, step, negate_step } => {
                    self.finish_phi(phi, loop_header, entry, step, negate_step);
                }
            }
        }

        self.analyzed[&value]
    }

    fn visit(&mut self, v: ValueId, stack: &mut Vec<Frame>) {
        let func = self.func;
        let node = match func.value(v) {
            Value::Const(c) => match c.as_int() {
                Some(value) => self.constant(value),
                None => self.unknown(v),
            },
            Value::Inst(inst_id) => match &func.inst(*inst_id).op {
                Op::IAdd(a, b) | Op::ISub(a, b) | Op::IMul(a, b) => {
                    stack.push(Frame::Finish(v));
                    stack.push(Frame::Visit(*a));
                    stack.push(Frame::Visit(*b));
                    return;
                }
                Op::SNegate(a) => {
                    stack.push(Frame::Finish(v));
                    stack.push(Frame::Visit(*a));
                    return;
                }
                Op::Phi(incoming) => {
                    self.visit_phi(v, *inst_id, incoming.clone(), stack);
                    return;
                }
                _ => self.unknown(v),
            },
            Value::Param { .. } | Value::Undef(_) => self.unknown(v),
        };
        self.analyzed.insert(v, node);
    }

    fn finish_arith(&mut self, v: ValueId) -> SeNodeId {
        let func = self.func;
        let Some(inst_id) = func.value(v).as_inst() else {
            return self.cant_compute();
        };
        match func.inst(inst_id).op {
            Op::IAdd(a, b) => {
                let (na, nb) = (self.analyzed[&a], self.analyzed[&b]);
                self.add(na, nb)
            }
            Op::ISub(a, b) => {
                let (na, nb) = (self.analyzed[&a], self.analyzed[&b]);
                self.subtract(na, nb)
            }
            Op::IMul(a, b) => {
                let (na, nb) = (self.analyzed[&a], self.analyzed[&b]);
                self.multiply(na, nb)
            }
            Op::SNegate(a) => {
                let na = self.analyzed[&a];
                self.negate(na)
            }
            _ => self.cant_compute(),
        }
    }

    /// Recognizes the induction pattern on a loop-header phi.
    ///
    /// A two-predecessor header phi whose back-edge value is exactly
    /// `phi + step` or `phi - step` becomes a recurrence with the entry
    /// value as offset. The phi is pre-registered as `CantCompute` before
    /// its step is analyzed; a step that reaches back to the phi therefore
    /// sees the sentinel instead of recursing into the cycle, and the
    /// pattern is rejected when the step turns out variant in this loop.
    fn visit_phi(
        &mut self,
        v: ValueId,
        inst_id: lumen_ir::InstId,
        incoming: Vec<(BlockId, ValueId)>,
        stack: &mut Vec<Frame>,
    ) {
        let cnc = self.cant_compute();
        let loops = self.loops;

        let Some(block) = self.def_use.block_of(inst_id) else {
            self.analyzed.insert(v, cnc);
            return;
        };
        let Some(lp) = loops.loop_of(block) else {
            self.analyzed.insert(v, cnc);
            return;
        };
        if lp.header != block || incoming.len() != 2 {
            self.analyzed.insert(v, cnc);
            return;
        }

        let mut entry = None;
        let mut back = None;
        for &(pred, value) in &incoming {
            if lp.contains(pred) {
                back = Some(value);
            } else {
                entry = Some(value);
            }
        }
        let (Some(entry), Some(back)) = (entry, back) else {
            self.analyzed.insert(v, cnc);
            return;
        };

        let func = self.func;
        let step = match func.defining_inst(back).map(|inst| &inst.op) {
            Some(Op::IAdd(a, b)) if *a == v => Some((*b, false)),
            Some(Op::IAdd(a, b)) if *b == v => Some((*a, false)),
            Some(Op::ISub(a, b)) if *a == v => Some((*b, true)),
            _ => None,
        };
        let Some((step, negate_step)) = step else {
            trace!(phi = v.index(), "back-edge value does not match the induction pattern");
            self.analyzed.insert(v, cnc);
            return;
        };

        let loop_header = lp.header;
        self.analyzed.insert(v, cnc);
        stack.push(Frame::FinishPhi { phi: v, loop_header, entry, step, negate_step });
        stack.push(Frame::Visit(entry));
        stack.push(Frame::Visit(step));
    }

    fn finish_phi(
        &mut self,
        phi: ValueId,
        loop_header: BlockId,
        entry: ValueId,
        step: ValueId,
        negate_step: bool,
    ) {
        let step_node = self.analyzed[&step];
        let entry_node = self.analyzed[&entry];

        // A variant step means the phi is not an affine recurrence. The
        // pre-registered CantCompute placeholder stays as the result.
        if self.contains_cant_compute(step_node)
            || self.contains_recurrence_of(step_node, loop_header)
            || self.is_cant_compute(entry_node)
        {
            trace!(phi = phi.index(), "step is variant in its own loop");
            return;
        }

        let coefficient = if negate_step { self.negate(step_node) } else { step_node };
        let node = self.intern(SeExpr::Recurrence { loop_header, coefficient, offset: entry_node });
        self.analyzed.insert(phi, node);
    }

    pub(crate) fn contains_cant_compute(&self, id: SeNodeId) -> bool {
        self.any_node(id, |expr| matches!(expr, SeExpr::CantCompute))
    }

    pub(crate) fn contains_recurrence_of(&self, id: SeNodeId, header: BlockId) -> bool {
        self.any_node(id, |expr| {
            matches!(expr, SeExpr::Recurrence { loop_header, .. } if *loop_header == header)
        })
    }

    fn any_node(&self, id: SeNodeId, pred: impl Fn(&SeExpr) -> bool) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !visited.insert(n) {
                continue;
            }
            if pred(&self.nodes[n]) {
                return true;
            }
            stack.extend(self.nodes[n].children());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LoopAnalyzer;
    use lumen_ir::FunctionBuilder;

    fn with_session(func: &Function, f: impl FnOnce(&mut ScalarEvolution<'_>)) {
        let def_use = DefUse::build(func);
        let loops = LoopAnalyzer::new().analyze(func);
        let mut se = ScalarEvolution::new(func, &def_use, &loops);
        f(&mut se);
    }

    #[test]
    fn interning_dedups_permuted_operands() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let a = se.constant(3);
            let b = se.cant_compute();
            let u = se.intern(SeExpr::Unknown(ValueId::from_usize(0)));
            let left = se.add(a, u);
            let right = se.add(u, a);
            assert_eq!(left, right);
            assert_ne!(a, b);
            // Children come back in canonical order: constants first.
            assert_eq!(se.children(left)[0], a);
        });
    }

    #[test]
    fn analysis_is_memoized_per_value() {
        let mut func = Function::new("f");
        let (x, y);
        {
            let mut b = FunctionBuilder::new(&mut func);
            let one = b.iconst(1);
            let two = b.iconst(2);
            x = b.iadd(one, two);
            y = b.iadd(one, two);
            b.ret(Some(y));
        }
        with_session(&func, |se| {
            let nx = se.analyze(x);
            assert_eq!(nx, se.analyze(x));
            // Distinct instructions with equal structure share the node.
            assert_eq!(nx, se.analyze(y));
            assert_eq!(se.kind(nx), SeKind::Add);
        });
    }

    #[test]
    fn unsupported_opcodes_are_opaque_leaves() {
        let mut func = Function::new("f");
        let div;
        {
            let mut b = FunctionBuilder::new(&mut func);
            let p = b.param(lumen_ir::Type::int32());
            let two = b.iconst(2);
            div = b.sdiv(p, two);
            b.ret(Some(div));
        }
        with_session(&func, |se| {
            let node = se.analyze(div);
            assert_eq!(se.expr(node), &SeExpr::Unknown(div));
        });
    }
}
