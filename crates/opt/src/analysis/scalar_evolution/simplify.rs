//! Canonicalization of scalar-evolution expressions.
//!
//! [`ScalarEvolution::simplify`] rewrites a node bottom-up into a minimal
//! canonical form: constants fold with 32-bit wraparound, nested sums and
//! products flatten into sorted n-ary nodes, loop-invariant addends fold
//! into recurrence offsets, same-loop recurrences merge, and structurally
//! opposite terms cancel. The result is interned, so canonical forms of
//! equal expressions are the same node id.

use super::{ScalarEvolution, SeExpr, SeNodeId, add32, mul32, neg32, wrap32};
use lumen_ir::BlockId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Accumulates a signed multiplicity for a term, keeping first-seen order.
fn add_count(
    order: &mut Vec<SeNodeId>,
    counts: &mut FxHashMap<SeNodeId, i64>,
    id: SeNodeId,
    delta: i64,
) {
    if let Some(count) = counts.get_mut(&id) {
        *count = add32(*count, delta);
    } else {
        counts.insert(id, wrap32(delta));
        order.push(id);
    }
}

impl ScalarEvolution<'_> {
    /// Rewrites `node` into canonical minimal form.
    ///
    /// Idempotent and pure with respect to the store: simplifying the result
    /// again returns the identical node. Traversal is an explicit post-order
    /// worklist, so long arithmetic chains do not exhaust the stack.
    pub fn simplify(&mut self, node: SeNodeId) -> SeNodeId {
        let mut stack = vec![node];
        while let Some(&n) = stack.last() {
            if self.simplified.contains_key(&n) {
                stack.pop();
                continue;
            }
            let pending: SmallVec<[SeNodeId; 4]> = self
                .nodes[n]
                .children()
                .into_iter()
                .filter(|child| !self.simplified.contains_key(child))
                .collect();
            if pending.is_empty() {
                let result = self.rewrite(n);
                self.simplified.insert(n, result);
                self.simplified.entry(result).or_insert(result);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        self.simplified[&node]
    }

    /// Applies the kind-specific rules to a node whose children are all
    /// simplified.
    fn rewrite(&mut self, n: SeNodeId) -> SeNodeId {
        match self.nodes[n].clone() {
            SeExpr::Constant(_) | SeExpr::Unknown(_) | SeExpr::CantCompute => n,
            SeExpr::Neg(child) => {
                let child = self.simplified[&child];
                self.rewrite_neg(child)
            }
            SeExpr::Add(children) => {
                let terms = children.iter().map(|child| (self.simplified[child], 1)).collect();
                self.rewrite_sum(terms, 0)
            }
            SeExpr::Mul(children) => {
                let factors: Vec<SeNodeId> =
                    children.iter().map(|child| self.simplified[child]).collect();
                self.rewrite_product(&factors, 1)
            }
            SeExpr::Recurrence { loop_header, coefficient, offset } => {
                let coefficient = self.simplified[&coefficient];
                let offset = self.simplified[&offset];
                self.make_recurrence(loop_header, coefficient, offset)
            }
        }
    }

    /// Canonical negation of an already-simplified node. Negation of a sum
    /// distributes over its terms so that every sum has a single canonical
    /// spelling.
    fn rewrite_neg(&mut self, x: SeNodeId) -> SeNodeId {
        match self.nodes[x].clone() {
            SeExpr::CantCompute => x,
            SeExpr::Constant(value) => self.constant_simplified(neg32(value)),
            SeExpr::Neg(child) => child,
            SeExpr::Add(children) => {
                let terms = children.iter().map(|&child| (child, -1)).collect();
                self.rewrite_sum(terms, 0)
            }
            SeExpr::Mul(_) | SeExpr::Recurrence { .. } => self.rewrite_product(&[x], -1),
            SeExpr::Unknown(_) => self.intern_simplified(SeExpr::Neg(x)),
        }
    }

    /// Canonical sum of signed terms plus a constant. All term nodes must
    /// already be simplified.
    ///
    /// Terms are gathered through nested sums and negations into a constant
    /// accumulator, a multiplicity per non-recurrent term, and per-loop
    /// recurrence groups. Recurrences of the same loop merge coefficient-
    /// and offset-wise; a merged coefficient of zero degenerates the group
    /// into its offset, which re-enters the gather.
    fn rewrite_sum(&mut self, initial: Vec<(SeNodeId, i64)>, init_const: i64) -> SeNodeId {
        let mut pending = initial;
        let mut const_acc = wrap32(init_const);
        let mut order: Vec<SeNodeId> = Vec::new();
        let mut counts: FxHashMap<SeNodeId, i64> = FxHashMap::default();
        let mut rec_order: Vec<BlockId> = Vec::new();
        type RecTerms = (Vec<(SeNodeId, i64)>, Vec<(SeNodeId, i64)>);
        let mut rec_terms: FxHashMap<BlockId, RecTerms> = FxHashMap::default();

        loop {
            while let Some((id, sign)) = pending.pop() {
                match self.nodes[id].clone() {
                    SeExpr::CantCompute => return self.intern_simplified(SeExpr::CantCompute),
                    SeExpr::Constant(value) => const_acc = add32(const_acc, mul32(sign, value)),
                    SeExpr::Add(children) => {
                        pending.extend(children.iter().map(|&child| (child, sign)));
                    }
                    SeExpr::Neg(child) => pending.push((child, neg32(sign))),
                    SeExpr::Mul(children) => {
                        // A canonical product carries at most one constant,
                        // sorted first; it contributes to the multiplicity
                        // of the residual product.
                        if let SeExpr::Constant(k) = self.nodes[children[0]] {
                            let rest = &children[1..];
                            let key = if let [single] = rest {
                                *single
                            } else {
                                self.intern_simplified(SeExpr::Mul(rest.iter().copied().collect()))
                            };
                            add_count(&mut order, &mut counts, key, mul32(sign, k));
                        } else {
                            add_count(&mut order, &mut counts, id, sign);
                        }
                    }
                    SeExpr::Recurrence { loop_header, coefficient, offset } => {
                        let group = rec_terms.entry(loop_header).or_insert_with(|| {
                            rec_order.push(loop_header);
                            Default::default()
                        });
                        group.0.push((coefficient, sign));
                        group.1.push((offset, sign));
                    }
                    SeExpr::Unknown(_) => add_count(&mut order, &mut counts, id, sign),
                }
            }

            let mut degenerate = None;
            for &header in &rec_order {
                let coef_terms = rec_terms[&header].0.clone();
                let coefficient = self.rewrite_sum(coef_terms, 0);
                if self.constant_value(coefficient) == Some(0) {
                    degenerate = Some(header);
                    break;
                }
            }
            match degenerate {
                Some(header) => {
                    let Some((_, offsets)) = rec_terms.remove(&header) else { break };
                    rec_order.retain(|&h| h != header);
                    let offset = self.rewrite_sum(offsets, 0);
                    pending.push((offset, 1));
                }
                None => break,
            }
        }

        let mut groups: Vec<(BlockId, SeNodeId, SeNodeId)> = Vec::new();
        for header in rec_order {
            let Some((coefs, offsets)) = rec_terms.remove(&header) else { continue };
            let coefficient = self.rewrite_sum(coefs, 0);
            let offset = self.rewrite_sum(offsets, 0);
            groups.push((header, coefficient, offset));
        }

        let mut terms: Vec<SeNodeId> = Vec::new();
        for id in order {
            match wrap32(counts[&id]) {
                0 => {}
                1 => terms.push(id),
                count => {
                    let scaled = self.rewrite_product(&[id], count);
                    terms.push(scaled);
                }
            }
        }

        match groups.len() {
            0 => {
                if const_acc != 0 || terms.is_empty() {
                    let constant = self.constant_simplified(const_acc);
                    if terms.is_empty() {
                        return constant;
                    }
                    terms.push(constant);
                }
                if let [term] = terms.as_slice() {
                    *term
                } else {
                    self.intern_simplified(SeExpr::Add(terms.into_iter().collect()))
                }
            }
            1 => {
                // Fold the invariant remainder into the recurrence offset.
                // Terms still referring to this loop's recurrence (through an
                // unresolved product) are not invariant and stay siblings.
                let (header, coefficient, offset) = groups[0];
                let (clean, dirty): (Vec<_>, Vec<_>) = terms
                    .into_iter()
                    .partition(|&term| !self.contains_recurrence_of(term, header));
                let mut off_terms: Vec<(SeNodeId, i64)> = vec![(offset, 1)];
                off_terms.extend(clean.into_iter().map(|term| (term, 1)));
                let new_offset = self.rewrite_sum(off_terms, const_acc);
                let rec = self.make_recurrence(header, coefficient, new_offset);
                if dirty.is_empty() {
                    rec
                } else {
                    let mut children: SmallVec<[SeNodeId; 2]> = dirty.into_iter().collect();
                    children.push(rec);
                    self.intern_simplified(SeExpr::Add(children))
                }
            }
            _ => {
                // Recurrences over different loops do not distribute.
                for &(header, coefficient, offset) in &groups {
                    let rec = self.make_recurrence(header, coefficient, offset);
                    terms.push(rec);
                }
                if const_acc != 0 {
                    let constant = self.constant_simplified(const_acc);
                    terms.push(constant);
                }
                if let [term] = terms.as_slice() {
                    *term
                } else {
                    self.intern_simplified(SeExpr::Add(terms.into_iter().collect()))
                }
            }
        }
    }

    /// Canonical product of factors and a constant. All factor nodes must
    /// already be simplified.
    ///
    /// Factors flatten through nested products and negations; a constant
    /// scales an affine recurrence into its coefficient and offset, while a
    /// product involving a recurrence and a non-constant stays unresolved.
    pub(crate) fn rewrite_product(&mut self, factors: &[SeNodeId], init_const: i64) -> SeNodeId {
        let mut const_acc = wrap32(init_const);
        let mut rest: Vec<SeNodeId> = Vec::new();
        let mut recs: Vec<SeNodeId> = Vec::new();
        let mut stack: Vec<SeNodeId> = factors.to_vec();
        while let Some(id) = stack.pop() {
            match self.nodes[id].clone() {
                SeExpr::CantCompute => return self.intern_simplified(SeExpr::CantCompute),
                SeExpr::Constant(value) => const_acc = mul32(const_acc, value),
                SeExpr::Mul(children) => stack.extend(children),
                SeExpr::Neg(child) => {
                    const_acc = neg32(const_acc);
                    stack.push(child);
                }
                SeExpr::Recurrence { .. } => recs.push(id),
                SeExpr::Unknown(_) | SeExpr::Add(_) => rest.push(id),
            }
        }

        if const_acc == 0 {
            return self.constant_simplified(0);
        }

        if rest.is_empty()
            && let [rec] = recs.as_slice()
        {
            let rec = *rec;
            if const_acc == 1 {
                return rec;
            }
            if let SeExpr::Recurrence { loop_header, coefficient, offset } = self.nodes[rec].clone()
            {
                let coefficient = self.rewrite_product(&[coefficient], const_acc);
                let offset = self.rewrite_product(&[offset], const_acc);
                return self.make_recurrence(loop_header, coefficient, offset);
            }
        }

        rest.extend(recs);
        if rest.is_empty() {
            return self.constant_simplified(const_acc);
        }

        match const_acc {
            1 => {
                if let [factor] = rest.as_slice() {
                    *factor
                } else {
                    self.intern_simplified(SeExpr::Mul(rest.into_iter().collect()))
                }
            }
            -1 => {
                if let [factor] = rest.as_slice() {
                    let factor = *factor;
                    self.rewrite_neg(factor)
                } else {
                    let inner = self.intern_simplified(SeExpr::Mul(rest.into_iter().collect()));
                    self.intern_simplified(SeExpr::Neg(inner))
                }
            }
            _ => {
                let constant = self.constant_simplified(const_acc);
                rest.push(constant);
                self.intern_simplified(SeExpr::Mul(rest.into_iter().collect()))
            }
        }
    }

    /// Builds a simplified recurrence, applying absorption and collapsing a
    /// zero coefficient to the bare offset.
    pub(crate) fn make_recurrence(
        &mut self,
        loop_header: BlockId,
        coefficient: SeNodeId,
        offset: SeNodeId,
    ) -> SeNodeId {
        if self.is_cant_compute(coefficient) || self.is_cant_compute(offset) {
            return self.intern_simplified(SeExpr::CantCompute);
        }
        if self.constant_value(coefficient) == Some(0) {
            return offset;
        }
        self.intern_simplified(SeExpr::Recurrence { loop_header, coefficient, offset })
    }

    /// Interns an expression produced by a rewrite. The result is canonical
    /// by construction, so it is its own simplification.
    fn intern_simplified(&mut self, expr: SeExpr) -> SeNodeId {
        let id = self.intern(expr);
        self.simplified.entry(id).or_insert(id);
        id
    }

    fn constant_simplified(&mut self, value: i64) -> SeNodeId {
        self.intern_simplified(SeExpr::Constant(wrap32(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LoopAnalyzer, SeKind};
    use lumen_ir::{DefUse, Function};

    fn with_session(func: &Function, f: impl FnOnce(&mut ScalarEvolution<'_>)) {
        let def_use = DefUse::build(func);
        let loops = LoopAnalyzer::new().analyze(func);
        let mut se = ScalarEvolution::new(func, &def_use, &loops);
        f(&mut se);
    }

    #[test]
    fn constants_fold_with_wraparound() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let a = se.constant(i32::MAX as i64);
            let b = se.constant(1);
            let sum = se.add(a, b);
            let folded = se.simplify(sum);
            assert_eq!(se.constant_value(folded), Some(i32::MIN as i64));

            let product = se.multiply(a, b);
            let folded = se.simplify(product);
            assert_eq!(se.constant_value(folded), Some(i32::MAX as i64));
        });
    }

    #[test]
    fn nested_sums_flatten_and_cancel() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let u = se.intern(SeExpr::Unknown(lumen_ir::ValueId::from_usize(7)));
            let two = se.constant(2);
            let three = se.constant(3);
            let inner = se.add(u, two);
            let outer = se.add(inner, three);
            let all = se.simplify(outer);
            // (u + 2) + 3 flattens into one sorted sum with a folded constant.
            assert_eq!(se.kind(all), SeKind::Add);
            let children = se.children(all);
            assert_eq!(children.len(), 2);
            assert_eq!(se.constant_value(children[0]), Some(5));
            assert_eq!(children[1], u);

            let diff = se.subtract(outer, outer);
            let zero = se.simplify(diff);
            assert_eq!(se.constant_value(zero), Some(0));
        });
    }

    #[test]
    fn double_negation_vanishes() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let u = se.intern(SeExpr::Unknown(lumen_ir::ValueId::from_usize(0)));
            let neg = se.negate(u);
            let back = se.negate(neg);
            let simplified = se.simplify(back);
            assert_eq!(simplified, u);
        });
    }

    #[test]
    fn negation_of_a_sum_has_one_spelling() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let u = se.intern(SeExpr::Unknown(lumen_ir::ValueId::from_usize(0)));
            let one = se.constant(1);
            let sum = se.add(u, one);
            let negated = se.negate(sum);
            let a = se.simplify(negated);

            // 0 - u - 1, assembled differently, lands on the same node.
            let zero = se.constant(0);
            let partial = se.subtract(zero, u);
            let again = se.subtract(partial, one);
            let b = se.simplify(again);
            assert_eq!(a, b);
        });
    }

    #[test]
    fn cant_compute_absorbs() {
        let func = Function::new("f");
        with_session(&func, |se| {
            let cnc = se.cant_compute();
            let one = se.constant(1);
            let sum = se.add(cnc, one);
            let product = se.multiply(sum, one);
            let simplified = se.simplify(product);
            assert!(se.is_cant_compute(simplified));
            assert_eq!(se.simplify(cnc), cnc);
        });
    }
}
