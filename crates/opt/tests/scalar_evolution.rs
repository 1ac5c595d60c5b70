//! Scenario tests for the scalar evolution engine, driving it the way the
//! optimizer's passes do: build a function, analyze address expressions,
//! and compare their canonical forms.

use lumen_ir::{DefUse, Function, FunctionBuilder, Op, StorageClass, Type, ValueId};
use lumen_opt::{LoopAnalyzer, LoopInfo, ScalarEvolution, SeExpr, SeKind, SeNodeId};

fn patch_phi(func: &mut Function, phi: ValueId, block: lumen_ir::BlockId, value: ValueId) {
    let inst = func.values[phi].as_inst().expect("phi is an instruction");
    let Op::Phi(incoming) = &mut func.instructions[inst].op else {
        panic!("not a phi");
    };
    incoming.push((block, value));
}

/// Builds `for (i = 0; i < 10; i += step)` around `with_body`, which
/// receives the induction variable and returns the values of interest.
/// The returned vector is the phi followed by the body's values.
fn build_counted_loop(
    func: &mut Function,
    step: i32,
    with_body: impl FnOnce(&mut FunctionBuilder<'_>, ValueId) -> Vec<ValueId>,
) -> Vec<ValueId> {
    let (phi, latch, next, values);
    {
        let mut b = FunctionBuilder::new(func);
        let entry = b.current_block();
        let header = b.create_block();
        let body = b.create_block();
        let latch_block = b.create_block();
        let exit = b.create_block();

        let zero = b.iconst(0);
        let ten = b.iconst(10);
        b.branch(header);

        b.switch_to_block(header);
        phi = b.phi(Type::int32(), vec![(entry, zero)]);
        let cond = b.slt(phi, ten);
        b.cond_branch(cond, body, exit);

        b.switch_to_block(body);
        values = with_body(&mut b, phi);
        b.branch(latch_block);

        b.switch_to_block(latch_block);
        let amount = b.iconst(step.abs());
        next = if step < 0 { b.isub(phi, amount) } else { b.iadd(phi, amount) };
        b.branch(header);

        b.switch_to_block(exit);
        b.ret(None);
        latch = latch_block;
    }
    patch_phi(func, phi, latch, next);

    let mut out = vec![phi];
    out.extend(values);
    out
}

fn analyses(func: &Function) -> (DefUse, LoopInfo) {
    (DefUse::build(func), LoopAnalyzer::new().analyze(func))
}

/// The simplified difference of two analyzed values.
fn distance(se: &mut ScalarEvolution<'_>, store: ValueId, load: ValueId) -> SeNodeId {
    let store_node = se.analyze(store);
    let load_node = se.analyze(load);
    let difference = se.subtract(store_node, load_node);
    se.simplify(difference)
}

/*
for (int i = 0; i < 10; ++i) {
    array[i] = array[i + 1];
}
*/
#[test]
fn basic_evolution_of_incremented_index() {
    let mut func = Function::new("main");
    let values = build_counted_loop(&mut func, 1, |b, i| {
        let one = b.iconst(1);
        vec![b.iadd(i, one)]
    });
    let index = values[1];

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let node = se.analyze(index);

    // Unsimplified: a sum of the recurrence and the constant.
    assert_eq!(se.kind(node), SeKind::Add);
    for child in se.children(node) {
        assert!(matches!(se.kind(child), SeKind::Constant | SeKind::Recurrence));
    }

    // Simplified: the recurrence {+1, +1}, with both children interned to
    // the very same constant node.
    let simplified = se.simplify(node);
    assert_eq!(se.kind(simplified), SeKind::Recurrence);
    let coefficient = se.coefficient(simplified).expect("recurrence");
    let offset = se.offset(simplified).expect("recurrence");
    assert_eq!(se.constant_value(coefficient), Some(1));
    assert_eq!(se.constant_value(offset), Some(1));
    assert_eq!(coefficient, offset);

    assert_eq!(se.simplify(simplified), simplified);
}

/*
for (int i = 0; i < 10; ++i) {
    array[i] = array[i + loop_invariant];
}
*/
#[test]
fn loop_invariant_offset_stays_symbolic() {
    let mut func = Function::new("main");
    let n_ptr;
    {
        let mut b = FunctionBuilder::new(&mut func);
        n_ptr = b.param(Type::ptr(StorageClass::Input, Type::int32()));
    }
    let values = build_counted_loop(&mut func, 1, |b, i| {
        let n = b.load(Type::int32(), n_ptr);
        vec![b.iadd(i, n), n]
    });
    let (index, n) = (values[1], values[2]);

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let node = se.analyze(index);
    assert_eq!(se.kind(node), SeKind::Add);

    let simplified = se.simplify(node);
    assert_eq!(se.kind(simplified), SeKind::Recurrence);
    let coefficient = se.coefficient(simplified).expect("recurrence");
    let offset = se.offset(simplified).expect("recurrence");
    assert_ne!(coefficient, offset);
    assert_eq!(se.constant_value(coefficient), Some(1));
    assert_eq!(se.expr(offset), &SeExpr::Unknown(n));
}

/*
array[0] = array[N * 2 + 4 + 5 - 24 - N - N + 48];
*/
#[test]
fn simplifies_address_arithmetic_to_constant() {
    let mut func = Function::new("main");
    let index;
    {
        let mut b = FunctionBuilder::new(&mut func);
        let n_ptr = b.param(Type::ptr(StorageClass::Input, Type::int32()));
        let n = b.load(Type::int32(), n_ptr);
        let two = b.iconst(2);
        let four = b.iconst(4);
        let five = b.iconst(5);
        let twenty_four = b.iconst(24);
        let forty_eight = b.iconst(48);
        let scaled = b.imul(n, two);
        let a = b.iadd(scaled, four);
        let a = b.iadd(a, five);
        let a = b.isub(a, twenty_four);
        let a = b.isub(a, n);
        let a = b.isub(a, n);
        index = b.iadd(a, forty_eight);
        b.ret(None);
    }

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let node = se.analyze(index);
    assert_eq!(se.kind(node), SeKind::Add);

    let simplified = se.simplify(node);
    assert_eq!(se.constant_value(simplified), Some(33));
}

/*
for (int i = 0; i < 10; ++i) {
    array[i] = array[i];
    array[i] = array[i - 1];
    array[i] = array[i + 1];
    array[i + 1] = array[i + 1];
    array[i + N] = array[i + N];
    array[i] = array[i + N];
}
*/
#[test]
fn index_distances() {
    let mut func = Function::new("main");
    let values = build_counted_loop(&mut func, 1, |b, i| {
        let one = b.iconst(1);
        let n_ptr = b.param(Type::ptr(StorageClass::Input, Type::int32()));
        let n = b.load(Type::int32(), n_ptr);
        let i_minus_1 = b.isub(i, one);
        let i_plus_1_a = b.iadd(i, one);
        let i_plus_1_b = b.iadd(i, one);
        let i_plus_n_a = b.iadd(i, n);
        let i_plus_n_b = b.iadd(i, n);
        vec![i_minus_1, i_plus_1_a, i_plus_1_b, i_plus_n_a, i_plus_n_b, n]
    });
    let i = values[0];
    let &[i_minus_1, i_plus_1_a, i_plus_1_b, i_plus_n_a, i_plus_n_b, n] = &values[1..] else {
        panic!("expected six body values");
    };

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    // [i] - [i] == 0
    let d = distance(&mut se, i, i);
    assert_eq!(se.constant_value(d), Some(0));

    // [i] - [i-1] == 1
    let d = distance(&mut se, i, i_minus_1);
    assert_eq!(se.constant_value(d), Some(1));

    // [i] - [i+1] == -1
    let d = distance(&mut se, i, i_plus_1_a);
    assert_eq!(se.constant_value(d), Some(-1));

    // [i+1] - [i+1] == 0, across two distinct instructions.
    let d = distance(&mut se, i_plus_1_a, i_plus_1_b);
    assert_eq!(se.constant_value(d), Some(0));

    // [i+N] - [i+N] == 0, with a loop-invariant symbolic N.
    let d = distance(&mut se, i_plus_n_a, i_plus_n_b);
    assert_eq!(se.constant_value(d), Some(0));

    // [i] - [i+N] == -N.
    let d = distance(&mut se, i, i_plus_n_a);
    assert_eq!(se.kind(d), SeKind::Neg);
    assert_eq!(se.expr(se.children(d)[0]), &SeExpr::Unknown(n));
}

/*
for (int i = 0; i < 10; ++i) {
    array[i * 2 + i * 5] = array[i * i * 2];
    array[i * 2] = array[i * 5];
}
*/
#[test]
fn multiply_distribution_is_compositional() {
    let mut func = Function::new("main");
    let values = build_counted_loop(&mut func, 1, |b, i| {
        let two = b.iconst(2);
        let five = b.iconst(5);
        let i2 = b.imul(i, two);
        let i5 = b.imul(i, five);
        let sum = b.iadd(i2, i5);
        let ii = b.imul(i, i);
        let ii2 = b.imul(ii, two);
        vec![sum, i2, i5, ii2]
    });
    let &[sum, i2, i5, ii2] = &values[1..] else {
        panic!("expected four body values");
    };

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    // Simplifying the whole expression at once...
    let whole = se.analyze(sum);
    let whole = se.simplify(whole);

    // ...must agree with simplifying the operands separately and then
    // combining them.
    let left = se.analyze(i2);
    let left = se.simplify(left);
    let right = se.analyze(i5);
    let right = se.simplify(right);
    let combined = se.add(left, right);
    let combined = se.simplify(combined);

    assert_eq!(combined, whole);
    assert_eq!(se.kind(whole), SeKind::Recurrence);
    let coefficient = se.coefficient(whole).expect("recurrence");
    assert_eq!(se.constant_value(coefficient), Some(7));

    // A product of the induction with itself is not affine and stays a
    // product.
    let square = se.analyze(ii2);
    let square = se.simplify(square);
    assert_eq!(se.kind(square), SeKind::Mul);

    assert_eq!(se.simplify(whole), whole);
    assert_eq!(se.simplify(square), square);
}

/*
for (int i = 0; i > -10; --i) {
    array[i] = array[i];
}
*/
#[test]
fn negative_step_recurrence() {
    let mut func = Function::new("main");
    let values = build_counted_loop(&mut func, -1, |_, _| vec![]);
    let i = values[0];

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let node = se.analyze(i);
    assert_eq!(se.kind(node), SeKind::Recurrence);
    let coefficient = se.coefficient(node).expect("recurrence");
    let offset = se.offset(node).expect("recurrence");
    assert_eq!(se.constant_value(coefficient), Some(-1));
    assert_eq!(se.constant_value(offset), Some(0));

    // Already canonical: simplification returns the identical node.
    let simplified = se.simplify(node);
    assert_eq!(simplified, node);
}

/*
int step = 0;
for (int i = 0; i < N; i += step) {
    step++;
}

The `step` phi advances by the literal 1 and resolves to a recurrence; the
`i` phi advances by a value that varies in the same loop and cannot be
computed.
*/
#[test]
fn variant_step_phi_pair() {
    let mut func = Function::new("main");
    let (step_phi, i_phi);
    {
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.current_block();
        let header = b.create_block();
        let body = b.create_block();
        let latch = b.create_block();
        let exit = b.create_block();

        let zero = b.iconst(0);
        let one = b.iconst(1);
        let bound = b.iconst(100);
        b.branch(header);

        b.switch_to_block(header);
        step_phi = b.phi(Type::int32(), vec![(entry, zero)]);
        i_phi = b.phi(Type::int32(), vec![(entry, zero)]);
        let cond = b.slt(i_phi, bound);
        b.cond_branch(cond, body, exit);

        b.switch_to_block(body);
        let next_step = b.iadd(step_phi, one);
        b.branch(latch);

        b.switch_to_block(latch);
        let next_i = b.iadd(i_phi, next_step);
        b.branch(header);

        b.switch_to_block(exit);
        b.ret(None);

        patch_phi(b.func_mut(), step_phi, latch, next_step);
        patch_phi(b.func_mut(), i_phi, latch, next_i);
    }

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let step_node = se.analyze(step_phi);
    let i_node = se.analyze(i_phi);

    assert_eq!(se.kind(step_node), SeKind::Recurrence);
    assert_eq!(se.kind(i_node), SeKind::CantCompute);

    let step_simplified = se.simplify(step_node);
    assert_eq!(se.kind(step_simplified), SeKind::Recurrence);
    let simplified = se.simplify(i_node);
    assert_eq!(se.kind(simplified), SeKind::CantCompute);
    assert_eq!(simplified, i_node);
}

/*
Differences of already-simplified recurrences with symbolic parts:
store = i + 2*N, load = i + N, with a down-counting i.
*/
#[test]
fn recurrence_difference_leaves_the_symbolic_part() {
    let mut func = Function::new("main");
    let values = build_counted_loop(&mut func, -1, |b, i| {
        let two = b.iconst(2);
        let n_ptr = b.param(Type::ptr(StorageClass::Input, Type::int32()));
        let n = b.load(Type::int32(), n_ptr);
        let two_n = b.imul(two, n);
        let store = b.iadd(i, two_n);
        let load = b.iadd(i, n);
        vec![store, load, n]
    });
    let &[store, load, n] = &values[1..] else {
        panic!("expected three body values");
    };

    let (def_use, loops) = analyses(&func);
    let mut se = ScalarEvolution::new(&func, &def_use, &loops);

    let store_node = se.analyze(store);
    let store_node = se.simplify(store_node);
    let load_node = se.analyze(load);
    let load_node = se.simplify(load_node);

    // (i + 2N) - (i + N) == N
    let difference = se.subtract(store_node, load_node);
    let difference = se.simplify(difference);
    assert_eq!(se.expr(difference), &SeExpr::Unknown(n));

    // (i + N) - (i + 2N) == -N, sharing the node above.
    let inverse = se.subtract(load_node, store_node);
    let inverse = se.simplify(inverse);
    assert_eq!(se.kind(inverse), SeKind::Neg);
    assert_eq!(se.children(inverse)[0], difference);
}
