use super::*;
use crate::ir::{validate, PtrLayout};

fn new_func() -> Function {
    Function::new("f".to_string(), PtrLayout::new(64, 16, 48))
}

/// entry -> (left | right) -> exit
fn diamond() -> (Function, [BlockId; 4]) {
    let mut func = new_func();
    let entry = func.build_bb();
    let left = func.build_bb();
    let right = func.build_bb();
    let exit = func.build_bb();
    let cond = func.value_inst(1, 1);
    func.build_cond_br(entry, cond, left, right);
    func.build_br(left, exit);
    func.build_br(right, exit);
    func.build_ret0(exit);
    (func, [entry, left, right, exit])
}

#[test]
fn rpo_orders_entry_first_exit_last() {
    let (mut func, [entry, _, _, exit]) = diamond();
    reverse_post_order(&mut func).unwrap();
    assert_eq!(func.bb_order.first(), Some(&entry));
    assert_eq!(func.bb_order.last(), Some(&exit));
    assert_eq!(func.bb_order.len(), 4);
    validate(&func);
}

#[test]
fn rpo_removes_unreachable_blocks() {
    let (mut func, [_, _, _, exit]) = diamond();
    // A block branching into the exit but reachable from nowhere.
    let dead = func.build_bb();
    let v = func.value_inst(42, 32);
    func.build_inst1(dead, Op::Neg, v);
    func.build_br(dead, exit);
    let phi = func.build_phi(exit, 32);
    for pred in func.bb(exit).preds.clone() {
        func.add_phi_arg(phi, v, pred);
    }

    reverse_post_order(&mut func).unwrap();
    assert_eq!(func.bb_order.len(), 4);
    assert!(!func.bb_order.contains(&dead));
    // The phi argument for the dead edge is gone.
    assert_eq!(func.inst(phi).phi_args().len(), 2);
    validate(&func);
}

#[test]
fn unreachable_exit_is_reported() {
    let mut func = new_func();
    let entry = func.build_bb();
    let looping = func.build_bb();
    let exit = func.build_bb();
    func.build_br(entry, looping);
    func.build_br(looping, looping);
    func.build_ret0(exit);
    assert_eq!(reverse_post_order(&mut func), Err(Error::UnreachableExit));
}

#[test]
fn loop_detection() {
    let (mut func, _) = diamond();
    reverse_post_order(&mut func).unwrap();
    assert!(!has_loops(&func));

    let mut func2 = new_func();
    let entry = func2.build_bb();
    let header = func2.build_bb();
    let exit = func2.build_bb();
    func2.build_br(entry, header);
    let cond = func2.value_inst(1, 1);
    func2.build_cond_br(header, cond, header, exit);
    func2.build_ret0(exit);
    assert!(has_loops(&func2));
}

#[test]
fn dominators_of_a_diamond() {
    let (mut func, [entry, left, right, exit]) = diamond();
    reverse_post_order(&mut func).unwrap();

    assert!(dominates(&func, entry, entry));
    assert!(dominates(&func, entry, left));
    assert!(dominates(&func, entry, exit));
    assert!(!dominates(&func, left, exit));
    assert!(!dominates(&func, left, right));

    assert!(post_dominates(&func, exit, entry));
    assert!(post_dominates(&func, exit, left));
    assert!(!post_dominates(&func, left, entry));
}

#[test]
fn dominance_is_transitive() {
    let mut func = new_func();
    let a = func.build_bb();
    let b = func.build_bb();
    let c = func.build_bb();
    func.build_br(a, b);
    func.build_br(b, c);
    func.build_ret0(c);
    reverse_post_order(&mut func).unwrap();
    assert!(dominates(&func, a, b));
    assert!(dominates(&func, b, c));
    assert!(dominates(&func, a, c));
}

#[test]
fn nearest_dominator_of_join_block() {
    let (mut func, [entry, _, _, exit]) = diamond();
    reverse_post_order(&mut func).unwrap();
    assert_eq!(nearest_dominator(&func, exit), Some(entry));
    assert_eq!(nearest_dominator(&func, entry), None);
}

#[test]
fn simplify_cfg_folds_constant_branches() {
    let (mut func, [entry, left, right, exit]) = diamond();
    let v1 = func.value_inst(10, 32);
    let v2 = func.value_inst(20, 32);
    let phi = func.build_phi(exit, 32);
    func.add_phi_arg(phi, v1, left);
    func.add_phi_arg(phi, v2, right);

    // The branch condition is the literal 1, so the false side dies.
    simplify_cfg(&mut func).unwrap();

    assert_eq!(func.bb_order.len(), 3);
    assert!(!func.bb_order.contains(&right));
    assert_eq!(func.inst(phi).phi_args().len(), 1);
    assert_eq!(func.inst(phi).phi_args()[0].inst, v1);
    let term = func.terminator(entry).unwrap();
    assert!(matches!(func.inst(term).kind, InstKind::Br { .. }));
    validate(&func);
}

#[test]
fn simplify_cfg_keeps_non_constant_branches() {
    let mut func = new_func();
    let entry = func.build_bb();
    let left = func.build_bb();
    let right = func.build_bb();
    let exit = func.build_bb();
    let idx = func.value_inst(0, 32);
    let w = func.value_inst(1, 32);
    let sym = func.build_inst2(entry, Op::Symbolic, idx, w);
    let zero = func.value_inst(0, 1);
    let cond = func.build_inst2(entry, Op::Ne, sym, zero);
    func.build_cond_br(entry, cond, left, right);
    func.build_br(left, exit);
    func.build_br(right, exit);
    func.build_ret0(exit);

    simplify_cfg(&mut func).unwrap();
    assert_eq!(func.bb_order.len(), 4);
    validate(&func);
}
