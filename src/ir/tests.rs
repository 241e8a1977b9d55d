use super::*;

fn new_func() -> Function {
    Function::new("f".to_string(), PtrLayout::new(64, 16, 48))
}

#[test]
fn comparison_results_are_one_bit() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    for op in [Op::Eq, Op::Ne, Op::Slt, Op::Uge, Op::SaddWraps, Op::SmulWraps] {
        let inst = func.build_inst2(bb, op, a, b);
        assert_eq!(func.inst(inst).bitsize, 1);
    }
}

#[test]
fn concat_width_is_sum_of_arguments() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 8);
    let b = func.value_inst(2, 24);
    let c = func.build_inst2(bb, Op::Concat, a, b);
    assert_eq!(func.inst(c).bitsize, 32);
}

#[test]
fn extract_width() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(0x1234, 32);
    let hi = func.value_inst(15, 32);
    let lo = func.value_inst(8, 32);
    let e = func.build_inst3(bb, Op::Extract, a, hi, lo);
    assert_eq!(func.inst(e).bitsize, 8);
}

#[test]
fn values_are_interned_per_width() {
    let mut func = new_func();
    func.build_bb();
    let a = func.value_inst(42, 32);
    let b = func.value_inst(42, 32);
    let c = func.value_inst(42, 64);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn values_are_normalized_modulo_width() {
    let mut func = new_func();
    func.build_bb();
    let a = func.value_inst(u128::MAX, 8);
    let b = func.value_inst(255, 8);
    assert_eq!(a, b);
    assert_eq!(func.inst(a).value(), 255);
}

#[test]
fn wide_value_becomes_concat_chain() {
    let mut func = new_func();
    func.build_bb();
    let v = func.value_inst(7, 129);
    let inst = func.inst(v);
    assert_eq!(inst.op, Op::Concat);
    assert_eq!(inst.bitsize, 129);
    // The CONCAT itself is not interned.
    assert!(!func.value_map().values().any(|&id| id == v));
}

#[test]
fn value_m1_is_all_ones() {
    let mut func = new_func();
    func.build_bb();
    let v = func.value_m1_inst(16);
    assert_eq!(func.inst(v).value(), 0xffff);
    let wide = func.value_m1_inst(130);
    assert_eq!(func.inst(wide).op, Op::Concat);
    assert_eq!(func.inst(wide).bitsize, 130);
}

#[test]
fn values_stay_in_entry_prefix() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    func.build_inst2(bb, Op::Add, a, b);
    // A later literal is placed before the ADD.
    let c = func.value_inst(3, 32);
    let insts = &func.bb(bb).insts;
    let pos_add = insts
        .iter()
        .position(|&i| func.inst(i).op == Op::Add)
        .unwrap();
    let pos_c = insts.iter().position(|&i| i == c).unwrap();
    assert!(pos_c < pos_add);
    for &i in &insts[..3] {
        assert_eq!(func.inst(i).op, Op::Value);
    }
}

#[test]
fn operands_track_their_users() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    let add = func.build_inst2(bb, Op::Add, a, b);
    assert!(func.inst(a).used_by.contains(&add));
    assert!(func.inst(b).used_by.contains(&add));
}

#[test]
fn replace_all_uses_rewrites_args_and_use_lists() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    let c = func.value_inst(3, 32);
    let add = func.build_inst2(bb, Op::Add, a, b);
    func.replace_all_uses_with(a, c);
    assert_eq!(func.inst(add).args(), vec![c, b]);
    assert!(func.inst(a).used_by.is_empty());
    assert!(func.inst(c).used_by.contains(&add));
}

#[test]
fn destroy_inst_unlinks_operands() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    let add = func.build_inst2(bb, Op::Add, a, b);
    func.destroy_inst(add);
    assert!(func.inst(a).used_by.is_empty());
    assert!(!func.bb(bb).insts.contains(&add));
}

#[test]
fn destroy_value_removes_interning() {
    let mut func = new_func();
    func.build_bb();
    let a = func.value_inst(7, 32);
    func.destroy_inst(a);
    assert!(func.value_map().is_empty());
    // Re-creating the literal gives a fresh instruction.
    let b = func.value_inst(7, 32);
    assert_ne!(a, b);
}

#[test]
fn terminator_insertion_updates_edges() {
    let mut func = new_func();
    let bb0 = func.build_bb();
    let bb1 = func.build_bb();
    let bb2 = func.build_bb();
    let cond = func.value_inst(1, 1);
    func.build_cond_br(bb0, cond, bb1, bb2);
    assert_eq!(func.bb(bb0).succs, vec![bb1, bb2]);
    assert_eq!(func.bb(bb1).preds, vec![bb0]);
    assert_eq!(func.bb(bb2).preds, vec![bb0]);
}

#[test]
fn non_terminators_insert_before_terminator() {
    let mut func = new_func();
    let bb0 = func.build_bb();
    let bb1 = func.build_bb();
    func.build_br(bb0, bb1);
    let a = func.value_inst(1, 32);
    let neg = func.build_inst1(bb0, Op::Neg, a);
    let insts = &func.bb(bb0).insts;
    let pos_neg = insts.iter().position(|&i| i == neg).unwrap();
    assert_eq!(func.inst(*insts.last().unwrap()).op, Op::Br);
    assert!(pos_neg < insts.len() - 1);
}

#[test]
fn phi_argument_maintenance() {
    let mut func = new_func();
    let bb0 = func.build_bb();
    let bb1 = func.build_bb();
    let bb2 = func.build_bb();
    let bb3 = func.build_bb();
    let cond = func.value_inst(1, 1);
    func.build_cond_br(bb0, cond, bb1, bb2);
    func.build_br(bb1, bb3);
    func.build_br(bb2, bb3);

    let a = func.value_inst(10, 32);
    let b = func.value_inst(20, 32);
    let phi = func.build_phi(bb3, 32);
    func.add_phi_arg(phi, a, bb1);
    func.add_phi_arg(phi, b, bb2);
    assert_eq!(func.get_phi_arg(phi, bb1), a);
    assert_eq!(func.get_phi_arg(phi, bb2), b);
    assert!(func.inst(a).used_by.contains(&phi));

    func.remove_phi_arg(phi, bb1);
    assert!(!func.inst(a).used_by.contains(&phi));
    assert!(func.inst(b).used_by.contains(&phi));
    func.remove_phi_args(phi);
    assert!(func.inst(phi).phi_args().is_empty());
    assert!(func.inst(b).used_by.is_empty());
}

#[test]
fn duplicated_phi_argument_keeps_use() {
    let mut func = new_func();
    let bb0 = func.build_bb();
    let bb1 = func.build_bb();
    let bb2 = func.build_bb();
    let bb3 = func.build_bb();
    let cond = func.value_inst(1, 1);
    func.build_cond_br(bb0, cond, bb1, bb2);
    func.build_br(bb1, bb3);
    func.build_br(bb2, bb3);

    let a = func.value_inst(10, 32);
    let phi = func.build_phi(bb3, 32);
    func.add_phi_arg(phi, a, bb1);
    func.add_phi_arg(phi, a, bb2);
    func.remove_phi_arg(phi, bb1);
    // Still used through the other argument.
    assert!(func.inst(a).used_by.contains(&phi));
}

#[test]
fn extract_helpers() {
    let mut func = new_func();
    let bb = func.build_bb();
    let ptr = func.value_inst(0x0001_0000_0000_1234, 64);
    let id = func.build_extract_id(bb, ptr);
    assert_eq!(func.inst(id).bitsize, 16);
    let off = func.build_extract_offset(bb, ptr);
    assert_eq!(func.inst(off).bitsize, 48);
    let bit = func.build_extract_bit(bb, ptr, 2);
    assert_eq!(func.inst(bit).bitsize, 1);
    let trunc = func.build_trunc(bb, ptr, 8);
    assert_eq!(func.inst(trunc).bitsize, 8);
    // Truncation to the same width is the identity.
    assert_eq!(func.build_trunc(bb, ptr, 64), ptr);
}

#[test]
fn canonicalize_sorts_commutative_args_and_renumbers() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    // Force the higher-id value first.
    let add = func.build_inst2(bb, Op::Add, b, a);
    func.build_ret1(bb, add);
    func.canonicalize();
    let args = func.inst(add).args();
    assert!(func.inst(args[0]).id < func.inst(args[1]).id);

    // Ids are a dense prefix in block order.
    let mut expected = 0;
    for &bb in &func.bb_order {
        for &i in func.bb(bb).phis.iter().chain(func.bb(bb).insts.iter()) {
            assert_eq!(func.inst(i).id, expected);
            expected += 1;
        }
    }
}

#[test]
fn canonicalize_is_idempotent() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(2, 32);
    let add = func.build_inst2(bb, Op::Add, b, a);
    let mul = func.build_inst2(bb, Op::Mul, add, a);
    func.build_ret1(bb, mul);
    func.canonicalize();
    let once = func.to_string();
    func.canonicalize();
    assert_eq!(once, func.to_string());
}

#[test]
fn print_format() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let b = func.value_inst(0x12345, 32);
    let add = func.build_inst2(bb, Op::Add, a, b);
    func.build_ret1(bb, add);
    func.canonicalize();
    let text = func.to_string();
    assert!(text.starts_with("function f\n.0:\n"));
    assert!(text.contains("%0 = value 1, 32"));
    assert!(text.contains("%1 = value 0x00012345, 32"));
    assert!(text.contains("%2 = add %0, %1"));
    assert!(text.contains("ret %2"));
}

#[test]
fn validate_accepts_wellformed_function() {
    let mut func = new_func();
    let bb0 = func.build_bb();
    let bb1 = func.build_bb();
    let a = func.value_inst(1, 32);
    func.build_br(bb0, bb1);
    func.build_ret1(bb1, a);
    validate(&func);
}

#[test]
#[should_panic]
fn validate_rejects_missing_terminator() {
    let mut func = new_func();
    let bb = func.build_bb();
    func.value_inst(1, 32);
    let _ = bb;
    validate(&func);
}

#[test]
#[should_panic]
fn zext_must_widen() {
    let mut func = new_func();
    let bb = func.build_bb();
    let a = func.value_inst(1, 32);
    let w = func.value_inst(32, 32);
    func.build_inst2(bb, Op::Zext, a, w);
}
