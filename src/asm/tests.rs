use super::*;
use crate::ir::validate;

/// A module holding a hand-built source function `int foo(int x)`.
fn module_with_src(ret_bits: u32) -> Module {
    let mut module = crate::convert::create_module(64);
    let mut func = Function::new("foo".to_string(), module.ptr);
    let bb = func.build_bb();
    let nbr = func.value_inst(0, 32);
    let width = func.value_inst(ret_bits as u128, 32);
    let x = func.build_inst2(bb, Op::Param, nbr, width);
    func.build_ret1(bb, x);
    module.functions.push(func);
    module
}

fn count_op(func: &Function, op: Op) -> usize {
    func.bb_order
        .iter()
        .map(|&bb| {
            func.bb(bb)
                .insts
                .iter()
                .filter(|&&i| func.inst(i).op == op)
                .count()
        })
        .sum()
}

#[test]
fn parse_straight_line_function() {
    let mut module = module_with_src(32);
    let text = "\
\t.text
foo:
\taddw\ta0,a0,a0
\tret
\t.size\tfoo, .-foo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    assert_eq!(tgt.name, "tgt");
    validate(tgt);

    // The register file and the widened parameter.
    assert_eq!(count_op(tgt, Op::Register), 32);
    assert_eq!(count_op(tgt, Op::Param), 1);
    // Parameter write plus the addw result write.
    assert_eq!(count_op(tgt, Op::Write), 2);
    // addw reads a0 twice; the exit block reads it once more.
    assert_eq!(count_op(tgt, Op::Read), 3);
    assert_eq!(count_op(tgt, Op::Add), 1);
    // addw truncates both inputs and sign-extends the result; the
    // sub-word parameter is extended too.
    assert_eq!(count_op(tgt, Op::Sext), 2);
    assert_eq!(count_op(tgt, Op::Ret), 1);

    // The return value is truncated to the source return width.
    let exit = tgt.exit();
    let ret = tgt.terminator(exit).unwrap();
    let retval = tgt.inst(ret).args()[0];
    assert_eq!(tgt.inst(retval).bitsize, 32);
}

#[test]
fn unsigned_parameters_are_zero_extended() {
    let mut module = module_with_src(16);
    let text = "\
foo:
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[true], text).unwrap();
    let tgt = &module.functions[idx];
    assert_eq!(count_op(tgt, Op::Zext), 1);
    assert_eq!(count_op(tgt, Op::Sext), 0);
}

#[test]
fn branches_split_blocks() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tbeq\ta0,a1,.L2
\tli\ta0,0
.L2:
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    validate(tgt);
    // entry, first body block, branch fall-through, .L2, exit.
    assert_eq!(tgt.bb_order.len(), 5);
    assert_eq!(count_op(tgt, Op::Eq), 1);
    // `zero` is folded to a literal, so `li` writes a plain value.
    assert_eq!(count_op(tgt, Op::Write), 2);
}

#[test]
fn jump_closes_the_block() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tj\t.L3
.L3:
\tmv\ta0,a1
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    validate(tgt);
    assert_eq!(count_op(tgt, Op::Read), 2);
}

#[test]
fn ebreak_is_ub_and_returns() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tebreak
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    validate(tgt);
    assert_eq!(count_op(tgt, Op::Ub), 1);
    assert_eq!(count_op(tgt, Op::Ret), 1);
}

#[test]
fn shift_amounts_are_masked() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tsll\ta0,a0,a1
\tsllw\ta1,a0,a2
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    validate(tgt);
    assert_eq!(count_op(tgt, Op::Shl), 2);
    // 64-bit form masks to 6 bits, the .w form to 5.
    let shifts: Vec<_> = tgt
        .bb_order
        .iter()
        .flat_map(|&bb| tgt.bb(bb).insts.clone())
        .filter(|&i| tgt.inst(i).op == Op::Shl)
        .collect();
    let amount_bits: Vec<u32> = shifts
        .iter()
        .map(|&s| {
            let zext = tgt.inst(s).args()[1];
            let masked = tgt.inst(zext).args()[0];
            tgt.inst(masked).bitsize
        })
        .collect();
    assert!(amount_bits.contains(&6));
    assert!(amount_bits.contains(&5));
}

#[test]
fn immediates_are_sign_extended() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\taddi\ta0,a0,-1
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    // The immediate is a 12-bit literal extended to the register width.
    assert!(tgt.value_map().contains_key(&(0xfff, 12)));
}

#[test]
fn comments_and_hex_are_lexed() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tli\ta0,0x1f ; load constant
\tret
\t.size\tfoo
";
    let idx = parse_riscv(&mut module, &[false], text).unwrap();
    let tgt = &module.functions[idx];
    assert!(tgt.value_map().contains_key(&(0x1f, 64)));
}

#[test]
fn unhandled_instruction_is_a_parse_error() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tfence
\tret
\t.size\tfoo
";
    let err = parse_riscv(&mut module, &[false], text).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

#[test]
fn bad_register_is_a_parse_error() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tmv\tx0,a1
\tret
\t.size\tfoo
";
    let err = parse_riscv(&mut module, &[false], text).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

#[test]
fn truncated_input_is_a_parse_error() {
    let mut module = module_with_src(32);
    let text = "\
foo:
\tret
";
    let err = parse_riscv(&mut module, &[false], text).unwrap_err();
    assert_eq!(err, Error::parse("EOF in the middle of a function", 2));
}
