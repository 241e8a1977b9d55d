//! Structural invariant checks.
//!
//! These hold by construction; a failure here is a bug in the tool, not in
//! the program under analysis, so everything is an assertion.

use std::collections::HashSet;

use super::*;

/// Assert the structural invariants of a function:
/// use-list consistency, CFG edge consistency, terminator shape, a single
/// RET, phi arity, opcode width rules, and interning bijectivity.
pub fn validate(func: &Function) {
    let mut nof_rets = 0;
    let mut seen_insts: HashSet<InstId> = HashSet::new();

    for (idx, &bb) in func.bb_order.iter().enumerate() {
        let block = func.bb(bb);

        // Unreachable non-entry blocks may exist until the next
        // reverse-post-order pass sweeps them away.
        if idx == 0 {
            assert!(block.preds.is_empty(), "entry block has predecessors");
        }

        // The terminator is the single BR/RET, and it is last.
        let term = *block.insts.last().expect("block without terminator");
        assert!(func.inst(term).op.is_terminator());
        for &inst in &block.insts[..block.insts.len() - 1] {
            assert!(!func.inst(inst).op.is_terminator());
        }
        if func.inst(term).op == Op::Ret {
            nof_rets += 1;
            assert!(block.succs.is_empty());
        }

        // Successor list equals the branch targets; edges are mirrored.
        let targets: Vec<BlockId> = match &func.inst(term).kind {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                true_bb, false_bb, ..
            } => vec![*true_bb, *false_bb],
            _ => vec![],
        };
        assert_eq!(block.succs, targets, "successor list out of sync");
        for &succ in &block.succs {
            assert!(
                func.bb(succ).preds.contains(&bb),
                "missing predecessor back-edge"
            );
        }
        for &pred in &block.preds {
            assert!(
                func.bb(pred).succs.contains(&bb),
                "stale predecessor entry"
            );
        }

        for &phi in &block.phis {
            let inst = func.inst(phi);
            assert_eq!(inst.op, Op::Phi);
            assert_eq!(inst.bb, Some(bb));
            let args = inst.phi_args();
            assert_eq!(
                args.len(),
                block.preds.len(),
                "phi argument count differs from predecessor count"
            );
            for arg in args {
                assert!(block.preds.contains(&arg.bb));
                assert_eq!(func.inst(arg.inst).bitsize, inst.bitsize);
            }
            seen_insts.insert(phi);
        }

        let mut in_value_prefix = idx == 0;
        for &inst_id in &block.insts {
            let inst = func.inst(inst_id);
            assert_eq!(inst.bb, Some(bb));
            seen_insts.insert(inst_id);

            // VALUE instructions form a contiguous prefix of the entry block.
            if inst.op == Op::Value {
                assert!(in_value_prefix, "VALUE instruction outside entry prefix");
            } else {
                in_value_prefix = false;
            }

            check_bitsize(func, inst);
        }
    }
    assert_eq!(nof_rets, 1, "function must have exactly one RET");

    // Use lists: y uses x iff y is in x.used_by, and no stale entries.
    for &bb in &func.bb_order {
        let block = func.bb(bb);
        for &id in block.phis.iter().chain(block.insts.iter()) {
            let inst = func.inst(id);
            for arg in inst.args() {
                assert!(
                    func.inst(arg).used_by.contains(&id),
                    "operand missing use-list entry"
                );
            }
            for &user in &inst.used_by {
                assert!(seen_insts.contains(&user), "use by dead instruction");
                assert!(
                    func.inst(user).args().contains(&id),
                    "stale use-list entry"
                );
            }
        }
    }

    // Interning: the (value, width) map and the VALUE instructions are in
    // bijection for widths <= 128.
    let mut nof_values = 0;
    for &id in seen_insts.iter() {
        let inst = func.inst(id);
        if inst.op == Op::Value {
            nof_values += 1;
            assert_eq!(
                func.value_map().get(&(inst.value(), inst.bitsize)),
                Some(&id),
                "VALUE instruction not interned"
            );
        }
    }
    assert_eq!(nof_values, func.value_map().len());
}

fn check_bitsize(func: &Function, inst: &Inst) {
    let arg_bitsize = |i: usize| func.inst(inst.args()[i]).bitsize;
    match inst.op.class() {
        OpClass::Icomparison | OpClass::Fcomparison => {
            assert_eq!(arg_bitsize(0), arg_bitsize(1));
            assert_eq!(inst.bitsize, 1);
        }
        OpClass::Iunary => match inst.op {
            Op::GetMemFlag | Op::IsConstMem | Op::IsNoncanonicalNan => {
                assert_eq!(inst.bitsize, 1)
            }
            Op::GetMemUndef | Op::Load => assert_eq!(inst.bitsize, 8),
            Op::MemSize => assert_eq!(inst.bitsize, func.ptr.offset_bits),
            Op::Ub | Op::Assert => assert_eq!(arg_bitsize(0), 1),
            Op::Free => assert_eq!(arg_bitsize(0), func.ptr.id_bits),
            Op::Register => {}
            _ => assert_eq!(inst.bitsize, arg_bitsize(0)),
        },
        OpClass::Funary => assert_eq!(inst.bitsize, arg_bitsize(0)),
        OpClass::Ibinary => match inst.op {
            Op::SaddWraps | Op::SsubWraps | Op::SmulWraps => {
                assert_eq!(arg_bitsize(0), arg_bitsize(1));
                assert_eq!(inst.bitsize, 1);
            }
            Op::Concat => assert_eq!(inst.bitsize, arg_bitsize(0) + arg_bitsize(1)),
            Op::Store | Op::SetMemUndef => {
                assert_eq!(arg_bitsize(0), func.ptr.bits);
                assert_eq!(arg_bitsize(1), 8);
            }
            Op::SetMemFlag => {
                assert_eq!(arg_bitsize(0), func.ptr.bits);
                assert_eq!(arg_bitsize(1), 1);
            }
            Op::Param | Op::Symbolic | Op::Write => {}
            _ => {
                assert_eq!(arg_bitsize(0), arg_bitsize(1));
                assert_eq!(inst.bitsize, arg_bitsize(0));
            }
        },
        OpClass::Fbinary => {
            assert_eq!(arg_bitsize(0), arg_bitsize(1));
            assert_eq!(inst.bitsize, arg_bitsize(0));
        }
        OpClass::Ternary => match inst.op {
            Op::Extract => {
                let high = func.inst(inst.args()[1]).value() as u32;
                let low = func.inst(inst.args()[2]).value() as u32;
                assert!(low <= high && high < arg_bitsize(0));
                assert_eq!(inst.bitsize, 1 + high - low);
            }
            Op::Memory => assert_eq!(inst.bitsize, func.ptr.bits),
            Op::Ite => {
                assert_eq!(arg_bitsize(0), 1);
                assert_eq!(arg_bitsize(1), arg_bitsize(2));
                assert_eq!(inst.bitsize, arg_bitsize(1));
            }
            _ => unreachable!(),
        },
        OpClass::Conv => {
            if inst.op == Op::Sext || inst.op == Op::Zext {
                assert!(inst.bitsize > arg_bitsize(0));
            }
        }
        OpClass::Special => {}
    }
}
