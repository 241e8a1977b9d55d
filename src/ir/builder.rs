//! Construction and mutation of the IR.
//!
//! Every `build_*` method computes the result width from the opcode's rule,
//! checks the operand-width preconditions, inserts the instruction at the
//! last legal position of the block (phis into the phi list, terminators at
//! the tail with CFG edges updated, everything else before the terminator),
//! and records the new instruction in each operand's `used_by` set.

use super::*;

impl Function {
    fn bitsize1(&self, op: Op, arg: InstId) -> u32 {
        let a = self.inst(arg);
        match op {
            Op::IsConstMem => {
                assert_eq!(a.bitsize, self.ptr.id_bits);
                1
            }
            Op::GetMemFlag => {
                assert_eq!(a.bitsize, self.ptr.bits);
                1
            }
            Op::IsNoncanonicalNan => 1,
            Op::GetMemUndef | Op::Load => {
                assert_eq!(a.bitsize, self.ptr.bits);
                8
            }
            Op::MemSize => {
                assert_eq!(a.bitsize, self.ptr.id_bits);
                self.ptr.offset_bits
            }
            Op::Register => {
                assert_eq!(a.op, Op::Value);
                a.value() as u32
            }
            Op::Read => {
                assert_eq!(a.op, Op::Register);
                a.bitsize
            }
            Op::Ub | Op::Assert => {
                assert_eq!(a.bitsize, 1);
                0
            }
            Op::Free => {
                assert_eq!(a.bitsize, self.ptr.id_bits);
                0
            }
            Op::Mov | Op::Neg | Op::Not | Op::Fabs | Op::Fneg => a.bitsize,
            _ => panic!("build_inst1: invalid opcode {}", op.name()),
        }
    }

    fn bitsize2(&self, op: Op, arg1: InstId, arg2: InstId) -> u32 {
        let a1 = self.inst(arg1);
        let a2 = self.inst(arg2);
        let class = op.class();
        if class == OpClass::Icomparison
            || class == OpClass::Fcomparison
            || matches!(op, Op::SaddWraps | Op::SsubWraps | Op::SmulWraps)
        {
            assert_eq!(a1.bitsize, a2.bitsize);
            return 1;
        }
        if class == OpClass::Conv {
            assert_eq!(a2.op, Op::Value);
            let bitsize = a2.value() as u32;
            if op == Op::Sext || op == Op::Zext {
                assert!(bitsize > a1.bitsize);
            }
            return bitsize;
        }
        match op {
            Op::Concat => a1.bitsize + a2.bitsize,
            Op::Param | Op::Symbolic => {
                assert_eq!(a1.op, Op::Value);
                assert_eq!(a2.op, Op::Value);
                a2.value() as u32
            }
            Op::Store | Op::SetMemUndef => {
                assert_eq!(a1.bitsize, self.ptr.bits);
                assert_eq!(a2.bitsize, 8);
                0
            }
            Op::SetMemFlag => {
                assert_eq!(a1.bitsize, self.ptr.bits);
                assert_eq!(a2.bitsize, 1);
                0
            }
            Op::Write => {
                assert_eq!(a1.op, Op::Register);
                assert_eq!(a2.bitsize, a1.bitsize);
                0
            }
            _ => {
                assert!(
                    class == OpClass::Ibinary || class == OpClass::Fbinary,
                    "build_inst2: invalid opcode {}",
                    op.name()
                );
                assert_eq!(a1.bitsize, a2.bitsize);
                a1.bitsize
            }
        }
    }

    fn bitsize3(&self, op: Op, arg1: InstId, arg2: InstId, arg3: InstId) -> u32 {
        let a1 = self.inst(arg1);
        let a2 = self.inst(arg2);
        let a3 = self.inst(arg3);
        match op {
            Op::Extract => {
                assert_eq!(a2.op, Op::Value);
                assert_eq!(a3.op, Op::Value);
                let high = a2.value() as u32;
                let low = a3.value() as u32;
                assert!(high >= low);
                assert!(high < a1.bitsize);
                1 + high - low
            }
            Op::Memory => {
                assert_eq!(a1.op, Op::Value);
                assert_eq!(a1.bitsize, self.ptr.id_bits);
                assert_eq!(a2.op, Op::Value);
                assert_eq!(a2.bitsize, self.ptr.offset_bits);
                assert_eq!(a3.op, Op::Value);
                self.ptr.bits
            }
            Op::Ite => {
                assert_eq!(a1.bitsize, 1);
                assert_eq!(a2.bitsize, a3.bitsize);
                a2.bitsize
            }
            _ => panic!("build_inst3: invalid opcode {}", op.name()),
        }
    }

    fn add_to_use_lists(&mut self, id: InstId) {
        for arg in self.inst(id).args() {
            self.inst_mut(arg).used_by.insert(id);
        }
    }

    /// Insert a built instruction at the last legal position of `bb`.
    fn insert_last(&mut self, bb: BlockId, id: InstId) {
        assert!(self.inst(id).bb.is_none());
        let op = self.inst(id).op;
        assert_ne!(op, Op::Phi);
        self.add_to_use_lists(id);
        self.inst_mut(id).bb = Some(bb);

        if op == Op::Br {
            assert!(self.terminator(bb).is_none());
            assert!(self.bb(bb).succs.is_empty());
            match self.inst(id).kind.clone() {
                InstKind::Br { dest } => {
                    self.bb_mut(dest).preds.push(bb);
                    self.bb_mut(bb).succs.push(dest);
                }
                InstKind::CondBr {
                    true_bb, false_bb, ..
                } => {
                    self.bb_mut(true_bb).preds.push(bb);
                    self.bb_mut(bb).succs.push(true_bb);
                    self.bb_mut(false_bb).preds.push(bb);
                    self.bb_mut(bb).succs.push(false_bb);
                }
                _ => unreachable!(),
            }
            self.bb_mut(bb).insts.push(id);
            return;
        }
        if op == Op::Ret {
            assert!(self.terminator(bb).is_none());
            self.bb_mut(bb).insts.push(id);
            return;
        }

        if self.terminator(bb).is_some() {
            let pos = self.bb(bb).insts.len() - 1;
            self.bb_mut(bb).insts.insert(pos, id);
        } else {
            self.bb_mut(bb).insts.push(id);
        }
    }

    pub fn build_inst1(&mut self, bb: BlockId, op: Op, arg: InstId) -> InstId {
        let bitsize = self.bitsize1(op, arg);
        let kind = InstKind::Plain {
            args: [arg, arg, arg],
            nof_args: 1,
        };
        let id = self.alloc_inst(op, bitsize, kind);
        self.insert_last(bb, id);
        id
    }

    pub fn build_inst2(&mut self, bb: BlockId, op: Op, arg1: InstId, arg2: InstId) -> InstId {
        let bitsize = self.bitsize2(op, arg1, arg2);
        let kind = InstKind::Plain {
            args: [arg1, arg2, arg2],
            nof_args: 2,
        };
        let id = self.alloc_inst(op, bitsize, kind);
        self.insert_last(bb, id);
        id
    }

    pub fn build_inst3(
        &mut self,
        bb: BlockId,
        op: Op,
        arg1: InstId,
        arg2: InstId,
        arg3: InstId,
    ) -> InstId {
        let bitsize = self.bitsize3(op, arg1, arg2, arg3);
        let kind = InstKind::Plain {
            args: [arg1, arg2, arg3],
            nof_args: 3,
        };
        let id = self.alloc_inst(op, bitsize, kind);
        self.insert_last(bb, id);
        id
    }

    pub fn build_phi(&mut self, bb: BlockId, bitsize: u32) -> InstId {
        let id = self.alloc_inst(Op::Phi, bitsize, InstKind::Phi { args: Vec::new() });
        self.inst_mut(id).bb = Some(bb);
        self.bb_mut(bb).phis.push(id);
        id
    }

    pub fn build_br(&mut self, bb: BlockId, dest: BlockId) -> InstId {
        let id = self.alloc_inst(Op::Br, 0, InstKind::Br { dest });
        self.insert_last(bb, id);
        id
    }

    pub fn build_cond_br(
        &mut self,
        bb: BlockId,
        cond: InstId,
        true_bb: BlockId,
        false_bb: BlockId,
    ) -> InstId {
        assert_ne!(true_bb, false_bb);
        assert_eq!(self.inst(cond).bitsize, 1);
        let id = self.alloc_inst(
            Op::Br,
            0,
            InstKind::CondBr {
                cond,
                true_bb,
                false_bb,
            },
        );
        self.insert_last(bb, id);
        id
    }

    pub fn build_ret0(&mut self, bb: BlockId) -> InstId {
        let kind = InstKind::Plain {
            args: [InstId(0); 3],
            nof_args: 0,
        };
        let id = self.alloc_inst(Op::Ret, 0, kind);
        self.insert_last(bb, id);
        id
    }

    pub fn build_ret1(&mut self, bb: BlockId, arg: InstId) -> InstId {
        let bitsize = self.inst(arg).bitsize;
        let kind = InstKind::Plain {
            args: [arg, arg, arg],
            nof_args: 1,
        };
        let id = self.alloc_inst(Op::Ret, bitsize, kind);
        self.insert_last(bb, id);
        id
    }

    /// Return with an undef mask: `arg2` marks the indeterminate bits of
    /// `arg1`.
    pub fn build_ret2(&mut self, bb: BlockId, arg1: InstId, arg2: InstId) -> InstId {
        assert_eq!(self.inst(arg1).bitsize, self.inst(arg2).bitsize);
        let bitsize = self.inst(arg1).bitsize;
        let kind = InstKind::Plain {
            args: [arg1, arg2, arg2],
            nof_args: 2,
        };
        let id = self.alloc_inst(Op::Ret, bitsize, kind);
        self.insert_last(bb, id);
        id
    }

    /// Intern the literal `value` at width `bitsize`. Widths above 128 are
    /// synthesized as CONCAT chains of 128-bit VALUEs in the entry block and
    /// are not interned.
    pub fn value_inst(&mut self, value: u128, bitsize: u32) -> InstId {
        assert!(bitsize > 0);
        let value = if bitsize < 128 {
            trunc_value(value, bitsize)
        } else {
            value
        };

        if bitsize > 128 {
            let entry = self.entry();
            let mut remaining = bitsize;
            let mut value = value;
            let mut res: Option<InstId> = None;
            while remaining > 0 {
                let bs = remaining.min(128);
                remaining -= bs;
                let inst = self.value_inst(value, bs);
                value = 0;
                res = Some(match res {
                    Some(r) => self.build_inst2(entry, Op::Concat, inst, r),
                    None => inst,
                });
            }
            // Not recorded in the interner: the CONCAT is an ordinary
            // instruction and may be removed by dead-code elimination.
            return res.unwrap();
        }

        if let Some(&id) = self.value_map().get(&(value, bitsize)) {
            return id;
        }

        let id = self.alloc_inst(Op::Value, bitsize, InstKind::Value { value });
        let entry = self.entry();
        // Keep VALUE instructions in a contiguous, creation-ordered prefix
        // of the entry block.
        let pos = match self.last_value() {
            Some(lv) => {
                let p = self
                    .bb(entry)
                    .insts
                    .iter()
                    .position(|&i| i == lv)
                    .expect("last value instruction not in entry block");
                p + 1
            }
            None => {
                let insts = &self.bb(entry).insts;
                insts
                    .iter()
                    .position(|&i| self.inst(i).op != Op::Value)
                    .unwrap_or(insts.len())
            }
        };
        self.inst_mut(id).bb = Some(entry);
        self.bb_mut(entry).insts.insert(pos, id);
        self.set_last_value(Some(id));
        self.value_map_mut().insert((value, bitsize), id);
        id
    }

    /// An all-ones literal of the given width.
    pub fn value_m1_inst(&mut self, bitsize: u32) -> InstId {
        if bitsize <= 128 {
            return self.value_inst(u128::MAX, bitsize);
        }
        let entry = self.entry();
        let mut remaining = bitsize;
        let mut res: Option<InstId> = None;
        while remaining > 0 {
            let bs = remaining.min(128);
            remaining -= bs;
            let inst = self.value_inst(u128::MAX, bs);
            res = Some(match res {
                Some(r) => self.build_inst2(entry, Op::Concat, inst, r),
                None => inst,
            });
        }
        res.unwrap()
    }

    /// Extract the memory-id field of a pointer.
    pub fn build_extract_id(&mut self, bb: BlockId, arg: InstId) -> InstId {
        assert_eq!(self.inst(arg).bitsize, self.ptr.bits);
        let high = self.value_inst(self.ptr.id_high as u128, 32);
        let low = self.value_inst(self.ptr.id_low as u128, 32);
        self.build_inst3(bb, Op::Extract, arg, high, low)
    }

    /// Extract the offset field of a pointer.
    pub fn build_extract_offset(&mut self, bb: BlockId, arg: InstId) -> InstId {
        assert_eq!(self.inst(arg).bitsize, self.ptr.bits);
        let high = self.value_inst(self.ptr.offset_high as u128, 32);
        let low = self.value_inst(self.ptr.offset_low as u128, 32);
        self.build_inst3(bb, Op::Extract, arg, high, low)
    }

    /// Extract a single bit; bit 0 is the least significant.
    pub fn build_extract_bit(&mut self, bb: BlockId, arg: InstId, bit_idx: u32) -> InstId {
        assert!(bit_idx < self.inst(arg).bitsize);
        let idx = self.value_inst(bit_idx as u128, 32);
        self.build_inst3(bb, Op::Extract, arg, idx, idx)
    }

    /// Truncate to the low `nof_bits` bits (no-op when already that width).
    pub fn build_trunc(&mut self, bb: BlockId, arg: InstId, nof_bits: u32) -> InstId {
        assert!(nof_bits <= self.inst(arg).bitsize);
        if nof_bits == self.inst(arg).bitsize {
            return arg;
        }
        let high = self.value_inst(nof_bits as u128 - 1, 32);
        let low = self.value_inst(0, 32);
        self.build_inst3(bb, Op::Extract, arg, high, low)
    }

    pub fn add_phi_arg(&mut self, phi: InstId, inst: InstId, bb: BlockId) {
        assert_eq!(self.inst(inst).bitsize, self.inst(phi).bitsize);
        match &mut self.inst_mut(phi).kind {
            InstKind::Phi { args } => args.push(PhiArg { inst, bb }),
            _ => panic!("add_phi_arg on non-phi instruction"),
        }
        self.inst_mut(inst).used_by.insert(phi);
    }

    pub fn get_phi_arg(&self, phi: InstId, bb: BlockId) -> InstId {
        self.inst(phi)
            .phi_args()
            .iter()
            .find(|a| a.bb == bb)
            .expect("no phi argument for predecessor")
            .inst
    }

    /// Remove the phi argument coming from `bb`. The argument instruction's
    /// use list keeps the phi only if another argument still references it.
    pub fn remove_phi_arg(&mut self, phi: InstId, bb: BlockId) {
        let arg_inst;
        let still_used;
        match &mut self.inst_mut(phi).kind {
            InstKind::Phi { args } => {
                let pos = args
                    .iter()
                    .position(|a| a.bb == bb)
                    .expect("no phi argument for predecessor");
                arg_inst = args[pos].inst;
                args.remove(pos);
                still_used = args.iter().any(|a| a.inst == arg_inst);
            }
            _ => panic!("remove_phi_arg on non-phi instruction"),
        }
        if !still_used {
            self.inst_mut(arg_inst).used_by.remove(&phi);
        }
    }

    pub fn remove_phi_args(&mut self, phi: InstId) {
        while let Some(last) = self.inst(phi).phi_args().last().copied() {
            self.remove_phi_arg(phi, last.bb);
        }
    }

    /// Rewrite one user of `this` to use `new_inst` instead.
    pub fn replace_use_with(&mut self, this: InstId, user: InstId, new_inst: InstId) {
        self.rewrite_args(user, this, new_inst);
        self.inst_mut(new_inst).used_by.insert(user);
        let removed = self.inst_mut(this).used_by.remove(&user);
        assert!(removed);
    }

    pub fn replace_all_uses_with(&mut self, this: InstId, new_inst: InstId) {
        let users: Vec<InstId> = self.inst(this).used_by.iter().copied().collect();
        for user in users {
            self.rewrite_args(user, this, new_inst);
            self.inst_mut(new_inst).used_by.insert(user);
        }
        self.inst_mut(this).used_by.clear();
    }

    fn rewrite_args(&mut self, user: InstId, from: InstId, to: InstId) {
        match &mut self.inst_mut(user).kind {
            InstKind::Plain { args, nof_args } => {
                for arg in args[..*nof_args as usize].iter_mut() {
                    if *arg == from {
                        *arg = to;
                    }
                }
            }
            InstKind::CondBr { cond, .. } => {
                if *cond == from {
                    *cond = to;
                }
            }
            InstKind::Phi { args } => {
                for arg in args.iter_mut() {
                    if arg.inst == from {
                        arg.inst = to;
                    }
                }
            }
            InstKind::Br { .. } | InstKind::Value { .. } => {}
        }
    }

    /// Delete an unused instruction, unlinking it from its operands' use
    /// lists and (for branches) from the CFG edge lists. Phi arguments of
    /// successor blocks are left for the caller to fix up, since the caller
    /// may be about to insert a replacement branch.
    pub fn destroy_inst(&mut self, id: InstId) {
        assert!(self.inst(id).used_by.is_empty());

        if let Some(bb) = self.inst(id).bb {
            let op = self.inst(id).op;
            if op == Op::Value {
                let key = (self.inst(id).value(), self.inst(id).bitsize);
                let removed = self.value_map_mut().remove(&key);
                assert!(removed.is_some());
                if self.last_value() == Some(id) {
                    let pos = self.bb(bb).insts.iter().position(|&i| i == id).unwrap();
                    let prev = (pos > 0).then(|| self.bb(bb).insts[pos - 1]);
                    match prev {
                        Some(p) if self.inst(p).op == Op::Value => self.set_last_value(Some(p)),
                        _ => self.set_last_value(None),
                    }
                }
            }

            if op == Op::Phi {
                for arg in self.inst(id).phi_args().to_vec() {
                    self.inst_mut(arg.inst).used_by.remove(&id);
                }
                let pos = self.bb(bb).phis.iter().position(|&p| p == id).unwrap();
                self.bb_mut(bb).phis.remove(pos);
            } else {
                if op == Op::Br {
                    for succ in self.bb(bb).succs.clone() {
                        let pos = self
                            .bb(succ)
                            .preds
                            .iter()
                            .position(|&p| p == bb)
                            .expect("successor missing predecessor edge");
                        self.bb_mut(succ).preds.remove(pos);
                    }
                    self.bb_mut(bb).succs.clear();
                }
                for arg in self.inst(id).args() {
                    self.inst_mut(arg).used_by.remove(&id);
                }
                let pos = self.bb(bb).insts.iter().position(|&i| i == id).unwrap();
                self.bb_mut(bb).insts.remove(pos);
            }
        }
        self.kill_inst_slot(id);
    }

    /// Delete a block whose predecessor list is empty. The phis' arguments
    /// are cleared first as they may reference instructions in this block.
    pub fn destroy_bb(&mut self, bb: BlockId) {
        assert!(self.bb(bb).preds.is_empty());

        for phi in self.bb(bb).phis.clone() {
            self.remove_phi_args(phi);
        }
        while let Some(&last) = self.bb(bb).insts.last() {
            self.destroy_inst(last);
        }
        while let Some(&phi) = self.bb(bb).phis.last() {
            self.destroy_inst(phi);
        }

        let pos = self.bb_order.iter().position(|&b| b == bb).unwrap();
        self.bb_order.remove(pos);
        self.kill_block_slot(bb);
    }
}
