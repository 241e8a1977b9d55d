//! Switch expansion and the synthesis of the single return.

use super::*;
use crate::tree::SwitchCase;

impl<'a> Converter<'a> {
    fn build_label_cond(
        &mut self,
        index_expr: &Expr,
        case: &SwitchCase,
        bb: BlockId,
    ) -> Result<InstId> {
        let index_type = index_expr.ty.clone();
        let index = self.tree2inst_undef_check(bb, index_expr)?;
        let low = self.tree2inst_undef_check(bb, &case.low)?;
        let low = self.type_convert(low, &case.low.ty, &index_type, bb)?;
        if let Some(high_expr) = &case.high {
            let high = self.tree2inst_undef_check(bb, high_expr)?;
            let high = self.type_convert(high, &high_expr.ty, &index_type, bb)?;
            let op = if index_type.is_unsigned() {
                Op::Uge
            } else {
                Op::Sge
            };
            let cond_low = self.func.build_inst2(bb, op, index, low);
            let cond_high = self.func.build_inst2(bb, op, high, index);
            Ok(self.func.build_inst2(bb, Op::And, cond_low, cond_high))
        } else {
            Ok(self.func.build_inst2(bb, Op::Eq, index, low))
        }
    }

    /// Expand a switch into a chain of compare-and-branch blocks, one per
    /// distinct successor (cases sharing a successor are ORed together so
    /// the target keeps a single incoming edge). The chain blocks are
    /// recorded so phi wiring can find the real predecessor.
    pub(crate) fn process_switch(
        &mut self,
        switch_bb: BlockId,
        index_expr: &Expr,
        cases: &[SwitchCase],
        default_block: SrcBlockId,
    ) -> Result<()> {
        // Start the chain with an unconditional branch to a fresh block so
        // that phi arguments from the switch always come from an
        // expansion block.
        let mut bb = self.func.build_bb();
        self.switch_bbs.entry(switch_bb).or_default().push(bb);
        self.func.build_br(switch_bb, bb);

        let mut targets: Vec<SrcBlockId> = Vec::new();
        let mut target_cases: HashMap<SrcBlockId, Vec<&SwitchCase>> = HashMap::new();
        for case in cases {
            if case.block == default_block {
                continue;
            }
            if !target_cases.contains_key(&case.block) {
                targets.push(case.block);
            }
            target_cases.entry(case.block).or_default().push(case);
        }

        if targets.is_empty() {
            // Every case branches to the default block.
            let dest = self.src_bb(default_block);
            self.func.build_br(bb, dest);
            return Ok(());
        }

        let n = targets.len();
        for (i, target) in targets.iter().enumerate() {
            let mut cond: Option<InstId> = None;
            for case in &target_cases[target] {
                let label_cond = self.build_label_cond(index_expr, case, bb)?;
                cond = Some(match cond {
                    Some(c) => self.func.build_inst2(bb, Op::Or, c, label_cond),
                    None => label_cond,
                });
            }

            let true_bb = self.src_bb(*target);
            let false_bb = if i != n - 1 {
                let false_bb = self.func.build_bb();
                self.switch_bbs.get_mut(&switch_bb).unwrap().push(false_bb);
                false_bb
            } else {
                self.src_bb(default_block)
            };
            self.func.build_cond_br(bb, cond.unwrap(), true_bb, false_bb);
            bb = false_bb;
        }
        Ok(())
    }

    /// Synthesize the single RET in the exit block: a phi over the recorded
    /// per-block return values, with a dummy fully-undef value for
    /// predecessors that never produce one (a plain `return;`, an
    /// unreachable, ...). Returning a pointer into local storage is UB.
    pub(crate) fn generate_return_inst(&mut self, bb: BlockId) -> Result<()> {
        if self.retval_bitsize == 0 {
            self.func.build_ret0(bb);
            return Ok(());
        }
        let retval_bitsize = self.retval_bitsize;

        {
            let mut dummy: Option<ValUndef> = None;
            let entry = self.func.entry();
            for pred_bb in self.func.bb(bb).preds.clone() {
                if self.bb2retval.contains_key(&pred_bb) {
                    continue;
                }
                if dummy.is_none() {
                    let retval = self.func.value_inst(0, retval_bitsize);
                    let mut undef: Option<InstId> = None;
                    let mut remaining = retval_bitsize;
                    while remaining > 0 {
                        let bs = remaining.min(128);
                        remaining -= bs;
                        let inst = self.func.value_inst(u128::MAX, bs);
                        undef = Some(match undef {
                            Some(u) => self.func.build_inst2(entry, Op::Concat, inst, u),
                            None => inst,
                        });
                    }
                    dummy = Some((retval, undef));
                }
                self.bb2retval.insert(pred_bb, dummy.unwrap());
            }
        }

        let retval;
        let mut retval_undef;
        let preds = self.func.bb(bb).preds.clone();
        if preds.len() == 1 {
            let (ret, ret_undef) = self.bb2retval[&preds[0]];
            retval = ret;
            retval_undef = ret_undef;
        } else {
            let phi = self.func.build_phi(bb, retval_bitsize);
            let phi_undef = self.func.build_phi(bb, retval_bitsize);
            let mut need_undef_phi = false;
            for pred_bb in preds {
                let (ret, ret_undef) = self.bb2retval[&pred_bb];
                self.func.add_phi_arg(phi, ret, pred_bb);
                need_undef_phi = need_undef_phi || ret_undef.is_some();
                let ret_undef =
                    ret_undef.unwrap_or_else(|| self.func.value_inst(0, retval_bitsize));
                self.func.add_phi_arg(phi_undef, ret_undef, pred_bb);
            }
            retval = phi;
            retval_undef = need_undef_phi.then_some(phi_undef);
        }

        if self
            .retval_type
            .as_ref()
            .is_some_and(|ty| ty.is_pointer())
        {
            let id_bits = self.func.ptr.id_bits;
            let mem_id = self.func.build_extract_id(bb, retval);
            let zero = self.func.value_inst(0, id_bits);
            let mut cond = self.func.build_inst2(bb, Op::Slt, mem_id, zero);
            if let Some(undef) = retval_undef {
                let zero2 = self.func.value_inst(0, self.func.inst(undef).bitsize);
                let cond2 = self.func.build_inst2(bb, Op::Eq, undef, zero2);
                cond = self.func.build_inst2(bb, Op::And, cond, cond2);
            }
            self.func.build_inst1(bb, Op::Ub, cond);
        }

        match retval_undef.take() {
            Some(undef) => self.func.build_ret2(bb, retval, undef),
            None => self.func.build_ret1(bb, retval),
        };
        Ok(())
    }
}
