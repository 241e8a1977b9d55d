//! Canonicalization for structural identity.
//!
//! Optimization passes may permute commutative arguments and phi/predecessor
//! orders without changing semantics. Canonicalization renumbers ids densely
//! in block order, sorts commutative arguments by id, and sorts phi argument
//! lists and predecessor lists by block id, so that two semantically
//! identical functions compare equal element-wise. The SMT emission relies
//! on the same ordering.

use super::*;

impl Function {
    pub fn canonicalize(&mut self) {
        self.reset_ir_id();

        for &bb in &self.bb_order.clone() {
            for inst_id in self.bb(bb).insts.clone() {
                if self.inst(inst_id).op.is_commutative() {
                    let (a1, a2) = match &self.inst(inst_id).kind {
                        InstKind::Plain { args, nof_args } => {
                            assert_eq!(*nof_args, 2);
                            (args[0], args[1])
                        }
                        _ => unreachable!("commutative instruction with branch payload"),
                    };
                    if self.inst(a1).id > self.inst(a2).id {
                        match &mut self.inst_mut(inst_id).kind {
                            InstKind::Plain { args, .. } => args.swap(0, 1),
                            _ => unreachable!(),
                        }
                    }
                }
            }

            for phi in self.bb(bb).phis.clone() {
                let mut args = self.inst(phi).phi_args().to_vec();
                args.sort_by_key(|a| self.bb(a.bb).id);
                match &mut self.inst_mut(phi).kind {
                    InstKind::Phi { args: phi_args } => *phi_args = args,
                    _ => unreachable!(),
                }
            }

            let mut preds = self.bb(bb).preds.clone();
            preds.sort_by_key(|&p| self.bb(p).id);
            self.bb_mut(bb).preds = preds;
        }
    }

    /// Renumber block and instruction ids as a dense prefix in block order.
    pub fn reset_ir_id(&mut self) {
        let mut bb_nbr = 0;
        let mut inst_nbr = 0;
        for &bb in &self.bb_order.clone() {
            self.bb_mut(bb).id = bb_nbr;
            bb_nbr += 1;
            for phi in self.bb(bb).phis.clone() {
                self.inst_mut(phi).id = inst_nbr;
                inst_nbr += 1;
            }
            for inst in self.bb(bb).insts.clone() {
                self.inst_mut(inst).id = inst_nbr;
                inst_nbr += 1;
            }
        }
    }
}
