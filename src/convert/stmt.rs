//! Assignment lowering: dispatch over the right-hand-side shape and the
//! store/constructor forms of non-SSA left-hand sides.

use super::memory::padding_at_offset;
use super::*;
use crate::tree::{Rhs, TernaryCode};

impl<'a> Converter<'a> {
    pub(crate) fn process_assign(&mut self, lhs: &Expr, rhs: &Rhs, bb: BlockId) -> Result<()> {
        check_type(&lhs.ty)?;

        if !matches!(lhs.kind, ExprKind::SsaName { .. }) {
            let Rhs::Single(value) = rhs else {
                return Err(Error::not_implemented("store of a non-value rhs"));
            };
            if matches!(value.kind, ExprKind::Constructor { .. }) {
                return self.process_constructor(lhs, value, bb);
            }
            return self.process_store(lhs, value, bb);
        }

        let (inst, undef) = match rhs {
            Rhs::Ternary {
                code,
                arg1,
                arg2,
                arg3,
            } => self.process_ternary_rhs(*code, arg1, arg2, arg3, lhs, bb)?,
            Rhs::Binary { code, arg1, arg2 } => {
                check_type(&arg1.ty)?;
                let lhs_type = &lhs.ty;
                if lhs_type.is_complex() && *code == BinaryCode::Complex {
                    let (a1, a1_undef) = self.tree2inst(bb, arg1)?;
                    let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                    let a1 = self.to_mem_repr(bb, a1, &arg1.ty)?;
                    let a2 = self.to_mem_repr(bb, a2, &arg2.ty)?;
                    let inst = self.func.build_inst2(bb, Op::Concat, a2, a1);
                    let undef = if a1_undef.is_some() || a2_undef.is_some() {
                        let bits1 = self.func.inst(a1).bitsize;
                        let bits2 = self.func.inst(a2).bitsize;
                        let zero1 = self.func.value_inst(0, bits1);
                        let zero2 = self.func.value_inst(0, bits2);
                        let u1 = a1_undef.unwrap_or(zero1);
                        let u1 = self.uninit_to_mem_repr(bb, u1, &arg1.ty)?;
                        let u2 = a2_undef.unwrap_or(zero2);
                        let u2 = self.uninit_to_mem_repr(bb, u2, &arg2.ty)?;
                        Some(self.func.build_inst2(bb, Op::Concat, u2, u1))
                    } else {
                        None
                    };
                    (inst, undef)
                } else if lhs_type.is_complex() {
                    let a1 = self.tree2inst_undef_check(bb, arg1)?;
                    let a2 = self.tree2inst_undef_check(bb, arg2)?;
                    let inst = self.process_binary_complex(*code, a1, a2, lhs_type, bb)?;
                    (inst, None)
                } else if arg1.ty.is_complex() {
                    let a1 = self.tree2inst_undef_check(bb, arg1)?;
                    let a2 = self.tree2inst_undef_check(bb, arg2)?;
                    let inst =
                        self.process_binary_complex_cmp(*code, a1, a2, lhs_type, &arg1.ty, bb)?;
                    (inst, None)
                } else if lhs_type.is_vector() {
                    let (a1, a1_undef) = self.tree2inst(bb, arg1)?;
                    let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                    self.process_binary_vec(
                        *code, a1, a1_undef, a2, a2_undef, lhs_type, &arg1.ty, &arg2.ty, bb,
                    )?
                } else {
                    let (a1, a1_undef) = self.tree2inst(bb, arg1)?;
                    let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                    self.process_binary_scalar(
                        *code, a1, a1_undef, a2, a2_undef, lhs_type, &arg1.ty, &arg2.ty, bb,
                    )?
                }
            }
            Rhs::Unary { code, arg } => {
                let lhs_type = &lhs.ty;
                if lhs_type.is_complex() || arg.ty.is_complex() {
                    let a1 = self.tree2inst_undef_check(bb, arg)?;
                    let inst = self.process_unary_complex(*code, a1, lhs_type, bb)?;
                    (inst, None)
                } else if lhs_type.is_vector() {
                    let (a1, a1_undef) = self.tree2inst(bb, arg)?;
                    let lhs_elem_type = lhs_type.element_type().unwrap().clone();
                    let arg_elem_type = arg.ty.element_type().unwrap().clone();
                    self.process_unary_vec(
                        *code,
                        a1,
                        a1_undef,
                        &lhs_elem_type,
                        &arg_elem_type,
                        bb,
                    )?
                } else {
                    let (a1, a1_undef) = self.tree2inst(bb, arg)?;
                    self.process_unary_scalar(*code, a1, a1_undef, lhs_type, &arg.ty, bb)?
                }
            }
            Rhs::Single(value) => self.tree2inst(bb, value)?,
        };

        self.constrain_range(bb, lhs, inst, undef)?;
        let ssa_id = ssa_name_id(lhs);
        self.ssa2inst.insert(ssa_id, inst);
        if let Some(undef) = undef {
            self.ssa2undef.insert(ssa_id, undef);
        }
        Ok(())
    }

    fn process_ternary_rhs(
        &mut self,
        code: TernaryCode,
        arg1: &Expr,
        arg2: &Expr,
        arg3: &Expr,
        lhs: &Expr,
        bb: BlockId,
    ) -> Result<ValUndef> {
        match code {
            TernaryCode::Sad | TernaryCode::DotProd => {
                let a1 = self.tree2inst_undef_check(bb, arg1)?;
                let a2 = self.tree2inst_undef_check(bb, arg2)?;
                let a3 = self.tree2inst_undef_check(bb, arg3)?;
                let inst = if lhs.ty.is_vector() {
                    self.process_ternary_vec(
                        code, a1, a2, a3, &lhs.ty, &arg1.ty, &arg2.ty, &arg3.ty, bb,
                    )?
                } else {
                    self.process_ternary(code, a1, a2, a3, &arg1.ty, &arg2.ty, &arg3.ty, bb)?
                };
                Ok((inst, None))
            }
            TernaryCode::VecPerm => self.process_vec_perm_expr(bb, arg1, arg2, arg3),
            TernaryCode::VecCond => {
                let a1 = self.tree2inst_undef_check(bb, arg1)?;
                let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                let (a3, a3_undef) = self.tree2inst(bb, arg3)?;
                self.process_vec_cond(a1, a2, a2_undef, a3, a3_undef, &arg1.ty, &arg2.ty, bb)
            }
            TernaryCode::Cond => {
                assert!(arg1.ty.is_bool());
                let mut a1 = self.tree2inst_undef_check(bb, arg1)?;
                if bitsize_for_type(&arg1.ty)? != 1 {
                    a1 = self.func.build_extract_bit(bb, a1, 0);
                }
                let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                let (a3, a3_undef) = self.tree2inst(bb, arg3)?;
                let undef = if a2_undef.is_some() || a3_undef.is_some() {
                    let bits2 = self.func.inst(a2).bitsize;
                    let bits3 = self.func.inst(a3).bitsize;
                    let zero2 = self.func.value_inst(0, bits2);
                    let zero3 = self.func.value_inst(0, bits3);
                    let u2 = a2_undef.unwrap_or(zero2);
                    let u3 = a3_undef.unwrap_or(zero3);
                    Some(self.func.build_inst3(bb, Op::Ite, a1, u2, u3))
                } else {
                    None
                };
                let inst = self.func.build_inst3(bb, Op::Ite, a1, a2, a3);
                Ok((inst, undef))
            }
            TernaryCode::BitInsert => {
                let (a1, a1_undef) = self.tree2inst(bb, arg1)?;
                let (a2, a2_undef) = self.tree2inst(bb, arg2)?;
                let has_undef = a1_undef.is_some() || a2_undef.is_some();
                let (a1_undef, a2_undef) = if has_undef {
                    let bits1 = self.func.inst(a1).bitsize;
                    let bits2 = self.func.inst(a2).bitsize;
                    let zero1 = self.func.value_inst(0, bits1);
                    let zero2 = self.func.value_inst(0, bits2);
                    (Some(a1_undef.unwrap_or(zero1)), Some(a2_undef.unwrap_or(zero2)))
                } else {
                    (None, None)
                };
                let ExprKind::IntCst { value: bit_pos } = arg3.kind else {
                    return Err(Error::not_implemented("BIT_INSERT: non-constant position"));
                };
                let bit_pos = bit_pos as u32;
                let a1_bits = self.func.inst(a1).bitsize;
                let a2_bits = self.func.inst(a2).bitsize;

                let mut inst;
                let mut undef = None;
                if bit_pos > 0 {
                    let extract = self.func.build_trunc(bb, a1, bit_pos);
                    inst = self.func.build_inst2(bb, Op::Concat, a2, extract);
                    if let (Some(u1), Some(u2)) = (a1_undef, a2_undef) {
                        let extract_undef = self.func.build_trunc(bb, u1, bit_pos);
                        undef = Some(self.func.build_inst2(bb, Op::Concat, u2, extract_undef));
                    }
                } else {
                    inst = a2;
                    if let (Some(_), Some(u2)) = (a1_undef, a2_undef) {
                        undef = Some(u2);
                    }
                }
                if bit_pos + a2_bits != a1_bits {
                    let high = self.func.value_inst(a1_bits as u128 - 1, 32);
                    let low = self.func.value_inst((bit_pos + a2_bits) as u128, 32);
                    let extract = self.func.build_inst3(bb, Op::Extract, a1, high, low);
                    inst = self.func.build_inst2(bb, Op::Concat, extract, inst);
                    if let Some(u) = undef {
                        let u1 = a1_undef.unwrap();
                        let extract_undef = self.func.build_inst3(bb, Op::Extract, u1, high, low);
                        undef = Some(self.func.build_inst2(bb, Op::Concat, extract_undef, u));
                    }
                }
                Ok((inst, undef))
            }
        }
    }

    /// A constructor on the right-hand side of a store: an end-of-life
    /// clobber frees the object, other clobbers make it indeterminate, and
    /// an empty initializer zero-fills it (with padding bytes marked
    /// indeterminate).
    fn process_constructor(&mut self, lhs: &Expr, rhs: &Expr, bb: BlockId) -> Result<()> {
        let ExprKind::Constructor {
            elems,
            no_clearing,
            clobber,
            clobber_eol,
        } = &rhs.kind
        else {
            panic!("process_constructor on non-constructor");
        };

        let dest_addr = self.process_address(bb, lhs)?;
        assert_eq!(dest_addr.bitoffset, 0);
        let dest = dest_addr.ptr;
        let mem_id = self.func.build_extract_id(bb, dest);

        if *clobber && *clobber_eol {
            self.func.build_inst1(bb, Op::Free, mem_id);
            return Ok(());
        }

        assert!(!no_clearing);
        let size = bytesize_for_type(&rhs.ty)?;
        if size > MAX_MEMORY_UNROLL_LIMIT {
            return Err(Error::not_implemented(
                "process_constructor: too large constructor",
            ));
        }
        self.store_ub_check(bb, dest, size);

        if *clobber {
            self.make_uninit(bb, dest, size);
        } else {
            let mut ptr = dest;
            let one = self.func.value_inst(1, self.func.ptr.bits);
            let zero = self.func.value_inst(0, 8);
            let memory_flag = self.func.value_inst(1, 1);
            for i in 0..size {
                let padding = padding_at_offset(&rhs.ty, i)?;
                let undef = self.func.value_inst(padding as u128, 8);
                self.func.build_inst2(bb, Op::Store, ptr, zero);
                self.func.build_inst2(bb, Op::SetMemUndef, ptr, undef);
                self.func.build_inst2(bb, Op::SetMemFlag, ptr, memory_flag);
                ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
            }
        }

        assert!(elems.is_empty());
        Ok(())
    }
}
