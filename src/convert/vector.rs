//! Vector lowering. A fixed-width vector of N elements of width W is a
//! single bitvector of width N*W with element 0 at bit 0; every vector
//! operation is lowered per lane and the lane results concatenated. Undef
//! masks are propagated in the same shape.

use super::*;
use crate::tree::{CtorIndex, TernaryCode, UnaryCode};

impl<'a> Converter<'a> {
    /// Extract element `idx` of a vector of `elem_bitsize`-wide lanes.
    pub(crate) fn extract_vec_elem(
        &mut self,
        bb: BlockId,
        inst: InstId,
        elem_bitsize: u32,
        idx: u32,
    ) -> InstId {
        assert!(self.func.inst(inst).bitsize % elem_bitsize == 0);
        let high = self
            .func
            .value_inst((idx * elem_bitsize + elem_bitsize - 1) as u128, 32);
        let low = self.func.value_inst((idx * elem_bitsize) as u128, 32);
        self.func.build_inst3(bb, Op::Extract, inst, high, low)
    }

    /// Extract the element selected by a dynamic index.
    pub(crate) fn extract_elem(
        &mut self,
        bb: BlockId,
        vec: InstId,
        elem_bitsize: u32,
        idx: InstId,
    ) -> InstId {
        let idx_bits = self.func.inst(idx).bitsize;
        let elm_bsize = self.func.value_inst(elem_bitsize as u128, idx_bits);
        let mut shift = self.func.build_inst2(bb, Op::Mul, idx, elm_bsize);
        let vec_bits = self.func.inst(vec).bitsize;
        if self.func.inst(shift).bitsize > vec_bits {
            shift = self.func.build_trunc(bb, shift, vec_bits);
        } else if self.func.inst(shift).bitsize < vec_bits {
            let bitsize_inst = self.func.value_inst(vec_bits as u128, 32);
            shift = self.func.build_inst2(bb, Op::Zext, shift, bitsize_inst);
        }
        let inst = self.func.build_inst2(bb, Op::Lshr, vec, shift);
        self.func.build_trunc(bb, inst, elem_bitsize)
    }

    pub(crate) fn process_unary_vec(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        lhs_elem_type: &Type,
        arg1_elem_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        let elem_bitsize = bitsize_for_type(arg1_elem_type)? as u32;
        let mut nof_elt = self.func.inst(arg1).bitsize / elem_bitsize;
        let mut start_idx = 0;
        let mut code = code;

        if matches!(
            code,
            UnaryCode::VecUnpackLo
                | UnaryCode::VecUnpackHi
                | UnaryCode::VecUnpackFloatLo
                | UnaryCode::VecUnpackFloatHi
        ) {
            if matches!(code, UnaryCode::VecUnpackHi | UnaryCode::VecUnpackFloatHi) {
                start_idx = nof_elt / 2;
            } else {
                nof_elt /= 2;
            }
            code = UnaryCode::Convert;
        }

        let mut res: Option<InstId> = None;
        let mut res_undef: Option<InstId> = None;
        for i in start_idx..nof_elt {
            let a1 = self.extract_vec_elem(bb, arg1, elem_bitsize, i);
            let a1_undef = arg1_undef.map(|u| self.extract_vec_elem(bb, u, elem_bitsize, i));
            let (inst, inst_undef) =
                self.process_unary_scalar(code, a1, a1_undef, lhs_elem_type, arg1_elem_type, bb)?;

            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });
            // Lanes that consume their undef bits (a widening conversion
            // checks them as UB) leave the result without a mask.
            if let Some(inst_undef) = inst_undef {
                res_undef = Some(match res_undef {
                    Some(r) => self.func.build_inst2(bb, Op::Concat, inst_undef, r),
                    None => inst_undef,
                });
            }
        }
        Ok((res.unwrap(), res_undef))
    }

    pub(crate) fn process_binary_vec(
        &mut self,
        code: BinaryCode,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        arg2: InstId,
        arg2_undef: Option<InstId>,
        lhs_type: &Type,
        arg1_type: &Type,
        arg2_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        assert!(lhs_type.is_vector());
        assert!(arg1_type.is_vector());
        let lhs_elem_type = lhs_type.element_type().unwrap().clone();
        let arg1_elem_type = arg1_type.element_type().unwrap().clone();
        let arg2_elem_type = if arg2_type.is_vector() {
            arg2_type.element_type().unwrap().clone()
        } else {
            arg2_type.clone()
        };

        if matches!(code, BinaryCode::VecPackTrunc | BinaryCode::VecPackFixTrunc) {
            if let Some(undef) = arg1_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            if let Some(undef) = arg2_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            let arg = self.func.build_inst2(bb, Op::Concat, arg2, arg1);
            return self.process_unary_vec(
                UnaryCode::Convert,
                arg,
                None,
                &lhs_elem_type,
                &arg1_elem_type,
                bb,
            );
        }

        let elem_bitsize = bitsize_for_type(&arg1_elem_type)? as u32;
        let mut nof_elt = bitsize_for_type(arg1_type)? as u32 / elem_bitsize;
        let mut start_idx = 0;
        let mut code = code;

        if matches!(code, BinaryCode::VecWidenMultLo | BinaryCode::VecWidenMultHi) {
            if code == BinaryCode::VecWidenMultHi {
                start_idx = nof_elt / 2;
            } else {
                nof_elt /= 2;
            }
            code = BinaryCode::WidenMult;
        }

        let mut res: Option<InstId> = None;
        let mut res_undef: Option<InstId> = None;
        for i in start_idx..nof_elt {
            let a1 = self.extract_vec_elem(bb, arg1, elem_bitsize, i);
            let a1_undef = arg1_undef.map(|u| self.extract_vec_elem(bb, u, elem_bitsize, i));
            let (a2, a2_undef) = if arg2_type.is_vector() {
                let a2 = self.extract_vec_elem(bb, arg2, elem_bitsize, i);
                let a2_undef = arg2_undef.map(|u| self.extract_vec_elem(bb, u, elem_bitsize, i));
                (a2, a2_undef)
            } else {
                (arg2, arg2_undef)
            };
            let (inst, inst_undef) = self.process_binary_scalar(
                code,
                a1,
                a1_undef,
                a2,
                a2_undef,
                &lhs_elem_type,
                &arg1_elem_type,
                &arg2_elem_type,
                bb,
            )?;
            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });
            if let Some(inst_undef) = inst_undef {
                res_undef = Some(match res_undef {
                    Some(r) => self.func.build_inst2(bb, Op::Concat, inst_undef, r),
                    None => inst_undef,
                });
            }
        }
        Ok((res.unwrap(), res_undef))
    }

    pub(crate) fn process_ternary_vec(
        &mut self,
        code: TernaryCode,
        arg1: InstId,
        arg2: InstId,
        arg3: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        arg2_type: &Type,
        arg3_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        assert!(lhs_type.is_vector());
        assert!(arg1_type.is_vector() && arg2_type.is_vector() && arg3_type.is_vector());

        let arg1_elem_type = arg1_type.element_type().unwrap().clone();
        let arg1_elem_bitsize = bitsize_for_type(&arg1_elem_type)? as u32;
        let arg2_elem_type = arg2_type.element_type().unwrap().clone();
        let arg2_elem_bitsize = bitsize_for_type(&arg2_elem_type)? as u32;
        let arg3_elem_type = arg3_type.element_type().unwrap().clone();
        let arg3_elem_bitsize = bitsize_for_type(&arg3_elem_type)? as u32;

        // Reductions such as SAD have fewer elements in arg3 and iterate
        // over it multiple times, accumulating.
        let nof_elt3 = bitsize_for_type(arg3_type)? as u32 / arg3_elem_bitsize;
        let nof_elt = bitsize_for_type(arg1_type)? as u32 / arg1_elem_bitsize;
        let mut arg3 = arg3;
        let mut res: Option<InstId> = None;
        for i in 0..nof_elt {
            let a1 = self.extract_vec_elem(bb, arg1, arg1_elem_bitsize, i);
            let a2 = self.extract_vec_elem(bb, arg2, arg2_elem_bitsize, i);
            let i3 = i % nof_elt3;
            if i3 == 0 && res.is_some() {
                arg3 = res.take().unwrap();
            }
            let a3 = self.extract_vec_elem(bb, arg3, arg3_elem_bitsize, i3);
            let inst = self.process_ternary(
                code,
                a1,
                a2,
                a3,
                &arg1_elem_type,
                &arg2_elem_type,
                &arg3_elem_type,
                bb,
            )?;
            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });
        }
        Ok(res.unwrap())
    }

    pub(crate) fn process_vec_cond(
        &mut self,
        arg1: InstId,
        arg2: InstId,
        arg2_undef: Option<InstId>,
        arg3: InstId,
        arg3_undef: Option<InstId>,
        arg1_type: &Type,
        arg2_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        assert!(arg1_type.is_vector());
        assert!(arg2_type.is_vector());
        assert_eq!(self.func.inst(arg2).bitsize, self.func.inst(arg3).bitsize);

        let has_undef = arg2_undef.is_some() || arg3_undef.is_some();
        let (arg2_undef, arg3_undef) = if has_undef {
            let bits2 = self.func.inst(arg2).bitsize;
            let bits3 = self.func.inst(arg3).bitsize;
            let zero2 = self.func.value_inst(0, bits2);
            let zero3 = self.func.value_inst(0, bits3);
            (
                Some(arg2_undef.unwrap_or(zero2)),
                Some(arg3_undef.unwrap_or(zero3)),
            )
        } else {
            (None, None)
        };

        let arg1_elem_type = arg1_type.element_type().unwrap().clone();
        assert!(arg1_elem_type.is_bool());
        let arg2_elem_type = arg2_type.element_type().unwrap().clone();

        let elem_bitsize1 = bitsize_for_type(&arg1_elem_type)? as u32;
        let elem_bitsize2 = bitsize_for_type(&arg2_elem_type)? as u32;

        let mut res: Option<InstId> = None;
        let mut res_undef: Option<InstId> = None;
        let nof_elt = bitsize_for_type(arg1_type)? as u32 / elem_bitsize1;
        for i in 0..nof_elt {
            let mut a1 = self.extract_vec_elem(bb, arg1, elem_bitsize1, i);
            if elem_bitsize1 != 1 {
                a1 = self.func.build_extract_bit(bb, a1, 0);
            }
            let a2 = self.extract_vec_elem(bb, arg2, elem_bitsize2, i);
            let a3 = self.extract_vec_elem(bb, arg3, elem_bitsize2, i);

            if let (Some(u2), Some(u3)) = (arg2_undef, arg3_undef) {
                let a2_undef = self.extract_vec_elem(bb, u2, elem_bitsize2, i);
                let a3_undef = self.extract_vec_elem(bb, u3, elem_bitsize2, i);
                let undef = self.func.build_inst3(bb, Op::Ite, a1, a2_undef, a3_undef);
                res_undef = Some(match res_undef {
                    Some(r) => self.func.build_inst2(bb, Op::Concat, undef, r),
                    None => undef,
                });
            }

            let inst = self.func.build_inst3(bb, Op::Ite, a1, a2, a3);
            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });
        }
        Ok((res.unwrap(), res_undef))
    }

    pub(crate) fn process_vec_perm_expr(
        &mut self,
        bb: BlockId,
        arg1_expr: &Expr,
        arg2_expr: &Expr,
        arg3_expr: &Expr,
    ) -> Result<ValUndef> {
        let (arg1, arg1_undef) = self.tree2inst(bb, arg1_expr)?;
        let (arg2, arg2_undef) = self.tree2inst(bb, arg2_expr)?;
        let arg3 = self.tree2inst_undef_check(bb, arg3_expr)?;
        assert_eq!(self.func.inst(arg1).bitsize, self.func.inst(arg2).bitsize);
        let arg1_elem_type = arg1_expr.ty.element_type().unwrap().clone();
        let arg3_elem_type = arg3_expr.ty.element_type().unwrap().clone();
        let elem_bitsize1 = bitsize_for_type(&arg1_elem_type)? as u32;
        let elem_bitsize3 = bitsize_for_type(&arg3_elem_type)? as u32;
        let nof_elt1 = bitsize_for_type(&arg1_expr.ty)? as u32 / elem_bitsize1;
        let nof_elt3 = bitsize_for_type(&arg3_expr.ty)? as u32 / elem_bitsize3;

        let has_undef = arg1_undef.is_some() || arg2_undef.is_some();
        let (arg1_undef, arg2_undef) = if has_undef {
            let bits = self.func.inst(arg1).bitsize;
            let zero = self.func.value_inst(0, bits);
            (
                Some(arg1_undef.unwrap_or(zero)),
                Some(arg2_undef.unwrap_or(zero)),
            )
        } else {
            (None, None)
        };

        let mask1 = self
            .func
            .value_inst(nof_elt1 as u128 * 2 - 1, elem_bitsize3);
        let mask2 = self.func.value_inst(nof_elt1 as u128 - 1, elem_bitsize3);
        let nof_elt_inst = self.func.value_inst(nof_elt1 as u128, elem_bitsize3);
        let mut res: Option<InstId> = None;
        let mut res_undef: Option<InstId> = None;
        for i in 0..nof_elt3 {
            let idx = self.extract_vec_elem(bb, arg3, elem_bitsize3, i);
            let idx1 = self.func.build_inst2(bb, Op::And, idx, mask1);
            let idx2 = self.func.build_inst2(bb, Op::And, idx1, mask2);
            let cmp = self.func.build_inst2(bb, Op::Ult, idx1, nof_elt_inst);
            let elt1 = self.extract_elem(bb, arg1, elem_bitsize1, idx2);
            let elt2 = self.extract_elem(bb, arg2, elem_bitsize1, idx2);
            let inst = self.func.build_inst3(bb, Op::Ite, cmp, elt1, elt2);
            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });

            if let (Some(u1), Some(u2)) = (arg1_undef, arg2_undef) {
                let undef1 = self.extract_elem(bb, u1, elem_bitsize1, idx2);
                let undef2 = self.extract_elem(bb, u2, elem_bitsize1, idx2);
                let undef = self.func.build_inst3(bb, Op::Ite, cmp, undef1, undef2);
                res_undef = Some(match res_undef {
                    Some(r) => self.func.build_inst2(bb, Op::Concat, undef, r),
                    None => undef,
                });
            }
        }
        Ok((res.unwrap(), res_undef))
    }

    /// Concatenate constructor elements into a vector value. The element
    /// undef masks are concatenated too, but only reported when at least
    /// one element actually carried one, so fully defined constructors do
    /// not force UB checks at every use.
    pub(crate) fn vector_constructor(&mut self, bb: BlockId, expr: &Expr) -> Result<ValUndef> {
        let ExprKind::Constructor {
            elems, no_clearing, ..
        } = &expr.kind
        else {
            panic!("vector_constructor on non-constructor");
        };
        assert!(expr.ty.is_vector());
        let vector_size = bytesize_for_type(&expr.ty)? as u32 * 8;
        let mut res: Option<InstId> = None;
        let mut undef: Option<InstId> = None;
        let mut any_elem_has_undef = false;
        // The elements may have different sizes; a vector may be built by
        // concatenating a scalar with a shorter vector.
        for (idx, value) in elems.iter() {
            let (elem, elem_undef) = self.tree2inst(bb, value)?;
            let elem_undef = match elem_undef {
                Some(u) => {
                    any_elem_has_undef = true;
                    u
                }
                None => {
                    let bits = self.func.inst(elem).bitsize;
                    self.func.value_inst(0, bits)
                }
            };
            match (res, undef) {
                (Some(r), Some(u)) => {
                    res = Some(self.func.build_inst2(bb, Op::Concat, elem, r));
                    undef = Some(self.func.build_inst2(bb, Op::Concat, elem_undef, u));
                }
                _ => {
                    assert!(matches!(idx, CtorIndex::Element(0)) || elems.len() == 1);
                    res = Some(elem);
                    undef = Some(elem_undef);
                }
            }
        }
        let mut res = res.expect("empty vector constructor");
        let mut undef = undef.unwrap();
        assert!(self.func.inst(res).bitsize <= vector_size);
        if *no_clearing {
            return Err(Error::not_implemented(
                "vector_constructor: CONSTRUCTOR_NO_CLEARING",
            ));
        }
        if self.func.inst(res).bitsize != vector_size {
            let pad = vector_size - self.func.inst(res).bitsize;
            let zero = self.func.value_inst(0, pad);
            res = self.func.build_inst2(bb, Op::Concat, zero, res);
            undef = self.func.build_inst2(bb, Op::Concat, zero, undef);
        }
        Ok((res, any_elem_has_undef.then_some(undef)))
    }

    /// Indexing a vector through its array view: UB when the index is out
    /// of bounds, otherwise a shifted extract.
    pub(crate) fn vector_as_array(&mut self, bb: BlockId, expr: &Expr) -> Result<ValUndef> {
        let ExprKind::ArrayRef { array, index } = &expr.kind else {
            panic!("vector_as_array on non-array-ref");
        };
        let ExprKind::ViewConvert { operand } = &array.kind else {
            panic!("vector_as_array without view-convert");
        };
        assert!(operand.ty.is_vector());
        let elem_type = array.ty.element_type().unwrap().clone();

        let (inst, undef) = self.tree2inst(bb, operand)?;

        let vector_size = bytesize_for_type(&array.ty)?;
        let elem_size = bytesize_for_type(&elem_type)?;
        assert!(vector_size % elem_size == 0);

        let idx = self.tree2inst_undef_check(bb, index)?;
        let idx_bits = self.func.inst(idx).bitsize;
        let nof_elems = self
            .func
            .value_inst((vector_size / elem_size) as u128, idx_bits);
        let cond = self.func.build_inst2(bb, Op::Uge, idx, nof_elems);
        self.func.build_inst1(bb, Op::Ub, cond);

        let elm_bitsize = self.func.value_inst(elem_size as u128 * 8, idx_bits);
        let mut shift = self.func.build_inst2(bb, Op::Mul, idx, elm_bitsize);

        let inst_bits = self.func.inst(inst).bitsize;
        if inst_bits > self.func.inst(shift).bitsize {
            let bitsize_inst = self.func.value_inst(inst_bits as u128, 32);
            shift = self.func.build_inst2(bb, Op::Zext, shift, bitsize_inst);
        } else if inst_bits < self.func.inst(shift).bitsize {
            shift = self.func.build_trunc(bb, shift, inst_bits);
        }
        let inst = self.func.build_inst2(bb, Op::Lshr, inst, shift);
        let inst = self.func.build_trunc(bb, inst, elem_size as u32 * 8);
        let inst = self.from_mem_repr(bb, inst, &elem_type)?;
        let undef = match undef {
            Some(u) => {
                let u = self.func.build_inst2(bb, Op::Lshr, u, shift);
                let u = self.func.build_trunc(bb, u, elem_size as u32 * 8);
                Some(self.from_mem_repr(bb, u, &elem_type)?)
            }
            None => None,
        };
        Ok((inst, undef))
    }
}
