//! Scalar expression lowering: integer, boolean, floating-point and complex
//! unary/binary operations, with their UB conditions and undef propagation.

use super::*;
use crate::tree::{TernaryCode, UnaryCode};

impl<'a> Converter<'a> {
    pub(crate) fn process_unary_bool(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        assert!(lhs_type.is_bool());
        let (lhs, lhs_undef) =
            self.process_unary_int(code, arg1, arg1_undef, lhs_type, arg1_type, bb)?;
        if self.func.inst(lhs).bitsize > 1 {
            self.check_wide_bool(lhs, lhs_type, bb);
        }
        assert_eq!(
            self.func.inst(lhs).bitsize as u64,
            bitsize_for_type(lhs_type)?
        );
        Ok((lhs, lhs_undef))
    }

    pub(crate) fn process_unary_int_value(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let bitsize = self.func.inst(arg1).bitsize;
        match code {
            UnaryCode::Abs => {
                if !lhs_type.overflow_wraps() {
                    let min_int = self.func.value_inst(1u128 << (bitsize - 1), bitsize);
                    let cond = self.func.build_inst2(bb, Op::Eq, arg1, min_int);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                assert!(!arg1_type.is_unsigned());
                let neg = self.func.build_inst1(bb, Op::Neg, arg1);
                let zero = self.func.value_inst(0, bitsize);
                let cond = self.func.build_inst2(bb, Op::Sge, arg1, zero);
                Ok(self.func.build_inst3(bb, Op::Ite, cond, arg1, neg))
            }
            UnaryCode::Absu => {
                assert!(!arg1_type.is_unsigned());
                let neg = self.func.build_inst1(bb, Op::Neg, arg1);
                let zero = self.func.value_inst(0, bitsize);
                let cond = self.func.build_inst2(bb, Op::Sge, arg1, zero);
                Ok(self.func.build_inst3(bb, Op::Ite, cond, arg1, neg))
            }
            UnaryCode::BitNot => Ok(self.func.build_inst1(bb, Op::Not, arg1)),
            UnaryCode::FixTrunc => self.type_convert(arg1, arg1_type, lhs_type, bb),
            UnaryCode::Negate => {
                if !lhs_type.overflow_wraps() {
                    let min_int = self.func.value_inst(1u128 << (bitsize - 1), bitsize);
                    let cond = self.func.build_inst2(bb, Op::Eq, arg1, min_int);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                Ok(self.func.build_inst1(bb, Op::Neg, arg1))
            }
            UnaryCode::Convert => self.type_convert(arg1, arg1_type, lhs_type, bb),
            _ => Err(Error::not_implemented(format!(
                "process_unary_int: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_unary_int(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        // Codes that accept indeterminate bits.
        match code {
            UnaryCode::BitNot => {
                return Ok((self.func.build_inst1(bb, Op::Not, arg1), arg1_undef));
            }
            UnaryCode::Convert => {
                if arg1_type.is_integral() && lhs_type.is_integral() {
                    let dest_prec = bitsize_for_type(lhs_type)? as u32;
                    if dest_prec == self.func.inst(arg1).bitsize {
                        return Ok((arg1, arg1_undef));
                    }
                    if dest_prec < self.func.inst(arg1).bitsize {
                        let arg1 = self.func.build_trunc(bb, arg1, dest_prec);
                        let arg1_undef = match arg1_undef {
                            Some(u) => Some(self.func.build_trunc(bb, u, dest_prec)),
                            None => None,
                        };
                        return Ok((arg1, arg1_undef));
                    }
                }
            }
            _ => {}
        }

        // Everything else is UB on indeterminate operands.
        if let Some(undef) = arg1_undef {
            self.build_ub_if_not_zero(bb, undef);
        }
        let res = self.process_unary_int_value(code, arg1, lhs_type, arg1_type, bb)?;
        Ok((res, None))
    }

    pub(crate) fn process_unary_float_value(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        match code {
            UnaryCode::Abs => Ok(self.func.build_inst1(bb, Op::Fabs, arg1)),
            UnaryCode::Float => self.type_convert(arg1, arg1_type, lhs_type, bb),
            UnaryCode::Negate => Ok(self.func.build_inst1(bb, Op::Fneg, arg1)),
            UnaryCode::Convert => self.type_convert(arg1, arg1_type, lhs_type, bb),
            UnaryCode::Paren => Ok(arg1),
            _ => Err(Error::not_implemented(format!(
                "process_unary_float: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_unary_complex(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        lhs_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let elem_type = lhs_type.element_type().unwrap().clone();
        let bitsize = self.func.inst(arg1).bitsize;
        let elem_bitsize = bitsize / 2;
        let real_high = self.func.value_inst(elem_bitsize as u128 - 1, 32);
        let real_low = self.func.value_inst(0, 32);
        let imag_high = self.func.value_inst(bitsize as u128 - 1, 32);
        let imag_low = self.func.value_inst(elem_bitsize as u128, 32);
        let arg1_real = self
            .func
            .build_inst3(bb, Op::Extract, arg1, real_high, real_low);
        let arg1_real = self.from_mem_repr(bb, arg1_real, &elem_type)?;
        let arg1_imag = self
            .func
            .build_inst3(bb, Op::Extract, arg1, imag_high, imag_low);
        let arg1_imag = self.from_mem_repr(bb, arg1_imag, &elem_type)?;

        match code {
            UnaryCode::Conj => {
                let inst_imag = self.process_unary_scalar_value(
                    UnaryCode::Negate,
                    arg1_imag,
                    &elem_type,
                    &elem_type,
                    bb,
                )?;
                let real = self.to_mem_repr(bb, arg1_real, &elem_type)?;
                let imag = self.to_mem_repr(bb, inst_imag, &elem_type)?;
                Ok(self.func.build_inst2(bb, Op::Concat, imag, real))
            }
            UnaryCode::Negate => {
                let inst_real =
                    self.process_unary_scalar_value(code, arg1_real, &elem_type, &elem_type, bb)?;
                let inst_imag =
                    self.process_unary_scalar_value(code, arg1_imag, &elem_type, &elem_type, bb)?;
                let real = self.to_mem_repr(bb, inst_real, &elem_type)?;
                let imag = self.to_mem_repr(bb, inst_imag, &elem_type)?;
                Ok(self.func.build_inst2(bb, Op::Concat, imag, real))
            }
            _ => Err(Error::not_implemented(format!(
                "process_unary_complex: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_unary_scalar(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        if lhs_type.is_bool() {
            self.process_unary_bool(code, arg1, arg1_undef, lhs_type, arg1_type, bb)
        } else if lhs_type.is_float() {
            if let Some(undef) = arg1_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            let res = self.process_unary_float_value(code, arg1, lhs_type, arg1_type, bb)?;
            Ok((res, None))
        } else {
            self.process_unary_int(code, arg1, arg1_undef, lhs_type, arg1_type, bb)
        }
    }

    pub(crate) fn process_unary_scalar_value(
        &mut self,
        code: UnaryCode,
        arg1: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let (inst, undef) = self.process_unary_scalar(code, arg1, None, lhs_type, arg1_type, bb)?;
        assert!(undef.is_none());
        Ok(inst)
    }

    pub(crate) fn process_binary_float(
        &mut self,
        code: BinaryCode,
        arg1: InstId,
        arg2: InstId,
        bb: BlockId,
    ) -> Result<InstId> {
        let unordered_or = |conv: &mut Self, bb: BlockId, cmp: InstId| -> InstId {
            let isnan1 = conv.func.build_inst2(bb, Op::Fne, arg1, arg1);
            let isnan2 = conv.func.build_inst2(bb, Op::Fne, arg2, arg2);
            let isnan = conv.func.build_inst2(bb, Op::Or, isnan1, isnan2);
            conv.func.build_inst2(bb, Op::Or, isnan, cmp)
        };
        match code {
            BinaryCode::Eq => Ok(self.func.build_inst2(bb, Op::Feq, arg1, arg2)),
            BinaryCode::Ne => Ok(self.func.build_inst2(bb, Op::Fne, arg1, arg2)),
            BinaryCode::Ge => Ok(self.func.build_inst2(bb, Op::Fge, arg1, arg2)),
            BinaryCode::Gt => Ok(self.func.build_inst2(bb, Op::Fgt, arg1, arg2)),
            BinaryCode::Le => Ok(self.func.build_inst2(bb, Op::Fle, arg1, arg2)),
            BinaryCode::Lt => Ok(self.func.build_inst2(bb, Op::Flt, arg1, arg2)),
            BinaryCode::UnEq => {
                let cmp = self.func.build_inst2(bb, Op::Feq, arg1, arg2);
                Ok(unordered_or(self, bb, cmp))
            }
            BinaryCode::UnLt => {
                let cmp = self.func.build_inst2(bb, Op::Flt, arg1, arg2);
                Ok(unordered_or(self, bb, cmp))
            }
            BinaryCode::UnLe => {
                let cmp = self.func.build_inst2(bb, Op::Fle, arg1, arg2);
                Ok(unordered_or(self, bb, cmp))
            }
            BinaryCode::UnGt => {
                let cmp = self.func.build_inst2(bb, Op::Fgt, arg1, arg2);
                Ok(unordered_or(self, bb, cmp))
            }
            BinaryCode::UnGe => {
                let cmp = self.func.build_inst2(bb, Op::Fge, arg1, arg2);
                Ok(unordered_or(self, bb, cmp))
            }
            BinaryCode::Unordered => {
                let isnan1 = self.func.build_inst2(bb, Op::Fne, arg1, arg1);
                let isnan2 = self.func.build_inst2(bb, Op::Fne, arg2, arg2);
                Ok(self.func.build_inst2(bb, Op::Or, isnan1, isnan2))
            }
            BinaryCode::Ordered => {
                let isnan1 = self.func.build_inst2(bb, Op::Fne, arg1, arg1);
                let isnan2 = self.func.build_inst2(bb, Op::Fne, arg2, arg2);
                let isnan = self.func.build_inst2(bb, Op::Or, isnan1, isnan2);
                Ok(self.func.build_inst1(bb, Op::Not, isnan))
            }
            BinaryCode::Ltgt => {
                let lt = self.func.build_inst2(bb, Op::Flt, arg1, arg2);
                let gt = self.func.build_inst2(bb, Op::Fgt, arg1, arg2);
                Ok(self.func.build_inst2(bb, Op::Or, lt, gt))
            }
            BinaryCode::Rdiv => Ok(self.func.build_inst2(bb, Op::Fdiv, arg1, arg2)),
            BinaryCode::Minus => Ok(self.func.build_inst2(bb, Op::Fsub, arg1, arg2)),
            BinaryCode::Mult => Ok(self.func.build_inst2(bb, Op::Fmul, arg1, arg2)),
            BinaryCode::Plus => Ok(self.func.build_inst2(bb, Op::Fadd, arg1, arg2)),
            _ => Err(Error::not_implemented(format!(
                "process_binary_float: {:?}",
                code
            ))),
        }
    }

    fn split_complex(
        &mut self,
        arg: InstId,
        elem_type: &Type,
        bb: BlockId,
    ) -> Result<(InstId, InstId)> {
        let bitsize = self.func.inst(arg).bitsize;
        let elem_bitsize = bitsize / 2;
        let real_high = self.func.value_inst(elem_bitsize as u128 - 1, 32);
        let real_low = self.func.value_inst(0, 32);
        let imag_high = self.func.value_inst(bitsize as u128 - 1, 32);
        let imag_low = self.func.value_inst(elem_bitsize as u128, 32);
        let real = self
            .func
            .build_inst3(bb, Op::Extract, arg, real_high, real_low);
        let real = self.from_mem_repr(bb, real, elem_type)?;
        let imag = self
            .func
            .build_inst3(bb, Op::Extract, arg, imag_high, imag_low);
        let imag = self.from_mem_repr(bb, imag, elem_type)?;
        Ok((real, imag))
    }

    pub(crate) fn process_binary_complex(
        &mut self,
        code: BinaryCode,
        arg1: InstId,
        arg2: InstId,
        lhs_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let elem_type = lhs_type.element_type().unwrap().clone();
        let (arg1_real, arg1_imag) = self.split_complex(arg1, &elem_type, bb)?;
        let (arg2_real, arg2_imag) = self.split_complex(arg2, &elem_type, bb)?;

        match code {
            BinaryCode::Minus | BinaryCode::Plus => {
                let inst_real = self.process_binary_scalar_value(
                    code, arg1_real, arg2_real, &elem_type, &elem_type, &elem_type, bb,
                )?;
                let inst_imag = self.process_binary_scalar_value(
                    code, arg1_imag, arg2_imag, &elem_type, &elem_type, &elem_type, bb,
                )?;
                let real = self.to_mem_repr(bb, inst_real, &elem_type)?;
                let imag = self.to_mem_repr(bb, inst_imag, &elem_type)?;
                Ok(self.func.build_inst2(bb, Op::Concat, imag, real))
            }
            _ => Err(Error::not_implemented(format!(
                "process_binary_complex: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_binary_complex_cmp(
        &mut self,
        code: BinaryCode,
        arg1: InstId,
        arg2: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let elem_type = arg1_type.element_type().unwrap().clone();
        let (arg1_real, arg1_imag) = self.split_complex(arg1, &elem_type, bb)?;
        let (arg2_real, arg2_imag) = self.split_complex(arg2, &elem_type, bb)?;

        match code {
            BinaryCode::Eq | BinaryCode::Ne => {
                let cmp_real = self.process_binary_scalar_value(
                    code, arg1_real, arg2_real, lhs_type, &elem_type, &elem_type, bb,
                )?;
                let cmp_imag = self.process_binary_scalar_value(
                    code, arg1_imag, arg2_imag, lhs_type, &elem_type, &elem_type, bb,
                )?;
                let op = if code == BinaryCode::Eq {
                    Op::And
                } else {
                    Op::Or
                };
                Ok(self.func.build_inst2(bb, op, cmp_real, cmp_imag))
            }
            _ => Err(Error::not_implemented(format!(
                "process_binary_complex_cmp: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_binary_bool(
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
        assert!(lhs_type.is_bool());

        let mut lhs;
        let mut lhs_undef = None;
        if arg1_type.is_float() {
            if let Some(undef) = arg1_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            if let Some(undef) = arg2_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            lhs = self.process_binary_float(code, arg1, arg2, bb)?;
        } else {
            let (l, u) = self.process_binary_int(
                code,
                arg1_type.is_unsigned(),
                arg1,
                arg1_undef,
                arg2,
                arg2_undef,
                lhs_type,
                arg1_type,
                arg2_type,
                bb,
            )?;
            lhs = l;
            lhs_undef = u;
        }

        // The host may use wide booleans (such as signed-boolean:8), so the
        // 1-bit comparison result may need widening.
        let precision = bitsize_for_type(lhs_type)? as u32;
        if self.func.inst(lhs).bitsize == 1 && precision > 1 {
            let bitsize_inst = self.func.value_inst(precision as u128, 32);
            let op = if lhs_type.is_unsigned() {
                Op::Zext
            } else {
                Op::Sext
            };
            lhs = self.func.build_inst2(bb, op, lhs, bitsize_inst);
            if let Some(u) = lhs_undef {
                lhs_undef = Some(self.func.build_inst2(bb, op, u, bitsize_inst));
            }
        }
        if self.func.inst(lhs).bitsize > 1 {
            self.check_wide_bool(lhs, lhs_type, bb);
        }

        assert_eq!(self.func.inst(lhs).bitsize, precision);
        Ok((lhs, lhs_undef))
    }

    pub(crate) fn process_binary_int_value(
        &mut self,
        code: BinaryCode,
        is_unsigned: bool,
        arg1: InstId,
        arg2: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        arg2_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let bitsize = self.func.inst(arg1).bitsize;
        match code {
            BinaryCode::Eq => Ok(self.func.build_inst2(bb, Op::Eq, arg1, arg2)),
            BinaryCode::Ne => Ok(self.func.build_inst2(bb, Op::Ne, arg1, arg2)),
            BinaryCode::Ge => {
                let op = if is_unsigned { Op::Uge } else { Op::Sge };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Gt => {
                let op = if is_unsigned { Op::Ugt } else { Op::Sgt };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Le => {
                let op = if is_unsigned { Op::Ule } else { Op::Sle };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Lt => {
                let op = if is_unsigned { Op::Ult } else { Op::Slt };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::BitAnd => Ok(self.func.build_inst2(bb, Op::And, arg1, arg2)),
            BinaryCode::BitIor => Ok(self.func.build_inst2(bb, Op::Or, arg1, arg2)),
            BinaryCode::BitXor => Ok(self.func.build_inst2(bb, Op::Xor, arg1, arg2)),
            BinaryCode::ExactDiv => {
                if !lhs_type.overflow_wraps() {
                    let min_int = self.func.value_inst(1u128 << (bitsize - 1), bitsize);
                    let minus1 = self.func.value_inst(u128::MAX, bitsize);
                    let cond1 = self.func.build_inst2(bb, Op::Eq, arg1, min_int);
                    let cond2 = self.func.build_inst2(bb, Op::Eq, arg2, minus1);
                    let ub_cond = self.func.build_inst2(bb, Op::And, cond1, cond2);
                    self.func.build_inst1(bb, Op::Ub, ub_cond);
                }
                let zero = self.func.value_inst(0, bitsize);
                let rem_op = if is_unsigned { Op::Urem } else { Op::Srem };
                let rem = self.func.build_inst2(bb, rem_op, arg1, arg2);
                let ub_cond = self.func.build_inst2(bb, Op::Ne, rem, zero);
                self.func.build_inst1(bb, Op::Ub, ub_cond);
                let ub_cond2 = self.func.build_inst2(bb, Op::Eq, arg2, zero);
                self.func.build_inst1(bb, Op::Ub, ub_cond2);
                let div_op = if is_unsigned { Op::Udiv } else { Op::Sdiv };
                Ok(self.func.build_inst2(bb, div_op, arg1, arg2))
            }
            BinaryCode::Lshift => {
                let shift_ub = self
                    .func
                    .value_inst(bitsize as u128, self.func.inst(arg2).bitsize);
                let cond = self.func.build_inst2(bb, Op::Uge, arg2, shift_ub);
                self.func.build_inst1(bb, Op::Ub, cond);
                let arg2 = self.type_convert(arg2, arg2_type, arg1_type, bb)?;
                Ok(self.func.build_inst2(bb, Op::Shl, arg1, arg2))
            }
            BinaryCode::Rshift => {
                let shift_ub = self
                    .func
                    .value_inst(bitsize as u128, self.func.inst(arg2).bitsize);
                let cond = self.func.build_inst2(bb, Op::Uge, arg2, shift_ub);
                self.func.build_inst1(bb, Op::Ub, cond);
                let op = if is_unsigned { Op::Lshr } else { Op::Ashr };
                let arg2 = self.type_convert(arg2, arg2_type, arg1_type, bb)?;
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Lrotate | BinaryCode::Rrotate => {
                let shift_ub = self
                    .func
                    .value_inst(bitsize as u128, self.func.inst(arg2).bitsize);
                let cond = self.func.build_inst2(bb, Op::Uge, arg2, shift_ub);
                self.func.build_inst1(bb, Op::Ub, cond);
                let arg2 = self.type_convert(arg2, arg2_type, arg1_type, bb)?;
                let concat = self.func.build_inst2(bb, Op::Concat, arg1, arg1);
                let concat_bits = self.func.inst(concat).bitsize;
                let bitsize_inst = self.func.value_inst(concat_bits as u128, 32);
                let shift = self.func.build_inst2(bb, Op::Zext, arg2, bitsize_inst);
                if code == BinaryCode::Rrotate {
                    let shifted = self.func.build_inst2(bb, Op::Lshr, concat, shift);
                    Ok(self.func.build_trunc(bb, shifted, bitsize))
                } else {
                    let shifted = self.func.build_inst2(bb, Op::Shl, concat, shift);
                    let high = self.func.value_inst(2 * bitsize as u128 - 1, 32);
                    let low = self.func.value_inst(bitsize as u128, 32);
                    Ok(self.func.build_inst3(bb, Op::Extract, shifted, high, low))
                }
            }
            BinaryCode::Max => {
                let op = if is_unsigned { Op::Umax } else { Op::Smax };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Min => {
                let op = if is_unsigned { Op::Umin } else { Op::Smin };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::Minus => {
                if !lhs_type.overflow_wraps() {
                    let cond = self.func.build_inst2(bb, Op::SsubWraps, arg1, arg2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                Ok(self.func.build_inst2(bb, Op::Sub, arg1, arg2))
            }
            BinaryCode::Mult => {
                if !lhs_type.overflow_wraps() {
                    let cond = self.func.build_inst2(bb, Op::SmulWraps, arg1, arg2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                Ok(self.func.build_inst2(bb, Op::Mul, arg1, arg2))
            }
            BinaryCode::Plus => {
                if !lhs_type.overflow_wraps() {
                    let cond = self.func.build_inst2(bb, Op::SaddWraps, arg1, arg2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                Ok(self.func.build_inst2(bb, Op::Add, arg1, arg2))
            }
            BinaryCode::PointerDiff => {
                // Pointers subtract as unsigned values and the result must
                // fit in a signed integer of the same width.
                assert_eq!(bitsize, self.func.inst(arg2).bitsize);
                let ext_bitsize = self.func.value_inst(bitsize as u128 + 1, 32);
                let earg1 = self.func.build_inst2(bb, Op::Zext, arg1, ext_bitsize);
                let earg2 = self.func.build_inst2(bb, Op::Zext, arg2, ext_bitsize);
                let eres = self.func.build_inst2(bb, Op::Sub, earg1, earg2);
                let etop_idx = self.func.value_inst(bitsize as u128, 32);
                let etop_bit = self
                    .func
                    .build_inst3(bb, Op::Extract, eres, etop_idx, etop_idx);
                let top_idx = self.func.value_inst(bitsize as u128 - 1, 32);
                let top_bit = self
                    .func
                    .build_inst3(bb, Op::Extract, eres, top_idx, top_idx);
                let cmp = self.func.build_inst2(bb, Op::Ne, top_bit, etop_bit);
                self.func.build_inst1(bb, Op::Ub, cmp);
                Ok(self.func.build_trunc(bb, eres, bitsize))
            }
            BinaryCode::PointerPlus => {
                let arg2 = self.type_convert(arg2, arg2_type, arg1_type, bb)?;
                let ptr = self.func.build_inst2(bb, Op::Add, arg1, arg2);

                // The memory id must not change.
                let id1 = self.func.build_extract_id(bb, arg1);
                let id2 = self.func.build_extract_id(bb, ptr);
                let is_ub = self.func.build_inst2(bb, Op::Ne, id1, id2);
                self.func.build_inst1(bb, Op::Ub, is_ub);

                // Pointers are unsigned but this code is used for
                // subtraction too, so treat the addition as a subtraction
                // when the addend reads as negative, and require the
                // matching direction.
                if !lhs_type.overflow_wraps() {
                    let sub_overflow = self.func.build_inst2(bb, Op::Ugt, ptr, arg1);
                    let add_overflow = self.func.build_inst2(bb, Op::Ult, ptr, arg1);
                    let zero = self.func.value_inst(0, self.func.inst(arg2).bitsize);
                    let is_sub = self.func.build_inst2(bb, Op::Slt, arg2, zero);
                    let is_ub =
                        self.func
                            .build_inst3(bb, Op::Ite, is_sub, sub_overflow, add_overflow);
                    self.func.build_inst1(bb, Op::Ub, is_ub);
                }

                // The result cannot be null unless both operands are zero.
                {
                    let zero = self.func.value_inst(0, self.func.inst(ptr).bitsize);
                    let cond1 = self.func.build_inst2(bb, Op::Eq, ptr, zero);
                    let cond2 = self.func.build_inst2(bb, Op::Ne, arg1, zero);
                    let cond3 = self.func.build_inst2(bb, Op::Ne, arg2, zero);
                    let args_nonzero = self.func.build_inst2(bb, Op::Or, cond2, cond3);
                    let cond = self.func.build_inst2(bb, Op::And, cond1, args_nonzero);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                Ok(ptr)
            }
            BinaryCode::TruncDiv => {
                if !lhs_type.overflow_wraps() {
                    let min_int = self.func.value_inst(1u128 << (bitsize - 1), bitsize);
                    let minus1 = self.func.value_inst(u128::MAX, bitsize);
                    let cond1 = self.func.build_inst2(bb, Op::Eq, arg1, min_int);
                    let cond2 = self.func.build_inst2(bb, Op::Eq, arg2, minus1);
                    let cond = self.func.build_inst2(bb, Op::And, cond1, cond2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                let zero = self.func.value_inst(0, bitsize);
                let cond = self.func.build_inst2(bb, Op::Eq, arg2, zero);
                self.func.build_inst1(bb, Op::Ub, cond);
                let op = if is_unsigned { Op::Udiv } else { Op::Sdiv };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::TruncMod => {
                if !lhs_type.overflow_wraps() {
                    let min_int = self.func.value_inst(1u128 << (bitsize - 1), bitsize);
                    let minus1 = self.func.value_inst(u128::MAX, bitsize);
                    let cond1 = self.func.build_inst2(bb, Op::Eq, arg1, min_int);
                    let cond2 = self.func.build_inst2(bb, Op::Eq, arg2, minus1);
                    let cond = self.func.build_inst2(bb, Op::And, cond1, cond2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                let zero = self.func.value_inst(0, bitsize);
                let cond = self.func.build_inst2(bb, Op::Eq, arg2, zero);
                self.func.build_inst1(bb, Op::Ub, cond);
                let op = if is_unsigned { Op::Urem } else { Op::Srem };
                Ok(self.func.build_inst2(bb, op, arg1, arg2))
            }
            BinaryCode::WidenMult => {
                assert_eq!(bitsize, self.func.inst(arg2).bitsize);
                assert_eq!(arg1_type.is_unsigned(), arg2_type.is_unsigned());
                let new_bitsize = self.func.value_inst(2 * bitsize as u128, 32);
                let op = if is_unsigned { Op::Zext } else { Op::Sext };
                let arg1 = self.func.build_inst2(bb, op, arg1, new_bitsize);
                let arg2 = self.func.build_inst2(bb, op, arg2, new_bitsize);
                Ok(self.func.build_inst2(bb, Op::Mul, arg1, arg2))
            }
            BinaryCode::MultHighpart => {
                assert_eq!(bitsize, self.func.inst(arg2).bitsize);
                assert_eq!(arg1_type.is_unsigned(), arg2_type.is_unsigned());
                let new_bitsize = self.func.value_inst(2 * bitsize as u128, 32);
                let op = if is_unsigned { Op::Zext } else { Op::Sext };
                let arg1 = self.func.build_inst2(bb, op, arg1, new_bitsize);
                let arg2 = self.func.build_inst2(bb, op, arg2, new_bitsize);
                let mul = self.func.build_inst2(bb, Op::Mul, arg1, arg2);
                let mul_bits = self.func.inst(mul).bitsize;
                let high = self.func.value_inst(mul_bits as u128 - 1, 32);
                let low = self.func.value_inst(mul_bits as u128 / 2, 32);
                Ok(self.func.build_inst3(bb, Op::Extract, mul, high, low))
            }
            _ => Err(Error::not_implemented(format!(
                "process_binary_int: {:?}",
                code
            ))),
        }
    }

    pub(crate) fn process_binary_int(
        &mut self,
        code: BinaryCode,
        is_unsigned: bool,
        arg1: InstId,
        arg1_undef: Option<InstId>,
        arg2: InstId,
        arg2_undef: Option<InstId>,
        lhs_type: &Type,
        arg1_type: &Type,
        arg2_type: &Type,
        bb: BlockId,
    ) -> Result<ValUndef> {
        let bitsize = self.func.inst(arg1).bitsize;
        // Codes that accept indeterminate bits.
        match code {
            BinaryCode::BitAnd => {
                let res = self.func.build_inst2(bb, Op::And, arg1, arg2);
                let mut res_undef = None;
                if arg1_undef.is_some() || arg2_undef.is_some() {
                    let zero = self.func.value_inst(0, bitsize);
                    let arg1_undef = arg1_undef.unwrap_or(zero);
                    let arg2_undef = arg2_undef.unwrap_or(zero);
                    // 0 & undef is 0; 1 & undef is undef.
                    let or1 = self.func.build_inst2(bb, Op::Or, arg1, arg1_undef);
                    let or2 = self.func.build_inst2(bb, Op::Or, arg2, arg2_undef);
                    let mask = self.func.build_inst2(bb, Op::And, or1, or2);
                    let any = self.func.build_inst2(bb, Op::Or, arg1_undef, arg2_undef);
                    res_undef = Some(self.func.build_inst2(bb, Op::And, any, mask));
                }
                return Ok((res, res_undef));
            }
            BinaryCode::BitIor => {
                let res = self.func.build_inst2(bb, Op::Or, arg1, arg2);
                let mut res_undef = None;
                if arg1_undef.is_some() || arg2_undef.is_some() {
                    let zero = self.func.value_inst(0, bitsize);
                    let arg1_undef = arg1_undef.unwrap_or(zero);
                    let arg2_undef = arg2_undef.unwrap_or(zero);
                    // 0 | undef is undef; 1 | undef is 1.
                    let not1 = self.func.build_inst1(bb, Op::Not, arg1);
                    let not2 = self.func.build_inst1(bb, Op::Not, arg2);
                    let or1 = self.func.build_inst2(bb, Op::Or, not1, arg1_undef);
                    let or2 = self.func.build_inst2(bb, Op::Or, not2, arg2_undef);
                    let mask = self.func.build_inst2(bb, Op::And, or1, or2);
                    let any = self.func.build_inst2(bb, Op::Or, arg1_undef, arg2_undef);
                    res_undef = Some(self.func.build_inst2(bb, Op::And, any, mask));
                }
                return Ok((res, res_undef));
            }
            BinaryCode::Mult => {
                let mut res_undef = None;
                if arg1_undef.is_some() || arg2_undef.is_some() {
                    let zero = self.func.value_inst(0, bitsize);
                    let arg1_undef = arg1_undef.unwrap_or(zero);
                    let arg2_undef = arg2_undef.unwrap_or(zero);
                    // The result is defined when no input is indeterminate,
                    // or when one argument is a defined zero.
                    let arg1_unini = self.func.build_inst2(bb, Op::Ne, arg1_undef, zero);
                    let arg1_nonzero = self.func.build_inst2(bb, Op::Ne, arg1, zero);
                    let arg2_unini = self.func.build_inst2(bb, Op::Ne, arg2_undef, zero);
                    let arg2_nonzero = self.func.build_inst2(bb, Op::Ne, arg2, zero);
                    let or2 = self.func.build_inst2(bb, Op::Or, arg2_unini, arg2_nonzero);
                    let lhs = self.func.build_inst2(bb, Op::And, arg1_unini, or2);
                    let or1 = self.func.build_inst2(bb, Op::Or, arg1_unini, arg1_nonzero);
                    let rhs = self.func.build_inst2(bb, Op::And, arg2_unini, or1);
                    let ub = self.func.build_inst2(bb, Op::Or, lhs, rhs);
                    let bitsize_inst = self.func.value_inst(bitsize as u128, 32);
                    res_undef = Some(self.func.build_inst2(bb, Op::Sext, ub, bitsize_inst));
                }

                if !lhs_type.overflow_wraps() {
                    let cond = self.func.build_inst2(bb, Op::SmulWraps, arg1, arg2);
                    self.func.build_inst1(bb, Op::Ub, cond);
                }
                let res = self.func.build_inst2(bb, Op::Mul, arg1, arg2);
                return Ok((res, res_undef));
            }
            _ => {}
        }

        // Everything else is UB on indeterminate operands.
        if let Some(undef) = arg1_undef {
            self.build_ub_if_not_zero(bb, undef);
        }
        if let Some(undef) = arg2_undef {
            self.build_ub_if_not_zero(bb, undef);
        }
        let res = self.process_binary_int_value(
            code, is_unsigned, arg1, arg2, lhs_type, arg1_type, arg2_type, bb,
        )?;
        Ok((res, None))
    }

    pub(crate) fn process_binary_scalar(
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
        if lhs_type.is_bool() {
            self.process_binary_bool(
                code, arg1, arg1_undef, arg2, arg2_undef, lhs_type, arg1_type, arg2_type, bb,
            )
        } else if lhs_type.is_float() {
            if let Some(undef) = arg1_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            if let Some(undef) = arg2_undef {
                self.build_ub_if_not_zero(bb, undef);
            }
            let res = self.process_binary_float(code, arg1, arg2, bb)?;
            Ok((res, None))
        } else {
            self.process_binary_int(
                code,
                arg1_type.is_unsigned(),
                arg1,
                arg1_undef,
                arg2,
                arg2_undef,
                lhs_type,
                arg1_type,
                arg2_type,
                bb,
            )
        }
    }

    pub(crate) fn process_binary_scalar_value(
        &mut self,
        code: BinaryCode,
        arg1: InstId,
        arg2: InstId,
        lhs_type: &Type,
        arg1_type: &Type,
        arg2_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        let (inst, undef) = self.process_binary_scalar(
            code, arg1, None, arg2, None, lhs_type, arg1_type, arg2_type, bb,
        )?;
        assert!(undef.is_none());
        Ok(inst)
    }

    /// SAD and DOT_PROD element operations; vector iteration is done by the
    /// caller.
    pub(crate) fn process_ternary(
        &mut self,
        code: TernaryCode,
        arg1: InstId,
        arg2: InstId,
        arg3: InstId,
        arg1_type: &Type,
        arg2_type: &Type,
        arg3_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        match code {
            TernaryCode::Sad => {
                let arg1 = self.type_convert(arg1, arg1_type, arg3_type, bb)?;
                let arg2 = self.type_convert(arg2, arg2_type, arg3_type, bb)?;
                let inst = self.func.build_inst2(bb, Op::Sub, arg1, arg2);
                let zero = self.func.value_inst(0, self.func.inst(inst).bitsize);
                let cmp = self.func.build_inst2(bb, Op::Sge, inst, zero);
                let neg = self.func.build_inst1(bb, Op::Neg, inst);
                let abs = self.func.build_inst3(bb, Op::Ite, cmp, inst, neg);
                Ok(self.func.build_inst2(bb, Op::Add, abs, arg3))
            }
            TernaryCode::DotProd => {
                let arg1 = self.type_convert(arg1, arg1_type, arg3_type, bb)?;
                let arg2 = self.type_convert(arg2, arg2_type, arg3_type, bb)?;
                let inst = self.func.build_inst2(bb, Op::Mul, arg1, arg2);
                Ok(self.func.build_inst2(bb, Op::Add, inst, arg3))
            }
            _ => Err(Error::not_implemented(format!(
                "process_ternary: {:?}",
                code
            ))),
        }
    }
}
