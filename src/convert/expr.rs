//! Expression lowering: values, undef masks, conversions, and the range,
//! NaN and pointer-provenance constraints attached to values as they are
//! produced.

use super::*;
use crate::tree::{SsaDef, TypeKind, UnaryCode};

impl<'a> Converter<'a> {
    /// Lower an expression to a `(value, undef)` pair.
    pub(crate) fn tree2inst(&mut self, bb: BlockId, expr: &Expr) -> Result<ValUndef> {
        check_type(&expr.ty)?;

        match &expr.kind {
            ExprKind::SsaName { id, def, .. } => {
                if let Some(&inst) = self.ssa2inst.get(id) {
                    let undef = self.ssa2undef.get(id).copied();
                    return Ok((inst, undef));
                }
                match def {
                    SsaDef::Param(param) => {
                        if let Some(&inst) = self.param2inst.get(param) {
                            // The range check goes in the entry block: it is
                            // invalid to call the function with out-of-range
                            // values, and placing it at a use would make UB
                            // depend on where passes sink the parameter.
                            let entry = self.func.entry();
                            self.constrain_range(entry, expr, inst, None)?;
                            return Ok((inst, None));
                        }
                        Err(Error::not_implemented("tree2inst: unhandled ssa_name"))
                    }
                    SsaDef::UninitVar(_) => {
                        let bitsize = bitsize_for_type(&expr.ty)? as u32;
                        let inst = self.func.value_inst(0, bitsize);
                        let undef = self.func.value_m1_inst(bitsize);
                        Ok((inst, Some(undef)))
                    }
                    SsaDef::Stmt => Err(Error::not_implemented("tree2inst: unhandled ssa_name")),
                }
            }
            ExprKind::Constructor { .. } => {
                if !expr.ty.is_vector() {
                    // Constructors only appear in stores, global-variable
                    // initialization, and vector construction.
                    return Err(Error::not_implemented("tree2inst: constructor"));
                }
                self.vector_constructor(bb, expr)
            }
            ExprKind::IntCst { value } => {
                let precision = bitsize_for_type(&expr.ty)? as u32;
                assert!(precision > 0 && precision <= 128);
                Ok((self.func.value_inst(*value, precision), None))
            }
            ExprKind::RealCst { bits } => {
                let precision = bitsize_for_type(&expr.ty)? as u32;
                Ok((self.func.value_inst(*bits, precision), None))
            }
            ExprKind::VectorCst { elems } => {
                let mut res = self.tree2inst_undef_check(bb, &elems[0])?;
                for elem in &elems[1..] {
                    let e = self.tree2inst_undef_check(bb, elem)?;
                    res = self.func.build_inst2(bb, Op::Concat, e, res);
                }
                Ok((res, None))
            }
            ExprKind::ComplexCst { real, imag } => {
                let elem_type = expr.ty.element_type().unwrap().clone();
                let r = self.tree2inst_undef_check(bb, real)?;
                let r = self.to_mem_repr(bb, r, &elem_type)?;
                let i = self.tree2inst_undef_check(bb, imag)?;
                let i = self.to_mem_repr(bb, i, &elem_type)?;
                Ok((self.func.build_inst2(bb, Op::Concat, i, r), None))
            }
            ExprKind::ImagPart { operand } => {
                let elem_type = expr.ty.clone();
                let (arg, undef) = self.tree2inst(bb, operand)?;
                let bitsize = self.func.inst(arg).bitsize;
                let high = self.func.value_inst(bitsize as u128 - 1, 32);
                let low = self.func.value_inst(bitsize as u128 / 2, 32);
                let res = self.func.build_inst3(bb, Op::Extract, arg, high, low);
                let res = self.from_mem_repr(bb, res, &elem_type)?;
                let undef = match undef {
                    Some(u) => {
                        let u = self.func.build_inst3(bb, Op::Extract, u, high, low);
                        Some(self.from_mem_repr(bb, u, &elem_type)?)
                    }
                    None => None,
                };
                Ok((res, undef))
            }
            ExprKind::RealPart { operand } => {
                let elem_type = expr.ty.clone();
                let (arg, undef) = self.tree2inst(bb, operand)?;
                let half = self.func.inst(arg).bitsize / 2;
                let res = self.func.build_trunc(bb, arg, half);
                let res = self.from_mem_repr(bb, res, &elem_type)?;
                let undef = match undef {
                    Some(u) => {
                        let u = self.func.build_trunc(bb, u, half);
                        Some(self.from_mem_repr(bb, u, &elem_type)?)
                    }
                    None => None,
                };
                Ok((res, undef))
            }
            ExprKind::ViewConvert { operand } => {
                let (arg, undef) = self.tree2inst(bb, operand)?;
                let src_type = operand.ty.clone();
                let dest_type = expr.ty.clone();
                let arg = self.to_mem_repr(bb, arg, &src_type)?;
                let arg = self.from_mem_repr(bb, arg, &dest_type)?;
                let undef = match undef {
                    Some(u) => {
                        let u = self.uninit_to_mem_repr(bb, u, &src_type)?;
                        Some(self.from_mem_repr(bb, u, &dest_type)?)
                    }
                    None => None,
                };
                self.canonical_nan_check(bb, arg, &dest_type, undef)?;
                Ok((arg, undef))
            }
            ExprKind::AddrExpr { operand } => {
                let addr = self.process_address(bb, operand)?;
                assert_eq!(addr.bitoffset, 0);
                Ok((addr.ptr, None))
            }
            ExprKind::BitFieldRef {
                object,
                bits,
                bit_offset,
            } => {
                let (value, undef) = self.tree2inst(bb, object)?;
                let high = self.func.value_inst((bits + bit_offset - 1) as u128, 32);
                let low = self.func.value_inst(*bit_offset as u128, 32);
                let value = self.to_mem_repr(bb, value, &object.ty)?;
                let value = self.func.build_inst3(bb, Op::Extract, value, high, low);
                let value = self.from_mem_repr(bb, value, &expr.ty)?;
                let undef = match undef {
                    Some(u) => {
                        let u = self.func.build_inst3(bb, Op::Extract, u, high, low);
                        Some(self.from_mem_repr(bb, u, &expr.ty)?)
                    }
                    None => None,
                };
                Ok((value, undef))
            }
            ExprKind::ArrayRef { array, .. } => {
                // Indexing a vector as `v[2]` appears as an ARRAY_REF of a
                // VIEW_CONVERT of the vector.
                if let ExprKind::ViewConvert { operand } = &array.kind {
                    if operand.ty.is_vector() {
                        return self.vector_as_array(bb, expr);
                    }
                }
                self.process_load(bb, expr)
            }
            ExprKind::MemRef { .. }
            | ExprKind::TargetMemRef { .. }
            | ExprKind::ComponentRef { .. }
            | ExprKind::VarDecl { .. }
            | ExprKind::ResultDecl { .. } => self.process_load(bb, expr),
            _ => Err(Error::not_implemented(format!(
                "tree2inst: {}",
                expr.kind.name()
            ))),
        }
    }

    /// Lower an expression whose use requires a fully defined value; emits
    /// UB when any bit is indeterminate.
    pub(crate) fn tree2inst_undef_check(&mut self, bb: BlockId, expr: &Expr) -> Result<InstId> {
        let (inst, undef) = self.tree2inst(bb, expr)?;
        if let Some(undef) = undef {
            self.build_ub_if_not_zero(bb, undef);
        }
        Ok(inst)
    }

    /// Lower an initializer expression. Global initializers may contain
    /// arithmetic (such as `&a - &b`) that in a function body would be a
    /// statement of its own.
    pub(crate) fn tree2inst_constructor(&mut self, bb: BlockId, expr: &Expr) -> Result<InstId> {
        check_type(&expr.ty)?;
        match &expr.kind {
            ExprKind::Binary { code, arg1, arg2 } => {
                let a1 = self.tree2inst_constructor(bb, arg1)?;
                let a2 = self.tree2inst_constructor(bb, arg2)?;
                self.process_binary_scalar_value(*code, a1, a2, &expr.ty, &arg1.ty, &arg2.ty, bb)
            }
            ExprKind::Unary { code, arg }
                if matches!(
                    code,
                    UnaryCode::Abs
                        | UnaryCode::Absu
                        | UnaryCode::BitNot
                        | UnaryCode::Negate
                        | UnaryCode::Convert
                ) =>
            {
                let a = self.tree2inst_constructor(bb, arg)?;
                self.process_unary_scalar_value(*code, a, &expr.ty, &arg.ty, bb)
            }
            _ => self.tree2inst_undef_check(bb, expr),
        }
    }

    /// Emit the UB checks for an SSA name's recorded value range and
    /// nonzero-bits mask. With an undef mask present, both checks are
    /// conditional on the value being fully defined, as ranges do not take
    /// undefined values into account and a phi may carry a range even when
    /// one of its arguments is undefined.
    pub(crate) fn constrain_range(
        &mut self,
        bb: BlockId,
        expr: &Expr,
        inst: InstId,
        undef: Option<InstId>,
    ) -> Result<()> {
        let ExprKind::SsaName {
            id,
            range,
            nonzero_bits,
            ..
        } = &expr.kind
        else {
            panic!("constrain_range on non-SSA expression");
        };
        // Already done if the name has been converted before.
        if self.ssa2inst.contains_key(id) {
            return Ok(());
        }
        if !expr.ty.is_integral() && !expr.ty.is_pointer() {
            return Ok(());
        }

        let bitsize = self.func.inst(inst).bitsize;
        let mut is_ub1 = None;
        if let Some(nonzero) = nonzero_bits {
            // A mask whose zero bits are exactly the top bits carries no
            // information beyond the range, and giving the solver both
            // slows it down.
            if nonzero.leading_zeros() + nonzero.count_ones() != 128 {
                let mask = self.func.value_inst(!nonzero, bitsize);
                let bits = self.func.build_inst2(bb, Op::And, inst, mask);
                let zero = self.func.value_inst(0, bitsize);
                is_ub1 = Some(self.func.build_inst2(bb, Op::Ne, bits, zero));
            }
        }

        let mut is_ub2 = None;
        if let Some(range) = range {
            let op = if expr.ty.is_unsigned() || expr.ty.is_pointer() {
                Op::Ugt
            } else {
                Op::Sgt
            };
            for &(low_val, high_val) in &range.pairs {
                let low = self.func.value_inst(low_val, bitsize);
                let high = self.func.value_inst(high_val, bitsize);
                let cmp_low = self.func.build_inst2(bb, op, low, inst);
                let cmp_high = self.func.build_inst2(bb, op, inst, high);
                let not_in_range = self.func.build_inst2(bb, Op::Or, cmp_low, cmp_high);
                is_ub2 = Some(match is_ub2 {
                    Some(prev) => self.func.build_inst2(bb, Op::And, not_in_range, prev),
                    None => not_in_range,
                });
            }
        }

        if let Some(undef) = undef {
            let zero = self.func.value_inst(0, self.func.inst(undef).bitsize);
            let defined = self.func.build_inst2(bb, Op::Eq, undef, zero);
            if let Some(ub1) = is_ub1 {
                is_ub1 = Some(self.func.build_inst2(bb, Op::And, ub1, defined));
            }
            if let Some(ub2) = is_ub2 {
                is_ub2 = Some(self.func.build_inst2(bb, Op::And, ub2, defined));
            }
        }

        if let Some(ub1) = is_ub1 {
            self.func.build_inst1(bb, Op::Ub, ub1);
        }
        if let Some(ub2) = is_ub2 {
            self.func.build_inst1(bb, Op::Ub, ub2);
        }
        Ok(())
    }

    /// Convert a scalar value between source types.
    pub(crate) fn type_convert(
        &mut self,
        inst: InstId,
        src_type: &Type,
        dest_type: &Type,
        bb: BlockId,
    ) -> Result<InstId> {
        if dest_type.is_bool() {
            assert!(src_type.is_integral());
            let mut inst = inst;
            if self.func.inst(inst).bitsize > 1 {
                inst = self.func.build_extract_bit(bb, inst, 0);
            }
            let dest_prec = bitsize_for_type(dest_type)? as u32;
            if dest_prec == 1 {
                return Ok(inst);
            }
            let op = if dest_type.is_unsigned() {
                Op::Zext
            } else {
                Op::Sext
            };
            let dest_prec_inst = self.func.value_inst(dest_prec as u128, 32);
            return Ok(self.func.build_inst2(bb, op, inst, dest_prec_inst));
        }

        if src_type.is_integral() || src_type.is_pointer() {
            if dest_type.is_integral() || dest_type.is_pointer() {
                let src_prec = self.func.inst(inst).bitsize;
                let dest_prec = bitsize_for_type(dest_type)? as u32;
                if src_prec > dest_prec {
                    return Ok(self.func.build_trunc(bb, inst, dest_prec));
                }
                if src_prec == dest_prec {
                    return Ok(inst);
                }
                let op = if src_type.is_unsigned() {
                    Op::Zext
                } else {
                    Op::Sext
                };
                let dest_prec_inst = self.func.value_inst(dest_prec as u128, 32);
                return Ok(self.func.build_inst2(bb, op, inst, dest_prec_inst));
            }
            if dest_type.is_float() {
                let dest_prec = bitsize_for_type(dest_type)? as u32;
                let dest_prec_inst = self.func.value_inst(dest_prec as u128, 32);
                let op = if src_type.is_unsigned() {
                    Op::U2f
                } else {
                    Op::S2f
                };
                return Ok(self.func.build_inst2(bb, op, inst, dest_prec_inst));
            }
        }

        if src_type.is_float() {
            if let TypeKind::Int { bits, unsigned, .. } = dest_type.kind {
                // UB if the floating-point value is out of range for the
                // destination integer.
                let min = self.func.value_inst(int_min_value(bits, unsigned), bits);
                let max = self.func.value_inst(int_max_value(bits, unsigned), bits);
                let op = if unsigned { Op::U2f } else { Op::S2f };
                let src_bits = bitsize_for_type(src_type)? as u32;
                let src_bits_inst = self.func.value_inst(src_bits as u128, 32);
                let fmin = self.func.build_inst2(bb, op, min, src_bits_inst);
                let fmax = self.func.build_inst2(bb, op, max, src_bits_inst);
                let clow = self.func.build_inst2(bb, Op::Fge, inst, fmin);
                let chigh = self.func.build_inst2(bb, Op::Fle, inst, fmax);
                let in_range = self.func.build_inst2(bb, Op::And, clow, chigh);
                let is_ub = self.func.build_inst1(bb, Op::Not, in_range);
                self.func.build_inst1(bb, Op::Ub, is_ub);

                let op = if unsigned { Op::F2u } else { Op::F2s };
                let dest_bits_inst = self.func.value_inst(bits as u128, 32);
                return Ok(self.func.build_inst2(bb, op, inst, dest_bits_inst));
            }
            if dest_type.is_float() {
                let src_prec = bitsize_for_type(src_type)? as u32;
                let dest_prec = bitsize_for_type(dest_type)? as u32;
                if src_prec == dest_prec {
                    return Ok(inst);
                }
                let dest_prec_inst = self.func.value_inst(dest_prec as u128, 32);
                return Ok(self.func.build_inst2(bb, Op::Fchprec, inst, dest_prec_inst));
            }
        }

        Err(Error::not_implemented("type_convert: unknown type"))
    }

    /// Flag floating-point values that carry a non-canonical NaN pattern.
    /// The SMT solvers canonicalize NaN values, so a non-canonical pattern
    /// arriving from the outside would change results inconsistently
    /// between paths that do and do not go through an FP operation. Values
    /// with undef bits are exempt, since every use of those is flagged as
    /// UB anyway.
    pub(crate) fn canonical_nan_check(
        &mut self,
        bb: BlockId,
        inst: InstId,
        ty: &Type,
        undef: Option<InstId>,
    ) -> Result<()> {
        if ty.is_float() {
            let mut cond = self.func.build_inst1(bb, Op::IsNoncanonicalNan, inst);
            if let Some(undef) = undef {
                let zero = self.func.value_inst(0, self.func.inst(undef).bitsize);
                let defined = self.func.build_inst2(bb, Op::Eq, undef, zero);
                cond = self.func.build_inst2(bb, Op::And, cond, defined);
            }
            self.func.build_inst1(bb, Op::Ub, cond);
            return Ok(());
        }
        if let TypeKind::Record { fields } = &ty.kind {
            for field in fields.clone() {
                if field.bitfield {
                    continue;
                }
                let Some(elem_size) = field.ty.bytes else {
                    continue;
                };
                if elem_size == 0 {
                    continue;
                }
                let elem_offset = field.offset + field.bit_offset / 8;
                let high = self
                    .func
                    .value_inst(((elem_offset + elem_size) * 8 - 1) as u128, 32);
                let low = self.func.value_inst((elem_offset * 8) as u128, 32);
                let extract = self.func.build_inst3(bb, Op::Extract, inst, high, low);
                let extract2 = match undef {
                    Some(u) => Some(self.func.build_inst3(bb, Op::Extract, u, high, low)),
                    None => None,
                };
                self.canonical_nan_check(bb, extract, &field.ty, extract2)?;
            }
            return Ok(());
        }
        if ty.is_vector() || ty.is_complex() {
            let elem_type = ty.element_type().unwrap().clone();
            if !elem_type.is_float() {
                return Ok(());
            }
            let elem_bitsize = bitsize_for_type(&elem_type)? as u32;
            let nof_elt = bitsize_for_type(ty)? as u32 / elem_bitsize;
            for i in 0..nof_elt {
                let extract = self.extract_vec_elem(bb, inst, elem_bitsize, i);
                let extract2 = undef.map(|u| self.extract_vec_elem(bb, u, elem_bitsize, i));
                self.canonical_nan_check(bb, extract, &elem_type, extract2)?;
            }
        }
        Ok(())
    }

    /// A pointer loaded from memory the function has not itself written
    /// cannot name local storage.
    pub(crate) fn constrain_pointer(
        &mut self,
        bb: BlockId,
        inst: InstId,
        ty: &Type,
        mem_flags: InstId,
    ) -> Result<()> {
        if ty.is_pointer() {
            let id_bits = self.func.ptr.id_bits;
            let id = self.func.build_extract_id(bb, inst);
            let zero = self.func.value_inst(0, id_bits);
            let mut cond = self.func.build_inst2(bb, Op::Slt, id, zero);
            let not_written = self.func.build_extract_id(bb, mem_flags);
            let not_written = self.func.build_inst2(bb, Op::Eq, not_written, zero);
            cond = self.func.build_inst2(bb, Op::And, cond, not_written);
            self.func.build_inst1(bb, Op::Ub, cond);
        }
        if let TypeKind::Record { fields } = &ty.kind {
            for field in fields.clone() {
                if field.bitfield {
                    continue;
                }
                let Some(elem_size) = field.ty.bytes else {
                    continue;
                };
                if elem_size == 0 {
                    continue;
                }
                let elem_offset = field.offset + field.bit_offset / 8;
                let high = self
                    .func
                    .value_inst(((elem_offset + elem_size) * 8 - 1) as u128, 32);
                let low = self.func.value_inst((elem_offset * 8) as u128, 32);
                let extract = self.func.build_inst3(bb, Op::Extract, inst, high, low);
                let extract2 = self.func.build_inst3(bb, Op::Extract, mem_flags, high, low);
                self.constrain_pointer(bb, extract, &field.ty, extract2)?;
            }
        }
        Ok(())
    }

    /// Widen a value to its memory representation.
    pub(crate) fn to_mem_repr(&mut self, bb: BlockId, inst: InstId, ty: &Type) -> Result<InstId> {
        let bitsize = bytesize_for_type(ty)? * 8;
        if self.func.inst(inst).bitsize as u64 == bitsize {
            return Ok(inst);
        }
        assert!((self.func.inst(inst).bitsize as u64) < bitsize);
        if ty.is_integral() {
            let bitsize_inst = self.func.value_inst(bitsize as u128, 32);
            let op = if ty.is_unsigned() { Op::Zext } else { Op::Sext };
            return Ok(self.func.build_inst2(bb, op, inst, bitsize_inst));
        }
        Ok(inst)
    }

    /// Widen an undef mask to the memory representation; the padding bits
    /// follow the sign bit so a fully undef value stays fully undef.
    pub(crate) fn uninit_to_mem_repr(
        &mut self,
        bb: BlockId,
        inst: InstId,
        ty: &Type,
    ) -> Result<InstId> {
        let bitsize = bytesize_for_type(ty)? * 8;
        assert!(self.func.inst(inst).bitsize as u64 <= bitsize);
        if (self.func.inst(inst).bitsize as u64) != bitsize {
            let bitsize_inst = self.func.value_inst(bitsize as u128, 32);
            return Ok(self.func.build_inst2(bb, Op::Sext, inst, bitsize_inst));
        }
        Ok(inst)
    }

    /// Narrow a memory-representation value back to the type's logical
    /// width. A one-bit boolean read from a byte must be 0 or 1.
    pub(crate) fn from_mem_repr(&mut self, bb: BlockId, inst: InstId, ty: &Type) -> Result<InstId> {
        let bitsize = bitsize_for_type(ty)? as u32;
        assert!(bitsize <= self.func.inst(inst).bitsize);
        if self.func.inst(inst).bitsize == bitsize {
            return Ok(inst);
        }
        if ty.is_bool() && bitsize == 1 {
            let one = self.func.value_inst(1, self.func.inst(inst).bitsize);
            let cond = self.func.build_inst2(bb, Op::Ugt, inst, one);
            self.func.build_inst1(bb, Op::Ub, cond);
        }
        Ok(self.func.build_trunc(bb, inst, bitsize))
    }

    /// A boolean wider than one bit must be exactly 0 or the truth value.
    pub(crate) fn check_wide_bool(&mut self, inst: InstId, ty: &Type, bb: BlockId) {
        let bitsize = self.func.inst(inst).bitsize;
        let false_inst = self.func.value_inst(0, bitsize);
        let mut true_inst = self.func.value_inst(1, bitsize);
        if !ty.is_unsigned() {
            true_inst = self.func.build_inst1(bb, Op::Neg, true_inst);
        }
        let cond0 = self.func.build_inst2(bb, Op::Ne, inst, true_inst);
        let cond1 = self.func.build_inst2(bb, Op::Ne, inst, false_inst);
        let cond = self.func.build_inst2(bb, Op::And, cond0, cond1);
        self.func.build_inst1(bb, Op::Ub, cond);
    }
}

/// The bit pattern of a type's minimum value, as an unsigned `bits`-wide
/// integer.
pub(crate) fn int_min_value(bits: u32, unsigned: bool) -> u128 {
    if unsigned {
        0
    } else {
        1u128 << (bits - 1)
    }
}

/// The bit pattern of a type's maximum value.
pub(crate) fn int_max_value(bits: u32, unsigned: bool) -> u128 {
    if unsigned {
        crate::ir::trunc_value(u128::MAX, bits)
    } else {
        (1u128 << (bits - 1)) - 1
    }
}
