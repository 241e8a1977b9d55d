//! Lowering of builtin and internal function calls. Each recognized name
//! expands to a dedicated instruction sequence; unknown names make the
//! function unsupported.

use super::*;
use crate::tree::UnaryCode;

/// The single NaN bit pattern the SMT solver models: sign 0, exponent all
/// ones, quiet bit set, remaining mantissa zero.
pub(crate) fn canonical_nan_value(bits: u32) -> u128 {
    let exp_bits = match bits {
        16 => 5,
        32 => 8,
        64 => 11,
        128 => 15,
        _ => panic!("canonical_nan_value: unsupported float width"),
    };
    let mantissa_bits = bits - 1 - exp_bits;
    let exp = ((1u128 << exp_bits) - 1) << mantissa_bits;
    exp | (1u128 << (mantissa_bits - 1))
}

impl<'a> Converter<'a> {
    pub(crate) fn process_call(
        &mut self,
        lhs: Option<&Expr>,
        target: &CallTarget,
        args: &[Expr],
        bb: BlockId,
    ) -> Result<()> {
        match target {
            CallTarget::Builtin(name) => self.process_call_builtin(lhs, name, args, bb),
            CallTarget::Internal(name) => self.process_call_internal(lhs, name, args, bb),
        }
    }

    fn set_lhs(&mut self, bb: BlockId, lhs: &Expr, inst: InstId) -> Result<()> {
        self.constrain_range(bb, lhs, inst, None)?;
        self.ssa2inst.insert(ssa_name_id(lhs), inst);
        Ok(())
    }

    fn set_lhs_with_undef(
        &mut self,
        bb: BlockId,
        lhs: &Expr,
        inst: InstId,
        undef: Option<InstId>,
    ) -> Result<()> {
        self.constrain_range(bb, lhs, inst, undef)?;
        let id = ssa_name_id(lhs);
        self.ssa2inst.insert(id, inst);
        if let Some(undef) = undef {
            self.ssa2undef.insert(id, undef);
        }
        Ok(())
    }

    fn process_call_builtin(
        &mut self,
        lhs: Option<&Expr>,
        name: &str,
        args: &[Expr],
        bb: BlockId,
    ) -> Result<()> {
        match name {
            "__builtin_assume_aligned" => {
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
                assert_eq!(self.func.inst(arg1).bitsize, self.func.inst(arg2).bitsize);
                let one = self.func.value_inst(1, self.func.inst(arg2).bitsize);
                let mask = self.func.build_inst2(bb, Op::Sub, arg2, one);
                let val = self.func.build_inst2(bb, Op::And, arg1, mask);
                let zero = self.func.value_inst(0, self.func.inst(val).bitsize);
                let cond = self.func.build_inst2(bb, Op::Ne, val, zero);
                self.func.build_inst1(bb, Op::Ub, cond);
                if let Some(lhs) = lhs {
                    self.set_lhs(bb, lhs, arg1)?;
                }
                Ok(())
            }

            "__builtin_bswap16" | "__builtin_bswap32" | "__builtin_bswap64"
            | "__builtin_bswap128" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let (arg, arg_undef) = self.tree2inst(bb, &args[0])?;
                // The width comes from the lhs: bswap16 has a 32-bit
                // argument.
                let bitwidth = bitsize_for_type(&lhs.ty)? as u32;
                let mut inst = self.func.build_trunc(bb, arg, 8);
                let mut inst_undef = match arg_undef {
                    Some(u) => Some(self.func.build_trunc(bb, u, 8)),
                    None => None,
                };
                let mut i = 8;
                while i < bitwidth {
                    let high = self.func.value_inst(i as u128 + 7, 32);
                    let low = self.func.value_inst(i as u128, 32);
                    let byte = self.func.build_inst3(bb, Op::Extract, arg, high, low);
                    inst = self.func.build_inst2(bb, Op::Concat, inst, byte);
                    if let Some(u) = arg_undef {
                        let byte_undef = self.func.build_inst3(bb, Op::Extract, u, high, low);
                        inst_undef = Some(self.func.build_inst2(
                            bb,
                            Op::Concat,
                            inst_undef.unwrap(),
                            byte_undef,
                        ));
                    }
                    i += 8;
                }
                self.set_lhs_with_undef(bb, lhs, inst, inst_undef)
            }

            "__builtin_clrsb" | "__builtin_clrsbl" | "__builtin_clrsbll" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let arg_bits = self.func.inst(arg).bitsize;
                assert!(arg_bits > 1);
                let bitsize = bitsize_for_type(&lhs.ty)? as u32;
                let signbit = self.func.build_extract_bit(bb, arg, arg_bits - 1);
                let mut inst = self.func.value_inst(arg_bits as u128 - 1, bitsize);
                for i in 0..arg_bits - 1 {
                    let bit = self.func.build_extract_bit(bb, arg, i);
                    let cmp = self.func.build_inst2(bb, Op::Ne, bit, signbit);
                    let val = self
                        .func
                        .value_inst((arg_bits - i - 2) as u128, bitsize);
                    inst = self.func.build_inst3(bb, Op::Ite, cmp, val, inst);
                }
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_clz" | "__builtin_clzl" | "__builtin_clzll" => {
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let zero = self.func.value_inst(0, self.func.inst(arg).bitsize);
                let ub = self.func.build_inst2(bb, Op::Eq, arg, zero);
                self.func.build_inst1(bb, Op::Ub, ub);
                let Some(lhs) = lhs else { return Ok(()) };
                let bitsize = bitsize_for_type(&lhs.ty)? as u32;
                let arg_bits = self.func.inst(arg).bitsize;
                let mut inst = self.func.value_inst(arg_bits as u128, bitsize);
                for i in 0..arg_bits {
                    let bit = self.func.build_extract_bit(bb, arg, i);
                    let val = self
                        .func
                        .value_inst((arg_bits - i - 1) as u128, bitsize);
                    inst = self.func.build_inst3(bb, Op::Ite, bit, val, inst);
                }
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_ctz" | "__builtin_ctzl" | "__builtin_ctzll" => {
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let zero = self.func.value_inst(0, self.func.inst(arg).bitsize);
                let ub = self.func.build_inst2(bb, Op::Eq, arg, zero);
                self.func.build_inst1(bb, Op::Ub, ub);
                let Some(lhs) = lhs else { return Ok(()) };
                let bitsize = bitsize_for_type(&lhs.ty)? as u32;
                let arg_bits = self.func.inst(arg).bitsize;
                let mut inst = self.func.value_inst(arg_bits as u128, bitsize);
                for i in (0..arg_bits).rev() {
                    let bit = self.func.build_extract_bit(bb, arg, i);
                    let val = self.func.value_inst(i as u128, bitsize);
                    inst = self.func.build_inst3(bb, Op::Ite, bit, val, inst);
                }
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_copysign" | "__builtin_copysignf" | "__builtin_copysignl"
            | "__builtin_copysignf16" | "__builtin_copysignf32" | "__builtin_copysignf32x"
            | "__builtin_copysignf64" | "__builtin_copysignf128" | "copysign" | "copysignf" => {
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
                let arg2_bits = self.func.inst(arg2).bitsize;
                let signbit = self.func.build_extract_bit(bb, arg2, arg2_bits - 1);
                let arg1_bits = self.func.inst(arg1).bitsize;
                let low = self.func.build_trunc(bb, arg1, arg1_bits - 1);
                let res = self.func.build_inst2(bb, Op::Concat, signbit, low);
                let cond = self.func.build_inst1(bb, Op::IsNoncanonicalNan, res);
                self.func.build_inst1(bb, Op::Ub, cond);
                if let Some(lhs) = lhs {
                    self.set_lhs(bb, lhs, res)?;
                }
                Ok(())
            }

            "__builtin_expect" | "__builtin_expect_with_probability" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                self.set_lhs(bb, lhs, arg)
            }

            "__builtin_fmax" | "__builtin_fmaxf" | "__builtin_fmaxl" | "fmax" | "fmaxf"
            | "fmaxl" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let inst = self.process_fmin_fmax(bb, args, true)?;
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_fmin" | "__builtin_fminf" | "__builtin_fminl" | "fmin" | "fminf"
            | "fminl" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let inst = self.process_fmin_fmax(bb, args, false)?;
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_memcpy" | "memcpy" => {
                let ExprKind::IntCst { value: size } = args[2].kind else {
                    return Err(Error::not_implemented("non-constant memcpy size"));
                };
                let mut dest_ptr = self.tree2inst_undef_check(bb, &args[0])?;
                let mut src_ptr = self.tree2inst_undef_check(bb, &args[1])?;
                if size > MAX_MEMORY_UNROLL_LIMIT as u128 {
                    return Err(Error::not_implemented("too large memcpy"));
                }

                self.store_ub_check(bb, dest_ptr, size as u64);
                self.load_ub_check(bb, src_ptr, size as u64);

                if let Some(lhs) = lhs {
                    self.set_lhs(bb, lhs, dest_ptr)?;
                }

                let one = self.func.value_inst(1, self.func.ptr.bits);
                for _ in 0..size {
                    let byte = self.func.build_inst1(bb, Op::Load, src_ptr);
                    self.func.build_inst2(bb, Op::Store, dest_ptr, byte);

                    let mem_flag = self.func.build_inst1(bb, Op::GetMemFlag, src_ptr);
                    self.func.build_inst2(bb, Op::SetMemFlag, dest_ptr, mem_flag);

                    let undef = self.func.build_inst1(bb, Op::GetMemUndef, src_ptr);
                    self.func.build_inst2(bb, Op::SetMemUndef, dest_ptr, undef);

                    src_ptr = self.func.build_inst2(bb, Op::Add, src_ptr, one);
                    dest_ptr = self.func.build_inst2(bb, Op::Add, dest_ptr, one);
                }
                Ok(())
            }

            "__builtin_memset" | "memset" => {
                let ExprKind::IntCst { value: size } = args[2].kind else {
                    return Err(Error::not_implemented("non-constant memset size"));
                };
                let mut ptr = self.tree2inst_undef_check(bb, &args[0])?;
                let mut value = self.tree2inst_undef_check(bb, &args[1])?;
                if size > MAX_MEMORY_UNROLL_LIMIT as u128 {
                    return Err(Error::not_implemented("too large memset"));
                }

                self.store_ub_check(bb, ptr, size as u64);

                if let Some(lhs) = lhs {
                    self.set_lhs(bb, lhs, ptr)?;
                }

                assert!(self.func.inst(value).bitsize >= 8);
                if self.func.inst(value).bitsize > 8 {
                    value = self.func.build_trunc(bb, value, 8);
                }
                let one = self.func.value_inst(1, self.func.ptr.bits);
                let mem_flag = self.func.value_inst(1, 1);
                let undef = self.func.value_inst(0, 8);
                for _ in 0..size {
                    self.func.build_inst2(bb, Op::Store, ptr, value);
                    self.func.build_inst2(bb, Op::SetMemFlag, ptr, mem_flag);
                    self.func.build_inst2(bb, Op::SetMemUndef, ptr, undef);
                    ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
                }
                Ok(())
            }

            "__builtin_nan" | "__builtin_nanf" | "__builtin_nanl" | "nan" | "nanf" | "nanl" => {
                // The payload argument would only matter with support for
                // non-canonical NaNs in the solvers.
                let Some(lhs) = lhs else { return Ok(()) };
                let bits = bitsize_for_type(&lhs.ty)? as u32;
                let inst = self.func.value_inst(canonical_nan_value(bits), bits);
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_parity" | "__builtin_parityl" | "__builtin_parityll" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let bitwidth = self.func.inst(arg).bitsize;
                let mut inst = self.func.build_extract_bit(bb, arg, 0);
                for i in 1..bitwidth {
                    let bit = self.func.build_extract_bit(bb, arg, i);
                    inst = self.func.build_inst2(bb, Op::Xor, inst, bit);
                }
                let lhs_bits = bitsize_for_type(&lhs.ty)? as u32;
                let bitwidth_inst = self.func.value_inst(lhs_bits as u128, 32);
                let inst = self.func.build_inst2(bb, Op::Zext, inst, bitwidth_inst);
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_popcount" | "__builtin_popcountl" | "__builtin_popcountll" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let bitwidth = self.func.inst(arg).bitsize;
                let eight = self.func.value_inst(8, 32);
                let bit = self.func.build_extract_bit(bb, arg, 0);
                let mut res = self.func.build_inst2(bb, Op::Zext, bit, eight);
                for i in 1..bitwidth {
                    let bit = self.func.build_extract_bit(bb, arg, i);
                    let ext = self.func.build_inst2(bb, Op::Zext, bit, eight);
                    res = self.func.build_inst2(bb, Op::Add, res, ext);
                }
                let lhs_bits = bitsize_for_type(&lhs.ty)? as u32;
                let lhs_bits_inst = self.func.value_inst(lhs_bits as u128, 32);
                let res = self.func.build_inst2(bb, Op::Zext, res, lhs_bits_inst);
                self.set_lhs(bb, lhs, res)
            }

            "__builtin_signbit" | "__builtin_signbitf" | "signbit" | "signbitf" => {
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let cond = self.func.build_inst1(bb, Op::IsNoncanonicalNan, arg1);
                self.func.build_inst1(bb, Op::Ub, cond);
                let Some(lhs) = lhs else { return Ok(()) };
                let arg1_bits = self.func.inst(arg1).bitsize;
                let signbit = self.func.build_extract_bit(bb, arg1, arg1_bits - 1);
                let bitsize = bitsize_for_type(&lhs.ty)? as u32;
                let lhs_bitsize_inst = self.func.value_inst(bitsize as u128, 32);
                let inst = self
                    .func
                    .build_inst2(bb, Op::Zext, signbit, lhs_bitsize_inst);
                self.set_lhs(bb, lhs, inst)
            }

            "__builtin_unreachable" | "__builtin_trap" => {
                let one = self.func.value_inst(1, 1);
                self.func.build_inst1(bb, Op::Ub, one);
                Ok(())
            }

            _ => Err(Error::not_implemented(format!(
                "process_call_builtin: {}",
                name
            ))),
        }
    }

    /// fmax/fmin: return the non-NaN argument when the other is NaN, and
    /// break the 0.0 == -0.0 tie with a signed bit-pattern comparison so
    /// that swapped arguments give the same result.
    fn process_fmin_fmax(&mut self, bb: BlockId, args: &[Expr], is_max: bool) -> Result<InstId> {
        let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
        let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
        let is_nan = self.func.build_inst2(bb, Op::Fne, arg2, arg2);
        let cmp_op = if is_max { Op::Fgt } else { Op::Flt };
        let cmp = self.func.build_inst2(bb, cmp_op, arg1, arg2);
        let sel1 = self.func.build_inst3(bb, Op::Ite, cmp, arg1, arg2);
        let sel2 = self.func.build_inst3(bb, Op::Ite, is_nan, arg1, sel1);

        let zero = self.func.value_inst(0, self.func.inst(arg1).bitsize);
        let is_zero1 = self.func.build_inst2(bb, Op::Feq, arg1, zero);
        let is_zero2 = self.func.build_inst2(bb, Op::Feq, arg2, zero);
        let is_zero = self.func.build_inst2(bb, Op::And, is_zero1, is_zero2);
        let cmp2_op = if is_max { Op::Sgt } else { Op::Slt };
        let cmp2 = self.func.build_inst2(bb, cmp2_op, arg1, arg2);
        let sel3 = self.func.build_inst3(bb, Op::Ite, cmp2, arg1, arg2);
        Ok(self.func.build_inst3(bb, Op::Ite, is_zero, sel3, sel2))
    }

    fn process_call_internal(
        &mut self,
        lhs: Option<&Expr>,
        name: &str,
        args: &[Expr],
        bb: BlockId,
    ) -> Result<()> {
        match name {
            "FALLTHROUGH" => Ok(()),

            "ADD_OVERFLOW" | "SUB_OVERFLOW" | "MUL_OVERFLOW" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let lhs_elem_type = lhs.ty.element_type().unwrap().clone();
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
                let lhs_elem_bitsize = bitsize_for_type(&lhs_elem_type)? as u32;
                let arg1_bits = self.func.inst(arg1).bitsize;
                let arg2_bits = self.func.inst(arg2).bitsize;
                let bitsize = if name == "MUL_OVERFLOW" {
                    1 + (arg1_bits + arg2_bits).max(lhs_elem_bitsize)
                } else {
                    let b = 1 + arg1_bits.max(arg2_bits);
                    1 + b.max(lhs_elem_bitsize)
                };
                let bitsize_inst = self.func.value_inst(bitsize as u128, 32);
                let op1 = if args[0].ty.is_unsigned() {
                    Op::Zext
                } else {
                    Op::Sext
                };
                let arg1 = self.func.build_inst2(bb, op1, arg1, bitsize_inst);
                let op2 = if args[1].ty.is_unsigned() {
                    Op::Zext
                } else {
                    Op::Sext
                };
                let arg2 = self.func.build_inst2(bb, op2, arg2, bitsize_inst);
                let inst = match name {
                    "ADD_OVERFLOW" => self.func.build_inst2(bb, Op::Add, arg1, arg2),
                    "SUB_OVERFLOW" => self.func.build_inst2(bb, Op::Sub, arg1, arg2),
                    _ => self.func.build_inst2(bb, Op::Mul, arg1, arg2),
                };
                let res = self.func.build_trunc(bb, inst, lhs_elem_bitsize);
                let eop = if lhs_elem_type.is_unsigned() {
                    Op::Zext
                } else {
                    Op::Sext
                };
                let eres = self.func.build_inst2(bb, eop, res, bitsize_inst);
                let overflow = self.func.build_inst2(bb, Op::Ne, inst, eres);

                let res = self.to_mem_repr(bb, res, &lhs_elem_type)?;
                let res_bits = self.func.inst(res).bitsize;
                let res_bitsize_inst = self.func.value_inst(res_bits as u128, 32);
                let overflow = self
                    .func
                    .build_inst2(bb, Op::Zext, overflow, res_bitsize_inst);
                let res = self.func.build_inst2(bb, Op::Concat, overflow, res);
                self.set_lhs(bb, lhs, res)
            }

            "BUILTIN_EXPECT" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                self.set_lhs(bb, lhs, arg)
            }

            "CLZ" | "CTZ" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let bitsize = bitsize_for_type(&lhs.ty)? as u32;
                let arg = self.tree2inst_undef_check(bb, &args[0])?;
                let arg_bits = self.func.inst(arg).bitsize;

                let zero_value = if name == "CLZ" {
                    self.unit.clz_value_at_zero(arg_bits)
                } else {
                    self.unit.ctz_value_at_zero(arg_bits)
                };
                let val0 = match zero_value {
                    Some(value) => self.func.value_inst(value as u128, bitsize),
                    None => {
                        // The value at zero is unspecified; model it as one
                        // symbolic constant per width, shared between src
                        // and tgt.
                        let idx = match self.state.clz_bitsize2idx.get(&bitsize) {
                            Some(&idx) => idx,
                            None => {
                                let idx = self.state.symbolic_idx;
                                self.state.symbolic_idx += 1;
                                self.state.clz_bitsize2idx.insert(bitsize, idx);
                                idx
                            }
                        };
                        let idx_inst = self.func.value_inst(idx as u128, 32);
                        let bitsize_inst = self.func.value_inst(bitsize as u128, 32);
                        self.func
                            .build_inst2(bb, Op::Symbolic, idx_inst, bitsize_inst)
                    }
                };

                let mut inst = val0;
                if name == "CLZ" {
                    for i in 0..arg_bits {
                        let bit = self.func.build_extract_bit(bb, arg, i);
                        let val = self
                            .func
                            .value_inst((arg_bits - i - 1) as u128, bitsize);
                        inst = self.func.build_inst3(bb, Op::Ite, bit, val, inst);
                    }
                } else {
                    for i in (0..arg_bits).rev() {
                        let bit = self.func.build_extract_bit(bb, arg, i);
                        let val = self.func.value_inst(i as u128, bitsize);
                        inst = self.func.build_inst3(bb, Op::Ite, bit, val, inst);
                    }
                }
                self.set_lhs(bb, lhs, inst)
            }

            "DIVMOD" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let lhs_elem_type = lhs.ty.element_type().unwrap().clone();
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
                let modulo = self.process_binary_scalar_value(
                    BinaryCode::TruncMod,
                    arg1,
                    arg2,
                    &lhs_elem_type,
                    &args[0].ty,
                    &args[1].ty,
                    bb,
                )?;
                let modulo = self.to_mem_repr(bb, modulo, &lhs_elem_type)?;
                let div = self.process_binary_scalar_value(
                    BinaryCode::TruncDiv,
                    arg1,
                    arg2,
                    &lhs_elem_type,
                    &args[0].ty,
                    &args[1].ty,
                    bb,
                )?;
                let div = self.to_mem_repr(bb, div, &lhs_elem_type)?;
                let inst = self.func.build_inst2(bb, Op::Concat, modulo, div);
                self.set_lhs(bb, lhs, inst)
            }

            "LOOP_VECTORIZED" => {
                let lhs = lhs.expect("LOOP_VECTORIZED without lhs");
                let idx = self.state.symbolic_idx;
                self.state.symbolic_idx += 1;
                let idx_inst = self.func.value_inst(idx as u128, 32);
                let bitsize_inst = self.func.value_inst(1, 32);
                let inst = self
                    .func
                    .build_inst2(bb, Op::Symbolic, idx_inst, bitsize_inst);
                self.ssa2inst.insert(ssa_name_id(lhs), inst);
                Ok(())
            }

            "VCOND_MASK" => {
                let Some(lhs) = lhs else { return Ok(()) };
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let (arg2, arg2_undef) = self.tree2inst(bb, &args[1])?;
                let (arg3, arg3_undef) = self.tree2inst(bb, &args[2])?;
                let (inst, undef) = self.process_vec_cond(
                    arg1,
                    arg2,
                    arg2_undef,
                    arg3,
                    arg3_undef,
                    &args[0].ty,
                    &args[1].ty,
                    bb,
                )?;
                self.set_lhs_with_undef(bb, lhs, inst, undef)
            }

            "VCOND" | "VCONDU" => self.process_vcond(lhs, name == "VCONDU", args, bb),

            "VEC_CONVERT" => {
                let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
                let arg1_elem_type = args[0].ty.element_type().unwrap().clone();
                let Some(lhs) = lhs else { return Ok(()) };
                let lhs_elem_type = lhs.ty.element_type().unwrap().clone();
                let (inst, undef) = self.process_unary_vec(
                    UnaryCode::Convert,
                    arg1,
                    None,
                    &lhs_elem_type,
                    &arg1_elem_type,
                    bb,
                )?;
                assert!(undef.is_none());
                self.set_lhs(bb, lhs, inst)
            }

            _ => Err(Error::not_implemented(format!(
                "process_call_internal: {}",
                name
            ))),
        }
    }

    /// VCOND/VCONDU: per lane, compare the first two vectors with the
    /// encoded comparison and select between the last two.
    fn process_vcond(
        &mut self,
        lhs: Option<&Expr>,
        is_unsigned: bool,
        args: &[Expr],
        bb: BlockId,
    ) -> Result<()> {
        let arg1_elem_type = args[0].ty.element_type().unwrap().clone();
        let arg2_elem_type = args[1].ty.element_type().unwrap().clone();
        let arg3_elem_type = args[2].ty.element_type().unwrap().clone();

        let arg1 = self.tree2inst_undef_check(bb, &args[0])?;
        let arg2 = self.tree2inst_undef_check(bb, &args[1])?;
        let (arg3, arg3_undef) = self.tree2inst(bb, &args[2])?;
        let (arg4, arg4_undef) = self.tree2inst(bb, &args[3])?;
        let has_undef = arg3_undef.is_some() || arg4_undef.is_some();
        let (arg3_undef, arg4_undef) = if has_undef {
            let bits3 = self.func.inst(arg3).bitsize;
            let bits4 = self.func.inst(arg4).bitsize;
            let zero3 = self.func.value_inst(0, bits3);
            let zero4 = self.func.value_inst(0, bits4);
            (
                Some(arg3_undef.unwrap_or(zero3)),
                Some(arg4_undef.unwrap_or(zero4)),
            )
        } else {
            (None, None)
        };
        assert_eq!(self.func.inst(arg1).bitsize, self.func.inst(arg2).bitsize);
        assert_eq!(self.func.inst(arg3).bitsize, self.func.inst(arg4).bitsize);

        let ExprKind::IntCst { value: code_value } = args[4].kind else {
            return Err(Error::not_implemented("VCOND: non-constant comparison"));
        };
        let code = vcond_comparison(code_value)?;

        let elem_bitsize1 = bitsize_for_type(&arg1_elem_type)? as u32;
        let elem_bitsize3 = bitsize_for_type(&arg3_elem_type)? as u32;

        let bool_type = TypeData::boolean();
        let mut res: Option<InstId> = None;
        let nof_elt = bitsize_for_type(&args[0].ty)? as u32 / elem_bitsize1;
        for i in 0..nof_elt {
            let a1 = self.extract_vec_elem(bb, arg1, elem_bitsize1, i);
            let a2 = self.extract_vec_elem(bb, arg2, elem_bitsize1, i);
            let a3 = self.extract_vec_elem(bb, arg3, elem_bitsize3, i);
            let a4 = self.extract_vec_elem(bb, arg4, elem_bitsize3, i);

            let cond = if arg1_elem_type.is_float() {
                self.process_binary_float(code, a1, a2, bb)?
            } else {
                self.process_binary_int_value(
                    code,
                    is_unsigned,
                    a1,
                    a2,
                    &bool_type,
                    &arg1_elem_type,
                    &arg2_elem_type,
                    bb,
                )?
            };
            let inst = self.func.build_inst3(bb, Op::Ite, cond, a3, a4);
            res = Some(match res {
                Some(r) => self.func.build_inst2(bb, Op::Concat, inst, r),
                None => inst,
            });

            if let (Some(u3), Some(u4)) = (arg3_undef, arg4_undef) {
                let a3_undef = self.extract_vec_elem(bb, u3, elem_bitsize3, i);
                let a4_undef = self.extract_vec_elem(bb, u4, elem_bitsize3, i);
                let undef = self.func.build_inst3(bb, Op::Ite, cond, a3_undef, a4_undef);
                self.build_ub_if_not_zero(bb, undef);
            }
        }
        if let Some(lhs) = lhs {
            self.set_lhs(bb, lhs, res.unwrap())?;
        }
        Ok(())
    }
}

/// The comparison encoding used by the VCOND/VCONDU internal calls.
fn vcond_comparison(value: u128) -> Result<BinaryCode> {
    match value {
        0 => Ok(BinaryCode::Eq),
        1 => Ok(BinaryCode::Ne),
        2 => Ok(BinaryCode::Lt),
        3 => Ok(BinaryCode::Le),
        4 => Ok(BinaryCode::Gt),
        5 => Ok(BinaryCode::Ge),
        _ => Err(Error::not_implemented("VCOND: unknown comparison code")),
    }
}
