//! The memory model: address computation, byte-granular loads and stores,
//! padding, bit-fields, and the UB checks attached to every access.

use super::*;
use crate::tree::{Field, TypeKind};

/// A computed address: the pointer plus a sub-byte bit offset (nonzero only
/// for bit-field accesses).
pub(crate) struct Addr {
    pub ptr: InstId,
    pub bitoffset: u64,
}

/// The padding bits of the byte-sized window at `offset` into a bit-field
/// group. A bit is padding when no member of the group covers it.
fn bitfield_padding_at_offset(fields: &[Field], offset: i64) -> Result<u8> {
    let mut used_bits: u8 = 0;
    for field in fields {
        if !field.bitfield {
            break;
        }
        let elem_bit_size = bitsize_for_type(&field.ty)? as i64;
        if elem_bit_size == 0 {
            continue;
        }
        let mut elem_offset = field.offset as i64;
        let mut elem_bit_offset = field.bit_offset as i64;
        elem_offset += elem_bit_offset / 8;
        elem_bit_offset &= 7;
        let elem_size = (elem_bit_offset + elem_bit_size + 7) / 8;
        if elem_offset <= offset && offset < elem_offset + elem_size {
            let mut bit_size = elem_bit_size;
            let mut bit_offset = elem_bit_offset;
            if elem_offset < offset {
                bit_size -= 8 - bit_offset;
                bit_offset = 0;
                elem_offset += 1;
                if bit_size < 0 {
                    continue;
                }
            }
            if elem_offset < offset {
                bit_size -= 8 * (offset - elem_offset);
                if bit_size < 0 {
                    continue;
                }
            }
            bit_size = bit_size.min(8);
            used_bits |= (((1u32 << bit_size) - 1) as u8) << bit_offset;
        }
    }
    Ok(!used_bits)
}

/// An 8-bit mask of the padding (indeterminate) bits at byte `offset` of
/// `ty`. `0xff` means the whole byte is padding and need not be loaded.
pub(crate) fn padding_at_offset(ty: &Type, offset: u64) -> Result<u8> {
    match &ty.kind {
        TypeKind::Array { elem, .. } => {
            let elem_size = bytesize_for_type(elem)?;
            padding_at_offset(elem, offset % elem_size)
        }
        TypeKind::Record { fields } => {
            for (i, field) in fields.iter().enumerate() {
                let mut elem_offset = field.offset;
                let mut elem_bit_offset = field.bit_offset;
                elem_offset += elem_bit_offset / 8;
                elem_bit_offset &= 7;
                if field.bitfield {
                    let elem_bit_size = bitsize_for_type(&field.ty)?;
                    let elem_size = (elem_bit_offset + elem_bit_size + 7) / 8;
                    if elem_offset <= offset && offset < elem_offset + elem_size {
                        return bitfield_padding_at_offset(&fields[i..], offset as i64);
                    }
                } else {
                    let elem_size = bytesize_for_type(&field.ty)?;
                    if elem_offset <= offset && offset < elem_offset + elem_size {
                        return padding_at_offset(&field.ty, offset - elem_offset);
                    }
                }
            }
            Ok(0xff)
        }
        TypeKind::Union { fields } => {
            // A union byte is padding only when it is padding in every
            // member.
            let mut padding = 0xff;
            for field in fields {
                padding &= padding_at_offset(&field.ty, offset)?;
            }
            Ok(padding)
        }
        // Other types have no padding (wide booleans almost do, but their
        // padding bits must be zero, so they are not indeterminate).
        _ => Ok(0),
    }
}

impl<'a> Converter<'a> {
    /// Emit the UB checks for a store of `size` bytes at `ptr`: the access
    /// must stay inside one memory object, within its size, and the object
    /// must not be read-only.
    pub(crate) fn store_ub_check(&mut self, bb: BlockId, ptr: InstId, size: u64) {
        let size_inst = self.func.value_inst(size as u128, self.func.ptr.bits);
        let end = self.func.build_inst2(bb, Op::Add, ptr, size_inst);
        let id = self.func.build_extract_id(bb, ptr);
        let id_end = self.func.build_extract_id(bb, end);
        let overflow = self.func.build_inst2(bb, Op::Ne, id, id_end);
        self.func.build_inst1(bb, Op::Ub, overflow);
        let mem_size = self.func.build_inst1(bb, Op::MemSize, id);
        let offset = self.func.build_extract_offset(bb, end);
        let out_of_bound = self.func.build_inst2(bb, Op::Ugt, offset, mem_size);
        self.func.build_inst1(bb, Op::Ub, out_of_bound);
        let is_const = self.func.build_inst1(bb, Op::IsConstMem, id);
        self.func.build_inst1(bb, Op::Ub, is_const);
    }

    /// Emit the UB checks for a load of `size` bytes at `ptr`.
    pub(crate) fn load_ub_check(&mut self, bb: BlockId, ptr: InstId, size: u64) {
        let size_inst = self.func.value_inst(size as u128, self.func.ptr.bits);
        let end = self.func.build_inst2(bb, Op::Add, ptr, size_inst);
        let id = self.func.build_extract_id(bb, ptr);
        let id_end = self.func.build_extract_id(bb, end);
        let overflow = self.func.build_inst2(bb, Op::Ne, id, id_end);
        self.func.build_inst1(bb, Op::Ub, overflow);
        let mem_size = self.func.build_inst1(bb, Op::MemSize, id);
        let offset = self.func.build_extract_offset(bb, end);
        let out_of_bound = self.func.build_inst2(bb, Op::Ugt, offset, mem_size);
        self.func.build_inst1(bb, Op::Ub, out_of_bound);
    }

    /// Pointer + integer, with UB when the addition changes the memory id
    /// or the addend's magnitude exceeds the offset field (which the id
    /// check alone can miss when the offset calculation wraps).
    pub(crate) fn add_to_pointer(
        &mut self,
        bb: BlockId,
        ptr: InstId,
        value: InstId,
    ) -> InstId {
        if self.func.inst(value).op == Op::Value && self.func.inst(value).value() == 0 {
            return ptr;
        }

        let res = self.func.build_inst2(bb, Op::Add, ptr, value);

        let id1 = self.func.build_extract_id(bb, ptr);
        let id2 = self.func.build_extract_id(bb, res);
        let is_ub = self.func.build_inst2(bb, Op::Ne, id1, id2);
        self.func.build_inst1(bb, Op::Ub, is_ub);

        let value_bits = self.func.inst(value).bitsize;
        let max_off = (1u128 << self.func.ptr.offset_bits) - 1;
        let max = self.func.value_inst(max_off, value_bits);
        let min = self.func.value_inst(max_off.wrapping_neg(), value_bits);
        let cond1 = self.func.build_inst2(bb, Op::Sgt, value, max);
        let cond2 = self.func.build_inst2(bb, Op::Slt, value, min);
        let cond = self.func.build_inst2(bb, Op::Or, cond1, cond2);
        self.func.build_inst1(bb, Op::Ub, cond);

        res
    }

    fn alignment_check(&mut self, bb: BlockId, ty: &Type, ptr: InstId) {
        let alignment = ty.align;
        if alignment > 1 {
            assert!(alignment.is_power_of_two());
            let low_bits = alignment.trailing_zeros();
            let extract = self.func.build_trunc(bb, ptr, low_bits);
            let zero = self.func.value_inst(0, low_bits);
            let cond = self.func.build_inst2(bb, Op::Ne, extract, zero);
            self.func.build_inst1(bb, Op::Ub, cond);
        }
    }

    fn process_array_ref(&mut self, bb: BlockId, expr: &Expr) -> Result<Addr> {
        let ExprKind::ArrayRef { array, index } = &expr.kind else {
            panic!("process_array_ref on non-array-ref");
        };
        let TypeKind::Array { elem, max_index } = &array.ty.kind else {
            return Err(Error::not_implemented("process_array_ref: not an array"));
        };
        let elem_type = elem.clone();
        let max_index = *max_index;

        let ptr = self.process_address(bb, array)?.ptr;
        let mut idx = self.tree2inst_undef_check(bb, index)?;
        let ptr_bits = self.func.ptr.bits;
        if self.func.inst(idx).bitsize < ptr_bits {
            let bitsize_inst = self.func.value_inst(ptr_bits as u128, 32);
            let op = if index.ty.is_unsigned() {
                Op::Zext
            } else {
                Op::Sext
            };
            idx = self.func.build_inst2(bb, op, idx, bitsize_inst);
        } else if self.func.inst(idx).bitsize > ptr_bits {
            let idx_bits = self.func.inst(idx).bitsize;
            let high = self.func.value_inst(idx_bits as u128 - 1, 32);
            let low = self.func.value_inst(ptr_bits as u128, 32);
            let top = self.func.build_inst3(bb, Op::Extract, idx, high, low);
            let zero = self.func.value_inst(0, self.func.inst(top).bitsize);
            let cond = self.func.build_inst2(bb, Op::Ne, top, zero);
            self.func.build_inst1(bb, Op::Ub, cond);
            idx = self.func.build_trunc(bb, idx, ptr_bits);
        }

        let elem_size = bytesize_for_type(&elem_type)?;
        let idx_bits = self.func.inst(idx).bitsize;
        let elm_size = self.func.value_inst(elem_size as u128, idx_bits);
        let offset = self.func.build_inst2(bb, Op::Mul, idx, elm_size);
        let ptr = self.add_to_pointer(bb, ptr, offset);

        if let Some(max_val) = max_index {
            let max_inst = self.func.value_inst(max_val, idx_bits);
            let cond = self.func.build_inst2(bb, Op::Ugt, idx, max_inst);
            self.func.build_inst1(bb, Op::Ub, cond);
        } else {
            // No known bound; the offset computation must still fit in the
            // pointer's offset field, checked in double width.
            let op = if index.ty.is_unsigned() {
                Op::Zext
            } else {
                Op::Sext
            };
            let ext_bitsize = self.func.value_inst(ptr_bits as u128 * 2, 32);
            let eidx = self.func.build_inst2(bb, op, idx, ext_bitsize);
            let eelm_size = self.func.value_inst(elem_size as u128, ptr_bits * 2);
            let eoffset = self.func.build_inst2(bb, Op::Mul, eidx, eelm_size);
            let emax_offset = self
                .func
                .value_inst(1u128 << self.func.ptr.offset_bits, ptr_bits * 2);
            let cond = self.func.build_inst2(bb, Op::Uge, eoffset, emax_offset);
            self.func.build_inst1(bb, Op::Ub, cond);
        }
        Ok(Addr { ptr, bitoffset: 0 })
    }

    fn process_component_ref(&mut self, bb: BlockId, expr: &Expr) -> Result<Addr> {
        let ExprKind::ComponentRef { object, field } = &expr.kind else {
            panic!("process_component_ref on non-component-ref");
        };
        let field = record_field(&object.ty, *field).clone();
        let mut offset = field.offset;
        let mut bit_offset = field.bit_offset;
        offset += bit_offset / 8;
        bit_offset &= 7;

        let ptr = self.process_address(bb, object)?.ptr;
        let off = self.func.value_inst(offset as u128, self.func.ptr.bits);
        let ptr = self.add_to_pointer(bb, ptr, off);

        Ok(Addr {
            ptr,
            bitoffset: bit_offset,
        })
    }

    fn process_bit_field_ref(&mut self, bb: BlockId, expr: &Expr) -> Result<Addr> {
        let ExprKind::BitFieldRef {
            object, bit_offset, ..
        } = &expr.kind
        else {
            panic!("process_bit_field_ref on non-bit-field-ref");
        };
        let mut bit_offset = *bit_offset;
        let mut ptr = self.process_address(bb, object)?.ptr;
        if bit_offset > 7 {
            let offset = bit_offset / 8;
            let off = self.func.value_inst(offset as u128, self.func.ptr.bits);
            ptr = self.add_to_pointer(bb, ptr, off);
            bit_offset &= 7;
        }
        Ok(Addr {
            ptr,
            bitoffset: bit_offset,
        })
    }

    pub(crate) fn process_address(&mut self, bb: BlockId, expr: &Expr) -> Result<Addr> {
        match &expr.kind {
            ExprKind::MemRef { base, offset } => {
                let arg1 = self.tree2inst_undef_check(bb, base)?;
                let arg2 = self.tree2inst_undef_check(bb, offset)?;
                let ptr = self.add_to_pointer(bb, arg1, arg2);
                self.alignment_check(bb, &expr.ty, ptr);
                Ok(Addr { ptr, bitoffset: 0 })
            }
            ExprKind::TargetMemRef {
                base,
                offset,
                index,
                step,
                index2,
            } => {
                let base = self.tree2inst_undef_check(bb, base)?;
                let mut off = self.tree2inst_undef_check(bb, offset)?;
                if let Some(index) = index {
                    let mut idx = self.tree2inst_undef_check(bb, index)?;
                    if let Some(step) = step {
                        let step = self.tree2inst_undef_check(bb, step)?;
                        idx = self.func.build_inst2(bb, Op::Mul, step, idx);
                    }
                    off = self.func.build_inst2(bb, Op::Add, off, idx);
                }
                if let Some(index2) = index2 {
                    let idx2 = self.tree2inst_undef_check(bb, index2)?;
                    off = self.func.build_inst2(bb, Op::Add, off, idx2);
                }
                let ptr = self.add_to_pointer(bb, base, off);
                self.alignment_check(bb, &expr.ty, ptr);
                Ok(Addr { ptr, bitoffset: 0 })
            }
            ExprKind::VarDecl { decl } => {
                if let Some(&ptr) = self.decl2inst.get(decl) {
                    return Ok(Addr { ptr, bitoffset: 0 });
                }
                Err(Error::not_implemented("process_address: var_decl"))
            }
            ExprKind::ResultDecl { decl } => {
                let ptr = self.decl2inst[decl];
                Ok(Addr { ptr, bitoffset: 0 })
            }
            ExprKind::ArrayRef { .. } => self.process_array_ref(bb, expr),
            ExprKind::ComponentRef { .. } => self.process_component_ref(bb, expr),
            ExprKind::BitFieldRef { .. } => self.process_bit_field_ref(bb, expr),
            ExprKind::ViewConvert { operand } | ExprKind::RealPart { operand } => {
                self.process_address(bb, operand)
            }
            ExprKind::ImagPart { operand } => {
                let ptr = self.process_address(bb, operand)?.ptr;
                let offset_val = bytesize_for_type(&expr.ty)?;
                let offset = self.func.value_inst(offset_val as u128, self.func.ptr.bits);
                let ptr = self.add_to_pointer(bb, ptr, offset);
                Ok(Addr { ptr, bitoffset: 0 })
            }
            ExprKind::IntCst { .. } => {
                let ptr = self.tree2inst_undef_check(bb, expr)?;
                Ok(Addr { ptr, bitoffset: 0 })
            }
            _ => Err(Error::not_implemented(format!(
                "process_address: {}",
                expr.kind.name()
            ))),
        }
    }

    /// Byte-granular load of `expr`'s location, with per-byte undef and
    /// provenance-flag propagation. Fully padded bytes are not loaded; they
    /// yield zero with a full undef mask.
    pub(crate) fn process_load(&mut self, bb: BlockId, expr: &Expr) -> Result<ValUndef> {
        let ty = expr.ty.clone();
        let bitsize = bitsize_for_type(&ty)?;
        let mut size = bytesize_for_type(&ty)?;
        if bitsize == 0 {
            return Err(Error::not_implemented("process_load: unhandled size 0"));
        }
        if size > MAX_MEMORY_UNROLL_LIMIT {
            return Err(Error::not_implemented("process_load: load size too big"));
        }
        let addr = self.process_address(bb, expr)?;
        let is_bitfield = is_bit_field(expr);
        assert!(is_bitfield || addr.bitoffset == 0);
        if is_bitfield {
            size = (bitsize + addr.bitoffset + 7) / 8;
        }
        self.load_ub_check(bb, addr.ptr, size);

        let mut value: Option<InstId> = None;
        let mut undef: Option<InstId> = None;
        let mut mem_flags: Option<InstId> = None;
        for i in 0..size {
            let offset = self.func.value_inst(i as u128, self.func.ptr.bits);
            let ptr = self.func.build_inst2(bb, Op::Add, addr.ptr, offset);

            let padding = padding_at_offset(&ty, i)?;
            let (data_byte, undef_byte) = if padding == 255 {
                // The whole byte is indeterminate; no load needed.
                let data = self.func.value_inst(0, 8);
                let u = self.func.value_inst(255, 8);
                (data, u)
            } else {
                let data = self.func.build_inst1(bb, Op::Load, ptr);
                let mut u = self.func.build_inst1(bb, Op::GetMemUndef, ptr);
                if padding != 0 {
                    let padding_inst = self.func.value_inst(padding as u128, 8);
                    u = self.func.build_inst2(bb, Op::Or, u, padding_inst);
                }
                (data, u)
            };

            value = Some(match value {
                Some(v) => self.func.build_inst2(bb, Op::Concat, data_byte, v),
                None => data_byte,
            });
            undef = Some(match undef {
                Some(u) => self.func.build_inst2(bb, Op::Concat, undef_byte, u),
                None => undef_byte,
            });

            let flag = self.func.build_inst1(bb, Op::GetMemFlag, ptr);
            let eight = self.func.value_inst(8, 32);
            let flag = self.func.build_inst2(bb, Op::Sext, flag, eight);
            mem_flags = Some(match mem_flags {
                Some(f) => self.func.build_inst2(bb, Op::Concat, flag, f),
                None => flag,
            });
        }
        let mut value = value.unwrap();
        let mut undef = undef.unwrap();
        let mut mem_flags = mem_flags.unwrap();

        if is_bitfield {
            let high = self
                .func
                .value_inst((bitsize + addr.bitoffset - 1) as u128, 32);
            let low = self.func.value_inst(addr.bitoffset as u128, 32);
            value = self.func.build_inst3(bb, Op::Extract, value, high, low);
            undef = self.func.build_inst3(bb, Op::Extract, undef, high, low);
            mem_flags = self.func.build_inst3(bb, Op::Extract, mem_flags, high, low);
        } else {
            value = self.from_mem_repr(bb, value, &ty)?;
            undef = self.from_mem_repr(bb, undef, &ty)?;
            mem_flags = self.from_mem_repr(bb, mem_flags, &ty)?;
            self.inst2memory_flagsx.insert(value, mem_flags);
        }

        self.constrain_pointer(bb, value, &ty, mem_flags)?;
        self.canonical_nan_check(bb, value, &ty, Some(undef))?;

        Ok((value, Some(undef)))
    }

    /// Write a value to memory without UB checks or flag updates; used for
    /// initializers whose stores are known valid.
    pub(crate) fn store_value(&mut self, bb: BlockId, ptr: InstId, value: InstId) -> Result<()> {
        if self.func.inst(value).bitsize % 8 != 0 {
            return Err(Error::not_implemented("store_value: not byte aligned"));
        }
        let size = self.func.inst(value).bitsize / 8;
        let one = self.func.value_inst(1, self.func.ptr.bits);
        let mut ptr = ptr;
        for i in 0..size {
            let high = self.func.value_inst((i * 8 + 7) as u128, 32);
            let low = self.func.value_inst((i * 8) as u128, 32);
            let byte = self.func.build_inst3(bb, Op::Extract, value, high, low);
            self.func.build_inst2(bb, Op::Store, ptr, byte);
            ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
        }
        Ok(())
    }

    pub(crate) fn process_store(
        &mut self,
        addr_expr: &Expr,
        value_expr: &Expr,
        bb: BlockId,
    ) -> Result<()> {
        if let ExprKind::StringCst { bytes } = &value_expr.kind {
            let str_len = bytes.len() as u64;
            let size = bytesize_for_type(&addr_expr.ty)?;
            assert!(str_len <= size);
            if size > MAX_MEMORY_UNROLL_LIMIT {
                return Err(Error::not_implemented("process_store: too large string"));
            }
            let bytes = bytes.clone();
            let addr = self.process_address(bb, addr_expr)?;
            assert_eq!(addr.bitoffset, 0);
            let mut ptr = addr.ptr;
            let one = self.func.value_inst(1, self.func.ptr.bits);
            let memory_flag = self.func.value_inst(1, 1);
            let undef = self.func.value_inst(0, 8);

            self.store_ub_check(bb, ptr, size);
            for i in 0..size {
                let byte = *bytes.get(i as usize).unwrap_or(&0);
                let value = self.func.value_inst(byte as u128, 8);
                self.func.build_inst2(bb, Op::Store, ptr, value);
                self.func.build_inst2(bb, Op::SetMemFlag, ptr, memory_flag);
                self.func.build_inst2(bb, Op::SetMemUndef, ptr, undef);
                ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
            }
            return Ok(());
        }

        let value_type = value_expr.ty.clone();
        let is_bitfield = is_bit_field(addr_expr);
        let addr = self.process_address(bb, addr_expr)?;
        assert!(is_bitfield || addr.bitoffset == 0);
        assert!(addr.bitoffset < 8);
        let (mut value, undef) = self.tree2inst(bb, value_expr)?;
        let mut undef = match undef {
            Some(u) => u,
            None => {
                let bits = self.func.inst(value).bitsize;
                self.func.value_inst(0, bits)
            }
        };

        let size;
        if is_bitfield {
            let bitsize = bitsize_for_type(&value_type)?;
            size = (bitsize + addr.bitoffset + 7) / 8;

            // Merge the neighboring bits of the first and last byte when
            // the field does not start or end on a byte boundary.
            if addr.bitoffset != 0 {
                let first_byte = self.func.build_inst1(bb, Op::Load, addr.ptr);
                let bits = self.func.build_trunc(bb, first_byte, addr.bitoffset as u32);
                value = self.func.build_inst2(bb, Op::Concat, value, bits);

                let first_byte = self.func.build_inst1(bb, Op::GetMemUndef, addr.ptr);
                let bits = self.func.build_trunc(bb, first_byte, addr.bitoffset as u32);
                undef = self.func.build_inst2(bb, Op::Concat, undef, bits);
            }

            if bitsize + addr.bitoffset != size * 8 {
                let offset = self.func.value_inst(size as u128 - 1, self.func.ptr.bits);
                let ptr = self.func.build_inst2(bb, Op::Add, addr.ptr, offset);

                let remaining = size * 8 - (bitsize + addr.bitoffset);
                assert!(remaining < 8);
                let high = self.func.value_inst(7, 32);
                let low = self.func.value_inst(8 - remaining as u128, 32);

                let last_byte = self.func.build_inst1(bb, Op::Load, ptr);
                let bits = self.func.build_inst3(bb, Op::Extract, last_byte, high, low);
                value = self.func.build_inst2(bb, Op::Concat, bits, value);

                let last_byte = self.func.build_inst1(bb, Op::GetMemUndef, ptr);
                let bits = self.func.build_inst3(bb, Op::Extract, last_byte, high, low);
                undef = self.func.build_inst2(bb, Op::Concat, bits, undef);
            }
        } else {
            size = bytesize_for_type(&value_type)?;
            value = self.to_mem_repr(bb, value, &value_type)?;
            undef = self.uninit_to_mem_repr(bb, undef, &value_type)?;
        }

        let memory_flagsx = self.inst2memory_flagsx.get(&value).copied();

        for i in 0..size {
            let offset = self.func.value_inst(i as u128, self.func.ptr.bits);
            let ptr = self.func.build_inst2(bb, Op::Add, addr.ptr, offset);

            let high = self.func.value_inst((i * 8 + 7) as u128, 32);
            let low = self.func.value_inst((i * 8) as u128, 32);

            let padding = padding_at_offset(&value_type, i)?;
            if padding == 255 {
                // A fully padded byte is indeterminate whatever we store,
                // so only the undef state is written.
                let all = self.func.value_inst(255, 8);
                self.func.build_inst2(bb, Op::SetMemUndef, ptr, all);
            } else {
                let byte = self.func.build_inst3(bb, Op::Extract, value, high, low);
                self.func.build_inst2(bb, Op::Store, ptr, byte);

                let mut byte = self.func.build_inst3(bb, Op::Extract, undef, high, low);
                if padding != 0 {
                    let padding_inst = self.func.value_inst(padding as u128, 8);
                    byte = self.func.build_inst2(bb, Op::Or, byte, padding_inst);
                }
                self.func.build_inst2(bb, Op::SetMemUndef, ptr, byte);
            }

            let memory_flag = match memory_flagsx {
                Some(flags) => {
                    let flag = self.func.build_inst3(bb, Op::Extract, flags, high, low);
                    let zero = self.func.value_inst(0, self.func.inst(flag).bitsize);
                    self.func.build_inst2(bb, Op::Ne, flag, zero)
                }
                None => self.func.value_inst(1, 1),
            };
            self.func.build_inst2(bb, Op::SetMemFlag, ptr, memory_flag);
        }

        self.store_ub_check(bb, addr.ptr, size);
        Ok(())
    }

    /// Mark `size` bytes as fully indeterminate.
    pub(crate) fn make_uninit(&mut self, bb: BlockId, ptr: InstId, size: u64) {
        let one = self.func.value_inst(1, self.func.ptr.bits);
        let byte_m1 = self.func.value_inst(255, 8);
        let mut ptr = ptr;
        for _ in 0..size {
            self.func.build_inst2(bb, Op::SetMemUndef, ptr, byte_m1);
            ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
        }
    }
}
