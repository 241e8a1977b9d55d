//! Memory-object creation for globals, locals, parameters and the function
//! result, plus initializer lowering.

use super::memory::padding_at_offset;
use super::*;
use crate::tree::{CtorIndex, ParamDecl, TypeKind, VarDecl};

impl<'a> Converter<'a> {
    pub(crate) fn process_variables(&mut self) -> Result<()> {
        if let Some(result_decl) = self.fun.result {
            let retval_type = self.unit.decl(result_decl).ty.clone();
            if !retval_type.is_void() {
                self.retval_bitsize = bitsize_for_type(&retval_type)? as u32;

                let id_bits = self.func.ptr.id_bits;
                let id = match self.state.decl2id.get(&result_decl) {
                    Some(&id) => id,
                    None => {
                        let id = self.state.local_id(id_bits)?;
                        self.state.decl2id.insert(result_decl, id);
                        id
                    }
                };
                let size = bytesize_for_type(&retval_type)?;
                let memory_inst = self.build_memory_inst(id, size, MEM_UNINIT);
                self.decl2inst.insert(result_decl, memory_inst);
                self.retval_type = Some(retval_type);
            }
        }

        // The anonymous memory block unconstrained pointers may point into.
        self.build_memory_inst(2, ANON_MEM_SIZE, MEM_KEEP);

        // Global variables. Aliases are resolved in a second pass, and
        // initializers are emitted last since a pointer may need the
        // address of a later variable.
        let mut name2decl: HashMap<String, DeclId> = HashMap::new();
        for &decl_id in &self.unit.globals {
            let decl = self.unit.decl(decl_id).clone();
            if decl.alias_of.is_some() {
                continue;
            }
            let size = bytesize_for_type(&decl.ty)?;
            if size > MAX_MEMORY_UNROLL_LIMIT {
                return Err(Error::not_implemented("too large global variable"));
            }
            if size == 0 {
                return Err(Error::not_implemented("global variable of unknown size"));
            }

            let id_bits = self.func.ptr.id_bits;
            let id = match self.state.decl2id.get(&decl_id) {
                Some(&id) => id,
                None => {
                    // Artificial decls hold data introduced by the compiler
                    // (switch tables and such); normal pointers cannot point
                    // to them, so they get local ids.
                    let id = if decl.artificial {
                        self.state.local_id(id_bits)?
                    } else {
                        self.state.global_id(id_bits)?
                    };
                    self.state.decl2id.insert(decl_id, id);
                    id
                }
            };
            let mut flags = 0;
            if decl.read_only {
                flags |= MEM_CONST;
            }
            let memory_inst = self.build_memory_inst(id, size, flags);
            self.decl2inst.insert(decl_id, memory_inst);
            if let Some(name) = &decl.name {
                name2decl.insert(name.clone(), decl_id);
            }
        }

        for &decl_id in &self.unit.globals {
            let decl = self.unit.decl(decl_id);
            if let Some(alias_name) = &decl.alias_of {
                let Some(&alias_decl) = name2decl.get(alias_name) else {
                    return Err(Error::not_implemented("unknown alias"));
                };
                let inst = self.decl2inst[&alias_decl];
                self.decl2inst.insert(decl_id, inst);
                if let Some(name) = &decl.name {
                    name2decl.insert(name.clone(), alias_decl);
                }
            }
        }

        for &decl_id in &self.unit.globals {
            let decl = self.unit.decl(decl_id).clone();
            if decl.read_only {
                let mem_inst = self.decl2inst[&decl_id];
                self.init_var(&decl, mem_inst)?;
            }
        }

        // Local variables. Static locals are included in the globals, so
        // their memory objects already exist.
        for &decl_id in &self.fun.locals {
            if self.decl2inst.contains_key(&decl_id) {
                assert!(self.unit.decl(decl_id).is_static);
                continue;
            }
            let decl = self.unit.decl(decl_id).clone();
            assert!(decl.init.is_none());

            let size = bytesize_for_type(&decl.ty)?;
            if size > MAX_MEMORY_UNROLL_LIMIT {
                return Err(Error::not_implemented("too large local variable"));
            }

            let id_bits = self.func.ptr.id_bits;
            let id = match self.state.decl2id.get(&decl_id) {
                Some(&id) => id,
                None => {
                    let id = self.state.local_id(id_bits)?;
                    self.state.decl2id.insert(decl_id, id);
                    id
                }
            };
            let mut flags = MEM_UNINIT;
            if decl.read_only {
                flags |= MEM_CONST;
            }
            let memory_inst = self.build_memory_inst(id, size, flags);
            self.decl2inst.insert(decl_id, memory_inst);
        }
        Ok(())
    }

    pub(crate) fn process_func_args(&mut self) -> Result<()> {
        let entry = self.func.entry();
        let params: Vec<ParamDecl> = self.fun.params.clone();
        for (param_number, param) in params.iter().enumerate() {
            check_type(&param.ty)?;
            let bitsize = bitsize_for_type(&param.ty)? as u32;
            if bitsize == 0 {
                return Err(Error::not_implemented("parameter size == 0"));
            }

            let type_is_unsigned = matches!(param.ty.kind, TypeKind::Int { unsigned: true, bits, .. } if bits != 32);
            self.state.param_is_unsigned.push(type_is_unsigned);

            if param_number == 0 && param.is_this {
                assert!(param.ty.is_pointer());

                // The constructed object: a constant id so that it is the
                // same between src and tgt.
                let TypeKind::Ptr { pointee } = &param.ty.kind else {
                    unreachable!();
                };
                let size = bytesize_for_type(pointee)?;
                let param_inst = self.build_memory_inst(1, size, MEM_UNINIT | MEM_KEEP);
                self.param2inst.insert(param_number as u32, param_inst);
                continue;
            }

            let param_nbr = self.func.value_inst(param_number as u128, 32);
            let param_bitsize = self.func.value_inst(bitsize as u128, 32);
            let param_inst = self
                .func
                .build_inst2(entry, Op::Param, param_nbr, param_bitsize);
            self.param2inst.insert(param_number as u32, param_inst);

            // Pointer arguments cannot point to local variables or to the
            // "this" object of a constructor.
            if param.ty.is_pointer() {
                let id_bits = self.func.ptr.id_bits;
                let id = self.func.build_extract_id(entry, param_inst);
                let zero = self.func.value_inst(0, id_bits);
                let cond0 = self.func.build_inst2(entry, Op::Slt, id, zero);
                let one = self.func.value_inst(1, id_bits);
                let cond1 = self.func.build_inst2(entry, Op::Eq, id, one);
                let cond = self.func.build_inst2(entry, Op::Or, cond0, cond1);
                self.func.build_inst1(entry, Op::Ub, cond);
            }

            self.canonical_nan_check(entry, param_inst, &param.ty, None)?;

            if param.ty.is_pointer() && param.nonnull {
                let zero = self.func.value_inst(0, bitsize);
                let cond = self.func.build_inst2(entry, Op::Eq, param_inst, zero);
                self.func.build_inst1(entry, Op::Ub, cond);
            }

            // Interprocedurally known bits: every call site passes a value
            // satisfying (param & ~mask) == value.
            if let Some((value, mask)) = param.known_bits {
                assert_eq!(mask & value, 0);
                let m_inst = self.func.value_inst(!mask, bitsize);
                let v_inst = self.func.value_inst(value, bitsize);
                let and_inst = self.func.build_inst2(entry, Op::And, param_inst, m_inst);
                let cond = self.func.build_inst2(entry, Op::Ne, v_inst, and_inst);
                self.func.build_inst1(entry, Op::Ub, cond);
            }
        }
        Ok(())
    }

    /// Emit the initializer of a read-only global. Uninitialized statics
    /// are zero-filled; constructors zero-fill first (marking padding bytes
    /// indeterminate) and then store each element.
    fn init_var(&mut self, decl: &VarDecl, mem_inst: InstId) -> Result<()> {
        let size = bytesize_for_type(&decl.ty)?;
        if size > MAX_MEMORY_UNROLL_LIMIT {
            return Err(Error::not_implemented("init_var: too large initializer"));
        }
        check_type(&decl.ty)?;

        let bb = self.func.inst(mem_inst).bb.expect("memory without block");

        let Some(init) = decl.init.clone() else {
            if !decl.is_static {
                return Ok(());
            }
            // Uninitialized statics are guaranteed to be zero.
            let mut ptr = mem_inst;
            let zero = self.func.value_inst(0, 8);
            let one = self.func.value_inst(1, self.func.ptr.bits);
            for _ in 0..size {
                self.func.build_inst2(bb, Op::Store, ptr, zero);
                ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
            }
            return Ok(());
        };

        if let ExprKind::Constructor { no_clearing, .. } = &init.kind {
            if *no_clearing {
                return Err(Error::not_implemented("init_var: CONSTRUCTOR_NO_CLEARING"));
            }
            let ty = init.ty.clone();
            let mut ptr = mem_inst;
            let zero = self.func.value_inst(0, 8);
            let one = self.func.value_inst(1, self.func.ptr.bits);
            for i in 0..size {
                let padding = padding_at_offset(&ty, i)?;
                if padding != 0 {
                    let undef = self.func.value_inst(padding as u128, 8);
                    self.func.build_inst2(bb, Op::SetMemUndef, ptr, undef);
                }
                if padding != 255 {
                    self.func.build_inst2(bb, Op::Store, ptr, zero);
                }
                ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
            }
        }

        self.store_initializer(&init, mem_inst)
    }

    /// Recursively store an initializer value at `ptr`.
    fn store_initializer(&mut self, initial: &Expr, ptr: InstId) -> Result<()> {
        let bb = self.func.inst(ptr).bb.expect("pointer without block");
        let ty = initial.ty.clone();

        if let ExprKind::StringCst { bytes } = &initial.kind {
            let bytes = bytes.clone();
            let mut ptr = ptr;
            let one = self.func.value_inst(1, self.func.ptr.bits);
            for byte in bytes {
                let value = self.func.value_inst(byte as u128, 8);
                self.func.build_inst2(bb, Op::Store, ptr, value);
                ptr = self.func.build_inst2(bb, Op::Add, ptr, one);
            }
            return Ok(());
        }

        if ty.is_integral() || ty.is_float() || ty.is_pointer() || ty.is_vector() {
            let value = self.tree2inst_constructor(bb, initial)?;
            let value = self.to_mem_repr(bb, value, &ty)?;
            return self.store_value(bb, ptr, value);
        }

        if let TypeKind::Array { elem, .. } = &ty.kind {
            let elem_size = bytesize_for_type(elem)?;
            let ExprKind::Constructor { elems, .. } = &initial.kind else {
                return Err(Error::not_implemented("init_var: unknown initializer"));
            };
            for (index, value) in elems.clone() {
                let idx = match index {
                    CtorIndex::Element(i) => i,
                    CtorIndex::Range => {
                        return Err(Error::not_implemented("init_var: RANGE_EXPR"))
                    }
                    CtorIndex::Field(_) => panic!("field designator in array initializer"),
                };
                let offset = idx * elem_size;
                let off = self.func.value_inst(offset as u128, self.func.ptr.bits);
                let ptr2 = self.func.build_inst2(bb, Op::Add, ptr, off);
                self.store_initializer(&value, ptr2)?;
            }
            return Ok(());
        }

        if matches!(ty.kind, TypeKind::Record { .. } | TypeKind::Union { .. }) {
            let ExprKind::Constructor { elems, .. } = &initial.kind else {
                return Err(Error::not_implemented("init_var: unknown initializer"));
            };
            for (index, value) in elems.clone() {
                let CtorIndex::Field(field_idx) = index else {
                    panic!("array designator in record initializer");
                };
                let field = record_field(&ty, field_idx).clone();
                let mut offset = field.offset;
                let mut bit_offset = field.bit_offset;
                offset += bit_offset / 8;
                bit_offset &= 7;
                let off = self.func.value_inst(offset as u128, self.func.ptr.bits);
                let ptr2 = self.func.build_inst2(bb, Op::Add, ptr, off);
                let elem_type = value.ty.clone();
                if matches!(
                    elem_type.kind,
                    TypeKind::Array { .. } | TypeKind::Record { .. } | TypeKind::Union { .. }
                ) {
                    self.store_initializer(&value, ptr2)?;
                } else {
                    let bitsize = bitsize_for_type(&elem_type)?;
                    let mut value_inst = self.tree2inst_constructor(bb, &value)?;
                    let size = (bitsize + bit_offset + 7) / 8;
                    if field.bitfield {
                        if bit_offset != 0 {
                            let first_byte = self.func.build_inst1(bb, Op::Load, ptr2);
                            let bits =
                                self.func.build_trunc(bb, first_byte, bit_offset as u32);
                            value_inst = self.func.build_inst2(bb, Op::Concat, value_inst, bits);
                        }
                        if bitsize + bit_offset != size * 8 {
                            let offset =
                                self.func.value_inst(size as u128 - 1, self.func.ptr.bits);
                            let ptr3 = self.func.build_inst2(bb, Op::Add, ptr2, offset);

                            let remaining = size * 8 - (bitsize + bit_offset);
                            assert!(remaining < 8);
                            let high = self.func.value_inst(7, 32);
                            let low = self.func.value_inst(8 - remaining as u128, 32);

                            let last_byte = self.func.build_inst1(bb, Op::Load, ptr3);
                            let bits =
                                self.func.build_inst3(bb, Op::Extract, last_byte, high, low);
                            value_inst = self.func.build_inst2(bb, Op::Concat, bits, value_inst);
                        }
                    } else {
                        value_inst = self.to_mem_repr(bb, value_inst, &elem_type)?;
                    }
                    self.store_value(bb, ptr2, value_inst)?;
                }
            }
            return Ok(());
        }

        Err(Error::not_implemented("init_var: unknown initializer"))
    }
}
