//! Lowering from the typed source tree to the IR.
//!
//! The converter walks a [`SourceFunction`] in reverse post-order and emits
//! one IR function that encodes every behavior of the source, including all
//! undefined-behavior conditions. Each evaluated expression produces a
//! `(value, undef)` pair: `undef` is absent for fully defined values, or a
//! bitvector of the value's width whose set bits mark indeterminate bits.
//! Most operations require fully defined operands and emit `UB(undef != 0)`;
//! the bit-wise operations propagate undef bits precisely instead.
//!
//! Constructs outside the supported subset raise
//! [`Error::NotImplemented`](crate::error::Error); the caller skips the
//! function without claiming a verdict.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ir::{
    BlockId, Function, InstId, Module, Op, MEM_CONST, MEM_KEEP, MEM_UNINIT,
};
use crate::tree::{
    bitsize_for_type, bytesize_for_type, check_type, BinaryCode, CallTarget, DeclId, Expr,
    ExprKind, SourceFunction, SourceTerm, SourceUnit, SrcBlockId, Stmt, Type, TypeData,
};

mod builtins;
mod control;
mod expr;
mod init;
mod memory;
mod scalar;
mod stmt;
mod vector;

#[cfg(test)]
mod tests;

/// How many bytes a load, store, memset, etc. may expand to.
pub const MAX_MEMORY_UNROLL_LIMIT: u64 = 10_000;

/// Size of the anonymous memory block introduced so that unconstrained
/// pointers have memory to point to.
pub const ANON_MEM_SIZE: u64 = 128;

/// The maximum number of basic blocks allowed in a function.
pub const MAX_BBS: usize = 1_000;

/// The maximum number of instructions in one basic block.
pub const MAX_NOF_INSTS: usize = 100_000;

/// A lowered expression: the value and, when some bits may be
/// indeterminate, an undef mask of the same width.
pub type ValUndef = (InstId, Option<InstId>);

/// State shared between the lowering of the source and target functions so
/// that memory ids and symbolic indices agree between the two.
#[derive(Debug, Default)]
pub struct CommonState {
    pub decl2id: HashMap<DeclId, i64>,
    /// Next local (negative) memory id, pre-decrement.
    id_local: i64,
    /// Next global (positive) memory id, pre-increment; starts past the
    /// reserved ids 1 ("this") and 2 (anonymous memory).
    id_global: i64,
    pub clz_bitsize2idx: HashMap<u32, u32>,
    pub symbolic_idx: u32,
    /// Signedness of each source parameter, consumed by the asm front-end
    /// when widening sub-word arguments.
    pub param_is_unsigned: Vec<bool>,
}

impl CommonState {
    pub fn new() -> Self {
        CommonState {
            id_global: 2,
            ..Default::default()
        }
    }

    fn local_id(&mut self, ptr_id_bits: u32) -> Result<i64> {
        if self.id_local <= -(1 << (ptr_id_bits - 1)) {
            return Err(Error::not_implemented("too many local variables"));
        }
        self.id_local -= 1;
        Ok(self.id_local)
    }

    fn global_id(&mut self, ptr_id_bits: u32) -> Result<i64> {
        if self.id_global >= (1 << (ptr_id_bits - 1)) - 1 {
            return Err(Error::not_implemented("too many global variables"));
        }
        self.id_global += 1;
        Ok(self.id_global)
    }
}

/// Create a module with the pointer geometry used for the given target
/// pointer size.
pub fn create_module(ptr_bits: u32) -> Module {
    assert!(ptr_bits == 32 || ptr_bits == 64);
    if ptr_bits == 32 {
        Module::new(32, 8, 24)
    } else {
        Module::new(64, 16, 48)
    }
}

pub(crate) struct Converter<'a> {
    pub(crate) func: Function,
    state: &'a mut CommonState,
    unit: &'a SourceUnit,
    fun: &'a SourceFunction,
    /// IR blocks introduced by switch expansion, keyed by the IR block of
    /// the source switch block; phi wiring picks the member that really is
    /// a predecessor.
    switch_bbs: HashMap<BlockId, Vec<BlockId>>,
    srcbb2bb: HashMap<SrcBlockId, BlockId>,
    bb2retval: HashMap<BlockId, ValUndef>,
    ssa2inst: HashMap<u32, InstId>,
    ssa2undef: HashMap<u32, InstId>,
    decl2inst: HashMap<DeclId, InstId>,
    param2inst: HashMap<u32, InstId>,
    /// Memory provenance flags of loaded values, used to constrain pointers
    /// read from memory.
    inst2memory_flagsx: HashMap<InstId, InstId>,
    retval_bitsize: u32,
    retval_type: Option<Type>,
    exit_bb: BlockId,
}

/// Lower one source function into `module`. On success the new function is
/// appended to the module and its index returned; on failure nothing is
/// added.
pub fn process_function(
    module: &mut Module,
    state: &mut CommonState,
    unit: &SourceUnit,
    fun: &SourceFunction,
) -> Result<usize> {
    if fun.has_static_chain {
        return Err(Error::not_implemented("nested functions"));
    }

    let mut converter = Converter {
        func: Function::new(fun.name.clone(), module.ptr),
        state,
        unit,
        fun,
        switch_bbs: HashMap::new(),
        srcbb2bb: HashMap::new(),
        bb2retval: HashMap::new(),
        ssa2inst: HashMap::new(),
        ssa2undef: HashMap::new(),
        decl2inst: HashMap::new(),
        param2inst: HashMap::new(),
        inst2memory_flagsx: HashMap::new(),
        retval_bitsize: 0,
        retval_type: None,
        exit_bb: BlockId(0),
    };
    converter.run()?;

    let mut func = converter.func;
    crate::ir::validate(&func);

    // Some inputs are far too large for the SMT solver; the limits are
    // checked after building so the converter itself is stressed on them.
    if func.bb_order.len() > MAX_BBS {
        return Err(Error::not_implemented("too many basic blocks"));
    }
    for &bb in &func.bb_order {
        if func.bb(bb).insts.len() > MAX_NOF_INSTS {
            return Err(Error::not_implemented("too many instructions in a BB"));
        }
    }

    crate::cfg::reverse_post_order(&mut func)?;
    module.functions.push(func);
    Ok(module.functions.len() - 1)
}

impl<'a> Converter<'a> {
    fn run(&mut self) -> Result<()> {
        // Source blocks are stored in post-order; create the IR blocks in
        // reverse post-order so the entry block comes first, then the exit
        // block holding the single RET.
        for i in (0..self.fun.blocks.len()).rev() {
            let bb = self.func.build_bb();
            self.srcbb2bb.insert(SrcBlockId(i as u32), bb);
        }
        self.exit_bb = self.func.build_bb();

        self.process_variables()?;
        self.process_func_args()?;
        self.process_instructions()?;
        Ok(())
    }

    pub(crate) fn src_bb(&self, id: SrcBlockId) -> BlockId {
        self.srcbb2bb[&id]
    }

    /// Build a MEMORY instruction in the entry block.
    pub(crate) fn build_memory_inst(&mut self, id: i64, size: u64, flags: u32) -> InstId {
        let entry = self.func.entry();
        let id_bits = self.func.ptr.id_bits;
        let offset_bits = self.func.ptr.offset_bits;
        let arg1 = self.func.value_inst(id as u128, id_bits);
        let arg2 = self.func.value_inst(size as u128, offset_bits);
        let arg3 = self.func.value_inst(flags as u128, 32);
        self.func.build_inst3(entry, Op::Memory, arg1, arg2, arg3)
    }

    /// Emit `UB(inst != 0)`.
    pub(crate) fn build_ub_if_not_zero(&mut self, bb: BlockId, inst: InstId) {
        let zero = self.func.value_inst(0, self.func.inst(inst).bitsize);
        let cmp = self.func.build_inst2(bb, Op::Ne, inst, zero);
        self.func.build_inst1(bb, Op::Ub, cmp);
    }

    fn process_instructions(&mut self) -> Result<()> {
        for i in (0..self.fun.blocks.len()).rev() {
            let src_id = SrcBlockId(i as u32);
            let block = &self.fun.blocks[i];
            let bb = self.src_bb(src_id);

            if block.has_abnormal_edge {
                return Err(Error::not_implemented("abnormal edge"));
            }
            if block.in_irreducible_loop {
                return Err(Error::not_implemented("irreducible loop"));
            }

            // Phis are created before any instruction; their arguments are
            // added after all blocks are processed, as an argument may come
            // from a switch-expansion block that does not exist yet.
            for phi in &block.phis {
                if phi.result.ty.is_void() {
                    continue;
                }
                let bitsize = bitsize_for_type(&phi.result.ty)? as u32;
                let phi_inst = self.func.build_phi(bb, bitsize);
                let phi_undef = self.func.build_phi(bb, bitsize);
                self.constrain_range(bb, &phi.result, phi_inst, Some(phi_undef))?;
                let ssa_id = ssa_name_id(&phi.result);
                self.ssa2inst.insert(ssa_id, phi_inst);
                self.ssa2undef.insert(ssa_id, phi_undef);
            }

            for stmt in &block.stmts {
                match stmt {
                    Stmt::Assign { lhs, rhs } => self.process_assign(lhs, rhs, bb)?,
                    Stmt::Call { lhs, target, args } => {
                        self.process_call(lhs.as_ref(), target, args, bb)?
                    }
                    Stmt::Return { value } => self.process_return(value.as_ref(), bb)?,
                    Stmt::Asm {
                        template,
                        nof_labels,
                    } => process_asm_stmt(template, *nof_labels)?,
                    Stmt::Nop => {}
                }
            }

            match &block.term {
                SourceTerm::Jump(dest) => {
                    let dest = self.src_bb(*dest);
                    self.func.build_br(bb, dest);
                }
                SourceTerm::Cond {
                    code,
                    lhs,
                    rhs,
                    true_block,
                    false_block,
                } => {
                    let cond = self.process_cond(*code, lhs, rhs, bb)?;
                    let true_bb = self.src_bb(*true_block);
                    let false_bb = self.src_bb(*false_block);
                    self.func.build_cond_br(bb, cond, true_bb, false_bb);
                }
                SourceTerm::Switch {
                    index,
                    cases,
                    default_block,
                } => self.process_switch(bb, index, cases, *default_block)?,
                SourceTerm::Exit => {
                    let exit = self.exit_bb;
                    self.func.build_br(bb, exit);
                }
            }
        }

        self.generate_return_inst(self.exit_bb)?;

        // All instructions exist now, so the phi arguments can be resolved.
        for i in (0..self.fun.blocks.len()).rev() {
            let src_id = SrcBlockId(i as u32);
            let block = &self.fun.blocks[i];
            let phi_bb = self.src_bb(src_id);
            for phi in &block.phis {
                if phi.result.ty.is_void() {
                    continue;
                }
                let ssa_id = ssa_name_id(&phi.result);
                let phi_inst = self.ssa2inst[&ssa_id];
                let phi_undef = self.ssa2undef[&ssa_id];
                for (arg, src_pred) in &phi.args {
                    let arg_bb = self.get_phi_arg_bb(*src_pred, phi_bb);
                    let (arg_inst, arg_undef) = self.tree2inst(arg_bb, arg)?;
                    self.func.add_phi_arg(phi_inst, arg_inst, arg_bb);
                    let arg_undef = match arg_undef {
                        Some(u) => u,
                        None => {
                            let bitsize = self.func.inst(arg_inst).bitsize;
                            self.func.value_inst(0, bitsize)
                        }
                    };
                    self.func.add_phi_arg(phi_undef, arg_undef, arg_bb);
                }
            }
        }
        Ok(())
    }

    /// The IR predecessor corresponding to the source edge `src_pred ->
    /// phi_bb`. When the predecessor ended in a switch, the edge comes from
    /// one of its expansion blocks instead.
    fn get_phi_arg_bb(&self, src_pred: SrcBlockId, phi_bb: BlockId) -> BlockId {
        let arg_bb = self.src_bb(src_pred);
        if let Some(bbset) = self.switch_bbs.get(&arg_bb) {
            assert!(!bbset.is_empty());
            for &bb in bbset {
                if self.func.bb(phi_bb).preds.contains(&bb) {
                    return bb;
                }
            }
            panic!("no switch expansion block is a predecessor");
        }
        arg_bb
    }

    fn process_return(&mut self, value: Option<&Expr>, bb: BlockId) -> Result<()> {
        if let Some(expr) = value {
            let retval = self.tree2inst(bb, expr)?;
            self.bb2retval.insert(bb, retval);
        }
        Ok(())
    }

    fn process_cond(
        &mut self,
        code: BinaryCode,
        lhs: &Expr,
        rhs: &Expr,
        bb: BlockId,
    ) -> Result<InstId> {
        let arg1 = self.tree2inst_undef_check(bb, lhs)?;
        let arg2 = self.tree2inst_undef_check(bb, rhs)?;
        let bool_type = TypeData::boolean();
        if lhs.ty.is_complex() {
            self.process_binary_complex_cmp(code, arg1, arg2, &bool_type, &lhs.ty, bb)
        } else {
            self.process_binary_scalar_value(code, arg1, arg2, &bool_type, &lhs.ty, &rhs.ty, bb)
        }
    }
}

fn process_asm_stmt(template: &str, nof_labels: u32) -> Result<()> {
    // Empty asm only constrains optimizations and can be ignored. Asm goto
    // would leave the CFG with edges we do not model.
    if !template.chars().all(|c| c.is_whitespace()) {
        return Err(Error::not_implemented("asm statement"));
    }
    if nof_labels != 0 {
        return Err(Error::not_implemented("asm goto"));
    }
    Ok(())
}

pub(crate) fn ssa_name_id(expr: &Expr) -> u32 {
    match &expr.kind {
        ExprKind::SsaName { id, .. } => *id,
        _ => panic!("expected an SSA name"),
    }
}

pub(crate) fn is_bit_field(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::ComponentRef { object, field } => {
            record_field(&object.ty, *field).bitfield
        }
        ExprKind::BitFieldRef { .. } => true,
        _ => false,
    }
}

/// The field list of a record or union type.
pub(crate) fn type_fields(ty: &TypeData) -> &[crate::tree::Field] {
    match &ty.kind {
        crate::tree::TypeKind::Record { fields } | crate::tree::TypeKind::Union { fields } => {
            fields
        }
        _ => panic!("type has no fields"),
    }
}

pub(crate) fn record_field(ty: &TypeData, idx: usize) -> &crate::tree::Field {
    &type_fields(ty)[idx]
}
