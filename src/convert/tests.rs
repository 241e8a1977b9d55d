use std::rc::Rc;

use super::memory::padding_at_offset;
use super::*;
use crate::ir::validate;
use crate::tree::{
    CtorIndex, ExprData, Field, ParamDecl, Rhs, SourceBlock, SourcePhi, SwitchCase, ValueRange,
    VarDecl,
};

mod lowering;
mod padding;

fn int32() -> Type {
    TypeData::int(32, false)
}

fn uint32() -> Type {
    TypeData::int(32, true)
}

fn uint8() -> Type {
    TypeData::int(8, true)
}

fn char_ptr() -> Type {
    TypeData::pointer(uint8(), 64)
}

fn param_decl(ty: Type) -> ParamDecl {
    ParamDecl {
        name: None,
        ty,
        nonnull: false,
        is_this: false,
        known_bits: None,
    }
}

fn plain_decl(ty: Type) -> VarDecl {
    VarDecl {
        name: None,
        ty,
        is_static: false,
        read_only: false,
        artificial: false,
        alias_of: None,
        init: None,
    }
}

fn expr(kind: ExprKind, ty: Type) -> Expr {
    Rc::new(ExprData { kind, ty })
}

/// A function with a single basic block ending in Exit.
fn single_block_fn(
    name: &str,
    params: Vec<ParamDecl>,
    result: Option<DeclId>,
    stmts: Vec<Stmt>,
) -> SourceFunction {
    let mut block = SourceBlock::new(SourceTerm::Exit);
    block.stmts = stmts;
    SourceFunction {
        name: name.to_string(),
        params,
        blocks: vec![block],
        locals: Vec::new(),
        result,
        has_static_chain: false,
    }
}

fn lower(unit: &SourceUnit, fun: &SourceFunction) -> crate::error::Result<Module> {
    let mut module = create_module(64);
    let mut state = CommonState::new();
    process_function(&mut module, &mut state, unit, fun)?;
    Ok(module)
}

fn count_op(func: &Function, op: Op) -> usize {
    func.bb_order
        .iter()
        .map(|&bb| {
            func.bb(bb)
                .phis
                .iter()
                .chain(func.bb(bb).insts.iter())
                .filter(|&&i| func.inst(i).op == op)
                .count()
        })
        .sum()
}

fn find_ops(func: &Function, op: Op) -> Vec<crate::ir::InstId> {
    func.bb_order
        .iter()
        .flat_map(|&bb| {
            func.bb(bb)
                .phis
                .iter()
                .chain(func.bb(bb).insts.iter())
                .copied()
                .filter(|&i| func.inst(i).op == op)
                .collect::<Vec<_>>()
        })
        .collect()
}
