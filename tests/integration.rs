//! End-to-end scenarios: building src/tgt pairs through the IR builder, the
//! tree lowering and the asm front-end, and deciding refinement through the
//! structural check and a stubbed SMT back-end.

use std::rc::Rc;

use tvc::check::{identical, SmtBackend, SolverStats};
use tvc::config::Config;
use tvc::convert::{create_module, process_function, CommonState};
use tvc::error::Error;
use tvc::ir::{validate, Function, InstKind, Module, Op};
use tvc::tree::{
    BinaryCode, CallTarget, ExprData, ExprKind, ParamDecl, Rhs, SourceBlock, SourceFunction,
    SourceTerm, SourceUnit, Stmt, Type, TypeData, VarDecl,
};

/// A back-end that must not be reached.
struct NeverCalled;

impl SmtBackend for NeverCalled {
    fn check_refine(&self, _: &Function, _: &Function) -> (SolverStats, Option<String>) {
        panic!("solver dispatched for identical functions");
    }
    fn check_ub(&self, _: &Function) -> (SolverStats, Option<String>) {
        panic!("unexpected check_ub");
    }
    fn check_assert(&self, _: &Function) -> (SolverStats, Option<String>) {
        panic!("unexpected check_assert");
    }
}

/// A back-end with a fixed verdict.
struct FixedAnswer(Option<&'static str>);

impl SmtBackend for FixedAnswer {
    fn check_refine(&self, _: &Function, _: &Function) -> (SolverStats, Option<String>) {
        (SolverStats::default(), self.0.map(str::to_string))
    }
    fn check_ub(&self, _: &Function) -> (SolverStats, Option<String>) {
        (SolverStats::default(), self.0.map(str::to_string))
    }
    fn check_assert(&self, _: &Function) -> (SolverStats, Option<String>) {
        (SolverStats::default(), self.0.map(str::to_string))
    }
}

fn int32() -> Type {
    TypeData::int(32, false)
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

fn result_decl(unit: &mut SourceUnit, ty: Type) -> tvc::tree::DeclId {
    unit.add_decl(VarDecl {
        name: None,
        ty,
        is_static: false,
        read_only: false,
        artificial: false,
        alias_of: None,
        init: None,
    })
}

/// Scenario 1: src computes x + x, tgt computes 2 * x. They are not
/// structurally identical, and the (stubbed) solver proves refinement.
#[test]
fn add_vs_shifted_multiply() {
    let mut module = Module::new(64, 16, 48);

    let src = module.build_function("src");
    let func = &mut module.functions[src];
    let bb = func.build_bb();
    let nbr = func.value_inst(0, 32);
    let width = func.value_inst(32, 32);
    let x = func.build_inst2(bb, Op::Param, nbr, width);
    let add = func.build_inst2(bb, Op::Add, x, x);
    func.build_ret1(bb, add);

    let tgt = module.build_function("tgt");
    let func = &mut module.functions[tgt];
    let bb = func.build_bb();
    let nbr = func.value_inst(0, 32);
    let width = func.value_inst(32, 32);
    let x = func.build_inst2(bb, Op::Param, nbr, width);
    let two = func.value_inst(2, 32);
    let mul = func.build_inst2(bb, Op::Mul, two, x);
    func.build_ret1(bb, mul);

    {
        let (a, b) = module.functions.split_at_mut(1);
        assert!(!identical(&mut a[0], &mut b[0]));
    }

    let config = Config::default();
    let verdict = tvc::check_refine(&mut module, &config, &FixedAnswer(None));
    assert_eq!(verdict, None);
}

/// Build `x / y` with the overflow/zero UB guards the source language
/// requires; `guarded` false leaves them out.
fn build_division(name: &str, module: &mut Module, guarded: bool) -> usize {
    let idx = module.build_function(name);
    let func = &mut module.functions[idx];
    let bb = func.build_bb();
    let nbr0 = func.value_inst(0, 32);
    let nbr1 = func.value_inst(1, 32);
    let width = func.value_inst(32, 32);
    let x = func.build_inst2(bb, Op::Param, nbr0, width);
    let y = func.build_inst2(bb, Op::Param, nbr1, width);
    if guarded {
        let min_int = func.value_inst(0x8000_0000, 32);
        let minus1 = func.value_inst(u128::MAX, 32);
        let c1 = func.build_inst2(bb, Op::Eq, x, min_int);
        let c2 = func.build_inst2(bb, Op::Eq, y, minus1);
        let overflow = func.build_inst2(bb, Op::And, c1, c2);
        func.build_inst1(bb, Op::Ub, overflow);
        let zero = func.value_inst(0, 32);
        let div_by_zero = func.build_inst2(bb, Op::Eq, y, zero);
        func.build_inst1(bb, Op::Ub, div_by_zero);
    }
    let div = func.build_inst2(bb, Op::Sdiv, x, y);
    func.build_ret1(bb, div);
    idx
}

/// Scenario 2: with the UB guard on both sides the functions are identical
/// and refinement holds trivially. Dropping the guard from the target makes
/// the pair reach the solver, which reports the INT_MIN / -1 input.
#[test]
fn division_ub_guards() {
    let mut module = Module::new(64, 16, 48);
    build_division("src", &mut module, true);
    build_division("tgt", &mut module, true);
    let config = Config::default();
    assert_eq!(tvc::check_refine(&mut module, &config, &NeverCalled), None);

    let mut module = Module::new(64, 16, 48);
    build_division("src", &mut module, true);
    build_division("tgt", &mut module, false);
    let counterexample = "target is UB-free for x = INT_MIN, y = -1";
    let verdict = tvc::check_refine(&mut module, &config, &FixedAnswer(Some(counterexample)));
    assert_eq!(verdict.as_deref(), Some(counterexample));
}

/// Scenario 3: a conditional branch on a literal condition folds to an
/// unconditional branch, and the not-taken phi argument disappears.
#[test]
fn constant_branch_simplification() {
    let mut func = Function::new("f".to_string(), tvc::ir::PtrLayout::new(64, 16, 48));
    let entry = func.build_bb();
    let left = func.build_bb();
    let right = func.build_bb();
    let exit = func.build_bb();
    let cond = func.value_inst(1, 1);
    func.build_cond_br(entry, cond, left, right);
    func.build_br(left, exit);
    func.build_br(right, exit);
    let v1 = func.value_inst(10, 32);
    let v2 = func.value_inst(20, 32);
    let phi = func.build_phi(exit, 32);
    func.add_phi_arg(phi, v1, left);
    func.add_phi_arg(phi, v2, right);
    func.build_ret1(exit, phi);

    tvc::cfg::simplify_cfg(&mut func).unwrap();

    assert_eq!(func.bb_order.len(), 3);
    assert_eq!(func.inst(phi).phi_args().len(), 1);
    assert_eq!(func.inst(phi).phi_args()[0].inst, v1);
    let term = func.terminator(entry).unwrap();
    assert!(matches!(func.inst(term).kind, InstKind::Br { .. }));
    validate(&func);
}

/// Scenario 4: an infinite self-loop makes the exit unreachable.
#[test]
fn unreachable_exit() {
    let mut func = Function::new("f".to_string(), tvc::ir::PtrLayout::new(64, 16, 48));
    let entry = func.build_bb();
    let looping = func.build_bb();
    let exit = func.build_bb();
    func.build_br(entry, looping);
    func.build_br(looping, looping);
    func.build_ret0(exit);
    assert_eq!(
        tvc::cfg::reverse_post_order(&mut func),
        Err(Error::UnreachableExit)
    );
}

/// Scenario 5: memset(p, 0, 4) unrolls into four byte stores with flag and
/// undef updates and one set of store UB checks.
#[test]
fn memset_unrolls_to_byte_stores() {
    let byte_ty = TypeData::int(8, true);
    let ptr_ty = TypeData::pointer(byte_ty.clone(), 64);

    let unit = SourceUnit::default();
    let p = ExprData::param(ptr_ty.clone(), 1, 0);
    let zero = ExprData::int_cst(byte_ty, 0);
    let four = ExprData::int_cst(TypeData::int(64, true), 4);
    let mut block = SourceBlock::new(SourceTerm::Exit);
    block.stmts = vec![Stmt::Call {
        lhs: None,
        target: CallTarget::Builtin("memset".to_string()),
        args: vec![p, zero, four],
    }];
    let fun = SourceFunction {
        name: "src".to_string(),
        params: vec![param_decl(ptr_ty)],
        blocks: vec![block],
        locals: Vec::new(),
        result: None,
        has_static_chain: false,
    };

    let mut module = create_module(64);
    let mut state = CommonState::new();
    process_function(&mut module, &mut state, &unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    validate(func);

    let count = |op: Op| -> usize {
        func.bb_order
            .iter()
            .map(|&bb| {
                func.bb(bb)
                    .insts
                    .iter()
                    .filter(|&&i| func.inst(i).op == op)
                    .count()
            })
            .sum()
    };
    assert_eq!(count(Op::Store), 4);
    assert_eq!(count(Op::SetMemFlag), 4);
    assert_eq!(count(Op::SetMemUndef), 4);
    assert_eq!(count(Op::IsConstMem), 1);
}

/// Scenario 6: a bit-field store into `struct { int a:3; int b:5; }` loads
/// the byte once, merges the neighboring bits, and stores once.
#[test]
fn bit_field_store() {
    use tvc::tree::Field;

    let int3 = TypeData::int(3, false);
    let int5 = TypeData::int(5, false);
    let rec = TypeData::record(
        vec![
            Field {
                name: Some("a".to_string()),
                offset: 0,
                bit_offset: 0,
                bitfield: true,
                ty: int3,
            },
            Field {
                name: Some("b".to_string()),
                offset: 0,
                bit_offset: 3,
                bitfield: true,
                ty: int5.clone(),
            },
        ],
        1,
        1,
    );

    let mut unit = SourceUnit::default();
    let var = unit.add_decl(VarDecl {
        name: Some("s".to_string()),
        ty: rec.clone(),
        is_static: false,
        read_only: false,
        artificial: false,
        alias_of: None,
        init: None,
    });
    let object = Rc::new(ExprData {
        kind: ExprKind::VarDecl { decl: var },
        ty: rec,
    });
    let lhs = Rc::new(ExprData {
        kind: ExprKind::ComponentRef { object, field: 1 },
        ty: int5.clone(),
    });
    let mut block = SourceBlock::new(SourceTerm::Exit);
    block.stmts = vec![Stmt::Assign {
        lhs,
        rhs: Rhs::Single(ExprData::int_cst(int5, 3)),
    }];
    let fun = SourceFunction {
        name: "src".to_string(),
        params: vec![],
        blocks: vec![block],
        locals: vec![var],
        result: None,
        has_static_chain: false,
    };

    let mut module = create_module(64);
    let mut state = CommonState::new();
    process_function(&mut module, &mut state, &unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    validate(func);

    let all: Vec<_> = func
        .bb_order
        .iter()
        .flat_map(|&bb| func.bb(bb).insts.clone())
        .collect();
    let count = |op: Op| all.iter().filter(|&&i| func.inst(i).op == op).count();
    assert_eq!(count(Op::Load), 1);
    assert_eq!(count(Op::Store), 1);
    assert!(count(Op::Concat) >= 2);
    assert!(count(Op::Extract) >= 1);
}

/// A source function lowered by the converter against its compiled RISC-V
/// form: the pair differs structurally and is dispatched to the solver.
#[test]
fn converter_and_asm_front_ends_meet_in_refinement() {
    let mut unit = SourceUnit::default();
    let result = result_decl(&mut unit, int32());
    let x = ExprData::param(int32(), 1, 0);
    let sum = ExprData::ssa(int32(), 2);
    let mut block = SourceBlock::new(SourceTerm::Exit);
    block.stmts = vec![
        Stmt::Assign {
            lhs: sum.clone(),
            rhs: Rhs::Binary {
                code: BinaryCode::Plus,
                arg1: x.clone(),
                arg2: x.clone(),
            },
        },
        Stmt::Return { value: Some(sum) },
    ];
    let fun = SourceFunction {
        name: "foo".to_string(),
        params: vec![param_decl(int32())],
        blocks: vec![block],
        locals: Vec::new(),
        result: Some(result),
        has_static_chain: false,
    };

    let mut module = create_module(64);
    let mut state = CommonState::new();
    let src_idx = process_function(&mut module, &mut state, &unit, &fun).unwrap();

    let text = "\
foo:
\taddw\ta0,a0,a0
\tret
\t.size\tfoo, .-foo
";
    let param_is_unsigned = state.param_is_unsigned.clone();
    tvc::asm::parse_riscv(&mut module, &param_is_unsigned, text).unwrap();
    module.functions[src_idx].name = "src".to_string();

    for func in &module.functions {
        validate(func);
    }

    let config = Config::default();
    let verdict = tvc::check_refine(&mut module, &config, &FixedAnswer(None));
    assert_eq!(verdict, None);
}
