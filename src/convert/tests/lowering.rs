use super::*;

#[test]
fn signed_add_emits_wrap_check() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(int32(), 1, 0);
    let sum = crate::tree::ExprData::ssa(int32(), 2);
    let fun = single_block_fn(
        "src",
        vec![param_decl(int32())],
        Some(result),
        vec![
            Stmt::Assign {
                lhs: sum.clone(),
                rhs: Rhs::Binary {
                    code: BinaryCode::Plus,
                    arg1: x.clone(),
                    arg2: x.clone(),
                },
            },
            Stmt::Return { value: Some(sum) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Add), 1);
    assert_eq!(count_op(func, Op::SaddWraps), 1);
    assert_eq!(count_op(func, Op::Ret), 1);
    validate(func);
}

#[test]
fn unsigned_add_has_no_wrap_check() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(uint32()));
    let x = crate::tree::ExprData::param(uint32(), 1, 0);
    let sum = crate::tree::ExprData::ssa(uint32(), 2);
    let fun = single_block_fn(
        "src",
        vec![param_decl(uint32())],
        Some(result),
        vec![
            Stmt::Assign {
                lhs: sum.clone(),
                rhs: Rhs::Binary {
                    code: BinaryCode::Plus,
                    arg1: x.clone(),
                    arg2: x.clone(),
                },
            },
            Stmt::Return { value: Some(sum) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::SaddWraps), 0);
    assert_eq!(count_op(func, Op::Ub), 0);
}

#[test]
fn signed_division_checks_overflow_and_zero() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(int32(), 1, 0);
    let y = crate::tree::ExprData::param(int32(), 2, 1);
    let quot = crate::tree::ExprData::ssa(int32(), 3);
    let fun = single_block_fn(
        "src",
        vec![param_decl(int32()), param_decl(int32())],
        Some(result),
        vec![
            Stmt::Assign {
                lhs: quot.clone(),
                rhs: Rhs::Binary {
                    code: BinaryCode::TruncDiv,
                    arg1: x.clone(),
                    arg2: y.clone(),
                },
            },
            Stmt::Return { value: Some(quot) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Sdiv), 1);
    // INT_MIN / -1, and division by zero.
    assert_eq!(count_op(func, Op::Ub), 2);
    // The INT_MIN literal appears as an operand of an EQ.
    let min = func
        .value_map()
        .get(&(0x8000_0000, 32))
        .expect("INT_MIN literal missing");
    assert!(func
        .inst(*min)
        .used_by
        .iter()
        .any(|&u| func.inst(u).op == Op::Eq));
}

#[test]
fn shift_amount_is_checked_against_width() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(uint32()));
    let x = crate::tree::ExprData::param(uint32(), 1, 0);
    let y = crate::tree::ExprData::param(uint32(), 2, 1);
    let res = crate::tree::ExprData::ssa(uint32(), 3);
    let fun = single_block_fn(
        "src",
        vec![param_decl(uint32()), param_decl(uint32())],
        Some(result),
        vec![
            Stmt::Assign {
                lhs: res.clone(),
                rhs: Rhs::Binary {
                    code: BinaryCode::Lshift,
                    arg1: x.clone(),
                    arg2: y.clone(),
                },
            },
            Stmt::Return { value: Some(res) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Shl), 1);
    assert_eq!(count_op(func, Op::Ub), 1);
    let ub = find_ops(func, Op::Ub)[0];
    let cond = func.inst(func.inst(ub).args()[0]);
    assert_eq!(cond.op, Op::Uge);
}

#[test]
fn memset_expansion() {
    let mut unit = SourceUnit::default();
    let p = crate::tree::ExprData::param(char_ptr(), 1, 0);
    let zero = crate::tree::ExprData::int_cst(uint8(), 0);
    let four = crate::tree::ExprData::int_cst(TypeData::int(64, true), 4);
    let fun = single_block_fn(
        "src",
        vec![param_decl(char_ptr())],
        None,
        vec![Stmt::Call {
            lhs: None,
            target: CallTarget::Builtin("memset".to_string()),
            args: vec![p, zero, four],
        }],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();

    let stores = find_ops(func, Op::Store);
    assert_eq!(stores.len(), 4);
    for store in &stores {
        let byte = func.inst(*store).args()[1];
        assert_eq!(func.inst(byte).op, Op::Value);
        assert_eq!(func.inst(byte).value(), 0);
        assert_eq!(func.inst(byte).bitsize, 8);
    }

    let flags = find_ops(func, Op::SetMemFlag);
    assert_eq!(flags.len(), 4);
    for flag in &flags {
        let bit = func.inst(*flag).args()[1];
        assert_eq!(func.inst(bit).value(), 1);
    }

    let undefs = find_ops(func, Op::SetMemUndef);
    assert_eq!(undefs.len(), 4);
    for undef in &undefs {
        let byte = func.inst(*undef).args()[1];
        assert_eq!(func.inst(byte).value(), 0);
    }

    // One store_ub_check: a single IS_CONST_MEM / MEM_SIZE pair.
    assert_eq!(count_op(func, Op::IsConstMem), 1);
    assert_eq!(count_op(func, Op::MemSize), 1);
    validate(func);
}

#[test]
fn bit_field_store_merges_neighboring_bits() {
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
    let var = unit.add_decl(plain_decl(rec.clone()));
    let object = expr(ExprKind::VarDecl { decl: var }, rec);
    let lhs = expr(
        ExprKind::ComponentRef { object, field: 1 },
        int5.clone(),
    );
    let mut fun = single_block_fn(
        "src",
        vec![],
        None,
        vec![Stmt::Assign {
            lhs,
            rhs: Rhs::Single(crate::tree::ExprData::int_cst(int5, 3)),
        }],
    );
    fun.locals.push(var);

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();

    // A single byte is loaded to preserve the neighboring field, merged by
    // EXTRACT/CONCAT, and stored back once.
    assert_eq!(count_op(func, Op::Load), 1);
    assert_eq!(count_op(func, Op::Store), 1);
    assert_eq!(count_op(func, Op::GetMemUndef), 1);
    assert!(count_op(func, Op::Concat) >= 2);
    let store = find_ops(func, Op::Store)[0];
    let byte = func.inst(func.inst(store).args()[1]);
    assert_eq!(byte.op, Op::Extract);
    validate(func);
}

#[test]
fn load_skips_fully_padded_byte() {
    let rec = TypeData::record(
        vec![
            Field {
                name: Some("a".to_string()),
                offset: 0,
                bit_offset: 0,
                bitfield: false,
                ty: uint8(),
            },
            Field {
                name: Some("b".to_string()),
                offset: 2,
                bit_offset: 0,
                bitfield: false,
                ty: uint8(),
            },
        ],
        3,
        1,
    );

    let mut unit = SourceUnit::default();
    let var = unit.add_decl(plain_decl(rec.clone()));
    let value = crate::tree::ExprData::ssa(rec.clone(), 1);
    let mut fun = single_block_fn(
        "src",
        vec![],
        None,
        vec![Stmt::Assign {
            lhs: value,
            rhs: Rhs::Single(expr(ExprKind::VarDecl { decl: var }, rec)),
        }],
    );
    fun.locals.push(var);

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    // Byte 1 is all padding: only two LOADs for a three-byte object.
    assert_eq!(count_op(func, Op::Load), 2);
    assert_eq!(count_op(func, Op::GetMemUndef), 2);
    assert_eq!(count_op(func, Op::GetMemFlag), 3);
}

#[test]
fn parameter_range_is_constrained_in_entry_block() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(uint32()));
    let x = expr(
        ExprKind::SsaName {
            id: 1,
            def: crate::tree::SsaDef::Param(0),
            range: Some(ValueRange {
                pairs: vec![(5, 10)],
            }),
            nonzero_bits: None,
        },
        uint32(),
    );
    let res = crate::tree::ExprData::ssa(uint32(), 2);
    let fun = single_block_fn(
        "src",
        vec![param_decl(uint32())],
        Some(result),
        vec![
            Stmt::Assign {
                lhs: res.clone(),
                rhs: Rhs::Single(x),
            },
            Stmt::Return { value: Some(res) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    let ubs = find_ops(func, Op::Ub);
    assert_eq!(ubs.len(), 1);
    assert_eq!(func.inst(ubs[0]).bb, Some(func.entry()));
    // Unsigned range: the bound comparisons are UGT.
    assert!(count_op(func, Op::Ugt) >= 2);
}

#[test]
fn switch_expands_to_compare_chain() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(int32(), 1, 0);

    // Post-order: exit-most blocks first, entry (the switch) last.
    let mut case_a = SourceBlock::new(SourceTerm::Exit);
    case_a.stmts = vec![Stmt::Return {
        value: Some(crate::tree::ExprData::int_cst(int32(), 10)),
    }];
    let mut case_default = SourceBlock::new(SourceTerm::Exit);
    case_default.stmts = vec![Stmt::Return {
        value: Some(crate::tree::ExprData::int_cst(int32(), 20)),
    }];
    let switch_block = SourceBlock::new(SourceTerm::Switch {
        index: x.clone(),
        cases: vec![
            SwitchCase {
                low: crate::tree::ExprData::int_cst(int32(), 1),
                high: None,
                block: SrcBlockId(0),
            },
            SwitchCase {
                low: crate::tree::ExprData::int_cst(int32(), 3),
                high: Some(crate::tree::ExprData::int_cst(int32(), 5)),
                block: SrcBlockId(0),
            },
        ],
        default_block: SrcBlockId(1),
    });

    let fun = SourceFunction {
        name: "src".to_string(),
        params: vec![param_decl(int32())],
        blocks: vec![case_a, case_default, switch_block],
        locals: Vec::new(),
        result: Some(result),
        has_static_chain: false,
    };

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    validate(func);
    // Both cases reach the same block, so their conditions are ORed into a
    // single conditional branch.
    assert_eq!(count_op(func, Op::Or), 1);
    assert_eq!(count_op(func, Op::Eq), 1);
    assert_eq!(count_op(func, Op::Sge), 2);
    // The return value is a phi over the recorded per-block values.
    assert_eq!(count_op(func, Op::Phi), 2);
    assert_eq!(count_op(func, Op::Ret), 1);
}

#[test]
fn phi_arguments_are_wired_per_predecessor() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(int32(), 1, 0);
    let y = crate::tree::ExprData::ssa(int32(), 2);

    // if (x == 0) y = 1; else y = 2; return y;
    let mut join = SourceBlock::new(SourceTerm::Exit);
    join.phis = vec![SourcePhi {
        result: y.clone(),
        args: vec![
            (crate::tree::ExprData::int_cst(int32(), 1), SrcBlockId(2)),
            (crate::tree::ExprData::int_cst(int32(), 2), SrcBlockId(1)),
        ],
    }];
    join.stmts = vec![Stmt::Return { value: Some(y) }];

    let true_block = SourceBlock::new(SourceTerm::Jump(SrcBlockId(0)));
    let false_block = SourceBlock::new(SourceTerm::Jump(SrcBlockId(0)));
    let entry = SourceBlock::new(SourceTerm::Cond {
        code: BinaryCode::Eq,
        lhs: x.clone(),
        rhs: crate::tree::ExprData::int_cst(int32(), 0),
        true_block: SrcBlockId(2),
        false_block: SrcBlockId(1),
    });

    let fun = SourceFunction {
        name: "src".to_string(),
        params: vec![param_decl(int32())],
        blocks: vec![join, false_block, true_block, entry],
        locals: Vec::new(),
        result: Some(result),
        has_static_chain: false,
    };

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    validate(func);
    // The value phi and its undef shadow, plus the return phis.
    assert!(count_op(func, Op::Phi) >= 2);
    let phis = find_ops(func, Op::Phi);
    for phi in phis {
        let block = func.inst(phi).bb.unwrap();
        assert_eq!(
            func.inst(phi).phi_args().len(),
            func.bb(block).preds.len()
        );
    }
}

#[test]
fn too_wide_integer_is_not_implemented() {
    let wide = TypeData::int(129, false);
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(wide.clone()));
    let x = crate::tree::ExprData::param(wide.clone(), 1, 0);
    let fun = single_block_fn(
        "src",
        vec![param_decl(wide)],
        Some(result),
        vec![Stmt::Return { value: Some(x) }],
    );
    let err = lower(&unit, &fun).unwrap_err();
    assert!(matches!(err, Error::NotImplemented(_)));
}

#[test]
fn infinite_loop_reports_unreachable_exit() {
    let unit = SourceUnit::default();
    let looping = SourceBlock::new(SourceTerm::Jump(SrcBlockId(0)));
    let entry = SourceBlock::new(SourceTerm::Jump(SrcBlockId(0)));
    let fun = SourceFunction {
        name: "src".to_string(),
        params: vec![],
        blocks: vec![looping, entry],
        locals: Vec::new(),
        result: None,
        has_static_chain: false,
    };
    assert_eq!(lower(&unit, &fun).unwrap_err(), Error::UnreachableExit);
}

#[test]
fn nested_function_is_not_implemented() {
    let unit = SourceUnit::default();
    let mut fun = single_block_fn("src", vec![], None, vec![]);
    fun.has_static_chain = true;
    assert!(matches!(
        lower(&unit, &fun).unwrap_err(),
        Error::NotImplemented(_)
    ));
}

#[test]
fn clobber_eol_frees_the_object() {
    let rec = TypeData::record(
        vec![Field {
            name: None,
            offset: 0,
            bit_offset: 0,
            bitfield: false,
            ty: uint8(),
        }],
        1,
        1,
    );
    let mut unit = SourceUnit::default();
    let var = unit.add_decl(plain_decl(rec.clone()));
    let lhs = expr(ExprKind::VarDecl { decl: var }, rec.clone());
    let clobber = expr(
        ExprKind::Constructor {
            elems: vec![],
            no_clearing: false,
            clobber: true,
            clobber_eol: true,
        },
        rec,
    );
    let mut fun = single_block_fn(
        "src",
        vec![],
        None,
        vec![Stmt::Assign {
            lhs,
            rhs: Rhs::Single(clobber),
        }],
    );
    fun.locals.push(var);

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Free), 1);
    assert_eq!(count_op(func, Op::Store), 0);
}

#[test]
fn pointer_return_of_local_storage_is_checked() {
    let ptr_ty = char_ptr();
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(ptr_ty.clone()));
    let var = unit.add_decl(plain_decl(uint8()));
    let addr = expr(
        ExprKind::AddrExpr {
            operand: expr(ExprKind::VarDecl { decl: var }, uint8()),
        },
        ptr_ty.clone(),
    );
    let mut fun = single_block_fn(
        "src",
        vec![],
        Some(result),
        vec![Stmt::Return { value: Some(addr) }],
    );
    fun.locals.push(var);

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    // The exit block checks for a negative (local) memory id.
    let exit = func.exit();
    let has_slt_ub = func.bb(exit).insts.iter().any(|&i| {
        func.inst(i).op == Op::Ub
            && func.inst(func.inst(i).args()[0]).op == Op::Slt
    });
    assert!(has_slt_ub);
}

#[test]
fn global_initializer_is_stored_for_readonly_globals() {
    let mut unit = SourceUnit::default();
    let arr = TypeData::array(uint8(), 2);
    let init = expr(
        ExprKind::Constructor {
            elems: vec![
                (
                    CtorIndex::Element(0),
                    crate::tree::ExprData::int_cst(uint8(), 0xaa),
                ),
                (
                    CtorIndex::Element(1),
                    crate::tree::ExprData::int_cst(uint8(), 0xbb),
                ),
            ],
            no_clearing: false,
            clobber: false,
            clobber_eol: false,
        },
        arr.clone(),
    );
    unit.add_global(VarDecl {
        name: Some("table".to_string()),
        ty: arr,
        is_static: true,
        read_only: true,
        artificial: false,
        alias_of: None,
        init: Some(init),
    });

    let fun = single_block_fn("src", vec![], None, vec![]);
    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    // Zero-fill plus the two element stores.
    assert_eq!(count_op(func, Op::Store), 4);
    // One memory object for the global, one anonymous.
    assert_eq!(count_op(func, Op::Memory), 2);
    let mut stored: Vec<u128> = Vec::new();
    for s in find_ops(func, Op::Store) {
        let byte = func.inst(s).args()[1];
        match func.inst(byte).op {
            Op::Value => stored.push(func.inst(byte).value()),
            // store_value extracts each byte even at full width.
            Op::Extract => stored.push(func.inst(func.inst(byte).args()[0]).value()),
            other => panic!("unexpected stored byte {:?}", other),
        }
    }
    assert!(stored.contains(&0xaa));
    assert!(stored.contains(&0xbb));
}

#[test]
fn builtin_popcount_is_a_bit_sum() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(uint32(), 1, 0);
    let cnt = crate::tree::ExprData::ssa(int32(), 2);
    let fun = single_block_fn(
        "src",
        vec![param_decl(uint32())],
        Some(result),
        vec![
            Stmt::Call {
                lhs: Some(cnt.clone()),
                target: CallTarget::Builtin("__builtin_popcount".to_string()),
                args: vec![x],
            },
            Stmt::Return { value: Some(cnt) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Extract), 32);
    assert_eq!(count_op(func, Op::Add), 31);
}

#[test]
fn internal_clz_uses_symbolic_when_undefined_at_zero() {
    let mut unit = SourceUnit::default();
    let result = unit.add_decl(plain_decl(int32()));
    let x = crate::tree::ExprData::param(uint32(), 1, 0);
    let n = crate::tree::ExprData::ssa(int32(), 2);
    let fun = single_block_fn(
        "src",
        vec![param_decl(uint32())],
        Some(result),
        vec![
            Stmt::Call {
                lhs: Some(n.clone()),
                target: CallTarget::Internal("CLZ".to_string()),
                args: vec![x],
            },
            Stmt::Return { value: Some(n) },
        ],
    );

    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    assert_eq!(count_op(func, Op::Symbolic), 1);

    // With a defined value at zero, the symbolic constant disappears.
    let mut unit2 = SourceUnit::default();
    unit2.clz_zero_values.insert(32, 32);
    let result2 = unit2.add_decl(plain_decl(int32()));
    let mut fun2 = fun.clone();
    fun2.result = Some(result2);
    let module2 = lower(&unit2, &fun2).unwrap();
    let func2 = module2.function("src").unwrap();
    assert_eq!(count_op(func2, Op::Symbolic), 0);
}

#[test]
fn unreachable_builtin_is_plain_ub() {
    let unit = SourceUnit::default();
    let fun = single_block_fn(
        "src",
        vec![],
        None,
        vec![Stmt::Call {
            lhs: None,
            target: CallTarget::Builtin("__builtin_unreachable".to_string()),
            args: vec![],
        }],
    );
    let module = lower(&unit, &fun).unwrap();
    let func = module.function("src").unwrap();
    let ubs = find_ops(func, Op::Ub);
    assert_eq!(ubs.len(), 1);
    let cond = func.inst(func.inst(ubs[0]).args()[0]);
    assert_eq!(cond.value(), 1);
}
