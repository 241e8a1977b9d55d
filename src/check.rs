//! Structural identity and the refinement-check entry points.
//!
//! Two functions that are structurally identical after canonicalization
//! trivially refine each other; everything else is handed to the external
//! SMT back-end through [`SmtBackend`].

use crate::config::Config;
use crate::ir::{Function, InstId, InstKind, Module, Op};


/// Per-solver timing, reported by the back-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverStats {
    pub skipped: bool,
    /// Wall-clock milliseconds for the three queries (UB / return value /
    /// memory).
    pub time: [u64; 3],
}

/// The SMT back-end. Each check returns its stats and, when the property
/// fails, a human-readable counterexample.
pub trait SmtBackend {
    fn check_refine(&self, src: &Function, tgt: &Function) -> (SolverStats, Option<String>);
    fn check_ub(&self, func: &Function) -> (SolverStats, Option<String>);
    fn check_assert(&self, func: &Function) -> (SolverStats, Option<String>);
}

/// An IR-rewriting pass supplied by the embedder (instruction
/// simplification, dead-code elimination, loop unrolling). Returns whether
/// anything changed.
pub trait Pass {
    fn name(&self) -> &str;
    fn run(&self, func: &mut Function) -> crate::error::Result<bool>;
}

fn identical_inst(func1: &Function, id1: InstId, func2: &Function, id2: InstId) -> bool {
    let inst1 = func1.inst(id1);
    let inst2 = func2.inst(id2);
    if inst1.op != inst2.op {
        return false;
    }
    if inst1.op == Op::Symbolic {
        // SYMBOLIC stands for "any value"; two of them may take different
        // concrete values, so they are never identical.
        return false;
    }
    if inst1.bitsize != inst2.bitsize {
        return false;
    }
    if inst1.nof_args() != inst2.nof_args() {
        return false;
    }
    let ids1: Vec<u32> = inst1.args().iter().map(|&a| func1.inst(a).id).collect();
    let ids2: Vec<u32> = inst2.args().iter().map(|&a| func2.inst(a).id).collect();
    if inst1.op.is_commutative() {
        assert_eq!(ids1.len(), 2);
        if !((ids1[0] == ids2[0] && ids1[1] == ids2[1])
            || (ids1[0] == ids2[1] && ids1[1] == ids2[0]))
        {
            return false;
        }
    } else if ids1 != ids2 {
        return false;
    }

    match (&inst1.kind, &inst2.kind) {
        (InstKind::Br { dest: d1 }, InstKind::Br { dest: d2 }) => {
            func1.bb(*d1).id == func2.bb(*d2).id
        }
        (
            InstKind::CondBr {
                true_bb: t1,
                false_bb: f1,
                ..
            },
            InstKind::CondBr {
                true_bb: t2,
                false_bb: f2,
                ..
            },
        ) => func1.bb(*t1).id == func2.bb(*t2).id && func1.bb(*f1).id == func2.bb(*f2).id,
        (InstKind::Phi { args: args1 }, InstKind::Phi { args: args2 }) => {
            args1.len() == args2.len()
                && args1.iter().zip(args2).all(|(a1, a2)| {
                    func1.inst(a1.inst).id == func2.inst(a2.inst).id
                        && func1.bb(a1.bb).id == func2.bb(a2.bb).id
                })
        }
        (InstKind::Value { value: v1 }, InstKind::Value { value: v2 }) => v1 == v2,
        (InstKind::Plain { .. }, InstKind::Plain { .. }) => true,
        _ => false,
    }
}

/// Structural identity after canonicalization: same block count, and
/// element-wise identical phi and instruction lists.
pub fn identical(func1: &mut Function, func2: &mut Function) -> bool {
    func1.canonicalize();
    func2.canonicalize();

    if func1.bb_order.len() != func2.bb_order.len() {
        return false;
    }

    for (&bb1, &bb2) in func1.bb_order.iter().zip(&func2.bb_order) {
        let block1 = func1.bb(bb1);
        let block2 = func2.bb(bb2);
        if block1.phis.len() != block2.phis.len() {
            return false;
        }
        for (&phi1, &phi2) in block1.phis.iter().zip(&block2.phis) {
            if !identical_inst(func1, phi1, func2, phi2) {
                return false;
            }
        }
        if block1.insts.len() != block2.insts.len() {
            return false;
        }
        for (&inst1, &inst2) in block1.insts.iter().zip(&block2.insts) {
            if !identical_inst(func1, inst1, func2, inst2) {
                return false;
            }
        }
    }
    true
}

fn log_stats(stats: &SolverStats) {
    if !stats.skipped {
        tracing::info!(
            "time: {},{},{}",
            stats.time[0],
            stats.time[1],
            stats.time[2]
        );
    }
}

/// Check that "tgt" refines "src". Returns a counterexample message when it
/// does not; `None` means refinement holds or the query was unverified
/// (solver timeout).
pub fn check_refine(
    module: &mut Module,
    config: &Config,
    backend: &dyn SmtBackend,
) -> Option<String> {
    assert_eq!(module.functions.len(), 2);
    let (mut src_idx, mut tgt_idx) = (0, 1);
    if module.functions[src_idx].name != "src" {
        std::mem::swap(&mut src_idx, &mut tgt_idx);
    }
    assert_eq!(module.functions[src_idx].name, "src");
    assert_eq!(module.functions[tgt_idx].name, "tgt");

    {
        let (a, b) = module.functions.split_at_mut(1);
        let (src, tgt) = if src_idx == 0 {
            (&mut a[0], &mut b[0])
        } else {
            (&mut b[0], &mut a[0])
        };
        if identical(src, tgt) {
            return None;
        }
    }

    if config.verbose > 1 {
        tracing::debug!("{}", module);
    }

    let src = &module.functions[src_idx];
    let tgt = &module.functions[tgt_idx];
    let (stats, msg) = backend.check_refine(src, tgt);
    if config.verbose > 0 {
        log_stats(&stats);
    }
    msg
}

/// Check that the function is free of always-executed UB.
pub fn check_ub(func: &Function, config: &Config, backend: &dyn SmtBackend) -> Option<String> {
    if config.verbose > 1 {
        tracing::debug!("{}", func);
    }
    let (stats, msg) = backend.check_ub(func);
    if config.verbose > 0 {
        log_stats(&stats);
    }
    msg
}

/// Check that every ASSERT in the function holds.
pub fn check_assert(func: &Function, config: &Config, backend: &dyn SmtBackend) -> Option<String> {
    if config.verbose > 1 {
        tracing::debug!("{}", func);
    }
    let (stats, msg) = backend.check_assert(func);
    if config.verbose > 0 {
        log_stats(&stats);
    }
    msg
}
