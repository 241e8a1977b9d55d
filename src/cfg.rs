//! Control-flow graph utilities: reverse post-order, dead-block removal,
//! dominance, and conservative CFG simplification.
//!
//! The block order of a function is significant: printing, structural
//! identity and the SMT emission all assume reverse post-order, so
//! [`reverse_post_order`] both computes the order and rewrites the
//! function's block list (removing unreachable blocks along the way).

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::ir::{BlockId, Function, InstKind, Op};

#[cfg(test)]
mod tests;

fn rpo_walk(func: &Function, bb: BlockId, order: &mut Vec<BlockId>, visited: &mut HashSet<BlockId>) {
    visited.insert(bb);
    for succ in func.bb(bb).succs.clone() {
        if !visited.contains(&succ) {
            rpo_walk(func, succ, order, visited);
        }
    }
    order.insert(0, bb);
}

/// Delete a set of unreachable blocks. Phi arguments flowing out of the dead
/// region are removed first, then the dead blocks' own phi arguments (they
/// may reference each other), and finally instructions are deleted until
/// every dead block is empty.
fn remove_dead_bbs(func: &mut Function, mut dead_bbs: Vec<BlockId>) {
    for &bb in &dead_bbs {
        for succ in func.bb(bb).succs.clone() {
            for phi in func.bb(succ).phis.clone() {
                func.remove_phi_arg(phi, bb);
            }
        }
    }

    for &bb in &dead_bbs {
        for phi in func.bb(bb).phis.clone() {
            func.remove_phi_args(phi);
        }
    }

    // Instructions must die after their users. The dead blocks are not
    // guaranteed to be in a usable order, so delete what is deletable and
    // iterate until all blocks are empty.
    while !dead_bbs.is_empty() {
        for i in (0..dead_bbs.len()).rev() {
            let bb = dead_bbs[i];
            for inst in func.bb(bb).insts.clone().into_iter().rev() {
                if !func.inst(inst).op.has_lhs() || func.inst(inst).used_by.is_empty() {
                    func.destroy_inst(inst);
                }
            }
        }
        while let Some(&bb) = dead_bbs.last() {
            if !func.bb(bb).insts.is_empty() {
                break;
            }
            dead_bbs.pop();
            func.destroy_bb(bb);
        }
    }
}

/// Iterative-intersection dominance. Assumes the block list is in reverse
/// post-order, the CFG is loop-free, and there are no dead blocks.
fn calculate_dominance(func: &mut Function) {
    for &bb in &func.bb_order.clone() {
        func.bb_mut(bb).dom.clear();
        func.bb_mut(bb).post_dom.clear();
    }

    let order = func.bb_order.clone();
    let entry = order[0];
    func.bb_mut(entry).dom.insert(entry);
    for &bb in &order[1..] {
        let preds = func.bb(bb).preds.clone();
        let mut dom = func.bb(preds[0]).dom.clone();
        for &pred in &preds[1..] {
            dom = dom.intersection(&func.bb(pred).dom).copied().collect();
        }
        dom.insert(bb);
        func.bb_mut(bb).dom = dom;
    }

    let exit = *order.last().unwrap();
    func.bb_mut(exit).post_dom.insert(exit);
    for &bb in order[..order.len() - 1].iter().rev() {
        let succs = func.bb(bb).succs.clone();
        let mut post_dom = func.bb(succs[0]).post_dom.clone();
        for &succ in &succs[1..] {
            post_dom = post_dom
                .intersection(&func.bb(succ).post_dom)
                .copied()
                .collect();
        }
        post_dom.insert(bb);
        func.bb_mut(bb).post_dom = post_dom;
    }
}

/// Check if `bb1` dominates `bb2`.
pub fn dominates(func: &Function, bb1: BlockId, bb2: BlockId) -> bool {
    func.bb(bb2).dom.contains(&bb1)
}

/// Check if `bb1` post-dominates `bb2`.
pub fn post_dominates(func: &Function, bb1: BlockId, bb2: BlockId) -> bool {
    func.bb(bb2).post_dom.contains(&bb1)
}

/// The nearest block dominating every predecessor of `bb`, found by walking
/// the first-predecessor chain.
pub fn nearest_dominator(func: &Function, bb: BlockId) -> Option<BlockId> {
    let preds = &func.bb(bb).preds;
    if preds.is_empty() {
        return None;
    }
    let mut cand = preds[0];
    loop {
        if preds.iter().all(|&p| dominates(func, cand, p)) {
            return Some(cand);
        }
        cand = *func
            .bb(cand)
            .preds
            .first()
            .expect("dominator walk reached the entry block");
    }
}

/// Reorder the function's blocks into reverse post-order, removing
/// unreachable blocks. Fails with [`Error::UnreachableExit`] when an
/// infinite loop makes the exit block unreachable. Dominance is recomputed
/// when the resulting CFG is loop-free.
pub fn reverse_post_order(func: &mut Function) -> Result<()> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    rpo_walk(func, func.entry(), &mut order, &mut visited);
    if !visited.contains(&func.exit()) {
        return Err(Error::UnreachableExit);
    }
    if order.len() != func.bb_order.len() {
        let dead: Vec<BlockId> = func
            .bb_order
            .iter()
            .copied()
            .filter(|bb| !visited.contains(bb))
            .collect();
        remove_dead_bbs(func, dead);
    }
    func.bb_order = order;

    if !has_loops(func) {
        calculate_dominance(func);
    }
    Ok(())
}

/// Detect a back-edge in a single scan of the block order.
pub fn has_loops(func: &Function) -> bool {
    let mut visited = HashSet::new();
    for &bb in &func.bb_order {
        visited.insert(bb);
        if func.bb(bb).succs.iter().any(|succ| visited.contains(succ)) {
            return true;
        }
    }
    false
}

/// Fold conditional branches whose condition is a literal, dropping the
/// not-taken edge from the successor's phis, then recompute the block order.
pub fn simplify_cfg(func: &mut Function) -> Result<()> {
    for &bb in &func.bb_order.clone() {
        let Some(term) = func.terminator(bb) else {
            continue;
        };
        let InstKind::CondBr {
            cond,
            true_bb,
            false_bb,
        } = func.inst(term).kind
        else {
            continue;
        };
        if func.inst(cond).op != Op::Value {
            continue;
        }
        let (taken, not_taken) = if func.inst(cond).value() != 0 {
            (true_bb, false_bb)
        } else {
            (false_bb, true_bb)
        };
        for phi in func.bb(not_taken).phis.clone() {
            func.remove_phi_arg(phi, bb);
        }
        func.destroy_inst(term);
        func.build_br(bb, taken);
    }
    reverse_post_order(func)
}
